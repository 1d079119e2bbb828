//! Queue-based policies.
//!
//! Both variants walk the arrival queue in [`PagingMetadata`]: the front is
//! the oldest page, and a set access bit buys it a second chance at the
//! back of the queue. They differ only in which records count as
//! candidates.

use alloc::boxed::Box;

use super::ReplacementPolicy;
use crate::{
    meta::{PageRecord, PagingMetadata},
    paging::{AddressSpace, EntryFlags, Page},
};

/// Second-chance scan over the arrival queue. Pages failing `evictable` and
/// pages with the access bit set rotate to the back; the first page that
/// passes both checks is the victim. Bounded so an all-accessed queue
/// terminates after everyone's bit has been consumed.
fn rotate_select(
    meta: &mut PagingMetadata,
    space: &mut AddressSpace,
    evictable: impl Fn(&PageRecord) -> bool,
) -> Page {
    let bound = 2 * meta.queue_len() + 1;
    for _ in 0..bound {
        let page = meta.queue_front().expect("no resident page to evict");
        let record = meta
            .record(page)
            .unwrap_or_else(|| panic!("queued page {:?} has no record", page));
        if !evictable(record) {
            meta.rotate_queue();
            continue;
        }
        if space.test_flag(page, EntryFlags::ACCESSED) {
            space.clear_flag(page, EntryFlags::ACCESSED);
            meta.rotate_queue();
            continue;
        }
        return page;
    }
    panic!("second-chance scan did not converge");
}

/// FIFO with second chance: oldest resident page loses unless it was
/// touched since its last chance.
pub struct SecondChanceFifo;

impl ReplacementPolicy for SecondChanceFifo {
    fn name(&self) -> &'static str {
        "second-chance-fifo"
    }

    fn select_victim(&mut self, meta: &mut PagingMetadata, space: &mut AddressSpace) -> Page {
        rotate_select(meta, space, |_| true)
    }

    fn duplicate(&self) -> Box<dyn ReplacementPolicy> {
        Box::new(SecondChanceFifo)
    }
}

/// Second-chance scan restricted to records still marked resident. The
/// arrival queue holds exactly the resident set, so the filter only matters
/// when a record's residency changed under an in-progress scan.
pub struct AccessedQueue;

impl ReplacementPolicy for AccessedQueue {
    fn name(&self) -> &'static str {
        "accessed-queue"
    }

    fn select_victim(&mut self, meta: &mut PagingMetadata, space: &mut AddressSpace) -> Page {
        rotate_select(meta, space, PageRecord::is_resident)
    }

    fn duplicate(&self) -> Box<dyn ReplacementPolicy> {
        Box::new(AccessedQueue)
    }
}
