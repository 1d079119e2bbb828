//! Replacement policies.
//!
//! Victim selection is a runtime strategy behind one trait: four
//! interchangeable policies operate over the paging metadata and the entry
//! access bits. Per-page policy state (aging counters, queue position)
//! lives in [`PagingMetadata`], so fork's verbatim metadata copy carries it
//! to the child and the strategy objects themselves stay stateless.

mod aging;
mod queue;

use alloc::boxed::Box;

pub use aging::{Lapa, NfuAging};
pub use queue::{AccessedQueue, SecondChanceFifo};

use crate::{meta::PagingMetadata, paging::AddressSpace, paging::Page};

pub trait ReplacementPolicy: Send {
    fn name(&self) -> &'static str;

    /// Periodic tick. The aging policies run their sweep here; the queue
    /// policies keep no tick-driven state.
    fn tick(&mut self, _meta: &mut PagingMetadata, _space: &mut AddressSpace) {}

    /// Pick one resident page to evict. Never returns a swapped or unknown
    /// page; panics if nothing is evictable, which cannot happen while the
    /// resident count is above zero.
    fn select_victim(&mut self, meta: &mut PagingMetadata, space: &mut AddressSpace) -> Page;

    /// Fresh instance of the same strategy for a forked process.
    fn duplicate(&self) -> Box<dyn ReplacementPolicy>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{BootstrapAllocator, FrameAllocator},
        meta::Residency,
        paging::{EntryFlags, VirtualAddress},
    };

    pub(super) fn page(addr: usize) -> Page {
        Page::containing_address(VirtualAddress::new(addr))
    }

    /// Metadata plus a space with one mapped frame per resident page.
    pub(super) fn fixture(
        pages: &[usize],
    ) -> (PagingMetadata, AddressSpace, FrameAllocator) {
        let allocator = BootstrapAllocator::new().finish(pages.len());
        let mut meta = PagingMetadata::new(pages.len().max(8));
        let mut space = AddressSpace::new();
        for &addr in pages {
            meta.add_page(page(addr)).unwrap();
            space
                .map(
                    page(addr),
                    allocator.allocate().unwrap(),
                    EntryFlags::WRITABLE | EntryFlags::USER,
                )
                .flush();
        }
        (meta, space, allocator)
    }

    pub(super) fn touch(space: &mut AddressSpace, addr: usize) {
        space.set_flag(page(addr), EntryFlags::ACCESSED);
    }

    pub(super) fn swap_out(meta: &mut PagingMetadata, space: &mut AddressSpace, addr: usize) {
        let (frame, flush) = space.detach_frame(page(addr));
        flush.flush();
        drop(frame);
        meta.mark_swapped(page(addr), 0);
    }

    #[test]
    fn test_policies_never_pick_swapped_pages() {
        for mut policy in [
            Box::new(NfuAging) as Box<dyn ReplacementPolicy>,
            Box::new(Lapa),
            Box::new(SecondChanceFifo),
            Box::new(AccessedQueue),
        ] {
            let (mut meta, mut space, _allocator) = fixture(&[0x0, 0x1000, 0x2000]);
            swap_out(&mut meta, &mut space, 0x0);
            policy.tick(&mut meta, &mut space);
            let victim = policy.select_victim(&mut meta, &mut space);
            assert_ne!(victim, page(0x0), "policy {}", policy.name());
            assert!(meta.record(victim).unwrap().is_resident());
        }
    }

    #[test]
    fn test_duplicate_preserves_strategy() {
        let policy: Box<dyn ReplacementPolicy> = Box::new(Lapa);
        assert_eq!(policy.duplicate().name(), "lapa");
    }

    #[test]
    fn test_swap_out_fixture_keeps_invariants() {
        let (mut meta, mut space, _allocator) = fixture(&[0x0, 0x1000]);
        swap_out(&mut meta, &mut space, 0x1000);
        assert_eq!(meta.resident_count(), 1);
        assert_eq!(
            meta.record(page(0x1000)).unwrap().residency,
            Residency::Swapped { offset: 0 }
        );
    }
}
