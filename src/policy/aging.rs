//! Aging-counter policies.
//!
//! Both strategies share one periodic sweep that folds the access bit of
//! every resident page into two fixed-width counters: shift right, and OR
//! the top bit back in when the page was touched since the last tick. The
//! counters are independent so the two policies can rank pages differently
//! from the same access history.

use alloc::boxed::Box;

use super::ReplacementPolicy;
use crate::{
    meta::PagingMetadata,
    paging::{AddressSpace, EntryFlags, Page},
};

const AGE_MSB: u32 = 1 << 31;

/// One aging pass: consume the access bit of every resident page into both
/// counters.
fn age_sweep(meta: &mut PagingMetadata, space: &mut AddressSpace) {
    for record in meta.records_mut() {
        if !record.is_resident() {
            continue;
        }
        let accessed = space.test_flag(record.page, EntryFlags::ACCESSED);
        if accessed {
            space.clear_flag(record.page, EntryFlags::ACCESSED);
        }
        record.age >>= 1;
        record.lapa_age >>= 1;
        if accessed {
            record.age |= AGE_MSB;
            record.lapa_age |= AGE_MSB;
        }
    }
}

/// NFU with recency: the page with the numerically smallest aging counter
/// loses. The candidate is seeded from the first resident record in table
/// order and only strictly smaller counters displace it, so ties keep the
/// earliest record.
pub struct NfuAging;

impl ReplacementPolicy for NfuAging {
    fn name(&self) -> &'static str {
        "nfu-aging"
    }

    fn tick(&mut self, meta: &mut PagingMetadata, space: &mut AddressSpace) {
        age_sweep(meta, space);
    }

    fn select_victim(&mut self, meta: &mut PagingMetadata, _space: &mut AddressSpace) -> Page {
        let mut best: Option<(Page, u32)> = None;
        for record in meta.records() {
            if !record.is_resident() {
                continue;
            }
            match best {
                Some((_, age)) if record.age >= age => {}
                _ => best = Some((record.page, record.age)),
            }
        }
        let (victim, _) = best.expect("no resident page to evict");
        victim
    }

    fn duplicate(&self) -> Box<dyn ReplacementPolicy> {
        Box::new(NfuAging)
    }
}

/// Least accessed page aging: ranks by the population count of the second
/// counter, falling back to the raw value on an exact tie, and to table
/// order after that.
pub struct Lapa;

impl ReplacementPolicy for Lapa {
    fn name(&self) -> &'static str {
        "lapa"
    }

    fn tick(&mut self, meta: &mut PagingMetadata, space: &mut AddressSpace) {
        age_sweep(meta, space);
    }

    fn select_victim(&mut self, meta: &mut PagingMetadata, _space: &mut AddressSpace) -> Page {
        let mut best: Option<(Page, (u32, u32))> = None;
        for record in meta.records() {
            if !record.is_resident() {
                continue;
            }
            let key = (record.lapa_age.count_ones(), record.lapa_age);
            match best {
                Some((_, best_key)) if key >= best_key => {}
                _ => best = Some((record.page, key)),
            }
        }
        let (victim, _) = best.expect("no resident page to evict");
        victim
    }

    fn duplicate(&self) -> Box<dyn ReplacementPolicy> {
        Box::new(Lapa)
    }
}
