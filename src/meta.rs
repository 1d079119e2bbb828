//! Per-process paging metadata.
//!
//! A bounded table of page records plus the arrival queue backing the
//! second-chance policies. Records take the first free slot, so iteration
//! ("table order") is stable until a slot is reused; a hash index keeps
//! lookups by address O(1). The whole structure clones verbatim on fork:
//! recorded swap offsets stay valid because the swap area's absolute layout
//! is preserved.

use alloc::{collections::VecDeque, vec::Vec};
use hashbrown::HashMap;

use crate::{
    error::{Error, Result},
    paging::Page,
};

/// Fresh extreme for both aging counters: maximally recent, so a page just
/// created or paged in is the last the aging policies will pick.
pub(crate) const FRESH_AGE: u32 = u32::MAX;

/// Residency state of a tracked page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    /// Content occupies a frame, entry marked present.
    Resident,
    /// Content lives in the swap area at this byte offset.
    Swapped { offset: usize },
}

#[derive(Clone, Copy, Debug)]
pub struct PageRecord {
    pub page: Page,
    pub residency: Residency,
    /// Aging counter for the NFU-with-recency policy.
    pub age: u32,
    /// Independently tracked counter for the LAPA policy.
    pub lapa_age: u32,
}

impl PageRecord {
    pub fn is_resident(&self) -> bool {
        matches!(self.residency, Residency::Resident)
    }
}

/// Bounded table of page records for one process.
#[derive(Clone)]
pub struct PagingMetadata {
    slots: Vec<Option<PageRecord>>,
    index: HashMap<Page, usize>,
    /// Arrival order of resident pages; holds exactly the resident set.
    queue: VecDeque<Page>,
    resident: usize,
}

impl PagingMetadata {
    pub fn new(capacity: usize) -> PagingMetadata {
        PagingMetadata {
            slots: (0..capacity).map(|_| None).collect(),
            index: HashMap::new(),
            queue: VecDeque::new(),
            resident: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Register a brand-new page as resident. Fails with `TableFull` when
    /// every slot is taken; panics on a duplicate address.
    pub fn add_page(&mut self, page: Page) -> Result<()> {
        if self.index.contains_key(&page) {
            panic!("add_page: record for {:?} already exists", page);
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::TableFull)?;
        self.slots[slot] = Some(PageRecord {
            page,
            residency: Residency::Resident,
            age: FRESH_AGE,
            lapa_age: FRESH_AGE,
        });
        self.index.insert(page, slot);
        self.queue.push_back(page);
        self.resident += 1;
        Ok(())
    }

    /// Resident -> Swapped, recording the slot offset. Leaves the arrival
    /// queue.
    pub fn mark_swapped(&mut self, page: Page, offset: usize) {
        let record = self
            .record_mut(page)
            .unwrap_or_else(|| panic!("mark_swapped: no record for {:?}", page));
        if !record.is_resident() {
            panic!("mark_swapped: {:?} is not resident", page);
        }
        record.residency = Residency::Swapped { offset };
        self.resident -= 1;
        self.dequeue(page);
    }

    /// Swapped -> Resident. Both aging counters reset to the fresh extreme
    /// and the page rejoins the back of the arrival queue. Returns the swap
    /// offset the record held, for the caller to release.
    pub fn mark_resident(&mut self, page: Page) -> usize {
        let record = self
            .record_mut(page)
            .unwrap_or_else(|| panic!("mark_resident: no record for {:?}", page));
        let Residency::Swapped { offset } = record.residency else {
            panic!("mark_resident: {:?} is not swapped", page);
        };
        record.residency = Residency::Resident;
        record.age = FRESH_AGE;
        record.lapa_age = FRESH_AGE;
        self.resident += 1;
        self.queue.push_back(page);
        offset
    }

    /// Delete the record for `page`. A `Swapped` record's slot offset is
    /// returned inside it for the caller to release.
    pub fn remove(&mut self, page: Page) -> Option<PageRecord> {
        let slot = self.index.remove(&page)?;
        let record = self.slots[slot].take()?;
        if record.is_resident() {
            self.resident -= 1;
            self.dequeue(page);
        }
        Some(record)
    }

    pub fn record(&self, page: Page) -> Option<&PageRecord> {
        let slot = *self.index.get(&page)?;
        self.slots[slot].as_ref()
    }

    pub fn record_mut(&mut self, page: Page) -> Option<&mut PageRecord> {
        let slot = *self.index.get(&page)?;
        self.slots[slot].as_mut()
    }

    /// Records in table order.
    pub fn records(&self) -> impl Iterator<Item = &PageRecord> {
        self.slots.iter().flatten()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut PageRecord> {
        self.slots.iter_mut().flatten()
    }

    pub fn queue_front(&self) -> Option<Page> {
        self.queue.front().copied()
    }

    /// Move the queue front to the back (second chance).
    pub fn rotate_queue(&mut self) {
        if let Some(page) = self.queue.pop_front() {
            self.queue.push_back(page);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn resident_count(&self) -> usize {
        self.resident
    }

    pub fn swapped_count(&self) -> usize {
        self.index.len() - self.resident
    }

    pub fn page_count(&self) -> usize {
        self.index.len()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index.clear();
        self.queue.clear();
        self.resident = 0;
    }

    fn dequeue(&mut self, page: Page) {
        if let Some(position) = self.queue.iter().position(|&p| p == page) {
            self.queue.remove(position);
        }
    }
}
