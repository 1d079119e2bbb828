//! Per-process swap area.
//!
//! A fixed-slot layout over an external random-access byte store: slot `i`
//! occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`. The store itself
//! is opened, created and destroyed by an outside component; this module
//! only reads and writes it and tracks slot occupancy in a bitmap.

use alloc::vec::Vec;

use crate::{
    error::{Error, Result},
    paging::PAGE_SIZE,
};

/// Random-access byte store backing one process's swap area.
pub trait BackingStore {
    fn read_at(&mut self, buf: &mut [u8], offset: usize) -> Result<()>;
    fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<()>;
}

/// Growable in-memory backing store, for hosts without a file layer and for
/// tests. Reads past the written extent come back zeroed, like a sparse
/// file.
pub struct HeapStore {
    data: Vec<u8>,
}

impl HeapStore {
    pub fn new() -> HeapStore {
        HeapStore { data: Vec::new() }
    }
}

impl BackingStore for HeapStore {
    fn read_at(&mut self, buf: &mut [u8], offset: usize) -> Result<()> {
        let end = offset + buf.len();
        let available = self.data.len().min(end);
        if available > offset {
            let copied = available - offset;
            buf[..copied].copy_from_slice(&self.data[offset..available]);
            buf[copied..].fill(0);
        } else {
            buf.fill(0);
        }
        Ok(())
    }

    fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<()> {
        let end = offset + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(())
    }
}

/// Free/taken bitmap over the fixed swap slots.
#[derive(Clone)]
struct SlotBitmap {
    words: Vec<u64>,
    len: usize,
}

impl SlotBitmap {
    fn new(len: usize) -> SlotBitmap {
        SlotBitmap {
            words: (0..len.div_ceil(64)).map(|_| 0).collect(),
            len,
        }
    }

    /// First free slot index, now taken.
    fn alloc(&mut self) -> Option<usize> {
        for (word_index, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros() as usize;
            let slot = word_index * 64 + bit;
            if slot >= self.len {
                return None;
            }
            *word |= 1 << bit;
            return Some(slot);
        }
        None
    }

    fn free(&mut self, slot: usize) {
        if !self.taken(slot) {
            panic!("freeing swap slot {} which is not taken", slot);
        }
        self.words[slot / 64] &= !(1 << (slot % 64));
    }

    fn taken(&self, slot: usize) -> bool {
        assert!(slot < self.len, "swap slot {} out of range", slot);
        self.words[slot / 64] & (1 << (slot % 64)) != 0
    }

    fn taken_count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    fn clear(&mut self) {
        self.words.iter_mut().for_each(|word| *word = 0);
    }
}

/// Fixed-slot swap area over an external backing store.
pub struct SwapStore<S> {
    store: S,
    slots: SlotBitmap,
    slot_count: usize,
}

impl<S: BackingStore> SwapStore<S> {
    pub fn new(store: S, slot_count: usize) -> SwapStore<S> {
        SwapStore {
            store,
            slots: SlotBitmap::new(slot_count),
            slot_count,
        }
    }

    /// Claim the first free slot, returned as a byte offset.
    pub fn allocate_slot(&mut self) -> Result<usize> {
        self.slots
            .alloc()
            .map(|slot| slot * PAGE_SIZE)
            .ok_or(Error::SwapFull)
    }

    pub fn free_slot(&mut self, offset: usize) {
        self.slots.free(offset / PAGE_SIZE);
    }

    pub fn slot_taken(&self, offset: usize) -> bool {
        self.slots.taken(offset / PAGE_SIZE)
    }

    pub fn taken_count(&self) -> usize {
        self.slots.taken_count()
    }

    pub fn write_slot(&mut self, offset: usize, bytes: &[u8; PAGE_SIZE]) -> Result<()> {
        debug_assert_eq!(offset % PAGE_SIZE, 0);
        self.store.write_at(bytes, offset)
    }

    pub fn read_slot(&mut self, offset: usize, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        debug_assert_eq!(offset % PAGE_SIZE, 0);
        self.store.read_at(buf, offset)
    }

    /// Release every slot (process teardown). The store's bytes are left
    /// alone; its lifetime belongs to the outside component.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Fork: stream the parent's entire area into this store in fixed-size
    /// chunks, then take over the parent's slot map. Absolute layout is
    /// preserved, so recorded offsets stay valid in the child.
    pub fn copy_from(&mut self, parent: &mut SwapStore<S>) -> Result<()> {
        const CHUNK: usize = PAGE_SIZE / 2;
        debug_assert_eq!(self.slot_count, parent.slot_count);
        let mut buf = [0u8; CHUNK];
        let total = parent.slot_count * PAGE_SIZE;
        let mut offset = 0;
        while offset < total {
            parent.store.read_at(&mut buf, offset)?;
            self.store.write_at(&buf, offset)?;
            offset += CHUNK;
        }
        self.slots = parent.slots.clone();
        Ok(())
    }
}
