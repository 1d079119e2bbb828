//! Per-process address space.
//!
//! A two-level software translation table: a directory of demand-allocated
//! page tables, each entry carrying its flags and, while resident, the
//! owned frame. Bit layout and table geometry stay internal to this module;
//! everything else goes through the flag and mapping API.
//!
//! Every operation that flips a `PRESENT` bit hands back a [`PageFlush`]
//! that must be consumed before the affected frame can travel anywhere
//! else.

mod entry;

use core::fmt;

use alloc::{boxed::Box, vec::Vec};

pub use entry::{EntryFlags, PageFlush};
use entry::PageEntry;

use crate::{
    error::{Error, Result},
    frame::{Frame, FrameAllocator},
};

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// First address past the user range; the kernel half begins here. Growth
/// reaching it is rejected.
pub const USER_END: usize = 0x8000_0000;

const DIR_ENTRIES: usize = 1024;
const TABLE_ENTRIES: usize = 1024;

pub fn round_up_pages(value: usize) -> usize {
    (value + PAGE_MASK) & !PAGE_MASK
}

pub fn round_down_pages(value: usize) -> usize {
    value & !PAGE_MASK
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    pub const fn new(data: usize) -> VirtualAddress {
        VirtualAddress(data)
    }

    pub fn data(self) -> usize {
        self.0
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[addr {:#x}]", self.0)
    }
}

/// One page-aligned unit of the user address range.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Page {
    number: usize,
}

impl Page {
    pub fn containing_address(address: VirtualAddress) -> Page {
        Page {
            number: address.data() / PAGE_SIZE,
        }
    }

    pub fn start_address(self) -> VirtualAddress {
        VirtualAddress::new(self.number * PAGE_SIZE)
    }

    pub fn next(self) -> Page {
        Page {
            number: self.number + 1,
        }
    }

    fn from_number(number: usize) -> Page {
        Page { number }
    }

    fn dir_index(self) -> usize {
        self.number / TABLE_ENTRIES
    }

    fn table_index(self) -> usize {
        self.number % TABLE_ENTRIES
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[page at {:#x}]", self.number * PAGE_SIZE)
    }
}

struct PageTable {
    entries: Vec<PageEntry>,
}

impl PageTable {
    fn new() -> PageTable {
        PageTable {
            entries: (0..TABLE_ENTRIES).map(|_| PageEntry::EMPTY).collect(),
        }
    }
}

/// A process's private translation structure plus its current size.
///
/// Owns every frame currently mapped into it. Exclusively owned per
/// process; the caller serializes access.
pub struct AddressSpace {
    dir: Vec<Option<Box<PageTable>>>,
    size: usize,
    tlb_generation: u64,
}

impl AddressSpace {
    pub fn new() -> AddressSpace {
        AddressSpace {
            dir: (0..DIR_ENTRIES).map(|_| None).collect(),
            size: 0,
            tlb_generation: 0,
        }
    }

    /// Current user size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// Invalidation count of the translation cache. Diagnostic only.
    pub fn tlb_generation(&self) -> u64 {
        self.tlb_generation
    }

    fn walk(dir: &[Option<Box<PageTable>>], page: Page) -> Option<&PageEntry> {
        let entry = dir.get(page.dir_index())?.as_ref()?.entries.get(page.table_index())?;
        if entry.is_unused() { None } else { Some(entry) }
    }

    fn walk_mut(dir: &mut [Option<Box<PageTable>>], page: Page) -> Option<&mut PageEntry> {
        let entry = dir
            .get_mut(page.dir_index())?
            .as_mut()?
            .entries
            .get_mut(page.table_index())?;
        if entry.is_unused() { None } else { Some(entry) }
    }

    /// Walk to the entry for `page`, creating the second-level table on the
    /// way if needed.
    fn walk_alloc(dir: &mut Vec<Option<Box<PageTable>>>, page: Page) -> &mut PageEntry {
        let slot = dir
            .get_mut(page.dir_index())
            .unwrap_or_else(|| panic!("{:?} outside the translated range", page));
        let table = slot.get_or_insert_with(|| Box::new(PageTable::new()));
        &mut table.entries[page.table_index()]
    }

    /// Map `page` to `frame`. `PRESENT` is set implicitly. Panics if the
    /// entry is already in use.
    pub fn map(&mut self, page: Page, frame: Frame, flags: EntryFlags) -> PageFlush<'_> {
        let entry = Self::walk_alloc(&mut self.dir, page);
        if !entry.is_unused() {
            panic!("remap of {:?}: {:?}", page, entry);
        }
        entry.flags = flags | EntryFlags::PRESENT;
        entry.frame = Some(frame);
        PageFlush {
            generation: &mut self.tlb_generation,
        }
    }

    /// Tear down a present mapping entirely, handing the frame back to the
    /// caller. Panics if `page` is not mapped present.
    pub fn unmap(&mut self, page: Page) -> (Frame, PageFlush<'_>) {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("unmap of unmapped {:?}", page));
        if !entry.flags.contains(EntryFlags::PRESENT) {
            panic!("unmap of non-present {:?}", page);
        }
        let frame = entry
            .frame
            .take()
            .unwrap_or_else(|| panic!("present entry without frame at {:?}", page));
        entry.flags = EntryFlags::empty();
        (
            frame,
            PageFlush {
                generation: &mut self.tlb_generation,
            },
        )
    }

    /// Page-out transition on the entry: clear `PRESENT` and `ACCESSED`,
    /// set `SWAPPED`, detach the frame. The entry itself survives so its
    /// remaining attributes keep describing the page.
    pub fn detach_frame(&mut self, page: Page) -> (Frame, PageFlush<'_>) {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("detach from unmapped {:?}", page));
        if !entry.flags.contains(EntryFlags::PRESENT) {
            panic!("detach from non-present {:?}", page);
        }
        let frame = entry
            .frame
            .take()
            .unwrap_or_else(|| panic!("present entry without frame at {:?}", page));
        entry.flags.remove(EntryFlags::PRESENT | EntryFlags::ACCESSED);
        entry.flags.insert(EntryFlags::SWAPPED);
        (
            frame,
            PageFlush {
                generation: &mut self.tlb_generation,
            },
        )
    }

    /// Page-in step: attach a frame to a swapped entry with `PRESENT` still
    /// clear, so the page is never observable as mapped before its content
    /// arrives.
    pub fn attach_frame(&mut self, page: Page, frame: Frame) {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("attach to unmapped {:?}", page));
        if !entry.flags.contains(EntryFlags::SWAPPED)
            || entry.flags.contains(EntryFlags::PRESENT)
            || entry.frame.is_some()
        {
            panic!("attach to {:?} in state {:?}", page, entry);
        }
        entry.frame = Some(frame);
    }

    /// Page-in completion: clear `SWAPPED`, set `PRESENT`.
    pub fn mark_present(&mut self, page: Page) -> PageFlush<'_> {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("mark_present on unmapped {:?}", page));
        if entry.frame.is_none() {
            panic!("mark_present on {:?} without frame", page);
        }
        entry.flags.remove(EntryFlags::SWAPPED);
        entry.flags.insert(EntryFlags::PRESENT);
        PageFlush {
            generation: &mut self.tlb_generation,
        }
    }

    /// Drop a swapped entry (no present flip, no frame). Panics if a frame
    /// is still attached.
    pub fn clear_entry(&mut self, page: Page) {
        if let Some(entry) = Self::walk_mut(&mut self.dir, page) {
            if entry.frame.is_some() {
                panic!("clear_entry on {:?} with frame attached", page);
            }
            entry.flags = EntryFlags::empty();
        }
    }

    /// Resolve a present page to its frame.
    pub fn translate(&self, page: Page) -> Option<&Frame> {
        let entry = Self::walk(&self.dir, page)?;
        if entry.flags.contains(EntryFlags::PRESENT) {
            entry.frame.as_ref()
        } else {
            None
        }
    }

    /// Mutable access to the frame attached to `page`, present or mid
    /// transition.
    pub fn frame_mut(&mut self, page: Page) -> Option<&mut Frame> {
        Self::walk_mut(&mut self.dir, page)?.frame.as_mut()
    }

    pub fn set_flag(&mut self, page: Page, flags: EntryFlags) {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("set_flag on unmapped {:?}", page));
        entry.flags.insert(flags);
    }

    pub fn clear_flag(&mut self, page: Page, flags: EntryFlags) {
        let entry = Self::walk_mut(&mut self.dir, page)
            .unwrap_or_else(|| panic!("clear_flag on unmapped {:?}", page));
        entry.flags.remove(flags);
    }

    /// Query a flag; an unused entry has no flags.
    pub fn test_flag(&self, page: Page, flags: EntryFlags) -> bool {
        Self::walk(&self.dir, page).is_some_and(|entry| entry.flags.contains(flags))
    }

    pub fn entry_flags(&self, page: Page) -> Option<EntryFlags> {
        Self::walk(&self.dir, page).map(|entry| entry.flags)
    }

    /// Fork duplication: every present page gets a fresh frame with a
    /// byte-for-byte copy under identical flags; swapped entries carry
    /// their flags over (content follows via the swap-area stream copy).
    /// Rolls the child back and fails on frame exhaustion.
    pub fn duplicate(&self, allocator: &FrameAllocator) -> Result<AddressSpace> {
        let mut child = AddressSpace::new();
        child.size = self.size;
        for (dir_index, table) in self.dir.iter().enumerate() {
            let Some(table) = table else { continue };
            for (table_index, entry) in table.entries.iter().enumerate() {
                if entry.is_unused() {
                    continue;
                }
                let page = Page::from_number(dir_index * TABLE_ENTRIES + table_index);
                if entry.flags.contains(EntryFlags::PRESENT) {
                    let source = entry
                        .frame
                        .as_ref()
                        .unwrap_or_else(|| panic!("present entry without frame at {:?}", page));
                    let Some(mut frame) = allocator.allocate() else {
                        child.release_frames(allocator);
                        return Err(Error::OutOfFrames);
                    };
                    frame.bytes_mut().copy_from_slice(source.bytes());
                    let child_entry = Self::walk_alloc(&mut child.dir, page);
                    child_entry.flags = entry.flags;
                    child_entry.frame = Some(frame);
                } else {
                    let child_entry = Self::walk_alloc(&mut child.dir, page);
                    child_entry.flags = entry.flags;
                }
            }
        }
        Ok(child)
    }

    /// Return every owned frame to the pool and drop all tables. Exit and
    /// exec teardown.
    pub fn release_frames(&mut self, allocator: &FrameAllocator) {
        for slot in self.dir.iter_mut() {
            let Some(table) = slot.take() else { continue };
            for entry in table.entries {
                if let Some(frame) = entry.frame {
                    allocator.free(frame);
                }
            }
        }
        self.size = 0;
        self.tlb_generation = self.tlb_generation.wrapping_add(1);
    }
}
