//! Per-process virtual memory orchestration.
//!
//! Ties the pieces together for one process: its address space, paging
//! metadata, swap area and replacement policy, sharing only the frame pool
//! with everyone else. All the demand-paging protocols live here: growth
//! and shrink of the user image, page-out and page-in, fault handling, and
//! the whole-image operations fork, exec and exit.

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use log::{debug, warn};

use crate::{
    error::{Error, Result},
    frame::FrameAllocator,
    meta::{PagingMetadata, Residency},
    paging::{
        AddressSpace, EntryFlags, PAGE_MASK, PAGE_SIZE, Page, USER_END, VirtualAddress,
        round_up_pages,
    },
    policy::ReplacementPolicy,
    swap::{BackingStore, SwapStore},
};

/// Most pages one process may hold across memory and swap.
pub const MAX_TOTAL_PAGES: usize = 32;

/// Most pages one process may keep resident at once.
pub const MAX_PSYC_PAGES: usize = 16;

/// Per-process paging limits. The swap area is sized so that every
/// non-resident page always has a slot: `total_pages` bounds both together.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub total_pages: usize,
    pub resident_pages: usize,
}

impl Limits {
    pub fn new(total_pages: usize, resident_pages: usize) -> Limits {
        assert!(
            resident_pages > 0 && resident_pages <= total_pages,
            "resident limit {} incompatible with total limit {}",
            resident_pages,
            total_pages
        );
        Limits {
            total_pages,
            resident_pages,
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits::new(MAX_TOTAL_PAGES, MAX_PSYC_PAGES)
    }
}

/// One process's virtual memory: address space, metadata, swap area and
/// policy. Exclusively owned; the caller serializes access, as with the
/// rest of the per-process state.
pub struct ProcessVm<S: BackingStore> {
    space: AddressSpace,
    meta: PagingMetadata,
    swap: SwapStore<S>,
    policy: Box<dyn ReplacementPolicy>,
    frames: Arc<FrameAllocator>,
    limits: Limits,
}

impl<S: BackingStore> ProcessVm<S> {
    pub fn new(
        store: S,
        frames: Arc<FrameAllocator>,
        policy: Box<dyn ReplacementPolicy>,
        limits: Limits,
    ) -> ProcessVm<S> {
        ProcessVm {
            space: AddressSpace::new(),
            meta: PagingMetadata::new(limits.total_pages),
            swap: SwapStore::new(store, limits.total_pages),
            policy,
            frames,
            limits,
        }
    }

    pub fn size(&self) -> usize {
        self.space.size()
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn resident_count(&self) -> usize {
        self.meta.resident_count()
    }

    pub fn swapped_count(&self) -> usize {
        self.meta.swapped_count()
    }

    pub fn page_count(&self) -> usize {
        self.meta.page_count()
    }

    pub fn swap_slots_taken(&self) -> usize {
        self.swap.taken_count()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.free_count()
    }

    pub fn tlb_generation(&self) -> u64 {
        self.space.tlb_generation()
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Swap the replacement strategy. Per-page policy state lives in the
    /// metadata and carries over.
    pub fn set_policy(&mut self, policy: Box<dyn ReplacementPolicy>) {
        self.policy = policy;
    }

    /// Periodic policy tick, driven by the caller's timer.
    pub fn tick(&mut self) {
        self.policy.tick(&mut self.meta, &mut self.space);
    }

    /// Grow the user image from `old_size` to `new_size`, mapping zeroed
    /// writable user pages over the new range and evicting as needed to
    /// respect the resident limit. All or nothing: on failure every page
    /// this call created is released again and the size is untouched.
    pub fn grow(&mut self, old_size: usize, new_size: usize) -> Result<usize> {
        if new_size >= USER_END {
            return Err(Error::TooLarge);
        }
        if new_size < old_size {
            return Ok(old_size);
        }
        let mut added: Vec<Page> = Vec::new();
        let mut addr = round_up_pages(old_size);
        while addr < new_size {
            let page = Page::containing_address(VirtualAddress::new(addr));
            if let Err(err) = self.map_new_page(page) {
                warn!("grow to {:#x} failed at {:?}: {}", new_size, page, err);
                for page in added {
                    self.release_page(page);
                }
                return Err(err);
            }
            added.push(page);
            addr += PAGE_SIZE;
        }
        self.space.set_size(new_size);
        Ok(new_size)
    }

    /// Shrink the user image, releasing every page past `new_size` wherever
    /// it currently lives.
    pub fn shrink(&mut self, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }
        let mut addr = round_up_pages(new_size);
        while addr < old_size {
            self.release_page(Page::containing_address(VirtualAddress::new(addr)));
            addr += PAGE_SIZE;
        }
        self.space.set_size(new_size);
        new_size
    }

    /// Move a resident page out to the swap area. The slot is claimed and
    /// written before the mapping changes, so a store failure leaves the
    /// page resident and untouched.
    pub fn page_out(&mut self, page: Page) -> Result<()> {
        let offset = self.swap.allocate_slot()?;
        {
            let frame = self
                .space
                .translate(page)
                .unwrap_or_else(|| panic!("page_out of non-resident {:?}", page));
            if let Err(err) = self.swap.write_slot(offset, frame.bytes()) {
                self.swap.free_slot(offset);
                return Err(err);
            }
        }
        let (frame, flush) = self.space.detach_frame(page);
        flush.flush();
        self.frames.free(frame);
        self.meta.mark_swapped(page, offset);
        debug!("paged out {:?} to swap offset {:#x}", page, offset);
        Ok(())
    }

    /// Bring a swapped page back into a frame. Evicts first if the process
    /// is at its resident limit; the swap slot is only released once the
    /// page is present again.
    pub fn page_in(&mut self, page: Page) -> Result<()> {
        let record = self
            .meta
            .record(page)
            .unwrap_or_else(|| panic!("page_in of untracked {:?}", page));
        let Residency::Swapped { offset } = record.residency else {
            panic!("page_in of resident {:?}", page);
        };
        if self.meta.resident_count() >= self.limits.resident_pages {
            self.evict_one()?;
        }
        let mut frame = self.frames.allocate().ok_or(Error::OutOfFrames)?;
        if let Err(err) = self.swap.read_slot(offset, frame.bytes_mut()) {
            self.frames.free(frame);
            return Err(err);
        }
        self.space.attach_frame(page, frame);
        self.space.mark_present(page).flush();
        let recorded = self.meta.mark_resident(page);
        debug_assert_eq!(recorded, offset);
        self.swap.free_slot(offset);
        debug!("paged in {:?} from swap offset {:#x}", page, offset);
        Ok(())
    }

    /// Page-fault entry point. A fault on a swapped page triggers page-in;
    /// a fault on a page that is already present is benign (a stale
    /// translation raced the fault); anything else is a segmentation
    /// violation for the caller to punish.
    pub fn handle_fault(&mut self, address: VirtualAddress) -> Result<()> {
        let page = Page::containing_address(address);
        if self.space.test_flag(page, EntryFlags::PRESENT) {
            return Ok(());
        }
        if self.space.test_flag(page, EntryFlags::SWAPPED) {
            return self.page_in(page);
        }
        Err(Error::Segv)
    }

    /// Copy bytes out of the user image, paging in as needed. Checked like
    /// a user-mode read: every touched page must be user-accessible.
    pub fn read_bytes(&mut self, address: VirtualAddress, buf: &mut [u8]) -> Result<()> {
        let mut addr = address.data();
        let mut done = 0;
        while done < buf.len() {
            let page = Page::containing_address(VirtualAddress::new(addr));
            self.ensure_resident(page, false)?;
            let offset = addr & PAGE_MASK;
            let take = (PAGE_SIZE - offset).min(buf.len() - done);
            let frame = self.space.translate(page).ok_or(Error::Segv)?;
            buf[done..done + take].copy_from_slice(&frame.bytes()[offset..offset + take]);
            self.space.set_flag(page, EntryFlags::ACCESSED);
            done += take;
            addr += take;
        }
        Ok(())
    }

    /// Copy bytes into the user image, paging in as needed. Checked like a
    /// user-mode write: every touched page must be user-accessible and
    /// writable.
    pub fn write_bytes(&mut self, address: VirtualAddress, buf: &[u8]) -> Result<()> {
        let mut addr = address.data();
        let mut done = 0;
        while done < buf.len() {
            let page = Page::containing_address(VirtualAddress::new(addr));
            self.ensure_resident(page, true)?;
            let offset = addr & PAGE_MASK;
            let take = (PAGE_SIZE - offset).min(buf.len() - done);
            let frame = self.space.frame_mut(page).ok_or(Error::Segv)?;
            frame.bytes_mut()[offset..offset + take].copy_from_slice(&buf[done..done + take]);
            self.space.set_flag(page, EntryFlags::ACCESSED);
            done += take;
            addr += take;
        }
        Ok(())
    }

    /// Duplicate this image for a child process: a fresh copy of every
    /// present frame, a verbatim copy of the swap area and metadata, and a
    /// fresh instance of the same policy. `child_store` backs the child's
    /// swap area.
    pub fn fork(&mut self, child_store: S) -> Result<ProcessVm<S>> {
        let mut space = self.space.duplicate(&self.frames)?;
        let mut swap = SwapStore::new(child_store, self.limits.total_pages);
        if let Err(err) = swap.copy_from(&mut self.swap) {
            space.release_frames(&self.frames);
            return Err(err);
        }
        Ok(ProcessVm {
            space,
            meta: self.meta.clone(),
            swap,
            policy: self.policy.duplicate(),
            frames: Arc::clone(&self.frames),
            limits: self.limits,
        })
    }

    /// Replace the image: tear the old one down entirely, then build a
    /// fresh zeroed image of `new_size` bytes.
    pub fn exec(&mut self, new_size: usize) -> Result<usize> {
        self.teardown();
        self.grow(0, new_size)
    }

    /// Release everything at process exit.
    pub fn exit(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.space.release_frames(&self.frames);
        self.swap.clear();
        self.meta.clear();
    }

    fn evict_one(&mut self) -> Result<()> {
        let victim = self.policy.select_victim(&mut self.meta, &mut self.space);
        self.page_out(victim)
    }

    fn make_room(&mut self) -> Result<()> {
        while self.meta.resident_count() >= self.limits.resident_pages {
            self.evict_one()?;
        }
        Ok(())
    }

    fn map_new_page(&mut self, page: Page) -> Result<()> {
        self.make_room()?;
        let mut frame = self.frames.allocate().ok_or(Error::OutOfFrames)?;
        frame.zero();
        if let Err(err) = self.meta.add_page(page) {
            self.frames.free(frame);
            return Err(err);
        }
        self.space
            .map(page, frame, EntryFlags::WRITABLE | EntryFlags::USER)
            .flush();
        Ok(())
    }

    /// Release one tracked page wherever it currently lives. Shrink and
    /// grow-rollback both land here, since a page created earlier in a grow
    /// may already have been evicted by a later step of the same grow.
    fn release_page(&mut self, page: Page) {
        let Some(record) = self.meta.remove(page) else {
            return;
        };
        match record.residency {
            Residency::Resident => {
                let (frame, flush) = self.space.unmap(page);
                flush.flush();
                self.frames.free(frame);
            }
            Residency::Swapped { offset } => {
                self.swap.free_slot(offset);
                self.space.clear_entry(page);
            }
        }
    }

    /// Make `page` present and check access rights, as a user-mode access
    /// would: the page must be user-accessible, and writable for a write.
    fn ensure_resident(&mut self, page: Page, write: bool) -> Result<()> {
        if !self.space.test_flag(page, EntryFlags::PRESENT) {
            if !self.space.test_flag(page, EntryFlags::SWAPPED) {
                return Err(Error::Segv);
            }
            self.page_in(page)?;
        }
        let flags = self.space.entry_flags(page).ok_or(Error::Segv)?;
        if !flags.contains(EntryFlags::USER) {
            return Err(Error::Segv);
        }
        if write && !flags.contains(EntryFlags::WRITABLE) {
            return Err(Error::Segv);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::BootstrapAllocator,
        policy::{Lapa, NfuAging, SecondChanceFifo},
        swap::HeapStore,
    };

    fn page(index: usize) -> Page {
        Page::containing_address(VirtualAddress::new(index * PAGE_SIZE))
    }

    fn setup(
        frames: usize,
        limits: Limits,
        policy: Box<dyn ReplacementPolicy>,
    ) -> ProcessVm<HeapStore> {
        let allocator = Arc::new(BootstrapAllocator::new().finish(frames));
        ProcessVm::new(HeapStore::new(), allocator, policy, limits)
    }

    /// Stamp a recognizable pattern over one whole page.
    fn stamp(vm: &mut ProcessVm<HeapStore>, index: usize, byte: u8) {
        let content = [byte; PAGE_SIZE];
        vm.write_bytes(page(index).start_address(), &content).unwrap();
    }

    fn first_byte(vm: &mut ProcessVm<HeapStore>, index: usize) -> u8 {
        let mut buf = [0u8; 1];
        vm.read_bytes(page(index).start_address(), &mut buf).unwrap();
        buf[0]
    }

    #[test]
    fn test_grow_maps_zeroed_pages() {
        let mut vm = setup(8, Limits::default(), Box::new(SecondChanceFifo));
        assert_eq!(vm.grow(0, 3 * PAGE_SIZE).unwrap(), 3 * PAGE_SIZE);
        assert_eq!(vm.size(), 3 * PAGE_SIZE);
        assert_eq!(vm.resident_count(), 3);
        assert_eq!(vm.swapped_count(), 0);
        let mut buf = [0xFFu8; 64];
        vm.read_bytes(VirtualAddress::new(2 * PAGE_SIZE + 100), &mut buf)
            .unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_grow_past_resident_cap_evicts_exactly_the_excess() {
        let mut vm = setup(8, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 4 * PAGE_SIZE).unwrap();
        for i in 0..4 {
            stamp(&mut vm, i, 0x10 + i as u8);
        }

        vm.grow(4 * PAGE_SIZE, 6 * PAGE_SIZE).unwrap();
        assert_eq!(vm.resident_count(), 4);
        assert_eq!(vm.swapped_count(), 2);
        assert_eq!(vm.swap_slots_taken(), 2);
        // FIFO: the two oldest pages went out.
        assert!(vm.space.test_flag(page(0), EntryFlags::SWAPPED));
        assert!(vm.space.test_flag(page(1), EntryFlags::SWAPPED));

        // Their content survives the round trip through swap.
        assert_eq!(first_byte(&mut vm, 0), 0x10);
        assert_eq!(first_byte(&mut vm, 1), 0x11);
        assert_eq!(vm.resident_count(), 4);
    }

    #[test]
    fn test_grow_rejects_kernel_range() {
        let mut vm = setup(8, Limits::default(), Box::new(SecondChanceFifo));
        assert_eq!(vm.grow(0, USER_END), Err(Error::TooLarge));
        assert_eq!(vm.grow(0, USER_END + PAGE_SIZE), Err(Error::TooLarge));
        assert_eq!(vm.page_count(), 0);
    }

    #[test]
    fn test_grow_backwards_is_a_noop() {
        let mut vm = setup(8, Limits::default(), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        assert_eq!(vm.grow(2 * PAGE_SIZE, PAGE_SIZE).unwrap(), 2 * PAGE_SIZE);
        assert_eq!(vm.size(), 2 * PAGE_SIZE);
        assert_eq!(vm.page_count(), 2);
    }

    #[test]
    fn test_grow_rolls_back_on_table_full() {
        let mut vm = setup(8, Limits::new(4, 2), Box::new(SecondChanceFifo));
        let before = vm.free_frames();
        assert_eq!(vm.grow(0, 5 * PAGE_SIZE), Err(Error::TableFull));
        assert_eq!(vm.page_count(), 0);
        assert_eq!(vm.swap_slots_taken(), 0);
        assert_eq!(vm.free_frames(), before);
        assert_eq!(vm.size(), 0);
    }

    #[test]
    fn test_grow_rolls_back_on_frame_exhaustion() {
        let mut vm = setup(1, Limits::default(), Box::new(SecondChanceFifo));
        assert_eq!(vm.grow(0, 2 * PAGE_SIZE), Err(Error::OutOfFrames));
        assert_eq!(vm.page_count(), 0);
        assert_eq!(vm.free_frames(), 1);
    }

    #[test]
    fn test_shrink_releases_resident_and_swapped_pages() {
        let mut vm = setup(8, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 6 * PAGE_SIZE).unwrap();
        assert_eq!(vm.swapped_count(), 2);
        let free_before = vm.free_frames();

        assert_eq!(vm.shrink(6 * PAGE_SIZE, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(vm.size(), PAGE_SIZE);
        // Page 0 survives, and it was one of the two evicted earlier.
        assert_eq!(vm.page_count(), 1);
        assert_eq!(vm.resident_count(), 0);
        assert_eq!(vm.swap_slots_taken(), 1);
        // Four of the five removed pages held frames.
        assert_eq!(vm.free_frames(), free_before + 4);
        // It pages back in on demand.
        assert_eq!(first_byte(&mut vm, 0), 0);
    }

    #[test]
    fn test_page_roundtrip_preserves_content() {
        let mut vm = setup(4, Limits::default(), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        stamp(&mut vm, 1, 0xC3);
        let free_before = vm.free_frames();

        vm.page_out(page(1)).unwrap();
        assert_eq!(vm.free_frames(), free_before + 1);
        assert_eq!(vm.swap_slots_taken(), 1);
        assert!(vm.space.test_flag(page(1), EntryFlags::SWAPPED));
        assert!(!vm.space.test_flag(page(1), EntryFlags::PRESENT));

        vm.page_in(page(1)).unwrap();
        assert_eq!(vm.swap_slots_taken(), 0);
        assert_eq!(first_byte(&mut vm, 1), 0xC3);
    }

    #[test]
    fn test_page_out_on_full_swap_leaves_page_resident() {
        let mut vm = setup(8, Limits::new(4, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        stamp(&mut vm, 0, 0x77);
        // Exhaust the slot map out from under the process.
        while vm.swap.allocate_slot().is_ok() {}

        assert_eq!(vm.page_out(page(0)), Err(Error::SwapFull));
        assert_eq!(vm.resident_count(), 2);
        assert_eq!(first_byte(&mut vm, 0), 0x77);
    }

    #[test]
    fn test_handle_fault() {
        let mut vm = setup(8, Limits::new(8, 2), Box::new(SecondChanceFifo));
        vm.grow(0, 3 * PAGE_SIZE).unwrap();
        assert_eq!(vm.resident_count(), 2);

        // Oldest page went out; faulting on it brings it back.
        assert!(vm.space.test_flag(page(0), EntryFlags::SWAPPED));
        vm.handle_fault(VirtualAddress::new(123)).unwrap();
        assert!(vm.space.test_flag(page(0), EntryFlags::PRESENT));

        // Present page: benign.
        vm.handle_fault(page(0).start_address()).unwrap();

        // Untracked address: violation.
        assert_eq!(
            vm.handle_fault(VirtualAddress::new(0x100 * PAGE_SIZE)),
            Err(Error::Segv)
        );
    }

    #[test]
    fn test_guard_page_rejects_user_access() {
        let mut vm = setup(8, Limits::default(), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        vm.space.clear_flag(page(0), EntryFlags::USER);

        let mut buf = [0u8; 4];
        assert_eq!(
            vm.read_bytes(page(0).start_address(), &mut buf),
            Err(Error::Segv)
        );
        assert_eq!(
            vm.write_bytes(page(0).start_address(), &buf),
            Err(Error::Segv)
        );
        // The page after the guard stays reachable.
        vm.read_bytes(page(1).start_address(), &mut buf).unwrap();
    }

    #[test]
    fn test_write_spanning_pages() {
        let mut vm = setup(8, Limits::default(), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        let data = [0xABu8; 100];
        vm.write_bytes(VirtualAddress::new(PAGE_SIZE - 50), &data).unwrap();
        let mut back = [0u8; 100];
        vm.read_bytes(VirtualAddress::new(PAGE_SIZE - 50), &mut back).unwrap();
        assert_eq!(back[..], data[..]);
    }

    #[test]
    fn test_fork_duplicates_resident_and_swapped_pages() {
        let mut vm = setup(16, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 4 * PAGE_SIZE).unwrap();
        for i in 0..4 {
            stamp(&mut vm, i, 0x20 + i as u8);
        }
        vm.grow(4 * PAGE_SIZE, 6 * PAGE_SIZE).unwrap();
        stamp(&mut vm, 4, 0x24);
        stamp(&mut vm, 5, 0x25);

        let mut child = vm.fork(HeapStore::new()).unwrap();
        assert_eq!(child.page_count(), vm.page_count());
        assert_eq!(child.resident_count(), vm.resident_count());
        assert_eq!(child.swapped_count(), vm.swapped_count());
        assert_eq!(child.size(), vm.size());
        assert_eq!(child.policy_name(), vm.policy_name());

        // The child reads its own copy of a swapped page.
        assert!(child.space.test_flag(page(0), EntryFlags::SWAPPED));
        assert_eq!(first_byte(&mut child, 0), 0x20);

        // Child writes never reach the parent.
        stamp(&mut child, 2, 0xEE);
        assert_eq!(first_byte(&mut vm, 2), 0x22);
    }

    #[test]
    fn test_fork_rolls_back_on_frame_exhaustion() {
        let mut vm = setup(3, Limits::default(), Box::new(SecondChanceFifo));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        assert_eq!(vm.free_frames(), 1);

        assert!(matches!(vm.fork(HeapStore::new()), Err(Error::OutOfFrames)));
        assert_eq!(vm.free_frames(), 1);
        assert_eq!(vm.page_count(), 2);
    }

    #[test]
    fn test_exec_replaces_the_image() {
        let mut vm = setup(16, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 6 * PAGE_SIZE).unwrap();
        stamp(&mut vm, 3, 0x99);
        let total = vm.free_frames() + vm.resident_count();

        assert_eq!(vm.exec(3 * PAGE_SIZE).unwrap(), 3 * PAGE_SIZE);
        assert_eq!(vm.size(), 3 * PAGE_SIZE);
        assert_eq!(vm.page_count(), 3);
        assert_eq!(vm.swap_slots_taken(), 0);
        assert_eq!(vm.free_frames() + vm.resident_count(), total);
        // The new image starts zeroed.
        assert_eq!(first_byte(&mut vm, 1), 0);
    }

    #[test]
    fn test_exit_releases_everything() {
        let mut vm = setup(16, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 6 * PAGE_SIZE).unwrap();

        vm.exit();
        assert_eq!(vm.size(), 0);
        assert_eq!(vm.page_count(), 0);
        assert_eq!(vm.swap_slots_taken(), 0);
        assert_eq!(vm.free_frames(), 16);
    }

    #[test]
    fn test_tick_drives_the_aging_policy() {
        let mut vm = setup(8, Limits::new(8, 2), Box::new(NfuAging));
        vm.grow(0, 2 * PAGE_SIZE).unwrap();
        // Only the second page is touched before the sweep.
        assert_eq!(first_byte(&mut vm, 1), 0);
        vm.tick();

        vm.grow(2 * PAGE_SIZE, 3 * PAGE_SIZE).unwrap();
        assert!(vm.space.test_flag(page(0), EntryFlags::SWAPPED));
        assert!(vm.space.test_flag(page(1), EntryFlags::PRESENT));
    }

    #[test]
    fn test_set_policy_preserves_page_state() {
        let mut vm = setup(8, Limits::new(8, 4), Box::new(SecondChanceFifo));
        vm.grow(0, 3 * PAGE_SIZE).unwrap();
        vm.set_policy(Box::new(Lapa));
        assert_eq!(vm.policy_name(), "lapa");
        assert_eq!(vm.page_count(), 3);
        vm.grow(3 * PAGE_SIZE, 5 * PAGE_SIZE).unwrap();
        assert_eq!(vm.resident_count(), 4);
    }

    #[test]
    fn test_random_access_storm_respects_resident_cap() {
        const PAGES: usize = 8;
        let mut vm = setup(16, Limits::new(16, 4), Box::new(SecondChanceFifo));
        vm.grow(0, PAGES * PAGE_SIZE).unwrap();

        let mut shadow = vec![0u8; PAGES];
        let mut x: u64 = 1;
        for step in 0..200 {
            x = x
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let index = (x >> 33) as usize % PAGES;
            let value = step as u8;
            vm.write_bytes(page(index).start_address(), &[value]).unwrap();
            shadow[index] = value;
            assert!(vm.resident_count() <= 4);
            assert_eq!(vm.page_count(), PAGES);
        }
        for (index, &expected) in shadow.iter().enumerate() {
            assert_eq!(first_byte(&mut vm, index), expected);
        }
    }

    #[test]
    fn test_operations_advance_the_tlb_generation() {
        let mut vm = setup(8, Limits::new(8, 2), Box::new(SecondChanceFifo));
        let start = vm.tlb_generation();
        vm.grow(0, 3 * PAGE_SIZE).unwrap();
        // Three maps plus one eviction.
        assert!(vm.tlb_generation() >= start + 4);
    }
}
