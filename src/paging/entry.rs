//! Page table entry definitions.

use core::fmt;

use bitflags::bitflags;

use crate::frame::Frame;

bitflags! {
    /// Page table entry flags.
    ///
    /// `SWAPPED` marks an entry whose content lives in the swap area; it is
    /// mutually exclusive with `PRESENT` outside the window of a paging
    /// transition.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        /// Content is resident in the attached frame.
        const PRESENT = 1 << 0;
        /// Writable by the owning process.
        const WRITABLE = 1 << 1;
        /// Accessible from user mode.
        const USER = 1 << 2;
        /// Set by the hardware-access analog on every user access; consumed
        /// by the aging sweep and second-chance rotation.
        const ACCESSED = 1 << 5;
        /// Content relocated to the swap area.
        const SWAPPED = 1 << 9;
    }
}

/// One page table entry: flags plus the owned frame while one is attached.
pub(super) struct PageEntry {
    pub(super) flags: EntryFlags,
    pub(super) frame: Option<Frame>,
}

impl PageEntry {
    pub(super) const EMPTY: PageEntry = PageEntry {
        flags: EntryFlags::empty(),
        frame: None,
    };

    pub(super) fn is_unused(&self) -> bool {
        self.flags.is_empty() && self.frame.is_none()
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[entry {:?}, {}]",
            self.flags,
            if self.frame.is_some() {
                "frame attached"
            } else {
                "no frame"
            }
        )
    }
}

/// Pending translation-cache invalidation for one address space.
///
/// Returned by every operation that flips a `PRESENT` bit; must be consumed
/// with [`PageFlush::flush`] before the affected frame may be reused.
#[must_use = "translation cache invalidation must be flushed"]
pub struct PageFlush<'a> {
    pub(super) generation: &'a mut u64,
}

impl PageFlush<'_> {
    /// Perform the invalidation.
    pub fn flush(self) {
        *self.generation = self.generation.wrapping_add(1);
    }
}
