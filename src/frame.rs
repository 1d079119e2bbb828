//! Physical frame pool.
//!
//! Frames are owned page-sized buffers: a frame mapped into an address
//! space is owned by that space's entry, and only returns to the pool when
//! explicitly freed. The pool is a LIFO stack behind a single spin lock,
//! shared by every process.
//!
//! Initialization is two-phase, mirroring early boot: a lock-free phase
//! seeds the pool from bootstrap-mapped memory (exclusivity stands in for
//! the missing lock), then the remainder of physical memory is added and
//! every later call goes through the lock.

use core::fmt;

use alloc::{boxed::Box, vec::Vec};
use spin::Mutex;

use crate::paging::PAGE_SIZE;

/// Byte written over a frame's content when it is freed, so dangling reads
/// surface as recognizable garbage instead of stale data.
pub const FREED_PATTERN: u8 = 0x01;

/// One physical page frame, owning its backing storage.
pub struct Frame {
    bytes: Box<[u8; PAGE_SIZE]>,
}

impl Frame {
    fn new_zeroed() -> Frame {
        Frame {
            bytes: Box::new([0u8; PAGE_SIZE]),
        }
    }

    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes
    }

    pub fn zero(&mut self) {
        self.bytes.fill(0);
    }

    fn fill_freed(&mut self) {
        self.bytes.fill(FREED_PATTERN);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[frame at {:p}]", self.bytes.as_ptr())
    }
}

/// Lock-free bootstrap phase of the frame pool.
///
/// Runs single-core before steady state; `finish` adds the rest of physical
/// memory and transitions to locked operation.
pub struct BootstrapAllocator {
    pool: Vec<Frame>,
}

impl BootstrapAllocator {
    pub fn new() -> BootstrapAllocator {
        BootstrapAllocator { pool: Vec::new() }
    }

    /// Phase one: seed `count` frames backed by bootstrap-mapped memory.
    pub fn seed(&mut self, count: usize) {
        self.pool.reserve(count);
        for _ in 0..count {
            self.pool.push(Frame::new_zeroed());
        }
    }

    /// Phase two: add `remaining` frames and switch to locked operation.
    pub fn finish(mut self, remaining: usize) -> FrameAllocator {
        self.seed(remaining);
        FrameAllocator {
            pool: Mutex::new(self.pool),
        }
    }
}

/// The shared physical frame allocator.
pub struct FrameAllocator {
    pool: Mutex<Vec<Frame>>,
}

impl FrameAllocator {
    /// Pop a frame from the pool. `None` is an ordinary out-of-memory
    /// condition: the caller rolls back whatever it built and reports
    /// failure.
    pub fn allocate(&self) -> Option<Frame> {
        self.pool.lock().pop()
    }

    /// Return a frame to the pool, overwriting its content first.
    pub fn free(&self, mut frame: Frame) {
        frame.fill_freed();
        self.pool.lock().push(frame);
    }

    /// Number of free frames. Diagnostic only.
    pub fn free_count(&self) -> usize {
        self.pool.lock().len()
    }
}
