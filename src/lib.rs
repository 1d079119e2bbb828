//! # User virtual memory core
//!
//! Demand paging for per-process user address spaces: a shared physical
//! frame pool, software page tables, bounded per-process paging metadata, a
//! fixed-slot swap area over an external backing store, and pluggable
//! replacement policies.
//!
//! The one structure shared across processes is the frame pool; everything
//! else is exclusively owned per process and serialized by the caller.

#![cfg_attr(not(test), no_std)]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![allow(clippy::new_without_default)]

extern crate alloc;

pub mod error;
pub mod frame;
pub mod meta;
pub mod paging;
pub mod policy;
pub mod process;
pub mod swap;

pub use crate::{
    error::{Error, Result},
    frame::{BootstrapAllocator, FREED_PATTERN, Frame, FrameAllocator},
    meta::{PageRecord, PagingMetadata, Residency},
    paging::{
        AddressSpace, EntryFlags, PAGE_MASK, PAGE_SIZE, Page, USER_END, VirtualAddress,
    },
    policy::{AccessedQueue, Lapa, NfuAging, ReplacementPolicy, SecondChanceFifo},
    process::{Limits, MAX_PSYC_PAGES, MAX_TOTAL_PAGES, ProcessVm},
    swap::{BackingStore, HeapStore, SwapStore},
};
