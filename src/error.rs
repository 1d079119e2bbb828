//! Recoverable paging errors.
//!
//! Only conditions a caller can roll back from are represented here.
//! Contract breaches (remapping a present entry, inserting a duplicate
//! metadata record, selecting a victim when nothing is evictable) are
//! panics, never variants.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The shared physical frame pool is exhausted.
    OutOfFrames,
    /// No free slot remains in the process's swap area.
    SwapFull,
    /// The paging metadata table has no free record slot. Callers treat
    /// this like an ordinary allocation failure.
    TableFull,
    /// Growth would cross the user/kernel boundary.
    TooLarge,
    /// Access to a page that is neither resident nor swapped.
    Segv,
    /// The backing store failed to service a read or write.
    Store,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfFrames => write!(f, "out of physical frames"),
            Error::SwapFull => write!(f, "swap area full"),
            Error::TableFull => write!(f, "paging metadata table full"),
            Error::TooLarge => write!(f, "address space too large"),
            Error::Segv => write!(f, "invalid user access"),
            Error::Store => write!(f, "backing store I/O failure"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
