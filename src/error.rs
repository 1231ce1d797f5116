//! Error types for fallible table operations.
//!
//! The only failures intrinsic to the table are running out of memory while
//! provisioning storage and sizing arithmetic overflowing `usize`.

use core::alloc::Layout;

use thiserror::Error;

/// Result type alias for fallible table operations.
pub type Result<T> = core::result::Result<T, TableError>;

/// Error returned by the `try_*` family of [`HashTable`] operations.
///
/// When one of these is returned from an insertion, the table is left exactly
/// as it was before the call.
///
/// [`HashTable`]: crate::HashTable
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The allocator could not satisfy a storage request.
    #[error("memory allocation of {} bytes failed", layout.size())]
    AllocFailed {
        /// Layout of the request that failed.
        layout: Layout,
    },

    /// The requested capacity does not fit in the address space.
    #[error("capacity overflow")]
    CapacityOverflow,
}

/// Error reported by a [`RawAllocator`] that cannot satisfy a request.
///
/// [`RawAllocator`]: crate::raw::RawAllocator
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("allocator returned no memory")]
pub struct AllocError;

impl TableError {
    /// Diverges the way `alloc` collections do for infallible entry points.
    #[cold]
    #[inline(never)]
    pub(crate) fn handle(self) -> ! {
        match self {
            TableError::AllocFailed { layout } => alloc::alloc::handle_alloc_error(layout),
            TableError::CapacityOverflow => panic!("capacity overflow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        let layout = Layout::array::<u64>(4).unwrap();
        assert_eq!(
            TableError::AllocFailed { layout }.to_string(),
            "memory allocation of 32 bytes failed"
        );
        assert_eq!(TableError::CapacityOverflow.to_string(), "capacity overflow");
        assert_eq!(AllocError.to_string(), "allocator returned no memory");
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn capacity_overflow_panics() {
        TableError::CapacityOverflow.handle();
    }
}
