//! Errors reported by the deque and the queue adapter.

use allocator_api2::alloc::Layout;

/// The error type for fallible deque operations.
///
/// Allocation failures are reported after every partially completed step of the
/// failing operation has been undone, so the container is left as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DequeError {
    /// The allocator refused a request for a buffer or for the map array.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocFailed { layout: Layout },

    /// The requested number of elements or map slots cannot be represented.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// A checked access was made past the end of the deque.
    #[error("index {index} out of range for deque of length {len}")]
    OutOfRange { index: usize, len: usize },
}

impl DequeError {
    /// Returns `true` if this error came from the allocator.
    pub fn is_alloc_error(&self) -> bool {
        matches!(self, Self::AllocFailed { .. } | Self::CapacityOverflow)
    }
}

/// Result alias used throughout the crate.
pub type DequeResult<T> = Result<T, DequeError>;

/// Turns allocation errors into the global allocation-error handler.
///
/// Used by the convenience APIs that cannot report failure (`new`, `Clone`,
/// `FromIterator`, `Extend`).
pub trait DequeResultExt<T> {
    /// Unwraps the value, diverging through [`alloc::alloc::handle_alloc_error`] on
    /// allocation failure and panicking on any other error.
    fn handle_alloc_error(self) -> T;
}

impl<T> DequeResultExt<T> for DequeResult<T> {
    #[inline]
    fn handle_alloc_error(self) -> T {
        match self {
            Ok(value) => value,
            Err(DequeError::AllocFailed { layout }) => alloc::alloc::handle_alloc_error(layout),
            Err(err) => panic!("{err}"),
        }
    }
}
