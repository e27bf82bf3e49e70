//! A segmented double-ended queue and a FIFO queue adapter, using the _allocated_ pattern for
//! explicit allocator control.
//!
//! [`Deque`] stores its elements in fixed-size buffers reached through a central map of
//! buffer pointers. This gives:
//!
//! - O(1) amortized push and pop at both ends, without ever moving existing elements
//! - O(1) random access by index
//! - insertion and erasure in the middle that shift only the shorter side
//! - memory released buffer by buffer as the deque shrinks
//!
//! [`Queue`] restricts any [`FifoSequence`] (by default a [`Deque`]) to first-in, first-out
//! use.
//!
//! # Quick Start
//!
//! ```
//! use allocated_deque::Deque;
//!
//! let mut deque = Deque::new();
//! deque.push_back(2)?;
//! deque.push_back(3)?;
//! deque.push_front(1)?;
//!
//! assert_eq!(deque.iter().copied().collect::<Vec<_>>(), [1, 2, 3]);
//! assert_eq!(deque.pop_front(), Some(1));
//! # Ok::<(), allocated_deque::DequeError>(())
//! ```
//!
//! # The Allocated Pattern
//!
//! As with the other `allocated` collections, there are two types:
//!
//! - [`Deque<T, A>`] owns its allocator and has a safe API. Use this one.
//! - [`AllocatedDeque<T>`] is the low-level form: it holds no allocator, so every operation that
//!   may allocate takes one and is `unsafe`. Use it to embed a deque in another allocated
//!   structure.
//!
//! ```
//! use allocated::CountingAllocator;
//! use allocated_deque::AllocatedDeque;
//!
//! let alloc = CountingAllocator::default();
//! let mut deque = AllocatedDeque::<String>::new_in(&alloc)?;
//!
//! unsafe {
//!     deque.push_back_in(&alloc, "one".to_string())?;
//! }
//!
//! // Track memory usage
//! println!("Allocations: {}", alloc.n_allocations());
//! # Ok::<(), allocated_deque::DequeError>(())
//! ```
//!
//! # Errors
//!
//! Every operation that may allocate returns a [`DequeResult`]. On failure the container is left
//! exactly as it was before the call. The same holds if a user-supplied clone or iterator panics
//! in the middle of a bulk insertion.
//!
//! See `demos/count-allocations.rs` for a walk through how many allocations each operation
//! costs.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

/// The segmented deque.
///
/// This module provides [`deque::AllocatedDeque`] and its wrapper [`deque::Deque`], along with
/// their cursors and iterators.
pub mod deque;
pub mod error;
pub mod queue;

pub use deque::buffer::{buffer_capacity, BUFFER_TARGET_BYTES, INITIAL_MAP_SIZE};
pub use deque::{AllocatedDeque, Cursor, CursorMut, Deque, IntoIter, Iter, IterMut};
pub use error::{DequeError, DequeResult, DequeResultExt};
pub use queue::{FifoSequence, Queue};
