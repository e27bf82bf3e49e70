//! Buffer sizing policy and the raw allocations backing the deque.
//!
//! A buffer is a fixed-capacity block of `BufferLen::<T>::LEN` uninitialised elements. The map
//! is an array of [`Slot`]s, each either empty or owning exactly one buffer.

use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Layout};

use crate::error::{DequeError, DequeResult};

/// The number of bytes each buffer aims to occupy.
pub const BUFFER_TARGET_BYTES: usize = 512;

/// Smallest number of slots a map is ever allocated with.
pub const INITIAL_MAP_SIZE: usize = 8;

/// One entry of the map. `None` marks a slot that owns no buffer.
pub(crate) type Slot<T> = Option<NonNull<T>>;

/// Returns how many elements of `element_size` bytes fit in one buffer.
///
/// Always at least 1, so elements larger than [`BUFFER_TARGET_BYTES`] get a buffer each.
///
/// ```
/// use allocated_deque::buffer_capacity;
///
/// assert_eq!(buffer_capacity(4), 128);
/// assert_eq!(buffer_capacity(24), 21);
/// assert_eq!(buffer_capacity(4096), 1);
/// ```
pub const fn buffer_capacity(element_size: usize) -> usize {
    if element_size == 0 {
        BUFFER_TARGET_BYTES
    } else if element_size < BUFFER_TARGET_BYTES {
        BUFFER_TARGET_BYTES / element_size
    } else {
        1
    }
}

/// Per-type buffer length, evaluated once per instantiation.
pub(crate) struct BufferLen<T>(PhantomData<T>);

impl<T> BufferLen<T> {
    pub(crate) const LEN: usize = {
        assert!(
            size_of::<T>() != 0,
            "zero-sized element types are not supported"
        );
        buffer_capacity(size_of::<T>())
    };

    pub(crate) const ILEN: isize = Self::LEN as isize;
}

pub(crate) fn buffer_layout<T>() -> DequeResult<Layout> {
    Layout::array::<T>(BufferLen::<T>::LEN).map_err(|_| DequeError::CapacityOverflow)
}

pub(crate) fn map_layout<T>(map_size: usize) -> DequeResult<Layout> {
    Layout::array::<Slot<T>>(map_size).map_err(|_| DequeError::CapacityOverflow)
}

/// Allocates one uninitialised buffer.
pub(crate) fn allocate_buffer<T, A: Allocator>(alloc: &A) -> DequeResult<NonNull<T>> {
    let layout = buffer_layout::<T>()?;
    let ptr = alloc
        .allocate(layout)
        .map_err(|_| DequeError::AllocFailed { layout })?;
    Ok(ptr.cast())
}

/// # Safety
///
/// `buffer` MUST have been returned by [`allocate_buffer`] with the same allocator, and every
/// element in it must already be dropped or moved out.
pub(crate) unsafe fn deallocate_buffer<T, A: Allocator>(alloc: &A, buffer: NonNull<T>) {
    // The layout was computed successfully when the buffer was allocated.
    if let Ok(layout) = buffer_layout::<T>() {
        // SAFETY: Caller guarantees `buffer` came from `alloc` with this layout.
        unsafe { alloc.deallocate(buffer.cast(), layout) };
    }
}

/// Allocates a map of `map_size` slots, all empty.
pub(crate) fn allocate_map<T, A: Allocator>(
    alloc: &A,
    map_size: usize,
) -> DequeResult<NonNull<Slot<T>>> {
    let layout = map_layout::<T>(map_size)?;
    let map: NonNull<Slot<T>> = alloc
        .allocate(layout)
        .map_err(|_| DequeError::AllocFailed { layout })?
        .cast();
    for i in 0..map_size {
        // SAFETY: `i < map_size` and the allocation holds `map_size` slots.
        unsafe { map.as_ptr().add(i).write(None) };
    }
    Ok(map)
}

/// # Safety
///
/// `map` MUST have been returned by [`allocate_map`] with the same allocator and `map_size`.
/// Buffers still referenced from its slots are not released.
pub(crate) unsafe fn deallocate_map<T, A: Allocator>(
    alloc: &A,
    map: NonNull<Slot<T>>,
    map_size: usize,
) {
    if let Ok(layout) = map_layout::<T>(map_size) {
        // SAFETY: Caller guarantees `map` came from `alloc` with this layout.
        unsafe { alloc.deallocate(map.cast(), layout) };
    }
}
