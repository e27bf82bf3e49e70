use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::mem::size_of;
use core::ptr::NonNull;

use allocated::DropGuard;
use allocated::DropIn;
use allocator_api2::alloc::Allocator;

use crate::error::{DequeError, DequeResult};

pub(crate) mod buffer;
mod cursor;
mod iters;
mod map;
mod modify;
mod wrapper;

#[cfg(test)]
mod tests;

use buffer::{deallocate_map, BufferLen, Slot};
use cursor::{drop_range, RawCursor};

pub use cursor::{Cursor, CursorMut};
pub use iters::{IntoIter, Iter, IterMut};
pub use wrapper::Deque;

/// A double-ended queue built from a map of fixed-size buffers, using the allocated pattern.
///
/// This is the low-level "allocated" type: it does not own an allocator, so every operation
/// that may allocate or free memory takes one and is `unsafe`, because the caller must always
/// pass the allocator the deque was created with. For most uses prefer the [`Deque`] wrapper,
/// which owns its allocator and exposes a safe API.
///
/// Elements live in buffers of [`Self::BUFFER_LEN`] elements. The map is an array of slots,
/// each owning at most one buffer; the live elements occupy a contiguous run of slots kept
/// roughly centred in the map so that both ends can grow without moving any element.
///
/// # Examples
///
/// ```
/// use allocated::CountingAllocator;
/// use allocated_deque::AllocatedDeque;
///
/// let alloc = CountingAllocator::default();
/// let mut deque = AllocatedDeque::<u32>::new_in(&alloc)?;
///
/// unsafe {
///     deque.push_back_in(&alloc, 2)?;
///     deque.push_front_in(&alloc, 1)?;
/// }
///
/// assert_eq!(deque.len(), 2);
/// assert_eq!(deque.front(), Some(&1));
/// # Ok::<(), allocated_deque::DequeError>(())
/// ```
pub struct AllocatedDeque<T> {
    front: RawCursor<T>,
    back: RawCursor<T>,
    map: NonNull<Slot<T>>,
    map_size: usize,
    map_reallocations: usize,
}

// SAFETY: The deque exclusively owns its map, buffers and elements.
unsafe impl<T: Send> Send for AllocatedDeque<T> {}
// SAFETY: Shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for AllocatedDeque<T> {}

impl<T> AllocatedDeque<T> {
    /// Number of elements stored in each buffer.
    pub const BUFFER_LEN: usize = BufferLen::<T>::LEN;

    /// Creates an empty deque. One buffer is allocated up front so both ends are valid.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails.
    pub fn new_in<A: Allocator>(alloc: &A) -> DequeResult<DropGuard<Self, &A>> {
        let deque = Self::initialize_map(alloc, 0)?;
        // SAFETY: `deque` was allocated by `alloc`.
        Ok(unsafe { DropGuard::new(deque, alloc) })
    }

    /// Creates a deque holding `n` clones of `value`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; nothing is leaked.
    pub fn from_elem_in<A: Allocator>(
        alloc: &A,
        n: usize,
        value: T,
    ) -> DequeResult<DropGuard<Self, &A>>
    where
        T: Clone,
    {
        let mut remaining = n;
        let mut value = Some(value);
        Self::fill_initialize(alloc, n, || {
            remaining = remaining.checked_sub(1)?;
            if remaining == 0 {
                value.take()
            } else {
                value.clone()
            }
        })
    }

    /// Creates a deque holding `n` default values.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; nothing is leaked.
    pub fn with_default_in<A: Allocator>(alloc: &A, n: usize) -> DequeResult<DropGuard<Self, &A>>
    where
        T: Default,
    {
        Self::fill_initialize(alloc, n, || Some(T::default()))
    }

    /// Creates a deque from the elements of `iter`, in order.
    ///
    /// The iterator's lower size hint is used to lay out the map in one go.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; nothing is leaked.
    pub fn from_iter_in<A: Allocator, I: IntoIterator<Item = T>>(
        alloc: &A,
        iter: I,
    ) -> DequeResult<DropGuard<Self, &A>> {
        let mut iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut deque = Self::fill_initialize(alloc, lower, || iter.next())?;
        for value in iter {
            // SAFETY: `deque` was allocated by `alloc`.
            unsafe { deque.push_back_in(alloc, value)? };
        }
        Ok(deque)
    }

    /// Creates a deep copy of this deque using `alloc`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; nothing is leaked.
    pub fn clone_in<'a, A: Allocator>(&self, alloc: &'a A) -> DequeResult<DropGuard<Self, &'a A>>
    where
        T: Clone,
    {
        let mut iter = self.iter();
        Self::fill_initialize(alloc, self.len(), || iter.next().cloned())
    }

    /// Lays out the map for `n` elements and writes them from `next` front to back.
    ///
    /// If `next` runs dry early the unused buffers are released again.
    fn fill_initialize<A: Allocator>(
        alloc: &A,
        n: usize,
        mut next: impl FnMut() -> Option<T>,
    ) -> DequeResult<DropGuard<Self, &A>> {
        let deque = Self::initialize_map(alloc, n)?;
        let end = deque.back;
        // SAFETY: `deque` was allocated by `alloc`.
        let mut deque = unsafe { DropGuard::new(deque, alloc) };
        deque.back = deque.front;
        while deque.back != end {
            let Some(value) = next() else {
                break;
            };
            // SAFETY: `back` is before `end`, inside a buffer allocated for this batch.
            unsafe {
                deque.back.cur.write(value);
                deque.back.advance_one();
            }
        }
        if deque.back != end {
            // SAFETY: The slots after `back` up to `end` hold buffers with no live elements.
            unsafe {
                Self::release_slots(
                    alloc,
                    deque.back.node.wrapping_add(1),
                    end.node.wrapping_add(1),
                );
            }
        }
        Ok(deque)
    }

    /// Returns the number of elements in the deque.
    #[inline]
    pub fn len(&self) -> usize {
        self.back.distance_from(&self.front) as usize
    }

    /// Returns `true` if the deque contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.front == self.back
    }

    /// Returns the largest number of elements a deque of `T` could ever hold.
    pub fn max_size(&self) -> usize {
        isize::MAX as usize / size_of::<T>()
    }

    /// Returns how many map slots are currently allocated.
    pub fn map_capacity(&self) -> usize {
        self.map_size
    }

    /// Returns how many times the map has been reallocated or recentred.
    ///
    /// Pushing `n` elements one at a time grows this logarithmically in `n`.
    pub fn map_reallocations(&self) -> usize {
        self.map_reallocations
    }

    /// Returns a reference to the element at `index`, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len() {
            // SAFETY: Bounds checked above.
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    /// Returns a mutable reference to the element at `index`, or `None` if out of bounds.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len() {
            // SAFETY: Bounds checked above.
            Some(unsafe { self.get_unchecked_mut(index) })
        } else {
            None
        }
    }

    /// Returns a reference to the element at `index` without bounds checking.
    ///
    /// # Safety
    ///
    /// `index` MUST be less than [`Self::len`].
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        // SAFETY: Caller guarantees `index < len`, so the position is live.
        unsafe { &*self.front.plus(index as isize).cur }
    }

    /// Returns a mutable reference to the element at `index` without bounds checking.
    ///
    /// # Safety
    ///
    /// `index` MUST be less than [`Self::len`].
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: Caller guarantees `index < len`, so the position is live.
        unsafe { &mut *self.front.plus(index as isize).cur }
    }

    /// Checked access to the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`] carrying the index and the length.
    pub fn at(&self, index: usize) -> DequeResult<&T> {
        let len = self.len();
        self.get(index).ok_or(DequeError::OutOfRange { index, len })
    }

    /// Checked mutable access to the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`] carrying the index and the length.
    pub fn at_mut(&mut self, index: usize) -> DequeResult<&mut T> {
        let len = self.len();
        self.get_mut(index).ok_or(DequeError::OutOfRange { index, len })
    }

    /// Returns the first element, or `None` if the deque is empty.
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: The deque is non-empty, so `front` is live.
        Some(unsafe { &*self.front.cur })
    }

    /// Returns the first element mutably, or `None` if the deque is empty.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: The deque is non-empty, so `front` is live.
        Some(unsafe { &mut *self.front.cur })
    }

    /// Returns the last element, or `None` if the deque is empty.
    pub fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: The deque is non-empty, so the position before `back` is live.
        Some(unsafe { &*self.last_cursor().cur })
    }

    /// Returns the last element mutably, or `None` if the deque is empty.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: The deque is non-empty, so the position before `back` is live.
        Some(unsafe { &mut *self.last_cursor().cur })
    }

    /// # Safety
    ///
    /// The deque MUST be non-empty.
    #[inline]
    unsafe fn last_cursor(&self) -> RawCursor<T> {
        let mut last = self.back;
        // SAFETY: Caller guarantees an element precedes `back`.
        unsafe { last.retreat_one() };
        last
    }

    /// Appends an element to the back of the deque.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn push_back_in<A: Allocator>(&mut self, alloc: &A, value: T) -> DequeResult<()> {
        if self.back.cur != self.back.last.wrapping_sub(1) {
            // SAFETY: There is room after `back` in the tail buffer.
            unsafe {
                self.back.cur.write(value);
                self.back.cur = self.back.cur.add(1);
            }
            Ok(())
        } else {
            // SAFETY: Requirements match function requirements.
            unsafe { self.push_back_aux(alloc, value) }
        }
    }

    /// Slow path of [`Self::push_back_in`]: the tail buffer has exactly one free position.
    unsafe fn push_back_aux<A: Allocator>(&mut self, alloc: &A, value: T) -> DequeResult<()> {
        if self.len() >= self.max_size() {
            return Err(DequeError::CapacityOverflow);
        }
        // SAFETY: Requirements match function requirements.
        unsafe { self.reserve_slots_at_back(alloc, 1)? };
        let buffer = buffer::allocate_buffer::<T, A>(alloc)?;
        // SAFETY: `reserve_slots_at_back` guarantees the slot after `back` exists and is empty.
        unsafe {
            let next = self.back.node.add(1);
            *next = Some(buffer);
            self.back.cur.write(value);
            self.back.reseat(next);
            self.back.cur = self.back.first;
        }
        Ok(())
    }

    /// Prepends an element to the front of the deque.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn push_front_in<A: Allocator>(&mut self, alloc: &A, value: T) -> DequeResult<()> {
        if self.front.cur != self.front.first {
            // SAFETY: There is room before `front` in the head buffer.
            unsafe {
                self.front.cur = self.front.cur.sub(1);
                self.front.cur.write(value);
            }
            Ok(())
        } else {
            // SAFETY: Requirements match function requirements.
            unsafe { self.push_front_aux(alloc, value) }
        }
    }

    /// Slow path of [`Self::push_front_in`]: `front` is at the start of its buffer.
    unsafe fn push_front_aux<A: Allocator>(&mut self, alloc: &A, value: T) -> DequeResult<()> {
        if self.len() >= self.max_size() {
            return Err(DequeError::CapacityOverflow);
        }
        // SAFETY: Requirements match function requirements.
        unsafe { self.reserve_slots_at_front(alloc, 1)? };
        let buffer = buffer::allocate_buffer::<T, A>(alloc)?;
        // SAFETY: `reserve_slots_at_front` guarantees the slot before `front` exists and is empty.
        unsafe {
            let prev = self.front.node.sub(1);
            *prev = Some(buffer);
            self.front.reseat(prev);
            self.front.cur = self.front.last.sub(1);
            self.front.cur.write(value);
        }
        Ok(())
    }

    /// Appends an element and returns a reference to it.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn emplace_back_in<A: Allocator>(
        &mut self,
        alloc: &A,
        value: T,
    ) -> DequeResult<&mut T> {
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.push_back_in(alloc, value)?;
            Ok(&mut *self.last_cursor().cur)
        }
    }

    /// Prepends an element and returns a reference to it.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn emplace_front_in<A: Allocator>(
        &mut self,
        alloc: &A,
        value: T,
    ) -> DequeResult<&mut T> {
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.push_front_in(alloc, value)?;
            Ok(&mut *self.front.cur)
        }
    }

    /// Removes the last element and returns it, or `None` if the deque is empty.
    ///
    /// A buffer left without elements is released.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn pop_back_in<A: Allocator>(&mut self, alloc: &A) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        if self.back.cur != self.back.first {
            // SAFETY: The element before `back` is live and in the same buffer.
            unsafe {
                self.back.cur = self.back.cur.sub(1);
                Some(self.back.cur.read())
            }
        } else {
            // SAFETY: The tail buffer holds no element, and the previous slot holds the last one.
            unsafe {
                Self::release_slots(alloc, self.back.node, self.back.node.add(1));
                self.back.reseat(self.back.node.sub(1));
                self.back.cur = self.back.last.sub(1);
                Some(self.back.cur.read())
            }
        }
    }

    /// Removes the first element and returns it, or `None` if the deque is empty.
    ///
    /// A buffer left without elements is released.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn pop_front_in<A: Allocator>(&mut self, alloc: &A) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: The deque is non-empty, so `front` is live.
        let value = unsafe { self.front.cur.read() };
        if self.front.cur != self.front.last.wrapping_sub(1) {
            self.front.cur = self.front.cur.wrapping_add(1);
        } else {
            // SAFETY: `front` was the last element of its buffer and more elements follow,
            // so the next slot owns a buffer.
            unsafe {
                Self::release_slots(alloc, self.front.node, self.front.node.add(1));
                self.front.reseat(self.front.node.add(1));
            }
            self.front.cur = self.front.first;
        }
        Some(value)
    }

    /// Exchanges the contents of two deques without touching any element.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns a cursor at the first element.
    pub fn begin(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.front)
    }

    /// Returns a cursor one past the last element.
    pub fn end(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.back)
    }

    /// Returns a cursor at `index`; `index == len()` gives the end cursor.
    pub fn cursor_at(&self, index: usize) -> Option<Cursor<'_, T>> {
        self.begin().offset(isize::try_from(index).ok()?)
    }

    /// Returns a mutable cursor at `index`; `index == len()` gives the end cursor.
    pub fn cursor_mut_at(&mut self, index: usize) -> Option<CursorMut<'_, T>> {
        if index > self.len() {
            return None;
        }
        // SAFETY: `index <= len`, so the position is within `[front, back]`.
        let raw = unsafe { self.front.plus(index as isize) };
        Some(CursorMut::new(self, raw))
    }

    /// Returns a front-to-back iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.front, self.back, self.len())
    }

    /// Returns a front-to-back iterator that allows modifying each element.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut::new(self.front, self.back, self.len())
    }
}

impl<T> DropIn for AllocatedDeque<T> {
    /// # Safety
    ///
    /// `alloc` must be the allocator used to allocate this object.
    unsafe fn drop_in<A: Allocator>(&mut self, alloc: &A) {
        // SAFETY: `[front, back)` is live; every buffer is owned by a slot of the map and the
        // map came from `alloc`.
        unsafe {
            drop_range(self.front, self.back);
            let map = self.map.as_ptr();
            Self::release_slots(alloc, map, map.add(self.map_size));
            deallocate_map(alloc, self.map, self.map_size);
        }
    }
}

impl<T: PartialEq> PartialEq for AllocatedDeque<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for AllocatedDeque<T> {}

impl<T: PartialOrd> PartialOrd for AllocatedDeque<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<T: Ord> Ord for AllocatedDeque<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<T: Hash> Hash for AllocatedDeque<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        self.iter().for_each(|elem| elem.hash(state));
    }
}

impl<T: fmt::Debug> fmt::Debug for AllocatedDeque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'s, T> IntoIterator for &'s AllocatedDeque<T> {
    type IntoIter = Iter<'s, T>;
    type Item = &'s T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'s, T> IntoIterator for &'s mut AllocatedDeque<T> {
    type IntoIter = IterMut<'s, T>;
    type Item = &'s mut T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
