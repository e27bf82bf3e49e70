//! Ergonomic wrapper for the segmented deque.
//!
//! This module provides [`Deque<T, A>`], a wrapper around [`AllocatedDeque`] that owns an
//! allocator, making it safe and ergonomic to use.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::mem::ManuallyDrop;
use core::ops::{Index, IndexMut, RangeBounds};

use allocated::DropIn;
use allocator_api2::alloc::{Allocator, Global};

use super::{AllocatedDeque, Cursor, CursorMut, IntoIter, Iter, IterMut};
use crate::error::{DequeResult, DequeResultExt};

/// A double-ended queue that owns its allocator.
///
/// This is the recommended type for most use cases. It wraps [`AllocatedDeque`] and provides
/// safe methods without requiring `unsafe` blocks or passing allocators manually.
///
/// Pushing or popping at either end is O(1) and never moves existing elements, so references
/// obtained from one end stay meaningful while the other end changes. Random access is O(1).
///
/// # Example
///
/// ```
/// use allocated_deque::Deque;
///
/// let mut deque = Deque::new();
/// deque.push_back(2).unwrap();
/// deque.push_back(3).unwrap();
/// deque.push_front(1).unwrap();
///
/// assert_eq!(deque[0], 1);
/// assert_eq!(deque.len(), 3);
/// assert_eq!(deque.pop_back(), Some(3));
/// ```
pub struct Deque<T, A: Allocator = Global> {
    alloc: A,
    raw: ManuallyDrop<AllocatedDeque<T>>,
}

impl<T> Deque<T> {
    /// Create a new empty deque using the global allocator.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    #[inline]
    pub fn new() -> Self {
        let raw = AllocatedDeque::new_in(&Global)
            .handle_alloc_error()
            .into_inner();
        Self { alloc: Global, raw }
    }

    /// Create a deque of `n` clones of `value` using the global allocator.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    pub fn from_elem(n: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_elem_in(Global, n, value).handle_alloc_error()
    }

    /// Create a deque of `n` default values using the global allocator.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    pub fn with_default(n: usize) -> Self
    where
        T: Default,
    {
        Self::with_default_in(Global, n).handle_alloc_error()
    }
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> Drop for Deque<T, A> {
    fn drop(&mut self) {
        // SAFETY: `self.raw` was allocated by `self.alloc`
        unsafe {
            self.raw.drop_in(&self.alloc);
        }
    }
}

impl<T, A: Allocator> Deque<T, A> {
    /// Create a new empty deque using the provided allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new_in(alloc: A) -> DequeResult<Self> {
        let raw = AllocatedDeque::new_in(&alloc)?.into_inner();
        Ok(Self { alloc, raw })
    }

    /// Create a deque of `n` clones of `value` using the provided allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn from_elem_in(alloc: A, n: usize, value: T) -> DequeResult<Self>
    where
        T: Clone,
    {
        let raw = AllocatedDeque::from_elem_in(&alloc, n, value)?.into_inner();
        Ok(Self { alloc, raw })
    }

    /// Create a deque of `n` default values using the provided allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn with_default_in(alloc: A, n: usize) -> DequeResult<Self>
    where
        T: Default,
    {
        let raw = AllocatedDeque::with_default_in(&alloc, n)?.into_inner();
        Ok(Self { alloc, raw })
    }

    /// Create a deque from an iterator using the provided allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn try_from_iter_in<I: IntoIterator<Item = T>>(alloc: A, iter: I) -> DequeResult<Self> {
        let raw = AllocatedDeque::from_iter_in(&alloc, iter)?.into_inner();
        Ok(Self { alloc, raw })
    }

    /// Create a deep copy of this deque with a clone of its allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn try_clone(&self) -> DequeResult<Self>
    where
        T: Clone,
        A: Clone,
    {
        let alloc = self.alloc.clone();
        let raw = self.raw.clone_in(&alloc)?.into_inner();
        Ok(Self { alloc, raw })
    }

    #[cfg(test)]
    pub(super) fn raw(&self) -> &AllocatedDeque<T> {
        &self.raw
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Returns the number of elements in the deque.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the deque contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the largest number of elements the deque could ever hold.
    pub fn max_size(&self) -> usize {
        self.raw.max_size()
    }

    /// Returns how many map slots are currently allocated.
    pub fn map_capacity(&self) -> usize {
        self.raw.map_capacity()
    }

    /// Returns how many times the map has been reallocated or recentred.
    pub fn map_reallocations(&self) -> usize {
        self.raw.map_reallocations()
    }

    /// Returns a reference to the element at `index`, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.raw.get(index)
    }

    /// Returns a mutable reference to the element at `index`, or `None` if out of bounds.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.raw.get_mut(index)
    }

    /// Checked access to the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`](crate::DequeError::OutOfRange) if `index >= len`.
    pub fn at(&self, index: usize) -> DequeResult<&T> {
        self.raw.at(index)
    }

    /// Checked mutable access to the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`](crate::DequeError::OutOfRange) if `index >= len`.
    pub fn at_mut(&mut self, index: usize) -> DequeResult<&mut T> {
        self.raw.at_mut(index)
    }

    /// Returns the first element, or `None` if the deque is empty.
    pub fn front(&self) -> Option<&T> {
        self.raw.front()
    }

    /// Returns the first element mutably, or `None` if the deque is empty.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.raw.front_mut()
    }

    /// Returns the last element, or `None` if the deque is empty.
    pub fn back(&self) -> Option<&T> {
        self.raw.back()
    }

    /// Returns the last element mutably, or `None` if the deque is empty.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.raw.back_mut()
    }

    /// Appends an element to the back.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn push_back(&mut self, value: T) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.push_back_in(&self.alloc, value) }
    }

    /// Prepends an element to the front.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn push_front(&mut self, value: T) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.push_front_in(&self.alloc, value) }
    }

    /// Appends an element to the back and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn emplace_back(&mut self, value: T) -> DequeResult<&mut T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.emplace_back_in(&self.alloc, value) }
    }

    /// Prepends an element to the front and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn emplace_front(&mut self, value: T) -> DequeResult<&mut T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.emplace_front_in(&self.alloc, value) }
    }

    /// Removes the last element and returns it, or `None` if the deque is empty.
    pub fn pop_back(&mut self) -> Option<T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.pop_back_in(&self.alloc) }
    }

    /// Removes the first element and returns it, or `None` if the deque is empty.
    pub fn pop_front(&mut self) -> Option<T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.pop_front_in(&self.alloc) }
    }

    /// Inserts `value` at `index`, shifting whichever side is shorter.
    ///
    /// # Errors
    ///
    /// Returns an error if `index > len` or allocation fails; the deque is unchanged.
    pub fn insert(&mut self, index: usize, value: T) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.insert_in(&self.alloc, index, value) }
    }

    /// Inserts `value` at `index` and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns an error if `index > len` or allocation fails; the deque is unchanged.
    pub fn emplace(&mut self, index: usize, value: T) -> DequeResult<&mut T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.emplace_in(&self.alloc, index, value) }
    }

    /// Inserts `n` clones of `value` starting at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index > len` or allocation fails; the deque is unchanged.
    pub fn insert_n(&mut self, index: usize, n: usize, value: T) -> DequeResult<()>
    where
        T: Clone,
    {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.insert_n_in(&self.alloc, index, n, value) }
    }

    /// Inserts the elements of `iter` starting at `index`, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns an error if `index > len` or allocation fails; the deque is unchanged.
    pub fn insert_iter<I>(&mut self, index: usize, iter: I) -> DequeResult<()>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.insert_iter_in(&self.alloc, index, iter) }
    }

    /// Removes and returns the element at `index`, or `None` if out of bounds.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.remove_in(&self.alloc, index) }
    }

    /// Drops the elements in `range`, shifting whichever side is shorter.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is decreasing or runs past the end.
    pub fn erase<R: RangeBounds<usize>>(&mut self, range: R) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.erase_in(&self.alloc, range) }
    }

    /// Shortens the deque to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.truncate_in(&self.alloc, len) }
    }

    /// Resizes the deque in place, appending clones of `value` as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn resize(&mut self, len: usize, value: T) -> DequeResult<()>
    where
        T: Clone,
    {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.resize_in(&self.alloc, len, value) }
    }

    /// Resizes the deque in place, appending values from `f` as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn resize_with(&mut self, len: usize, f: impl FnMut() -> T) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.resize_with_in(&self.alloc, len, f) }
    }

    /// Replaces the contents with `n` clones of `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque is unchanged.
    pub fn assign(&mut self, n: usize, value: T) -> DequeResult<()>
    where
        T: Clone,
    {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.assign_in(&self.alloc, n, value) }
    }

    /// Replaces the contents with the elements of `iter`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the deque keeps the elements assigned so far.
    pub fn assign_iter<I: IntoIterator<Item = T>>(&mut self, iter: I) -> DequeResult<()> {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.assign_iter_in(&self.alloc, iter) }
    }

    /// Removes every element, keeping one buffer.
    pub fn clear(&mut self) {
        // SAFETY: `self.alloc` was used to allocate `self.raw`
        unsafe { self.raw.clear_in(&self.alloc) }
    }

    /// Exchanges the contents and allocators of two deques in O(1).
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns a cursor at the first element.
    pub fn begin(&self) -> Cursor<'_, T> {
        self.raw.begin()
    }

    /// Returns a cursor one past the last element.
    pub fn end(&self) -> Cursor<'_, T> {
        self.raw.end()
    }

    /// Returns a cursor at `index`; `index == len()` gives the end cursor.
    pub fn cursor_at(&self, index: usize) -> Option<Cursor<'_, T>> {
        self.raw.cursor_at(index)
    }

    /// Returns a mutable cursor at `index`; `index == len()` gives the end cursor.
    pub fn cursor_mut_at(&mut self, index: usize) -> Option<CursorMut<'_, T>> {
        self.raw.cursor_mut_at(index)
    }

    /// Gets a front-to-back iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        self.raw.iter()
    }

    /// Gets a front-to-back iterator over mutable references.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.raw.iter_mut()
    }
}

impl<T: Clone, A: Allocator + Clone> Clone for Deque<T, A> {
    /// # Panics
    ///
    /// Panics if allocation fails.
    fn clone(&self) -> Self {
        self.try_clone().handle_alloc_error()
    }

    /// Reuses the existing buffers: overlapping elements are assigned in place, the rest are
    /// appended or truncated.
    fn clone_from(&mut self, source: &Self) {
        let shared = self.len().min(source.len());
        for (dst, src) in self.iter_mut().zip(source.iter()) {
            dst.clone_from(src);
        }
        if source.len() > shared {
            // SAFETY: `self.alloc` was used to allocate `self.raw`
            unsafe {
                self.raw
                    .insert_iter_in(&self.alloc, shared, source.iter().skip(shared).cloned())
                    .handle_alloc_error();
            }
        } else {
            self.truncate(shared);
        }
    }
}

impl<T> FromIterator<T> for Deque<T> {
    /// # Panics
    ///
    /// Panics if allocation fails.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::try_from_iter_in(Global, iter).handle_alloc_error()
    }
}

impl<T, const N: usize> From<[T; N]> for Deque<T> {
    fn from(array: [T; N]) -> Self {
        Self::try_from_iter_in(Global, array).handle_alloc_error()
    }
}

impl<T, A: Allocator> Extend<T> for Deque<T, A> {
    /// # Panics
    ///
    /// Panics if allocation fails.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value).handle_alloc_error();
        }
    }
}

impl<'a, T: Copy + 'a, A: Allocator> Extend<&'a T> for Deque<T, A> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T, A: Allocator> Index<usize> for Deque<T, A> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `index >= len`.
    fn index(&self, index: usize) -> &T {
        match self.raw.get(index) {
            Some(value) => value,
            None => panic!(
                "index out of bounds: the len is {} but the index is {index}",
                self.len()
            ),
        }
    }
}

impl<T, A: Allocator> IndexMut<usize> for Deque<T, A> {
    /// # Panics
    ///
    /// Panics if `index >= len`.
    fn index_mut(&mut self, index: usize) -> &mut T {
        let len = self.len();
        match self.raw.get_mut(index) {
            Some(value) => value,
            None => panic!("index out of bounds: the len is {len} but the index is {index}"),
        }
    }
}

impl<T: PartialEq, A1: Allocator, A2: Allocator> PartialEq<Deque<T, A2>> for Deque<T, A1> {
    fn eq(&self, other: &Deque<T, A2>) -> bool {
        *self.raw == *other.raw
    }
}

impl<T: Eq, A: Allocator> Eq for Deque<T, A> {}

impl<T: PartialOrd, A: Allocator> PartialOrd for Deque<T, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.raw.partial_cmp(&other.raw)
    }
}

impl<T: Ord, A: Allocator> Ord for Deque<T, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: Hash, A: Allocator> Hash for Deque<T, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for Deque<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.raw, f)
    }
}

impl<T, A: Allocator> IntoIterator for Deque<T, A> {
    type IntoIter = IntoIter<T, A>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s Deque<T, A> {
    type IntoIter = Iter<'s, T>;
    type Item = &'s T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s mut Deque<T, A> {
    type IntoIter = IterMut<'s, T>;
    type Item = &'s mut T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
