//! Positional modification: insertion, erasure, resizing and clearing.
//!
//! Every operation here shifts whichever side of the deque is shorter. Bulk insertion reserves
//! all of its room before writing anything, and a guard undoes the partial work if writing a
//! value panics, so a failed insert leaves the deque exactly as it was.

use core::ops::{Bound, RangeBounds};

use allocator_api2::alloc::Allocator;

use super::buffer::Slot;
use super::cursor::{drop_range, move_backward, move_forward, RawCursor};
use super::AllocatedDeque;
use crate::error::{DequeError, DequeResult};

/// Which end of the deque a bulk insertion grows.
enum Side<T> {
    Front { new_front: RawCursor<T> },
    Back { new_back: RawCursor<T> },
}

/// Rolls back a bulk insertion unless [`InsertGuard::commit`] is reached.
///
/// Until then the deque's own `front`/`back` still describe the old contents; the shifted
/// elements and the `written` values in the gap are tracked here.
struct InsertGuard<'a, T, A: Allocator> {
    deque: &'a mut AllocatedDeque<T>,
    alloc: &'a A,
    side: Side<T>,
    gap: RawCursor<T>,
    n: usize,
    written: usize,
    committed: bool,
}

impl<T, A: Allocator> InsertGuard<'_, T, A> {
    fn commit(mut self) {
        match self.side {
            Side::Front { new_front } => self.deque.front = new_front,
            Side::Back { new_back } => self.deque.back = new_back,
        }
        self.committed = true;
    }
}

impl<T, A: Allocator> Drop for InsertGuard<'_, T, A> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // SAFETY: `[gap, gap + written)` holds values written by this insertion. The shifted
        // side is moved back where it came from and the buffers reserved for the insertion are
        // released; the deque's cursors were never changed.
        unsafe {
            drop_range(self.gap, self.gap.plus(self.written as isize));
            let gap_end = self.gap.plus(self.n as isize);
            match self.side {
                Side::Front { new_front } => {
                    move_backward(new_front, self.gap, gap_end);
                    AllocatedDeque::<T>::release_slots(
                        self.alloc,
                        new_front.node,
                        self.deque.front.node,
                    );
                }
                Side::Back { new_back } => {
                    move_forward(gap_end, new_back, self.gap);
                    AllocatedDeque::<T>::release_slots(
                        self.alloc,
                        self.deque.back.node.add(1),
                        new_back.node.add(1),
                    );
                }
            }
        }
    }
}

/// Closes the gap left by an erasure, whether or not dropping the erased values panicked.
struct EraseGuard<'a, T, A: Allocator> {
    deque: &'a mut AllocatedDeque<T>,
    alloc: &'a A,
    index: usize,
    n: usize,
}

impl<T, A: Allocator> Drop for EraseGuard<'_, T, A> {
    fn drop(&mut self) {
        // SAFETY: `[index, index + n)` is dead and every other position is live.
        unsafe { self.deque.close_gap(self.alloc, self.index, self.n) };
    }
}

/// Releases the buffers of the slots in `[from, to)` when dropped, including while unwinding
/// from a panicking destructor.
struct ReleaseGuard<'a, T, A: Allocator> {
    alloc: &'a A,
    from: *mut Slot<T>,
    to: *mut Slot<T>,
}

impl<T, A: Allocator> Drop for ReleaseGuard<'_, T, A> {
    fn drop(&mut self) {
        // SAFETY: The slots are past the deque's back and their elements are dead.
        unsafe { AllocatedDeque::<T>::release_slots(self.alloc, self.from, self.to) };
    }
}

impl<T> AllocatedDeque<T> {
    /// Inserts `value` so that it ends up at `index`.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`] if `index > len`, or an allocation error. The deque
    /// is unchanged on error.
    pub unsafe fn insert_in<A: Allocator>(
        &mut self,
        alloc: &A,
        index: usize,
        value: T,
    ) -> DequeResult<()> {
        let len = self.len();
        if index > len {
            return Err(DequeError::OutOfRange { index, len });
        }
        // SAFETY: Requirements match function requirements.
        unsafe {
            if index == 0 {
                return self.push_front_in(alloc, value);
            }
            if index == len {
                return self.push_back_in(alloc, value);
            }
            if index < len / 2 {
                let new_front = self.reserve_elements_at_front(alloc, 1)?;
                let pos = self.front.plus(index as isize);
                let hole = move_forward(self.front, pos, new_front);
                hole.cur.write(value);
                self.front = new_front;
            } else {
                let new_back = self.reserve_elements_at_back(alloc, 1)?;
                let pos = self.front.plus(index as isize);
                move_backward(pos, self.back, new_back);
                pos.cur.write(value);
                self.back = new_back;
            }
        }
        Ok(())
    }

    /// Inserts `value` at `index` and returns a reference to it.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert_in`].
    pub unsafe fn emplace_in<A: Allocator>(
        &mut self,
        alloc: &A,
        index: usize,
        value: T,
    ) -> DequeResult<&mut T> {
        // SAFETY: Requirements match function requirements; `index` is live after the insert.
        unsafe {
            self.insert_in(alloc, index, value)?;
            Ok(self.get_unchecked_mut(index))
        }
    }

    /// Inserts `n` clones of `value` starting at `index`.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert_in`].
    pub unsafe fn insert_n_in<A: Allocator>(
        &mut self,
        alloc: &A,
        index: usize,
        n: usize,
        value: T,
    ) -> DequeResult<()>
    where
        T: Clone,
    {
        let mut remaining = n;
        let mut value = Some(value);
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.insert_with(alloc, index, n, || {
                remaining = remaining.checked_sub(1)?;
                if remaining == 0 {
                    value.take()
                } else {
                    value.clone()
                }
            })
        }
    }

    /// Inserts every element of `iter` starting at `index`, keeping their order.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert_in`].
    ///
    /// # Panics
    ///
    /// Panics if the iterator yields fewer elements than it reported; the deque is restored
    /// first.
    pub unsafe fn insert_iter_in<A: Allocator, I>(
        &mut self,
        alloc: &A,
        index: usize,
        iter: I,
    ) -> DequeResult<()>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut iter = iter.into_iter();
        let n = iter.len();
        // SAFETY: Requirements match function requirements.
        unsafe { self.insert_with(alloc, index, n, || iter.next()) }
    }

    /// Inserts `n` values produced by `next` at `index`.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    unsafe fn insert_with<A: Allocator>(
        &mut self,
        alloc: &A,
        index: usize,
        n: usize,
        mut next: impl FnMut() -> Option<T>,
    ) -> DequeResult<()> {
        let len = self.len();
        if index > len {
            return Err(DequeError::OutOfRange { index, len });
        }
        if n == 0 {
            return Ok(());
        }

        // SAFETY: Room for `n` elements is reserved before anything moves. Cursors are taken
        // after the reservation, which may have moved the map.
        let (side, gap) = unsafe {
            if index == 0 || index < len / 2 {
                let new_front = self.reserve_elements_at_front(alloc, n)?;
                let pos = self.front.plus(index as isize);
                let gap = move_forward(self.front, pos, new_front);
                (Side::Front { new_front }, gap)
            } else {
                let new_back = self.reserve_elements_at_back(alloc, n)?;
                let pos = self.front.plus(index as isize);
                move_backward(pos, self.back, new_back);
                (Side::Back { new_back }, pos)
            }
        };

        let mut guard = InsertGuard {
            deque: self,
            alloc,
            side,
            gap,
            n,
            written: 0,
            committed: false,
        };
        let mut dest = gap;
        while guard.written < n {
            let Some(value) = next() else {
                panic!("iterator yielded fewer elements than its reported length");
            };
            // SAFETY: `dest` is inside the reserved gap; the position after the gap's last
            // one is either a shifted element or the new back, both inside owned buffers.
            unsafe {
                dest.cur.write(value);
                dest.advance_one();
            }
            guard.written += 1;
        }
        guard.commit();
        Ok(())
    }

    /// Removes and returns the element at `index`, or `None` if out of bounds.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn remove_in<A: Allocator>(&mut self, alloc: &A, index: usize) -> Option<T> {
        let len = self.len();
        if index >= len {
            return None;
        }
        // SAFETY: Requirements match function requirements; `index` is live.
        unsafe {
            if index == 0 {
                return self.pop_front_in(alloc);
            }
            if index == len - 1 {
                return self.pop_back_in(alloc);
            }
            let value = self.front.plus(index as isize).cur.read();
            self.close_gap(alloc, index, 1);
            Some(value)
        }
    }

    /// Drops the elements in `range` and closes the gap.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Returns [`DequeError::OutOfRange`] if the range is decreasing or runs past the end.
    pub unsafe fn erase_in<A: Allocator, R: RangeBounds<usize>>(
        &mut self,
        alloc: &A,
        range: R,
    ) -> DequeResult<()> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => len,
        };
        if start > end || end > len {
            return Err(DequeError::OutOfRange {
                index: start.max(end),
                len,
            });
        }
        if start == end {
            return Ok(());
        }
        if start == 0 && end == len {
            // SAFETY: Requirements match function requirements.
            unsafe { self.clear_in(alloc) };
            return Ok(());
        }

        // SAFETY: `start < end <= len`.
        let (first, last) = unsafe {
            let first = self.front.plus(start as isize);
            (first, first.plus((end - start) as isize))
        };
        let _guard = EraseGuard {
            deque: self,
            alloc,
            index: start,
            n: end - start,
        };
        // SAFETY: The range is live; the guard closes the gap afterwards, even on panic.
        unsafe { drop_range(first, last) };
        Ok(())
    }

    /// Moves the shorter side over the dead span `[index, index + n)` and releases the buffers
    /// left empty.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object, the span MUST be within
    /// `[0, len)` and dead, and every other position MUST be live.
    unsafe fn close_gap<A: Allocator>(&mut self, alloc: &A, index: usize, n: usize) {
        let len = self.len();
        // SAFETY: Caller guarantees the span is inside the deque.
        unsafe {
            let first = self.front.plus(index as isize);
            let last = first.plus(n as isize);
            if index < (len - n) / 2 {
                move_backward(self.front, first, last);
                let new_front = self.front.plus(n as isize);
                Self::release_slots(alloc, self.front.node, new_front.node);
                self.front = new_front;
            } else {
                move_forward(last, self.back, first);
                let new_back = self.back.plus(-(n as isize));
                Self::release_slots(alloc, new_back.node.add(1), self.back.node.add(1));
                self.back = new_back;
            }
        }
    }

    /// Shortens the deque to `len` elements, dropping the rest. Does nothing if `len` is not
    /// smaller than the current length.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn truncate_in<A: Allocator>(&mut self, alloc: &A, len: usize) {
        if len >= self.len() {
            return;
        }
        let old_back = self.back;
        // SAFETY: `len` is inside the deque. `back` moves before any element is dropped, and the
        // guard empties the slots past it even if a destructor panics.
        unsafe {
            self.back = self.front.plus(len as isize);
            let _release = ReleaseGuard {
                alloc,
                from: self.back.node.add(1),
                to: old_back.node.add(1),
            };
            drop_range(self.back, old_back);
        }
    }

    /// Drops every element and releases every buffer but the one under `front`.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub unsafe fn clear_in<A: Allocator>(&mut self, alloc: &A) {
        // SAFETY: Requirements match function requirements.
        unsafe { self.truncate_in(alloc, 0) };
    }

    /// Resizes the deque to `len`, appending clones of `value` or dropping from the back.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn resize_in<A: Allocator>(
        &mut self,
        alloc: &A,
        len: usize,
        value: T,
    ) -> DequeResult<()>
    where
        T: Clone,
    {
        let old_len = self.len();
        // SAFETY: Requirements match function requirements.
        unsafe {
            if len > old_len {
                self.insert_n_in(alloc, old_len, len - old_len, value)
            } else {
                self.truncate_in(alloc, len);
                Ok(())
            }
        }
    }

    /// Resizes the deque to `len`, appending values produced by `f` or dropping from the back.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn resize_with_in<A: Allocator>(
        &mut self,
        alloc: &A,
        len: usize,
        mut f: impl FnMut() -> T,
    ) -> DequeResult<()> {
        let old_len = self.len();
        // SAFETY: Requirements match function requirements.
        unsafe {
            if len > old_len {
                self.insert_with(alloc, old_len, len - old_len, || Some(f()))
            } else {
                self.truncate_in(alloc, len);
                Ok(())
            }
        }
    }

    /// Replaces the contents with `n` clones of `value`, reusing the existing buffers.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails; the deque is unchanged.
    pub unsafe fn assign_in<A: Allocator>(
        &mut self,
        alloc: &A,
        n: usize,
        value: T,
    ) -> DequeResult<()>
    where
        T: Clone,
    {
        let old_len = self.len();
        // SAFETY: Requirements match function requirements.
        unsafe {
            if n > old_len {
                self.insert_n_in(alloc, old_len, n - old_len, value.clone())?;
            } else {
                self.truncate_in(alloc, n);
            }
        }
        for elem in self.iter_mut().take(old_len) {
            elem.clone_from(&value);
        }
        Ok(())
    }

    /// Replaces the contents with the elements of `iter`, reusing the existing buffers.
    ///
    /// Existing elements are overwritten in order; any surplus is dropped and any shortfall
    /// is appended.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the allocation fails. The deque then holds the elements assigned
    /// so far.
    pub unsafe fn assign_iter_in<A: Allocator, I: IntoIterator<Item = T>>(
        &mut self,
        alloc: &A,
        iter: I,
    ) -> DequeResult<()> {
        let mut iter = iter.into_iter();
        let mut assigned = 0;
        for elem in self.iter_mut() {
            let Some(value) = iter.next() else {
                break;
            };
            *elem = value;
            assigned += 1;
        }
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.truncate_in(alloc, assigned);
            for value in iter {
                self.push_back_in(alloc, value)?;
            }
        }
        Ok(())
    }
}
