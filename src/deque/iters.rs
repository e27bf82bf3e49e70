use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use allocator_api2::alloc::{Allocator, Global};

use super::cursor::RawCursor;
use super::Deque;

/// An iterator over references to the elements of a deque, front to back.
///
/// Created by [`AllocatedDeque::iter`](super::AllocatedDeque::iter).
pub struct Iter<'a, T> {
    front: RawCursor<T>,
    back: RawCursor<T>,
    remaining: usize,
    _marker: PhantomData<&'a T>,
}

// SAFETY: `Iter` only hands out shared references.
unsafe impl<T: Sync> Send for Iter<'_, T> {}
// SAFETY: `Iter` only hands out shared references.
unsafe impl<T: Sync> Sync for Iter<'_, T> {}

impl<T> Iter<'_, T> {
    pub(super) fn new(front: RawCursor<T>, back: RawCursor<T>, remaining: usize) -> Self {
        Self {
            front,
            back,
            remaining,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self::new(self.front, self.back, self.remaining)
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: `front` is live while elements remain; stepping past the last element lands
        // on the deque's back position, which is inside an owned buffer.
        unsafe {
            let item = &*self.front.cur;
            self.front.advance_one();
            Some(item)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.front = self.back;
            self.remaining = 0;
            return None;
        }
        // SAFETY: `n < remaining`, so the target is live.
        unsafe { self.front.advance_by(n as isize) };
        self.remaining -= n;
        self.next()
    }

    fn count(self) -> usize {
        self.remaining
    }

    fn last(mut self) -> Option<Self::Item> {
        self.next_back()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: An element precedes `back` while elements remain.
        unsafe {
            self.back.retreat_one();
            Some(&*self.back.cur)
        }
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.back = self.front;
            self.remaining = 0;
            return None;
        }
        // SAFETY: `n < remaining`, so the target is live.
        unsafe { self.back.advance_by(-(n as isize)) };
        self.remaining -= n;
        self.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// An iterator over mutable references to the elements of a deque, front to back.
///
/// Created by [`AllocatedDeque::iter_mut`](super::AllocatedDeque::iter_mut).
pub struct IterMut<'a, T> {
    front: RawCursor<T>,
    back: RawCursor<T>,
    remaining: usize,
    _marker: PhantomData<&'a mut T>,
}

// SAFETY: `IterMut` behaves like `&mut T`.
unsafe impl<T: Send> Send for IterMut<'_, T> {}
// SAFETY: `IterMut` behaves like `&mut T`.
unsafe impl<T: Sync> Sync for IterMut<'_, T> {}

impl<T> IterMut<'_, T> {
    pub(super) fn new(front: RawCursor<T>, back: RawCursor<T>, remaining: usize) -> Self {
        Self {
            front,
            back,
            remaining,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: Each live position is yielded at most once.
        unsafe {
            let item = &mut *self.front.cur;
            self.front.advance_one();
            Some(item)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.front = self.back;
            self.remaining = 0;
            return None;
        }
        // SAFETY: `n < remaining`, so the target is live.
        unsafe { self.front.advance_by(n as isize) };
        self.remaining -= n;
        self.next()
    }

    fn count(self) -> usize {
        self.remaining
    }

    fn last(mut self) -> Option<Self::Item> {
        self.next_back()
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: Each live position is yielded at most once.
        unsafe {
            self.back.retreat_one();
            Some(&mut *self.back.cur)
        }
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.back = self.front;
            self.remaining = 0;
            return None;
        }
        // SAFETY: `n < remaining`, so the target is live.
        unsafe { self.back.advance_by(-(n as isize)) };
        self.remaining -= n;
        self.next_back()
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for IterMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// An owning iterator over the elements of a [`Deque`].
///
/// Elements are popped as they are yielded, so buffers are released as the iteration
/// proceeds. Whatever is left is dropped with the iterator.
pub struct IntoIter<T, A: Allocator = Global> {
    inner: Deque<T, A>,
}

impl<T, A: Allocator> IntoIter<T, A> {
    pub(super) fn new(inner: Deque<T, A>) -> Self {
        Self { inner }
    }
}

impl<T, A: Allocator> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.inner.len();
        (len, Some(len))
    }

    fn count(self) -> usize {
        self.inner.len()
    }
}

impl<T, A: Allocator> DoubleEndedIterator for IntoIter<T, A> {
    fn next_back(&mut self) -> Option<T> {
        self.inner.pop_back()
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoIter<T, A> {}

impl<T, A: Allocator> FusedIterator for IntoIter<T, A> {}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for IntoIter<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.inner).finish()
    }
}
