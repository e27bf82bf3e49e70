//! A first-in, first-out queue adapter over any sequence with a back to push to and a front
//! to pop from.
//!
//! [`Queue`] defaults to [`Deque`] as its underlying sequence; [`VecDeque`] works too, and other
//! containers can join by implementing [`FifoSequence`].

use alloc::collections::VecDeque;
use core::convert::Infallible;
use core::fmt;
use core::marker::PhantomData;

use allocator_api2::alloc::Allocator;

use crate::deque::Deque;
use crate::error::DequeError;

/// The operations a [`Queue`] needs from its underlying sequence.
pub trait FifoSequence<T> {
    /// Error returned when the sequence cannot grow.
    type Error;

    /// Returns the number of elements.
    fn len(&self) -> usize;

    /// Returns `true` if there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the oldest element.
    fn front(&self) -> Option<&T>;

    /// Returns the oldest element mutably.
    fn front_mut(&mut self) -> Option<&mut T>;

    /// Returns the newest element.
    fn back(&self) -> Option<&T>;

    /// Returns the newest element mutably.
    fn back_mut(&mut self) -> Option<&mut T>;

    /// Appends at the back.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the sequence cannot grow; it is left unchanged.
    fn push_back(&mut self, value: T) -> Result<(), Self::Error>;

    /// Appends at the back and returns a reference to the new element.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the sequence cannot grow; it is left unchanged.
    fn emplace_back(&mut self, value: T) -> Result<&mut T, Self::Error>;

    /// Removes and returns the front element.
    fn pop_front(&mut self) -> Option<T>;

    /// Exchanges the contents of two sequences.
    fn swap(&mut self, other: &mut Self)
    where
        Self: Sized,
    {
        core::mem::swap(self, other);
    }
}

impl<T, A: Allocator> FifoSequence<T> for Deque<T, A> {
    type Error = DequeError;

    fn len(&self) -> usize {
        Deque::len(self)
    }

    fn is_empty(&self) -> bool {
        Deque::is_empty(self)
    }

    fn front(&self) -> Option<&T> {
        Deque::front(self)
    }

    fn front_mut(&mut self) -> Option<&mut T> {
        Deque::front_mut(self)
    }

    fn back(&self) -> Option<&T> {
        Deque::back(self)
    }

    fn back_mut(&mut self) -> Option<&mut T> {
        Deque::back_mut(self)
    }

    fn push_back(&mut self, value: T) -> Result<(), DequeError> {
        Deque::push_back(self, value)
    }

    fn emplace_back(&mut self, value: T) -> Result<&mut T, DequeError> {
        Deque::emplace_back(self, value)
    }

    fn pop_front(&mut self) -> Option<T> {
        Deque::pop_front(self)
    }

    fn swap(&mut self, other: &mut Self) {
        Deque::swap(self, other);
    }
}

impl<T> FifoSequence<T> for VecDeque<T> {
    type Error = Infallible;

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn is_empty(&self) -> bool {
        VecDeque::is_empty(self)
    }

    fn front(&self) -> Option<&T> {
        VecDeque::front(self)
    }

    fn front_mut(&mut self) -> Option<&mut T> {
        VecDeque::front_mut(self)
    }

    fn back(&self) -> Option<&T> {
        VecDeque::back(self)
    }

    fn back_mut(&mut self) -> Option<&mut T> {
        VecDeque::back_mut(self)
    }

    fn push_back(&mut self, value: T) -> Result<(), Infallible> {
        VecDeque::push_back(self, value);
        Ok(())
    }

    fn emplace_back(&mut self, value: T) -> Result<&mut T, Infallible> {
        let index = VecDeque::len(self);
        VecDeque::push_back(self, value);
        Ok(&mut self[index])
    }

    fn pop_front(&mut self) -> Option<T> {
        VecDeque::pop_front(self)
    }
}

/// A FIFO queue: elements are pushed at the back and popped from the front.
///
/// # Example
///
/// ```
/// use allocated_deque::Queue;
///
/// let mut queue: Queue<u32> = Queue::new();
/// queue.push(1).unwrap();
/// queue.push(2).unwrap();
///
/// assert_eq!(queue.front(), Some(&1));
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.len(), 1);
/// ```
pub struct Queue<T, S: FifoSequence<T> = Deque<T>> {
    seq: S,
    _marker: PhantomData<T>,
}

impl<T, S: FifoSequence<T> + Default> Queue<T, S> {
    /// Creates an empty queue over a default sequence.
    pub fn new() -> Self {
        Self::from_sequence(S::default())
    }
}

impl<T, S: FifoSequence<T>> Queue<T, S> {
    /// Wraps an existing sequence; its front is the head of the queue.
    pub fn from_sequence(seq: S) -> Self {
        Self {
            seq,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying sequence.
    pub fn into_inner(self) -> S {
        self.seq
    }

    /// Borrows the underlying sequence.
    pub fn as_sequence(&self) -> &S {
        &self.seq
    }

    /// Returns `true` if the queue holds no elements.
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Returns the number of queued elements.
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    /// Returns the element that [`Queue::pop`] would remove next.
    pub fn front(&self) -> Option<&T> {
        self.seq.front()
    }

    /// Returns the next element to be popped, mutably.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.seq.front_mut()
    }

    /// Returns the most recently pushed element.
    pub fn back(&self) -> Option<&T> {
        self.seq.back()
    }

    /// Returns the most recently pushed element, mutably.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.seq.back_mut()
    }

    /// Adds an element at the back of the queue.
    ///
    /// # Errors
    ///
    /// Returns the sequence's error if it cannot grow; the queue is unchanged.
    pub fn push(&mut self, value: T) -> Result<(), S::Error> {
        self.seq.push_back(value)
    }

    /// Adds an element at the back and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns the sequence's error if it cannot grow; the queue is unchanged.
    pub fn emplace(&mut self, value: T) -> Result<&mut T, S::Error> {
        self.seq.emplace_back(value)
    }

    /// Removes and returns the front element, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.seq.pop_front()
    }

    /// Exchanges the contents of two queues.
    pub fn swap(&mut self, other: &mut Self) {
        self.seq.swap(&mut other.seq);
    }
}

impl<T, S: FifoSequence<T> + Default> Default for Queue<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S: FifoSequence<T>> From<S> for Queue<T, S> {
    fn from(seq: S) -> Self {
        Self::from_sequence(seq)
    }
}

impl<T, S: FifoSequence<T> + Clone> Clone for Queue<T, S> {
    fn clone(&self) -> Self {
        Self::from_sequence(self.seq.clone())
    }
}

impl<T, S: FifoSequence<T> + PartialEq> PartialEq for Queue<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T, S: FifoSequence<T> + Eq> Eq for Queue<T, S> {}

impl<T, S: FifoSequence<T> + fmt::Debug> fmt::Debug for Queue<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("seq", &self.seq).finish()
    }
}
