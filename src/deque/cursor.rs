//! Position handles into the segmented storage.
//!
//! [`RawCursor`] is the deque's internal iterator: the position inside the current buffer,
//! that buffer's bounds, and a non-owning pointer to the map slot holding it. The deque
//! manipulates its fields directly. [`Cursor`] and [`CursorMut`] are the safe handles handed
//! out to users; they borrow the deque and never expose the raw fields.

use core::cmp::Ordering;
use core::fmt;
use core::mem::{needs_drop, size_of};
use core::ops::{Add, Sub};
use core::ptr::{self, NonNull};

use super::buffer::{BufferLen, Slot};
use super::AllocatedDeque;

/// A position in the deque: `first <= cur < last` for every cursor except the transient ones
/// produced while walking one past a buffer whose successor slot is empty.
pub(crate) struct RawCursor<T> {
    pub(crate) cur: *mut T,
    pub(crate) first: *mut T,
    pub(crate) last: *mut T,
    pub(crate) node: *mut Slot<T>,
}

impl<T> Clone for RawCursor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawCursor<T> {}

impl<T> PartialEq for RawCursor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.cur == other.cur
    }
}

impl<T> Eq for RawCursor<T> {}

impl<T> PartialOrd for RawCursor<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RawCursor<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.node == other.node {
            (self.cur as usize).cmp(&(other.cur as usize))
        } else {
            (self.node as usize).cmp(&(other.node as usize))
        }
    }
}

impl<T> fmt::Debug for RawCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCursor")
            .field("node", &self.node)
            .field("offset", &self.offset_in_buffer())
            .finish()
    }
}

/// Signed number of slots from `b` to `a`.
#[inline]
fn slot_distance<T>(a: *mut Slot<T>, b: *mut Slot<T>) -> isize {
    (a as isize).wrapping_sub(b as isize) / size_of::<Slot<T>>() as isize
}

impl<T> RawCursor<T> {
    /// Creates a cursor at the first position of the buffer owned by `node`.
    ///
    /// # Safety
    ///
    /// `node` MUST point to a slot of a live map.
    pub(crate) unsafe fn at_slot(node: *mut Slot<T>) -> Self {
        let mut cursor = Self {
            cur: ptr::null_mut(),
            first: ptr::null_mut(),
            last: ptr::null_mut(),
            node,
        };
        // SAFETY: Requirements match function requirements.
        unsafe { cursor.reseat(node) };
        cursor.cur = cursor.first;
        cursor
    }

    /// Points this cursor at `node`, reloading the buffer bounds from the slot.
    ///
    /// `cur` is left untouched; the caller sets it afterwards.
    ///
    /// # Safety
    ///
    /// `node` MUST point to a slot of a live map.
    #[inline]
    pub(crate) unsafe fn reseat(&mut self, node: *mut Slot<T>) {
        self.node = node;
        // SAFETY: Caller guarantees `node` is a readable slot.
        self.first = unsafe { *node }.map_or(ptr::null_mut(), NonNull::as_ptr);
        self.last = self.first.wrapping_add(BufferLen::<T>::LEN);
    }

    /// Number of elements between the start of the buffer and `cur`.
    #[inline]
    pub(crate) fn offset_in_buffer(&self) -> usize {
        (self.cur as usize).wrapping_sub(self.first as usize) / size_of::<T>()
    }

    /// Number of positions from `cur` to the end of the buffer.
    #[inline]
    pub(crate) fn room_in_buffer(&self) -> usize {
        BufferLen::<T>::LEN - self.offset_in_buffer()
    }

    /// # Safety
    ///
    /// If `cur` is the last position of its buffer, the next map slot MUST exist.
    #[inline]
    pub(crate) unsafe fn advance_one(&mut self) {
        self.cur = self.cur.wrapping_add(1);
        if self.cur == self.last {
            // SAFETY: Caller guarantees the next slot exists.
            unsafe { self.reseat(self.node.wrapping_add(1)) };
            self.cur = self.first;
        }
    }

    /// # Safety
    ///
    /// If `cur` is the first position of its buffer, the previous map slot MUST own a buffer.
    #[inline]
    pub(crate) unsafe fn retreat_one(&mut self) {
        if self.cur == self.first {
            // SAFETY: Caller guarantees the previous slot exists.
            unsafe { self.reseat(self.node.wrapping_sub(1)) };
            self.cur = self.last;
        }
        self.cur = self.cur.wrapping_sub(1);
    }

    /// Moves the cursor `n` positions, crossing as many buffers as needed.
    ///
    /// # Safety
    ///
    /// The slot the cursor lands on MUST exist in the map.
    pub(crate) unsafe fn advance_by(&mut self, n: isize) {
        let len = BufferLen::<T>::ILEN;
        let offset = n + self.offset_in_buffer() as isize;
        if (0..len).contains(&offset) {
            self.cur = self.cur.wrapping_offset(n);
        } else {
            // Floor division: truncation would land one buffer too far right for negative offsets.
            let slot_delta = if offset > 0 {
                offset / len
            } else {
                -((-offset - 1) / len) - 1
            };
            // SAFETY: Caller guarantees the target slot exists.
            unsafe { self.reseat(self.node.wrapping_offset(slot_delta)) };
            self.cur = self.first.wrapping_offset(offset - slot_delta * len);
        }
    }

    /// Returns a copy of this cursor moved `n` positions.
    ///
    /// # Safety
    ///
    /// Same as [`Self::advance_by`].
    #[inline]
    pub(crate) unsafe fn plus(mut self, n: isize) -> Self {
        // SAFETY: Requirements match function requirements.
        unsafe { self.advance_by(n) };
        self
    }

    /// Number of elements from `other` up to `self` (`self - other`).
    ///
    /// Counts the full buffers strictly between the two slots plus the partial spans at each end.
    #[inline]
    pub(crate) fn distance_from(&self, other: &Self) -> isize {
        let len = BufferLen::<T>::ILEN;
        len * (slot_distance(self.node, other.node) - isize::from(!self.node.is_null()))
            + self.offset_in_buffer() as isize
            + other.room_in_buffer() as isize
    }
}

/// Moves `[first, last)` onto the range starting at `dest`, lowest position first.
///
/// Returns the cursor one past the last moved element at the destination. The source range is
/// left logically uninitialised.
///
/// # Safety
///
/// Both ranges MUST lie in buffers owned by the same map, every source position MUST be
/// initialised, and `dest` MUST not be after `first` when the ranges overlap.
pub(crate) unsafe fn move_forward<T>(
    mut first: RawCursor<T>,
    last: RawCursor<T>,
    mut dest: RawCursor<T>,
) -> RawCursor<T> {
    let mut remaining = last.distance_from(&first);
    while remaining > 0 {
        let chunk = remaining
            .min(first.room_in_buffer() as isize)
            .min(dest.room_in_buffer() as isize);
        // SAFETY: Both spans of `chunk` elements lie inside one buffer each; `ptr::copy`
        // handles the overlap when source and destination share a buffer.
        unsafe {
            ptr::copy(first.cur, dest.cur, chunk as usize);
            first.advance_by(chunk);
            dest.advance_by(chunk);
        }
        remaining -= chunk;
    }
    dest
}

/// Moves `[first, last)` onto the range ending at `dest_last`, highest position first.
///
/// Returns the cursor of the first moved element at the destination.
///
/// # Safety
///
/// Both ranges MUST lie in buffers owned by the same map, every source position MUST be
/// initialised, and `dest_last` MUST not be before `last` when the ranges overlap.
pub(crate) unsafe fn move_backward<T>(
    first: RawCursor<T>,
    mut last: RawCursor<T>,
    mut dest_last: RawCursor<T>,
) -> RawCursor<T> {
    let len = BufferLen::<T>::LEN;
    let mut remaining = last.distance_from(&first);
    while remaining > 0 {
        let mut src_room = last.offset_in_buffer();
        let mut src_end = last.cur;
        if src_room == 0 {
            src_room = len;
            // SAFETY: `remaining > 0` so the previous slot holds live elements.
            src_end = unsafe { (*last.node.wrapping_sub(1)).map_or(ptr::null_mut(), NonNull::as_ptr) }
                .wrapping_add(len);
        }
        let mut dst_room = dest_last.offset_in_buffer();
        let mut dst_end = dest_last.cur;
        if dst_room == 0 {
            dst_room = len;
            // SAFETY: The destination range is backed by allocated buffers.
            dst_end = unsafe {
                (*dest_last.node.wrapping_sub(1)).map_or(ptr::null_mut(), NonNull::as_ptr)
            }
            .wrapping_add(len);
        }
        let chunk = remaining.min(src_room as isize).min(dst_room as isize);
        // SAFETY: Both spans of `chunk` elements end inside one buffer each.
        unsafe {
            ptr::copy(
                src_end.wrapping_sub(chunk as usize),
                dst_end.wrapping_sub(chunk as usize),
                chunk as usize,
            );
            last.advance_by(-chunk);
            dest_last.advance_by(-chunk);
        }
        remaining -= chunk;
    }
    dest_last
}

/// Drops every element in `[first, last)` in place, buffer by buffer.
///
/// If a destructor panics, the remaining buffers are still dropped while unwinding.
///
/// # Safety
///
/// Every position in the range MUST be initialised and is uninitialised afterwards.
pub(crate) unsafe fn drop_range<T>(first: RawCursor<T>, last: RawCursor<T>) {
    /// Drops whatever is left of the range when dropped itself.
    struct Rest<T> {
        next: RawCursor<T>,
        last: RawCursor<T>,
    }

    impl<T> Drop for Rest<T> {
        fn drop(&mut self) {
            // SAFETY: `[next, last)` has not been dropped yet.
            unsafe { drop_segments(&mut self.next, self.last) };
        }
    }

    if !needs_drop::<T>() {
        return;
    }
    let mut rest = Rest { next: first, last };
    // SAFETY: Caller guarantees the span is initialised.
    unsafe { drop_segments(&mut rest.next, last) };
}

/// Drops `[next, last)` one buffer segment at a time, moving `next` past each segment before
/// dropping it.
///
/// # Safety
///
/// Every position in the range MUST be initialised.
unsafe fn drop_segments<T>(next: &mut RawCursor<T>, last: RawCursor<T>) {
    while next.node != last.node {
        let segment = ptr::slice_from_raw_parts_mut(next.cur, next.room_in_buffer());
        // SAFETY: Every slot up to `last.node` owns a buffer of the range.
        unsafe {
            next.reseat(next.node.add(1));
            next.cur = next.first;
            ptr::drop_in_place(segment);
        }
    }
    let n = last.offset_in_buffer() - next.offset_in_buffer();
    let segment = ptr::slice_from_raw_parts_mut(next.cur, n);
    next.cur = last.cur;
    // SAFETY: Caller guarantees the span is initialised.
    unsafe { ptr::drop_in_place(segment) };
}

/// A read-only position in a deque supporting random-access jumps.
///
/// Obtained from [`AllocatedDeque::begin`], [`AllocatedDeque::end`] or
/// [`AllocatedDeque::cursor_at`]. The end cursor is one past the last element; calling
/// [`Cursor::get`] on it returns `None`.
///
/// # Examples
///
/// ```
/// use allocated_deque::Deque;
///
/// let deque: Deque<u32> = (0..10).collect();
/// let begin = deque.begin();
/// let mid = begin + 4;
///
/// assert_eq!(mid.get(), Some(&4));
/// assert_eq!(deque.end() - mid, 6);
/// assert_eq!((deque.end() - 1).get(), Some(&9));
/// assert_eq!(deque.end().get(), None);
/// ```
pub struct Cursor<'a, T> {
    raw: RawCursor<T>,
    deque: &'a AllocatedDeque<T>,
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<'a, T> Cursor<'a, T> {
    pub(super) fn new(deque: &'a AllocatedDeque<T>, raw: RawCursor<T>) -> Self {
        Self { raw, deque }
    }

    /// Returns the index of the element this cursor points at.
    pub fn index(&self) -> usize {
        self.raw.distance_from(&self.deque.front) as usize
    }

    /// Returns `true` if this is the end cursor.
    pub fn is_end(&self) -> bool {
        self.raw == self.deque.back
    }

    /// Returns the element under the cursor, or `None` at the end.
    pub fn get(&self) -> Option<&'a T> {
        if self.is_end() {
            return None;
        }
        // SAFETY: Positions in `[front, back)` are initialised and outlive `'a`.
        Some(unsafe { &*self.raw.cur })
    }

    /// Returns the element `n` positions away, if it exists.
    pub fn peek(&self, n: isize) -> Option<&'a T> {
        self.offset(n).and_then(|c| c.get())
    }

    /// Steps forward; stays put at the end.
    pub fn move_next(&mut self) {
        if !self.is_end() {
            // SAFETY: The cursor is inside the live range, so the next position exists.
            unsafe { self.raw.advance_one() };
        }
    }

    /// Steps backward; stays put at the beginning.
    pub fn move_prev(&mut self) {
        if self.raw != self.deque.front {
            // SAFETY: The cursor is after `front`, so the previous position is live.
            unsafe { self.raw.retreat_one() };
        }
    }

    /// Returns the cursor `n` positions away, or `None` if that leaves `[begin, end]`.
    pub fn offset(self, n: isize) -> Option<Self> {
        let target = (self.index() as isize).checked_add(n)?;
        if target < 0 || target as usize > self.deque.len() {
            return None;
        }
        // SAFETY: The target lies within `[front, back]`, whose slots own buffers.
        let raw = unsafe { self.raw.plus(n) };
        Some(Self { raw, deque: self.deque })
    }
}

impl<'a, T> Add<isize> for Cursor<'a, T> {
    type Output = Cursor<'a, T>;

    /// # Panics
    ///
    /// Panics if the result lies outside `[begin, end]`.
    fn add(self, n: isize) -> Self::Output {
        match self.offset(n) {
            Some(cursor) => cursor,
            None => panic!("cursor moved out of range"),
        }
    }
}

impl<'a, T> Sub<isize> for Cursor<'a, T> {
    type Output = Cursor<'a, T>;

    /// # Panics
    ///
    /// Panics if the result lies outside `[begin, end]`.
    fn sub(self, n: isize) -> Self::Output {
        self + n.wrapping_neg()
    }
}

impl<'a, T> Sub<Cursor<'a, T>> for Cursor<'a, T> {
    type Output = isize;

    fn sub(self, rhs: Cursor<'a, T>) -> isize {
        self.raw.distance_from(&rhs.raw)
    }
}

impl<T> PartialEq for Cursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T> PartialOrd for Cursor<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Cursor<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("index", &self.index()).finish()
    }
}

/// A position in a deque that can modify the element under it.
///
/// Obtained from [`AllocatedDeque::cursor_mut_at`].
pub struct CursorMut<'a, T> {
    raw: RawCursor<T>,
    deque: &'a mut AllocatedDeque<T>,
}

impl<'a, T> CursorMut<'a, T> {
    pub(super) fn new(deque: &'a mut AllocatedDeque<T>, raw: RawCursor<T>) -> Self {
        Self { raw, deque }
    }

    /// Returns the index of the element this cursor points at.
    pub fn index(&self) -> usize {
        self.raw.distance_from(&self.deque.front) as usize
    }

    /// Returns `true` if this is the end cursor.
    pub fn is_end(&self) -> bool {
        self.raw == self.deque.back
    }

    /// Returns the element under the cursor, or `None` at the end.
    pub fn get(&self) -> Option<&T> {
        if self.is_end() {
            return None;
        }
        // SAFETY: Positions in `[front, back)` are initialised.
        Some(unsafe { &*self.raw.cur })
    }

    /// Returns the element under the cursor mutably, or `None` at the end.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.is_end() {
            return None;
        }
        // SAFETY: Positions in `[front, back)` are initialised and uniquely borrowed.
        Some(unsafe { &mut *self.raw.cur })
    }

    /// Steps forward; stays put at the end.
    pub fn move_next(&mut self) {
        if !self.is_end() {
            // SAFETY: The cursor is inside the live range.
            unsafe { self.raw.advance_one() };
        }
    }

    /// Steps backward; stays put at the beginning.
    pub fn move_prev(&mut self) {
        if self.raw != self.deque.front {
            // SAFETY: The cursor is after `front`.
            unsafe { self.raw.retreat_one() };
        }
    }

    /// Jumps `n` positions. Returns `false` and stays put if that leaves `[begin, end]`.
    pub fn seek(&mut self, n: isize) -> bool {
        let Some(target) = (self.index() as isize).checked_add(n) else {
            return false;
        };
        if target < 0 || target as usize > self.deque.len() {
            return false;
        }
        // SAFETY: The target lies within `[front, back]`.
        unsafe { self.raw.advance_by(n) };
        true
    }

    /// Reborrows as a read-only [`Cursor`].
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor::new(self.deque, self.raw)
    }
}

impl<T> fmt::Debug for CursorMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorMut").field("index", &self.index()).finish()
    }
}
