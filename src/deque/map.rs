//! Map management: laying out the slot array, growing or recentring it, and attaching or
//! releasing buffers at either end.

use core::ptr;

use allocator_api2::alloc::Allocator;
use tracing::{debug, trace};

use super::buffer::{
    allocate_buffer, allocate_map, deallocate_buffer, deallocate_map, BufferLen, Slot,
    INITIAL_MAP_SIZE,
};
use super::cursor::RawCursor;
use super::AllocatedDeque;
use crate::error::{DequeError, DequeResult};

/// Number of slots from `from` up to `to`.
#[inline]
fn slots_between<T>(to: *mut Slot<T>, from: *mut Slot<T>) -> usize {
    (to as usize - from as usize) / core::mem::size_of::<Slot<T>>()
}

impl<T> AllocatedDeque<T> {
    /// Allocates a map and enough buffers for `n` elements, centred in the map.
    ///
    /// On return `front` is at the start of the first buffer and `back` is `n` positions later.
    /// The elements themselves are not written.
    pub(super) fn initialize_map<A: Allocator>(alloc: &A, n: usize) -> DequeResult<Self> {
        let len = BufferLen::<T>::LEN;
        if n > isize::MAX as usize / core::mem::size_of::<T>() {
            return Err(DequeError::CapacityOverflow);
        }
        let num_nodes = n / len + 1;
        let map_size = INITIAL_MAP_SIZE.max(num_nodes + 2);
        let map = allocate_map::<T, A>(alloc, map_size)?;

        // SAFETY: `num_nodes + 2 <= map_size`, so the centred run of slots is inside the map.
        let start = unsafe { map.as_ptr().add((map_size - num_nodes) / 2) };
        // SAFETY: The run `[start, start + num_nodes)` is inside the map and empty.
        if let Err(err) = unsafe { Self::create_buffers(alloc, start, num_nodes) } {
            // SAFETY: The map was allocated above and owns no buffer any more.
            unsafe { deallocate_map(alloc, map, map_size) };
            return Err(err);
        }

        // SAFETY: Both slots were just given buffers.
        let (front, back) = unsafe {
            let front = RawCursor::at_slot(start);
            let mut back = RawCursor::at_slot(start.add(num_nodes - 1));
            back.cur = back.first.add(n % len);
            (front, back)
        };
        trace!(n, map_size, num_nodes, "initialized deque map");
        Ok(Self {
            front,
            back,
            map,
            map_size,
            map_reallocations: 0,
        })
    }

    /// Gives each of the `count` slots starting at `start` a fresh buffer.
    ///
    /// On failure every buffer allocated here is released again.
    ///
    /// # Safety
    ///
    /// The slots MUST exist and be empty.
    unsafe fn create_buffers<A: Allocator>(
        alloc: &A,
        start: *mut Slot<T>,
        count: usize,
    ) -> DequeResult<()> {
        for i in 0..count {
            match allocate_buffer::<T, A>(alloc) {
                // SAFETY: Caller guarantees the slot exists.
                Ok(buffer) => unsafe { *start.add(i) = Some(buffer) },
                Err(err) => {
                    debug!(allocated = i, requested = count, "buffer allocation failed");
                    // SAFETY: Exactly the first `i` slots were filled above.
                    unsafe { Self::release_slots(alloc, start, start.add(i)) };
                    return Err(err);
                }
            }
        }
        trace!(count, "allocated buffer batch");
        Ok(())
    }

    /// Frees the buffers owned by the slots in `[from, to)` and empties those slots.
    ///
    /// # Safety
    ///
    /// The slots MUST belong to a live map allocated by `alloc`, and the buffers MUST hold no
    /// live element.
    pub(super) unsafe fn release_slots<A: Allocator>(
        alloc: &A,
        from: *mut Slot<T>,
        to: *mut Slot<T>,
    ) {
        let mut node = from;
        while node < to {
            // SAFETY: Caller guarantees `node` is a slot of a live map.
            if let Some(buffer) = unsafe { (*node).take() } {
                // SAFETY: Caller guarantees the buffer came from `alloc` and is dead.
                unsafe { deallocate_buffer(alloc, buffer) };
            }
            node = node.wrapping_add(1);
        }
    }

    /// Makes room for `nodes_to_add` more slots at one end of the live run.
    ///
    /// If the map is more than twice as large as needed, the live run is recentred in place.
    /// Otherwise a larger map is allocated and the slots are copied into its centre. No
    /// element moves either way.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    unsafe fn reallocate_map<A: Allocator>(
        &mut self,
        alloc: &A,
        nodes_to_add: usize,
        add_at_front: bool,
    ) -> DequeResult<()> {
        let old_num_nodes = slots_between(self.back.node, self.front.node) + 1;
        let new_num_nodes = old_num_nodes
            .checked_add(nodes_to_add)
            .ok_or(DequeError::CapacityOverflow)?;
        let front_pad = if add_at_front { nodes_to_add } else { 0 };

        let new_start = if new_num_nodes
            .checked_mul(2)
            .is_some_and(|twice| self.map_size > twice)
        {
            let map = self.map.as_ptr();
            // SAFETY: `new_num_nodes < map_size / 2`, so the recentred run fits in the map.
            unsafe {
                let new_start = map.add((self.map_size - new_num_nodes) / 2 + front_pad);
                ptr::copy(self.front.node, new_start, old_num_nodes);
                let new_end = new_start.add(old_num_nodes);
                let mut node = map;
                while node < map.add(self.map_size) {
                    if node < new_start || node >= new_end {
                        node.write(None);
                    }
                    node = node.add(1);
                }
                trace!(
                    map_size = self.map_size,
                    old_num_nodes,
                    new_num_nodes,
                    "recentred deque map"
                );
                new_start
            }
        } else {
            let new_map_size = self
                .map_size
                .checked_add(self.map_size.max(nodes_to_add))
                .and_then(|size| size.checked_add(2))
                .ok_or(DequeError::CapacityOverflow)?;
            let new_map = allocate_map::<T, A>(alloc, new_map_size)?;
            // SAFETY: `new_map_size >= new_num_nodes + 2`; the old run is copied into fresh
            // memory and the old map, whose buffers now belong to the new one, is freed.
            unsafe {
                let new_start = new_map
                    .as_ptr()
                    .add((new_map_size - new_num_nodes) / 2 + front_pad);
                ptr::copy_nonoverlapping(self.front.node, new_start, old_num_nodes);
                deallocate_map(alloc, self.map, self.map_size);
                trace!(
                    old_map_size = self.map_size,
                    new_map_size,
                    new_num_nodes,
                    "grew deque map"
                );
                self.map = new_map;
                self.map_size = new_map_size;
                new_start
            }
        };

        // SAFETY: Both slots are inside the (possibly new) map and own the same buffers as before.
        unsafe {
            self.front.reseat(new_start);
            self.back.reseat(new_start.add(old_num_nodes - 1));
        }
        self.map_reallocations += 1;
        Ok(())
    }

    /// Ensures at least `nodes_to_add` empty slots exist after `back`'s slot.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub(super) unsafe fn reserve_slots_at_back<A: Allocator>(
        &mut self,
        alloc: &A,
        nodes_to_add: usize,
    ) -> DequeResult<()> {
        let used = slots_between(self.back.node, self.map.as_ptr());
        if nodes_to_add.saturating_add(1) > self.map_size - used {
            // SAFETY: Requirements match function requirements.
            unsafe { self.reallocate_map(alloc, nodes_to_add, false)? };
        }
        Ok(())
    }

    /// Ensures at least `nodes_to_add` empty slots exist before `front`'s slot.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub(super) unsafe fn reserve_slots_at_front<A: Allocator>(
        &mut self,
        alloc: &A,
        nodes_to_add: usize,
    ) -> DequeResult<()> {
        if nodes_to_add > slots_between(self.front.node, self.map.as_ptr()) {
            // SAFETY: Requirements match function requirements.
            unsafe { self.reallocate_map(alloc, nodes_to_add, true)? };
        }
        Ok(())
    }

    /// Makes room for `n` elements before `front` and returns the would-be new front.
    ///
    /// `front` itself is not moved; the caller commits the new position once the elements are
    /// written. On failure nothing changes except, possibly, the map's layout.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub(super) unsafe fn reserve_elements_at_front<A: Allocator>(
        &mut self,
        alloc: &A,
        n: usize,
    ) -> DequeResult<RawCursor<T>> {
        let vacancies = self.front.offset_in_buffer();
        if n > vacancies {
            // SAFETY: Requirements match function requirements.
            unsafe { self.new_buffers_at_front(alloc, n - vacancies)? };
        }
        // SAFETY: The slots covering the `n` positions before `front` now own buffers.
        Ok(unsafe { self.front.plus(-(n as isize)) })
    }

    /// Makes room for `n` elements after `back` and returns the would-be new back.
    ///
    /// # Safety
    ///
    /// `alloc` MUST be the allocator used to allocate this object.
    pub(super) unsafe fn reserve_elements_at_back<A: Allocator>(
        &mut self,
        alloc: &A,
        n: usize,
    ) -> DequeResult<RawCursor<T>> {
        let vacancies = self.back.room_in_buffer() - 1;
        if n > vacancies {
            // SAFETY: Requirements match function requirements.
            unsafe { self.new_buffers_at_back(alloc, n - vacancies)? };
        }
        // SAFETY: The slots covering the `n` positions after `back` now own buffers.
        Ok(unsafe { self.back.plus(n as isize) })
    }

    unsafe fn new_buffers_at_front<A: Allocator>(
        &mut self,
        alloc: &A,
        new_elements: usize,
    ) -> DequeResult<()> {
        if new_elements > self.max_size() - self.len() {
            return Err(DequeError::CapacityOverflow);
        }
        let new_nodes = new_elements.div_ceil(BufferLen::<T>::LEN);
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.reserve_slots_at_front(alloc, new_nodes)?;
            Self::create_buffers(alloc, self.front.node.sub(new_nodes), new_nodes)
        }
    }

    unsafe fn new_buffers_at_back<A: Allocator>(
        &mut self,
        alloc: &A,
        new_elements: usize,
    ) -> DequeResult<()> {
        if new_elements > self.max_size() - self.len() {
            return Err(DequeError::CapacityOverflow);
        }
        let new_nodes = new_elements.div_ceil(BufferLen::<T>::LEN);
        // SAFETY: Requirements match function requirements.
        unsafe {
            self.reserve_slots_at_back(alloc, new_nodes)?;
            Self::create_buffers(alloc, self.back.node.add(1), new_nodes)
        }
    }
}
