//! Contiguous double-ended storage for `Array`.
//!
//! One allocator block holds a small header followed by `capacity` slots:
//!
//! ```text
//! +--------------------------+------+-----------------------+------+
//! | head | capacity | bias   | free | count live elements   | free |
//! +--------------------------+------+-----------------------+------+
//!                             0      head            head+count     capacity
//! ```
//!
//! Logical element `i` lives in slot `head + i`, and `head + count <=
//! capacity` always holds, so the live elements are one contiguous run.
//!
//! Every edit is a splice: replace `remove` elements at `start` with
//! `new_count` fresh ones. Naming the segments `L` (room before head), `A`
//! (elements before the edit), `B` (removed), `C` (elements after the edit)
//! and `R` (room after the end), an edit either reallocates, moves the
//! smaller of `A` and `C`, or recenters the run inside the block. Pushing or
//! popping at an end with room on that side only adjusts `head` and `count`.

use crate::alloc::AllocatorRef;
use crate::error::CollectionError;
use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

#[repr(C)]
struct Header {
    head: usize,
    capacity: usize,
    /// Side of center the next recenter favors; flips every recenter.
    bias: bool,
}

fn block_layout<T>(capacity: usize) -> Option<(Layout, usize)> {
    let slots = Layout::array::<T>(capacity).ok()?;
    let (layout, offset) = Layout::new::<Header>().extend(slots).ok()?;
    Some((layout.pad_to_align(), offset))
}

/// Capacity for a block that must hold `n` slots: the next power of two for
/// small blocks, half again for large ones.
fn round_up(n: usize) -> Option<usize> {
    if n < 1024 {
        Some(n.next_power_of_two().max(4))
    } else {
        n.checked_add(n / 2)
    }
}

fn too_large() -> CollectionError {
    CollectionError::AllocationFailed { bytes: usize::MAX }
}

pub(crate) struct Deque<T> {
    block: Option<NonNull<Header>>,
    len: usize,
    allocator: AllocatorRef,
    _owns: PhantomData<T>,
}

impl<T> Deque<T> {
    pub fn new(allocator: AllocatorRef) -> Self {
        Self {
            block: None,
            len: 0,
            allocator,
            _owns: PhantomData,
        }
    }

    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn header(&self) -> Option<&Header> {
        // SAFETY: the header is initialized whenever the block exists.
        self.block.map(|b| unsafe { &*b.as_ptr() })
    }

    fn header_mut(&mut self) -> Option<&mut Header> {
        // SAFETY: as above; `&mut self` gives exclusive access.
        self.block.map(|b| unsafe { &mut *b.as_ptr() })
    }

    pub fn head(&self) -> usize {
        self.header().map_or(0, |h| h.head)
    }

    pub fn capacity(&self) -> usize {
        self.header().map_or(0, |h| h.capacity)
    }

    #[cfg(test)]
    fn bias(&self) -> bool {
        self.header().is_some_and(|h| h.bias)
    }

    /// Pointer to slot `i` of `block`.
    ///
    /// # Safety
    /// `block` must be a live block of this element type with more than `i`
    /// slots (or exactly `i`, for a one-past-the-end pointer).
    unsafe fn slot_in(block: NonNull<Header>, i: usize) -> *mut T {
        let offset = block_layout::<T>(0).map_or(0, |(_, o)| o);
        (block.as_ptr() as *mut u8).add(offset).cast::<T>().add(i)
    }

    pub fn as_slice(&self) -> &[T] {
        match self.block {
            // SAFETY: slots head..head+len are initialized.
            Some(b) => unsafe { core::slice::from_raw_parts(Self::slot_in(b, self.head()), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let head = self.head();
        match self.block {
            // SAFETY: as above, and `&mut self` gives exclusive access.
            Some(b) => unsafe { core::slice::from_raw_parts_mut(Self::slot_in(b, head), self.len) },
            None => &mut [],
        }
    }

    /// True when `push_back` can store without moving anything.
    pub fn has_room_back(&self) -> bool {
        self.block.is_some() && self.head() + self.len < self.capacity()
    }

    pub fn has_room_front(&self) -> bool {
        self.head() > 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Append at the back. Uses the slack after the end when there is some.
    pub fn push_back(&mut self, value: T) -> Result<(), CollectionError> {
        if let (Some(b), true) = (self.block, self.has_room_back()) {
            // SAFETY: slot head+len is free and inside the block.
            unsafe { Self::slot_in(b, self.head() + self.len).write(value) };
            self.len += 1;
            return Ok(());
        }
        let len = self.len;
        self.splice(len, 0, core::iter::once(value)).map(drop)
    }

    /// Prepend at the front. Uses the slack before the head when there is some.
    pub fn push_front(&mut self, value: T) -> Result<(), CollectionError> {
        if let (Some(b), true) = (self.block, self.has_room_front()) {
            let head = self.head();
            // SAFETY: slot head-1 is free and inside the block.
            unsafe { Self::slot_in(b, head - 1).write(value) };
            if let Some(h) = self.header_mut() {
                h.head = head - 1;
            }
            self.len += 1;
            return Ok(());
        }
        self.splice(0, 0, core::iter::once(value)).map(drop)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let b = self.block?;
        if self.len == 0 {
            return None;
        }
        let head = self.head();
        // SAFETY: slot head is live; it is excluded from the run right after.
        let value = unsafe { Self::slot_in(b, head).read() };
        if let Some(h) = self.header_mut() {
            h.head = head + 1;
        }
        self.len -= 1;
        Some(value)
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let b = self.block?;
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot head+len was live and is now outside the run.
        Some(unsafe { Self::slot_in(b, self.head() + self.len).read() })
    }

    /// Replace the `remove` elements at `start` with the items of `items`,
    /// returning the removed elements.
    ///
    /// Storage is allocated before anything moves, so a failed allocation
    /// leaves the deque untouched and `items` unconsumed. If `items` yields
    /// fewer elements than it promised, the gap is closed behind the ones it
    /// did yield.
    pub fn splice<I>(&mut self, start: usize, remove: usize, items: I) -> Result<Vec<T>, CollectionError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let items = items.into_iter();
        let new_count = items.len();
        let count = self.len;
        debug_assert!(start <= count && remove <= count - start, "splice out of range");
        let future = (count - remove).checked_add(new_count).ok_or_else(too_large)?;
        if self.block.is_none() && future == 0 {
            return Ok(Vec::new());
        }

        let (head, cap) = (self.head(), self.capacity());
        let room = cap - count;
        let growing = new_count > remove;
        let wiggle = (cap >> 10).max(4);
        if cap < future || (growing && room < wiggle) {
            self.splice_reallocate(start, remove, future, wiggle, items)
        } else {
            Ok(self.splice_in_place(head, start, remove, items))
        }
    }

    fn splice_reallocate<I>(
        &mut self,
        start: usize,
        remove: usize,
        future: usize,
        wiggle: usize,
        items: I,
    ) -> Result<Vec<T>, CollectionError>
    where
        I: ExactSizeIterator<Item = T>,
    {
        let new_count = items.len();
        let want = future.checked_add(wiggle).ok_or_else(too_large)?;
        let new_cap = round_up(want).ok_or_else(too_large)?;
        let (layout, _) = block_layout::<T>(new_cap).ok_or_else(too_large)?;
        let Some(raw) = self.allocator.allocate(layout) else {
            crate::rc_critical!(
                "array storage growth to {} slots ({} bytes) failed",
                new_cap,
                layout.size()
            );
            return Err(CollectionError::AllocationFailed { bytes: layout.size() });
        };

        let new_block = raw.cast::<Header>();
        let new_head = (new_cap - future) / 2;
        let bias = self.header().is_some_and(|h| h.bias);
        // SAFETY: fresh block large enough for the header.
        unsafe {
            new_block.as_ptr().write(Header {
                head: new_head,
                capacity: new_cap,
                bias,
            })
        };

        let count = self.len;
        let after = count - start - remove;
        let head = self.head();
        let removed = self.read_run(head + start, remove);
        // Until the run is whole again, a panic leaks instead of double-dropping.
        self.len = 0;
        if let Some(old) = self.block.take() {
            let old_cap = self.capacity_of(old);
            // SAFETY: source runs are live slots of the old block; targets are
            // disjoint free slots of the new one.
            unsafe {
                ptr::copy_nonoverlapping(
                    Self::slot_in(old, head),
                    Self::slot_in(new_block, new_head),
                    start,
                );
                ptr::copy_nonoverlapping(
                    Self::slot_in(old, head + start + remove),
                    Self::slot_in(new_block, new_head + start + new_count),
                    after,
                );
            }
            if let Some((old_layout, _)) = block_layout::<T>(old_cap) {
                self.allocator.deallocate(old.cast(), old_layout);
            }
        }
        crate::rc_trace!(
            "array storage reallocated to {} slots for {} elements",
            new_cap,
            future
        );
        self.block = Some(new_block);
        self.fill(new_head, start, new_count, after, items);
        Ok(removed)
    }

    fn capacity_of(&self, block: NonNull<Header>) -> usize {
        // SAFETY: header of a live block.
        unsafe { (*block.as_ptr()).capacity }
    }

    fn splice_in_place<I>(&mut self, head: usize, start: usize, remove: usize, items: I) -> Vec<T>
    where
        I: ExactSizeIterator<Item = T>,
    {
        let Some(block) = self.block else {
            return Vec::new();
        };
        let new_count = items.len();
        let count = self.len;
        let cap = self.capacity();
        let before = start;
        let after = count - start - remove;
        let room_front = head;
        let room_back = cap - head - count;
        let old_after_at = head + start + remove;

        let removed = self.read_run(head + start, remove);
        self.len = 0;

        // SAFETY (all copies below): every source run is live, every target
        // lies inside the block, and `ptr::copy` tolerates overlap.
        let move_after = |new_after_at: usize| unsafe {
            ptr::copy(
                Self::slot_in(block, old_after_at),
                Self::slot_in(block, new_after_at),
                after,
            )
        };
        let move_before = |new_head: usize| unsafe {
            ptr::copy(Self::slot_in(block, head), Self::slot_in(block, new_head), before)
        };

        let new_head = if new_count == remove {
            head
        } else if new_count < remove {
            let shrink = remove - new_count;
            if after < before {
                move_after(head + start + new_count);
                head
            } else {
                move_before(head + shrink);
                head + shrink
            }
        } else {
            let grow = new_count - remove;
            if grow <= room_back && after < before {
                move_after(head + start + new_count);
                head
            } else if grow <= room_front && before <= after {
                move_before(head - grow);
                head - grow
            } else {
                let free = room_front + room_back - grow;
                let (mid, skew) = (free / 2, free / 8);
                let bias = self.header().is_some_and(|h| h.bias);
                let new_head = if bias { mid + skew } else { mid - skew };
                if let Some(h) = self.header_mut() {
                    h.bias = !bias;
                }
                let new_after_at = new_head + start + new_count;
                if new_head < head {
                    move_before(new_head);
                    move_after(new_after_at);
                } else {
                    move_after(new_after_at);
                    move_before(new_head);
                }
                crate::rc_trace!("array recentered: head {} -> {}", head, new_head);
                new_head
            }
        };

        if let Some(h) = self.header_mut() {
            h.head = new_head;
        }
        self.fill(new_head, start, new_count, after, items);
        removed
    }

    /// Write `items` into the gap at `start`, then publish the new length.
    fn fill<I>(&mut self, head: usize, start: usize, new_count: usize, after: usize, items: I)
    where
        I: Iterator<Item = T>,
    {
        let Some(block) = self.block else {
            return;
        };
        let gap = head + start;
        let mut written = 0;
        for item in items.take(new_count) {
            // SAFETY: slots gap..gap+new_count are the free gap.
            unsafe { Self::slot_in(block, gap + written).write(item) };
            written += 1;
        }
        if written < new_count {
            // SAFETY: close the unfilled part of the gap.
            unsafe {
                ptr::copy(
                    Self::slot_in(block, gap + new_count),
                    Self::slot_in(block, gap + written),
                    after,
                )
            };
        }
        self.len = start + written + after;
    }

    /// Move `n` elements starting at absolute slot `from` out of the block.
    fn read_run(&self, from: usize, n: usize) -> Vec<T> {
        let Some(block) = self.block else {
            return Vec::new();
        };
        // SAFETY: the caller excludes these slots from the live run before
        // anything can observe them again.
        (0..n)
            .map(|k| unsafe { Self::slot_in(block, from + k).read() })
            .collect()
    }

    /// Remove every element and free the block.
    pub fn take_all(&mut self) -> Vec<T> {
        let head = self.head();
        let out = self.read_run(head, self.len);
        self.len = 0;
        self.free_block();
        out
    }

    fn free_block(&mut self) {
        if let Some(b) = self.block.take() {
            let cap = self.capacity_of(b);
            if let Some((layout, _)) = block_layout::<T>(cap) {
                self.allocator.deallocate(b.cast(), layout);
            }
        }
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        let live: *mut [T] = self.as_mut_slice();
        self.len = 0;
        // SAFETY: the live run is dropped once, then the block is freed.
        unsafe { ptr::drop_in_place(live) };
        self.free_block();
    }
}
