//! Open-addressing hash table engine shared by `Dictionary` and `Bag`.
//!
//! Storage is one allocator-provided array of [`Slot`]s whose length is a
//! power of two. Probing is linear with wraparound, starting at the
//! Jenkins-mixed hash masked to the capacity. Each slot carries an explicit
//! state tag, so every key bit pattern is storable; there is no reserved
//! marker value to relocate.
//!
//! Invariants
//! - `capacity` is zero (unallocated) or a power of two >= `MIN_CAPACITY`.
//! - `occupied <= threshold <= capacity`, with
//!   `threshold = min(capacity * 3 / 4, max)` for bounded tables.
//! - At least one slot is `Empty` whenever storage exists
//!   (`occupied + deleted <= threshold < capacity`), so probes terminate.
//!
//! Entries cache the callback hash they were inserted with; growth re-probes
//! by cached hash and never calls back into user code.

use crate::alloc::AllocatorRef;
use crate::error::CollectionError;
use core::alloc::Layout;
use core::ptr::NonNull;

const MIN_CAPACITY: usize = 4;

pub(crate) enum Slot<E> {
    Empty,
    Deleted,
    Occupied(E),
}

/// An entry that remembers the hash it was inserted under.
pub(crate) trait Hashed {
    fn cached_hash(&self) -> u32;
}

/// Bob Jenkins' 32-bit integer avalanche.
#[inline]
pub fn jenkins_mix(mut a: u32) -> u32 {
    a = a.wrapping_add(0x7ed5_5d16).wrapping_add(a << 12);
    a = (a ^ 0xc761_c23c) ^ (a >> 19);
    a = a.wrapping_add(0x1656_67b1).wrapping_add(a << 5);
    a = a.wrapping_add(0xd3a2_646c) ^ (a << 9);
    a = a.wrapping_add(0xfd70_46c5).wrapping_add(a << 3);
    a = (a ^ 0xb55a_4f09) ^ (a >> 16);
    a
}

/// Result of a single probe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Probe {
    pub matched: Option<usize>,
    /// First Empty or Deleted slot seen before the probe ended.
    pub reusable: Option<usize>,
}

/// Resumable position for bounded-batch enumeration.
///
/// A cursor is tied to the container state it started on: any mutation in
/// between ends the enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCursor {
    pub(crate) position: usize,
    pub(crate) generation: Option<u64>,
}

impl BatchCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fresh cursor to `generation`; false when it was started on a
    /// different one.
    pub(crate) fn attach(&mut self, generation: u64) -> bool {
        match self.generation {
            None => {
                self.generation = Some(generation);
                true
            }
            Some(g) => g == generation,
        }
    }
}

pub(crate) struct RawTable<E> {
    slots: Option<NonNull<Slot<E>>>,
    capacity: usize,
    occupied: usize,
    deleted: usize,
    threshold: usize,
    /// Hard cap on live entries; `None` grows without bound.
    max: Option<usize>,
    generation: u64,
    allocator: AllocatorRef,
}

fn slots_layout<E>(capacity: usize) -> Option<Layout> {
    Layout::array::<Slot<E>>(capacity).ok()
}

impl<E: Hashed> RawTable<E> {
    pub fn new(allocator: AllocatorRef, max: Option<usize>) -> Self {
        Self {
            slots: None,
            capacity: 0,
            occupied: 0,
            deleted: 0,
            threshold: 0,
            max,
            generation: 0,
            allocator,
        }
    }

    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn slots(&self) -> &[Slot<E>] {
        match self.slots {
            // SAFETY: `capacity` slots were initialized when the block was made.
            Some(p) => unsafe { core::slice::from_raw_parts(p.as_ptr(), self.capacity) },
            None => &[],
        }
    }

    fn slots_mut(&mut self) -> &mut [Slot<E>] {
        match self.slots {
            // SAFETY: as above, and `&mut self` gives exclusive access.
            Some(p) => unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), self.capacity) },
            None => &mut [],
        }
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        match self.slots().get(index) {
            Some(Slot::Occupied(e)) => Some(e),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut E> {
        self.generation += 1;
        match self.slots_mut().get_mut(index) {
            Some(Slot::Occupied(e)) => Some(e),
            _ => None,
        }
    }

    /// Probe for an entry with `hash` accepted by `eq`.
    pub fn find(&self, hash: u32, eq: impl FnMut(&E) -> bool) -> Option<usize> {
        self.probe(hash, eq, false).matched
    }

    /// Like `find`, but also report the first reusable slot on the way.
    pub fn find_buckets(&self, hash: u32, eq: impl FnMut(&E) -> bool) -> Probe {
        self.probe(hash, eq, true)
    }

    fn probe(&self, hash: u32, mut eq: impl FnMut(&E) -> bool, want_reusable: bool) -> Probe {
        let slots = self.slots();
        let mut out = Probe::default();
        if slots.is_empty() {
            return out;
        }
        let mask = self.capacity - 1;
        let mut idx = jenkins_mix(hash) as usize & mask;
        for _ in 0..self.capacity {
            match &slots[idx] {
                Slot::Empty => {
                    if want_reusable && out.reusable.is_none() {
                        out.reusable = Some(idx);
                    }
                    return out;
                }
                Slot::Deleted => {
                    if want_reusable && out.reusable.is_none() {
                        out.reusable = Some(idx);
                    }
                }
                Slot::Occupied(e) => {
                    if e.cached_hash() == hash && eq(e) {
                        out.matched = Some(idx);
                        return out;
                    }
                }
            }
            idx = (idx + 1) & mask;
        }
        out
    }

    /// Make room for one more entry, growing or rebuilding if needed.
    ///
    /// Returns `Ok(true)` when slots moved, which invalidates earlier probes.
    pub fn reserve_one(&mut self) -> Result<bool, CollectionError> {
        if self.slots.is_some() && self.occupied + self.deleted < self.threshold {
            return Ok(false);
        }
        if self.slots.is_some() && self.occupied < self.threshold {
            // Only tombstones are in the way: rebuild at the same size.
            let cap = self.capacity;
            self.rebuild(cap)?;
            return Ok(true);
        }
        if let Some(max) = self.max {
            if self.occupied >= max {
                crate::rc_trace!("bounded table full at {} entries", max);
                return Err(CollectionError::CapacityExceeded { max });
            }
        }
        self.expand(1)?;
        Ok(true)
    }

    /// Grow so that `needed` more entries fit under the threshold.
    pub fn expand(&mut self, needed: usize) -> Result<(), CollectionError> {
        let want = self.occupied + needed;
        let mut cap = MIN_CAPACITY;
        while cap * 3 / 4 < want {
            cap = cap.checked_mul(2).ok_or(CollectionError::AllocationFailed {
                bytes: usize::MAX,
            })?;
        }
        self.rebuild(cap.max(self.capacity))
    }

    fn rebuild(&mut self, new_capacity: usize) -> Result<(), CollectionError> {
        debug_assert!(new_capacity.is_power_of_two());
        let layout = slots_layout::<E>(new_capacity).ok_or(CollectionError::AllocationFailed {
            bytes: usize::MAX,
        })?;
        let Some(raw) = self.allocator.allocate(layout) else {
            crate::rc_critical!(
                "hash table growth to {} slots ({} bytes) failed",
                new_capacity,
                layout.size()
            );
            return Err(CollectionError::AllocationFailed { bytes: layout.size() });
        };
        let new_ptr = raw.cast::<Slot<E>>();
        for i in 0..new_capacity {
            // SAFETY: fresh block sized for `new_capacity` slots.
            unsafe { new_ptr.as_ptr().add(i).write(Slot::Empty) };
        }
        // SAFETY: every slot was just initialized.
        let new_slots = unsafe { core::slice::from_raw_parts_mut(new_ptr.as_ptr(), new_capacity) };
        let mask = new_capacity - 1;

        if let Some(old) = self.slots.take() {
            for i in 0..self.capacity {
                // SAFETY: each old slot is read exactly once, then the block is freed.
                let slot = unsafe { old.as_ptr().add(i).read() };
                if let Slot::Occupied(e) = slot {
                    let mut idx = jenkins_mix(e.cached_hash()) as usize & mask;
                    while !matches!(new_slots[idx], Slot::Empty) {
                        idx = (idx + 1) & mask;
                    }
                    new_slots[idx] = Slot::Occupied(e);
                }
            }
            if let Some(old_layout) = slots_layout::<E>(self.capacity) {
                self.allocator.deallocate(old.cast(), old_layout);
            }
        }

        crate::rc_trace!(
            "hash table rebuilt: {} -> {} slots, {} live",
            self.capacity,
            new_capacity,
            self.occupied
        );
        self.slots = Some(new_ptr);
        self.capacity = new_capacity;
        self.deleted = 0;
        let natural = new_capacity * 3 / 4;
        self.threshold = match self.max {
            Some(max) => natural.min(max),
            None => natural,
        };
        self.generation += 1;
        Ok(())
    }

    /// Store `entry` into a slot returned as `reusable` by the latest probe.
    pub fn occupy(&mut self, index: usize, entry: E) {
        let was_deleted = {
            let slot = &mut self.slots_mut()[index];
            debug_assert!(!matches!(slot, Slot::Occupied(_)), "occupying a live slot");
            let was_deleted = matches!(slot, Slot::Deleted);
            *slot = Slot::Occupied(entry);
            was_deleted
        };
        if was_deleted {
            self.deleted -= 1;
        }
        self.occupied += 1;
        debug_assert!(self.occupied <= self.threshold(), "occupied past the threshold");
        self.generation += 1;
    }

    /// Remove the entry at `index`, leaving a tombstone.
    ///
    /// A run of tombstones that ends right before an Empty slot can never
    /// extend a probe, so it is turned back into Empty slots.
    pub fn vacate(&mut self, index: usize) -> E {
        let cap = self.capacity;
        let mask = cap - 1;
        let slots = self.slots_mut();
        let entry = match core::mem::replace(&mut slots[index], Slot::Deleted) {
            Slot::Occupied(e) => e,
            other => {
                slots[index] = other;
                unreachable!("vacating a slot that holds no entry");
            }
        };
        let mut reclaimed = 0;
        if matches!(slots[(index + 1) & mask], Slot::Empty) {
            let mut i = index;
            while reclaimed < cap && matches!(slots[i], Slot::Deleted) {
                slots[i] = Slot::Empty;
                reclaimed += 1;
                i = (i + cap - 1) & mask;
            }
        }
        self.occupied -= 1;
        self.deleted = self.deleted + 1 - reclaimed;
        self.generation += 1;
        entry
    }

    /// Index of the first occupied slot at or after `from`.
    pub fn next_occupied(&self, from: usize) -> Option<usize> {
        let slots = self.slots();
        (from..slots.len()).find(|&i| matches!(slots[i], Slot::Occupied(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.slots().iter().filter_map(|s| match s {
            Slot::Occupied(e) => Some(e),
            _ => None,
        })
    }

    /// Remove every entry, handing each to `f`, and free the storage.
    pub fn drain_with(&mut self, mut f: impl FnMut(E)) {
        let Some(ptr) = self.slots.take() else {
            return;
        };
        let cap = self.capacity;
        self.capacity = 0;
        self.occupied = 0;
        self.deleted = 0;
        self.threshold = 0;
        self.generation += 1;
        for i in 0..cap {
            // SAFETY: each slot is read once; the block is freed right after.
            if let Slot::Occupied(e) = unsafe { ptr.as_ptr().add(i).read() } {
                f(e);
            }
        }
        if let Some(layout) = slots_layout::<E>(cap) {
            self.allocator.deallocate(ptr.cast(), layout);
        }
    }

    #[cfg(test)]
    pub(crate) fn tombstones(&self) -> usize {
        self.deleted
    }
}

impl<E> Drop for RawTable<E> {
    fn drop(&mut self) {
        if let Some(ptr) = self.slots.take() {
            // SAFETY: `capacity` initialized slots; dropped once, then freed.
            unsafe {
                core::ptr::drop_in_place(core::ptr::slice_from_raw_parts_mut(
                    ptr.as_ptr(),
                    self.capacity,
                ));
            }
            if let Some(layout) = slots_layout::<E>(self.capacity) {
                self.allocator.deallocate(ptr.cast(), layout);
            }
        }
    }
}
