//! Bag: a multiset of values over the open-addressing engine.
//!
//! Each distinct value occupies one slot with an occurrence count. The first
//! occurrence retains the value; later ones only bump the count. The value is
//! released when its count drops to zero.

use crate::alloc::{self, AllocatorRef};
use crate::callbacks::{KeyCallbacks, Opaque};
use crate::error::CollectionError;
use crate::hash_table::{BatchCursor, Hashed, RawTable};
use crate::reentrancy::DebugReentrancy;
use crate::Mutability;
use core::fmt::Debug;
use core::hash::Hash;

struct Entry<T> {
    value: T,
    count: usize,
    hash: u32,
}

impl<T> Hashed for Entry<T> {
    fn cached_hash(&self) -> u32 {
        self.hash
    }
}

struct Inner<T, C> {
    table: RawTable<Entry<T>>,
    callbacks: C,
    /// Sum of all occurrence counts.
    total: usize,
    /// Cap on `total`; `None` grows without bound.
    max: Option<usize>,
}

impl<T, C: KeyCallbacks<T>> Inner<T, C> {
    fn find_index(&self, value: &T) -> Option<usize> {
        let hash = self.callbacks.hash(value);
        let cb = &self.callbacks;
        self.table.find(hash, |e| cb.equal(&e.value, value))
    }

    fn count_of(&self, value: &T) -> usize {
        self.find_index(value)
            .and_then(|i| self.table.get(i))
            .map_or(0, |e| e.count)
    }

    /// Add `n` occurrences of `value`.
    fn add(&mut self, value: &T, n: usize) -> Result<(), CollectionError> {
        if n == 0 {
            return Ok(());
        }
        if let Some(max) = self.max {
            if self.total + n > max {
                crate::rc_trace!("bounded bag full at {} occurrences", max);
                return Err(CollectionError::CapacityExceeded { max });
            }
        }
        let hash = self.callbacks.hash(value);
        let mut probe = {
            let cb = &self.callbacks;
            self.table.find_buckets(hash, |e| cb.equal(&e.value, value))
        };
        if let Some(i) = probe.matched {
            if let Some(e) = self.table.get_mut(i) {
                e.count += n;
            }
            self.total += n;
            return Ok(());
        }
        if self.table.reserve_one()? {
            let cb = &self.callbacks;
            probe = self.table.find_buckets(hash, |e| cb.equal(&e.value, value));
        }
        let Some(slot) = probe.reusable else {
            crate::rc_critical!("hash table has no free slot after reserve");
            return Err(CollectionError::CapacityExceeded {
                max: self.table.capacity(),
            });
        };
        let entry = Entry {
            value: self.callbacks.retain(value),
            count: n,
            hash,
        };
        self.table.occupy(slot, entry);
        self.total += n;
        Ok(())
    }

    /// Swap the stored instance at slot `i` for a retained `value`, returning
    /// the old one for release.
    fn swap_instance(&mut self, i: usize, value: &T) -> Option<T> {
        let new_value = self.callbacks.retain(value);
        match self.table.get_mut(i) {
            Some(e) => Some(core::mem::replace(&mut e.value, new_value)),
            None => {
                self.callbacks.release(new_value);
                None
            }
        }
    }

    /// Drop one occurrence; returns the value when its last occurrence went.
    fn remove_one(&mut self, value: &T) -> Option<T> {
        let i = self.find_index(value)?;
        let last = match self.table.get_mut(i) {
            Some(e) if e.count > 1 => {
                e.count -= 1;
                false
            }
            Some(_) => true,
            None => return None,
        };
        self.total -= 1;
        last.then(|| self.table.vacate(i).value)
    }

    fn release_all(&mut self) {
        let mut drained = Vec::with_capacity(self.table.len());
        self.table.drain_with(|e| drained.push(e.value));
        self.total = 0;
        for v in drained {
            self.callbacks.release(v);
        }
    }
}

pub struct Bag<T, C = Opaque>
where
    C: KeyCallbacks<T>,
{
    inner: Inner<T, C>,
    mutability: Mutability,
    reentrancy: DebugReentrancy,
}

impl<T: Copy + Eq + Hash + Debug> Bag<T> {
    pub fn new() -> Self {
        Self::with_allocator(None, 0, Opaque)
    }
}

impl<T: Copy + Eq + Hash + Debug> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: KeyCallbacks<T>> Bag<T, C> {
    /// Mutable bag. A nonzero `capacity` caps the total number of
    /// occurrences.
    pub fn with_allocator(allocator: Option<AllocatorRef>, capacity: usize, callbacks: C) -> Self {
        let max = (capacity != 0).then_some(capacity);
        Self {
            inner: Inner {
                table: RawTable::new(alloc::resolve(allocator), max),
                callbacks,
                total: 0,
                max,
            },
            mutability: Mutability::Mutable,
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Fixed snapshot holding one occurrence per item of `values`.
    pub fn immutable_from<'a, I>(
        allocator: Option<AllocatorRef>,
        values: I,
        callbacks: C,
    ) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let values = values.into_iter();
        let mut bag = Self::with_allocator(allocator, 0, callbacks);
        let (lower, _) = values.size_hint();
        if lower > 0 {
            bag.inner.table.expand(lower)?;
        }
        for v in values {
            bag.inner.add(v, 1)?;
        }
        bag.mutability = Mutability::Immutable;
        Ok(bag)
    }

    /// Total number of occurrences.
    pub fn len(&self) -> usize {
        self.inner.total
    }

    pub fn is_empty(&self) -> bool {
        self.inner.total == 0
    }

    /// Number of distinct values.
    pub fn distinct_len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    pub fn capacity(&self) -> usize {
        self.inner.table.capacity()
    }

    pub fn max_len(&self) -> Option<usize> {
        self.inner.max
    }

    pub fn allocator(&self) -> &AllocatorRef {
        self.inner.table.allocator()
    }

    pub fn callbacks(&self) -> &C {
        &self.inner.callbacks
    }

    fn check_mutable(&self, op: &str) -> Result<(), CollectionError> {
        if crate::rc_assert!(self.is_mutable(), "{} on an immutable bag", op) {
            Ok(())
        } else {
            Err(CollectionError::Immutable)
        }
    }

    pub fn count_of_value(&self, value: &T) -> usize {
        let _g = self.reentrancy.enter("count_of_value");
        self.inner.count_of(value)
    }

    pub fn contains_value(&self, value: &T) -> bool {
        let _g = self.reentrancy.enter("contains_value");
        self.inner.find_index(value).is_some()
    }

    /// The stored instance equal to `value`.
    pub fn get_value(&self, value: &T) -> Option<&T> {
        let _g = self.reentrancy.enter("get_value");
        self.inner
            .find_index(value)
            .and_then(|i| self.inner.table.get(i))
            .map(|e| &e.value)
    }

    /// Add one occurrence.
    pub fn add_value(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("add_value")?;
        let _g = self.reentrancy.enter("add_value");
        self.inner.add(value, 1)
    }

    /// Store `value` as the instance for its equivalence class, keeping the
    /// count; an absent value is added once.
    pub fn set_value(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("set_value")?;
        let old = {
            let _g = self.reentrancy.enter("set_value");
            match self.inner.find_index(value) {
                Some(i) => self.inner.swap_instance(i, value),
                None => {
                    self.inner.add(value, 1)?;
                    None
                }
            }
        };
        if let Some(v) = old {
            self.inner.callbacks.release(v);
        }
        Ok(())
    }

    /// Like `set_value`, but absent values are ignored.
    pub fn replace_value(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("replace_value")?;
        let old = {
            let _g = self.reentrancy.enter("replace_value");
            let inner = &mut self.inner;
            inner.find_index(value).and_then(|i| inner.swap_instance(i, value))
        };
        if let Some(v) = old {
            self.inner.callbacks.release(v);
        }
        Ok(())
    }

    /// Remove one occurrence. Removing an absent value succeeds.
    pub fn remove_value(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("remove_value")?;
        let gone = {
            let _g = self.reentrancy.enter("remove_value");
            self.inner.remove_one(value)
        };
        if let Some(v) = gone {
            self.inner.callbacks.release(v);
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), CollectionError> {
        self.check_mutable("clear")?;
        self.inner.release_all();
        Ok(())
    }

    /// Distinct values with their occurrence counts, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> + '_ {
        self.inner.table.iter().map(|e| (&e.value, e.count))
    }

    /// Every occurrence; a value stored n times appears n times.
    pub fn values(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len());
        for e in self.inner.table.iter() {
            out.extend(core::iter::repeat(&e.value).take(e.count));
        }
        out
    }

    /// Up to `max` further distinct values with counts. An empty batch ends
    /// the enumeration; so does any mutation since the cursor started.
    pub fn next_batch(&self, cursor: &mut BatchCursor, max: usize) -> Vec<(&T, usize)> {
        let table = &self.inner.table;
        if !cursor.attach(table.generation()) {
            crate::rc_assert!(false, "bag mutated during batch enumeration");
            return Vec::new();
        }
        let mut out = Vec::with_capacity(max.min(table.len()));
        while out.len() < max {
            let Some(i) = table.next_occupied(cursor.position) else {
                cursor.position = table.capacity();
                break;
            };
            if let Some(e) = table.get(i) {
                out.push((&e.value, e.count));
            }
            cursor.position = i + 1;
        }
        out
    }

    /// Call `f` once per distinct value with its count.
    pub fn apply(&self, mut f: impl FnMut(&T, usize)) {
        for e in self.inner.table.iter() {
            f(&e.value, e.count)
        }
    }

    pub fn copy(&self) -> Result<Self, CollectionError>
    where
        C: Clone,
    {
        let mut out = Self::with_allocator(
            Some(self.allocator().clone()),
            self.inner.max.unwrap_or(0),
            self.inner.callbacks.clone(),
        );
        if self.distinct_len() > 0 {
            out.inner.table.expand(self.distinct_len())?;
        }
        for e in self.inner.table.iter() {
            out.inner.add(&e.value, e.count)?;
        }
        Ok(out)
    }

    pub fn immutable_copy(&self) -> Result<Self, CollectionError>
    where
        C: Clone,
    {
        let mut out = self.copy()?;
        out.mutability = Mutability::Immutable;
        Ok(out)
    }

    pub fn describe(&self) -> String {
        let mut s = format!(
            "<Bag {:p} [{}]>{{count = {}, capacity = {}, values = (\n",
            self as *const Self,
            self.allocator().name(),
            self.len(),
            self.capacity()
        );
        for (i, e) in self.inner.table.iter().enumerate() {
            s.push_str(&format!(
                "\t{} : {} ({})\n",
                i,
                self.inner.callbacks.describe(&e.value),
                e.count
            ));
        }
        s.push_str(")}");
        s
    }
}

impl<T, C: KeyCallbacks<T>> Drop for Bag<T, C> {
    fn drop(&mut self) {
        self.inner.release_all();
    }
}

impl<T, C: KeyCallbacks<T>> core::fmt::Debug for Bag<T, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackSet;
    use std::cell::Cell;

    thread_local! {
        static RETAINED: Cell<usize> = const { Cell::new(0) };
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    fn retain(v: &u32) -> u32 {
        RETAINED.with(|r| r.set(r.get() + 1));
        *v
    }

    fn release(_: u32) {
        RELEASED.with(|r| r.set(r.get() + 1));
    }

    fn counting() -> CallbackSet<u32> {
        CallbackSet {
            retain: Some(retain),
            release: Some(release),
            ..CallbackSet::empty()
        }
    }

    fn retained() -> usize {
        RETAINED.with(|r| r.get())
    }

    fn released() -> usize {
        RELEASED.with(|r| r.get())
    }

    /// Invariant: only the first occurrence retains and only the last
    /// removal releases.
    #[test]
    fn retain_once_release_once_per_distinct_value() {
        let (r0, d0) = (retained(), released());
        let mut b = Bag::with_allocator(None, 0, counting());
        for _ in 0..3 {
            b.add_value(&5).unwrap();
        }
        assert_eq!(retained() - r0, 1);
        b.remove_value(&5).unwrap();
        b.remove_value(&5).unwrap();
        assert_eq!(released() - d0, 0);
        b.remove_value(&5).unwrap();
        assert_eq!(released() - d0, 1);
        assert!(!b.contains_value(&5));
        assert_eq!(b.len(), 0);
    }

    /// Invariant: `len` counts occurrences, `distinct_len` counts values.
    #[test]
    fn len_and_distinct_len() {
        let mut b = Bag::<u32>::new();
        for v in [1, 1, 2, 3, 3, 3] {
            b.add_value(&v).unwrap();
        }
        assert_eq!(b.len(), 6);
        assert_eq!(b.distinct_len(), 3);
        assert_eq!(b.values().len(), 6);
        let mut counts: Vec<(u32, usize)> = b.iter().map(|(v, n)| (*v, n)).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![(1, 2), (2, 1), (3, 3)]);
    }

    /// Invariant: set_value swaps the stored instance but keeps the count.
    #[test]
    fn set_value_keeps_count() {
        let (r0, d0) = (retained(), released());
        let mut b = Bag::with_allocator(None, 0, counting());
        b.add_value(&9).unwrap();
        b.add_value(&9).unwrap();
        b.set_value(&9).unwrap();
        assert_eq!(b.count_of_value(&9), 2);
        assert_eq!(retained() - r0, 2);
        assert_eq!(released() - d0, 1);
        b.replace_value(&10).unwrap();
        assert!(!b.contains_value(&10));
    }

    /// Invariant: a bounded bag caps total occurrences, not distinct values.
    #[test]
    fn bounded_bag_counts_occurrences() {
        let mut b: Bag<u32> = Bag::with_allocator(None, 3, Opaque);
        b.add_value(&1).unwrap();
        b.add_value(&1).unwrap();
        b.add_value(&1).unwrap();
        assert_eq!(
            b.add_value(&1),
            Err(CollectionError::CapacityExceeded { max: 3 })
        );
        assert_eq!(b.count_of_value(&1), 3);
        b.remove_value(&1).unwrap();
        b.add_value(&2).unwrap();
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn describe_shows_counts() {
        let mut b = Bag::<u32>::new();
        b.add_value(&4).unwrap();
        b.add_value(&4).unwrap();
        assert!(b.describe().contains("4 (2)"));
    }
}
