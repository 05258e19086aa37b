//! Array: an ordered sequence with cheap edits at both ends.
//!
//! Elements go through [`ValueCallbacks`]: retained when stored, released
//! when removed, overwritten, cleared or dropped with the array. Values taken
//! out with `pop_front`/`pop_back` are handed to the caller unreleased.

use crate::alloc::{self, AllocatorRef};
use crate::callbacks::{Opaque, ValueCallbacks};
use crate::deque::Deque;
use crate::error::CollectionError;
use crate::hash_table::BatchCursor;
use crate::reentrancy::DebugReentrancy;
use crate::sort::{self, SortAccess};
use crate::Mutability;
use core::cmp::Ordering;
use core::fmt::Debug;
use core::hash::Hash;
use core::ops::Range;

struct Inner<T, C> {
    deque: Deque<T>,
    callbacks: C,
    max: Option<usize>,
    generation: u64,
}

impl<T, C: ValueCallbacks<T>> Inner<T, C> {
    fn check_room(&self, len_after: usize) -> Result<(), CollectionError> {
        match self.max {
            Some(max) if len_after > max => {
                crate::rc_trace!("bounded array full at {} elements", max);
                Err(CollectionError::CapacityExceeded { max })
            }
            _ => Ok(()),
        }
    }

    /// Replace `range` with retained copies of `values`. The displaced
    /// elements are handed back for the caller to release once its guard is
    /// gone.
    fn replace(&mut self, range: Range<usize>, values: &[T]) -> Result<Vec<T>, CollectionError> {
        let len_after = self.deque.len() - range.len() + values.len();
        self.check_room(len_after)?;
        let cb = &self.callbacks;
        let removed = self
            .deque
            .splice(range.start, range.len(), values.iter().map(|v| cb.retain(v)))?;
        self.generation += 1;
        Ok(removed)
    }

    fn release_values(&self, removed: Vec<T>) {
        for v in removed {
            self.callbacks.release(v);
        }
    }

    fn position(&self, range: Range<usize>, value: &T, from_back: bool) -> Option<usize> {
        let cb = &self.callbacks;
        let slice = &self.deque.as_slice()[range.clone()];
        let hit = if from_back {
            slice.iter().rposition(|v| cb.equal(v, value))
        } else {
            slice.iter().position(|v| cb.equal(v, value))
        };
        hit.map(|i| i + range.start)
    }

    fn release_all(&mut self) {
        self.generation += 1;
        for v in self.deque.take_all() {
            self.callbacks.release(v);
        }
    }
}

/// Index-addressed view over a sub-range of the storage, for the sorter.
struct SortView<'a, T, F> {
    data: &'a mut [T],
    cmp: F,
}

impl<T, F: FnMut(&T, &T) -> Ordering> SortAccess for SortView<'_, T, F> {
    fn compare(&mut self, a: usize, b: usize) -> Ordering {
        (self.cmp)(&self.data[a], &self.data[b])
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b)
    }

    fn swap_run(&mut self, a: usize, b: usize, n: usize) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.data.split_at_mut(hi);
        left[lo..lo + n].swap_with_slice(&mut right[..n]);
    }
}

pub struct Array<T, C = Opaque>
where
    C: ValueCallbacks<T>,
{
    inner: Inner<T, C>,
    mutability: Mutability,
    reentrancy: DebugReentrancy,
}

impl<T: Copy + Eq + Hash + Debug> Array<T> {
    pub fn new() -> Self {
        Self::with_allocator(None, 0, Opaque)
    }
}

impl<T: Copy + Eq + Hash + Debug> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: ValueCallbacks<T>> Array<T, C> {
    /// Mutable array. A nonzero `capacity` caps the element count.
    pub fn with_allocator(allocator: Option<AllocatorRef>, capacity: usize, callbacks: C) -> Self {
        Self {
            inner: Inner {
                deque: Deque::new(alloc::resolve(allocator)),
                callbacks,
                max: (capacity != 0).then_some(capacity),
                generation: 0,
            },
            mutability: Mutability::Mutable,
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Fixed snapshot of `values`.
    pub fn immutable_from(
        allocator: Option<AllocatorRef>,
        values: &[T],
        callbacks: C,
    ) -> Result<Self, CollectionError> {
        let mut array = Self::with_allocator(allocator, 0, callbacks);
        array.inner.replace(0..0, values)?;
        array.mutability = Mutability::Immutable;
        Ok(array)
    }

    pub fn len(&self) -> usize {
        self.inner.deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    /// Slots in the current storage block.
    pub fn capacity(&self) -> usize {
        self.inner.deque.capacity()
    }

    pub fn max_len(&self) -> Option<usize> {
        self.inner.max
    }

    pub fn allocator(&self) -> &AllocatorRef {
        self.inner.deque.allocator()
    }

    pub fn callbacks(&self) -> &C {
        &self.inner.callbacks
    }

    /// Offset of the first element inside the storage block.
    pub fn head(&self) -> usize {
        self.inner.deque.head()
    }

    pub fn as_slice(&self) -> &[T] {
        self.inner.deque.as_slice()
    }

    fn check_mutable(&self, op: &str) -> Result<(), CollectionError> {
        if crate::rc_assert!(self.is_mutable(), "{} on an immutable array", op) {
            Ok(())
        } else {
            Err(CollectionError::Immutable)
        }
    }

    fn check_index(&self, op: &str, index: usize, len: usize) -> Result<(), CollectionError> {
        if crate::rc_assert!(index < len, "{}: index {} out of bounds (count {})", op, index, len) {
            Ok(())
        } else {
            Err(CollectionError::IndexOutOfBounds { index, len })
        }
    }

    fn check_range(&self, op: &str, range: &Range<usize>) -> Result<(), CollectionError> {
        let len = self.len();
        let ok = range.start <= range.end && range.end <= len;
        if crate::rc_assert!(ok, "{}: range {:?} out of bounds (count {})", op, range, len) {
            Ok(())
        } else {
            Err(CollectionError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len,
            })
        }
    }

    pub fn get_value_at_index(&self, index: usize) -> Option<&T> {
        self.check_index("get_value_at_index", index, self.len()).ok()?;
        self.inner.deque.get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// Elements of `range`, or `None` when it is out of bounds.
    pub fn values_in_range(&self, range: Range<usize>) -> Option<&[T]> {
        self.check_range("values_in_range", &range).ok()?;
        Some(&self.as_slice()[range])
    }

    pub fn contains_value(&self, range: Range<usize>, value: &T) -> bool {
        self.first_index_of_value(range, value).is_some()
    }

    pub fn count_of_value(&self, range: Range<usize>, value: &T) -> usize {
        if self.check_range("count_of_value", &range).is_err() {
            return 0;
        }
        let _g = self.reentrancy.enter("count_of_value");
        let cb = &self.inner.callbacks;
        self.as_slice()[range]
            .iter()
            .filter(|v| cb.equal(v, value))
            .count()
    }

    pub fn first_index_of_value(&self, range: Range<usize>, value: &T) -> Option<usize> {
        self.check_range("first_index_of_value", &range).ok()?;
        let _g = self.reentrancy.enter("first_index_of_value");
        self.inner.position(range, value, false)
    }

    pub fn last_index_of_value(&self, range: Range<usize>, value: &T) -> Option<usize> {
        self.check_range("last_index_of_value", &range).ok()?;
        let _g = self.reentrancy.enter("last_index_of_value");
        self.inner.position(range, value, true)
    }

    /// Binary search `range`, which must be sorted by `cmp`. `Ok` is the
    /// first matching index, `Err` the insertion point; both are absolute.
    pub fn bsearch_values<F>(&self, range: Range<usize>, value: &T, mut cmp: F) -> Result<usize, usize>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if self.check_range("bsearch_values", &range).is_err() {
            return Err(range.start.min(self.len()));
        }
        let _g = self.reentrancy.enter("bsearch_values");
        let slice = &self.as_slice()[range.clone()];
        sort::bsearch_indexed(slice.len(), |i| cmp(&slice[i], value))
            .map(|i| i + range.start)
            .map_err(|i| i + range.start)
    }

    pub fn append(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("append")?;
        let _g = self.reentrancy.enter("append");
        let inner = &mut self.inner;
        let len = inner.deque.len();
        inner.check_room(len + 1)?;
        if !inner.deque.has_room_back() {
            // Nothing is displaced by an insertion.
            return inner.replace(len..len, core::slice::from_ref(value)).map(drop);
        }
        let stored = inner.callbacks.retain(value);
        inner.deque.push_back(stored)?;
        inner.generation += 1;
        Ok(())
    }

    pub fn push_front(&mut self, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("push_front")?;
        let _g = self.reentrancy.enter("push_front");
        let inner = &mut self.inner;
        inner.check_room(inner.deque.len() + 1)?;
        if !inner.deque.has_room_front() {
            return inner.replace(0..0, core::slice::from_ref(value)).map(drop);
        }
        let stored = inner.callbacks.retain(value);
        inner.deque.push_front(stored)?;
        inner.generation += 1;
        Ok(())
    }

    /// Take the first element. Ownership passes to the caller; nothing is
    /// released.
    pub fn pop_front(&mut self) -> Result<Option<T>, CollectionError> {
        self.check_mutable("pop_front")?;
        self.inner.generation += 1;
        Ok(self.inner.deque.pop_front())
    }

    pub fn pop_back(&mut self) -> Result<Option<T>, CollectionError> {
        self.check_mutable("pop_back")?;
        self.inner.generation += 1;
        Ok(self.inner.deque.pop_back())
    }

    /// Insert before `index`; `index == len` appends.
    pub fn insert_at_index(&mut self, index: usize, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("insert_at_index")?;
        self.check_index("insert_at_index", index, self.len() + 1)?;
        let _g = self.reentrancy.enter("insert_at_index");
        self.inner.replace(index..index, core::slice::from_ref(value)).map(drop)
    }

    /// Remove and release the element at `index`.
    pub fn remove_at_index(&mut self, index: usize) -> Result<(), CollectionError> {
        self.check_mutable("remove_at_index")?;
        self.check_index("remove_at_index", index, self.len())?;
        let removed = {
            let _g = self.reentrancy.enter("remove_at_index");
            self.inner.replace(index..index + 1, &[])?
        };
        self.inner.release_values(removed);
        Ok(())
    }

    /// Overwrite the element at `index`; `index == len` appends.
    pub fn set_value_at_index(&mut self, index: usize, value: &T) -> Result<(), CollectionError> {
        self.check_mutable("set_value_at_index")?;
        let len = self.len();
        self.check_index("set_value_at_index", index, len + 1)?;
        let old = {
            let _g = self.reentrancy.enter("set_value_at_index");
            if index == len {
                return self.inner.replace(len..len, core::slice::from_ref(value)).map(drop);
            }
            let inner = &mut self.inner;
            let stored = inner.callbacks.retain(value);
            let old = core::mem::replace(&mut inner.deque.as_mut_slice()[index], stored);
            inner.generation += 1;
            old
        };
        self.inner.callbacks.release(old);
        Ok(())
    }

    /// Replace the elements of `range` with retained copies of `values`.
    pub fn replace_values_in_range(&mut self, range: Range<usize>, values: &[T]) -> Result<(), CollectionError> {
        self.check_mutable("replace_values_in_range")?;
        self.check_range("replace_values_in_range", &range)?;
        let removed = {
            let _g = self.reentrancy.enter("replace_values_in_range");
            self.inner.replace(range, values)?
        };
        self.inner.release_values(removed);
        Ok(())
    }

    pub fn exchange_values(&mut self, a: usize, b: usize) -> Result<(), CollectionError> {
        self.check_mutable("exchange_values")?;
        let len = self.len();
        self.check_index("exchange_values", a, len)?;
        self.check_index("exchange_values", b, len)?;
        self.inner.deque.as_mut_slice().swap(a, b);
        self.inner.generation += 1;
        Ok(())
    }

    /// Append retained copies of `other[range]`.
    pub fn append_array<C2>(&mut self, other: &Array<T, C2>, range: Range<usize>) -> Result<(), CollectionError>
    where
        C2: ValueCallbacks<T>,
    {
        self.check_mutable("append_array")?;
        other.check_range("append_array", &range)?;
        let _g = self.reentrancy.enter("append_array");
        let len = self.len();
        self.inner.replace(len..len, &other.as_slice()[range]).map(drop)
    }

    /// Sort `range` in place with `cmp` (quicksort, not stable).
    pub fn sort_values<F>(&mut self, range: Range<usize>, cmp: F) -> Result<(), CollectionError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.check_mutable("sort_values")?;
        self.check_range("sort_values", &range)?;
        let _g = self.reentrancy.enter("sort_values");
        let mut view = SortView {
            data: self.inner.deque.as_mut_slice(),
            cmp,
        };
        sort::sort_indexed(&mut view, range.start, range.len());
        self.inner.generation += 1;
        Ok(())
    }

    /// Remove and release every element, returning the storage.
    pub fn clear(&mut self) -> Result<(), CollectionError> {
        self.check_mutable("clear")?;
        self.inner.release_all();
        Ok(())
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Call `f` on every element of `range` in order.
    pub fn apply(&self, range: Range<usize>, mut f: impl FnMut(&T)) {
        for v in self.values_in_range(range).unwrap_or(&[]) {
            f(v)
        }
    }

    /// Up to `max` further elements for `cursor`. An empty batch ends the
    /// enumeration; so does any mutation since the cursor started.
    pub fn next_batch(&self, cursor: &mut BatchCursor, max: usize) -> &[T] {
        if !cursor.attach(self.inner.generation) {
            crate::rc_assert!(false, "array mutated during batch enumeration");
            return &[];
        }
        let slice = self.as_slice();
        let start = cursor.position.min(slice.len());
        let end = start.saturating_add(max).min(slice.len());
        cursor.position = end;
        &slice[start..end]
    }

    /// Mutable copy sharing this array's allocator, callbacks and cap.
    pub fn copy(&self) -> Result<Self, CollectionError>
    where
        C: Clone,
    {
        let mut out = Self::with_allocator(
            Some(self.allocator().clone()),
            self.inner.max.unwrap_or(0),
            self.inner.callbacks.clone(),
        );
        out.inner.replace(0..0, self.as_slice())?;
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
            "<Array {:p} [{}]>{{type = {}, count = {}, values = (\n",
            self as *const Self,
            self.allocator().name(),
            if self.is_mutable() { "mutable" } else { "immutable" },
            self.len()
        );
        for (i, v) in self.iter().enumerate() {
            s.push_str(&format!("\t{} : {}\n", i, self.inner.callbacks.describe(v)));
        }
        s.push_str(")}");
        s
    }
}

impl<T, C: ValueCallbacks<T>> Drop for Array<T, C> {
    fn drop(&mut self) {
        self.inner.release_all();
    }
}

impl<T, C: ValueCallbacks<T>> core::fmt::Debug for Array<T, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<'a, T, C: ValueCallbacks<T>> IntoIterator for &'a Array<T, C> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::CountingAllocator;

    /// Invariant: out-of-range edits fail and leave the array unchanged.
    #[test]
    fn out_of_range_is_rejected() {
        let mut a = Array::<u32>::new();
        a.append(&1).unwrap();
        assert_eq!(
            a.remove_at_index(1),
            Err(CollectionError::IndexOutOfBounds { index: 1, len: 1 })
        );
        assert_eq!(
            a.replace_values_in_range(0..2, &[]),
            Err(CollectionError::RangeOutOfBounds { start: 0, end: 2, len: 1 })
        );
        assert_eq!(a.get_value_at_index(5), None);
        assert_eq!(a.as_slice(), &[1]);
    }

    #[test]
    fn sort_only_touches_range() {
        let mut a = Array::<i32>::new();
        a.replace_values_in_range(0..0, &[9, 5, 3, 1, 4, 0]).unwrap();
        a.sort_values(1..5, |x, y| x.cmp(y)).unwrap();
        assert_eq!(a.as_slice(), &[9, 1, 3, 4, 5, 0]);
        assert_eq!(a.bsearch_values(1..5, &4, |x, y| x.cmp(y)), Ok(3));
        assert_eq!(a.bsearch_values(1..5, &2, |x, y| x.cmp(y)), Err(2));
    }

    #[test]
    fn bounded_array_rejects_growth_past_cap() {
        let mut a: Array<u8> = Array::with_allocator(None, 2, Opaque);
        a.append(&1).unwrap();
        a.push_front(&0).unwrap();
        assert_eq!(a.append(&2), Err(CollectionError::CapacityExceeded { max: 2 }));
        a.set_value_at_index(1, &7).unwrap();
        assert_eq!(a.as_slice(), &[0, 7]);
    }

    #[test]
    fn clear_and_drop_return_storage() {
        let alloc = CountingAllocator::new();
        let mut a: Array<u64> = Array::with_allocator(Some(alloc.clone() as AllocatorRef), 0, Opaque);
        for v in 0..100 {
            a.append(&v).unwrap();
        }
        assert_eq!(alloc.live(), 1);
        a.clear().unwrap();
        assert_eq!(alloc.live(), 0);
        a.append(&1).unwrap();
        drop(a);
        assert_eq!(alloc.live(), 0);
    }

    /// Releases only when no container guard is held on this thread.
    #[cfg(debug_assertions)]
    #[derive(Clone, Default)]
    struct UnguardedRelease {
        released: std::rc::Rc<core::cell::Cell<usize>>,
    }

    #[cfg(debug_assertions)]
    impl ValueCallbacks<u32> for UnguardedRelease {
        fn retain(&self, value: &u32) -> u32 {
            *value
        }

        fn release(&self, _value: u32) {
            let live = crate::reentrancy::LIVE_GUARDS.with(|n| n.get());
            assert_eq!(live, 0, "release ran under a reentrancy guard");
            self.released.set(self.released.get() + 1);
        }

        fn equal(&self, a: &u32, b: &u32) -> bool {
            a == b
        }

        fn describe(&self, value: &u32) -> String {
            value.to_string()
        }
    }

    /// Invariant: displaced elements are released after the guard drops, so
    /// `release` may reenter the array.
    #[cfg(debug_assertions)]
    #[test]
    fn release_runs_outside_the_guard() {
        let cb = UnguardedRelease::default();
        let mut a = Array::with_allocator(None, 0, cb.clone());
        a.replace_values_in_range(0..0, &[1, 2, 3, 4, 5]).unwrap();
        a.remove_at_index(0).unwrap();
        a.set_value_at_index(0, &9).unwrap();
        a.replace_values_in_range(1..3, &[7]).unwrap();
        assert_eq!(a.as_slice(), &[9, 7, 5]);
        assert_eq!(cb.released.get(), 4);
        a.clear().unwrap();
        assert_eq!(cb.released.get(), 7);
    }

    #[test]
    fn batches_walk_in_order() {
        let mut a = Array::<u32>::new();
        a.replace_values_in_range(0..0, &[1, 2, 3, 4, 5]).unwrap();
        let mut cur = BatchCursor::new();
        assert_eq!(a.next_batch(&mut cur, 2), &[1, 2]);
        assert_eq!(a.next_batch(&mut cur, 2), &[3, 4]);
        assert_eq!(a.next_batch(&mut cur, 2), &[5]);
        assert!(a.next_batch(&mut cur, 2).is_empty());
    }
}
