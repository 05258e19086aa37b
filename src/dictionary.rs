//! Dictionary: unique keys mapped to values over the open-addressing engine.
//!
//! Keys go through [`KeyCallbacks`], values through [`ValueCallbacks`]. Both
//! are retained when stored and released when removed, overwritten, cleared
//! or dropped with the dictionary.

use crate::alloc::{self, AllocatorRef};
use crate::callbacks::{KeyCallbacks, Opaque, ValueCallbacks};
use crate::error::CollectionError;
use crate::hash_table::{BatchCursor, Hashed, RawTable};
use crate::reentrancy::DebugReentrancy;
use crate::Mutability;
use core::fmt::Debug;
use core::hash::Hash;

struct Entry<K, V> {
    key: K,
    value: V,
    hash: u32,
}

impl<K, V> Hashed for Entry<K, V> {
    fn cached_hash(&self) -> u32 {
        self.hash
    }
}

/// Table plus callbacks; everything the guarded operations touch.
struct Inner<K, V, KC, VC> {
    table: RawTable<Entry<K, V>>,
    key_callbacks: KC,
    value_callbacks: VC,
}

impl<K, V, KC, VC> Inner<K, V, KC, VC>
where
    KC: KeyCallbacks<K>,
    VC: ValueCallbacks<V>,
{
    fn find_index(&self, key: &K) -> Option<usize> {
        let hash = self.key_callbacks.hash(key);
        let kc = &self.key_callbacks;
        self.table.find(hash, |e| kc.equal(&e.key, key))
    }

    fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        self.find_index(key).and_then(|i| self.table.get(i))
    }

    /// Insert a new entry, or overwrite the value of an existing one when
    /// `overwrite` is set. Returns the displaced value for the caller to
    /// release.
    fn insert(&mut self, key: &K, value: &V, overwrite: bool) -> Result<Option<V>, CollectionError> {
        let hash = self.key_callbacks.hash(key);
        let mut probe = {
            let kc = &self.key_callbacks;
            self.table.find_buckets(hash, |e| kc.equal(&e.key, key))
        };
        if let Some(i) = probe.matched {
            return Ok(if overwrite { self.overwrite(i, value) } else { None });
        }
        if self.table.reserve_one()? {
            let kc = &self.key_callbacks;
            probe = self.table.find_buckets(hash, |e| kc.equal(&e.key, key));
        }
        let Some(slot) = probe.reusable else {
            crate::rc_critical!("hash table has no free slot after reserve");
            return Err(CollectionError::CapacityExceeded {
                max: self.table.capacity(),
            });
        };
        let entry = Entry {
            key: self.key_callbacks.retain(key),
            value: self.value_callbacks.retain(value),
            hash,
        };
        self.table.occupy(slot, entry);
        Ok(None)
    }

    /// Replace the value at slot `i`, returning the old one; the stored key
    /// instance is kept.
    fn overwrite(&mut self, i: usize, value: &V) -> Option<V> {
        let new_value = self.value_callbacks.retain(value);
        match self.table.get_mut(i) {
            Some(e) => Some(core::mem::replace(&mut e.value, new_value)),
            None => {
                self.value_callbacks.release(new_value);
                None
            }
        }
    }

    fn release_value(&self, old: Option<V>) {
        if let Some(v) = old {
            self.value_callbacks.release(v);
        }
    }

    fn release_entry(&self, e: Entry<K, V>) {
        self.key_callbacks.release(e.key);
        self.value_callbacks.release(e.value);
    }

    fn release_all(&mut self) {
        let mut drained = Vec::with_capacity(self.table.len());
        self.table.drain_with(|e| drained.push(e));
        for e in drained {
            self.release_entry(e);
        }
    }
}

pub struct Dictionary<K, V, KC = Opaque, VC = Opaque>
where
    KC: KeyCallbacks<K>,
    VC: ValueCallbacks<V>,
{
    inner: Inner<K, V, KC, VC>,
    mutability: Mutability,
    reentrancy: DebugReentrancy,
}

impl<K, V> Dictionary<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Copy + Eq + Hash + Debug,
{
    /// Unbounded dictionary with identity semantics on the default allocator.
    pub fn new() -> Self {
        Self::with_allocator(None, 0, Opaque, Opaque)
    }
}

impl<K, V> Default for Dictionary<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, KC, VC> Dictionary<K, V, KC, VC>
where
    KC: KeyCallbacks<K>,
    VC: ValueCallbacks<V>,
{
    /// Mutable dictionary. A `capacity` of zero grows without bound; any
    /// other value caps the number of entries.
    pub fn with_allocator(
        allocator: Option<AllocatorRef>,
        capacity: usize,
        key_callbacks: KC,
        value_callbacks: VC,
    ) -> Self {
        let max = (capacity != 0).then_some(capacity);
        Self {
            inner: Inner {
                table: RawTable::new(alloc::resolve(allocator), max),
                key_callbacks,
                value_callbacks,
            },
            mutability: Mutability::Mutable,
            reentrancy: DebugReentrancy::new(),
        }
    }

    /// Fixed snapshot of `pairs`. A key that appears twice keeps its last value.
    pub fn immutable_from<'a, I>(
        allocator: Option<AllocatorRef>,
        pairs: I,
        key_callbacks: KC,
        value_callbacks: VC,
    ) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = (&'a K, &'a V)>,
        K: 'a,
        V: 'a,
    {
        let pairs = pairs.into_iter();
        let mut dict = Self::with_allocator(allocator, 0, key_callbacks, value_callbacks);
        let (lower, _) = pairs.size_hint();
        if lower > 0 {
            dict.inner.table.expand(lower)?;
        }
        for (k, v) in pairs {
            let old = dict.inner.insert(k, v, true)?;
            dict.inner.release_value(old);
        }
        dict.mutability = Mutability::Immutable;
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability == Mutability::Mutable
    }

    /// Number of slots in the current storage block (zero before first insert).
    pub fn capacity(&self) -> usize {
        self.inner.table.capacity()
    }

    /// Entry cap for bounded dictionaries.
    pub fn max_len(&self) -> Option<usize> {
        self.inner.table.max()
    }

    pub fn allocator(&self) -> &AllocatorRef {
        self.inner.table.allocator()
    }

    pub fn key_callbacks(&self) -> &KC {
        &self.inner.key_callbacks
    }

    pub fn value_callbacks(&self) -> &VC {
        &self.inner.value_callbacks
    }

    fn check_mutable(&self, op: &str) -> Result<(), CollectionError> {
        if crate::rc_assert!(self.is_mutable(), "{} on an immutable dictionary", op) {
            Ok(())
        } else {
            Err(CollectionError::Immutable)
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let _g = self.reentrancy.enter("contains_key");
        self.inner.find_index(key).is_some()
    }

    pub fn get_value(&self, key: &K) -> Option<&V> {
        let _g = self.reentrancy.enter("get_value");
        self.inner.get(key).map(|e| &e.value)
    }

    /// The stored key and value for `key`, if present. Unlike `get_value`,
    /// this also hands back the instance the dictionary retained as key.
    pub fn get_value_if_present(&self, key: &K) -> Option<(&K, &V)> {
        let _g = self.reentrancy.enter("get_value_if_present");
        self.inner.get(key).map(|e| (&e.key, &e.value))
    }

    /// 1 if `key` is present, else 0.
    pub fn count_of_key(&self, key: &K) -> usize {
        usize::from(self.contains_key(key))
    }

    /// Number of entries whose value equals `value` (linear scan).
    pub fn count_of_value(&self, value: &V) -> usize {
        let _g = self.reentrancy.enter("count_of_value");
        let vc = &self.inner.value_callbacks;
        self.inner
            .table
            .iter()
            .filter(|e| vc.equal(&e.value, value))
            .count()
    }

    pub fn contains_value(&self, value: &V) -> bool {
        let _g = self.reentrancy.enter("contains_value");
        let vc = &self.inner.value_callbacks;
        self.inner.table.iter().any(|e| vc.equal(&e.value, value))
    }

    /// Insert only if `key` is absent; an existing entry is left untouched.
    pub fn add_value(&mut self, key: &K, value: &V) -> Result<(), CollectionError> {
        self.check_mutable("add_value")?;
        let _g = self.reentrancy.enter("add_value");
        self.inner.insert(key, value, false).map(drop)
    }

    /// Overwrite the value of an existing key; absent keys are ignored.
    pub fn replace_value(&mut self, key: &K, value: &V) -> Result<(), CollectionError> {
        self.check_mutable("replace_value")?;
        let old = {
            let _g = self.reentrancy.enter("replace_value");
            let inner = &mut self.inner;
            inner.find_index(key).and_then(|i| inner.overwrite(i, value))
        };
        self.inner.release_value(old);
        Ok(())
    }

    /// Insert or overwrite.
    pub fn set_value(&mut self, key: &K, value: &V) -> Result<(), CollectionError> {
        self.check_mutable("set_value")?;
        let old = {
            let _g = self.reentrancy.enter("set_value");
            self.inner.insert(key, value, true)?
        };
        self.inner.release_value(old);
        Ok(())
    }

    /// Remove `key` if present. Removing an absent key succeeds.
    pub fn remove_value(&mut self, key: &K) -> Result<(), CollectionError> {
        self.check_mutable("remove_value")?;
        let removed = {
            let _g = self.reentrancy.enter("remove_value");
            let inner = &mut self.inner;
            inner.find_index(key).map(|i| inner.table.vacate(i))
        };
        if let Some(e) = removed {
            self.inner.release_entry(e);
        }
        Ok(())
    }

    /// Remove and release every entry, returning the storage to the allocator.
    pub fn clear(&mut self) -> Result<(), CollectionError> {
        self.check_mutable("clear")?;
        self.inner.release_all();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.inner.table.iter().map(|e| (&e.key, &e.value))
    }

    pub fn keys(&self) -> Vec<&K> {
        self.inner.table.iter().map(|e| &e.key).collect()
    }

    pub fn values(&self) -> Vec<&V> {
        self.inner.table.iter().map(|e| &e.value).collect()
    }

    /// Bulk copy-out of every entry, in slot order.
    pub fn keys_and_values(&self) -> (Vec<&K>, Vec<&V>) {
        self.iter().unzip()
    }

    /// Up to `max` further entries for `cursor`. An empty batch ends the
    /// enumeration; so does any mutation since the cursor started.
    pub fn next_batch(&self, cursor: &mut BatchCursor, max: usize) -> Vec<(&K, &V)> {
        let table = &self.inner.table;
        if !cursor.attach(table.generation()) {
            crate::rc_assert!(false, "dictionary mutated during batch enumeration");
            return Vec::new();
        }
        let mut out = Vec::with_capacity(max.min(table.len()));
        while out.len() < max {
            let Some(i) = table.next_occupied(cursor.position) else {
                cursor.position = table.capacity();
                break;
            };
            if let Some(e) = table.get(i) {
                out.push((&e.key, &e.value));
            }
            cursor.position = i + 1;
        }
        out
    }

    pub fn apply(&self, mut f: impl FnMut(&K, &V)) {
        for e in self.inner.table.iter() {
            f(&e.key, &e.value)
        }
    }

    /// Mutable copy sharing this dictionary's allocator, callbacks and cap.
    pub fn copy(&self) -> Result<Self, CollectionError>
    where
        KC: Clone,
        VC: Clone,
    {
        let mut out = Self::with_allocator(
            Some(self.allocator().clone()),
            self.max_len().unwrap_or(0),
            self.inner.key_callbacks.clone(),
            self.inner.value_callbacks.clone(),
        );
        if !self.is_empty() {
            out.inner.table.expand(self.len())?;
        }
        for e in self.inner.table.iter() {
            let old = out.inner.insert(&e.key, &e.value, true)?;
            out.inner.release_value(old);
        }
        Ok(out)
    }

    pub fn immutable_copy(&self) -> Result<Self, CollectionError>
    where
        KC: Clone,
        VC: Clone,
    {
        let mut out = self.copy()?;
        out.mutability = Mutability::Immutable;
        Ok(out)
    }

    pub fn describe(&self) -> String {
        let mut s = format!(
            "<Dictionary {:p} [{}]>{{count = {}, capacity = {}, pairs = (\n",
            self as *const Self,
            self.allocator().name(),
            self.len(),
            self.capacity()
        );
        for (i, e) in self.inner.table.iter().enumerate() {
            s.push_str(&format!(
                "\t{} : {} = {}\n",
                i,
                self.inner.key_callbacks.describe(&e.key),
                self.inner.value_callbacks.describe(&e.value)
            ));
        }
        s.push_str(")}");
        s
    }
}

impl<K, V, KC, VC> Drop for Dictionary<K, V, KC, VC>
where
    KC: KeyCallbacks<K>,
    VC: ValueCallbacks<V>,
{
    fn drop(&mut self) {
        self.inner.release_all();
    }
}

impl<K, V, KC, VC> core::fmt::Debug for Dictionary<K, V, KC, VC>
where
    KC: KeyCallbacks<K>,
    VC: ValueCallbacks<V>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.describe())
    }
}
