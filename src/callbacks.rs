//! Ownership and identity callbacks for stored items.
//!
//! Containers never assume anything about the items they hold. Storing an
//! item goes through `retain`, removing it through `release`; lookups use
//! `equal` and, for hashed containers, `hash`.
//!
//! Three flavors are provided:
//! - [`Opaque`]: plain identity. Items are copied bitwise, never released,
//!   compared with `==` and hashed by their raw bits.
//! - [`ObjectCallbacks`]: delegate everything to the object kernel for
//!   [`ObjRef`] items. Zero-sized, so containers using it pay no storage.
//! - [`CallbackSet`]: caller-supplied functions; absent entries fall back to
//!   clone / drop / `==` / raw-bits hashing.

use crate::object::{self, ObjRef};
use core::fmt::Debug;
use core::hash::{Hash, Hasher};

/// The four-function contract for values and array elements.
pub trait ValueCallbacks<T> {
    /// Produce the item the container stores for a caller-provided one.
    fn retain(&self, value: &T) -> T;

    /// Dispose of an item the container no longer stores.
    fn release(&self, value: T) {
        drop(value)
    }

    fn equal(&self, a: &T, b: &T) -> bool;

    fn describe(&self, value: &T) -> String;
}

/// Keys additionally need a hash consistent with `equal`.
pub trait KeyCallbacks<T>: ValueCallbacks<T> {
    fn hash(&self, value: &T) -> u32;
}

/// Hasher that folds the written bytes without scrambling them, so a key
/// that writes a single integer hashes to that integer's low 32 bits (xor
/// the high ones). The tables scramble the result themselves.
#[derive(Default)]
struct RawBitsHasher(u64);

impl Hasher for RawBitsHasher {
    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(8) {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write_u64(u64::from_le_bytes(word));
        }
    }

    fn write_u8(&mut self, i: u8) {
        self.write_u64(i as u64)
    }
    fn write_u16(&mut self, i: u16) {
        self.write_u64(i as u64)
    }
    fn write_u32(&mut self, i: u32) {
        self.write_u64(i as u64)
    }
    fn write_usize(&mut self, i: usize) {
        self.write_u64(i as u64)
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = self.0.rotate_left(5) ^ i;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Raw-bits hash of any `Hash` value, folded to 32 bits.
pub fn raw_hash<T: Hash + ?Sized>(value: &T) -> u32 {
    let mut h = RawBitsHasher::default();
    value.hash(&mut h);
    let v = h.finish();
    (v ^ (v >> 32)) as u32
}

/// Identity semantics with no ownership.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Opaque;

impl<T: Copy + Eq + Hash + Debug> ValueCallbacks<T> for Opaque {
    fn retain(&self, value: &T) -> T {
        *value
    }

    fn release(&self, _value: T) {}

    fn equal(&self, a: &T, b: &T) -> bool {
        a == b
    }

    fn describe(&self, value: &T) -> String {
        format!("{:?}", value)
    }
}

impl<T: Copy + Eq + Hash + Debug> KeyCallbacks<T> for Opaque {
    fn hash(&self, value: &T) -> u32 {
        raw_hash(value)
    }
}

/// Delegate to the object kernel: retain/release adjust the reference count,
/// equality, hash and description dispatch through the object's class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ObjectCallbacks;

impl ValueCallbacks<ObjRef> for ObjectCallbacks {
    fn retain(&self, value: &ObjRef) -> ObjRef {
        value.retain()
    }

    fn release(&self, value: ObjRef) {
        value.release()
    }

    fn equal(&self, a: &ObjRef, b: &ObjRef) -> bool {
        object::equal(a, b)
    }

    fn describe(&self, value: &ObjRef) -> String {
        object::describe(value)
    }
}

impl KeyCallbacks<ObjRef> for ObjectCallbacks {
    fn hash(&self, value: &ObjRef) -> u32 {
        object::hash(value)
    }
}

/// Caller-supplied function set.
pub struct CallbackSet<T> {
    pub retain: Option<fn(&T) -> T>,
    pub release: Option<fn(T)>,
    pub describe: Option<fn(&T) -> String>,
    pub equal: Option<fn(&T, &T) -> bool>,
    pub hash: Option<fn(&T) -> u32>,
}

impl<T> CallbackSet<T> {
    /// All functions absent.
    pub const fn empty() -> Self {
        Self {
            retain: None,
            release: None,
            describe: None,
            equal: None,
            hash: None,
        }
    }
}

impl<T> Default for CallbackSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for CallbackSet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CallbackSet<T> {}

impl<T: Clone + PartialEq + Hash + Debug> ValueCallbacks<T> for CallbackSet<T> {
    fn retain(&self, value: &T) -> T {
        match self.retain {
            Some(f) => f(value),
            None => value.clone(),
        }
    }

    fn release(&self, value: T) {
        match self.release {
            Some(f) => f(value),
            None => drop(value),
        }
    }

    fn equal(&self, a: &T, b: &T) -> bool {
        match self.equal {
            Some(f) => f(a, b),
            None => a == b,
        }
    }

    fn describe(&self, value: &T) -> String {
        match self.describe {
            Some(f) => f(value),
            None => format!("{:?}", value),
        }
    }
}

impl<T: Clone + PartialEq + Hash + Debug> KeyCallbacks<T> for CallbackSet<T> {
    fn hash(&self, value: &T) -> u32 {
        match self.hash {
            Some(f) => f(value),
            None => raw_hash(value),
        }
    }
}
