//! rc-collections: a reference-counted object kernel with allocator-backed
//! containers: a unique-key `Dictionary`, a multiset `Bag`, and a
//! double-ended `Array`.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: containers whose memory always comes from a caller-chosen
//!   allocator and whose element ownership is decided by callbacks, not by
//!   the element type.
//! - Layers:
//!   - `alloc`: the `Allocator` trait, the system and function-table
//!     allocators, and the swappable process-wide default.
//!   - `class` / `object`: class descriptors in a global registry and
//!     reference-counted objects whose header names their class and keeps
//!     their allocator alive.
//!   - `callbacks`: retain/release/equal/describe (+hash for keys).
//!     `Opaque` means identity without ownership; `ObjectCallbacks`
//!     delegates to the object kernel.
//!   - `hash_table`: open addressing with linear probing, explicit slot
//!     states and cached hashes; shared by `Dictionary` and `Bag`.
//!   - `deque`: one contiguous run inside a block with room at both ends;
//!     backs `Array`.
//!   - `sort`: quicksort and binary search over slices, fixed-width bytes
//!     and index-addressed storage.
//!
//! Constraints
//! - Single-threaded containers and objects: `!Send`/`!Sync`.
//! - Storage is allocated lazily on the first insert and returned to the
//!   allocator on `clear` and drop.
//! - Failed operations leave the container exactly as it was. Caller
//!   mistakes (bad index, mutating an immutable instance) are reported
//!   through `log` at the `Assert` level and returned as errors; nothing
//!   panics on caller input.
//!
//! Reentrancy policy
//! - Each container carries a debug-only reentrancy guard around the
//!   sections that run `equal`/`hash`/`retain` while storage is mid-edit.
//!   Removed items are released only after the structure is consistent
//!   again, so `release` may reenter freely.
//!
//! Hashing
//! - Entries store the callback hash they were inserted with; growth
//!   re-probes by stored hash and never calls back into user code.
//! - Slots carry an explicit `Empty`/`Deleted`/`Occupied` state, so every
//!   key bit pattern is storable.
//!
//! Overflow semantics
//! - Object reference-count overflow aborts the process, like `Rc`.
//!
//! Logging
//! - Four independently maskable levels (`Trace`, `Critical`, `Assert`,
//!   `Info`) forwarded to `tracing` under the `rc_collections` target. The
//!   mask can be read from `RC_COLLECTIONS_LOG` with
//!   [`log::init_from_env`].

pub mod alloc;
mod array;
mod bag;
pub mod callbacks;
pub mod class;
mod deque;
mod dictionary;
mod dictionary_proptest;
pub mod error;
pub mod hash_table;
pub mod log;
pub mod object;
mod reentrancy;
pub mod sort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mutability {
    Mutable,
    Immutable,
}

// Public surface
pub use alloc::{default_allocator, set_default_allocator, Allocator, AllocatorRef, FnAllocator, SystemAllocator};
pub use array::Array;
pub use bag::Bag;
pub use callbacks::{CallbackSet, KeyCallbacks, ObjectCallbacks, Opaque, ValueCallbacks};
pub use class::{ensure_class, lookup_class, register_class, ClassDescriptor, ClassId};
pub use dictionary::Dictionary;
pub use error::{CollectionError, KernelError, ParseMaskError};
pub use hash_table::BatchCursor;
pub use object::{copy_object, create_object, FlagField, ObjRef, Object};
