//! Pluggable allocators.
//!
//! Every object and every container storage block is obtained from an
//! [`Allocator`]. Owners keep an `Arc` to the allocator that produced their
//! memory, so an allocator always outlives what it handed out.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::sync::{Arc, Mutex, OnceLock};

/// Raw memory provider.
///
/// Only `allocate` is required. The provided `reallocate` is the
/// four-case simulation built from `allocate`/`deallocate`; it does not
/// preserve content, so callers that need the old bytes must use an allocator
/// that overrides it.
pub trait Allocator: Send + Sync {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory obtained from `allocate` with the same layout.
    fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        simulate_reallocate(self, ptr, old, new_size)
    }

    /// Short label used by `describe` output.
    fn name(&self) -> &str {
        "allocator"
    }
}

/// Reallocation built from allocate/deallocate only.
///
/// | old ptr | new size | action                   |
/// |---------|----------|--------------------------|
/// | none    | 0        | nothing                  |
/// | none    | > 0      | allocate                 |
/// | some    | 0        | deallocate               |
/// | some    | > 0      | deallocate then allocate |
///
/// Old content is lost in the last case.
pub fn simulate_reallocate<A: Allocator + ?Sized>(
    alloc: &A,
    ptr: Option<NonNull<u8>>,
    old: Layout,
    new_size: usize,
) -> Option<NonNull<u8>> {
    let new_layout = Layout::from_size_align(new_size, old.align()).ok()?;
    match (ptr, new_size) {
        (None, 0) => None,
        (None, _) => alloc.allocate(new_layout),
        (Some(p), 0) => {
            alloc.deallocate(p, old);
            None
        }
        (Some(p), _) => {
            alloc.deallocate(p, old);
            alloc.allocate(new_layout)
        }
    }
}

/// The global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return Some(dangling_for(layout));
        }
        // SAFETY: size is non-zero.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: ptr came from `allocate` with this layout.
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match ptr {
            Some(p) if old.size() != 0 && new_size != 0 => {
                // SAFETY: p was allocated with `old`; new_size is non-zero.
                NonNull::new(unsafe { std::alloc::realloc(p.as_ptr(), old, new_size) })
            }
            _ => simulate_reallocate(self, ptr, old, new_size),
        }
    }

    fn name(&self) -> &str {
        "system"
    }
}

fn dangling_for(layout: Layout) -> NonNull<u8> {
    // Non-null and aligned; never dereferenced for zero-sized layouts.
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

pub type AllocateFn<C> = fn(&C, Layout) -> Option<NonNull<u8>>;
pub type ReallocateFn<C> = fn(&C, Option<NonNull<u8>>, Layout, usize) -> Option<NonNull<u8>>;
pub type DeallocateFn<C> = fn(&C, NonNull<u8>, Layout);

/// Allocator assembled from optional functions over an opaque context.
///
/// The context lives as long as the allocator; dropping the last `Arc` to the
/// allocator releases it. Missing functions fall back as follows: no
/// `allocate` fails every request, no `deallocate` leaks, no `reallocate`
/// uses [`simulate_reallocate`].
pub struct FnAllocator<C> {
    pub context: C,
    pub allocate: Option<AllocateFn<C>>,
    pub reallocate: Option<ReallocateFn<C>>,
    pub deallocate: Option<DeallocateFn<C>>,
    pub label: &'static str,
}

impl<C: Send + Sync> Allocator for FnAllocator<C> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.allocate.and_then(|f| f(&self.context, layout))
    }

    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if let Some(f) = self.deallocate {
            f(&self.context, ptr, layout)
        }
    }

    fn reallocate(
        &self,
        ptr: Option<NonNull<u8>>,
        old: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match self.reallocate {
            Some(f) => f(&self.context, ptr, old, new_size),
            None => simulate_reallocate(self, ptr, old, new_size),
        }
    }

    fn name(&self) -> &str {
        self.label
    }
}

pub type AllocatorRef = Arc<dyn Allocator>;

fn default_slot() -> &'static Mutex<AllocatorRef> {
    static SLOT: OnceLock<Mutex<AllocatorRef>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(Arc::new(SystemAllocator)))
}

/// Current process-wide default allocator (a new strong reference).
pub fn default_allocator() -> AllocatorRef {
    let slot = default_slot().lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(&slot)
}

/// Swap the default allocator, returning the one it replaced.
///
/// Objects and containers created earlier keep the allocator they were made
/// with.
pub fn set_default_allocator(alloc: AllocatorRef) -> AllocatorRef {
    let mut slot = default_slot().lock().unwrap_or_else(|e| e.into_inner());
    core::mem::replace(&mut *slot, alloc)
}

/// Resolve an optional explicit allocator against the default slot.
pub(crate) fn resolve(alloc: Option<AllocatorRef>) -> AllocatorRef {
    alloc.unwrap_or_else(default_allocator)
}
