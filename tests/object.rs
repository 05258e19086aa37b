// Object kernel and allocator plumbing through the public API.
//
// Core invariants exercised:
// - Every block handed out by an allocator is returned to that same
//   allocator, for objects and for container storage.
// - An allocation failure surfaces as an error and leaves the container
//   unchanged.
// - Objects survive as long as any container or handle retains them.
use rc_collections::{
    copy_object, create_object, default_allocator, ensure_class, lookup_class,
    set_default_allocator, AllocatorRef, Array, Bag, ClassDescriptor, CollectionError,
    Dictionary, FnAllocator, ObjRef, Object, ObjectCallbacks, Opaque, SystemAllocator,
};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Budget {
    live: AtomicUsize,
    // Remaining successful allocations; usize::MAX means unlimited.
    remaining: AtomicUsize,
}

fn budget_alloc(b: &Budget, layout: Layout) -> Option<NonNull<u8>> {
    let left = b.remaining.load(Ordering::SeqCst);
    if left == 0 {
        return None;
    }
    if left != usize::MAX {
        b.remaining.store(left - 1, Ordering::SeqCst);
    }
    b.live.fetch_add(1, Ordering::SeqCst);
    // SAFETY: every layout the crate asks for has a non-zero size.
    NonNull::new(unsafe { std::alloc::alloc(layout) })
}

fn budget_free(b: &Budget, ptr: NonNull<u8>, layout: Layout) {
    b.live.fetch_sub(1, Ordering::SeqCst);
    // SAFETY: ptr came from budget_alloc with the same layout.
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
}

fn budget(remaining: usize) -> Arc<FnAllocator<Budget>> {
    Arc::new(FnAllocator {
        context: Budget {
            live: AtomicUsize::new(0),
            remaining: AtomicUsize::new(remaining),
        },
        allocate: Some(budget_alloc),
        reallocate: None,
        deallocate: Some(budget_free),
        label: "budget",
    })
}

fn live(a: &FnAllocator<Budget>) -> usize {
    a.context.live.load(Ordering::SeqCst)
}

static BLOB: ClassDescriptor = ClassDescriptor::named("object-tests/blob");

// Test: allocator round trip.
// Verifies: objects, dictionary tables, bag tables and array blocks all come
// from the given allocator and all go back to it.
#[test]
fn all_storage_returns_to_its_allocator() {
    let a = budget(usize::MAX);
    let r = || Some(a.clone() as AllocatorRef);
    {
        let obj = create_object(r(), ensure_class(&BLOB), 24).unwrap();
        assert_eq!(obj.allocator().name(), "budget");
        let mut d = Dictionary::with_allocator(r(), 0, Opaque, ObjectCallbacks);
        let mut b = Bag::with_allocator(r(), 0, ObjectCallbacks);
        let mut arr = Array::with_allocator(r(), 0, ObjectCallbacks);
        for i in 0..40u32 {
            d.set_value(&i, &obj).unwrap();
            b.add_value(&obj).unwrap();
            arr.append(&obj).unwrap();
        }
        assert_eq!(obj.retain_count(), 1 + 40 + 1 + 40);
        assert!(live(&a) >= 4);
        assert!(d.describe().contains("[budget]"));
    }
    assert_eq!(live(&a), 0);
}

// Test: allocation failure.
// Verifies: growth that cannot allocate reports AllocationFailed and the
// containers keep their previous contents.
#[test]
fn allocation_failure_leaves_containers_unchanged() {
    let a = budget(2);
    let mut d: Dictionary<u32, u32> =
        Dictionary::with_allocator(Some(a.clone() as AllocatorRef), 0, Opaque, Opaque);
    let mut arr: Array<u32> = Array::with_allocator(Some(a.clone() as AllocatorRef), 0, Opaque);
    d.set_value(&1, &1).unwrap();
    arr.append(&1).unwrap();

    let mut k = 2;
    let err = loop {
        match d.set_value(&k, &k) {
            Ok(()) => k += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, CollectionError::AllocationFailed { .. }));
    assert_eq!(d.len(), (k - 1) as usize);
    assert!(!d.contains_key(&k));
    for j in 1..k {
        assert_eq!(d.get_value(&j), Some(&j));
    }

    let mut n = 1u32;
    let err = loop {
        match arr.append(&n) {
            Ok(()) => n += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, CollectionError::AllocationFailed { .. }));
    assert_eq!(arr.len(), n as usize);
    assert_eq!(arr.first(), Some(&1));

    drop(d);
    drop(arr);
    assert_eq!(live(&a), 0);
}

// Test: object lifetime across containers.
// Verifies: a copy is independent; the original outlives the caller's handle
// while a container holds it and is freed once the container lets go.
#[test]
fn containers_keep_objects_alive() {
    let a = budget(usize::MAX);
    let mut original = create_object(Some(a.clone() as AllocatorRef), ensure_class(&BLOB), 4).unwrap();
    original.payload_mut().unwrap().copy_from_slice(b"abcd");
    let system: AllocatorRef = Arc::new(SystemAllocator);
    let copy = copy_object(Some(system.clone()), &original).unwrap();
    assert_eq!(copy.bytes(), b"abcd");
    assert_eq!(copy.allocator().name(), "system");

    let mut arr = Array::with_allocator(Some(system), 0, ObjectCallbacks);
    arr.append(&original).unwrap();
    let addr: *const Object = original.as_ptr();
    drop(original);
    assert_eq!(live(&a), 1);
    let stored = arr.first().unwrap();
    assert!(std::ptr::eq(stored.as_ptr(), addr));
    assert_eq!(stored.bytes(), b"abcd");

    let popped: ObjRef = arr.pop_back().unwrap().unwrap();
    assert_eq!(popped.retain_count(), 1);
    drop(popped);
    assert_eq!(live(&a), 0);
}

// Test: class registry lookup by name.
#[test]
fn classes_are_found_by_name() {
    let id = ensure_class(&BLOB);
    assert_eq!(lookup_class("object-tests/blob"), Some(id));
    assert_eq!(ensure_class(&BLOB), id);
    let o = create_object(Some(Arc::new(SystemAllocator) as AllocatorRef), id, 0).unwrap();
    assert_eq!(o.class_name(), "object-tests/blob");
    assert_eq!(o.size(), 0);
}

// Test: swapping the process default.
// Verifies: the previous default is returned, new objects pick up the
// replacement, and restoring puts the original back.
// Other tests in this file pass explicit allocators so the swap window
// cannot capture their allocations.
#[test]
fn default_allocator_can_be_swapped() {
    let a = budget(usize::MAX);
    let previous = set_default_allocator(a.clone());
    let o = create_object(None, ensure_class(&BLOB), 8).unwrap();
    let restored = set_default_allocator(previous.clone());
    assert_eq!(o.allocator().name(), "budget");
    assert_eq!(restored.name(), "budget");
    assert_eq!(default_allocator().name(), previous.name());
    drop(o);
}
