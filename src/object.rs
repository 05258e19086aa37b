//! Reference-counted objects with a class header and a raw payload.
//!
//! Layout of one object allocation:
//!
//! ```text
//! +-----------------------------+----------------------+
//! | Object header               | payload (size bytes) |
//! | class, flags, count, alloc  | zeroed on creation   |
//! +-----------------------------+----------------------+
//! ```
//!
//! The header keeps a strong reference to the allocator that produced the
//! block; the block is returned to that allocator when the count hits zero.
//! Like `Rc`, objects are single-threaded (`!Send`, `!Sync`).

use crate::alloc::{self, AllocatorRef};
use crate::class::{self, ClassDescriptor, ClassId};
use crate::error::KernelError;
use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

const PAYLOAD_ALIGN: usize = 16;

/// A contiguous bit range inside the 32-bit header flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagField {
    shift: u8,
    width: u8,
}

impl FlagField {
    pub const fn new(shift: u8, width: u8) -> Self {
        assert!(width > 0 && shift as u32 + width as u32 <= 32, "flag field outside header word");
        Self { shift, width }
    }

    const fn mask(self) -> u32 {
        let bits = if self.width == 32 { u32::MAX } else { (1u32 << self.width) - 1 };
        bits << self.shift
    }

    pub const fn max_value(self) -> u32 {
        self.mask() >> self.shift
    }

    pub const fn overlaps(self, other: FlagField) -> bool {
        self.mask() & other.mask() != 0
    }
}

/// True when no two fields share a bit. Meant for `const` assertions next to
/// a type's flag definitions.
pub const fn fields_disjoint(fields: &[FlagField]) -> bool {
    let mut i = 0;
    while i < fields.len() {
        let mut j = i + 1;
        while j < fields.len() {
            if fields[i].overlaps(fields[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

/// Object header; the payload follows it in the same allocation.
pub struct Object {
    class: ClassId,
    flags: Cell<u32>,
    refcount: Cell<usize>,
    size: usize,
    allocator: ManuallyDrop<AllocatorRef>,
    _nosend: PhantomData<*mut ()>,
}

fn layout_for(size: usize) -> Option<(Layout, usize)> {
    let payload = Layout::from_size_align(size, PAYLOAD_ALIGN).ok()?;
    let (layout, offset) = Layout::new::<Object>().extend(payload).ok()?;
    Some((layout.pad_to_align(), offset))
}

impl Object {
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn class_name(&self) -> &'static str {
        self.descriptor().map(|d| d.name).unwrap_or("<unregistered>")
    }

    fn descriptor(&self) -> Option<&'static ClassDescriptor> {
        class::class_descriptor(self.class)
    }

    pub fn retain_count(&self) -> usize {
        self.refcount.get()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allocator(&self) -> &AllocatorRef {
        &self.allocator
    }

    pub fn flags(&self) -> u32 {
        self.flags.get()
    }

    pub fn flag(&self, field: FlagField) -> u32 {
        (self.flags.get() & field.mask()) >> field.shift
    }

    /// Store `value` into `field`; bits outside the field are untouched.
    pub fn set_flag(&self, field: FlagField, value: u32) {
        debug_assert!(value <= field.max_value(), "flag value does not fit its field");
        let word = (self.flags.get() & !field.mask()) | ((value << field.shift) & field.mask());
        self.flags.set(word);
    }

    /// Pointer to the first payload byte.
    pub fn payload_ptr(&self) -> NonNull<u8> {
        // layout_for succeeded when the object was created with this size.
        let offset = layout_for(self.size).map(|(_, o)| o).unwrap_or(0);
        // SAFETY: the payload lives `offset` bytes past the header.
        unsafe { NonNull::new_unchecked((self as *const Object as *mut u8).add(offset)) }
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: payload is `size` initialized bytes owned by this object.
        unsafe { core::slice::from_raw_parts(self.payload_ptr().as_ptr(), self.size) }
    }

    fn address(&self) -> usize {
        self as *const Object as usize
    }
}

/// Strong reference to an [`Object`]. `Clone` retains, `Drop` releases.
pub struct ObjRef {
    ptr: NonNull<Object>,
    _nosend: PhantomData<*mut ()>,
}

impl ObjRef {
    /// Explicit retain; same as `clone`.
    pub fn retain(&self) -> ObjRef {
        self.clone()
    }

    /// Explicit release; same as `drop`.
    pub fn release(self) {
        drop(self)
    }

    pub fn ptr_eq(a: &ObjRef, b: &ObjRef) -> bool {
        a.ptr == b.ptr
    }

    pub fn as_ptr(&self) -> *const Object {
        self.ptr.as_ptr()
    }

    /// Mutable payload access, only while this is the sole reference.
    pub fn payload_mut(&mut self) -> Option<&mut [u8]> {
        if self.retain_count() != 1 {
            return None;
        }
        let size = self.size;
        let p = self.payload_ptr();
        // SAFETY: unique reference, payload is `size` initialized bytes.
        Some(unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), size) })
    }
}

impl core::ops::Deref for ObjRef {
    type Target = Object;
    fn deref(&self) -> &Object {
        // SAFETY: the object stays alive while any ObjRef exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl Clone for ObjRef {
    fn clone(&self) -> Self {
        let n = self.refcount.get().wrapping_add(1);
        if n == 0 {
            std::process::abort();
        }
        self.refcount.set(n);
        ObjRef {
            ptr: self.ptr,
            _nosend: PhantomData,
        }
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        let n = self.refcount.get() - 1;
        self.refcount.set(n);
        if n == 0 {
            // SAFETY: last reference; nothing else can observe the object.
            unsafe { free_object(self.ptr) }
        }
    }
}

unsafe fn free_object(ptr: NonNull<Object>) {
    let obj = ptr.as_ref();
    if let Some(cleanup) = obj.descriptor().and_then(|d| d.cleanup) {
        cleanup(obj);
    }
    let size = obj.size;
    let allocator = ManuallyDrop::take(&mut (*ptr.as_ptr()).allocator);
    if let Some((layout, _)) = layout_for(size) {
        allocator.deallocate(ptr.cast(), layout);
    }
    crate::rc_trace!("freed object of {} payload bytes", size);
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self))
    }
}

fn allocate_object(
    allocator: AllocatorRef,
    class: ClassId,
    size: usize,
) -> Result<ObjRef, KernelError> {
    let (layout, offset) =
        layout_for(size).ok_or(KernelError::AllocationFailed { bytes: usize::MAX })?;
    let Some(raw) = allocator.allocate(layout) else {
        crate::rc_critical!("object allocation of {} bytes failed", layout.size());
        return Err(KernelError::AllocationFailed { bytes: layout.size() });
    };
    let ptr = raw.cast::<Object>();
    // SAFETY: `raw` is a fresh block of `layout`, which starts with an Object
    // and has `size` payload bytes at `offset`.
    unsafe {
        ptr.as_ptr().write(Object {
            class,
            flags: Cell::new(0),
            refcount: Cell::new(1),
            size,
            allocator: ManuallyDrop::new(allocator),
            _nosend: PhantomData,
        });
        raw.as_ptr().add(offset).write_bytes(0, size);
    }
    Ok(ObjRef {
        ptr,
        _nosend: PhantomData,
    })
}

/// Create an object of `class` with `size` zeroed payload bytes.
///
/// `None` picks the default allocator. The class `init` hook runs before the
/// reference is returned; the returned count is one.
pub fn create_object(
    allocator: Option<AllocatorRef>,
    class: ClassId,
    size: usize,
) -> Result<ObjRef, KernelError> {
    let desc = class::class_descriptor(class).ok_or(KernelError::UnknownClass(class))?;
    let obj = allocate_object(alloc::resolve(allocator), class, size)?;
    if let Some(init) = desc.init {
        init(&obj);
    }
    Ok(obj)
}

/// New object of the same class with a copy of the payload and flags.
pub fn copy_object(allocator: Option<AllocatorRef>, src: &Object) -> Result<ObjRef, KernelError> {
    let desc = class::class_descriptor(src.class).ok_or(KernelError::UnknownClass(src.class))?;
    let dst = allocate_object(alloc::resolve(allocator), src.class, src.size)?;
    // SAFETY: both payloads are `size` bytes and belong to distinct objects.
    unsafe {
        core::ptr::copy_nonoverlapping(
            src.payload_ptr().as_ptr(),
            dst.payload_ptr().as_ptr(),
            src.size,
        );
    }
    dst.flags.set(src.flags.get());
    if let Some(copy) = desc.copy {
        copy(src, &dst);
    }
    Ok(dst)
}

pub fn equal(a: &Object, b: &Object) -> bool {
    if core::ptr::eq(a, b) {
        return true;
    }
    if a.class != b.class {
        return false;
    }
    match a.descriptor().and_then(|d| d.equal) {
        Some(eq) => eq(a, b),
        None => false,
    }
}

pub fn hash(obj: &Object) -> u32 {
    match obj.descriptor().and_then(|d| d.hash) {
        Some(h) => h(obj),
        None => {
            let addr = obj.address() as u64;
            (addr ^ (addr >> 32)) as u32
        }
    }
}

pub fn describe(obj: &Object) -> String {
    match obj.descriptor().and_then(|d| d.describe) {
        Some(d) => d(obj),
        None => format!("<{} {:#x}>", obj.class_name(), obj.address()),
    }
}
