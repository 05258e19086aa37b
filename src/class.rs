//! Class descriptors and the process-wide class registry.
//!
//! A class is a static table of optional hooks. Objects store only the
//! [`ClassId`]; dispatch looks the descriptor up here.

use crate::error::KernelError;
use crate::object::Object;
use hashbrown::HashMap;
use slotmap::{new_key_type, SlotMap};
use std::sync::{OnceLock, RwLock};

new_key_type! {
    /// Generational id of a registered class.
    pub struct ClassId;
}

/// Per-class dispatch table. Absent hooks fall back to identity behavior.
#[derive(Debug, Clone, Copy)]
pub struct ClassDescriptor {
    pub name: &'static str,
    /// Runs on the zeroed payload right after creation.
    pub init: Option<fn(&Object)>,
    /// Runs on the new object after `copy_object` copied the payload bytes.
    pub copy: Option<fn(src: &Object, dst: &Object)>,
    /// Runs once the last reference is released, before the memory is freed.
    pub cleanup: Option<fn(&Object)>,
    pub equal: Option<fn(&Object, &Object) -> bool>,
    pub hash: Option<fn(&Object) -> u32>,
    pub describe: Option<fn(&Object) -> String>,
}

impl ClassDescriptor {
    /// Descriptor with a name and no hooks.
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            init: None,
            copy: None,
            cleanup: None,
            equal: None,
            hash: None,
            describe: None,
        }
    }
}

#[derive(Default)]
struct Registry {
    classes: SlotMap<ClassId, &'static ClassDescriptor>,
    by_name: HashMap<&'static str, ClassId>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Register a class. Intended to run once per type during initialization.
pub fn register_class(descriptor: &'static ClassDescriptor) -> Result<ClassId, KernelError> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.by_name.contains_key(descriptor.name) {
        return Err(KernelError::DuplicateClassName(descriptor.name));
    }
    let id = reg.classes.insert(descriptor);
    reg.by_name.insert(descriptor.name, id);
    crate::rc_info!("registered class {} as {:?}", descriptor.name, id);
    Ok(id)
}

pub fn class_descriptor(id: ClassId) -> Option<&'static ClassDescriptor> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    reg.classes.get(id).copied()
}

pub fn lookup_class(name: &str) -> Option<ClassId> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    reg.by_name.get(name).copied()
}

/// Register `descriptor` unless a class of the same name exists, returning
/// the id either way.
pub fn ensure_class(descriptor: &'static ClassDescriptor) -> ClassId {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if let Some(&id) = reg.by_name.get(descriptor.name) {
        return id;
    }
    let id = reg.classes.insert(descriptor);
    reg.by_name.insert(descriptor.name, id);
    crate::rc_info!("registered class {} as {:?}", descriptor.name, id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    static ALPHA: ClassDescriptor = ClassDescriptor::named("class-tests/alpha");
    static BETA: ClassDescriptor = ClassDescriptor::named("class-tests/beta");
    static ALPHA_AGAIN: ClassDescriptor = ClassDescriptor::named("class-tests/alpha");

    #[test]
    fn register_assigns_distinct_ids_and_rejects_duplicate_names() {
        let a = register_class(&ALPHA).unwrap();
        let b = register_class(&BETA).unwrap();
        assert_ne!(a, b);
        assert_eq!(class_descriptor(a).unwrap().name, "class-tests/alpha");
        assert_eq!(lookup_class("class-tests/beta"), Some(b));
        assert_eq!(
            register_class(&ALPHA_AGAIN),
            Err(KernelError::DuplicateClassName("class-tests/alpha"))
        );
        assert_eq!(ensure_class(&ALPHA_AGAIN), a);
    }

    #[test]
    fn unknown_name_is_absent() {
        assert_eq!(lookup_class("class-tests/missing"), None);
        assert!(class_descriptor(ClassId::default()).is_none());
    }
}
