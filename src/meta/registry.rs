//! Process-global meta-object table.
//!
//! The table is indexed by dense [`TypeId`] and guarded by a single
//! `RwLock`: writes happen during module init, reads dominate afterwards.
//! Builtin types self-register lazily on first use, so unit tests can
//! exercise payloads without constructing a full actor system.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::OnceLock;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::builtin;
use super::object::{MetaObject, MetaType, TypeId};
use crate::error::{Error, ErrorCode};

/// First id available for application-defined types; everything below is
/// reserved for the runtime's builtin set.
pub const FIRST_CUSTOM_TYPE_ID: TypeId = 64;

#[derive(Default)]
struct RegistryInner {
    table: Vec<Option<MetaObject>>,
    by_name: HashMap<&'static str, TypeId>,
    by_rust: HashMap<std::any::TypeId, TypeId>,
    next_custom: TypeId,
}

fn registry() -> &'static RwLock<RegistryInner> {
    static REGISTRY: OnceLock<RwLock<RegistryInner>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        RwLock::new(RegistryInner {
            next_custom: FIRST_CUSTOM_TYPE_ID,
            ..RegistryInner::default()
        })
    })
}

fn ensure_builtins() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        builtin::register_builtin_types();
    });
}

/// Force registration of the builtin set. Implicit on first use of any
/// registry entry point; systems call it eagerly before touching the
/// multiplexer or spawning actors.
pub fn init() {
    ensure_builtins();
}

fn insert_into(inner: &mut RegistryInner, first_id: TypeId, entries: &[MetaObject]) {
    let end = first_id as usize + entries.len();
    if inner.table.len() < end {
        inner.table.resize(end, None);
    }
    for (offset, meta) in entries.iter().enumerate() {
        let id = first_id + offset as TypeId;
        if let Some(existing) = &inner.table[id as usize] {
            if existing.type_name == meta.type_name {
                // Re-inserting the same name is idempotent.
                continue;
            }
            panic!(
                "conflicting meta objects for type id {id}: {} vs {}",
                existing.type_name, meta.type_name
            );
        }
        if let Some(&other) = inner.by_name.get(meta.type_name) {
            panic!(
                "type name {} already registered under id {other}, refusing id {id}",
                meta.type_name
            );
        }
        inner.table[id as usize] = Some(*meta);
        inner.by_name.insert(meta.type_name, id);
        inner.by_rust.insert(meta.rust_type, id);
    }
}

/// Register a contiguous range of meta objects starting at `first_id`.
///
/// Re-inserting the same `(id, name)` pair is a no-op; registering a
/// different name under an occupied id (or reusing a name for a second id)
/// is a programming error and fatal at init.
pub fn insert(first_id: TypeId, entries: &[MetaObject]) {
    ensure_builtins();
    insert_into(&mut registry().write(), first_id, entries);
}

/// Internal insert used while the builtin set itself registers.
pub(super) fn insert_raw(first_id: TypeId, entries: &[MetaObject]) {
    insert_into(&mut registry().write(), first_id, entries);
}

/// Register `T` under an explicit id.
pub fn register<T: MetaType>(id: TypeId) {
    insert(id, &[MetaObject::of::<T>()]);
}

/// Register `T` in the application range, assigning the next free id.
///
/// Idempotent: re-registering a type returns its existing id.
pub fn register_custom<T: MetaType>() -> TypeId {
    ensure_builtins();
    let mut inner = registry().write();
    if let Some(&id) = inner.by_rust.get(&std::any::TypeId::of::<T>()) {
        return id;
    }
    let mut id = inner.next_custom.max(FIRST_CUSTOM_TYPE_ID);
    while (id as usize) < inner.table.len() && inner.table[id as usize].is_some() {
        id += 1;
    }
    inner.next_custom = id + 1;
    insert_into(&mut inner, id, &[MetaObject::of::<T>()]);
    id
}

/// Look up the meta object for a type id.
pub fn lookup(id: TypeId) -> Result<MetaObject, Error> {
    ensure_builtins();
    registry()
        .read()
        .table
        .get(id as usize)
        .and_then(|slot| *slot)
        .ok_or_else(|| {
            Error::with_context(ErrorCode::UnknownType, format!("no meta object for id {id}"))
        })
}

/// The dense id assigned to `T`, if registered.
pub fn type_id_of<T: 'static>() -> Result<TypeId, Error> {
    ensure_builtins();
    registry()
        .read()
        .by_rust
        .get(&std::any::TypeId::of::<T>())
        .copied()
        .ok_or_else(|| {
            Error::with_context(
                ErrorCode::UnknownType,
                format!("{} is not registered", std::any::type_name::<T>()),
            )
        })
}

/// Human-readable name for a type id.
pub fn type_name(id: TypeId) -> Option<&'static str> {
    ensure_builtins();
    registry()
        .read()
        .table
        .get(id as usize)
        .and_then(|slot| slot.map(|meta| meta.type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::{BinaryDeserializer, BinarySerializer};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct RegistryProbe(u32);

    impl MetaType for RegistryProbe {
        const NAME: &'static str = "registry-probe";

        fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
            sink.write_u32(self.0);
            Ok(())
        }

        fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
            self.0 = source.read_u32()?;
            Ok(())
        }
    }

    #[test]
    fn builtin_ids_resolve() {
        let id = type_id_of::<i64>().unwrap();
        assert_eq!(lookup(id).unwrap().type_name, "int64");
    }

    #[test]
    fn unknown_id_yields_typed_error() {
        let err = lookup(TypeId::MAX).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownType);
    }

    #[test]
    fn custom_registration_is_idempotent() {
        let first = register_custom::<RegistryProbe>();
        let second = register_custom::<RegistryProbe>();
        assert_eq!(first, second);
        assert!(first >= FIRST_CUSTOM_TYPE_ID);
        assert_eq!(type_name(first), Some("registry-probe"));
    }

    #[test]
    fn reinserting_same_name_is_a_noop() {
        let id = register_custom::<RegistryProbe>();
        // Same (id, name) pair again: must not panic.
        insert(id, &[MetaObject::of::<RegistryProbe>()]);
        assert_eq!(type_id_of::<RegistryProbe>().unwrap(), id);
    }
}
