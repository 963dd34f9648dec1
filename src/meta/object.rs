//! Erased per-type vtables.

// Layer 1: Standard library imports
use std::any::Any;
use std::fmt;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::error::{Error, ErrorCode};
use crate::serial::{BinaryDeserializer, BinarySerializer};

/// Dense runtime type id assigned by the meta-object registry.
pub type TypeId = u16;

/// A type-erased payload element.
pub type ErasedValue = Box<dyn Any + Send + Sync>;

/// Trait for types that can ride in message payloads.
///
/// Implementations provide a stable human-readable name plus binary
/// save/load hooks; the remaining vtable entries (copy, equality,
/// stringify) derive from the standard trait bounds.
///
/// # Example
/// ```rust
/// use hive_rt::meta::MetaType;
/// use hive_rt::serial::{BinaryDeserializer, BinarySerializer};
/// use hive_rt::Error;
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Celsius(i32);
///
/// impl MetaType for Celsius {
///     const NAME: &'static str = "celsius";
///
///     fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
///         sink.write_i32(self.0);
///         Ok(())
///     }
///
///     fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
///         self.0 = source.read_i32()?;
///         Ok(())
///     }
/// }
/// ```
pub trait MetaType:
    Any + Send + Sync + Clone + Default + PartialEq + fmt::Debug + 'static
{
    /// Stable human-readable type name. Registering two different types
    /// under one name (or one id under two names) is fatal at init.
    const NAME: &'static str;

    /// Write this value to a binary sink.
    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error>;

    /// Overwrite this value from a binary source.
    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error>;
}

/// Erased vtable for one registered type.
///
/// Plain struct of fn pointers so the registry can hand out copies by
/// value; all pointers are instantiated from a single [`MetaType`]
/// implementation via [`MetaObject::of`].
#[derive(Clone, Copy)]
pub struct MetaObject {
    /// Human-readable type name.
    pub type_name: &'static str,
    /// The Rust-side identity backing the erased value.
    pub rust_type: std::any::TypeId,
    /// Construct a default value.
    pub default_construct: fn() -> ErasedValue,
    /// Copy-construct from an erased reference.
    pub copy_construct: fn(&(dyn Any + Send + Sync)) -> ErasedValue,
    /// Structural equality between two erased values of this type.
    pub eq: fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool,
    /// Human-readable rendering.
    pub stringify: fn(&(dyn Any + Send + Sync)) -> String,
    /// Serialize to a binary sink.
    pub save: fn(&(dyn Any + Send + Sync), &mut BinarySerializer) -> Result<(), Error>,
    /// Deserialize from a binary source, overwriting the value in place.
    pub load: fn(&mut (dyn Any + Send + Sync), &mut BinaryDeserializer<'_>) -> Result<(), Error>,
}

impl MetaObject {
    /// Build the vtable for `T`.
    pub fn of<T: MetaType>() -> Self {
        Self {
            type_name: T::NAME,
            rust_type: std::any::TypeId::of::<T>(),
            default_construct: erased_default::<T>,
            copy_construct: erased_copy::<T>,
            eq: erased_eq::<T>,
            stringify: erased_stringify::<T>,
            save: erased_save::<T>,
            load: erased_load::<T>,
        }
    }
}

impl fmt::Debug for MetaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaObject")
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn erased_default<T: MetaType>() -> ErasedValue {
    Box::new(T::default())
}

fn erased_copy<T: MetaType>(value: &(dyn Any + Send + Sync)) -> ErasedValue {
    match value.downcast_ref::<T>() {
        Some(concrete) => Box::new(concrete.clone()),
        // A value stored under the wrong id means the registry itself is
        // corrupt; continuing would silently mix types.
        None => panic!("meta object for {} applied to foreign value", T::NAME),
    }
}

fn erased_eq<T: MetaType>(lhs: &(dyn Any + Send + Sync), rhs: &(dyn Any + Send + Sync)) -> bool {
    match (lhs.downcast_ref::<T>(), rhs.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn erased_stringify<T: MetaType>(value: &(dyn Any + Send + Sync)) -> String {
    match value.downcast_ref::<T>() {
        Some(concrete) => format!("{concrete:?}"),
        None => format!("<corrupt {}>", T::NAME),
    }
}

fn erased_save<T: MetaType>(
    value: &(dyn Any + Send + Sync),
    sink: &mut BinarySerializer,
) -> Result<(), Error> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| {
            Error::with_context(
                ErrorCode::UnsafeType,
                format!("value is not a {}", T::NAME),
            )
        })?
        .save(sink)
}

fn erased_load<T: MetaType>(
    value: &mut (dyn Any + Send + Sync),
    source: &mut BinaryDeserializer<'_>,
) -> Result<(), Error> {
    value
        .downcast_mut::<T>()
        .ok_or_else(|| {
            Error::with_context(
                ErrorCode::UnsafeType,
                format!("value is not a {}", T::NAME),
            )
        })?
        .load(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vtable_dispatch() {
        let meta = MetaObject::of::<i64>();
        let value = (meta.default_construct)();
        assert_eq!(value.downcast_ref::<i64>(), Some(&0));

        let copied = (meta.copy_construct)(&*value);
        assert!((meta.eq)(&*value, &*copied));
        assert_eq!((meta.stringify)(&*copied), "0");
    }

    #[test]
    fn save_load_roundtrip_through_vtable() {
        let meta = MetaObject::of::<i64>();
        let original: ErasedValue = Box::new(-42i64);
        let mut sink = BinarySerializer::new();
        (meta.save)(&*original, &mut sink).unwrap();

        let mut restored = (meta.default_construct)();
        let bytes = sink.into_bytes();
        let mut source = BinaryDeserializer::new(&bytes);
        (meta.load)(&mut *restored, &mut source).unwrap();
        assert!((meta.eq)(&*original, &*restored));
    }

    #[test]
    fn save_rejects_foreign_values() {
        let meta = MetaObject::of::<i64>();
        let foreign: ErasedValue = Box::new(String::from("nope"));
        let mut sink = BinarySerializer::new();
        let err = (meta.save)(&*foreign, &mut sink).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsafeType);
    }
}
