//! Runtime type identity and polymorphic (de)serialization.
//!
//! Every value that rides in a message payload is erased to
//! `Box<dyn Any + Send + Sync>` plus a dense [`TypeId`]. The meta-object
//! registry maps each id to an erased vtable ([`MetaObject`]) providing
//! default-construction, copying, equality, stringification, and binary
//! save/load. The registry is process-global, written during init, and
//! read-mostly afterwards.

pub mod builtin;
pub mod object;
pub mod registry;

pub use object::{ErasedValue, MetaObject, MetaType, TypeId};
pub use registry::{
    init, insert, lookup, register, register_custom, type_id_of, type_name, FIRST_CUSTOM_TYPE_ID,
};
