//! Binary save/load sinks used by the meta-object hooks and the wire
//! protocol.

pub mod binary;

pub use binary::{BinaryDeserializer, BinarySerializer};
