//! Shared utility types: node, process, and actor identity.

pub mod ids;

pub use ids::{ActorAddr, ActorId, NodeId, ProcessId};
