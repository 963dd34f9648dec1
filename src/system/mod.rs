//! The actor system façade: configuration, registries, spawn paths, and
//! shutdown.

pub mod actor_system;
pub mod config;

pub use actor_system::ActorSystem;
pub use config::{keys, ConfigValue, Settings, SystemConfig};
