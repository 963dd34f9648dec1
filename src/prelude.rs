//! Curated re-exports for application code.
//!
//! ```rust
//! use hive_rt::prelude::*;
//! ```

pub use crate::actor::{
    link, unlink, Actor, ActorContext, ActorRef, ActorWeak, Behavior, BlockingActor,
    BlockingContext, RequestId, ScopedActor, SpawnOptions, Unmatched,
};
pub use crate::error::{Error, ErrorCode, ExitReason};
pub use crate::message::{
    DownMsg, ExitMsg, MessageId, NodeDownMsg, Payload, PayloadBuilder, SysInfoReply,
    SysInfoRequest,
};
pub use crate::meta::{register_custom, MetaType};
pub use crate::payload;
pub use crate::serial::{BinaryDeserializer, BinarySerializer};
pub use crate::system::{keys, ActorSystem, ConfigValue, Settings, SystemConfig};
pub use crate::time::Disposable;
pub use crate::util::{ActorAddr, ActorId, NodeId};
