//! # hive-rt - Distributed Actor Runtime
//!
//! A runtime that expresses computation as independent actors
//! communicating exclusively by asynchronous messages, with transparent
//! location: a recipient may live on the local node or behind a TCP
//! connection, and `send` does not care.
//!
//! # Quick Start
//!
//! ```rust
//! use hive_rt::prelude::*;
//! use std::time::Duration;
//!
//! struct Adder;
//!
//! impl Actor for Adder {
//!     fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
//!         Behavior::new().on(|_state: &mut Adder, _ctx, (x,): (i64,)| {
//!             hive_rt::payload!(x + 1)
//!         })
//!     }
//! }
//!
//! fn main() -> Result<(), hive_rt::Error> {
//!     let config = SystemConfig::new().set("middleman.network-backend", "disabled");
//!     let system = ActorSystem::new(config)?;
//!     let adder = system.spawn(Adder);
//!
//!     let mut scoped = system.scoped();
//!     let reply = scoped.request(&adder, hive_rt::payload!(41i64), Duration::from_secs(1))?;
//!     assert_eq!(reply.get::<i64>(0), Some(&42));
//!
//!     drop(scoped);
//!     system.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Three tightly coupled subsystems make up the core:
//!
//! 1. **Actor core** ([`actor`], [`message`], [`mailbox`]): identity,
//!    lifecycle, behavior dispatch, request/response correlation, linking
//!    and monitoring on top of a lock-free single-reader mailbox and
//!    copy-on-write payloads with runtime type identity ([`meta`]).
//! 2. **Execution** ([`scheduler`], [`time`]): a cooperative
//!    work-stealing pool multiplexes actors onto a few worker threads;
//!    blocking and detached actors get dedicated threads from a private
//!    pool; one clock thread drives every timeout.
//! 3. **Distribution** ([`net`]): a poll-loop reactor with a self-pipe,
//!    the BASP framed wire protocol, interned remote-actor proxies, and
//!    the middleman façade (`publish`/`connect`/`remote_actor`).
//!
//! Delivery over the default transport is at-most-once; ordering is
//! guaranteed per sender only.

pub mod actor;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod meta;
pub mod net;
pub mod prelude;
pub mod scheduler;
pub mod serial;
pub mod system;
pub mod time;
pub mod util;

pub use actor::{
    Actor, ActorContext, ActorRef, ActorWeak, Behavior, BlockingActor, BlockingContext,
    ScopedActor, SpawnOptions, Unmatched,
};
pub use error::{Error, ErrorCode, ExitReason};
pub use mailbox::EnqueueResult;
pub use message::{DownMsg, ExitMsg, MessageId, NodeDownMsg, Payload, PayloadBuilder};
pub use net::Middleman;
pub use system::{ActorSystem, ConfigValue, Settings, SystemConfig};
pub use time::Disposable;
pub use util::{ActorAddr, ActorId, NodeId};
