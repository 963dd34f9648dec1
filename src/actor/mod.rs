//! The actor core: control blocks, behaviors, contexts, and the
//! cooperative/blocking actor bodies.

pub mod behavior;
pub mod blocking;
pub mod cell;
pub mod context;
pub mod scheduled;
pub mod scoped;

pub use behavior::{Behavior, IntoReply};
pub use blocking::{BlockingActor, BlockingContext};
pub use cell::{link, unlink, ActorCell, ActorRef, ActorWeak, AttachToken, Attachable, FnAttachable};
pub use context::{ActorContext, RequestId};
pub use scheduled::{Actor, SpawnOptions, Unmatched};
pub use scoped::{ScopedActor, ScopedBody};
