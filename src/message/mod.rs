//! Message identity and payloads.
//!
//! A message is a [`MessageId`] plus a [`Payload`]: the id carries the
//! async/request/response category, the priority bit, and the request
//! counter used for correlation; the payload is an immutable, ref-counted,
//! copy-on-write tuple of runtime-typed values.

pub mod id;
pub mod payload;
pub mod system;
pub mod type_list;

pub use id::MessageId;
pub use payload::{FromPayload, IntoPayload, Payload, PayloadBuilder};
pub use system::{DownMsg, ExitMsg, NodeDownMsg, SysInfoReply, SysInfoRequest};
pub use type_list::TypeIdList;
