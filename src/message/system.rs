//! System messages delivered by the runtime itself.
//!
//! These ride in ordinary payloads but are categorized ahead of user
//! dispatch: exit and down notifications, node-down notifications, receive
//! timeouts, and the self-info request/reply pair.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::error::{Error, ExitReason};
use crate::meta::MetaType;
use crate::serial::{BinaryDeserializer, BinarySerializer};
use crate::util::{ActorAddr, NodeId};

/// Sent to linked actors when a peer terminates, and to an actor itself to
/// request its termination (`Kill` is unconditional).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitMsg {
    /// The terminating (or terminating-requesting) actor.
    pub source: ActorAddr,
    /// Why the source terminated.
    pub reason: ExitReason,
}

impl MetaType for ExitMsg {
    const NAME: &'static str = "exit-msg";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        self.source.save(sink)?;
        self.reason.save(sink)
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        self.source.load(source)?;
        self.reason.load(source)
    }
}

/// Sent to monitoring actors when an observed actor terminates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownMsg {
    /// The terminated actor.
    pub source: ActorAddr,
    /// Its exit reason.
    pub reason: ExitReason,
}

impl MetaType for DownMsg {
    const NAME: &'static str = "down-msg";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        self.source.save(sink)?;
        self.reason.save(sink)
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        self.source.load(source)?;
        self.reason.load(source)
    }
}

/// Sent to node observers when the connection to a peer runtime is lost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDownMsg {
    /// The unreachable node.
    pub node: NodeId,
    /// Why the node became unreachable.
    pub reason: ExitReason,
}

impl MetaType for NodeDownMsg {
    const NAME: &'static str = "node-down-msg";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        self.node.save(sink)?;
        self.reason.save(sink)
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        self.node.load(source)?;
        self.reason.load(source)
    }
}

/// Internal one-shot tick delivered when a behavior's receive timeout
/// elapses. Carries a generation counter so a stale tick (scheduled for a
/// behavior that has since changed) is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceiveTimeoutMsg {
    /// Timeout generation this tick was scheduled for.
    pub generation: u64,
}

impl MetaType for ReceiveTimeoutMsg {
    const NAME: &'static str = "receive-timeout-msg";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        sink.write_u64(self.generation);
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        self.generation = source.read_u64()?;
        Ok(())
    }
}

/// Ask any actor for its self-description; answered by the runtime without
/// touching user behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SysInfoRequest;

impl MetaType for SysInfoRequest {
    const NAME: &'static str = "sys-info-request";

    fn save(&self, _sink: &mut BinarySerializer) -> Result<(), Error> {
        Ok(())
    }

    fn load(&mut self, _source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        Ok(())
    }
}

/// Reply to [`SysInfoRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysInfoReply {
    /// The answering actor's address.
    pub addr: ActorAddr,
    /// The answering actor's diagnostic name.
    pub name: String,
}

impl MetaType for SysInfoReply {
    const NAME: &'static str = "sys-info-reply";

    fn save(&self, sink: &mut BinarySerializer) -> Result<(), Error> {
        self.addr.save(sink)?;
        sink.write_str(&self.name);
        Ok(())
    }

    fn load(&mut self, source: &mut BinaryDeserializer<'_>) -> Result<(), Error> {
        self.addr.load(source)?;
        self.name = source.read_str()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::payload;

    #[test]
    fn exit_msg_rides_in_payloads() {
        let msg = ExitMsg {
            source: ActorAddr::new(NodeId::random(), 1, 42),
            reason: ExitReason::Abnormal(Error::new(ErrorCode::RuntimeError)),
        };
        let p = payload!(msg.clone());
        assert_eq!(p.get::<ExitMsg>(0), Some(&msg));
    }

    #[test]
    fn down_msg_wire_roundtrip() {
        let original = DownMsg {
            source: ActorAddr::new(NodeId::random(), 7, 9),
            reason: ExitReason::Normal,
        };
        let mut sink = BinarySerializer::new();
        original.save(&mut sink).unwrap();
        let bytes = sink.into_bytes();
        let mut src = BinaryDeserializer::new(&bytes);
        let mut restored = DownMsg::default();
        restored.load(&mut src).unwrap();
        assert_eq!(original, restored);
    }
}
