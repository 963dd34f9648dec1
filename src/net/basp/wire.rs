//! Frame construction and payload codecs for the BASP operations.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::BytesMut;

// Layer 3: Internal module imports
use super::header::{Header, FLAG_NAMED_RECEIVER, PROTOCOL_VERSION};
use super::message_type::MessageType;
use crate::error::{Error, ErrorCode, ExitReason};
use crate::message::{MessageId, Payload};
use crate::meta::MetaType;
use crate::serial::{BinaryDeserializer, BinarySerializer};
use crate::util::{ActorId, NodeId, ProcessId};

/// Upper bound on accepted payload lengths (64 MB); larger declarations
/// are treated as protocol violations.
pub(crate) const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// What a peer advertises about the actor published on a port.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedInfo {
    pub actor_id: ActorId,
    pub interfaces: Vec<String>,
}

/// Parsed handshake body (both directions share the layout; only servers
/// advertise a published actor).
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeInfo {
    pub node: NodeId,
    pub process: ProcessId,
    pub app_ids: Vec<String>,
    pub published: Option<PublishedInfo>,
}

/// Serialize `header` (with `payload_len` fixed up) followed by `body`.
fn frame(mut header: Header, body: &[u8]) -> Vec<u8> {
    header.payload_len = body.len() as u32;
    let mut out = BytesMut::with_capacity(super::header::HEADER_SIZE + body.len());
    header.encode(&mut out);
    out.extend_from_slice(body);
    out.to_vec()
}

/// Encode a direct message:
/// `(message-id u64, source u64, dest u64, [name], type-id list, values...)`.
pub(crate) fn encode_direct_message(
    mid: MessageId,
    source: ActorId,
    dest: ActorId,
    named_receiver: Option<&str>,
    payload: &Payload,
) -> Result<Vec<u8>, Error> {
    let mut body = BinarySerializer::new();
    body.write_u64(mid.raw());
    body.write_u64(source);
    body.write_u64(dest);
    if let Some(name) = named_receiver {
        body.write_str(name);
    }
    payload
        .save(&mut body)
        .map_err(|err| Error::with_context(ErrorCode::SaveCallbackFailed, err.to_string()))?;
    let mut header = Header::new(MessageType::DirectMessage);
    header.source_actor = source;
    header.dest_actor = dest;
    if named_receiver.is_some() {
        header.flags |= FLAG_NAMED_RECEIVER;
    }
    Ok(frame(header, body.as_slice()))
}

fn encode_handshake_body(
    node: NodeId,
    process: ProcessId,
    app_ids: &[String],
    published: Option<&PublishedInfo>,
) -> Vec<u8> {
    let mut body = BinarySerializer::new();
    body.write_raw(node.as_bytes());
    body.write_u32(process);
    body.write_varint(app_ids.len() as u64);
    for app_id in app_ids {
        body.write_str(app_id);
    }
    match published {
        Some(info) => {
            body.write_u8(1);
            body.write_u64(info.actor_id);
            body.write_varint(info.interfaces.len() as u64);
            for interface in &info.interfaces {
                body.write_str(interface);
            }
        }
        None => body.write_u8(0),
    }
    body.into_bytes()
}

/// Decode a handshake body written by either side.
pub(crate) fn decode_handshake_body(data: &[u8]) -> Result<HandshakeInfo, Error> {
    let mut source = BinaryDeserializer::new(data);
    let mut node = NodeId::ZERO;
    node.load(&mut source)?;
    let process = source.read_u32()?;
    let app_count = source.read_varint()?;
    if app_count > 64 {
        return Err(Error::with_context(
            ErrorCode::LoadCallbackFailed,
            "implausible app-id count",
        ));
    }
    let mut app_ids = Vec::with_capacity(app_count as usize);
    for _ in 0..app_count {
        app_ids.push(source.read_str()?);
    }
    let published = if source.read_u8()? != 0 {
        let actor_id = source.read_u64()?;
        let interface_count = source.read_varint()?;
        if interface_count > 256 {
            return Err(Error::with_context(
                ErrorCode::LoadCallbackFailed,
                "implausible interface count",
            ));
        }
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(source.read_str()?);
        }
        Some(PublishedInfo {
            actor_id,
            interfaces,
        })
    } else {
        None
    };
    Ok(HandshakeInfo {
        node,
        process,
        app_ids,
        published,
    })
}

/// The accepting side's opening frame.
pub(crate) fn encode_server_handshake(
    node: NodeId,
    process: ProcessId,
    app_ids: &[String],
    published: Option<&PublishedInfo>,
) -> Vec<u8> {
    let mut header = Header::new(MessageType::ServerHandshake);
    header.operation_data = PROTOCOL_VERSION;
    frame(header, &encode_handshake_body(node, process, app_ids, published))
}

/// The connecting side's answer.
pub(crate) fn encode_client_handshake(
    node: NodeId,
    process: ProcessId,
    app_ids: &[String],
) -> Vec<u8> {
    let mut header = Header::new(MessageType::ClientHandshake);
    header.operation_data = PROTOCOL_VERSION;
    frame(header, &encode_handshake_body(node, process, app_ids, None))
}

/// Idle keep-alive.
pub(crate) fn encode_heartbeat() -> Vec<u8> {
    frame(Header::new(MessageType::Heartbeat), &[])
}

/// Interest in exit notification for `actor_id` on the receiving node.
pub(crate) fn encode_announce_proxy(actor_id: ActorId) -> Vec<u8> {
    let mut header = Header::new(MessageType::AnnounceProxy);
    header.dest_actor = actor_id;
    frame(header, &[])
}

/// Exit notification for `actor_id` on the sending node.
pub(crate) fn encode_kill_proxy(actor_id: ActorId, reason: &ExitReason) -> Result<Vec<u8>, Error> {
    let mut body = BinarySerializer::new();
    reason.save(&mut body)?;
    let mut header = Header::new(MessageType::KillProxy);
    header.source_actor = actor_id;
    Ok(frame(header, body.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::basp::header::HEADER_SIZE;
    use crate::payload;

    #[test]
    fn direct_message_frame_roundtrip() {
        let mid = MessageId::make_request(11);
        let message = payload!(1i64, String::from("ping"));
        let bytes = encode_direct_message(mid, 5, 9, None, &message).unwrap();

        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.operation, MessageType::DirectMessage);
        assert_eq!(header.source_actor, 5);
        assert_eq!(header.dest_actor, 9);
        assert_eq!(header.payload_len as usize, bytes.len() - HEADER_SIZE);

        let mut source = BinaryDeserializer::new(&bytes[HEADER_SIZE..]);
        assert_eq!(source.read_u64().unwrap(), mid.raw());
        assert_eq!(source.read_u64().unwrap(), 5);
        assert_eq!(source.read_u64().unwrap(), 9);
        let restored = Payload::load(&mut source).unwrap();
        assert_eq!(restored, message);
    }

    #[test]
    fn handshake_roundtrip_with_published_actor() {
        let node = NodeId::random();
        let published = PublishedInfo {
            actor_id: 42,
            interfaces: vec!["math".to_string()],
        };
        let bytes = encode_server_handshake(
            node,
            7,
            &["hive-rt".to_string()],
            Some(&published),
        );
        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.operation, MessageType::ServerHandshake);
        assert_eq!(header.operation_data, PROTOCOL_VERSION);

        let info = decode_handshake_body(&bytes[HEADER_SIZE..]).unwrap();
        assert_eq!(info.node, node);
        assert_eq!(info.process, 7);
        assert_eq!(info.app_ids, vec!["hive-rt".to_string()]);
        assert_eq!(info.published, Some(published));
    }

    #[test]
    fn kill_proxy_carries_reason() {
        let reason = ExitReason::Abnormal(Error::new(ErrorCode::SocketDisconnected));
        let bytes = encode_kill_proxy(3, &reason).unwrap();
        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.operation, MessageType::KillProxy);
        assert_eq!(header.source_actor, 3);

        let mut source = BinaryDeserializer::new(&bytes[HEADER_SIZE..]);
        let mut restored = ExitReason::Normal;
        restored.load(&mut source).unwrap();
        assert_eq!(restored, reason);
    }
}
