//! The fixed 28-byte BASP frame header.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

// Layer 3: Internal module imports
use super::message_type::MessageType;
use crate::error::{Error, ErrorCode};

/// Serialized header size:
/// `(op u8, pad u8, pad u8, flags u8, payload_len u32, operation_data u64,
/// source_actor u64, dest_actor u64)`, all big-endian.
pub const HEADER_SIZE: usize = 32;

/// The destination is a well-known name (carried in the payload) rather
/// than a numeric actor id.
pub const FLAG_NAMED_RECEIVER: u8 = 0x01;

/// Version advertised and required in handshakes (`operation_data`).
pub const PROTOCOL_VERSION: u64 = 1;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub operation: MessageType,
    pub flags: u8,
    pub payload_len: u32,
    pub operation_data: u64,
    pub source_actor: u64,
    pub dest_actor: u64,
}

impl Header {
    /// A header for `operation` with everything else zeroed.
    pub fn new(operation: MessageType) -> Self {
        Self {
            operation,
            flags: 0,
            payload_len: 0,
            operation_data: 0,
            source_actor: 0,
            dest_actor: 0,
        }
    }

    /// Whether `flag` is set.
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Append the serialized header to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(HEADER_SIZE);
        out.put_u8(self.operation.as_u8());
        out.put_u8(0);
        out.put_u8(0);
        out.put_u8(self.flags);
        out.put_u32(self.payload_len);
        out.put_u64(self.operation_data);
        out.put_u64(self.source_actor);
        out.put_u64(self.dest_actor);
    }

    /// Decode a header from exactly [`HEADER_SIZE`] bytes. An unknown
    /// operation code is a protocol violation.
    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() < HEADER_SIZE {
            return Err(Error::with_context(
                ErrorCode::LoadCallbackFailed,
                "truncated BASP header",
            ));
        }
        let operation = MessageType::from_u8(raw[0]).ok_or_else(|| {
            Error::with_context(
                ErrorCode::InvalidArgument,
                format!("unknown BASP operation {}", raw[0]),
            )
        })?;
        Ok(Self {
            operation,
            flags: raw[3],
            payload_len: BigEndian::read_u32(&raw[4..8]),
            operation_data: BigEndian::read_u64(&raw[8..16]),
            source_actor: BigEndian::read_u64(&raw[16..24]),
            dest_actor: BigEndian::read_u64(&raw[24..32]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let header = Header {
            operation: MessageType::DirectMessage,
            flags: FLAG_NAMED_RECEIVER,
            payload_len: 512,
            operation_data: 7,
            source_actor: 42,
            dest_actor: 99,
        };
        let mut out = BytesMut::new();
        header.encode(&mut out);
        assert_eq!(out.len(), HEADER_SIZE);
        assert_eq!(Header::decode(&out).unwrap(), header);
    }

    #[test]
    fn big_endian_layout() {
        let mut header = Header::new(MessageType::Heartbeat);
        header.payload_len = 1;
        let mut out = BytesMut::new();
        header.encode(&mut out);
        assert_eq!(out[0], 6);
        assert_eq!(&out[4..8], &[0, 0, 0, 1]);
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let mut raw = [0u8; HEADER_SIZE];
        raw[0] = 200;
        let err = Header::decode(&raw).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
