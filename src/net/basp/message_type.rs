//! BASP operation codes.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Dense 8-bit operation enum. Receivers treat unknown codes as a
/// protocol violation and close the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// First message of a connection, sent by the accepting side.
    ServerHandshake = 0,
    /// The connecting side's answer.
    ClientHandshake = 1,
    /// A message addressed to an actor on the receiving node.
    DirectMessage = 2,
    /// A message carrying explicit source/destination nodes.
    RoutedMessage = 3,
    /// The sender created a proxy for `dest_actor` and wants exit
    /// notification.
    AnnounceProxy = 4,
    /// `source_actor` on the sending node terminated; payload carries the
    /// exit reason.
    KillProxy = 5,
    /// Idle keep-alive.
    Heartbeat = 6,
}

impl MessageType {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        use MessageType::*;
        Some(match value {
            0 => ServerHandshake,
            1 => ClientHandshake,
            2 => DirectMessage,
            3 => RoutedMessage,
            4 => AnnounceProxy,
            5 => KillProxy,
            6 => Heartbeat,
            _ => return None,
        })
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::ServerHandshake => "server_handshake",
            MessageType::ClientHandshake => "client_handshake",
            MessageType::DirectMessage => "direct_message",
            MessageType::RoutedMessage => "routed_message",
            MessageType::AnnounceProxy => "announce_proxy",
            MessageType::KillProxy => "kill_proxy",
            MessageType::Heartbeat => "heartbeat",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_roundtrip() {
        for raw in 0u8..7 {
            let op = MessageType::from_u8(raw).unwrap();
            assert_eq!(op.as_u8(), raw);
        }
        assert_eq!(MessageType::from_u8(7), None);
        assert_eq!(MessageType::from_u8(255), None);
    }
}
