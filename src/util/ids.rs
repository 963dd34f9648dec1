//! Identity types for actors and runtime nodes.
//!
//! An actor is addressed by the immutable triple `(node, process, actor)`:
//! the node identifies a host-level runtime instance, the process id
//! distinguishes multiple runtimes on one host, and the actor id is assigned
//! monotonically per process. An address never resolves to more than one
//! actor over its lifetime.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Monotonically assigned per-process actor identifier.
///
/// Id `0` is reserved as the invalid/anonymous actor id and never assigned.
pub type ActorId = u64;

/// Distinguishes multiple runtime instances on a single host.
pub type ProcessId = u32;

/// Opaque identifier for a runtime node.
///
/// # Identity
///
/// A fresh node id is generated per runtime instance (UUID v4 backing), so
/// two runtimes never collide even when started on the same host in the same
/// second. Deployments that need a stable identity across restarts can seed
/// one from hex via [`NodeId::from_hex`].
///
/// # Example
/// ```rust
/// use hive_rt::util::NodeId;
///
/// let a = NodeId::random();
/// let b = NodeId::random();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    bytes: [u8; 16],
}

impl NodeId {
    /// Number of bytes in serialized form.
    pub const LENGTH: usize = 16;

    /// The all-zero id, used as the "no node" placeholder in default
    /// addresses. Never assigned to a live runtime.
    pub const ZERO: NodeId = NodeId { bytes: [0u8; 16] };

    /// Generate a fresh random node id.
    pub fn random() -> Self {
        Self {
            bytes: *Uuid::new_v4().as_bytes(),
        }
    }

    /// Create a node id from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    /// Parse a node id from a 32-character hex string.
    pub fn from_hex(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.len() != 32 || !input.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in input.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self { bytes })
    }

    /// Raw byte view, e.g. for wire encoding.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// Whether this is the "no node" placeholder.
    pub fn is_zero(&self) -> bool {
        self.bytes == [0u8; 16]
    }
}

impl Default for NodeId {
    /// The "no node" placeholder.
    fn default() -> Self {
        NodeId::ZERO
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.bytes {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Immutable `(node, process, actor)` address triple.
///
/// Equality and ordering are lexicographic over the three components, which
/// makes addresses usable as map keys across the whole runtime (mailbox
/// senders, link sets, proxy interning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorAddr {
    node: NodeId,
    process: ProcessId,
    actor: ActorId,
}

impl ActorAddr {
    /// Create an address from its components.
    pub fn new(node: NodeId, process: ProcessId, actor: ActorId) -> Self {
        Self {
            node,
            process,
            actor,
        }
    }

    /// The owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The owning process within the node.
    pub fn process(&self) -> ProcessId {
        self.process
    }

    /// The per-process actor id.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Whether this is the invalid placeholder address.
    pub fn is_invalid(&self) -> bool {
        self.actor == 0
    }
}

impl Default for ActorAddr {
    /// The invalid address: zero node, zero process, actor id 0.
    fn default() -> Self {
        Self {
            node: NodeId::ZERO,
            process: 0,
            actor: 0,
        }
    }
}

impl Display for ActorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.node, self.process, self.actor)
    }
}
