//! Intrusive mailbox nodes.

// Layer 1: Standard library imports
use std::ptr;
use std::time::Instant;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::actor::cell::ActorRef;
use crate::message::{MessageId, Payload};

/// One unit of mailbox traffic: sender, message id, payload, plus the
/// intrusive `next` pointer owned by the queue between enqueue and pop.
pub struct MailboxElement {
    /// The sending actor, when known. Required for replies.
    pub sender: Option<ActorRef>,
    /// Message identity (category, priority, request counter).
    pub mid: MessageId,
    /// The message content.
    pub payload: Payload,
    /// Enqueue timestamp for queue-time diagnostics.
    pub(crate) enqueued_at: Instant,
    /// Intrusive link; owned by the queue while the element is stacked.
    pub(crate) next: *mut MailboxElement,
}

// The raw `next` pointer is only traversed by the queue under its own
// protocol; the payload and sender are themselves Send.
unsafe impl Send for MailboxElement {}

impl MailboxElement {
    /// Allocate a new element ready for enqueueing.
    pub fn new(sender: Option<ActorRef>, mid: MessageId, payload: Payload) -> Box<Self> {
        Box::new(Self {
            sender,
            mid,
            payload,
            enqueued_at: Instant::now(),
            next: ptr::null_mut(),
        })
    }

    /// How long ago this element was enqueued.
    pub fn queued_for(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}
