//! The per-message actor context.
//!
//! Handlers receive a context alongside the actor state. Sends and
//! requests take effect immediately; control operations that would mutate
//! the running actor re-entrantly (behavior changes, quitting, response
//! handler installation, stashing) are collected on the context and
//! applied by the resume loop after the handler returns.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::behavior::Behavior;
use super::cell::{link, unlink, ActorRef, AttachToken, MonitorAttachable};
use crate::error::{Error, ExitReason};
use crate::mailbox::{EnqueueResult, MailboxElement};
use crate::message::payload::IntoPayload;
use crate::message::{MessageId, Payload};
use crate::time::Disposable;
use crate::util::{ActorAddr, NodeId};

/// One-shot handler for a response (or its timeout/receiver-down error).
pub(crate) type ResponseHandler<S> =
    Box<dyn FnOnce(&mut S, &mut ActorContext<S>, Result<Payload, Error>) + Send>;

/// Deferred control operation recorded by a handler.
pub(crate) enum ControlOp<S> {
    PushBehavior(Behavior<S>),
    ReplaceBehavior(Behavior<S>),
    PopBehavior,
    Quit(ExitReason),
    StashCurrent,
    InstallMultiplexed {
        request: u64,
        handler: ResponseHandler<S>,
        timeout: Option<Disposable>,
    },
    InstallAwaited {
        request: u64,
        handler: ResponseHandler<S>,
        timeout: Option<Disposable>,
    },
}

/// Handle for an outstanding request issued via [`ActorContext::request`].
///
/// Owns the timeout token; installing a response handler transfers the
/// token so the runtime can cancel the timeout when the response arrives
/// first.
pub struct RequestId {
    pub(crate) number: u64,
    pub(crate) timeout: Option<Disposable>,
}

impl RequestId {
    /// The raw request counter value.
    pub fn number(&self) -> u64 {
        self.number
    }
}

/// Context handed to every behavior handler and lifecycle hook.
pub struct ActorContext<S> {
    self_ref: ActorRef,
    sender: Option<ActorRef>,
    mid: MessageId,
    pub(crate) ops: Vec<ControlOp<S>>,
}

impl<S: 'static> ActorContext<S> {
    pub(crate) fn new(self_ref: ActorRef, sender: Option<ActorRef>, mid: MessageId) -> Self {
        Self {
            self_ref,
            sender,
            mid,
            ops: Vec::new(),
        }
    }

    /// A strong reference to the running actor.
    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    /// The running actor's address.
    pub fn addr(&self) -> ActorAddr {
        self.self_ref.addr()
    }

    /// The local node id.
    pub fn node(&self) -> NodeId {
        self.self_ref.cell().system().node()
    }

    /// The sender of the current message, when known.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// The id of the current message.
    pub fn message_id(&self) -> MessageId {
        self.mid
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Send a one-way message to `target`.
    pub fn send(&self, target: &ActorRef, payload: impl IntoPayload) -> EnqueueResult {
        target.enqueue(MailboxElement::new(
            Some(self.self_ref.clone()),
            MessageId::ASYNC,
            payload.into_payload(),
        ))
    }

    /// Send a one-way message on the urgent lane.
    pub fn send_urgent(&self, target: &ActorRef, payload: impl IntoPayload) -> EnqueueResult {
        target.enqueue(MailboxElement::new(
            Some(self.self_ref.clone()),
            MessageId::ASYNC.with_urgent_priority(),
            payload.into_payload(),
        ))
    }

    /// Deliver `payload` to `target` after `delay`.
    pub fn delayed_send(
        &self,
        delay: Duration,
        target: &ActorRef,
        payload: impl IntoPayload,
    ) -> Disposable {
        let sender = self.self_ref.clone();
        let target = target.downgrade();
        let payload = payload.into_payload();
        self.self_ref
            .cell()
            .system()
            .clock()
            .schedule_in(delay, move || {
                if let Some(target) = target.upgrade() {
                    let _ = target.enqueue(MailboxElement::new(
                        Some(sender),
                        MessageId::ASYNC,
                        payload,
                    ));
                }
            })
    }

    /// Issue a request to `target`. Install a handler for the reply with
    /// [`on_response`](Self::on_response) (any-order) or
    /// [`await_response`](Self::await_response) (serialized).
    ///
    /// With a timeout, the runtime delivers a synthetic
    /// `request_timeout` error response when no reply arrives in time; the
    /// remote side may still complete the work.
    pub fn request(
        &self,
        target: &ActorRef,
        payload: impl IntoPayload,
        timeout: Option<Duration>,
    ) -> RequestId {
        let system = self.self_ref.cell().system();
        let number = system.next_request_number();
        let mid = MessageId::make_request(number);
        let enqueued = target.enqueue(MailboxElement::new(
            Some(self.self_ref.clone()),
            mid,
            payload.into_payload(),
        ));
        if enqueued == EnqueueResult::QueueClosed {
            // Dead receiver: synthesize the error response right away.
            let err = Error::with_context(
                crate::error::ErrorCode::RequestReceiverDown,
                "receiver mailbox is closed",
            );
            let _ = self.self_ref.enqueue(MailboxElement::new(
                None,
                mid.response_id(),
                crate::payload!(err),
            ));
            return RequestId {
                number,
                timeout: None,
            };
        }
        let timeout = timeout.map(|after| {
            let me = self.self_ref.downgrade();
            system.clock().schedule_in(after, move || {
                if let Some(me) = me.upgrade() {
                    let err = Error::with_context(
                        crate::error::ErrorCode::RequestTimeout,
                        format!("request {number} timed out after {after:?}"),
                    );
                    let _ = me.enqueue(MailboxElement::new(
                        None,
                        mid.response_id(),
                        crate::payload!(err),
                    ));
                }
            })
        });
        RequestId { number, timeout }
    }

    /// Install a multiplexed response handler: replies may arrive in any
    /// order relative to other requests.
    pub fn on_response<F>(&mut self, request: RequestId, handler: F)
    where
        F: FnOnce(&mut S, &mut ActorContext<S>, Result<Payload, Error>) + Send + 'static,
    {
        self.ops.push(ControlOp::InstallMultiplexed {
            request: request.number,
            handler: Box::new(handler),
            timeout: request.timeout,
        });
    }

    /// Install an awaited response handler: ordinary messages are stashed
    /// until this reply (and earlier awaited replies) arrived.
    pub fn await_response<F>(&mut self, request: RequestId, handler: F)
    where
        F: FnOnce(&mut S, &mut ActorContext<S>, Result<Payload, Error>) + Send + 'static,
    {
        self.ops.push(ControlOp::InstallAwaited {
            request: request.number,
            handler: Box::new(handler),
            timeout: request.timeout,
        });
    }

    // ------------------------------------------------------------------
    // Behavior stack
    // ------------------------------------------------------------------

    /// Push a new behavior on top of the stack (become, keeping the old
    /// behavior underneath).
    pub fn push_behavior(&mut self, behavior: Behavior<S>) {
        self.ops.push(ControlOp::PushBehavior(behavior));
    }

    /// Replace the top of the behavior stack (become).
    pub fn replace_behavior(&mut self, behavior: Behavior<S>) {
        self.ops.push(ControlOp::ReplaceBehavior(behavior));
    }

    /// Pop the top behavior (unbecome). Popping the last behavior
    /// terminates the actor after the current message.
    pub fn pop_behavior(&mut self) {
        self.ops.push(ControlOp::PopBehavior);
    }

    /// Terminate after the current message with `reason`.
    pub fn quit(&mut self, reason: ExitReason) {
        self.ops.push(ControlOp::Quit(reason));
    }

    /// Terminate normally after the current message.
    pub fn quit_normal(&mut self) {
        self.quit(ExitReason::Normal);
    }

    /// Return the current message to the stash; it is retried on the next
    /// behavior change.
    pub fn stash_current(&mut self) {
        self.ops.push(ControlOp::StashCurrent);
    }

    // ------------------------------------------------------------------
    // Links and monitors
    // ------------------------------------------------------------------

    /// Link the running actor with `peer` (mutual exit propagation).
    pub fn link_to(&self, peer: &ActorRef) {
        link(&self.self_ref, peer);
    }

    /// Remove a link with `peer`.
    pub fn unlink_from(&self, peer: &ActorRef) {
        unlink(&self.self_ref, peer);
    }

    /// Observe `peer`: a [`DownMsg`](crate::message::DownMsg) arrives when
    /// it terminates. Fires immediately when `peer` is already dead.
    pub fn monitor(&self, peer: &ActorRef) {
        peer.cell().attach(Box::new(MonitorAttachable {
            observer: self.self_ref.downgrade(),
            observed: peer.addr(),
        }));
    }

    /// Stop observing `peer`. Returns `false` when no monitor was found.
    pub fn demonitor(&self, peer: &ActorRef) -> bool {
        peer.cell().detach(&AttachToken::Monitor(self.addr()))
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Spawn a new cooperative actor into the same system.
    pub fn spawn<A: super::scheduled::Actor>(&self, actor: A) -> ActorRef {
        crate::system::actor_system::SystemCore::spawn_scheduled(
            self.self_ref.cell().system(),
            actor,
            super::scheduled::SpawnOptions::default(),
        )
    }

    pub(crate) fn take_ops(&mut self) -> Vec<ControlOp<S>> {
        std::mem::take(&mut self.ops)
    }
}
