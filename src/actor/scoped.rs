//! Scoped actors: the blocking-actor machinery bound to the caller's
//! thread.
//!
//! A scoped actor gives non-actor code (tests, `main`, the middleman's
//! blocking façade) a mailbox, an address, and synchronous send/receive
//! without spawning a thread. Dropping the handle terminates the actor
//! and closes its mailbox.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::behavior::Behavior;
use super::blocking::{BlockingActor, BlockingContext, BlockingHost};
use super::cell::{AbstractActor, ActorRef};
use crate::error::{Error, ExitReason};
use crate::mailbox::MailboxElement;
use crate::message::payload::IntoPayload;
use crate::message::Payload;
use crate::system::actor_system::SystemCore;
use crate::util::ActorAddr;

/// Placeholder state for scoped actors; receive handlers close over test
/// locals instead of actor state.
#[derive(Default)]
pub struct ScopedBody;

impl BlockingActor for ScopedBody {
    fn act(&mut self, _ctx: &mut BlockingContext<Self>) -> Result<(), Error> {
        // Never driven; the owner thread calls receive directly.
        Ok(())
    }

    fn name(&self) -> &'static str {
        "user.scoped-actor"
    }
}

/// A synchronous actor handle for the current thread.
///
/// # Example
/// ```rust,ignore
/// let mut scoped = system.scoped();
/// scoped.send(&worker, payload!(1i64));
/// let reply = scoped.request(&worker, payload!("job".to_string()),
///                            Duration::from_secs(1))?;
/// ```
pub struct ScopedActor {
    host: Arc<BlockingHost<ScopedBody>>,
    ctx: BlockingContext<ScopedBody>,
    body: ScopedBody,
}

impl ScopedActor {
    pub(crate) fn new(system: &Arc<SystemCore>) -> Self {
        let addr = system.next_addr();
        let host = BlockingHost::new(addr, ScopedBody, Arc::clone(system));
        let me = ActorRef::from_arc(Arc::clone(&host) as Arc<dyn AbstractActor>);
        SystemCore::register_scoped(system, &me);
        let ctx = BlockingContext::new(Arc::clone(&host), me);
        Self {
            host,
            ctx,
            body: ScopedBody,
        }
    }

    /// A strong reference to this scoped actor.
    pub fn self_ref(&self) -> &ActorRef {
        self.ctx.self_ref()
    }

    /// This scoped actor's address.
    pub fn addr(&self) -> ActorAddr {
        self.ctx.addr()
    }

    /// Send a one-way message with this actor as sender.
    pub fn send(&self, target: &ActorRef, payload: impl IntoPayload) {
        let _ = self.ctx.send(target, payload);
    }

    /// Issue a request and wait for the response.
    pub fn request(
        &mut self,
        target: &ActorRef,
        payload: impl IntoPayload,
        timeout: Duration,
    ) -> Result<Payload, Error> {
        self.ctx.request(target, payload, timeout)
    }

    /// Receive one message matching `behavior`; `Ok(false)` on timeout.
    pub fn receive_for(
        &mut self,
        behavior: Behavior<ScopedBody>,
        timeout: Duration,
    ) -> Result<bool, Error> {
        self.ctx.receive_for(&mut self.body, behavior, timeout)
    }

    /// Pop the next ordinary message without dispatch.
    pub fn receive_raw(&mut self, timeout: Duration) -> Result<Box<MailboxElement>, Error> {
        self.ctx.receive_raw(timeout)
    }

    /// Link this scoped actor with `peer`.
    pub fn link_to(&self, peer: &ActorRef) {
        self.ctx.link_to(peer);
    }

    /// Observe `peer` for termination.
    pub fn monitor(&self, peer: &ActorRef) {
        self.ctx.monitor(peer);
    }
}

impl Drop for ScopedActor {
    fn drop(&mut self) {
        self.host
            .finalize(&mut self.body, &mut self.ctx, ExitReason::Normal);
    }
}
