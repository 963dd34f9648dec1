//! Blocking (thread-confined) actors.
//!
//! A blocking actor owns a dedicated thread from the private pool and
//! receives synchronously: `receive` parks on a mutex/condition-variable
//! pair until the mailbox has data. Messages that match no handler of the
//! requested behavior are moved to a stash and returned to the mailbox
//! head before the next receive.

// Layer 1: Standard library imports
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use super::behavior::Behavior;
use super::cell::{link, run_exit_hooks, unlink, AbstractActor, ActorCell, ActorRef, AttachToken, MonitorAttachable};
use super::context::{ActorContext, ControlOp};
use super::scheduled::{bounce_element, panic_to_reason, response_outcome};
use crate::error::{Error, ErrorCode, ExitReason};
use crate::mailbox::{EnqueueResult, MailboxElement};
use crate::message::payload::IntoPayload;
use crate::message::system::{ExitMsg, SysInfoReply, SysInfoRequest};
use crate::message::type_list::TypeIdList;
use crate::message::{MessageId, Payload};
use crate::payload;
use crate::system::actor_system::SystemCore;
use crate::util::ActorAddr;

/// User-facing trait for blocking actors.
///
/// `act` runs once on a dedicated thread; returning (or failing with an
/// error) terminates the actor. Use `?` on [`BlockingContext::receive`] so
/// kill signals unwind the body naturally.
pub trait BlockingActor: Sized + Send + 'static {
    /// The actor body.
    fn act(&mut self, ctx: &mut BlockingContext<Self>) -> Result<(), Error>;

    /// Diagnostic name used in logs.
    fn name(&self) -> &'static str {
        "user.blocking-actor"
    }

    /// Cleanup hook, invoked once during termination.
    fn on_exit(&mut self, _ctx: &mut BlockingContext<Self>) {}
}

/// Runtime host of one blocking actor: cell plus the mutex/condvar pair
/// producers use to wake a parked receive.
pub(crate) struct BlockingHost<S: BlockingActor> {
    cell: ActorCell,
    mtx: Mutex<()>,
    cv: Condvar,
    body: Mutex<Option<S>>,
}

impl<S: BlockingActor> BlockingHost<S> {
    pub(crate) fn new(
        addr: ActorAddr,
        body: S,
        system: Arc<SystemCore>,
    ) -> Arc<Self> {
        let name = body.name();
        Arc::new(Self {
            cell: ActorCell::new(addr, name, system),
            mtx: Mutex::new(()),
            cv: Condvar::new(),
            body: Mutex::new(Some(body)),
        })
    }

    /// Execute `act` to completion and run cleanup. Called on the private
    /// thread (or the caller thread, for scoped actors).
    pub(crate) fn run(this: &Arc<Self>) {
        let me = ActorRef::from_arc(Arc::clone(this) as Arc<dyn AbstractActor>);
        let Some(mut body) = this.body.lock().take() else {
            return;
        };
        let mut ctx = BlockingContext::new(Arc::clone(this), me);
        let outcome = catch_unwind(AssertUnwindSafe(|| body.act(&mut ctx)));
        let reason = match outcome {
            Ok(Ok(())) => ExitReason::Normal,
            Ok(Err(err)) => ExitReason::Abnormal(err),
            Err(panic) => panic_to_reason(panic),
        };
        this.finalize(&mut body, &mut ctx, reason);
    }

    pub(crate) fn finalize(
        &self,
        body: &mut S,
        ctx: &mut BlockingContext<S>,
        reason: ExitReason,
    ) {
        // A kill observed in `receive` already set the reason; first set
        // wins either way.
        self.cell.set_exit_reason(reason);
        let reason = self.cell.exit_reason().unwrap_or_default();
        debug!(
            target: "hive::actor",
            actor = %self.cell.addr(),
            name = self.cell.name(),
            %reason,
            "blocking actor terminating"
        );
        let _ = catch_unwind(AssertUnwindSafe(|| body.on_exit(ctx)));
        let bounce = reason.to_error();
        for element in ctx.stash.drain(..) {
            bounce_element(element, &bounce);
        }
        self.cell.mailbox().close(|element| bounce_element(element, &bounce));
        run_exit_hooks(&self.cell);
    }
}

impl<S: BlockingActor> AbstractActor for BlockingHost<S> {
    fn cell(&self) -> &ActorCell {
        &self.cell
    }

    fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        let result = self.cell.mailbox().enqueue(element);
        if result == EnqueueResult::UnblockedReader {
            let _guard = self.mtx.lock();
            self.cv.notify_one();
        }
        result
    }
}

enum Dispatched {
    /// A behavior handler consumed the message.
    Handled,
    /// The message went to the stash.
    Stashed,
    /// The runtime consumed the message (system default); keep waiting.
    Dropped,
}

/// Context for blocking actors: synchronous receive, stash discipline,
/// and synchronous request/response.
pub struct BlockingContext<S: BlockingActor> {
    host: Arc<BlockingHost<S>>,
    self_ref: ActorRef,
    pub(crate) stash: Vec<Box<MailboxElement>>,
}

impl<S: BlockingActor> BlockingContext<S> {
    pub(crate) fn new(host: Arc<BlockingHost<S>>, self_ref: ActorRef) -> Self {
        Self {
            host,
            self_ref,
            stash: Vec::new(),
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

    /// Send a one-way message to `target`.
    pub fn send(&self, target: &ActorRef, payload: impl IntoPayload) -> EnqueueResult {
        target.enqueue(MailboxElement::new(
            Some(self.self_ref.clone()),
            MessageId::ASYNC,
            payload.into_payload(),
        ))
    }

    /// Link with `peer` (mutual exit propagation).
    pub fn link_to(&self, peer: &ActorRef) {
        link(&self.self_ref, peer);
    }

    /// Remove a link with `peer`.
    pub fn unlink_from(&self, peer: &ActorRef) {
        unlink(&self.self_ref, peer);
    }

    /// Observe `peer` for termination.
    pub fn monitor(&self, peer: &ActorRef) {
        peer.cell().attach(Box::new(MonitorAttachable {
            observer: self.self_ref.downgrade(),
            observed: peer.addr(),
        }));
    }

    /// Stop observing `peer`.
    pub fn demonitor(&self, peer: &ActorRef) -> bool {
        peer.cell().detach(&AttachToken::Monitor(self.addr()))
    }

    /// Receive exactly one message matching `behavior`, blocking
    /// indefinitely (or until the behavior's own timeout fires, which runs
    /// its timeout handler and completes the receive).
    pub fn receive(&mut self, body: &mut S, behavior: Behavior<S>) -> Result<(), Error> {
        let timeout = behavior.timeout_after();
        self.receive_impl(body, behavior, timeout).map(|_| ())
    }

    /// Receive one message with an explicit deadline. `Ok(false)` means
    /// the timeout elapsed without a matching message.
    pub fn receive_for(
        &mut self,
        body: &mut S,
        behavior: Behavior<S>,
        timeout: Duration,
    ) -> Result<bool, Error> {
        self.receive_impl(body, behavior, Some(timeout))
    }

    fn receive_impl(
        &mut self,
        body: &mut S,
        mut behavior: Behavior<S>,
        timeout: Option<Duration>,
    ) -> Result<bool, Error> {
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if self.host.cell.is_terminated() {
                return Err(terminating_error());
            }
            match self.next_element(deadline)? {
                Some(element) => match self.dispatch(body, &mut behavior, element)? {
                    Dispatched::Handled => {
                        self.unstash();
                        return Ok(true);
                    }
                    Dispatched::Stashed | Dispatched::Dropped => continue,
                },
                None => {
                    // Deadline elapsed: the behavior's timeout handler (if
                    // any) still runs in an event context.
                    let mut ectx =
                        ActorContext::new(self.self_ref.clone(), None, MessageId::ASYNC);
                    behavior.run_timeout(body, &mut ectx);
                    self.apply_event_ops(&mut ectx)?;
                    self.unstash();
                    return Ok(false);
                }
            }
        }
    }

    /// Issue a request and wait synchronously for the matching response.
    /// Non-matching traffic is stashed and restored afterwards.
    pub fn request(
        &mut self,
        target: &ActorRef,
        payload: impl IntoPayload,
        timeout: Duration,
    ) -> Result<Payload, Error> {
        let number = self.host.cell.system().next_request_number();
        let mid = MessageId::make_request(number);
        let enqueued = target.enqueue(MailboxElement::new(
            Some(self.self_ref.clone()),
            mid,
            payload.into_payload(),
        ));
        if enqueued == EnqueueResult::QueueClosed {
            return Err(Error::with_context(
                ErrorCode::RequestReceiverDown,
                "receiver mailbox is closed",
            ));
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.host.cell.is_terminated() {
                return Err(terminating_error());
            }
            match self.next_element(Some(deadline))? {
                None => {
                    self.unstash();
                    return Err(Error::with_context(
                        ErrorCode::RequestTimeout,
                        format!("no response within {timeout:?}"),
                    ));
                }
                Some(element) => {
                    if element.mid.is_response() && element.mid.request_number() == number {
                        self.unstash();
                        return response_outcome(&element);
                    }
                    if let Some(element) = self.handle_system_default(element)? {
                        self.stash.push(element);
                    }
                }
            }
        }
    }

    /// Pop the next ordinary message raw, without behavior dispatch.
    pub fn receive_raw(&mut self, timeout: Duration) -> Result<Box<MailboxElement>, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.host.cell.is_terminated() {
                return Err(terminating_error());
            }
            match self.next_element(Some(deadline))? {
                None => {
                    return Err(Error::with_context(
                        ErrorCode::RequestTimeout,
                        "no message within deadline",
                    ))
                }
                Some(element) => {
                    if let Some(element) = self.handle_system_default(element)? {
                        return Ok(element);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn dispatch(
        &mut self,
        body: &mut S,
        behavior: &mut Behavior<S>,
        element: Box<MailboxElement>,
    ) -> Result<Dispatched, Error> {
        let signature: TypeIdList = element.payload.type_ids().iter().copied().collect();
        if let Some(handler) = behavior.find_handler(&signature) {
            let mut ectx = ActorContext::new(
                self.self_ref.clone(),
                element.sender.clone(),
                element.mid,
            );
            let result = handler(body, &mut ectx, &element.payload);
            self.apply_event_ops(&mut ectx)?;
            match result {
                Ok(reply) => {
                    if let (Some(reply), true) = (reply, element.mid.is_request()) {
                        if let Some(sender) = &element.sender {
                            let _ = sender.enqueue(MailboxElement::new(
                                Some(self.self_ref.clone()),
                                element.mid.response_id(),
                                reply,
                            ));
                        }
                    }
                    Ok(Dispatched::Handled)
                }
                Err(err) => {
                    if element.mid.is_request() {
                        if let Some(sender) = &element.sender {
                            let _ = sender.enqueue(MailboxElement::new(
                                None,
                                element.mid.response_id(),
                                payload!(err.clone()),
                            ));
                        }
                        Ok(Dispatched::Handled)
                    } else {
                        Err(err)
                    }
                }
            }
        } else {
            match self.handle_system_default(element)? {
                Some(element) => {
                    trace!(
                        target: "hive::actor",
                        actor = %self.addr(),
                        payload = %element.payload,
                        "stashing non-matching message"
                    );
                    self.stash.push(element);
                    Ok(Dispatched::Stashed)
                }
                None => Ok(Dispatched::Dropped),
            }
        }
    }

    /// Runtime defaults for system messages. Returns the element back when
    /// it is ordinary traffic the caller should stash.
    fn handle_system_default(
        &mut self,
        element: Box<MailboxElement>,
    ) -> Result<Option<Box<MailboxElement>>, Error> {
        if element.payload.len() == 1 {
            if let Some(msg) = element.payload.get::<ExitMsg>(0) {
                if msg.reason.is_kill() {
                    self.host.cell.set_exit_reason(ExitReason::Kill);
                    return Err(terminating_error());
                }
                if !msg.reason.is_normal() {
                    self.host.cell.set_exit_reason(msg.reason.clone());
                    return Err(terminating_error());
                }
                return Ok(None);
            }
            if element.payload.get::<SysInfoRequest>(0).is_some() {
                if element.mid.is_request() {
                    if let Some(sender) = &element.sender {
                        let reply = SysInfoReply {
                            addr: self.addr(),
                            name: self.host.cell.name().to_string(),
                        };
                        let _ = sender.enqueue(MailboxElement::new(
                            Some(self.self_ref.clone()),
                            element.mid.response_id(),
                            payload!(reply),
                        ));
                    }
                }
                return Ok(None);
            }
        }
        Ok(Some(element))
    }

    fn apply_event_ops(&mut self, ectx: &mut ActorContext<S>) -> Result<(), Error> {
        for op in ectx.take_ops() {
            match op {
                ControlOp::Quit(reason) => {
                    self.host.cell.set_exit_reason(reason);
                    return Err(terminating_error());
                }
                ControlOp::StashCurrent
                | ControlOp::PushBehavior(_)
                | ControlOp::ReplaceBehavior(_)
                | ControlOp::PopBehavior => {
                    warn!(
                        target: "hive::actor",
                        actor = %self.addr(),
                        "behavior-stack operations have no effect in blocking receive"
                    );
                }
                ControlOp::InstallMultiplexed { .. } | ControlOp::InstallAwaited { .. } => {
                    warn!(
                        target: "hive::actor",
                        actor = %self.addr(),
                        "asynchronous response handlers have no effect in blocking receive; \
                         use BlockingContext::request"
                    );
                }
            }
        }
        Ok(())
    }

    fn unstash(&mut self) {
        if !self.stash.is_empty() {
            let stashed = std::mem::take(&mut self.stash);
            self.host.cell.mailbox().prepend(stashed);
        }
    }

    /// Synchronized await: pop or park until data arrives or the deadline
    /// passes. `Ok(None)` signals a timeout.
    fn next_element(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Option<Box<MailboxElement>>, Error> {
        loop {
            if let Some(element) = self.host.cell.mailbox().pop() {
                return Ok(Some(element));
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
            }
            let mailbox = self.host.cell.mailbox();
            if !mailbox.can_fetch_more() && mailbox.try_block() {
                let mut guard = self.host.mtx.lock();
                while mailbox.blocked() {
                    match deadline {
                        Some(deadline) => {
                            if self.host.cv.wait_until(&mut guard, deadline).timed_out() {
                                // Unable to unblock means a producer raced
                                // in; drain it on the next loop.
                                if mailbox.try_unblock() {
                                    return Ok(None);
                                }
                                break;
                            }
                        }
                        None => self.host.cv.wait(&mut guard),
                    }
                }
            }
        }
    }
}

fn terminating_error() -> Error {
    Error::with_context(ErrorCode::RuntimeError, "actor is terminating")
}
