//! Cooperative (scheduled) actors.
//!
//! A scheduled actor multiplexes onto the worker pool: producers enqueue,
//! and whichever thread flips the mailbox from blocked to ready schedules
//! the actor for a `resume` slice. Within a slice the actor pops up to
//! `max_throughput` elements, categorizes each (exit/down/node-down
//! signals, receive-timeout ticks, responses, ordinary messages), and
//! feeds ordinary traffic through the behavior stack.
//!
//! Panics in user code are caught at the message boundary and converted
//! into the actor's exit reason, the moral equivalent of an exception
//! handler at a scheduler boundary.

// Layer 1: Standard library imports
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use super::behavior::Behavior;
use super::cell::{run_exit_hooks, AbstractActor, ActorCell, ActorRef};
use super::context::{ActorContext, ControlOp, ResponseHandler};
use crate::error::{Error, ErrorCode, ExitReason};
use crate::mailbox::{EnqueueResult, MailboxElement};
use crate::message::system::{
    DownMsg, ExitMsg, NodeDownMsg, ReceiveTimeoutMsg, SysInfoReply, SysInfoRequest,
};
use crate::message::type_list::TypeIdList;
use crate::message::{MessageId, Payload};
use crate::payload;
use crate::scheduler::{Resumable, ResumeResult};
use crate::system::actor_system::SystemCore;
use crate::time::Disposable;
use crate::util::ActorAddr;

/// Decision of the default handler for unmatched ordinary messages.
#[derive(Debug)]
pub enum Unmatched {
    /// Return the message to the stash; it is retried on the next
    /// behavior change.
    Skip,
    /// Discard the message. Requests receive an `unexpected_message`
    /// error response.
    Drop,
    /// Answer with the given payload (requests only).
    Reply(Payload),
    /// Fail: requests receive the error as response, one-way messages
    /// terminate the actor with it.
    Fail(Error),
}

/// User-facing trait for cooperative actors.
///
/// # Example
/// ```rust,ignore
/// struct Adder;
///
/// impl Actor for Adder {
///     fn make_behavior(&mut self, _ctx: &mut ActorContext<Self>) -> Behavior<Self> {
///         Behavior::new().on(|_state: &mut Adder, _ctx, (x,): (i64,)| {
///             hive_rt::payload!(x + 1)
///         })
///     }
/// }
/// ```
pub trait Actor: Sized + Send + 'static {
    /// Produce the initial behavior. Returning an empty behavior (and
    /// issuing no requests) terminates the actor immediately.
    fn make_behavior(&mut self, ctx: &mut ActorContext<Self>) -> Behavior<Self>;

    /// Diagnostic name used in logs.
    fn name(&self) -> &'static str {
        "user.actor"
    }

    /// Hook for exit signals from linked actors. Kill signals never reach
    /// this hook. The default propagates abnormal exits.
    fn on_exit_msg(&mut self, ctx: &mut ActorContext<Self>, msg: ExitMsg) {
        if !msg.reason.is_normal() {
            ctx.quit(msg.reason);
        }
    }

    /// Hook for down notifications from monitored actors.
    fn on_down_msg(&mut self, _ctx: &mut ActorContext<Self>, _msg: DownMsg) {}

    /// Hook for node-down notifications.
    fn on_node_down(&mut self, _ctx: &mut ActorContext<Self>, _msg: NodeDownMsg) {}

    /// Hook for one-way error messages. The default terminates with the
    /// error as exit reason.
    fn on_error(&mut self, ctx: &mut ActorContext<Self>, err: Error) {
        ctx.quit(ExitReason::Abnormal(err));
    }

    /// Default handler for ordinary messages no behavior matched.
    fn unmatched(&mut self, _ctx: &mut ActorContext<Self>, _payload: &Payload) -> Unmatched {
        Unmatched::Drop
    }

    /// Cleanup hook, invoked once during termination.
    fn on_exit(&mut self, _ctx: &mut ActorContext<Self>) {}
}

/// Options for spawning cooperative actors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Run on a dedicated thread from the private pool instead of the
    /// worker pool.
    pub detached: bool,
    /// Defer initialization until the first message arrives.
    pub lazy_init: bool,
}

impl SpawnOptions {
    /// Default options: pooled, eager init.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a dedicated thread.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Defer init until the first message.
    pub fn lazy(mut self) -> Self {
        self.lazy_init = true;
        self
    }
}

/// Wakeup signal for detached actors parked on their mailbox.
pub(crate) struct ThreadSignal {
    mtx: Mutex<()>,
    cv: Condvar,
}

impl ThreadSignal {
    fn new() -> Self {
        Self {
            mtx: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn notify(&self) {
        let _guard = self.mtx.lock();
        self.cv.notify_one();
    }
}

struct PendingResponse<S: Actor> {
    request: u64,
    handler: ResponseHandler<S>,
    timeout: Option<Disposable>,
}

struct RunState<S: Actor> {
    body: S,
    behaviors: Vec<Behavior<S>>,
    awaited: VecDeque<PendingResponse<S>>,
    multiplexed: HashMap<u64, PendingResponse<S>>,
    stash: Vec<Box<MailboxElement>>,
    initialized: bool,
    timeout_gen: u64,
    timeout_token: Option<Disposable>,
}

struct OpsOutcome {
    quit: Option<ExitReason>,
    behavior_changed: bool,
    stash_current: bool,
}

/// The runtime host of one cooperative actor.
pub(crate) struct ScheduledActor<S: Actor> {
    cell: ActorCell,
    state: Mutex<RunState<S>>,
    self_weak: Weak<ScheduledActor<S>>,
    signal: Option<ThreadSignal>,
}

impl<S: Actor> ScheduledActor<S> {
    pub(crate) fn new(
        addr: ActorAddr,
        body: S,
        system: Arc<SystemCore>,
        options: &SpawnOptions,
    ) -> Arc<Self> {
        let name = body.name();
        Arc::new_cyclic(|weak| Self {
            cell: ActorCell::new(addr, name, system),
            state: Mutex::new(RunState {
                body,
                behaviors: Vec::new(),
                awaited: VecDeque::new(),
                multiplexed: HashMap::new(),
                stash: Vec::new(),
                initialized: false,
                timeout_gen: 0,
                timeout_token: None,
            }),
            self_weak: weak.clone(),
            signal: options.detached.then(ThreadSignal::new),
        })
    }

    /// Loop driver for detached actors, run on a private thread.
    pub(crate) fn detached_loop(self: Arc<Self>) {
        loop {
            match Arc::clone(&self).resume(usize::MAX) {
                ResumeResult::Done => return,
                ResumeResult::ResumeLater => continue,
                ResumeResult::AwaitMessage => {
                    if let Some(signal) = &self.signal {
                        let mut guard = signal.mtx.lock();
                        while self.cell.mailbox().blocked() {
                            signal.cv.wait(&mut guard);
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Initialization and the consume loop
    // ------------------------------------------------------------------

    fn initialize(&self, me: &ActorRef, st: &mut RunState<S>) -> Option<ResumeResult> {
        st.initialized = true;
        trace!(target: "hive::actor", actor = %self.cell.addr(), name = self.cell.name(), "initializing");
        let mut ctx = ActorContext::new(me.clone(), None, MessageId::ASYNC);
        let made = {
            let body = &mut st.body;
            catch_unwind(AssertUnwindSafe(|| body.make_behavior(&mut ctx)))
        };
        match made {
            Ok(behavior) => {
                if !behavior.is_empty() {
                    st.behaviors.push(behavior);
                }
                let outcome = self.apply_ops(st, ctx.take_ops());
                self.arm_timeout(st);
                if let Some(reason) = outcome.quit {
                    self.finalize(me, st, reason);
                    return Some(ResumeResult::Done);
                }
                if self.fully_idle(st) {
                    self.finalize(me, st, ExitReason::Normal);
                    return Some(ResumeResult::Done);
                }
                None
            }
            Err(panic) => {
                self.finalize(me, st, panic_to_reason(panic));
                Some(ResumeResult::Done)
            }
        }
    }

    fn fully_idle(&self, st: &RunState<S>) -> bool {
        st.behaviors.is_empty() && st.awaited.is_empty() && st.multiplexed.is_empty()
    }

    fn consume(
        &self,
        me: &ActorRef,
        st: &mut RunState<S>,
        element: Box<MailboxElement>,
    ) -> Option<ExitReason> {
        // Categorize: runtime messages first, user dispatch last.
        if element.payload.len() == 1 {
            if let Some(msg) = element.payload.get::<ExitMsg>(0) {
                if msg.reason.is_kill() {
                    return Some(ExitReason::Kill);
                }
                let msg = msg.clone();
                return self.run_hook(me, st, move |body, ctx| body.on_exit_msg(ctx, msg));
            }
            if let Some(msg) = element.payload.get::<DownMsg>(0) {
                let msg = msg.clone();
                return self.run_hook(me, st, move |body, ctx| body.on_down_msg(ctx, msg));
            }
            if let Some(msg) = element.payload.get::<NodeDownMsg>(0) {
                let msg = msg.clone();
                return self.run_hook(me, st, move |body, ctx| body.on_node_down(ctx, msg));
            }
            if let Some(tick) = element.payload.get::<ReceiveTimeoutMsg>(0) {
                if tick.generation == st.timeout_gen {
                    return self.run_receive_timeout(me, st);
                }
                return None;
            }
            if element.payload.get::<SysInfoRequest>(0).is_some() {
                let reply = SysInfoReply {
                    addr: self.cell.addr(),
                    name: self.cell.name().to_string(),
                };
                self.deliver_reply(me, &element, Some(payload!(reply)));
                return None;
            }
            if element.mid.is_async() {
                if let Some(err) = element.payload.get::<Error>(0) {
                    let err = err.clone();
                    return self.run_hook(me, st, move |body, ctx| body.on_error(ctx, err));
                }
            }
        }
        if element.mid.is_response() {
            return self.consume_response(me, st, element);
        }
        // Awaited responses short-circuit: ordinary traffic waits.
        if !st.awaited.is_empty() {
            st.stash.push(element);
            return None;
        }
        self.consume_ordinary(me, st, element)
    }

    fn consume_ordinary(
        &self,
        me: &ActorRef,
        st: &mut RunState<S>,
        element: Box<MailboxElement>,
    ) -> Option<ExitReason> {
        let signature: TypeIdList = element.payload.type_ids().iter().copied().collect();
        let dispatched = {
            let RunState {
                body, behaviors, ..
            } = &mut *st;
            match behaviors.last_mut().and_then(|top| top.find_handler(&signature)) {
                Some(handler) => {
                    let mut ctx =
                        ActorContext::new(me.clone(), element.sender.clone(), element.mid);
                    let run =
                        catch_unwind(AssertUnwindSafe(|| handler(body, &mut ctx, &element.payload)));
                    Some((ctx, run))
                }
                None => None,
            }
        };
        match dispatched {
            Some((ctx, Ok(Ok(reply)))) => {
                self.deliver_reply(me, &element, reply);
                let term = self.post_dispatch(me, st, ctx, Some(element));
                if term.is_none() {
                    // Successful consumption resets the receive timeout.
                    self.arm_timeout(st);
                }
                term
            }
            Some((ctx, Ok(Err(err)))) => {
                if element.mid.is_request() {
                    self.deliver_error_reply(&element, err);
                    let term = self.post_dispatch(me, st, ctx, Some(element));
                    if term.is_none() {
                        self.arm_timeout(st);
                    }
                    term
                } else {
                    drop(ctx);
                    Some(ExitReason::Abnormal(err))
                }
            }
            Some((_ctx, Err(panic))) => Some(panic_to_reason(panic)),
            None => self.handle_unmatched(me, st, element),
        }
    }

    fn handle_unmatched(
        &self,
        me: &ActorRef,
        st: &mut RunState<S>,
        element: Box<MailboxElement>,
    ) -> Option<ExitReason> {
        let mut ctx = ActorContext::new(me.clone(), element.sender.clone(), element.mid);
        let decision = {
            let body = &mut st.body;
            catch_unwind(AssertUnwindSafe(|| body.unmatched(&mut ctx, &element.payload)))
        };
        match decision {
            Ok(Unmatched::Skip) => {
                trace!(
                    target: "hive::actor",
                    actor = %self.cell.addr(),
                    payload = %element.payload,
                    "stashing unmatched message"
                );
                st.stash.push(element);
                self.post_dispatch(me, st, ctx, None)
            }
            Ok(Unmatched::Drop) => {
                warn!(
                    target: "hive::actor",
                    actor = %self.cell.addr(),
                    payload = %element.payload,
                    "dropping unexpected message"
                );
                if element.mid.is_request() {
                    self.deliver_error_reply(
                        &element,
                        Error::with_context(
                            ErrorCode::UnexpectedMessage,
                            format!("no handler for {}", element.payload),
                        ),
                    );
                }
                self.post_dispatch(me, st, ctx, Some(element))
            }
            Ok(Unmatched::Reply(reply)) => {
                self.deliver_reply(me, &element, Some(reply));
                self.post_dispatch(me, st, ctx, Some(element))
            }
            Ok(Unmatched::Fail(err)) => {
                if element.mid.is_request() {
                    self.deliver_error_reply(&element, err);
                    self.post_dispatch(me, st, ctx, Some(element))
                } else {
                    drop(ctx);
                    Some(ExitReason::Abnormal(err))
                }
            }
            Err(panic) => Some(panic_to_reason(panic)),
        }
    }

    fn consume_response(
        &self,
        me: &ActorRef,
        st: &mut RunState<S>,
        element: Box<MailboxElement>,
    ) -> Option<ExitReason> {
        let number = element.mid.request_number();
        let pending = if st
            .awaited
            .front()
            .map(|p| p.request == number)
            .unwrap_or(false)
        {
            st.awaited.pop_front()
        } else {
            st.multiplexed.remove(&number)
        };
        let Some(pending) = pending else {
            if st.awaited.iter().any(|p| p.request == number) {
                // A reply for a later awaited request: keep it until its
                // turn comes.
                st.stash.push(element);
            } else {
                trace!(
                    target: "hive::actor",
                    actor = %self.cell.addr(),
                    mid = %element.mid,
                    "dropping response without pending handler"
                );
            }
            return None;
        };
        if let Some(token) = pending.timeout {
            token.dispose();
        }
        let outcome = response_outcome(&element);
        let mut ctx = ActorContext::new(me.clone(), element.sender.clone(), element.mid);
        let run = {
            let body = &mut st.body;
            let handler = pending.handler;
            catch_unwind(AssertUnwindSafe(|| handler(body, &mut ctx, outcome)))
        };
        match run {
            Ok(()) => {
                // Consuming the front awaited reply releases the stash.
                if st.awaited.is_empty() && !st.stash.is_empty() {
                    let stashed = std::mem::take(&mut st.stash);
                    self.cell.mailbox().prepend(stashed);
                }
                self.post_dispatch(me, st, ctx, None)
            }
            Err(panic) => Some(panic_to_reason(panic)),
        }
    }

    fn run_hook<F>(&self, me: &ActorRef, st: &mut RunState<S>, f: F) -> Option<ExitReason>
    where
        F: FnOnce(&mut S, &mut ActorContext<S>),
    {
        let mut ctx = ActorContext::new(me.clone(), None, MessageId::ASYNC);
        let run = {
            let body = &mut st.body;
            catch_unwind(AssertUnwindSafe(|| f(body, &mut ctx)))
        };
        match run {
            Ok(()) => self.post_dispatch(me, st, ctx, None),
            Err(panic) => Some(panic_to_reason(panic)),
        }
    }

    fn run_receive_timeout(&self, me: &ActorRef, st: &mut RunState<S>) -> Option<ExitReason> {
        let mut ctx = ActorContext::new(me.clone(), None, MessageId::ASYNC);
        let run = {
            let RunState {
                body, behaviors, ..
            } = &mut *st;
            match behaviors.last_mut() {
                Some(top) => catch_unwind(AssertUnwindSafe(|| top.run_timeout(body, &mut ctx))),
                None => Ok(()),
            }
        };
        match run {
            Ok(()) => {
                let term = self.post_dispatch(me, st, ctx, None);
                if term.is_none() {
                    self.arm_timeout(st);
                }
                term
            }
            Err(panic) => Some(panic_to_reason(panic)),
        }
    }

    /// Apply deferred control ops, unstash on behavior changes, and check
    /// for termination.
    fn post_dispatch(
        &self,
        _me: &ActorRef,
        st: &mut RunState<S>,
        mut ctx: ActorContext<S>,
        current: Option<Box<MailboxElement>>,
    ) -> Option<ExitReason> {
        let outcome = self.apply_ops(st, ctx.take_ops());
        if let Some(element) = current {
            if outcome.stash_current {
                st.stash.push(element);
            }
        }
        if outcome.behavior_changed {
            let stashed = std::mem::take(&mut st.stash);
            if !stashed.is_empty() {
                self.cell.mailbox().prepend(stashed);
            }
            self.arm_timeout(st);
        }
        if let Some(reason) = outcome.quit {
            return Some(reason);
        }
        if st.initialized && self.fully_idle(st) {
            return Some(ExitReason::Normal);
        }
        None
    }

    fn apply_ops(&self, st: &mut RunState<S>, ops: Vec<ControlOp<S>>) -> OpsOutcome {
        let mut outcome = OpsOutcome {
            quit: None,
            behavior_changed: false,
            stash_current: false,
        };
        for op in ops {
            match op {
                ControlOp::PushBehavior(behavior) => {
                    if !behavior.is_empty() {
                        st.behaviors.push(behavior);
                        outcome.behavior_changed = true;
                    }
                }
                ControlOp::ReplaceBehavior(behavior) => {
                    st.behaviors.pop();
                    if !behavior.is_empty() {
                        st.behaviors.push(behavior);
                    }
                    outcome.behavior_changed = true;
                }
                ControlOp::PopBehavior => {
                    st.behaviors.pop();
                    outcome.behavior_changed = true;
                }
                ControlOp::Quit(reason) => {
                    if outcome.quit.is_none() {
                        outcome.quit = Some(reason);
                    }
                }
                ControlOp::StashCurrent => outcome.stash_current = true,
                ControlOp::InstallMultiplexed {
                    request,
                    handler,
                    timeout,
                } => {
                    st.multiplexed.insert(
                        request,
                        PendingResponse {
                            request,
                            handler,
                            timeout,
                        },
                    );
                }
                ControlOp::InstallAwaited {
                    request,
                    handler,
                    timeout,
                } => {
                    st.awaited.push_back(PendingResponse {
                        request,
                        handler,
                        timeout,
                    });
                }
            }
        }
        outcome
    }

    /// Re-arm the receive timeout for the current top behavior.
    fn arm_timeout(&self, st: &mut RunState<S>) {
        st.timeout_gen += 1;
        if let Some(token) = st.timeout_token.take() {
            token.dispose();
        }
        let Some(after) = st.behaviors.last().and_then(|b| b.timeout_after()) else {
            return;
        };
        let generation = st.timeout_gen;
        let weak = self.self_weak.clone();
        let token = self
            .cell
            .system()
            .clock()
            .schedule_in(after, move || {
                if let Some(me) = weak.upgrade() {
                    let element = MailboxElement::new(
                        None,
                        MessageId::ASYNC.with_urgent_priority(),
                        payload!(ReceiveTimeoutMsg { generation }),
                    );
                    let _ = AbstractActor::enqueue(&*me, element);
                }
            });
        st.timeout_token = Some(token);
    }

    // ------------------------------------------------------------------
    // Replies and termination
    // ------------------------------------------------------------------

    fn deliver_reply(&self, me: &ActorRef, element: &MailboxElement, reply: Option<Payload>) {
        let Some(reply) = reply else { return };
        if !element.mid.is_request() {
            // Replies to one-way messages are discarded.
            return;
        }
        if let Some(sender) = &element.sender {
            let _ = sender.enqueue(MailboxElement::new(
                Some(me.clone()),
                element.mid.response_id(),
                reply,
            ));
        }
    }

    fn deliver_error_reply(&self, element: &MailboxElement, err: Error) {
        if element.mid.is_request() {
            if let Some(sender) = &element.sender {
                let _ = sender.enqueue(MailboxElement::new(
                    None,
                    element.mid.response_id(),
                    payload!(err),
                ));
            }
        }
    }

    fn finalize(&self, me: &ActorRef, st: &mut RunState<S>, reason: ExitReason) {
        self.cell.set_exit_reason(reason);
        let reason = self.cell.exit_reason().unwrap_or_default();
        debug!(
            target: "hive::actor",
            actor = %self.cell.addr(),
            name = self.cell.name(),
            %reason,
            "terminating"
        );
        if let Some(token) = st.timeout_token.take() {
            token.dispose();
        }
        for pending in st.awaited.drain(..) {
            if let Some(token) = pending.timeout {
                token.dispose();
            }
        }
        for (_, pending) in st.multiplexed.drain() {
            if let Some(token) = pending.timeout {
                token.dispose();
            }
        }
        {
            let mut ctx = ActorContext::new(me.clone(), None, MessageId::ASYNC);
            let body = &mut st.body;
            let _ = catch_unwind(AssertUnwindSafe(move || body.on_exit(&mut ctx)));
        }
        let bounce = reason.to_error();
        for element in st.stash.drain(..) {
            bounce_element(element, &bounce);
        }
        self.cell.mailbox().close(|element| bounce_element(element, &bounce));
        run_exit_hooks(&self.cell);
    }
}

impl<S: Actor> AbstractActor for ScheduledActor<S> {
    fn cell(&self) -> &ActorCell {
        &self.cell
    }

    fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        let result = self.cell.mailbox().enqueue(element);
        if result == EnqueueResult::UnblockedReader {
            match &self.signal {
                Some(signal) => signal.notify(),
                None => {
                    if let Some(me) = self.self_weak.upgrade() {
                        self.cell
                            .system()
                            .schedule(me as Arc<dyn Resumable>);
                    }
                }
            }
        }
        result
    }
}

impl<S: Actor> Resumable for ScheduledActor<S> {
    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult {
        let me = ActorRef::from_arc(Arc::clone(&self) as Arc<dyn AbstractActor>);
        let mut st = self.state.lock();
        if self.cell.is_terminated() {
            return ResumeResult::Done;
        }
        if !st.initialized {
            if let Some(result) = self.initialize(&me, &mut st) {
                return result;
            }
        }
        let mut handled = 0usize;
        loop {
            while handled < max_throughput {
                let element = match self.cell.mailbox().pop() {
                    Some(element) => element,
                    None => break,
                };
                handled += 1;
                if let Some(reason) = self.consume(&me, &mut st, element) {
                    self.finalize(&me, &mut st, reason);
                    return ResumeResult::Done;
                }
            }
            if handled >= max_throughput {
                return if self.cell.mailbox().can_fetch_more() {
                    ResumeResult::ResumeLater
                } else if self.cell.mailbox().try_block() {
                    ResumeResult::AwaitMessage
                } else {
                    ResumeResult::ResumeLater
                };
            }
            if self.cell.mailbox().try_block() {
                return ResumeResult::AwaitMessage;
            }
            // A producer raced in between drain and park: keep consuming.
        }
    }
}

/// Bounce a request back to its sender with an error response; one-way
/// messages are dropped silently.
pub(crate) fn bounce_element(element: Box<MailboxElement>, err: &Error) {
    if element.mid.is_request() {
        if let Some(sender) = &element.sender {
            let _ = sender.enqueue(MailboxElement::new(
                None,
                element.mid.response_id(),
                payload!(err.clone()),
            ));
        }
    }
}

/// Classify a response payload: a lone `Error` element is the error path.
pub(crate) fn response_outcome(element: &MailboxElement) -> Result<Payload, Error> {
    if element.payload.len() == 1 {
        if let Some(err) = element.payload.get::<Error>(0) {
            return Err(err.clone());
        }
    }
    Ok(element.payload.clone())
}

/// Convert a caught panic into an exit reason.
pub(crate) fn panic_to_reason(panic: Box<dyn Any + Send>) -> ExitReason {
    let text = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "actor panicked".to_string());
    ExitReason::Abnormal(Error::with_context(ErrorCode::RuntimeError, text))
}
