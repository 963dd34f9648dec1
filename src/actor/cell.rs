//! The actor control block and reference types.
//!
//! Every actor body (cooperative, blocking, or remote proxy) embeds an
//! [`ActorCell`]: the stable address, the mailbox, the set-once exit
//! reason, the link set, and the attachable list. Strong references
//! ([`ActorRef`]) keep the body alive; weak references ([`ActorWeak`])
//! may outlive it, which is what breaks the natural cycles created by
//! links and monitors. The enqueue path is the only place that upgrades
//! weak to strong.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tracing::trace;

// Layer 3: Internal module imports
use crate::error::ExitReason;
use crate::mailbox::{EnqueueResult, Mailbox, MailboxElement};
use crate::message::system::{DownMsg, ExitMsg};
use crate::message::{MessageId, Payload};
use crate::payload;
use crate::system::actor_system::SystemCore;
use crate::util::ActorAddr;

/// Callback list entry invoked exactly once when the owning actor exits.
pub trait Attachable: Send + 'static {
    /// Consume the attachable with the actor's exit reason.
    fn actor_exited(self: Box<Self>, reason: &ExitReason);

    /// Whether this attachable matches a detach token.
    fn matches(&self, token: &AttachToken) -> bool {
        let _ = token;
        false
    }
}

/// Selector for removing attachables before the actor exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachToken {
    /// A monitor installed by the observer with this address.
    Monitor(ActorAddr),
}

/// Adapter turning a closure into an [`Attachable`].
pub struct FnAttachable<F>(F);

impl<F> Attachable for FnAttachable<F>
where
    F: FnOnce(&ExitReason) + Send + 'static,
{
    fn actor_exited(self: Box<Self>, reason: &ExitReason) {
        (self.0)(reason)
    }
}

/// Monitor entry: delivers a [`DownMsg`] to the observer on exit.
pub(crate) struct MonitorAttachable {
    pub(crate) observer: ActorWeak,
    pub(crate) observed: ActorAddr,
}

impl Attachable for MonitorAttachable {
    fn actor_exited(self: Box<Self>, reason: &ExitReason) {
        if let Some(observer) = self.observer.upgrade() {
            let msg = DownMsg {
                source: self.observed,
                reason: reason.clone(),
            };
            let element = MailboxElement::new(None, MessageId::ASYNC, payload!(msg));
            let _ = observer.enqueue(element);
        }
    }

    fn matches(&self, token: &AttachToken) -> bool {
        matches!(token, AttachToken::Monitor(addr) if *addr == self.observer.addr())
    }
}

/// Trait shared by all concrete actor bodies.
///
/// `enqueue` differs per body: cooperative actors schedule themselves on
/// the worker pool when a producer unblocks the reader, blocking actors
/// signal their condition variable, and proxies forward over the network.
pub(crate) trait AbstractActor: Send + Sync + 'static {
    fn cell(&self) -> &ActorCell;
    fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult;
}

/// The actor control block.
pub struct ActorCell {
    addr: ActorAddr,
    name: &'static str,
    mailbox: Mailbox,
    exit_reason: OnceLock<ExitReason>,
    links: Mutex<HashMap<ActorAddr, ActorWeak>>,
    attachables: Mutex<Vec<Box<dyn Attachable>>>,
    system: Arc<SystemCore>,
}

impl ActorCell {
    pub(crate) fn new(addr: ActorAddr, name: &'static str, system: Arc<SystemCore>) -> Self {
        Self {
            addr,
            name,
            mailbox: Mailbox::new(),
            exit_reason: OnceLock::new(),
            links: Mutex::new(HashMap::new()),
            attachables: Mutex::new(Vec::new()),
            system,
        }
    }

    /// The actor's immutable address.
    pub fn addr(&self) -> ActorAddr {
        self.addr
    }

    /// Diagnostic name of the body.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The actor's mailbox.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn system(&self) -> &Arc<SystemCore> {
        &self.system
    }

    /// Record the exit reason; only the first call wins.
    pub(crate) fn set_exit_reason(&self, reason: ExitReason) -> bool {
        self.exit_reason.set(reason).is_ok()
    }

    /// The exit reason, once terminated.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason.get().cloned()
    }

    /// Whether the exit reason has been set.
    pub fn is_terminated(&self) -> bool {
        self.exit_reason.get().is_some()
    }

    /// Add `peer` to the link set. Returns `false` when this actor has
    /// already terminated, in which case the caller must deliver the exit
    /// signal itself.
    pub(crate) fn add_link(&self, peer: ActorWeak) -> bool {
        let mut links = self.links.lock();
        if self.is_terminated() {
            return false;
        }
        links.insert(peer.addr(), peer);
        true
    }

    pub(crate) fn remove_link(&self, addr: &ActorAddr) {
        self.links.lock().remove(addr);
    }

    /// Register an exit callback. Runs immediately when the actor has
    /// already terminated.
    pub fn attach(&self, attachable: Box<dyn Attachable>) {
        {
            let mut list = self.attachables.lock();
            // Checked under the lock: the exit path sets the reason before
            // draining this list, so either we see the reason here or the
            // drain sees our entry.
            if !self.is_terminated() {
                list.push(attachable);
                return;
            }
        }
        if let Some(reason) = self.exit_reason.get() {
            attachable.actor_exited(reason);
        }
    }

    /// Register a closure to run at exit.
    pub fn attach_fn(&self, hook: impl FnOnce(&ExitReason) + Send + 'static) {
        self.attach(Box::new(FnAttachable(hook)));
    }

    /// Remove the first attachable matching `token`.
    pub fn detach(&self, token: &AttachToken) -> bool {
        let mut list = self.attachables.lock();
        if let Some(index) = list.iter().position(|a| a.matches(token)) {
            list.remove(index);
            true
        } else {
            false
        }
    }

    fn take_links(&self) -> Vec<ActorWeak> {
        self.links.lock().drain().map(|(_, weak)| weak).collect()
    }

    fn drain_attachables(&self) -> Vec<Box<dyn Attachable>> {
        std::mem::take(&mut *self.attachables.lock())
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("addr", &self.addr.to_string())
            .field("name", &self.name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Deliver exit signals to links and fire attachables.
///
/// The cell's exit reason must already be set. Safe to call exactly once
/// from the terminating body's cleanup path.
pub(crate) fn run_exit_hooks(cell: &ActorCell) {
    let reason = cell.exit_reason().unwrap_or_default();
    trace!(target: "hive::actor", actor = %cell.addr(), %reason, "running exit hooks");
    for peer in cell.take_links() {
        if let Some(peer) = peer.upgrade() {
            peer.cell().remove_link(&cell.addr());
            let msg = ExitMsg {
                source: cell.addr(),
                reason: reason.clone(),
            };
            let element = MailboxElement::new(
                None,
                MessageId::ASYNC.with_urgent_priority(),
                payload!(msg),
            );
            let _ = peer.enqueue(element);
        }
    }
    for attachable in cell.drain_attachables() {
        attachable.actor_exited(&reason);
    }
}

/// Strong actor handle: keeps the body alive.
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<dyn AbstractActor>,
}

impl ActorRef {
    pub(crate) fn from_arc(inner: Arc<dyn AbstractActor>) -> Self {
        Self { inner }
    }

    pub(crate) fn cell(&self) -> &ActorCell {
        self.inner.cell()
    }

    /// The referenced actor's address.
    pub fn addr(&self) -> ActorAddr {
        self.inner.cell().addr()
    }

    /// Whether the referenced actor has terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.cell().is_terminated()
    }

    /// The exit reason, once the actor has terminated.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.cell().exit_reason()
    }

    /// Low-level enqueue of a prepared mailbox element.
    pub(crate) fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        self.inner.enqueue(element)
    }

    /// Send a payload without a sender; no reply is possible.
    pub fn anon_send(&self, payload: Payload) -> EnqueueResult {
        self.enqueue(MailboxElement::new(None, MessageId::ASYNC, payload))
    }

    /// Downgrade to a weak handle.
    pub fn downgrade(&self) -> ActorWeak {
        ActorWeak {
            inner: Arc::downgrade(&self.inner),
            addr: self.addr(),
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ActorRef {}

impl std::hash::Hash for ActorRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.addr())
    }
}

/// Weak actor handle: caches the address so it remains printable and
/// usable as a map key after the actor dies.
#[derive(Clone)]
pub struct ActorWeak {
    inner: Weak<dyn AbstractActor>,
    addr: ActorAddr,
}

impl ActorWeak {
    /// The address captured at downgrade time.
    pub fn addr(&self) -> ActorAddr {
        self.addr
    }

    /// Try to restore a strong handle.
    pub fn upgrade(&self) -> Option<ActorRef> {
        self.inner.upgrade().map(ActorRef::from_arc)
    }
}

impl fmt::Debug for ActorWeak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorWeak({})", self.addr)
    }
}

/// Link two actors: each terminates the other on abnormal exit.
///
/// When either side has already terminated, the exit signal is delivered
/// to the surviving side immediately.
pub fn link(a: &ActorRef, b: &ActorRef) {
    let a_ok = a.cell().add_link(b.downgrade());
    let b_ok = b.cell().add_link(a.downgrade());
    if !a_ok {
        deliver_exit_now(b, a);
    }
    if !b_ok {
        deliver_exit_now(a, b);
    }
}

/// Remove an existing link in both directions.
pub fn unlink(a: &ActorRef, b: &ActorRef) {
    a.cell().remove_link(&b.addr());
    b.cell().remove_link(&a.addr());
}

fn deliver_exit_now(to: &ActorRef, dead: &ActorRef) {
    let msg = ExitMsg {
        source: dead.addr(),
        reason: dead.cell().exit_reason().unwrap_or_default(),
    };
    let element = MailboxElement::new(None, MessageId::ASYNC.with_urgent_priority(), payload!(msg));
    let _ = to.enqueue(element);
}
