//! The actor system: owner of scheduler, clock, private threads,
//! registries, and the middleman.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

// Layer 3: Internal module imports
use super::config::SystemConfig;
use crate::actor::blocking::{BlockingActor, BlockingHost};
use crate::actor::cell::{AbstractActor, ActorRef, ActorWeak};
use crate::actor::scheduled::{Actor, ScheduledActor, SpawnOptions};
use crate::actor::scoped::ScopedActor;
use crate::error::{Error, ErrorCode, ExitReason};
use crate::mailbox::MailboxElement;
use crate::message::system::ExitMsg;
use crate::message::MessageId;
use crate::meta;
use crate::net::middleman::Middleman;
use crate::payload;
use crate::scheduler::{PrivateThreadPool, Resumable, Scheduler};
use crate::time::Clock;
use crate::util::{ActorAddr, ActorId, NodeId, ProcessId};

/// Shared internals of one runtime instance.
///
/// Actor cells hold a strong reference here; the core in turn holds
/// strong references to live actors only through the name registry, which
/// is cleaned on exit, so no cycle survives termination.
pub(crate) struct SystemCore {
    config: SystemConfig,
    node: NodeId,
    process: ProcessId,
    next_actor_id: AtomicU64,
    next_request: AtomicU64,
    scheduler: Scheduler,
    clock: Clock,
    private_threads: Arc<PrivateThreadPool>,
    actors_by_id: DashMap<ActorId, ActorWeak>,
    names: DashMap<String, ActorRef>,
    alive: AtomicUsize,
    alive_mtx: Mutex<()>,
    alive_cv: Condvar,
    middleman: OnceLock<Middleman>,
    shutting_down: AtomicBool,
}

impl SystemCore {
    /// The local node id.
    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    /// The local process id.
    pub(crate) fn process(&self) -> ProcessId {
        self.process
    }

    pub(crate) fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn schedule(&self, job: Arc<dyn Resumable>) {
        self.scheduler.schedule(job);
    }

    pub(crate) fn next_request_number(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate the next local actor address.
    pub(crate) fn next_addr(&self) -> ActorAddr {
        let id = self.next_actor_id.fetch_add(1, Ordering::Relaxed);
        ActorAddr::new(self.node, self.process, id)
    }

    /// Look up a live local actor by id.
    pub(crate) fn actor_by_id(&self, id: ActorId) -> Option<ActorRef> {
        self.actors_by_id.get(&id).and_then(|weak| weak.upgrade())
    }

    /// Look up a registered name.
    pub(crate) fn lookup_name(&self, name: &str) -> Option<ActorRef> {
        self.names
            .get(name)
            .map(|entry| entry.value().clone())
            .filter(|actor| !actor.is_terminated())
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    pub(crate) fn spawn_scheduled<A: Actor>(
        this: &Arc<Self>,
        actor: A,
        options: SpawnOptions,
    ) -> ActorRef {
        let host = ScheduledActor::new(this.next_addr(), actor, Arc::clone(this), &options);
        let actor_ref = ActorRef::from_arc(Arc::clone(&host) as Arc<dyn AbstractActor>);
        Self::register_actor(this, &actor_ref);
        if options.lazy_init {
            // Lazy actors park immediately; the first enqueue schedules.
            let _ = actor_ref.cell().mailbox().try_block();
        } else {
            this.scheduler.schedule(host as Arc<dyn Resumable>);
        }
        actor_ref
    }

    pub(crate) fn spawn_detached<A: Actor>(
        this: &Arc<Self>,
        actor: A,
        mut options: SpawnOptions,
    ) -> Result<ActorRef, Error> {
        options.detached = true;
        let thread = PrivateThreadPool::acquire(&this.private_threads)?;
        let host = ScheduledActor::new(this.next_addr(), actor, Arc::clone(this), &options);
        let actor_ref = ActorRef::from_arc(Arc::clone(&host) as Arc<dyn AbstractActor>);
        Self::register_actor(this, &actor_ref);
        thread.run(move || host.detached_loop());
        Ok(actor_ref)
    }

    pub(crate) fn spawn_blocking_actor<B: BlockingActor>(
        this: &Arc<Self>,
        actor: B,
    ) -> Result<ActorRef, Error> {
        let thread = PrivateThreadPool::acquire(&this.private_threads)?;
        let host = BlockingHost::new(this.next_addr(), actor, Arc::clone(this));
        let actor_ref = ActorRef::from_arc(Arc::clone(&host) as Arc<dyn AbstractActor>);
        Self::register_actor(this, &actor_ref);
        thread.run(move || BlockingHost::run(&host));
        Ok(actor_ref)
    }

    /// Count an actor as running and install the deregistration hook.
    fn register_actor(this: &Arc<Self>, actor_ref: &ActorRef) {
        this.alive.fetch_add(1, Ordering::SeqCst);
        let addr = actor_ref.addr();
        this.actors_by_id.insert(addr.actor(), actor_ref.downgrade());
        let core = Arc::clone(this);
        actor_ref.cell().attach_fn(move |_reason: &ExitReason| {
            core.actors_by_id.remove(&addr.actor());
            core.names.retain(|_, registered| registered.addr() != addr);
            core.alive.fetch_sub(1, Ordering::SeqCst);
            let _guard = core.alive_mtx.lock();
            core.alive_cv.notify_all();
        });
    }

    /// Register a scoped actor: reachable by id (for remote replies) but
    /// not counted as running.
    pub(crate) fn register_scoped(this: &Arc<Self>, actor_ref: &ActorRef) {
        let id = actor_ref.addr().actor();
        this.actors_by_id.insert(id, actor_ref.downgrade());
        let core = Arc::clone(this);
        actor_ref.cell().attach_fn(move |_reason: &ExitReason| {
            core.actors_by_id.remove(&id);
        });
    }

    fn await_actors_done(&self) {
        let mut guard = self.alive_mtx.lock();
        while self.alive.load(Ordering::SeqCst) > 0 {
            self.alive_cv.wait(&mut guard);
        }
    }
}

/// The user-facing runtime handle.
///
/// # Example
/// ```rust,ignore
/// let system = ActorSystem::new(SystemConfig::new())?;
/// let adder = system.spawn(Adder);
/// let mut scoped = system.scoped();
/// let reply = scoped.request(&adder, payload!(1i64), Duration::from_secs(1))?;
/// system.shutdown();
/// ```
pub struct ActorSystem {
    core: Arc<SystemCore>,
}

impl ActorSystem {
    /// Build and start a runtime: meta registry, clock, scheduler,
    /// private-thread pool, and (unless disabled) the network layer.
    pub fn new(config: SystemConfig) -> Result<Self, Error> {
        meta::init();
        let node = config.host_id().unwrap_or_else(NodeId::random);
        let process = std::process::id();
        let workers = config.workers().unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        let scheduler = Scheduler::start(workers, config.max_throughput())?;
        let clock = match Clock::start() {
            Ok(clock) => clock,
            Err(err) => {
                scheduler.stop();
                return Err(err);
            }
        };
        let network_backend = config.network_backend().to_string();
        let core = Arc::new(SystemCore {
            config,
            node,
            process,
            next_actor_id: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
            scheduler,
            clock,
            private_threads: PrivateThreadPool::new(),
            actors_by_id: DashMap::new(),
            names: DashMap::new(),
            alive: AtomicUsize::new(0),
            alive_mtx: Mutex::new(()),
            alive_cv: Condvar::new(),
            middleman: OnceLock::new(),
            shutting_down: AtomicBool::new(false),
        });
        if network_backend == "default" {
            match Middleman::start(&core) {
                Ok(middleman) => {
                    let _ = core.middleman.set(middleman);
                }
                Err(err) => {
                    core.clock.stop();
                    core.scheduler.stop();
                    return Err(err);
                }
            }
        } else {
            debug!(
                target: "hive::system",
                backend = %network_backend,
                "networking not started"
            );
        }
        info!(target: "hive::system", node = %node, workers, "actor system started");
        Ok(Self { core })
    }

    /// This runtime's node id.
    pub fn node(&self) -> NodeId {
        self.core.node
    }

    /// The active configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.core.config
    }

    /// Number of running (non-scoped) actors.
    pub fn running_actors(&self) -> usize {
        self.core.alive.load(Ordering::SeqCst)
    }

    /// Spawn a cooperative actor onto the worker pool.
    pub fn spawn<A: Actor>(&self, actor: A) -> ActorRef {
        SystemCore::spawn_scheduled(&self.core, actor, SpawnOptions::default())
    }

    /// Spawn a cooperative actor with explicit options.
    pub fn spawn_opts<A: Actor>(&self, actor: A, options: SpawnOptions) -> Result<ActorRef, Error> {
        if options.detached {
            SystemCore::spawn_detached(&self.core, actor, options)
        } else {
            Ok(SystemCore::spawn_scheduled(&self.core, actor, options))
        }
    }

    /// Spawn a blocking actor on a dedicated thread.
    pub fn spawn_blocking<B: BlockingActor>(&self, actor: B) -> Result<ActorRef, Error> {
        SystemCore::spawn_blocking_actor(&self.core, actor)
    }

    /// Create a scoped actor bound to the calling thread.
    pub fn scoped(&self) -> ScopedActor {
        ScopedActor::new(&self.core)
    }

    /// Register a well-known name for `actor`.
    pub fn register_name(&self, name: impl Into<String>, actor: &ActorRef) -> Result<(), Error> {
        let name = name.into();
        if let Some(existing) = self.core.lookup_name(&name) {
            if existing.addr() != actor.addr() {
                return Err(Error::with_context(
                    ErrorCode::InvalidArgument,
                    format!("name '{name}' is already registered"),
                ));
            }
            return Ok(());
        }
        self.core.names.insert(name, actor.clone());
        Ok(())
    }

    /// Remove a name registration.
    pub fn unregister_name(&self, name: &str) -> bool {
        self.core.names.remove(name).is_some()
    }

    /// Look up a registered name.
    pub fn whereis(&self, name: &str) -> Option<ActorRef> {
        self.core.lookup_name(name)
    }

    /// The network subsystem, when started.
    pub fn middleman(&self) -> Result<&Middleman, Error> {
        self.core.middleman.get().ok_or_else(|| {
            Error::with_context(
                ErrorCode::InvalidArgument,
                "networking is not enabled (middleman.network-backend)",
            )
        })
    }

    /// Block until every running actor has terminated.
    pub fn await_all_actors_done(&self) {
        self.core.await_actors_done();
    }

    /// Stop the runtime: close the network layer, kill remaining actors,
    /// wait for them, then stop clock, private threads, and workers.
    pub fn shutdown(&self) {
        if self.core.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: "hive::system", node = %self.core.node, "shutting down");
        if let Some(middleman) = self.core.middleman.get() {
            middleman.stop();
        }
        // Collect first: the kill signals trigger deregistration, which
        // must not race with the registry iteration.
        let victims: Vec<ActorRef> = self
            .core
            .actors_by_id
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        for actor in victims {
            let msg = ExitMsg {
                source: ActorAddr::default(),
                reason: ExitReason::Kill,
            };
            let _ = actor.enqueue(MailboxElement::new(
                None,
                MessageId::ASYNC.with_urgent_priority(),
                payload!(msg),
            ));
        }
        self.core.await_actors_done();
        self.core.clock.stop();
        self.core.private_threads.stop();
        self.core.scheduler.stop();
        debug!(target: "hive::system", "shutdown complete");
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("node", &self.core.node.to_string())
            .field("running", &self.core.alive.load(Ordering::SeqCst))
            .finish()
    }
}
