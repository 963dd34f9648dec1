//! The middleman: owner of the multiplexer thread and the blocking
//! network façade.
//!
//! `publish`, `unpublish`, `connect`, and `remote_actor` may be called
//! from any thread; every socket operation is marshalled into the reactor
//! thread through control frames, with crossbeam channels providing the
//! blocking rendezvous for handshake results.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

// Layer 2: Third-party crate imports
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::accept::AcceptManager;
use super::basp::wire::encode_kill_proxy;
use super::basp::{BaspConnection, HandshakeInfo, PublishedInfo};
use super::multiplexer::{self, MpxShared};
use super::proxy_registry::ProxyRegistry;
use crate::actor::cell::ActorRef;
use crate::error::{Error, ErrorCode, ExitReason};
use crate::system::actor_system::SystemCore;
use crate::util::{ActorAddr, ActorId, NodeId, ProcessId};

/// Fallback deadline for blocking connect/handshake rendezvous when no
/// `middleman.connection-timeout` is configured.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct PublishedEntry {
    actor: ActorRef,
    interfaces: Vec<String>,
    listener_key: Option<usize>,
}

/// State shared between the façade, the reactor, and every connection.
pub(crate) struct MiddlemanCore {
    shared: Arc<MpxShared>,
    system: Weak<SystemCore>,
    proxies: ProxyRegistry,
    peers: Mutex<HashMap<NodeId, usize>>,
    published: Mutex<HashMap<u16, PublishedEntry>>,
    local_node: NodeId,
    local_process: ProcessId,
    app_ids: Vec<String>,
    heartbeat_interval: Option<Duration>,
    connection_timeout: Option<Duration>,
    max_consecutive_reads: usize,
}

impl MiddlemanCore {
    pub(crate) fn system(&self) -> Result<Arc<SystemCore>, Error> {
        self.system.upgrade().ok_or_else(|| {
            Error::with_context(ErrorCode::RuntimeError, "actor system already gone")
        })
    }

    pub(crate) fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    pub(crate) fn local_node(&self) -> NodeId {
        self.local_node
    }

    pub(crate) fn local_process(&self) -> ProcessId {
        self.local_process
    }

    pub(crate) fn app_ids(&self) -> &[String] {
        &self.app_ids
    }

    pub(crate) fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub(crate) fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    pub(crate) fn max_consecutive_reads(&self) -> usize {
        self.max_consecutive_reads
    }

    /// Record the connection serving `node`.
    pub(crate) fn register_peer(&self, node: NodeId, key: usize) {
        let previous = self.peers.lock().insert(node, key);
        if let Some(previous) = previous {
            if previous != key {
                warn!(
                    target: "hive::basp",
                    peer = %node,
                    "replacing existing connection to peer"
                );
            }
        }
    }

    /// Forget a dead peer and cancel all of its proxies.
    pub(crate) fn peer_disconnected(&self, node: NodeId, key: usize, reason: &Error) {
        {
            let mut peers = self.peers.lock();
            if peers.get(&node) == Some(&key) {
                peers.remove(&node);
            }
        }
        self.proxies.erase_all(node, reason);
    }

    /// Ship a prepared frame to `node`'s connection; drops (at-most-once)
    /// when the peer is not connected.
    pub(crate) fn send_frame(&self, node: NodeId, frame: Vec<u8>) {
        let key = match self.peers.lock().get(&node) {
            Some(&key) => key,
            None => {
                warn!(target: "hive::basp", peer = %node, "dropping frame for unconnected peer");
                return;
            }
        };
        let result = self
            .shared
            .run_action(move |reactor| reactor.conn_write(key, frame));
        if let Err(err) = result {
            warn!(target: "hive::basp", peer = %node, %err, "failed to hand frame to reactor");
        }
    }

    /// Notify `node` that local actor `actor_id` terminated.
    pub(crate) fn send_kill_proxy(&self, node: NodeId, actor_id: ActorId, reason: &ExitReason) {
        match encode_kill_proxy(actor_id, reason) {
            Ok(frame) => self.send_frame(node, frame),
            Err(err) => {
                warn!(target: "hive::basp", %err, "failed to encode kill-proxy");
            }
        }
    }

    /// Schedule a read continuation for a connection that exhausted its
    /// per-turn read budget.
    pub(crate) fn poke_connection(&self, key: usize) {
        let _ = self
            .shared
            .run_action(move |reactor| reactor.poke_read(key));
    }

    pub(crate) fn note_listener_key(&self, port: u16, key: usize) {
        if let Some(entry) = self.published.lock().get_mut(&port) {
            entry.listener_key = Some(key);
        }
    }

    pub(crate) fn clear_listener_key(&self, port: u16) {
        if let Some(entry) = self.published.lock().get_mut(&port) {
            entry.listener_key = None;
        }
    }

    /// What the listener on `port` advertises in server handshakes.
    pub(crate) fn published_info(&self, port: u16) -> Option<PublishedInfo> {
        self.published.lock().get(&port).map(|entry| PublishedInfo {
            actor_id: entry.actor.addr().actor(),
            interfaces: entry.interfaces.clone(),
        })
    }
}

/// The network subsystem façade.
pub struct Middleman {
    core: Arc<MiddlemanCore>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Middleman {
    /// Start the multiplexer thread.
    pub(crate) fn start(system: &Arc<SystemCore>) -> Result<Self, Error> {
        let (shared, reactor) = multiplexer::create()?;
        let config = system.config();
        let core = Arc::new(MiddlemanCore {
            shared,
            system: Arc::downgrade(system),
            proxies: ProxyRegistry::new(),
            peers: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            local_node: system.node(),
            local_process: system.process(),
            app_ids: config.app_identifiers(),
            heartbeat_interval: config.heartbeat_interval(),
            connection_timeout: config.connection_timeout(),
            max_consecutive_reads: config.max_consecutive_reads(),
        });
        let thread = std::thread::Builder::new()
            .name("hive.mpx".into())
            .spawn(move || reactor.run())
            .map_err(|err| {
                Error::with_context(
                    ErrorCode::RuntimeError,
                    format!("failed to spawn multiplexer thread: {err}"),
                )
            })?;
        info!(target: "hive::basp", node = %core.local_node, "middleman started");
        Ok(Self {
            core,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Bind a listening socket and associate inbound connections with
    /// `actor`. Port 0 picks an ephemeral port; the bound port is
    /// returned.
    pub fn publish(
        &self,
        actor: &ActorRef,
        port: u16,
        addr: Option<&str>,
        reuse: bool,
    ) -> Result<u16, Error> {
        let host = addr.unwrap_or("0.0.0.0");
        let sock_addr: SocketAddr = format!("{host}:{port}").parse().map_err(|_| {
            Error::with_context(
                ErrorCode::InvalidArgument,
                format!("invalid listen address {host}:{port}"),
            )
        })?;
        let domain = Domain::for_address(sock_addr);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(syscall_failed)?;
        if reuse {
            socket.set_reuse_address(true).map_err(syscall_failed)?;
        }
        socket.bind(&sock_addr.into()).map_err(syscall_failed)?;
        socket.listen(1024).map_err(syscall_failed)?;
        socket.set_nonblocking(true).map_err(syscall_failed)?;
        let std_listener: std::net::TcpListener = socket.into();
        let actual_port = std_listener
            .local_addr()
            .map_err(syscall_failed)?
            .port();
        let listener = mio::net::TcpListener::from_std(std_listener);

        self.core.published.lock().insert(
            actual_port,
            PublishedEntry {
                actor: actor.clone(),
                interfaces: Vec::new(),
                listener_key: None,
            },
        );
        let manager = AcceptManager::new(listener, Arc::clone(&self.core), actual_port);
        if let Err(err) = self.core.shared.start_manager(Box::new(manager)) {
            self.core.published.lock().remove(&actual_port);
            return Err(err);
        }
        info!(
            target: "hive::basp",
            actor = %actor.addr(),
            port = actual_port,
            "actor published"
        );
        Ok(actual_port)
    }

    /// Remove a publish binding. Existing connections stay open.
    pub fn unpublish(&self, actor: &ActorRef, port: u16) -> Result<(), Error> {
        let key = {
            let mut published = self.core.published.lock();
            match published.get(&port) {
                Some(entry) if entry.actor.addr() == actor.addr() => {
                    let key = entry.listener_key;
                    published.remove(&port);
                    key
                }
                Some(_) => {
                    return Err(Error::with_context(
                        ErrorCode::InvalidArgument,
                        format!("port {port} is published for a different actor"),
                    ))
                }
                None => {
                    return Err(Error::with_context(
                        ErrorCode::InvalidArgument,
                        format!("no actor published on port {port}"),
                    ))
                }
            }
        };
        if let Some(key) = key {
            let _ = self
                .core
                .shared
                .run_action(move |reactor| reactor.remove_manager(key, None));
        }
        Ok(())
    }

    /// Open a connection to `host:port` and complete the handshake.
    pub fn connect(&self, host: &str, port: u16) -> Result<NodeId, Error> {
        self.connect_impl(host, port).map(|info| info.node)
    }

    /// Connect and intern a proxy for the actor published on `host:port`.
    pub fn remote_actor(&self, host: &str, port: u16) -> Result<ActorRef, Error> {
        let info = self.connect_impl(host, port)?;
        let published = info.published.ok_or_else(|| {
            Error::with_context(
                ErrorCode::InvalidArgument,
                format!("no actor published on {host}:{port}"),
            )
        })?;
        self.core.proxies.get_or_create(
            ActorAddr::new(info.node, info.process, published.actor_id),
            &self.core,
        )
    }

    /// Like [`remote_actor`](Self::remote_actor), additionally checking
    /// the advertised interface fingerprints.
    pub fn remote_actor_typed(
        &self,
        host: &str,
        port: u16,
        expected_ifs: &[String],
    ) -> Result<ActorRef, Error> {
        let info = self.connect_impl(host, port)?;
        let published = info.published.ok_or_else(|| {
            Error::with_context(
                ErrorCode::InvalidArgument,
                format!("no actor published on {host}:{port}"),
            )
        })?;
        if published.interfaces != expected_ifs {
            return Err(Error::with_context(
                ErrorCode::FieldTypeMismatch,
                format!(
                    "published interfaces {:?} do not match expected {:?}",
                    published.interfaces, expected_ifs
                ),
            ));
        }
        self.core.proxies.get_or_create(
            ActorAddr::new(info.node, info.process, published.actor_id),
            &self.core,
        )
    }

    fn connect_impl(&self, host: &str, port: u16) -> Result<HandshakeInfo, Error> {
        let stream = std::net::TcpStream::connect((host, port)).map_err(|err| {
            Error::with_context(
                ErrorCode::NetworkSyscallFailed,
                format!("connect to {host}:{port} failed: {err}"),
            )
        })?;
        stream.set_nodelay(true).map_err(syscall_failed)?;
        stream.set_nonblocking(true).map_err(syscall_failed)?;
        let stream = mio::net::TcpStream::from_std(stream);

        let (tx, rx) = bounded(1);
        let connection = BaspConnection::new_client(stream, Arc::clone(&self.core), tx);
        self.core.shared.start_manager(Box::new(connection))?;

        let deadline = self
            .core
            .connection_timeout
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        match rx.recv_timeout(deadline) {
            Ok(result) => {
                if let Ok(info) = &result {
                    debug!(target: "hive::basp", peer = %info.node, "connected");
                }
                result
            }
            Err(_) => Err(Error::with_context(
                ErrorCode::RequestTimeout,
                format!("handshake with {host}:{port} timed out"),
            )),
        }
    }

    /// Stop the reactor and join its thread. Proxies of connected peers
    /// are cancelled.
    pub(crate) fn stop(&self) {
        self.core.shared.shutdown();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
        debug!(target: "hive::basp", "middleman stopped");
    }

    /// Number of live remote proxies (diagnostics).
    pub fn proxy_count(&self) -> usize {
        self.core.proxies.len()
    }
}

fn syscall_failed(err: std::io::Error) -> Error {
    Error::with_context(ErrorCode::NetworkSyscallFailed, err.to_string())
}
