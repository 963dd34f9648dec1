//! The I/O multiplexer: a poll-loop reactor with a self-pipe for
//! cross-thread signaling.
//!
//! The reactor thread owns every socket. Other threads communicate
//! exclusively through 9-byte control frames written to the self-pipe:
//! one opcode byte plus a `u64` handle that keys into a shared pending
//! map holding the actual payload (a boxed manager or an action closure).
//! Registration changes requested during event dispatch are deferred and
//! applied between events, which keeps the poll set stable while it is
//! being iterated.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use byteorder::{BigEndian, ByteOrder};
use mio::unix::pipe;
use mio::{Events, Interest, Poll, Token};
use parking_lot::Mutex;
use slab::Slab;
use tracing::{debug, error, trace, warn};

// Layer 3: Internal module imports
use super::socket_manager::{ManagerAction, ReactorCmd, ReactorCtx, SocketManager};
use crate::error::{Error, ErrorCode};

/// Token of the self-pipe read end; managers start at `Token(1)`.
const TOKEN_PIPE: Token = Token(0);

const OP_START_MANAGER: u8 = 0;
const OP_RUN_ACTION: u8 = 1;
const OP_SHUTDOWN: u8 = 2;

const CTRL_FRAME_SIZE: usize = 9;

/// An action executed on the reactor thread.
pub(crate) type ReactorAction = Box<dyn FnOnce(&mut Reactor) + Send>;

enum CtrlPayload {
    Manager(Box<dyn SocketManager>),
    Action(ReactorAction),
}

/// Cross-thread handle to the reactor.
pub(crate) struct MpxShared {
    pipe_tx: Mutex<pipe::Sender>,
    pending: Mutex<HashMap<u64, CtrlPayload>>,
    next_handle: AtomicU64,
    down: AtomicBool,
}

impl MpxShared {
    /// Attach a new socket manager and start it in the reactor thread.
    pub(crate) fn start_manager(&self, manager: Box<dyn SocketManager>) -> Result<(), Error> {
        self.submit(OP_START_MANAGER, Some(CtrlPayload::Manager(manager)))
    }

    /// Execute `action` in the reactor thread.
    pub(crate) fn run_action(
        &self,
        action: impl FnOnce(&mut Reactor) + Send + 'static,
    ) -> Result<(), Error> {
        self.submit(OP_RUN_ACTION, Some(CtrlPayload::Action(Box::new(action))))
    }

    /// Ask the reactor to dispose all managers and exit.
    pub(crate) fn shutdown(&self) {
        let _ = self.submit(OP_SHUTDOWN, None);
    }

    fn submit(&self, op: u8, payload: Option<CtrlPayload>) -> Result<(), Error> {
        if self.down.load(Ordering::Acquire) {
            return Err(Error::with_context(
                ErrorCode::RuntimeError,
                "multiplexer is down",
            ));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        if let Some(payload) = payload {
            self.pending.lock().insert(handle, payload);
        }
        let mut frame = [0u8; CTRL_FRAME_SIZE];
        frame[0] = op;
        BigEndian::write_u64(&mut frame[1..], handle);

        let mut tx = self.pipe_tx.lock();
        let mut written = 0;
        let mut stalls = 0u32;
        while written < CTRL_FRAME_SIZE {
            match tx.write(&frame[written..]) {
                Ok(n) => written += n,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    // Pipe full: the reactor is behind. Back off briefly.
                    stalls += 1;
                    if stalls > 1000 {
                        self.pending.lock().remove(&handle);
                        return Err(Error::with_context(
                            ErrorCode::NetworkSyscallFailed,
                            "control pipe congested",
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.pending.lock().remove(&handle);
                    return Err(Error::with_context(
                        ErrorCode::NetworkSyscallFailed,
                        format!("control pipe write failed: {err}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Reactor state, confined to the multiplexer thread.
pub(crate) struct Reactor {
    poll: Poll,
    pipe_rx: pipe::Receiver,
    shared: Arc<MpxShared>,
    managers: Slab<Box<dyn SocketManager>>,
    ctrl_buf: Vec<u8>,
}

/// Create the shared handle plus the reactor it controls.
pub(crate) fn create() -> Result<(Arc<MpxShared>, Reactor), Error> {
    let poll = Poll::new().map_err(io_error)?;
    let (tx, mut rx) = pipe::new().map_err(io_error)?;
    poll.registry()
        .register(&mut rx, TOKEN_PIPE, Interest::READABLE)
        .map_err(io_error)?;
    let shared = Arc::new(MpxShared {
        pipe_tx: Mutex::new(tx),
        pending: Mutex::new(HashMap::new()),
        next_handle: AtomicU64::new(1),
        down: AtomicBool::new(false),
    });
    let reactor = Reactor {
        poll,
        pipe_rx: rx,
        shared: Arc::clone(&shared),
        managers: Slab::new(),
        ctrl_buf: Vec::new(),
    };
    Ok((shared, reactor))
}

fn io_error(err: std::io::Error) -> Error {
    Error::with_context(
        ErrorCode::NetworkSyscallFailed,
        format!("multiplexer setup failed: {err}"),
    )
}

impl Reactor {
    /// The poll loop. Runs until a shutdown frame arrives or a fatal poll
    /// error occurs.
    pub(crate) fn run(mut self) {
        debug!(target: "hive::mpx", "reactor running");
        let mut events = Events::with_capacity(128);
        loop {
            let timeout = self.next_timeout();
            match self.poll.poll(&mut events, timeout) {
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::OutOfMemory => {
                    warn!(target: "hive::mpx", "poll reported ENOMEM, backing off");
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                Err(err) => {
                    error!(target: "hive::mpx", %err, "fatal poll error");
                    break;
                }
                Ok(()) => {}
            }
            let mut shutdown = false;
            for event in events.iter() {
                if event.token() == TOKEN_PIPE {
                    if !self.drain_control() {
                        shutdown = true;
                        break;
                    }
                } else {
                    self.dispatch_event(event.token(), event.is_readable(), event.is_writable());
                }
            }
            if shutdown {
                break;
            }
            self.run_timeouts();
        }
        self.dispose_all();
        self.shared.down.store(true, Ordering::Release);
        self.shared.pending.lock().clear();
        debug!(target: "hive::mpx", "reactor stopped");
    }

    /// Append a frame to a connection's write buffer; used by actions
    /// marshalled from other threads.
    pub(crate) fn conn_write(&mut self, key: usize, frame: Vec<u8>) {
        let result = {
            let registry = self.poll.registry();
            match self.managers.get_mut(key) {
                Some(manager) => {
                    match manager
                        .as_any_mut()
                        .downcast_mut::<super::basp::BaspConnection>()
                    {
                        Some(conn) => conn.queue_and_flush(key, registry, frame),
                        None => {
                            warn!(target: "hive::mpx", key, "conn_write on a non-connection manager");
                            Ok(())
                        }
                    }
                }
                None => {
                    trace!(target: "hive::mpx", key, "conn_write on a vanished connection");
                    Ok(())
                }
            }
        };
        if let Err(err) = result {
            self.remove_manager(key, Some(err));
        }
    }

    /// Re-run the read handler for one manager. Used as a self-posted
    /// continuation when a connection parks its read budget with data
    /// still pending: the poll backend is edge-triggered, so giving up
    /// before `WouldBlock` must not rely on another readiness event.
    pub(crate) fn poke_read(&mut self, key: usize) {
        self.dispatch_event(Token(key + 1), true, false);
    }

    /// Deregister and dispose one manager.
    pub(crate) fn remove_manager(&mut self, key: usize, reason: Option<Error>) {
        if self.managers.contains(key) {
            let mut manager = self.managers.remove(key);
            manager.stop(self.poll.registry(), reason.as_ref());
        }
    }

    fn dispatch_event(&mut self, token: Token, readable: bool, writable: bool) {
        let key = token.0 - 1;
        let mut cmds = Vec::new();
        let mut updates = HashMap::new();
        let mut action = ManagerAction::Keep;
        {
            let registry = self.poll.registry();
            let Some(manager) = self.managers.get_mut(key) else {
                return;
            };
            let mut ctx = ReactorCtx {
                registry,
                now: Instant::now(),
                cmds: &mut cmds,
                updates: &mut updates,
            };
            if readable {
                action = manager.handle_read_event(key, &mut ctx);
            }
            if matches!(action, ManagerAction::Keep) && writable {
                action = manager.handle_write_event(key, &mut ctx);
            }
        }
        if let ManagerAction::Close(reason) = action {
            self.remove_manager(key, reason);
        }
        self.apply_updates(cmds, updates);
    }

    /// Apply deferred registration changes between events.
    fn apply_updates(&mut self, cmds: Vec<ReactorCmd>, updates: HashMap<usize, Interest>) {
        for (key, interest) in updates {
            let registry = self.poll.registry();
            if let Some(manager) = self.managers.get_mut(key) {
                let token = Token(key + 1);
                if let Err(err) = registry.reregister(manager.source_mut(), token, interest) {
                    warn!(target: "hive::mpx", key, %err, "reregister failed");
                }
            }
        }
        for cmd in cmds {
            match cmd {
                ReactorCmd::AddManager(manager) => self.insert_manager(manager),
            }
        }
    }

    fn insert_manager(&mut self, manager: Box<dyn SocketManager>) {
        let key = self.managers.insert(manager);
        let mut cmds = Vec::new();
        let mut updates = HashMap::new();
        let started = {
            let registry = self.poll.registry();
            let mut ctx = ReactorCtx {
                registry,
                now: Instant::now(),
                cmds: &mut cmds,
                updates: &mut updates,
            };
            // Freshly inserted; the slab key is valid.
            match self.managers.get_mut(key) {
                Some(manager) => manager.start(key, &mut ctx),
                None => Ok(()),
            }
        };
        if let Err(err) = started {
            warn!(target: "hive::mpx", key, %err, "manager failed to start");
            self.remove_manager(key, Some(err));
        }
        self.apply_updates(cmds, updates);
    }

    /// Read and execute control frames. Returns `false` on shutdown.
    fn drain_control(&mut self) -> bool {
        let mut chunk = [0u8; 256];
        loop {
            match self.pipe_rx.read(&mut chunk) {
                Ok(0) => return false,
                Ok(n) => self.ctrl_buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(target: "hive::mpx", %err, "control pipe read failed");
                    return false;
                }
            }
        }
        while self.ctrl_buf.len() >= CTRL_FRAME_SIZE {
            let op = self.ctrl_buf[0];
            let handle = BigEndian::read_u64(&self.ctrl_buf[1..CTRL_FRAME_SIZE]);
            self.ctrl_buf.drain(..CTRL_FRAME_SIZE);
            let payload = self.shared.pending.lock().remove(&handle);
            match (op, payload) {
                (OP_START_MANAGER, Some(CtrlPayload::Manager(manager))) => {
                    self.insert_manager(manager);
                }
                (OP_RUN_ACTION, Some(CtrlPayload::Action(action))) => action(self),
                (OP_SHUTDOWN, _) => return false,
                (op, _) => {
                    warn!(target: "hive::mpx", op, handle, "dangling control frame");
                }
            }
        }
        true
    }

    fn next_timeout(&self) -> Option<Duration> {
        let now = Instant::now();
        self.managers
            .iter()
            .filter_map(|(_, manager)| manager.next_deadline())
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn run_timeouts(&mut self) {
        let now = Instant::now();
        let due: Vec<usize> = self
            .managers
            .iter()
            .filter(|(_, manager)| {
                manager
                    .next_deadline()
                    .map(|deadline| deadline <= now)
                    .unwrap_or(false)
            })
            .map(|(key, _)| key)
            .collect();
        for key in due {
            let mut cmds = Vec::new();
            let mut updates = HashMap::new();
            let action = {
                let registry = self.poll.registry();
                let Some(manager) = self.managers.get_mut(key) else {
                    continue;
                };
                let mut ctx = ReactorCtx {
                    registry,
                    now,
                    cmds: &mut cmds,
                    updates: &mut updates,
                };
                manager.handle_timeout(key, &mut ctx)
            };
            if let ManagerAction::Close(reason) = action {
                self.remove_manager(key, reason);
            }
            self.apply_updates(cmds, updates);
        }
    }

    fn dispose_all(&mut self) {
        let keys: Vec<usize> = self.managers.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.remove_manager(key, None);
        }
    }
}
