//! The socket-manager seam between the reactor and protocol code.
//!
//! A socket manager binds a file descriptor to an event handler. Handlers
//! never mutate the reactor's tables directly: interest changes go into
//! the deferred `updates` map and new managers into the `cmds` list, both
//! applied by the reactor between events.

// Layer 1: Standard library imports
use std::any::Any;
use std::collections::HashMap;
use std::time::Instant;

// Layer 2: Third-party crate imports
use mio::{Interest, Registry};

// Layer 3: Internal module imports
use crate::error::Error;

/// Deferred commands produced during event dispatch.
pub(crate) enum ReactorCmd {
    /// Attach a freshly created manager (e.g. an accepted connection).
    AddManager(Box<dyn SocketManager>),
}

/// What the reactor should do with a manager after an event.
pub(crate) enum ManagerAction {
    /// Keep polling.
    Keep,
    /// Deregister and dispose, optionally recording the cause.
    Close(Option<Error>),
}

/// Context handed to manager callbacks.
pub(crate) struct ReactorCtx<'a> {
    /// Registry for (re)registering event sources.
    pub registry: &'a Registry,
    /// Poll-iteration timestamp.
    pub now: Instant,
    /// Deferred manager additions.
    pub cmds: &'a mut Vec<ReactorCmd>,
    /// Deferred interest changes, keyed by slab key.
    pub updates: &'a mut HashMap<usize, Interest>,
}

/// Binds a file descriptor to protocol logic.
pub(crate) trait SocketManager: Send {
    /// Called once after the manager lands in the reactor's table.
    fn start(&mut self, key: usize, ctx: &mut ReactorCtx<'_>) -> Result<(), Error>;

    /// The descriptor became readable.
    fn handle_read_event(&mut self, key: usize, ctx: &mut ReactorCtx<'_>) -> ManagerAction;

    /// The descriptor became writable.
    fn handle_write_event(&mut self, key: usize, ctx: &mut ReactorCtx<'_>) -> ManagerAction;

    /// A deadline reported via [`next_deadline`](Self::next_deadline)
    /// passed.
    fn handle_timeout(&mut self, key: usize, ctx: &mut ReactorCtx<'_>) -> ManagerAction {
        let _ = (key, ctx);
        ManagerAction::Keep
    }

    /// The next instant this manager wants a timeout callback.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Dispose: deregister the source and notify upper layers.
    fn stop(&mut self, registry: &Registry, reason: Option<&Error>);

    /// The registered event source, for deferred re-registration.
    fn source_mut(&mut self) -> &mut dyn mio::event::Source;

    /// Downcast support for reactor-thread actions.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
