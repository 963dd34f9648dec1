//! Listener manager: accepts connections for a published port.

// Layer 1: Standard library imports
use std::any::Any;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use mio::net::TcpListener;
use mio::{Interest, Registry, Token};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::basp::BaspConnection;
use super::middleman::MiddlemanCore;
use super::socket_manager::{ManagerAction, ReactorCmd, ReactorCtx, SocketManager};
use crate::error::{Error, ErrorCode};

/// Accepts inbound connections and spawns a [`BaspConnection`] per peer.
pub(crate) struct AcceptManager {
    listener: TcpListener,
    mm: Arc<MiddlemanCore>,
    port: u16,
}

impl AcceptManager {
    pub(crate) fn new(listener: TcpListener, mm: Arc<MiddlemanCore>, port: u16) -> Self {
        Self { listener, mm, port }
    }
}

impl SocketManager for AcceptManager {
    fn start(&mut self, key: usize, ctx: &mut ReactorCtx<'_>) -> Result<(), Error> {
        ctx.registry
            .register(&mut self.listener, Token(key + 1), Interest::READABLE)
            .map_err(|err| {
                Error::with_context(
                    ErrorCode::NetworkSyscallFailed,
                    format!("listener register failed: {err}"),
                )
            })?;
        self.mm.note_listener_key(self.port, key);
        debug!(target: "hive::basp", port = self.port, "listening");
        Ok(())
    }

    fn handle_read_event(&mut self, _key: usize, ctx: &mut ReactorCtx<'_>) -> ManagerAction {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(target: "hive::basp", %peer, port = self.port, "accepted connection");
                    let _ = stream.set_nodelay(true);
                    let published = self.mm.published_info(self.port);
                    let connection =
                        BaspConnection::new_server(stream, Arc::clone(&self.mm), published);
                    ctx.cmds.push(ReactorCmd::AddManager(Box::new(connection)));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(target: "hive::basp", port = self.port, %err, "accept failed");
                    break;
                }
            }
        }
        ManagerAction::Keep
    }

    fn handle_write_event(&mut self, _key: usize, _ctx: &mut ReactorCtx<'_>) -> ManagerAction {
        ManagerAction::Keep
    }

    fn stop(&mut self, registry: &Registry, _reason: Option<&Error>) {
        let _ = registry.deregister(&mut self.listener);
        self.mm.clear_listener_key(self.port);
        debug!(target: "hive::basp", port = self.port, "listener closed");
    }

    fn source_mut(&mut self) -> &mut dyn mio::event::Source {
        &mut self.listener
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
