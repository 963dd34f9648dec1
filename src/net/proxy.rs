//! Remote-actor proxies.
//!
//! A proxy is a local stand-in carrying the remote actor's address.
//! Enqueueing serializes the mailbox element into a BASP direct-message
//! frame and hands it to the peer connection; the proxy's own mailbox
//! stays empty and only its control block (links, monitors, exit reason)
//! is live.

// Layer 1: Standard library imports
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use tracing::{trace, warn};

// Layer 3: Internal module imports
use super::basp::wire::encode_direct_message;
use super::middleman::MiddlemanCore;
use crate::actor::cell::{run_exit_hooks, AbstractActor, ActorCell};
use crate::actor::scheduled::bounce_element;
use crate::error::ExitReason;
use crate::mailbox::{EnqueueResult, MailboxElement};
use crate::system::actor_system::SystemCore;
use crate::util::ActorAddr;

/// Local stand-in for an actor on another node.
pub(crate) struct ActorProxy {
    cell: ActorCell,
    mm: Weak<MiddlemanCore>,
}

impl ActorProxy {
    pub(crate) fn new(
        addr: ActorAddr,
        system: Arc<SystemCore>,
        mm: Weak<MiddlemanCore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cell: ActorCell::new(addr, "remote.proxy", system),
            mm,
        })
    }

    pub(crate) fn cell_ref(&self) -> &ActorCell {
        &self.cell
    }

    /// Terminate the proxy: exit signals flow to links and monitors as if
    /// the remote actor died locally.
    pub(crate) fn finalize(&self, reason: ExitReason) {
        if self.cell.set_exit_reason(reason) {
            let reason = self.cell.exit_reason().unwrap_or_default();
            trace!(
                target: "hive::basp",
                proxy = %self.cell.addr(),
                %reason,
                "proxy terminated"
            );
            let bounce = reason.to_error();
            self.cell
                .mailbox()
                .close(|element| bounce_element(element, &bounce));
            run_exit_hooks(&self.cell);
        }
    }
}

impl AbstractActor for ActorProxy {
    fn cell(&self) -> &ActorCell {
        &self.cell
    }

    fn enqueue(&self, element: Box<MailboxElement>) -> EnqueueResult {
        if self.cell.is_terminated() {
            let reason = self.cell.exit_reason().unwrap_or_default();
            bounce_element(element, &reason.to_error());
            return EnqueueResult::QueueClosed;
        }
        let Some(mm) = self.mm.upgrade() else {
            return EnqueueResult::QueueClosed;
        };
        let source = element
            .sender
            .as_ref()
            .map(|sender| sender.addr().actor())
            .unwrap_or(0);
        let dest = self.cell.addr().actor();
        match encode_direct_message(element.mid, source, dest, None, &element.payload) {
            Ok(frame) => {
                mm.send_frame(self.cell.addr().node(), frame);
                EnqueueResult::Success
            }
            Err(err) => {
                warn!(
                    target: "hive::basp",
                    proxy = %self.cell.addr(),
                    %err,
                    "dropping unserializable outbound message"
                );
                // The sender observes the failure only when it awaited a
                // response.
                bounce_element(element, &err);
                EnqueueResult::Success
            }
        }
    }
}
