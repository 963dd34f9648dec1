//! Interning registry for remote-actor proxies.
//!
//! At most one live proxy exists per remote address. Lookups take the
//! shared lock; insertion upgrades to exclusive with a double-check. A
//! proxy deregisters itself through an attachable when it terminates, and
//! `erase_all` cancels every proxy of a dead peer.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use parking_lot::RwLock;
use tracing::debug;

// Layer 3: Internal module imports
use super::basp::wire::encode_announce_proxy;
use super::middleman::MiddlemanCore;
use super::proxy::ActorProxy;
use crate::actor::cell::{AbstractActor, ActorRef};
use crate::error::{Error, ExitReason};
use crate::util::{ActorAddr, NodeId};

/// Map from remote address to live proxy.
pub(crate) struct ProxyRegistry {
    entries: RwLock<HashMap<ActorAddr, Weak<ActorProxy>>>,
}

impl ProxyRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the interned proxy for `addr`, creating (and announcing) it on
    /// first use.
    pub(crate) fn get_or_create(
        &self,
        addr: ActorAddr,
        mm: &Arc<MiddlemanCore>,
    ) -> Result<ActorRef, Error> {
        if let Some(existing) = self.entries.read().get(&addr).and_then(Weak::upgrade) {
            return Ok(ActorRef::from_arc(existing as Arc<dyn AbstractActor>));
        }
        let proxy = {
            let mut entries = self.entries.write();
            if let Some(existing) = entries.get(&addr).and_then(Weak::upgrade) {
                return Ok(ActorRef::from_arc(existing as Arc<dyn AbstractActor>));
            }
            let system = mm.system()?;
            let proxy = ActorProxy::new(addr, system, Arc::downgrade(mm));
            entries.insert(addr, Arc::downgrade(&proxy));
            proxy
        };
        // Self-deregistration on termination.
        let registry_owner = Arc::downgrade(mm);
        proxy.cell_ref().attach_fn(move |_reason: &ExitReason| {
            if let Some(mm) = registry_owner.upgrade() {
                mm.proxies().remove(addr);
            }
        });
        // Tell the peer we want exit notification for this actor.
        mm.send_frame(addr.node(), encode_announce_proxy(addr.actor()));
        debug!(target: "hive::basp", proxy = %addr, "proxy created");
        Ok(ActorRef::from_arc(proxy as Arc<dyn AbstractActor>))
    }

    /// Drop the registry entry (proxy cleanup path).
    pub(crate) fn remove(&self, addr: ActorAddr) {
        self.entries.write().remove(&addr);
    }

    /// Terminate the proxy for `addr` with `reason`.
    pub(crate) fn kill(&self, addr: ActorAddr, reason: ExitReason) {
        let proxy = self.entries.write().remove(&addr).and_then(|weak| weak.upgrade());
        if let Some(proxy) = proxy {
            proxy.finalize(reason);
        }
    }

    /// Terminate every proxy for `node` (peer death).
    pub(crate) fn erase_all(&self, node: NodeId, reason: &Error) {
        let victims: Vec<Arc<ActorProxy>> = {
            let mut entries = self.entries.write();
            let addrs: Vec<ActorAddr> = entries
                .keys()
                .filter(|addr| addr.node() == node)
                .copied()
                .collect();
            addrs
                .into_iter()
                .filter_map(|addr| entries.remove(&addr).and_then(|weak| weak.upgrade()))
                .collect()
        };
        for proxy in victims {
            proxy.finalize(ExitReason::Abnormal(reason.clone()));
        }
    }

    /// Number of live proxies (diagnostics).
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
