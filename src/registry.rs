//! Handler registry: one replaceable slot per event kind, safe to swap while
//! engine threads dispatch concurrently.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::Direction;

/// The three inbound event classes the engine can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Discovery,
    Gossip,
    Rpc,
}

/// Invoked with a discovered peer id. The boolean is the ack returned to the engine.
pub type DiscoveredPeerHandler = dyn Fn(String) -> bool + Send + Sync;

/// Invoked with a decoded topic and the raw message bytes.
pub type ReceiveGossipHandler = dyn Fn(String, Vec<u8>) -> bool + Send + Sync;

/// Invoked with a decoded method, the request/response direction, the sending
/// peer, and the raw message bytes.
pub type ReceiveRpcHandler = dyn Fn(String, Direction, String, Vec<u8>) -> bool + Send + Sync;

/// Handler table consulted by the dispatch path. Slots start empty and are
/// overwritten, never appended: one discovery handler, one gossip handler, one
/// rpc handler per registry. Fan-out by topic or method is the handler's own
/// business.
///
/// Replacement is not synchronized with in-flight dispatch: a dispatch that
/// has already cloned the slot finishes with the handler it read. Readers see
/// either the old or the new handler, never a torn value.
#[derive(Default)]
pub struct Registry {
    discovered_peer: RwLock<Option<Arc<DiscoveredPeerHandler>>>,
    receive_gossip: RwLock<Option<Arc<ReceiveGossipHandler>>>,
    receive_rpc: RwLock<Option<Arc<ReceiveRpcHandler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register all three handlers at once, the shape the boundary exposes to
    /// foreign hosts. Last write wins.
    pub fn register_handlers(
        &self,
        discovered_peer: impl Fn(String) -> bool + Send + Sync + 'static,
        receive_gossip: impl Fn(String, Vec<u8>) -> bool + Send + Sync + 'static,
        receive_rpc: impl Fn(String, Direction, String, Vec<u8>) -> bool + Send + Sync + 'static,
    ) {
        self.register_discovered_peer(discovered_peer);
        self.register_receive_gossip(receive_gossip);
        self.register_receive_rpc(receive_rpc);
    }

    pub fn register_discovered_peer(
        &self,
        handler: impl Fn(String) -> bool + Send + Sync + 'static,
    ) {
        *self.discovered_peer.write() = Some(Arc::new(handler));
    }

    pub fn register_receive_gossip(
        &self,
        handler: impl Fn(String, Vec<u8>) -> bool + Send + Sync + 'static,
    ) {
        *self.receive_gossip.write() = Some(Arc::new(handler));
    }

    pub fn register_receive_rpc(
        &self,
        handler: impl Fn(String, Direction, String, Vec<u8>) -> bool + Send + Sync + 'static,
    ) {
        *self.receive_rpc.write() = Some(Arc::new(handler));
    }

    /// Current discovery handler, if any. The lock is released before the
    /// caller invokes the clone, so a handler may itself re-register.
    pub fn discovered_peer(&self) -> Option<Arc<DiscoveredPeerHandler>> {
        self.discovered_peer.read().clone()
    }

    pub fn receive_gossip(&self) -> Option<Arc<ReceiveGossipHandler>> {
        self.receive_gossip.read().clone()
    }

    pub fn receive_rpc(&self) -> Option<Arc<ReceiveRpcHandler>> {
        self.receive_rpc.read().clone()
    }
}
