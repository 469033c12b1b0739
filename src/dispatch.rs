//! Inbound dispatch: engine threads deliver raw events here; decoded payloads
//! reach the registered handler and its boolean ack goes back to the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{self, DecodeError, Direction};
use crate::lifecycle::{EngineState, StateCell};
use crate::registry::{EventKind, Registry};

/// Point-in-time view of the dispatch diagnostics. Dropped events and decode
/// failures are swallowed at the boundary, so these counters are the only way
/// to observe them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounters {
    /// Events that arrived with no handler registered for their kind.
    pub dropped_discovery: u64,
    pub dropped_gossip: u64,
    pub dropped_rpc: u64,
    /// Events rejected because a text field was not valid UTF-8 or the rpc
    /// direction flag was out of range.
    pub decode_failures: u64,
    /// Events rejected because the engine was not in the Running state.
    pub rejected_not_running: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    dropped_discovery: AtomicU64,
    dropped_gossip: AtomicU64,
    dropped_rpc: AtomicU64,
    decode_failures: AtomicU64,
    rejected_not_running: AtomicU64,
}

impl DispatchStats {
    fn record_dropped(&self, kind: EventKind) {
        let slot = match kind {
            EventKind::Discovery => &self.dropped_discovery,
            EventKind::Gossip => &self.dropped_gossip,
            EventKind::Rpc => &self.dropped_rpc,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected_not_running.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchCounters {
        DispatchCounters {
            dropped_discovery: self.dropped_discovery.load(Ordering::Relaxed),
            dropped_gossip: self.dropped_gossip.load(Ordering::Relaxed),
            dropped_rpc: self.dropped_rpc.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            rejected_not_running: self.rejected_not_running.load(Ordering::Relaxed),
        }
    }
}

/// Entry points the engine calls from its own threads. Each call decodes the
/// raw fields, consults the registry, invokes the handler, and returns the
/// handler's boolean ack to the engine. Runs on whatever thread the engine
/// delivers from; no thread identity is assumed, and the handler's execution
/// time directly stalls that engine thread.
///
/// Events are never queued: no handler, a decode failure, or a not-running
/// engine drops the event (counted, `false` to the engine).
#[derive(Clone)]
pub struct InboundDispatch {
    registry: Arc<Registry>,
    state: Arc<StateCell>,
    stats: Arc<DispatchStats>,
}

impl InboundDispatch {
    pub(crate) fn new(
        registry: Arc<Registry>,
        state: Arc<StateCell>,
        stats: Arc<DispatchStats>,
    ) -> Self {
        InboundDispatch {
            registry,
            state,
            stats,
        }
    }

    /// The engine found a peer. Ack has no engine-side meaning beyond the
    /// shared boolean contract.
    pub fn discovered_peer(&self, peer: &[u8]) -> bool {
        if !self.accepting(EventKind::Discovery) {
            return false;
        }
        let peer = match codec::decode_text("peer id", peer) {
            Ok(p) => p,
            Err(e) => return self.decode_failed(EventKind::Discovery, e),
        };
        match self.registry.discovered_peer() {
            Some(handler) => handler(peer),
            None => self.dropped(EventKind::Discovery),
        }
    }

    /// A gossip message arrived. The ack feeds the engine's propagation
    /// decision; the bridge does not interpret it.
    pub fn receive_gossip(&self, topic: &[u8], message: &[u8]) -> bool {
        if !self.accepting(EventKind::Gossip) {
            return false;
        }
        let topic = match codec::decode_text("topic", topic) {
            Ok(t) => t,
            Err(e) => return self.decode_failed(EventKind::Gossip, e),
        };
        match self.registry.receive_gossip() {
            Some(handler) => handler(topic, message.to_vec()),
            None => self.dropped(EventKind::Gossip),
        }
    }

    /// An RPC request or response arrived from a peer.
    pub fn receive_rpc(&self, method: &[u8], direction: u8, peer: &[u8], message: &[u8]) -> bool {
        if !self.accepting(EventKind::Rpc) {
            return false;
        }
        let decoded = codec::decode_text("method", method).and_then(|method| {
            let direction = Direction::from_flag(direction)?;
            let peer = codec::decode_text("peer id", peer)?;
            Ok((method, direction, peer))
        });
        let (method, direction, peer) = match decoded {
            Ok(fields) => fields,
            Err(e) => return self.decode_failed(EventKind::Rpc, e),
        };
        match self.registry.receive_rpc() {
            Some(handler) => handler(method, direction, peer, message.to_vec()),
            None => self.dropped(EventKind::Rpc),
        }
    }

    fn accepting(&self, kind: EventKind) -> bool {
        let state = self.state.current();
        if state == EngineState::Running {
            true
        } else {
            self.stats.record_rejected();
            warn!(?kind, ?state, "dropping inbound event, engine not running");
            false
        }
    }

    fn decode_failed(&self, kind: EventKind, error: DecodeError) -> bool {
        self.stats.record_decode_failure();
        warn!(?kind, error = %error, "dropping undecodable inbound event");
        false
    }

    fn dropped(&self, kind: EventKind) -> bool {
        self.stats.record_dropped(kind);
        debug!(?kind, "dropping inbound event, no handler registered");
        false
    }
}
