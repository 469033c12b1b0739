//! Outbound gateway: application sends into the engine, gated on the Running state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{Direction, Method, PeerId, Topic};
use crate::engine::Engine;
use crate::lifecycle::{EngineState, LifecycleError, StateCell};

/// Fire side of the bridge. Sends are fire-and-forget: the only per-call
/// failure is a lifecycle violation. An engine-side send failure is a
/// process-wide concern, logged and never returned to the caller.
#[derive(Clone)]
pub struct Gateway {
    engine: Arc<dyn Engine>,
    state: Arc<StateCell>,
}

impl Gateway {
    pub(crate) fn new(engine: Arc<dyn Engine>, state: Arc<StateCell>) -> Self {
        Gateway { engine, state }
    }

    /// Publish `message` under `topic` on the gossip overlay. No delivery
    /// guarantee is made to the caller.
    pub fn send_gossip(&self, topic: &Topic, message: &[u8]) -> Result<(), LifecycleError> {
        self.state.require(EngineState::Running)?;
        debug!(topic = ?topic, len = message.len(), "publishing gossip message");
        if let Err(e) = self.engine.publish(topic, message) {
            warn!(error = %e, "could not publish gossip message");
        }
        Ok(())
    }

    /// Send an RPC message for `method` to `peer`, with the explicit
    /// request/response direction.
    pub fn send_rpc(
        &self,
        method: &Method,
        direction: Direction,
        peer: &PeerId,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.state.require(EngineState::Running)?;
        debug!(method = ?method, ?direction, len = message.len(), "sending rpc message");
        if let Err(e) = self.engine.send_rpc(method, direction, peer, message) {
            warn!(error = %e, "could not send rpc message");
        }
        Ok(())
    }

    pub fn send_rpc_request(
        &self,
        method: &Method,
        peer: &PeerId,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.send_rpc(method, Direction::Request, peer, message)
    }

    pub fn send_rpc_response(
        &self,
        method: &Method,
        peer: &PeerId,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.send_rpc(method, Direction::Response, peer, message)
    }
}
