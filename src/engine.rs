//! The engine seam: the native peer-to-peer component behind a trait.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{Direction, Method, PeerId, Topic};
use crate::config::{ClientIdentity, EngineConfig};
use crate::dispatch::InboundDispatch;
use crate::lifecycle::Ready;

/// Everything the engine is handed at start: who it runs as, how it is
/// configured, where to deliver inbound events, and how to signal that the
/// overlay is accepting traffic.
pub struct RunContext {
    pub identity: ClientIdentity,
    pub config: EngineConfig,
    pub inbound: InboundDispatch,
    pub ready: Ready,
}

/// A failure inside the native engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine failed to start: {0}")]
    Startup(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("rpc send failed: {0}")]
    Rpc(String),
    #[error("shutdown failed: {0}")]
    Shutdown(String),
}

/// The native peer-to-peer engine. Peer discovery, gossip dissemination, RPC
/// transport, connection handling, and identity all live behind this seam;
/// the bridge only drives it and observes it.
pub trait Engine: Send + Sync {
    /// Run the engine. Blocks the calling thread for the engine's entire
    /// running lifetime. Implementations call `ctx.ready.signal()` once the
    /// overlay accepts traffic, and deliver inbound events through
    /// `ctx.inbound` from their own threads.
    fn run(&self, ctx: RunContext) -> Result<(), EngineError>;

    /// Publish a gossip message. Valid only while running.
    fn publish(&self, topic: &Topic, message: &[u8]) -> Result<(), EngineError>;

    /// Send an RPC request or response to a peer. Valid only while running.
    fn send_rpc(
        &self,
        method: &Method,
        direction: Direction,
        peer: &PeerId,
        message: &[u8],
    ) -> Result<(), EngineError>;

    /// Ask a running engine to wind down; `run` returns once it has.
    fn shutdown(&self) -> Result<(), EngineError>;
}

// One engine per process for foreign hosts.
static INSTALLED: Mutex<Option<Arc<dyn Engine>>> = Mutex::new(None);

/// Install the process-wide engine the C boundary binds to. The engine
/// component calls this when it is loaded.
pub fn install(engine: Arc<dyn Engine>) {
    *INSTALLED.lock() = Some(engine);
}

/// Claim the installed engine. `None` means the native component never loaded.
pub fn take_installed() -> Option<Arc<dyn Engine>> {
    INSTALLED.lock().take()
}
