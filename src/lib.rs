//! Hypha: in-process bridge between an embedding application and a native
//! peer-to-peer engine (gossip, RPC, peer discovery).
//! The engine delivers inbound events through [`InboundDispatch`] on its own
//! threads; the application registers handlers and sends through [`HyphaCore`].

pub mod codec;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod ffi;
pub mod gateway;
pub mod lifecycle;
pub mod registry;

pub use crate::codec::{DecodeError, Direction, Method, PeerId, Topic};
pub use crate::config::{ClientIdentity, ConfigError, EngineConfig};
pub use crate::core::{BridgeError, HyphaCore};
pub use crate::dispatch::{DispatchCounters, InboundDispatch};
pub use crate::engine::{Engine, EngineError, RunContext};
pub use crate::gateway::Gateway;
pub use crate::lifecycle::{EngineState, LifecycleError, Ready};
pub use crate::registry::{EventKind, Registry};
