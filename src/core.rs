//! Bridge coordinator: owns the engine handle, the lifecycle state machine,
//! the handler registry, and the dispatch diagnostics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::codec::{Direction, Method, PeerId, Topic};
use crate::config::{ClientIdentity, ConfigError, EngineConfig};
use crate::dispatch::{DispatchCounters, DispatchStats, InboundDispatch};
use crate::engine::{Engine, EngineError, RunContext};
use crate::gateway::Gateway;
use crate::lifecycle::{EngineState, LifecycleError, Ready, StateCell};
use crate::registry::Registry;

/// Top-level failure of a bridge operation.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The engine's native component failed to load, initialize, or survive.
    /// No engine means no further functionality; the foreign-host glue treats
    /// this as fatal to the process.
    #[error("engine link failure: {0}")]
    Link(#[source] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A second `start` raced an in-flight one; the engine is a singleton.
    #[error("start already in progress")]
    AlreadyStarting,
}

/// The application-facing bridge to one engine instance.
///
/// Lifecycle: `init` moves Uninitialized -> Initialized, `start` hands the
/// engine its run context and blocks, and the engine itself signals the
/// Initialized -> Running transition once the overlay accepts traffic.
/// Outbound and inbound traffic are valid only while Running; Stopped is
/// terminal.
pub struct HyphaCore {
    engine: Arc<dyn Engine>,
    registry: Arc<Registry>,
    state: Arc<StateCell>,
    stats: Arc<DispatchStats>,
    gateway: Gateway,
    starting: AtomicBool,
}

impl HyphaCore {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self::with_registry(Arc::new(engine), Arc::new(Registry::new()))
    }

    /// Build over an existing registry, so handlers registered before the
    /// bridge exists (the foreign-host pattern) are honored.
    pub fn with_registry(engine: Arc<dyn Engine>, registry: Arc<Registry>) -> Self {
        let state = Arc::new(StateCell::new());
        let gateway = Gateway::new(engine.clone(), state.clone());
        HyphaCore {
            engine,
            registry,
            state,
            stats: Arc::new(DispatchStats::default()),
            gateway,
            starting: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> EngineState {
        self.state.current()
    }

    /// Dispatch diagnostics: dropped events, decode failures, rejections.
    pub fn counters(&self) -> DispatchCounters {
        self.stats.snapshot()
    }

    /// The entry points the engine delivers inbound events through. `start`
    /// hands the engine its own copy; this accessor exists for engines
    /// embedded in the same process and for tests.
    pub fn inbound(&self) -> InboundDispatch {
        InboundDispatch::new(self.registry.clone(), self.state.clone(), self.stats.clone())
    }

    /// Initialize the bridge. Not idempotent: a second call fails fast.
    pub fn init(&self) -> Result<(), LifecycleError> {
        self.state
            .transition(EngineState::Uninitialized, EngineState::Initialized)?;
        info!("bridge initialized");
        Ok(())
    }

    /// Run the engine. BLOCKS the calling thread for the engine's full
    /// running lifetime; callers needing concurrent application logic must
    /// invoke this from a dedicated thread.
    ///
    /// `client_constants` is `[name, version, protocol-suite]` identification
    /// metadata; `args` is a process-style argument vector whose first
    /// element is conventionally the invoking program's name. When the run
    /// loop returns the bridge is Stopped, successfully or not.
    pub fn start(&self, client_constants: &[String], args: &[String]) -> Result<(), BridgeError> {
        self.state.require(EngineState::Initialized)?;
        if self.starting.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::AlreadyStarting);
        }
        let identity = ClientIdentity::from_constants(client_constants);
        let config = match EngineConfig::load(args) {
            Ok(config) => config,
            Err(e) => {
                // Leave the bridge startable again; bad args are recoverable.
                self.starting.store(false, Ordering::Release);
                return Err(BridgeError::Config(e));
            }
        };
        info!(client = %identity.user_agent(), "starting engine");
        let ctx = RunContext {
            identity,
            config,
            inbound: self.inbound(),
            ready: Ready::new(self.state.clone()),
        };
        let result = self.engine.run(ctx);
        self.state.force(EngineState::Stopped);
        match result {
            Ok(()) => {
                info!("engine stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "engine run loop failed");
                Err(BridgeError::Link(e))
            }
        }
    }

    /// Ask a running engine to wind down. The blocked `start` returns once
    /// the run loop exits; Stopped is terminal and non-resumable.
    pub fn stop(&self) -> Result<(), BridgeError> {
        self.state.require(EngineState::Running)?;
        self.engine.shutdown().map_err(BridgeError::Link)?;
        self.state.force(EngineState::Stopped);
        info!("engine shutdown requested");
        Ok(())
    }

    pub fn send_gossip(
        &self,
        topic: impl Into<Topic>,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.gateway.send_gossip(&topic.into(), message)
    }

    pub fn send_rpc(
        &self,
        method: impl Into<Method>,
        direction: Direction,
        peer: impl Into<PeerId>,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.gateway
            .send_rpc(&method.into(), direction, &peer.into(), message)
    }

    pub fn send_rpc_request(
        &self,
        method: impl Into<Method>,
        peer: impl Into<PeerId>,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.send_rpc(method, Direction::Request, peer, message)
    }

    pub fn send_rpc_response(
        &self,
        method: impl Into<Method>,
        peer: impl Into<PeerId>,
        message: &[u8],
    ) -> Result<(), LifecycleError> {
        self.send_rpc(method, Direction::Response, peer, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::time::{Duration, Instant};

    /// Engine double: optionally signals ready, records outbound traffic, and
    /// blocks its run loop until shutdown (or the test unblocks it).
    struct MockEngine {
        signal_ready: bool,
        fail_startup: bool,
        entered_run: AtomicBool,
        seen_identity: Mutex<Option<ClientIdentity>>,
        published: Mutex<Vec<(Topic, Vec<u8>)>>,
        rpc: Mutex<Vec<(Method, Direction, PeerId, Vec<u8>)>>,
        stop_rx: Mutex<Option<Receiver<()>>>,
        stop_tx: Mutex<Option<Sender<()>>>,
    }

    impl MockEngine {
        fn new(signal_ready: bool) -> Self {
            let (tx, rx) = channel();
            MockEngine {
                signal_ready,
                fail_startup: false,
                entered_run: AtomicBool::new(false),
                seen_identity: Mutex::new(None),
                published: Mutex::new(Vec::new()),
                rpc: Mutex::new(Vec::new()),
                stop_rx: Mutex::new(Some(rx)),
                stop_tx: Mutex::new(Some(tx)),
            }
        }

        fn failing() -> Self {
            let mut engine = MockEngine::new(false);
            engine.fail_startup = true;
            engine
        }

        /// Unblock the run loop without going through `shutdown`.
        fn release(&self) {
            self.stop_tx.lock().take();
        }
    }

    impl Engine for MockEngine {
        fn run(&self, ctx: RunContext) -> Result<(), EngineError> {
            if self.fail_startup {
                return Err(EngineError::Startup("native component missing".into()));
            }
            self.entered_run.store(true, Ordering::SeqCst);
            *self.seen_identity.lock() = Some(ctx.identity.clone());
            if self.signal_ready {
                ctx.ready.signal();
            }
            let rx = self.stop_rx.lock().take();
            if let Some(rx) = rx {
                // Blocks until shutdown drops the sender.
                let _ = rx.recv();
            }
            Ok(())
        }

        fn publish(&self, topic: &Topic, message: &[u8]) -> Result<(), EngineError> {
            self.published
                .lock()
                .push((topic.clone(), message.to_vec()));
            Ok(())
        }

        fn send_rpc(
            &self,
            method: &Method,
            direction: Direction,
            peer: &PeerId,
            message: &[u8],
        ) -> Result<(), EngineError> {
            self.rpc
                .lock()
                .push((method.clone(), direction, peer.clone(), message.to_vec()));
            Ok(())
        }

        fn shutdown(&self) -> Result<(), EngineError> {
            self.stop_tx.lock().take();
            Ok(())
        }
    }

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn core_over(engine: Arc<MockEngine>) -> Arc<HyphaCore> {
        Arc::new(HyphaCore::with_registry(
            engine,
            Arc::new(Registry::new()),
        ))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn init_twice_fails_fast() {
        let core = core_over(Arc::new(MockEngine::new(true)));
        core.init().unwrap();
        assert!(core.init().is_err());
    }

    #[test]
    fn start_without_init_fails() {
        let core = core_over(Arc::new(MockEngine::new(true)));
        let err = core.start(&[], &strings(&["./app"])).unwrap_err();
        assert!(matches!(err, BridgeError::Lifecycle(_)));
    }

    #[test]
    fn send_before_init_fails() {
        let core = core_over(Arc::new(MockEngine::new(true)));
        let err = core.send_gossip("t1", b"hello").unwrap_err();
        assert_eq!(err.required, EngineState::Running);
        assert_eq!(err.actual, EngineState::Uninitialized);
    }

    #[test]
    fn gossip_before_engine_signals_running_fails() {
        let engine = Arc::new(MockEngine::new(false));
        let core = core_over(engine.clone());
        core.init().unwrap();

        let runner = {
            let core = core.clone();
            std::thread::spawn(move || {
                core.start(
                    &strings(&["app", "v1", "suite"]),
                    &strings(&["./app"]),
                )
            })
        };
        wait_for(|| engine.entered_run.load(Ordering::SeqCst));

        // The engine never signalled ready, so the bridge is not Running.
        let err = core.send_gossip("t1", b"hello").unwrap_err();
        assert_eq!(err.required, EngineState::Running);
        assert_eq!(err.actual, EngineState::Initialized);
        assert!(engine.published.lock().is_empty());

        engine.release();
        runner.join().unwrap().unwrap();
        assert_eq!(core.state(), EngineState::Stopped);
    }

    #[test]
    fn start_runs_engine_and_traffic_flows() {
        let engine = Arc::new(MockEngine::new(true));
        let core = core_over(engine.clone());
        core.init().unwrap();

        let runner = {
            let core = core.clone();
            std::thread::spawn(move || {
                core.start(
                    &strings(&["app", "v1", "suite"]),
                    &strings(&["./app", "--port", "9500"]),
                )
            })
        };
        wait_for(|| core.state() == EngineState::Running);

        core.send_gossip("t1", b"hello").unwrap();
        core.send_rpc_request("PING", "peer-42", b"?").unwrap();

        core.stop().unwrap();
        runner.join().unwrap().unwrap();
        assert_eq!(core.state(), EngineState::Stopped);

        let identity = engine.seen_identity.lock().clone().unwrap();
        assert_eq!(identity.client_name, "app");
        assert_eq!(identity.client_version, "v1");
        assert_eq!(identity.protocol_suite, "suite");

        let published = engine.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, Topic::from("t1"));
        assert_eq!(published[0].1, b"hello");
        let rpc = engine.rpc.lock();
        assert_eq!(rpc[0].0, Method::from("PING"));
        assert_eq!(rpc[0].1, Direction::Request);
        assert_eq!(rpc[0].2, PeerId::from("peer-42"));
    }

    #[test]
    fn inbound_rpc_scenario_while_running() {
        let engine = Arc::new(MockEngine::new(true));
        let core = core_over(engine.clone());
        core.registry()
            .register_receive_rpc(|method, direction, peer, message| {
                assert_eq!(method, "PING");
                assert_eq!(direction, Direction::Request);
                assert_eq!(peer, "peer-42");
                assert_eq!(message, b"?");
                true
            });
        core.init().unwrap();
        let runner = {
            let core = core.clone();
            std::thread::spawn(move || core.start(&[], &strings(&["./app"])))
        };
        wait_for(|| core.state() == EngineState::Running);

        let inbound = core.inbound();
        assert!(inbound.receive_rpc(b"PING", 0, b"peer-42", b"?"));
        // No discovery handler is registered: dropped and counted.
        assert!(!inbound.discovered_peer(b"peer-9"));
        assert_eq!(core.counters().dropped_discovery, 1);

        core.stop().unwrap();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn concurrent_second_start_is_rejected() {
        let engine = Arc::new(MockEngine::new(false));
        let core = core_over(engine.clone());
        core.init().unwrap();
        let runner = {
            let core = core.clone();
            std::thread::spawn(move || core.start(&[], &strings(&["./app"])))
        };
        wait_for(|| engine.entered_run.load(Ordering::SeqCst));

        let err = core.start(&[], &strings(&["./app"])).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyStarting));

        engine.release();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn bad_args_leave_bridge_startable() {
        let engine = Arc::new(MockEngine::new(true));
        let core = core_over(engine.clone());
        core.init().unwrap();
        let err = core
            .start(&[], &strings(&["./app", "--no-such-flag"]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(core.state(), EngineState::Initialized);

        // A corrected start still works.
        let runner = {
            let core = core.clone();
            std::thread::spawn(move || core.start(&[], &strings(&["./app"])))
        };
        wait_for(|| core.state() == EngineState::Running);
        core.stop().unwrap();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn startup_failure_is_a_link_error() {
        let core = core_over(Arc::new(MockEngine::failing()));
        core.init().unwrap();
        let err = core.start(&[], &strings(&["./app"])).unwrap_err();
        assert!(matches!(err, BridgeError::Link(_)));
        assert_eq!(core.state(), EngineState::Stopped);
    }

    #[test]
    fn sends_after_stop_fail() {
        let engine = Arc::new(MockEngine::new(true));
        let core = core_over(engine.clone());
        core.init().unwrap();
        let runner = {
            let core = core.clone();
            std::thread::spawn(move || core.start(&[], &strings(&["./app"])))
        };
        wait_for(|| core.state() == EngineState::Running);
        core.stop().unwrap();
        runner.join().unwrap().unwrap();

        let err = core.send_rpc_response("PING", "peer-42", b"!").unwrap_err();
        assert_eq!(err.actual, EngineState::Stopped);
        assert!(engine.rpc.lock().is_empty());
    }
}
