//! C ABI for driving the bridge from foreign hosts (C/C++, JVM, .NET).
//! Hosts link the staticlib/cdylib, register callbacks, then init and start;
//! inbound events come back through the callbacks on engine-owned threads.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uchar};
use std::slice;
use std::sync::{Arc, OnceLock};

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::codec::{Direction, Method, PeerId, Topic};
use crate::core::{BridgeError, HyphaCore};
use crate::engine;
use crate::registry::Registry;

/// Discovery callback: peer id as UTF-8 bytes. Returns the handled/ack flag.
pub type DiscoveredPeerFn = unsafe extern "C" fn(peer: *const c_uchar, peer_len: usize) -> bool;

/// Gossip callback: topic as UTF-8 bytes, message as raw bytes.
pub type ReceiveGossipFn = unsafe extern "C" fn(
    topic: *const c_uchar,
    topic_len: usize,
    message: *const c_uchar,
    message_len: usize,
) -> bool;

/// RPC callback: method and peer as UTF-8 bytes, req_resp 0 = request,
/// 1 = response, message as raw bytes.
pub type ReceiveRpcFn = unsafe extern "C" fn(
    method: *const c_uchar,
    method_len: usize,
    req_resp: c_uchar,
    peer: *const c_uchar,
    peer_len: usize,
    message: *const c_uchar,
    message_len: usize,
) -> bool;

// The handler table outlives the bridge singleton so hosts may register
// before hypha_init; both share this registry.
static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
static CORE: OnceLock<HyphaCore> = OnceLock::new();

fn shared_registry() -> &'static Arc<Registry> {
    REGISTRY.get_or_init(|| Arc::new(Registry::new()))
}

/// Register the three host callbacks. May be called at any time, including
/// before `hypha_init` and while events are in flight; last write wins.
#[no_mangle]
pub extern "C" fn hypha_register_handlers(
    discovered_peer: DiscoveredPeerFn,
    receive_gossip: ReceiveGossipFn,
    receive_rpc: ReceiveRpcFn,
) {
    shared_registry().register_handlers(
        move |peer: String| unsafe { discovered_peer(peer.as_ptr(), peer.len()) },
        move |topic: String, message: Vec<u8>| unsafe {
            receive_gossip(
                topic.as_ptr(),
                topic.len(),
                message.as_ptr(),
                message.len(),
            )
        },
        move |method: String, direction: Direction, peer: String, message: Vec<u8>| unsafe {
            receive_rpc(
                method.as_ptr(),
                method.len(),
                direction.flag(),
                peer.as_ptr(),
                peer.len(),
                message.as_ptr(),
                message.len(),
            )
        },
    );
}

/// Initialize the bridge singleton around the installed engine. Returns 0 on
/// success, -1 if the lifecycle does not permit initialization. If the native
/// engine component never loaded there is no service to provide: the failure
/// is reported on stderr and the process exits.
#[no_mangle]
pub extern "C" fn hypha_init() -> c_int {
    init_tracing();
    let core = CORE.get_or_init(|| {
        let engine = match engine::take_installed() {
            Some(engine) => engine,
            None => {
                let report =
                    anyhow::anyhow!("no engine installed; the native component failed to load")
                        .context("engine link failure");
                eprintln!("hypha: {report:#}");
                std::process::exit(1);
            }
        };
        HyphaCore::with_registry(engine, shared_registry().clone())
    });
    match core.init() {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "init rejected");
            -1
        }
    }
}

/// Start the engine. BLOCKS the calling thread for the engine's full running
/// lifetime; hosts must call this from a dedicated thread.
///
/// `client_constants` is `[name, version, protocol-suite]`; `args` is a
/// process-style argument vector whose first element is conventionally the
/// program name. Returns 0 when the engine stops cleanly, -1 on misuse. An
/// engine link failure is fatal to the process.
///
/// # Safety
/// Both arrays must point to `num_*` valid, NUL-terminated C strings (or be
/// null with a zero count).
#[no_mangle]
pub unsafe extern "C" fn hypha_start(
    client_constants: *const *const c_char,
    num_client_constants: usize,
    args: *const *const c_char,
    num_args: usize,
) -> c_int {
    let constants = decode_string_array(client_constants, num_client_constants);
    let args = decode_string_array(args, num_args);
    let Some(core) = CORE.get() else {
        warn!("start called before init");
        return -1;
    };
    match core.start(&constants, &args) {
        Ok(()) => 0,
        Err(BridgeError::Link(e)) => {
            let report = anyhow::Error::new(e).context("engine link failure");
            eprintln!("hypha: {report:#}");
            std::process::exit(1);
        }
        Err(e) => {
            warn!(error = %e, "start rejected");
            -1
        }
    }
}

/// Publish a gossip message. Returns 0 on success, -1 if pointers are null or
/// the engine is not running.
#[no_mangle]
pub extern "C" fn hypha_send_gossip(
    topic: *const c_uchar,
    topic_len: usize,
    message: *const c_uchar,
    message_len: usize,
) -> c_int {
    if topic.is_null() {
        return -1;
    }
    let Some(core) = CORE.get() else {
        return -1;
    };
    let topic = unsafe { slice::from_raw_parts(topic, topic_len) };
    let message = unsafe { slice_or_empty(message, message_len) };
    match core.send_gossip(Topic::new(topic), message) {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "gossip send rejected");
            -1
        }
    }
}

/// Send an RPC message to a peer. `req_resp` is 0 for a request, 1 for a
/// response. Returns 0 on success, -1 if pointers are null, the flag is out
/// of range, or the engine is not running.
#[no_mangle]
pub extern "C" fn hypha_send_rpc(
    method: *const c_uchar,
    method_len: usize,
    req_resp: c_uchar,
    peer: *const c_uchar,
    peer_len: usize,
    message: *const c_uchar,
    message_len: usize,
) -> c_int {
    if method.is_null() || peer.is_null() {
        return -1;
    }
    let Some(core) = CORE.get() else {
        return -1;
    };
    let direction = match Direction::from_flag(req_resp) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "rpc send rejected");
            return -1;
        }
    };
    let method = unsafe { slice::from_raw_parts(method, method_len) };
    let peer = unsafe { slice::from_raw_parts(peer, peer_len) };
    let message = unsafe { slice_or_empty(message, message_len) };
    match core.send_rpc(Method::new(method), direction, PeerId::new(peer), message) {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "rpc send rejected");
            -1
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Empty messages may arrive as (null, 0) from C hosts.
unsafe fn slice_or_empty<'a>(ptr: *const c_uchar, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

/// Decode a C string array. Null or non-UTF-8 entries are skipped with a
/// warning, matching the tolerant treatment of host argv.
unsafe fn decode_string_array(ptr: *const *const c_char, len: usize) -> Vec<String> {
    let mut out = Vec::new();
    if ptr.is_null() {
        return out;
    }
    for idx in 0..len {
        let entry = *ptr.add(idx);
        if entry.is_null() {
            warn!(idx, "skipping null string entry");
            continue;
        }
        match CStr::from_ptr(entry).to_str() {
            Ok(s) => out.push(s.to_string()),
            Err(_) => warn!(idx, "skipping non-utf8 string entry"),
        }
    }
    out
}
