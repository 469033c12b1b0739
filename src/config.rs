//! Client identity and engine configuration: defaults, optional config file,
//! the args vector handed to `start`, and env overrides.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_CLIENT_NAME: &str = "hypha";
pub const DEFAULT_PROTOCOL_SUITE: &str = "hypha/1.0";
pub const DEFAULT_DEBUG_LEVEL: &str = "info";

/// Identification metadata the engine advertises during handshakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_name: String,
    pub client_version: String,
    pub protocol_suite: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.into(),
            client_version: format!("v{}", env!("CARGO_PKG_VERSION")),
            protocol_suite: DEFAULT_PROTOCOL_SUITE.into(),
        }
    }
}

impl ClientIdentity {
    /// Build from the constants vector crossing the boundary:
    /// `[name, version, protocol-suite]`. Empty or missing entries keep defaults.
    pub fn from_constants(constants: &[String]) -> Self {
        let mut identity = ClientIdentity::default();
        if let Some(s) = constants.first().filter(|s| !s.is_empty()) {
            identity.client_name = s.clone();
        }
        if let Some(s) = constants.get(1).filter(|s| !s.is_empty()) {
            identity.client_version = s.clone();
        }
        if let Some(s) = constants.get(2).filter(|s| !s.is_empty()) {
            identity.protocol_suite = s.clone();
        }
        identity
    }

    /// User-agent string for the engine handshake.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.client_name, self.client_version)
    }
}

/// Engine configuration. File: ~/.config/hypha/config.toml or
/// /etc/hypha/config.toml. The args vector overrides the file; env overrides
/// (HYPHA_PORT, HYPHA_DISCOVERY_PORT, HYPHA_MAX_PEERS) take final precedence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Address the engine listens on for TCP and UDP (default 127.0.0.1).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Overlay transport TCP port (default 9000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Peer discovery UDP port (default 9000).
    #[serde(default = "default_port")]
    pub discovery_port: u16,
    /// Bootstrap records handed to the engine's discovery.
    #[serde(default)]
    pub boot_nodes: Vec<String>,
    /// Maximum number of connected peers (default 10).
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Topics the engine subscribes to at start.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Engine log verbosity (default "info").
    #[serde(default = "default_debug_level")]
    pub debug_level: String,
}

fn default_listen_address() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    9000
}
fn default_max_peers() -> usize {
    10
}
fn default_debug_level() -> String {
    DEFAULT_DEBUG_LEVEL.into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_port(),
            discovery_port: default_port(),
            boot_nodes: Vec::new(),
            max_peers: default_max_peers(),
            topics: Vec::new(),
            debug_level: default_debug_level(),
        }
    }
}

/// Process-style tokens accepted in the `start` args vector. The first element
/// is conventionally the invoking program's name.
#[derive(Debug, Parser)]
#[command(name = "hypha", disable_version_flag = true)]
struct EngineArgs {
    /// The address the engine will listen on for TCP and UDP connections.
    #[arg(long)]
    listen_address: Option<String>,
    /// The overlay transport TCP port.
    #[arg(long)]
    port: Option<u16>,
    /// The discovery UDP port.
    #[arg(long)]
    discovery_port: Option<u16>,
    /// One or more comma-delimited bootstrap records.
    #[arg(long, value_delimiter = ',')]
    boot_nodes: Vec<String>,
    /// The maximum number of peers.
    #[arg(long)]
    max_peers: Option<usize>,
    /// Comma-delimited topics to subscribe to at start.
    #[arg(long, value_delimiter = ',')]
    topics: Vec<String>,
    /// Engine log verbosity.
    #[arg(long)]
    debug_level: Option<String>,
}

/// The args vector failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid start arguments: {0}")]
    Args(#[from] clap::Error),
}

impl EngineConfig {
    /// Merge defaults, then the config file (if present), then the args
    /// vector, then env vars.
    pub fn load(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = load_file().unwrap_or_default();
        config.apply_args(EngineArgs::try_parse_from(args)?);
        config.apply_env();
        Ok(config)
    }

    fn apply_args(&mut self, args: EngineArgs) {
        if let Some(addr) = args.listen_address {
            self.listen_address = addr;
        }
        if let Some(port) = args.port {
            self.port = port;
            // The discovery port follows the transport port unless given its own flag.
            self.discovery_port = port;
        }
        if let Some(port) = args.discovery_port {
            self.discovery_port = port;
        }
        if !args.boot_nodes.is_empty() {
            self.boot_nodes = args.boot_nodes;
        }
        if let Some(max) = args.max_peers {
            self.max_peers = max;
        }
        if !args.topics.is_empty() {
            self.topics = args.topics;
        }
        if let Some(level) = args.debug_level {
            self.debug_level = level;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(s) = std::env::var("HYPHA_PORT") {
            if let Ok(p) = s.parse::<u16>() {
                self.port = p;
            }
        }
        if let Ok(s) = std::env::var("HYPHA_DISCOVERY_PORT") {
            if let Ok(p) = s.parse::<u16>() {
                self.discovery_port = p;
            }
        }
        if let Ok(s) = std::env::var("HYPHA_MAX_PEERS") {
            if let Ok(n) = s.parse::<usize>() {
                self.max_peers = n;
            }
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/hypha/config.toml"));
    }
    out.push(PathBuf::from("/etc/hypha/config.toml"));
    out
}

fn load_file() -> Option<EngineConfig> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                match toml::from_str::<EngineConfig>(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => debug!(path = %p.display(), error = %e, "ignoring bad config file"),
                }
            }
            break;
        }
    }
    None
}
