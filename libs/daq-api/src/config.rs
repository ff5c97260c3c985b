use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// What happens to an inbound batch when the input queue is already at
/// `max_buffer`. Drop-tail only: the newest batch is discarded and a
/// counter is bumped. There is no CPU-load-based shedding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the incoming batch, count it, keep going. The only supported
    /// policy today; kept as an enum (rather than a bare bool) so a
    /// future policy can be added without changing the config schema.
    DropTail,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        BackpressurePolicy::DropTail
    }
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_interpret_tick_ms() -> u64 {
    10
}

fn default_liveness_tick_ms() -> u64 {
    1000
}

/// A parsed endpoint URI, canonical form `tcp://host:port` (spec.md §6).
/// The transport `kind` resolved through the plugin registry is derived
/// from `scheme` (`tcp` -> `tcp_client`/`tcp_server`), not configured
/// separately — the wire schema carries only the URI string(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUri {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl EndpointUri {
    pub fn parse(uri: &str) -> Result<Self, String> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| format!("endpoint uri {uri:?} is missing a \"scheme://\" prefix"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("endpoint uri {uri:?} is missing a \":port\" suffix"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| format!("endpoint uri {uri:?} has a non-numeric port {port:?}"))?;
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// `{"host": ..., "port": ...}`, the config shape the built-in
    /// `tcp_client`/`tcp_server` transport constructors expect.
    pub fn to_config(&self) -> serde_json::Value {
        serde_json::json!({"host": self.host, "port": self.port})
    }
}

/// Accepts either a single URI string or a list of URI strings, matching
/// spec.md §6's `frontend`/`backend` key type ("string or list of
/// strings"). Absent fields are handled by `#[serde(default)]` on the
/// caller, so this only runs when the key is present.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Configuration for a single Transceiver/Receiver worker, matching the
/// spec's `converter`/`producer_sim`/`receiver` config sections.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Human-readable worker name, used in logs and status lines.
    #[serde(default = "default_name")]
    pub name: String,

    /// Interpreter/codec kind resolved through the plugin registry.
    pub kind: String,

    /// Zero or more upstream endpoint URIs this worker connects to.
    /// Empty for producers. Accepts a single URI string or a list, per
    /// spec.md §6.
    #[serde(default, deserialize_with = "one_or_many")]
    pub frontend: Vec<String>,

    /// Zero or more downstream endpoint URIs this worker binds and fans
    /// out to. Empty for pure sinks/receivers. Accepts a single URI
    /// string or a list, per spec.md §6.
    #[serde(default, deserialize_with = "one_or_many")]
    pub backend: Vec<String>,

    /// Bound on the inbound queue depth before drop-tail kicks in.
    /// Absent means unbounded (spec.md §3, invariant I3).
    #[serde(default)]
    pub max_buffer: Option<usize>,

    #[serde(default)]
    pub overflow: BackpressurePolicy,

    /// Whether the worker's connection(s) carry a reverse command path
    /// (DEALER-equivalent) in addition to forward data.
    #[serde(default)]
    pub connection: ConnectionKind,

    /// Free-form configuration handed to the resolved interpreter.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Per-worker log level override; defaults to the process-wide level.
    #[serde(default)]
    pub loglevel: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_interpret_tick_ms")]
    pub interpret_tick_ms: u64,

    /// Framing kind resolved through the plugin registry, shared by
    /// every frontend/backend endpoint of this worker.
    #[serde(default = "default_framing")]
    pub framing: String,

    /// Codec kind resolved through the plugin registry, shared by every
    /// frontend/backend endpoint of this worker.
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_framing() -> String {
    "length_prefixed".to_string()
}

fn default_codec() -> String {
    "json_numarray".to_string()
}

fn default_name() -> String {
    "unnamed".to_string()
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn interpret_tick(&self) -> Duration {
        Duration::from_millis(self.interpret_tick_ms)
    }

    pub fn liveness_tick() -> Duration {
        Duration::from_millis(default_liveness_tick_ms())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Unidirectional,
    Bidirectional,
}
