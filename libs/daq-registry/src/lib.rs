//! Compile-time plugin registry: a `kind` string resolves to a
//! constructor function chosen at compile time, never via filesystem
//! search or dynamic library loading.
//!
//! This replaces the teacher's `libloading`-based plugin host
//! (`libs/plugin-host`) with a plain `HashMap` populated by
//! `register_*` calls made during process startup — see
//! `daq-plugins-builtin::register_builtin_plugins`.

use std::collections::HashMap;

use daq_api::{Codec, CommandHandler, Framing, Interpreter, PluginError, Transport};
use serde_json::Value;

/// An interpreter constructor also returns an optional paired command
/// handler sharing the interpreter's internal state (e.g. a threshold
/// converter and the handler that adjusts its threshold from the
/// reverse channel). Plugins with no reverse-command behavior return
/// `None`; the host only wires the handler in when the worker's
/// `connection = "bidirectional"` (spec.md I5).
type InterpreterCtor =
    fn(&Value) -> Result<(Box<dyn Interpreter>, Option<Box<dyn CommandHandler>>), PluginError>;
type CodecCtor = fn(&Value) -> Result<Box<dyn Codec>, PluginError>;
type TransportCtor = fn(&Value) -> Result<Box<dyn Transport>, PluginError>;
type FramingCtor = fn(&Value) -> Result<Box<dyn Framing>, PluginError>;

/// Holds one constructor map per plugin family. Populated once at
/// startup, then read-only for the lifetime of the process.
#[derive(Default)]
pub struct Registry {
    interpreters: HashMap<&'static str, InterpreterCtor>,
    codecs: HashMap<&'static str, CodecCtor>,
    transports: HashMap<&'static str, TransportCtor>,
    framings: HashMap<&'static str, FramingCtor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_interpreter(&mut self, kind: &'static str, ctor: InterpreterCtor) {
        self.interpreters.insert(kind, ctor);
    }

    pub fn register_codec(&mut self, kind: &'static str, ctor: CodecCtor) {
        self.codecs.insert(kind, ctor);
    }

    pub fn register_transport(&mut self, kind: &'static str, ctor: TransportCtor) {
        self.transports.insert(kind, ctor);
    }

    pub fn register_framing(&mut self, kind: &'static str, ctor: FramingCtor) {
        self.framings.insert(kind, ctor);
    }

    pub fn resolve_interpreter(
        &self,
        kind: &str,
        config: &Value,
    ) -> Result<(Box<dyn Interpreter>, Option<Box<dyn CommandHandler>>), PluginError> {
        let ctor = self.interpreters.get(kind).ok_or_else(|| {
            PluginError::config(format!(
                "no interpreter registered for kind {kind:?} (known kinds: {})",
                Self::known(&self.interpreters)
            ))
        })?;
        ctor(config)
    }

    pub fn resolve_codec(&self, kind: &str, config: &Value) -> Result<Box<dyn Codec>, PluginError> {
        let ctor = self.codecs.get(kind).ok_or_else(|| {
            PluginError::config(format!(
                "no codec registered for kind {kind:?} (known kinds: {})",
                Self::known(&self.codecs)
            ))
        })?;
        ctor(config)
    }

    pub fn resolve_transport(
        &self,
        kind: &str,
        config: &Value,
    ) -> Result<Box<dyn Transport>, PluginError> {
        let ctor = self.transports.get(kind).ok_or_else(|| {
            PluginError::config(format!(
                "no transport registered for kind {kind:?} (known kinds: {})",
                Self::known(&self.transports)
            ))
        })?;
        ctor(config)
    }

    pub fn resolve_framing(&self, kind: &str, config: &Value) -> Result<Box<dyn Framing>, PluginError> {
        let ctor = self.framings.get(kind).ok_or_else(|| {
            PluginError::config(format!(
                "no framing registered for kind {kind:?} (known kinds: {})",
                Self::known(&self.framings)
            ))
        })?;
        ctor(config)
    }

    fn known<V>(map: &HashMap<&'static str, V>) -> String {
        let mut kinds: Vec<&str> = map.keys().copied().collect();
        kinds.sort_unstable();
        kinds.join(", ")
    }
}
