use serde_json::Value;

use crate::error::PluginError;

/// Wire codec: turns a decoded frame's raw bytes into a `serde_json::Value`
/// and back. Array-valued payloads are represented via the `NdArray`
/// encoding documented on [`crate::ndarray::NdArray`]; a codec
/// implementation is free to choose how it gets there (JSON text,
/// packed binary, ...).
pub trait Codec: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Result<Value, PluginError>;
    fn encode(&self, value: &Value) -> Result<Vec<u8>, PluginError>;
}

/// The user-supplied hook at the heart of a Transceiver: turns inbound
/// decoded data into zero or more outbound values. Called once per
/// popped batch from the interpret loop, never concurrently with itself.
///
/// `setup` runs once before the first `interpret` call and may fail the
/// worker's startup; `refresh` is an optional periodic tick independent
/// of data arrival (used by producers and by receivers with a refresh
/// timer).
pub trait Interpreter: Send {
    /// One-time setup. Default: no-op, matching the original
    /// `interpret_data`'s implicit no-op base behavior.
    fn setup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Transform one poll cycle's inbound batch into zero or more
    /// outbound values. Each entry pairs a frontend index with its
    /// decoded value, in frontend order, so an interpreter that
    /// correlates data across multiple frontends (matching readings by
    /// source, as a position correlator would) sees every frontend that
    /// had data ready this cycle at once, rather than one frontend's
    /// value at a time.
    fn interpret(&mut self, batch: Vec<(usize, Value)>) -> Result<Vec<Value>, PluginError>;

    /// Periodic tick, independent of data arrival. Default: no-op.
    fn refresh(&mut self) -> Result<Vec<Value>, PluginError> {
        Ok(Vec::new())
    }
}

/// Handles a command received on the reverse (command) channel of a
/// bidirectional worker. Runs on the command thread, never the interpret
/// thread, so it must not block on anything the interpret loop depends
/// on.
pub trait CommandHandler: Send {
    fn handle_command(&mut self, command: Value) -> Result<(), PluginError>;
}

/// Blanket no-op interpreter used by pure forwarders (frontend data is
/// passed straight to backends unchanged).
pub struct PassthroughInterpreter;

impl Interpreter for PassthroughInterpreter {
    fn interpret(&mut self, batch: Vec<(usize, Value)>) -> Result<Vec<Value>, PluginError> {
        Ok(batch.into_iter().map(|(_, value)| value).collect())
    }
}
