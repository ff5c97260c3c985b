use std::sync::{Arc, Mutex};

use daq_api::{CommandHandler, Interpreter, NdArray, PluginError};
use serde::Deserialize;
use serde_json::Value;

/// Zeroes every element below a configured threshold in a named
/// `<i4` array field and drops the batch entirely when no element meets
/// the threshold. The threshold is shared with a
/// [`ThresholdCommandHandler`] so a bidirectional worker can adjust it
/// live from the reverse channel. Grounded on spec.md §8 S3/S4 ("values
/// below `threshold` become 0"; "subthreshold batches never arrive") and
/// the original system's scan-parameter meta fields carried alongside
/// array data (`online_monitor/examples/producer_sim/
/// silab_default_producer_sim.py`'s `pack_and_enc`).
pub struct ThresholdInterpreter {
    field: String,
    threshold: Arc<Mutex<f64>>,
}

/// Adjusts the threshold shared with a [`ThresholdInterpreter`] in
/// response to a `{"set_threshold": <number>}` command (spec.md §8 S4).
pub struct ThresholdCommandHandler {
    threshold: Arc<Mutex<f64>>,
}

impl CommandHandler for ThresholdCommandHandler {
    fn handle_command(&mut self, command: Value) -> Result<(), PluginError> {
        let new_threshold = command
            .get("set_threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| PluginError::format_err("expected {\"set_threshold\": <number>}"))?;
        *self.threshold.lock().expect("threshold lock poisoned") = new_threshold;
        tracing::info!(new_threshold, "threshold updated via reverse command");
        Ok(())
    }
}

#[derive(Deserialize)]
struct ThresholdConfig {
    field: String,
    threshold: f64,
}

impl ThresholdInterpreter {
    pub fn new(field: impl Into<String>, threshold: f64) -> Self {
        Self {
            field: field.into(),
            threshold: Arc::new(Mutex::new(threshold)),
        }
    }

    /// Builds a linked interpreter/command-handler pair sharing the same
    /// threshold, for bidirectional workers.
    pub fn shared(
        field: impl Into<String>,
        threshold: f64,
    ) -> (ThresholdInterpreter, ThresholdCommandHandler) {
        let shared = Arc::new(Mutex::new(threshold));
        (
            ThresholdInterpreter {
                field: field.into(),
                threshold: Arc::clone(&shared),
            },
            ThresholdCommandHandler { threshold: shared },
        )
    }

    /// Resolves a `kind` config into an `(Interpreter, CommandHandler)`
    /// pair. The handler is always built (not only for bidirectional
    /// workers); `daq-manager` only attaches it to the Transceiver when
    /// the worker's `connection = "bidirectional"`, per spec.md I5.
    pub fn from_config(
        config: &Value,
    ) -> Result<(Box<dyn Interpreter>, Box<dyn CommandHandler>), PluginError> {
        let cfg: ThresholdConfig = serde_json::from_value(config.clone())
            .map_err(|e| PluginError::config(format!("threshold converter config: {e}")))?;
        let (interpreter, handler) = ThresholdInterpreter::shared(cfg.field, cfg.threshold);
        Ok((Box::new(interpreter), Box::new(handler)))
    }

    /// Applies the current threshold to a little-endian `<i4` array,
    /// zeroing every element below it in place. Returns whether any
    /// element met or exceeded the threshold.
    fn apply_threshold(array: &mut NdArray, threshold: f64) -> bool {
        let mut any_above = false;
        for chunk in array.bytes.chunks_exact_mut(4) {
            let value = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if (value as f64) < threshold {
                chunk.copy_from_slice(&0i32.to_le_bytes());
            } else {
                any_above = true;
            }
        }
        any_above
    }
}

impl Interpreter for ThresholdInterpreter {
    fn interpret(&mut self, batch: Vec<(usize, Value)>) -> Result<Vec<Value>, PluginError> {
        let threshold = *self.threshold.lock().expect("threshold lock poisoned");
        let mut outputs = Vec::with_capacity(batch.len());
        for (_frontend, mut data) in batch {
            let Some(field_value) = data.get(&self.field) else {
                // Nothing to threshold in this entry; forward unchanged.
                outputs.push(data);
                continue;
            };
            let Some(mut array) = NdArray::from_value(field_value) else {
                outputs.push(data);
                continue;
            };
            if array.itemsize() != Some(4) {
                // Only little-endian 4-byte integer arrays are supported by
                // this thresholding scheme; anything else passes through.
                outputs.push(data);
                continue;
            }

            let any_above = Self::apply_threshold(&mut array, threshold);
            if !any_above {
                continue;
            }

            if let Value::Object(map) = &mut data {
                map.insert(self.field.clone(), array.to_value());
            }
            outputs.push(data);
        }
        Ok(outputs)
    }
}
