use daq_api::{Interpreter, NdArray, PluginError};
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

/// Periodically emits a synthetic random integer array under a
/// configured field name, plus an incrementing `time_stamp`. Grounded on
/// `online_monitor/examples/producer_sim/example_producer_sim.py`'s
/// `send_data` (`np.random.randint(0, 10, 100*100).reshape((100, 100))`
/// sent alongside a `time_stamp` counter).
///
/// Producers have no frontends, so data only originates from `refresh`,
/// ticked by the interpret loop the same way any other worker's idle
/// tick is.
pub struct RandomArrayProducer {
    field: String,
    shape: Vec<usize>,
    time_stamp: u64,
}

#[derive(Deserialize)]
struct RandomArrayConfig {
    #[serde(default = "default_field")]
    field: String,
    shape: Vec<usize>,
}

fn default_field() -> String {
    "data".to_string()
}

impl RandomArrayProducer {
    pub fn new(field: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            field: field.into(),
            shape,
            time_stamp: 0,
        }
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn Interpreter>, PluginError> {
        let cfg: RandomArrayConfig = serde_json::from_value(config.clone())
            .map_err(|e| PluginError::config(format!("random array producer config: {e}")))?;
        Ok(Box::new(RandomArrayProducer::new(cfg.field, cfg.shape)))
    }
}

impl Interpreter for RandomArrayProducer {
    fn interpret(&mut self, _batch: Vec<(usize, Value)>) -> Result<Vec<Value>, PluginError> {
        // Producers have no frontends; nothing ever arrives here.
        Ok(Vec::new())
    }

    fn refresh(&mut self) -> Result<Vec<Value>, PluginError> {
        let count: usize = self.shape.iter().product();
        let mut rng = rand::thread_rng();
        let values: Vec<u8> = (0..count)
            .flat_map(|_| (rng.gen_range(0..10_i32)).to_le_bytes())
            .collect();
        let array = NdArray::new("<i4", self.shape.clone(), values);
        let mut out = serde_json::Map::with_capacity(2);
        out.insert("time_stamp".to_string(), serde_json::json!(self.time_stamp));
        out.insert(self.field.clone(), array.to_value());
        self.time_stamp += 1;
        Ok(vec![Value::Object(out)])
    }
}

/// Replays a fixed list of pre-recorded values in order, looping back to
/// the start when exhausted, one per tick. Grounded on the same
/// producer_sim shape, used for deterministic test fixtures instead of
/// random data.
pub struct ReplayProducer {
    values: Vec<Value>,
    position: usize,
}

#[derive(Deserialize)]
struct ReplayConfig {
    values: Vec<Value>,
}

impl ReplayProducer {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, position: 0 }
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn Interpreter>, PluginError> {
        let cfg: ReplayConfig = serde_json::from_value(config.clone())
            .map_err(|e| PluginError::config(format!("replay producer config: {e}")))?;
        Ok(Box::new(ReplayProducer::new(cfg.values)))
    }
}

impl Interpreter for ReplayProducer {
    fn interpret(&mut self, _batch: Vec<(usize, Value)>) -> Result<Vec<Value>, PluginError> {
        Ok(Vec::new())
    }

    fn refresh(&mut self) -> Result<Vec<Value>, PluginError> {
        if self.values.is_empty() {
            return Ok(Vec::new());
        }
        let value = self.values[self.position % self.values.len()].clone();
        self.position += 1;
        Ok(vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_array_producer_emits_increasing_time_stamps() {
        let mut producer = RandomArrayProducer::new("data", vec![2, 2]);
        let first = producer.refresh().unwrap();
        let second = producer.refresh().unwrap();
        assert_eq!(first[0]["time_stamp"], 0);
        assert_eq!(second[0]["time_stamp"], 1);
    }

    #[test]
    fn replay_producer_loops() {
        let mut producer = ReplayProducer::new(vec![serde_json::json!(1), serde_json::json!(2)]);
        assert_eq!(producer.refresh().unwrap(), vec![serde_json::json!(1)]);
        assert_eq!(producer.refresh().unwrap(), vec![serde_json::json!(2)]);
        assert_eq!(producer.refresh().unwrap(), vec![serde_json::json!(1)]);
    }
}
