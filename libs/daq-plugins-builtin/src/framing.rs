use daq_api::{Framing, PluginError};
use serde_json::Value;

/// Delimits frames with a 4-byte big-endian length header. TCP has no
/// message boundaries of its own (unlike the ZeroMQ sockets the original
/// system used), so this is the one piece of framing every TCP-backed
/// endpoint needs. Grounded on `plugins/framing/length-prefixed`.
pub struct LengthPrefixedFraming {
    max_payload: usize,
}

impl LengthPrefixedFraming {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Framing for LengthPrefixedFraming {
    fn decode(&self, buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PluginError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if self.max_payload > 0 && len > self.max_payload {
            return Err(PluginError::format_err(format!(
                "payload too large: {len} bytes (max {})",
                self.max_payload
            )));
        }
        let total = 4 + len;
        if buf.len() < total {
            return Ok(None);
        }
        Ok(Some((buf[4..total].to_vec(), total)))
    }

    fn encode(&self, data: &[u8], out: &mut Vec<u8>) -> Result<(), PluginError> {
        let len = u32::try_from(data.len())
            .map_err(|_| PluginError::format_err("frame too large for 4-byte length header"))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(data);
        Ok(())
    }
}

pub fn make_length_prefixed(config: &Value) -> Result<Box<dyn Framing>, PluginError> {
    let max_payload = config
        .get("max_payload")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    Ok(Box::new(LengthPrefixedFraming::new(max_payload)))
}
