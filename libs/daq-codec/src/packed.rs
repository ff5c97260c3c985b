use daq_api::{Codec, NdArray, PluginError};
use serde_json::{Map, Value};

const META_LEN_BYTES: usize = 4;

/// Fast single-array codec. Wire layout, matching the original system's
/// `simple_enc`/`simple_dec` exactly:
///
/// ```text
/// [ raw array bytes ][ json-encoded meta bytes ][ u32 meta_len, little-endian ]
/// ```
///
/// `meta` carries free-form named fields (timestamps, scan parameters,
/// error counters) plus, when an array is present, a `data_meta` entry
/// recording its `dtype`/`shape` so decode can reconstruct it. JSON
/// substitutes for the original's `pickle` for the metadata blob (see
/// DESIGN.md).
///
/// A value is represented as a JSON object with an optional `"data"` key
/// holding an `NdArray`-shaped value; every other key is carried as a
/// meta field.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedBinaryCodec;

impl PackedBinaryCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for PackedBinaryCodec {
    fn decode(&self, frame: &[u8]) -> Result<Value, PluginError> {
        if frame.len() < META_LEN_BYTES {
            return Err(PluginError::format_err(
                "packed frame shorter than the meta-length trailer",
            ));
        }
        let (head, len_bytes) = frame.split_at(frame.len() - META_LEN_BYTES);
        let meta_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        if head.len() < meta_len {
            return Err(PluginError::format_err(
                "packed frame meta length exceeds available bytes",
            ));
        }
        let (data_bytes, meta_bytes) = head.split_at(head.len() - meta_len);
        let meta: Value = serde_json::from_slice(meta_bytes)?;
        let mut meta = match meta {
            Value::Object(map) => map,
            _ => return Err(PluginError::format_err("packed frame meta is not an object")),
        };

        let mut out = Map::with_capacity(meta.len() + 1);
        if let Some(data_meta) = meta.remove("data_meta") {
            let dtype = data_meta
                .get("dtype")
                .and_then(Value::as_str)
                .ok_or_else(|| PluginError::format_err("data_meta missing dtype"))?
                .to_string();
            let shape: Vec<usize> = data_meta
                .get("shape")
                .and_then(Value::as_array)
                .ok_or_else(|| PluginError::format_err("data_meta missing shape"))?
                .iter()
                .filter_map(|v| v.as_u64().map(|n| n as usize))
                .collect();
            let array = NdArray::new(dtype, shape, data_bytes.to_vec());
            array.validate().map_err(PluginError::format_err)?;
            out.insert("data".to_string(), array.to_value());
        }
        for (k, v) in meta {
            out.insert(k, v);
        }
        Ok(Value::Object(out))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, PluginError> {
        let obj = value
            .as_object()
            .ok_or_else(|| PluginError::format_err("packed codec requires a JSON object"))?;

        let mut data_bytes: Vec<u8> = Vec::new();
        let mut meta = Map::new();
        for (k, v) in obj {
            if k == "data" {
                let array = NdArray::from_value(v).ok_or_else(|| {
                    PluginError::format_err("\"data\" field is not an __ndarray__ value")
                })?;
                meta.insert(
                    "data_meta".to_string(),
                    serde_json::json!({"dtype": array.dtype, "shape": array.shape}),
                );
                data_bytes = array.bytes;
            } else {
                meta.insert(k.clone(), v.clone());
            }
        }

        let meta_bytes = serde_json::to_vec(&Value::Object(meta))?;
        let meta_len = u32::try_from(meta_bytes.len())
            .map_err(|_| PluginError::format_err("packed frame meta too large"))?;

        let mut out = Vec::with_capacity(data_bytes.len() + meta_bytes.len() + META_LEN_BYTES);
        out.extend_from_slice(&data_bytes);
        out.extend_from_slice(&meta_bytes);
        out.extend_from_slice(&meta_len.to_le_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_array_with_meta() {
        let codec = PackedBinaryCodec::new();
        let array = NdArray::new("<f8", vec![4], vec![1u8; 32]);
        let value = serde_json::json!({
            "data": array.to_value(),
            "timestamp": 1_700_000_000u64,
            "error_count": 0,
        });
        let frame = codec.encode(&value).unwrap();
        let back = codec.decode(&frame).unwrap();
        assert_eq!(back["timestamp"], 1_700_000_000u64);
        assert_eq!(back["error_count"], 0);
        let round_tripped = NdArray::from_value(&back["data"]).unwrap();
        assert_eq!(round_tripped.dtype, "<f8");
        assert_eq!(round_tripped.bytes, array.bytes);
    }

    #[test]
    fn round_trips_meta_only_frame() {
        let codec = PackedBinaryCodec::new();
        let value = serde_json::json!({"command": "ack", "seq": 7});
        let frame = codec.encode(&value).unwrap();
        let back = codec.decode(&frame).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn rejects_truncated_frame() {
        let codec = PackedBinaryCodec::new();
        assert!(codec.decode(&[0u8; 2]).is_err());
    }
}
