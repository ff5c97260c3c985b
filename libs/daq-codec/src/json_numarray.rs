use std::io::{Read, Write};

use daq_api::{Codec, NdArray, PluginError};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

/// General-purpose codec: JSON text where `NdArray` values are encoded
/// as `{"__ndarray__": <base64 of gzip-compressed bytes>, "dtype": ...,
/// "shape": [...]}`. Gzip substitutes for the original's optional
/// `blosc` compression (see DESIGN.md); non-array values pass through
/// as ordinary JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNumArrayCodec;

impl JsonNumArrayCodec {
    pub fn new() -> Self {
        Self
    }

    fn compress(bytes: &[u8]) -> Result<Vec<u8>, PluginError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(bytes)
            .map_err(|e| PluginError::format_err(format!("gzip compress: {e}")))?;
        encoder
            .finish()
            .map_err(|e| PluginError::format_err(format!("gzip compress: {e}")))
    }

    fn decompress(bytes: &[u8]) -> Result<Vec<u8>, PluginError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| PluginError::format_err(format!("gzip decompress: {e}")))?;
        Ok(out)
    }

    /// Walks a JSON value, replacing any `NdArray`-shaped object with one
    /// whose `__ndarray__` payload has been gzip-compressed, and
    /// recursing into arrays/objects otherwise.
    fn compress_arrays(value: Value) -> Result<Value, PluginError> {
        if let Some(arr) = NdArray::from_value(&value) {
            let compressed = Self::compress(&arr.bytes)?;
            return Ok(NdArray::new(arr.dtype, arr.shape, compressed).to_value());
        }
        match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(Self::compress_arrays)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, Self::compress_arrays(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other),
        }
    }

    fn decompress_arrays(value: Value) -> Result<Value, PluginError> {
        if let Some(arr) = NdArray::from_value(&value) {
            let raw = Self::decompress(&arr.bytes)?;
            let decoded = NdArray::new(arr.dtype, arr.shape, raw);
            decoded
                .validate()
                .map_err(PluginError::format_err)?;
            return Ok(decoded.to_value());
        }
        match value {
            Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(Self::decompress_arrays)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, Self::decompress_arrays(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other),
        }
    }
}

impl Codec for JsonNumArrayCodec {
    fn decode(&self, frame: &[u8]) -> Result<Value, PluginError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| PluginError::format_err(format!("invalid utf-8 json frame: {e}")))?;
        let raw: Value = serde_json::from_str(text)?;
        Self::decompress_arrays(raw)
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, PluginError> {
        let prepared = Self::compress_arrays(value.clone())?;
        serde_json::to_vec(&prepared).map_err(PluginError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_json() {
        let codec = JsonNumArrayCodec::new();
        let value = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        let frame = codec.encode(&value).unwrap();
        let back = codec.decode(&frame).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn round_trips_ndarray_payload() {
        let codec = JsonNumArrayCodec::new();
        let arr = NdArray::new("<f8", vec![2, 2], vec![0u8; 32]);
        let value = serde_json::json!({"scan": arr.to_value()});
        let frame = codec.encode(&value).unwrap();
        let back = codec.decode(&frame).unwrap();
        let round_tripped = NdArray::from_value(&back["scan"]).unwrap();
        assert_eq!(round_tripped.dtype, "<f8");
        assert_eq!(round_tripped.shape, vec![2, 2]);
        assert_eq!(round_tripped.bytes, vec![0u8; 32]);
    }

    #[test]
    fn round_trips_composite_record_dtype_opaquely() {
        let codec = JsonNumArrayCodec::new();
        let arr = NdArray::new("[('x', '<f8'), ('y', '<i4')]", vec![3], vec![7u8; 36]);
        let value = arr.to_value();
        let frame = codec.encode(&value).unwrap();
        let back = codec.decode(&frame).unwrap();
        let round_tripped = NdArray::from_value(&back).unwrap();
        assert_eq!(round_tripped.dtype, arr.dtype);
        assert_eq!(round_tripped.bytes, arr.bytes);
    }
}
