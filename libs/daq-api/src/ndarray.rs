use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// An n-dimensional numeric array carried opaquely by value. `dtype` is
/// a descriptor string (e.g. `"<f8"`, or a composite record-dtype
/// descriptor) that this crate never interprets beyond round-tripping
/// it and, for primitive dtypes, validating element counts.
///
/// Serializes to `{"__ndarray__": <base64>, "dtype": ..., "shape": [...]}`,
/// the direct analogue of the original system's `NumpyEncoder` /
/// `json_numpy_obj_hook` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub bytes: Vec<u8>,
}

impl NdArray {
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            dtype: dtype.into(),
            shape,
            bytes,
        }
    }

    /// Element width in bytes for primitive dtype descriptors
    /// (`"<f8"`, `"<i4"`, `">u1"`, ...): an optional byte-order marker
    /// (`<`, `>`, `|`, `=`), exactly one type-code letter, then one or
    /// more digits, and nothing else. Composite record dtypes (e.g.
    /// `"[('x','<f8'),('y','<i4')]"`) don't match this shape and yield
    /// `None`, which this crate does not parse further.
    pub fn itemsize(&self) -> Option<usize> {
        let mut chars = self.dtype.chars().peekable();
        if matches!(chars.peek(), Some('<' | '>' | '|' | '=')) {
            chars.next();
        }
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return None,
        }
        let digits: String = chars.collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Validates that `bytes.len()` matches `shape.product() * itemsize`
    /// for primitive dtypes. Composite dtypes are not checked.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(itemsize) = self.itemsize() {
            let expected: usize = self.shape.iter().product::<usize>() * itemsize;
            if expected != self.bytes.len() {
                return Err(format!(
                    "ndarray byte length mismatch: shape {:?} dtype {} implies {expected} bytes, got {}",
                    self.shape,
                    self.dtype,
                    self.bytes.len()
                ));
            }
        }
        Ok(())
    }

    /// Attempts to read `value` back out as an `NdArray` if it has the
    /// `__ndarray__` shape; otherwise returns `None` so callers can fall
    /// through to treating it as an ordinary JSON value.
    pub fn from_value(value: &Value) -> Option<NdArray> {
        let obj = value.as_object()?;
        let b64 = obj.get("__ndarray__")?.as_str()?;
        let dtype = obj.get("dtype")?.as_str()?.to_string();
        let shape: Vec<usize> = obj
            .get("shape")?
            .as_array()?
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as usize))
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
        Some(NdArray::new(dtype, shape, bytes))
    }

    pub fn to_value(&self) -> Value {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        serde_json::json!({
            "__ndarray__": b64,
            "dtype": self.dtype,
            "shape": self.shape,
        })
    }
}

impl Serialize for NdArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}


impl<'de> Deserialize<'de> for NdArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        NdArray::from_value(&value).ok_or_else(|| D::Error::custom("not an __ndarray__ object"))
    }
}
