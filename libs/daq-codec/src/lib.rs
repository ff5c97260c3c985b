//! Two wire codecs for converter data, grounded on the original system's
//! `json_numpy_obj_hook`/`NumpyEncoder` and `simple_enc`/`simple_dec`
//! helpers: a general JSON+ndarray codec and a fast single-array packed
//! binary codec.

mod json_numarray;
mod packed;

pub use json_numarray::JsonNumArrayCodec;
pub use packed::PackedBinaryCodec;
