pub mod batch;
pub mod config;
pub mod error;
pub mod hooks;
pub mod ndarray;
pub mod state;
pub mod transport;

pub use batch::{Command, InboundBatch, OutboundBatch};
pub use config::{BackpressurePolicy, ConnectionKind, EndpointUri, WorkerConfig};
pub use error::{ErrorKind, PluginError};
pub use hooks::{Codec, CommandHandler, Interpreter, PassthroughInterpreter};
pub use ndarray::NdArray;
pub use state::RunState;
pub use transport::{Framing, Transport, TransportStream};
