//! Built-in interpreters and producer generators, registered into a
//! [`daq_registry::Registry`] at process startup. Nothing here is
//! discovered dynamically; every kind string below is wired at compile
//! time, per the plugin loader's redesign (see DESIGN.md).

mod framing;
mod producer;
mod threshold;
mod transport;

use daq_api::{CommandHandler, Interpreter, PassthroughInterpreter, PluginError};
use daq_registry::Registry;
use serde_json::Value;

pub use framing::LengthPrefixedFraming;
pub use producer::{RandomArrayProducer, ReplayProducer};
pub use threshold::{ThresholdCommandHandler, ThresholdInterpreter};
pub use transport::{TcpClientTransport, TcpServerTransport};

type InterpreterResult = Result<(Box<dyn Interpreter>, Option<Box<dyn CommandHandler>>), PluginError>;

fn make_passthrough(_config: &Value) -> InterpreterResult {
    Ok((Box::new(PassthroughInterpreter), None))
}

fn make_threshold(config: &Value) -> InterpreterResult {
    let (interpreter, handler) = ThresholdInterpreter::from_config(config)?;
    Ok((interpreter, Some(handler)))
}

fn make_random_array_producer(config: &Value) -> InterpreterResult {
    let interpreter = RandomArrayProducer::from_config(config)?;
    Ok((interpreter, None))
}

fn make_replay_producer(config: &Value) -> InterpreterResult {
    let interpreter = ReplayProducer::from_config(config)?;
    Ok((interpreter, None))
}

fn make_json_codec(_config: &Value) -> Result<Box<dyn daq_api::Codec>, PluginError> {
    Ok(Box::new(daq_codec::JsonNumArrayCodec::new()))
}

fn make_packed_codec(_config: &Value) -> Result<Box<dyn daq_api::Codec>, PluginError> {
    Ok(Box::new(daq_codec::PackedBinaryCodec::new()))
}

/// Registers every built-in interpreter/codec kind. Call once at process
/// startup before resolving any worker's configured `kind`.
pub fn register_builtin_plugins(registry: &mut Registry) {
    registry.register_interpreter("passthrough", make_passthrough);
    registry.register_interpreter("threshold", make_threshold);
    registry.register_interpreter("random_array_producer", make_random_array_producer);
    registry.register_interpreter("replay_producer", make_replay_producer);

    registry.register_codec("json_numarray", make_json_codec);
    registry.register_codec("packed_binary", make_packed_codec);

    registry.register_transport("tcp_client", transport::make_tcp_client);
    registry.register_transport("tcp_server", transport::make_tcp_server);

    registry.register_framing("length_prefixed", framing::make_length_prefixed);
}
