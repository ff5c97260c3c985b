use serde_json::Value;

/// One polling cycle's worth of decoded frames, each tagged with which
/// frontend produced it (index into `WorkerConfig::frontend`). Ordering
/// mirrors the frontend list, then arrival order within a frontend.
/// Produced by the receive thread whenever at least one frontend yields
/// a frame during a poll cycle; length is 1..N_frontends, never 0 (an
/// empty cycle produces no batch at all).
#[derive(Debug, Clone, Default)]
pub struct InboundBatch {
    pub entries: Vec<(usize, Value)>,
}

/// A value produced by `Interpreter::interpret`/`refresh`, ready to be
/// encoded and fanned out to every backend.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub value: Value,
}

impl OutboundBatch {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// A message arriving on the reverse (command) channel of a
/// bidirectional worker.
#[derive(Debug, Clone)]
pub struct Command {
    pub frontend: usize,
    pub value: Value,
}
