use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use daq_api::{InboundBatch, Interpreter};
use serde_json::Value;

use crate::latch::ExitLatch;
use crate::queue::DataSender;
use crate::stats::WorkerStats;
use crate::worker::backend::{fan_out, Connections};
use daq_api::{Codec, Framing};

pub struct BackendHandle {
    pub connections: Connections,
    pub framing: Arc<dyn Framing>,
    pub codec: Arc<dyn Codec>,
}

/// The main worker thread: each tick, pops at most one inbound batch (or
/// runs `refresh` if none arrived within the tick) and fans every
/// resulting value out to all backends. Reverse commands are handled
/// entirely on their own thread (`worker::command::run`), not here —
/// spec.md §4.2 requires that a slow `handle_command` never stalls this
/// loop.
pub fn run(
    worker: String,
    mut interpreter: Box<dyn Interpreter>,
    data_rx: Receiver<InboundBatch>,
    // Held for the lifetime of the loop only to keep `data_rx` from ever
    // observing `Disconnected` when this worker has zero frontends (a
    // producer): `recv_timeout` would otherwise report the channel
    // disconnected on its very first call instead of timing out, and
    // `refresh` would never run.
    _data_tx_keepalive: DataSender<InboundBatch>,
    backends: Vec<BackendHandle>,
    latch: ExitLatch,
    tick: Duration,
    stats: Arc<WorkerStats>,
) {
    if let Err(e) = interpreter.setup() {
        tracing::error!(worker = %worker, error = %e, "interpreter setup failed, worker will not run");
        latch.trip();
        return;
    }

    loop {
        if latch.is_tripped() {
            break;
        }

        match data_rx.recv_timeout(tick) {
            Ok(batch) => match interpreter.interpret(batch.entries) {
                Ok(outputs) => dispatch(&worker, &backends, outputs, &stats),
                Err(e) => tracing::warn!(worker = %worker, error = %e, "interpret failed, batch skipped"),
            },
            Err(RecvTimeoutError::Timeout) => match interpreter.refresh() {
                Ok(outputs) => dispatch(&worker, &backends, outputs, &stats),
                Err(e) => tracing::warn!(worker = %worker, error = %e, "refresh failed"),
            },
            Err(RecvTimeoutError::Disconnected) => match interpreter.refresh() {
                Ok(outputs) => dispatch(&worker, &backends, outputs, &stats),
                Err(e) => tracing::warn!(worker = %worker, error = %e, "refresh failed"),
            },
        }
    }

    tracing::info!(worker = %worker, "interpret thread exiting");
}

fn dispatch(worker: &str, backends: &[BackendHandle], outputs: Vec<Value>, stats: &WorkerStats) {
    for value in outputs {
        for backend in backends {
            if let Err(e) = fan_out(&backend.connections, backend.framing.as_ref(), backend.codec.as_ref(), &value, stats)
            {
                tracing::warn!(worker = %worker, error = %e, "backend encode failed, value dropped for this backend");
            }
        }
    }
}
