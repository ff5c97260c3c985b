use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use daq_api::{Transport, TransportStream};

use crate::latch::ExitLatch;
use crate::stats::WorkerStats;

/// Runs on its own OS thread: owns one frontend's transport and performs
/// every blocking connect/retry it involves, handing each resulting
/// stream to the shared receive thread over `stream_tx`. Splitting
/// connection establishment out from polling this way means a slow or
/// retrying frontend (`TcpClientTransport`'s 30s retry budget, say)
/// never delays the receive thread's poll cycle for every other
/// frontend — the receive thread only ever does non-blocking reads on
/// streams that are already connected.
pub fn run(
    worker: String,
    idx: usize,
    mut transport: Box<dyn Transport>,
    stream_tx: SyncSender<Box<dyn TransportStream>>,
    latch: ExitLatch,
    stats: Arc<WorkerStats>,
) {
    if let Err(e) = transport.start() {
        tracing::error!(worker = %worker, frontend = idx, error = %e, "frontend transport failed to start");
        stats.record_fatal();
        latch.trip();
        return;
    }

    loop {
        if latch.is_tripped() {
            break;
        }
        match transport.next_connection() {
            Ok(Some(stream)) => {
                tracing::info!(worker = %worker, frontend = idx, peer = %stream.peer_info(), "frontend connected");
                if stream_tx.send(stream).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(worker = %worker, frontend = idx, error = %e, "frontend connection failed");
                stats.record_fatal();
                latch.trip();
                break;
            }
        }
    }

    let _ = transport.stop();
    tracing::info!(worker = %worker, frontend = idx, "frontend connector thread exiting");
}
