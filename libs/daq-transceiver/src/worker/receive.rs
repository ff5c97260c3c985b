use std::io::Read;
use std::sync::mpsc::Receiver as StdReceiver;
use std::sync::Arc;
use std::time::Duration;

use daq_api::{Codec, Framing, InboundBatch, TransportStream};
use serde_json::Value;

use crate::latch::ExitLatch;
use crate::queue::DataSender;
use crate::stats::WorkerStats;

/// One frontend's live decode state, owned exclusively by the shared
/// receive thread: the stream currently connected (if any, handed over
/// by `worker::connector::run`), its accumulated byte buffer, and the
/// framing/codec pair used to decode it.
struct FrontendState {
    framing: Arc<dyn Framing>,
    codec: Arc<dyn Codec>,
    stream_rx: StdReceiver<Box<dyn TransportStream>>,
    stream: Option<Box<dyn TransportStream>>,
    buf: Vec<u8>,
}

/// Runs on the worker's single receive thread (spec.md §4.2: "Receive
/// thread. Owns all frontend sockets."). Each poll cycle, reads whatever
/// is immediately available from every connected frontend, decodes every
/// complete frame, and pushes one [`InboundBatch`] carrying every frame
/// that completed this cycle, tagged with its frontend index — spec.md
/// §3's Inbound-batch entity, "ordered list of (source_uri,
/// deserialized_payload) pairs... assembled by the receive thread" —
/// rather than one queue item per frame. Exits only when the exit latch
/// trips; a frontend whose connection drops and is never replaced simply
/// stops contributing to batches instead of ending the whole thread.
pub fn run(
    worker: String,
    frontends: Vec<(Arc<dyn Framing>, Arc<dyn Codec>, StdReceiver<Box<dyn TransportStream>>)>,
    data_tx: DataSender<InboundBatch>,
    latch: ExitLatch,
    stats: Arc<WorkerStats>,
    poll_interval: Duration,
) {
    let mut states: Vec<FrontendState> = frontends
        .into_iter()
        .map(|(framing, codec, stream_rx)| FrontendState {
            framing,
            codec,
            stream_rx,
            stream: None,
            buf: Vec::new(),
        })
        .collect();

    loop {
        if latch.is_tripped() {
            break;
        }

        for state in &mut states {
            if state.stream.is_none() {
                if let Ok(stream) = state.stream_rx.try_recv() {
                    let _ = stream.set_read_timeout(Some(poll_interval));
                    state.stream = Some(stream);
                }
            }
        }

        let mut batch = Vec::new();
        for (idx, state) in states.iter_mut().enumerate() {
            poll_one(&worker, idx, state, &mut batch, &stats);
        }

        if !batch.is_empty() {
            let n = batch.len() as u64;
            if !data_tx.try_push(InboundBatch { entries: batch }) {
                stats.record_dropped_inbound(n);
                tracing::debug!(worker = %worker, "input queue full, batch dropped");
            }
        }
    }

    tracing::info!(worker = %worker, "receive thread exiting");
}

fn poll_one(
    worker: &str,
    idx: usize,
    state: &mut FrontendState,
    batch: &mut Vec<(usize, Value)>,
    stats: &WorkerStats,
) {
    let Some(stream) = state.stream.as_mut() else {
        return;
    };

    let mut chunk = [0u8; 8192];
    match stream.read(&mut chunk) {
        Ok(0) => state.stream = None, // peer closed
        Ok(n) => {
            state.buf.extend_from_slice(&chunk[..n]);
            drain_frames(worker, idx, state, batch, stats);
        }
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            // Nothing ready this cycle; benign.
        }
        Err(e) => {
            tracing::warn!(worker = %worker, frontend = idx, error = %e, "frontend read error, connection dropped");
            state.stream = None;
        }
    }
}

fn drain_frames(
    worker: &str,
    idx: usize,
    state: &mut FrontendState,
    batch: &mut Vec<(usize, Value)>,
    stats: &WorkerStats,
) {
    loop {
        match state.framing.decode(&state.buf) {
            Ok(Some((payload, consumed))) => {
                state.buf.drain(..consumed);
                match state.codec.decode(&payload) {
                    Ok(value) => {
                        stats.record_received();
                        batch.push((idx, value));
                    }
                    Err(e) => {
                        stats.record_decode_error();
                        tracing::warn!(worker = %worker, frontend = idx, error = %e, "codec decode failed, frame skipped");
                    }
                }
            }
            Ok(None) => return,
            Err(e) => {
                stats.record_decode_error();
                tracing::warn!(worker = %worker, frontend = idx, error = %e, "framing error, buffer discarded");
                state.buf.clear();
                return;
            }
        }
    }
}
