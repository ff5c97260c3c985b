use std::io::{Read, Write};
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daq_api::{Codec, Command, Framing, TransportStream};

use crate::endpoint::BackendEndpoint;
use crate::latch::ExitLatch;
use crate::stats::WorkerStats;

/// Live connections accepted by one backend, shared between its accept
/// thread and the interpret loop's fan-out writes.
pub type Connections = Arc<Mutex<Vec<Box<dyn TransportStream>>>>;

/// Bounds how long `fan_out`'s write to one backend connection may
/// block. Without this, a peer that stops reading (TCP send buffer
/// fills) would wedge `write_all` forever, freezing the single interpret
/// thread instead of shedding per the drop-tail backpressure model
/// (spec.md §5's suspension points are all short-timeout bounded; a
/// fan-out write is no exception). A stream that times out is treated
/// the same as any other write error: dropped by `fan_out`'s `retain_mut`.
const BACKEND_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Runs on its own OS thread: accepts connections on an already-bound
/// backend transport (`TransceiverBuilder::start` binds every backend
/// synchronously before spawning this thread, so a bind conflict is
/// reported before the worker starts rather than here) for as long as
/// the worker runs, handing each accepted stream to `connections` for
/// the interpret loop to write to. When the worker is bidirectional,
/// also spawns one command-reader thread per accepted connection.
pub fn run_accept(
    worker: String,
    idx: usize,
    mut transport: Box<dyn daq_api::Transport>,
    framing: Arc<dyn Framing>,
    codec: Arc<dyn Codec>,
    connections: Connections,
    latch: ExitLatch,
    command_tx: Option<SyncSender<Command>>,
    stats: Arc<WorkerStats>,
) {
    loop {
        if latch.is_tripped() {
            break;
        }
        match transport.next_connection() {
            Ok(Some(stream)) => {
                tracing::info!(worker = %worker, backend = idx, peer = %stream.peer_info(), "backend accepted connection");
                let _ = stream.set_write_timeout(Some(BACKEND_WRITE_TIMEOUT));
                if let Some(tx) = &command_tx {
                    if let Ok(reader_clone) = stream.try_clone_boxed() {
                        spawn_command_reader(
                            worker.clone(),
                            idx,
                            reader_clone,
                            Arc::clone(&framing),
                            Arc::clone(&codec),
                            tx.clone(),
                            latch.clone(),
                        );
                    }
                }
                connections.lock().expect("connections lock poisoned").push(stream);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(worker = %worker, backend = idx, error = %e, "backend accept error");
                stats.record_fatal();
                latch.trip();
                break;
            }
        }
    }

    let _ = transport.stop();
    tracing::info!(worker = %worker, backend = idx, "backend accept thread exiting");
}

fn spawn_command_reader(
    worker: String,
    idx: usize,
    mut stream: Box<dyn TransportStream>,
    framing: Arc<dyn Framing>,
    codec: Arc<dyn Codec>,
    command_tx: SyncSender<Command>,
    latch: ExitLatch,
) {
    std::thread::spawn(move || {
        let _ = stream.set_read_timeout(Some(Duration::from_millis(100)));
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        while !latch.is_tripped() {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    loop {
                        match framing.decode(&buf) {
                            Ok(Some((payload, consumed))) => {
                                buf.drain(..consumed);
                                match codec.decode(&payload) {
                                    Ok(value) => {
                                        let cmd = Command { frontend: idx, value };
                                        if command_tx.try_send(cmd).is_err() {
                                            tracing::debug!(worker = %worker, backend = idx, "command queue full, command dropped");
                                        }
                                    }
                                    Err(e) => tracing::warn!(worker = %worker, backend = idx, error = %e, "command decode failed"),
                                }
                            }
                            Ok(None) => break,
                            Err(_) => {
                                buf.clear();
                                break;
                            }
                        }
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => break,
            }
        }
    });
}

/// Encodes `value` through `codec`/`framing` and writes it to every live
/// connection on this backend, dropping any connection that errors.
pub fn fan_out(
    connections: &Connections,
    framing: &dyn Framing,
    codec: &dyn Codec,
    value: &serde_json::Value,
    stats: &WorkerStats,
) -> Result<(), daq_api::PluginError> {
    let payload = codec.encode(value)?;
    let mut wire = Vec::new();
    framing.encode(&payload, &mut wire)?;

    let mut guard = connections.lock().expect("connections lock poisoned");
    let before = guard.len();
    guard.retain_mut(|stream| stream.write_all(&wire).is_ok());
    let dropped = before - guard.len();
    for _ in 0..dropped {
        stats.record_dropped_outbound();
    }
    if !guard.is_empty() {
        stats.record_sent();
    }
    Ok(())
}
