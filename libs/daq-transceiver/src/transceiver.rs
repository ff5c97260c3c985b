use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use daq_api::{Command, CommandHandler, InboundBatch, Interpreter, PluginError, RunState};

use crate::endpoint::{BackendEndpoint, FrontendEndpoint};
use crate::latch::ExitLatch;
use crate::queue::data_channel;
use crate::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::worker::backend::Connections;
use crate::worker::interpret::BackendHandle;
use crate::worker::{backend, command, connector, interpret, receive};

/// Command-queue depth. Commands arrive far less often than data
/// batches; a generous fixed bound keeps `send_command` non-blocking
/// without needing a separate configuration knob.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Builds a [`Transceiver`] from already-constructed plugin trait
/// objects — the capability-bundle pattern: endpoints, interpreter, and
/// an optional command handler are supplied by value, never subclassed.
pub struct TransceiverBuilder {
    name: String,
    frontends: Vec<FrontendEndpoint>,
    backends: Vec<BackendEndpoint>,
    interpreter: Box<dyn Interpreter>,
    command_handler: Option<Box<dyn CommandHandler>>,
    max_buffer: Option<usize>,
    poll_interval: Duration,
    interpret_tick: Duration,
    bidirectional: bool,
}

impl TransceiverBuilder {
    pub fn new(name: impl Into<String>, interpreter: Box<dyn Interpreter>) -> Self {
        Self {
            name: name.into(),
            frontends: Vec::new(),
            backends: Vec::new(),
            interpreter,
            command_handler: None,
            max_buffer: None,
            poll_interval: Duration::from_millis(1),
            interpret_tick: Duration::from_millis(10),
            bidirectional: false,
        }
    }

    pub fn frontend(mut self, endpoint: FrontendEndpoint) -> Self {
        self.frontends.push(endpoint);
        self
    }

    pub fn backend(mut self, endpoint: BackendEndpoint) -> Self {
        self.backends.push(endpoint);
        self
    }

    pub fn command_handler(mut self, handler: Box<dyn CommandHandler>) -> Self {
        self.command_handler = Some(handler);
        self
    }

    /// `Some(k)` bounds the input queue at depth `k` with drop-tail
    /// shedding once full; `None` (the default) leaves it unbounded, per
    /// spec.md §3's "absent ⇒ unbounded".
    pub fn max_buffer(mut self, n: Option<usize>) -> Self {
        self.max_buffer = n;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn interpret_tick(mut self, d: Duration) -> Self {
        self.interpret_tick = d;
        self
    }

    pub fn bidirectional(mut self, b: bool) -> Self {
        self.bidirectional = b;
        self
    }

    /// Binds every backend synchronously (spec.md §4.2 "backends bind
    /// first"), then spawns the receive thread(s), backend accept
    /// thread(s), and the interpret thread, and returns the running
    /// worker. Matches the `Constructed -> Running` transition.
    ///
    /// A bind conflict at this point is a startup error (spec.md §7
    /// item 1) and is returned to the caller before any thread is
    /// spawned; any backend already bound during this call is torn down
    /// first, satisfying P1 ("after `start()` returns ... every
    /// endpoint URI declared by W is bound") for the failure case too.
    pub fn start(mut self) -> Result<Transceiver, PluginError> {
        for endpoint in &mut self.backends {
            if let Err(e) = endpoint.transport.start() {
                for started in &mut self.backends {
                    let _ = started.transport.stop();
                }
                return Err(e);
            }
        }

        let latch = ExitLatch::new();
        let stats = WorkerStats::new();
        let (data_tx, data_rx) = data_channel::<InboundBatch>(self.max_buffer);
        let (command_tx, command_rx) = if self.bidirectional {
            let (tx, rx) = sync_channel::<Command>(COMMAND_QUEUE_DEPTH);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut handles = Vec::new();

        // Splitting connection establishment (this per-frontend connector
        // thread) from polling (the single shared receive thread below)
        // means a slow or retrying frontend never delays the batch that
        // every other frontend is waiting on.
        let mut receive_frontends = Vec::with_capacity(self.frontends.len());
        for (idx, endpoint) in self.frontends.into_iter().enumerate() {
            let FrontendEndpoint { transport, framing, codec } = endpoint;
            let (stream_tx, stream_rx) = sync_channel(1);
            let worker = self.name.clone();
            let latch = latch.clone();
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                connector::run(worker, idx, transport, stream_tx, latch, stats);
            }));
            receive_frontends.push((framing, codec, stream_rx));
        }

        {
            let worker = self.name.clone();
            let data_tx = data_tx.clone();
            let latch = latch.clone();
            let stats = Arc::clone(&stats);
            let poll_interval = self.poll_interval;
            handles.push(std::thread::spawn(move || {
                receive::run(worker, receive_frontends, data_tx, latch, stats, poll_interval);
            }));
        }

        let mut backend_handles = Vec::with_capacity(self.backends.len());
        for (idx, endpoint) in self.backends.into_iter().enumerate() {
            let BackendEndpoint { transport, framing, codec } = endpoint;
            let connections: Connections = Arc::new(Mutex::new(Vec::new()));
            let worker = self.name.clone();
            let latch = latch.clone();
            let command_tx = command_tx.clone();
            let accept_connections = Arc::clone(&connections);
            let accept_framing = Arc::clone(&framing);
            let accept_codec = Arc::clone(&codec);
            let accept_stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                backend::run_accept(
                    worker,
                    idx,
                    transport,
                    accept_framing,
                    accept_codec,
                    accept_connections,
                    latch,
                    command_tx,
                    accept_stats,
                );
            }));
            backend_handles.push(BackendHandle {
                connections,
                framing,
                codec,
            });
        }
        drop(command_tx);

        // The command thread is entirely separate from the interpret
        // loop below (spec.md §4.2): a slow `handle_command` must never
        // stall `interpret`/`refresh`.
        if let (Some(rx), Some(handler)) = (command_rx, self.command_handler.take()) {
            let worker = self.name.clone();
            let latch_for_command = latch.clone();
            handles.push(std::thread::spawn(move || {
                command::run(worker, handler, rx, latch_for_command);
            }));
        }

        let worker = self.name.clone();
        let latch_for_interpret = latch.clone();
        let stats_for_interpret = Arc::clone(&stats);
        let interpret_tick = self.interpret_tick;
        handles.push(std::thread::spawn(move || {
            interpret::run(
                worker,
                self.interpreter,
                data_rx,
                data_tx,
                backend_handles,
                latch_for_interpret,
                interpret_tick,
                stats_for_interpret,
            );
        }));

        Ok(Transceiver {
            name: self.name,
            state: Arc::new(Mutex::new(RunState::Running)),
            latch,
            stats,
            handles,
        })
    }
}

/// A running Transceiver: the receive, interpret, and (when
/// bidirectional) command threads of one worker.
pub struct Transceiver {
    name: String,
    state: Arc<Mutex<RunState>>,
    latch: ExitLatch,
    stats: Arc<WorkerStats>,
    handles: Vec<JoinHandle<()>>,
}

impl Transceiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Trips the exit latch and joins every worker thread. Threads
    /// notice the latch at their next poll (bounded by `poll_interval`/
    /// `interpret_tick`, both capped well under the 100ms invariant), so
    /// this call returns promptly once they do.
    pub fn stop(self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            *state = RunState::Stopping;
        }
        self.latch.trip();
        for handle in self.handles {
            let _ = handle.join();
        }
        let mut state = self.state.lock().expect("state lock poisoned");
        *state = RunState::Stopped;
        tracing::info!(worker = %self.name, "transceiver stopped");
    }
}
