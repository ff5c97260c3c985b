use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver as MpscReceiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use daq_api::{Codec, Framing, PluginError, TransportStream};
use daq_transceiver::{data_channel, DataSender, ExitLatch, FrontendEndpoint};
use serde_json::Value;

use crate::handler::ReceiverHandler;
use crate::refresh::RefreshRate;

const COMMAND_QUEUE_DEPTH: usize = 64;

type WriteHandle = Arc<Mutex<Option<Box<dyn TransportStream>>>>;

/// Builds a [`Receiver`] from a single frontend endpoint and a
/// [`ReceiverHandler`], mirroring `online_monitor/receiver/receiver.py`'s
/// constructor arguments (`frontend`, `kind`, handler behavior supplied
/// by subclassing there, by trait object here).
pub struct ReceiverBuilder {
    name: String,
    frontend_framing: Arc<dyn Framing>,
    frontend_codec: Arc<dyn Codec>,
    frontend: FrontendEndpoint,
    handler: Box<dyn ReceiverHandler>,
    bidirectional: bool,
    poll_interval: Duration,
    tick: Duration,
    max_buffer: Option<usize>,
}

impl ReceiverBuilder {
    pub fn new(
        name: impl Into<String>,
        frontend: FrontendEndpoint,
        handler: Box<dyn ReceiverHandler>,
    ) -> Self {
        let frontend_framing = Arc::clone(&frontend.framing);
        let frontend_codec = Arc::clone(&frontend.codec);
        Self {
            name: name.into(),
            frontend_framing,
            frontend_codec,
            frontend,
            handler,
            bidirectional: false,
            poll_interval: Duration::from_millis(100),
            tick: Duration::from_millis(10),
            max_buffer: None,
        }
    }

    /// Enables the reverse command path, the Rust analogue of
    /// `set_bidirectional_communication` switching the original's socket
    /// type to DEALER.
    pub fn bidirectional(mut self, b: bool) -> Self {
        self.bidirectional = b;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn dispatch_tick(mut self, d: Duration) -> Self {
        self.tick = d;
        self
    }

    /// `Some(k)` bounds the data queue at depth `k` with drop-tail
    /// shedding once full; `None` (the default) leaves it unbounded, per
    /// spec.md §3's "absent ⇒ unbounded".
    pub fn max_buffer(mut self, n: Option<usize>) -> Self {
        self.max_buffer = n;
        self
    }

    pub fn start(self) -> Receiver {
        let latch = ExitLatch::new();
        let active = Arc::new(AtomicBool::new(true));
        let refresh_rate = Arc::new(Mutex::new(RefreshRate::default()));
        let write_handle: WriteHandle = Arc::new(Mutex::new(None));
        let handler = Arc::new(Mutex::new(self.handler));

        if let Err(e) = handler.lock().expect("handler lock poisoned").setup() {
            tracing::error!(worker = %self.name, error = %e, "receiver setup failed");
        }

        let (data_tx, data_rx) = data_channel::<Value>(self.max_buffer);
        let (command_tx, command_rx) = if self.bidirectional {
            let (tx, rx) = sync_channel::<Value>(COMMAND_QUEUE_DEPTH);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut handles = Vec::new();

        {
            let name = self.name.clone();
            let latch = latch.clone();
            let poll_interval = self.poll_interval;
            let write_handle = Arc::clone(&write_handle);
            let frontend = self.frontend;
            handles.push(std::thread::spawn(move || {
                run_receive(name, frontend, data_tx, write_handle, latch, poll_interval);
            }));
        }

        {
            let name = self.name.clone();
            let latch = latch.clone();
            let handler = Arc::clone(&handler);
            let active = Arc::clone(&active);
            let refresh_rate = Arc::clone(&refresh_rate);
            let tick = self.tick;
            handles.push(std::thread::spawn(move || {
                run_dispatch(name, data_rx, handler, active, refresh_rate, latch, tick);
            }));
        }

        if let Some(rx) = command_rx {
            let name = self.name.clone();
            let latch = latch.clone();
            let write_handle = Arc::clone(&write_handle);
            let framing = Arc::clone(&self.frontend_framing);
            let codec = Arc::clone(&self.frontend_codec);
            handles.push(std::thread::spawn(move || {
                run_command_writer(name, rx, write_handle, framing, codec, latch);
            }));
        }

        {
            let latch = latch.clone();
            let handler = Arc::clone(&handler);
            let refresh_rate = Arc::clone(&refresh_rate);
            handles.push(std::thread::spawn(move || {
                run_refresh_timer(handler, refresh_rate, latch);
            }));
        }

        Receiver {
            name: self.name,
            active,
            refresh_rate,
            command_tx,
            latch,
            handles,
        }
    }
}

/// A running Receiver: its receive, dispatch, refresh-timer, and
/// (when bidirectional) command-writer threads.
pub struct Receiver {
    name: String,
    active: Arc<AtomicBool>,
    refresh_rate: Arc<Mutex<RefreshRate>>,
    command_tx: Option<SyncSender<Value>>,
    latch: ExitLatch,
    handles: Vec<JoinHandle<()>>,
}

impl Receiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gate on whether arriving data reaches the handler at all, the
    /// direct analogue of the original's `self._active` flag checked by
    /// `handle_data_if_active`.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// `rate` is in messages/second; `None` resets to "go as fast as
    /// data arrives", `Some(0.0)` disables refresh entirely.
    pub fn set_refresh_rate(&self, rate: Option<f64>) {
        let resolved = RefreshRate::from_messages_per_second(rate);
        if matches!(resolved, RefreshRate::Disabled) {
            tracing::warn!(worker = %self.name, "refresh rate set to 0, data is not buffered");
        }
        *self.refresh_rate.lock().expect("refresh_rate lock poisoned") = resolved;
    }

    /// Queues `command` to be written back over the frontend connection.
    /// Only valid on a bidirectional receiver, matching `send_command`'s
    /// reliance on `self._cmd_queue` existing only in DEALER mode.
    pub fn send_command(&self, command: Value) -> Result<(), PluginError> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| PluginError::logic("receiver is not bidirectional"))?;
        if tx.try_send(command).is_err() {
            tracing::debug!(worker = %self.name, "command queue full, command dropped");
        }
        Ok(())
    }

    pub fn stop(self) {
        self.latch.trip();
        for handle in self.handles {
            let _ = handle.join();
        }
        tracing::info!(worker = %self.name, "receiver stopped");
    }
}

fn run_receive(
    worker: String,
    mut endpoint: FrontendEndpoint,
    data_tx: DataSender<Value>,
    write_handle: WriteHandle,
    latch: ExitLatch,
    poll_interval: Duration,
) {
    if let Err(e) = endpoint.transport.start() {
        tracing::error!(worker = %worker, error = %e, "receiver frontend failed to start");
        return;
    }

    loop {
        if latch.is_tripped() {
            break;
        }
        let mut stream = match endpoint.transport.next_connection() {
            Ok(Some(stream)) => stream,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(worker = %worker, error = %e, "receiver frontend connection failed");
                break;
            }
        };
        let _ = stream.set_read_timeout(Some(poll_interval));
        if let Ok(clone) = stream.try_clone_boxed() {
            *write_handle.lock().expect("write handle lock poisoned") = Some(clone);
        }

        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        'conn: loop {
            if latch.is_tripped() {
                break;
            }
            match stream.read(&mut chunk) {
                Ok(0) => break 'conn,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    loop {
                        match endpoint.framing.decode(&buf) {
                            Ok(Some((payload, consumed))) => {
                                buf.drain(..consumed);
                                match endpoint.codec.decode(&payload) {
                                    Ok(value) => {
                                        if !data_tx.try_push(value) {
                                            tracing::debug!(worker = %worker, "receiver queue full, message dropped");
                                        }
                                    }
                                    Err(e) => tracing::warn!(worker = %worker, error = %e, "codec decode failed"),
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!(worker = %worker, error = %e, "framing error, buffer discarded");
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
                Err(e) => {
                    tracing::warn!(worker = %worker, error = %e, "receiver read error, reconnecting");
                    break 'conn;
                }
            }
        }
        *write_handle.lock().expect("write handle lock poisoned") = None;
    }

    let _ = endpoint.transport.stop();
    tracing::info!(worker = %worker, "receiver receive thread exiting");
}

fn run_dispatch(
    worker: String,
    data_rx: MpscReceiver<Value>,
    handler: Arc<Mutex<Box<dyn ReceiverHandler>>>,
    active: Arc<AtomicBool>,
    refresh_rate: Arc<Mutex<RefreshRate>>,
    latch: ExitLatch,
    tick: Duration,
) {
    loop {
        if latch.is_tripped() {
            break;
        }
        match data_rx.recv_timeout(tick) {
            Ok(value) => {
                if active.load(Ordering::SeqCst) {
                    let mut guard = handler.lock().expect("handler lock poisoned");
                    if let Err(e) = guard.handle_data(value) {
                        tracing::warn!(worker = %worker, error = %e, "handle_data failed");
                    }
                    let go_fast = matches!(
                        *refresh_rate.lock().expect("refresh_rate lock poisoned"),
                        RefreshRate::AsFastAsData
                    );
                    if go_fast {
                        if let Err(e) = guard.refresh_data() {
                            tracing::warn!(worker = %worker, error = %e, "refresh_data failed");
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::info!(worker = %worker, "receiver dispatch thread exiting");
}

fn run_refresh_timer(
    handler: Arc<Mutex<Box<dyn ReceiverHandler>>>,
    refresh_rate: Arc<Mutex<RefreshRate>>,
    latch: ExitLatch,
) {
    let poll = Duration::from_millis(50);
    let mut elapsed = Duration::ZERO;
    loop {
        if latch.is_tripped() {
            break;
        }
        std::thread::sleep(poll);
        elapsed += poll;
        let current = *refresh_rate.lock().expect("refresh_rate lock poisoned");
        if let RefreshRate::Periodic(period) = current {
            if elapsed >= period {
                elapsed = Duration::ZERO;
                if let Err(e) = handler.lock().expect("handler lock poisoned").refresh_data() {
                    tracing::warn!(error = %e, "periodic refresh_data failed");
                }
            }
        } else {
            elapsed = Duration::ZERO;
        }
    }
}

fn run_command_writer(
    worker: String,
    command_rx: MpscReceiver<Value>,
    write_handle: WriteHandle,
    framing: Arc<dyn Framing>,
    codec: Arc<dyn Codec>,
    latch: ExitLatch,
) {
    loop {
        match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(command) => {
                let encoded = codec.encode(&command).and_then(|payload| {
                    let mut wire = Vec::new();
                    framing.encode(&payload, &mut wire)?;
                    Ok(wire)
                });
                match encoded {
                    Ok(wire) => {
                        let mut guard = write_handle.lock().expect("write handle lock poisoned");
                        if let Some(stream) = guard.as_mut() {
                            if let Err(e) = stream.write_all(&wire) {
                                tracing::warn!(worker = %worker, error = %e, "failed to write command");
                            }
                        } else {
                            tracing::debug!(worker = %worker, "no active connection, command dropped");
                        }
                    }
                    Err(e) => tracing::warn!(worker = %worker, error = %e, "failed to encode command"),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if latch.is_tripped() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
