//! The Transceiver runtime: one OS-thread set per worker (receive loop
//! per frontend, accept loop per backend, one interpret loop, and an
//! optional command-reader thread per bidirectional backend
//! connection), communicating only through two bounded `mpsc` channels.
//!
//! Grounded on the teacher's `libs/pipeline::source`/`sink` thread/async
//! bridging pattern and `plugins/transport/tcp-server`/`tcp-client`, and
//! on the original converter's `receiver_loop`/`interpret_data` hook
//! surface.

pub mod endpoint;
pub mod latch;
pub mod queue;
pub mod stats;
pub mod transceiver;
pub mod worker;

pub use endpoint::{BackendEndpoint, FrontendEndpoint};
pub use latch::ExitLatch;
pub use queue::{data_channel, DataSender};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
pub use transceiver::{Transceiver, TransceiverBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use daq_api::{Framing, PassthroughInterpreter, PluginError, Transport, TransportStream};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    struct LenPrefixFraming;
    impl Framing for LenPrefixFraming {
        fn decode(&self, buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PluginError> {
            if buf.len() < 4 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            if buf.len() < 4 + len {
                return Ok(None);
            }
            Ok(Some((buf[4..4 + len].to_vec(), 4 + len)))
        }

        fn encode(&self, data: &[u8], out: &mut Vec<u8>) -> Result<(), PluginError> {
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
            Ok(())
        }
    }

    struct JsonLineCodec;
    impl daq_api::Codec for JsonLineCodec {
        fn decode(&self, frame: &[u8]) -> Result<serde_json::Value, PluginError> {
            serde_json::from_slice(frame).map_err(PluginError::from)
        }
        fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, PluginError> {
            serde_json::to_vec(value).map_err(PluginError::from)
        }
    }

    struct ConnectOnce {
        addr: String,
        done: bool,
    }
    impl Transport for ConnectOnce {
        fn start(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
        fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
            if self.done {
                return Ok(None);
            }
            self.done = true;
            let stream = TcpStream::connect(&self.addr).map_err(PluginError::from)?;
            Ok(Some(Box::new(stream)))
        }
        fn stop(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    struct BindAccept {
        listener: Option<TcpListener>,
        addr: String,
    }
    impl Transport for BindAccept {
        fn start(&mut self) -> Result<(), PluginError> {
            self.listener = Some(TcpListener::bind(&self.addr).map_err(PluginError::from)?);
            Ok(())
        }
        fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
            let listener = self.listener.as_ref().expect("started");
            let (stream, _) = listener.accept().map_err(PluginError::from)?;
            Ok(Some(Box::new(stream)))
        }
        fn stop(&mut self) -> Result<(), PluginError> {
            self.listener = None;
            Ok(())
        }
    }

    #[test]
    fn forwards_a_value_from_frontend_to_backend() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let backend_addr = backend_listener.local_addr().unwrap().to_string();
        drop(backend_listener);

        let frontend_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let frontend_addr = frontend_listener.local_addr().unwrap().to_string();

        let server_thread = std::thread::spawn(move || {
            let (mut stream, _) = frontend_listener.accept().unwrap();
            let value = serde_json::json!({"x": 1});
            let payload = serde_json::to_vec(&value).unwrap();
            let mut wire = Vec::new();
            wire.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            wire.extend_from_slice(&payload);
            stream.write_all(&wire).unwrap();
        });

        let transceiver = TransceiverBuilder::new("test", Box::new(PassthroughInterpreter))
            .frontend(FrontendEndpoint {
                transport: Box::new(ConnectOnce { addr: frontend_addr, done: false }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .backend(BackendEndpoint {
                transport: Box::new(BindAccept { listener: None, addr: backend_addr.clone() }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .interpret_tick(Duration::from_millis(5))
            .start()
            .expect("transceiver should start");

        server_thread.join().unwrap();

        // Give the backend accept thread a moment to bind before connecting.
        let mut client = None;
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect(&backend_addr) {
                client = Some(stream);
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let mut client = client.expect("backend should be listening");
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let mut len_buf = [0u8; 4];
        client.read_exact(&mut len_buf).unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        client.read_exact(&mut payload).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, serde_json::json!({"x": 1}));

        transceiver.stop();
    }

    /// A connecting transport that retries for a bit before giving up,
    /// so a chain of transceivers can be started without having to
    /// sequence which backend binds before which frontend connects.
    struct RetryConnect {
        addr: String,
        done: bool,
    }
    impl Transport for RetryConnect {
        fn start(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
        fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
            if self.done {
                return Ok(None);
            }
            for _ in 0..100 {
                if let Ok(stream) = TcpStream::connect(&self.addr) {
                    self.done = true;
                    return Ok(Some(Box::new(stream)));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(PluginError::io(format!("timed out connecting to {}", self.addr)))
        }
        fn stop(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    /// Binds an ephemeral port, reads back its address, then frees the
    /// port so a `BindAccept`/`RetryConnect` pair can reuse it without a
    /// fixed port number.
    fn free_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    fn read_one_frame(stream: &mut TcpStream) -> serde_json::Value {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    fn write_one_frame(stream: &mut TcpStream, value: &serde_json::Value) {
        let payload = serde_json::to_vec(value).unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        wire.extend_from_slice(&payload);
        stream.write_all(&wire).unwrap();
    }

    /// S1: a straight chain of 10 forwarders preserves a single message
    /// end-to-end (spec.md §8 S1, scaled down from fixed ports 5500/5510
    /// to ephemeral ones).
    #[test]
    fn chain_of_ten_forwarders_preserves_the_message() {
        const CHAIN_LEN: usize = 10;
        let addrs: Vec<String> = (0..=CHAIN_LEN).map(|_| free_addr()).collect();

        let producer_addr = addrs[0].clone();
        let producer_listener = TcpListener::bind(&producer_addr).unwrap();
        let producer = std::thread::spawn(move || {
            let (mut stream, _) = producer_listener.accept().unwrap();
            write_one_frame(&mut stream, &serde_json::json!({"msg": "This is a test message"}));
            // Keep the socket open briefly so the forwarder's receive
            // thread has time to drain the frame before it sees EOF.
            std::thread::sleep(Duration::from_millis(200));
        });

        let mut transceivers = Vec::with_capacity(CHAIN_LEN);
        for i in 0..CHAIN_LEN {
            let transceiver = TransceiverBuilder::new(format!("fwd-{i}"), Box::new(PassthroughInterpreter))
                .frontend(FrontendEndpoint {
                    transport: Box::new(RetryConnect { addr: addrs[i].clone(), done: false }),
                    framing: Arc::new(LenPrefixFraming),
                    codec: Arc::new(JsonLineCodec),
                })
                .backend(BackendEndpoint {
                    transport: Box::new(BindAccept { listener: None, addr: addrs[i + 1].clone() }),
                    framing: Arc::new(LenPrefixFraming),
                    codec: Arc::new(JsonLineCodec),
                })
                .interpret_tick(Duration::from_millis(5))
                .start()
                .expect("transceiver should start");
            transceivers.push(transceiver);
        }

        let mut consumer = None;
        for _ in 0..100 {
            if let Ok(stream) = TcpStream::connect(&addrs[CHAIN_LEN]) {
                consumer = Some(stream);
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let mut consumer = consumer.expect("last forwarder should be listening");
        consumer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let value = read_one_frame(&mut consumer);
        assert_eq!(value, serde_json::json!({"msg": "This is a test message"}));

        producer.join().unwrap();
        for transceiver in transceivers {
            transceiver.stop();
        }
    }

    /// S2: a fan-out forwarder with two frontends and two backends
    /// delivers each inbound message to every backend exactly once, and
    /// no backend sees a message sent on the other frontend.
    #[test]
    fn fan_out_delivers_one_copy_to_every_backend() {
        let frontend_a_addr = free_addr();
        let frontend_b_addr = free_addr();
        let backend_1_addr = free_addr();
        let backend_2_addr = free_addr();

        let listener_a = TcpListener::bind(&frontend_a_addr).unwrap();
        let listener_b = TcpListener::bind(&frontend_b_addr).unwrap();

        let transceiver = TransceiverBuilder::new("fanout", Box::new(PassthroughInterpreter))
            .frontend(FrontendEndpoint {
                transport: Box::new(RetryConnect { addr: frontend_a_addr.clone(), done: false }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .frontend(FrontendEndpoint {
                transport: Box::new(RetryConnect { addr: frontend_b_addr.clone(), done: false }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .backend(BackendEndpoint {
                transport: Box::new(BindAccept { listener: None, addr: backend_1_addr.clone() }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .backend(BackendEndpoint {
                transport: Box::new(BindAccept { listener: None, addr: backend_2_addr.clone() }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .interpret_tick(Duration::from_millis(5))
            .start()
            .expect("transceiver should start");

        // RetryConnect on the transceiver's side connects to these
        // listeners; accept the connection from the test's end so the
        // test controls exactly what gets sent and when.
        let (mut producer_a, _) = listener_a.accept().unwrap();
        let (mut producer_b, _) = listener_b.accept().unwrap();

        let mut connect_backend = |addr: &str| {
            for _ in 0..100 {
                if let Ok(stream) = TcpStream::connect(addr) {
                    return stream;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            panic!("backend {addr} never started listening");
        };
        let mut consumer_1 = connect_backend(&backend_1_addr);
        let mut consumer_2 = connect_backend(&backend_2_addr);
        consumer_1.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        consumer_2.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        write_one_frame(&mut producer_a, &serde_json::json!({"input": "a"}));
        assert_eq!(read_one_frame(&mut consumer_1), serde_json::json!({"input": "a"}));
        assert_eq!(read_one_frame(&mut consumer_2), serde_json::json!({"input": "a"}));

        write_one_frame(&mut producer_b, &serde_json::json!({"input": "b"}));
        assert_eq!(read_one_frame(&mut consumer_1), serde_json::json!({"input": "b"}));
        assert_eq!(read_one_frame(&mut consumer_2), serde_json::json!({"input": "b"}));

        // Neither backend should have anything further queued up.
        consumer_1.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut probe = [0u8; 1];
        let probe_err = consumer_1.read(&mut probe).unwrap_err().kind();
        assert!(matches!(
            probe_err,
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));

        transceiver.stop();
    }

    /// S5: with `max_buffer` set, batches that arrive faster than the
    /// interpret loop can drain them are dropped (not queued unbounded),
    /// and every successfully queued batch is eventually interpreted —
    /// `dropped + interpreted == injected`.
    #[test]
    fn backpressure_drops_the_newest_batch_and_accounts_for_every_message() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct SlowCounter(Arc<AtomicUsize>);
        impl daq_api::Interpreter for SlowCounter {
            fn interpret(&mut self, batch: Vec<(usize, serde_json::Value)>) -> Result<Vec<serde_json::Value>, PluginError> {
                std::thread::sleep(Duration::from_millis(2));
                self.0.fetch_add(batch.len(), Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let frontend_addr = free_addr();
        let listener = TcpListener::bind(&frontend_addr).unwrap();

        let interpreted = Arc::new(AtomicUsize::new(0));
        let transceiver = TransceiverBuilder::new("shed", Box::new(SlowCounter(Arc::clone(&interpreted))))
            .frontend(FrontendEndpoint {
                transport: Box::new(RetryConnect { addr: frontend_addr.clone(), done: false }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .max_buffer(Some(4))
            .interpret_tick(Duration::from_millis(5))
            .start()
            .expect("transceiver should start");

        let (mut producer, _) = listener.accept().unwrap();
        const INJECTED: usize = 200;
        for i in 0..INJECTED {
            write_one_frame(&mut producer, &serde_json::json!({"seq": i}));
        }

        // Give the receive thread time to drain every frame off the
        // wire and the (slow) interpret loop time to drain the queue.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = transceiver.stats();
            if stats.received as usize == INJECTED
                && interpreted.load(Ordering::SeqCst) as u64 + stats.dropped_inbound == stats.received
            {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "backpressure invariant never settled");
            std::thread::sleep(Duration::from_millis(20));
        }

        let stats = transceiver.stats();
        assert_eq!(stats.received, INJECTED as u64);
        assert!(stats.dropped_inbound > 0, "a slow interpreter with a small max_buffer should drop something");
        assert_eq!(interpreted.load(Ordering::SeqCst) as u64 + stats.dropped_inbound, stats.received);

        transceiver.stop();
    }

    /// A frontend transport whose `next_connection` fails outright after
    /// one clean connect, simulating a fatal transport error during
    /// steady state rather than a reconnectable drop.
    struct FailAfterOne {
        addr: String,
        connected: bool,
    }
    impl Transport for FailAfterOne {
        fn start(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
        fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
            if !self.connected {
                self.connected = true;
                let stream = TcpStream::connect(&self.addr).map_err(PluginError::from)?;
                return Ok(Some(Box::new(stream)));
            }
            Err(PluginError::io("transport wedged"))
        }
        fn stop(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    /// spec.md §7 item 5: a fatal transport error during steady state
    /// terminates the worker and is surfaced on its stats so the
    /// Manager's liveness probing can report it.
    #[test]
    fn fatal_transport_error_marks_stats_fatal_and_stops_the_worker() {
        let frontend_addr = free_addr();
        let listener = TcpListener::bind(&frontend_addr).unwrap();

        let transceiver = TransceiverBuilder::new("wedge", Box::new(PassthroughInterpreter))
            .frontend(FrontendEndpoint {
                transport: Box::new(FailAfterOne { addr: frontend_addr, connected: false }),
                framing: Arc::new(LenPrefixFraming),
                codec: Arc::new(JsonLineCodec),
            })
            .interpret_tick(Duration::from_millis(5))
            .start()
            .expect("transceiver should start");

        let (mut producer, _) = listener.accept().unwrap();
        // Close the one connection the transport will ever hand out, so
        // `read_connection` returns and the receive loop calls back into
        // `next_connection`, which then fails fatally.
        drop(producer.flush());
        drop(producer);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if transceiver.stats().fatal {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "fatal flag was never set");
            std::thread::sleep(Duration::from_millis(20));
        }

        transceiver.stop();
    }
}
