//! The Receiver runtime: a single-frontend consumer that dispatches
//! decoded values to a user-supplied [`ReceiverHandler`] and, depending
//! on its [`RefreshRate`], periodically (or immediately) asks the
//! handler to refresh its view of the accumulated state.
//!
//! Grounded on `online_monitor/receiver/receiver.py`'s `Receiver` base
//! class and its `ConverterManager`-facing `setup_receiver`/
//! `handle_data_if_active`/`refresh_data` hook surface.

pub mod handler;
pub mod receiver;
pub mod refresh;

pub use handler::ReceiverHandler;
pub use receiver::{Receiver, ReceiverBuilder};
pub use refresh::RefreshRate;

#[cfg(test)]
mod tests {
    use super::*;
    use daq_api::{Codec, Framing, PluginError, Transport, TransportStream};
    use daq_transceiver::FrontendEndpoint;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
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
    impl Codec for JsonLineCodec {
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

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        refreshes: Arc<AtomicUsize>,
    }
    impl ReceiverHandler for CountingHandler {
        fn handle_data(&mut self, _data: serde_json::Value) -> Result<(), PluginError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn refresh_data(&mut self) -> Result<(), PluginError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn dispatches_to_handler_and_refreshes_as_fast_as_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_thread = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let value = serde_json::json!({"x": 1});
            let payload = serde_json::to_vec(&value).unwrap();
            let mut wire = Vec::new();
            wire.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            wire.extend_from_slice(&payload);
            stream.write_all(&wire).unwrap();
            // Keep the connection open briefly so the receive thread has
            // time to decode before the test tears it down.
            std::thread::sleep(Duration::from_millis(200));
        });

        let count = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: Arc::clone(&count),
            refreshes: Arc::clone(&refreshes),
        };

        let frontend = FrontendEndpoint {
            transport: Box::new(ConnectOnce { addr, done: false }),
            framing: Arc::new(LenPrefixFraming),
            codec: Arc::new(JsonLineCodec),
        };
        let receiver =
            ReceiverBuilder::new("test-receiver", frontend, Box::new(handler)).start();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(refreshes.load(Ordering::SeqCst) >= 1);

        server_thread.join().unwrap();
        receiver.stop();
    }

    #[test]
    fn inactive_receiver_does_not_dispatch() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server_thread = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let value = serde_json::json!({"x": 1});
            let payload = serde_json::to_vec(&value).unwrap();
            let mut wire = Vec::new();
            wire.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            wire.extend_from_slice(&payload);
            stream.write_all(&wire).unwrap();
            std::thread::sleep(Duration::from_millis(200));
        });

        let count = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: Arc::clone(&count),
            refreshes: Arc::clone(&refreshes),
        };

        let frontend = FrontendEndpoint {
            transport: Box::new(ConnectOnce { addr, done: false }),
            framing: Arc::new(LenPrefixFraming),
            codec: Arc::new(JsonLineCodec),
        };
        let receiver =
            ReceiverBuilder::new("test-receiver", frontend, Box::new(handler)).start();
        receiver.set_active(false);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        server_thread.join().unwrap();
        receiver.stop();
    }

    #[test]
    fn send_command_requires_bidirectional() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _keep = listener; // never accepted; receive thread just idles.

        let count = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: Arc::clone(&count),
            refreshes: Arc::clone(&refreshes),
        };
        let frontend = FrontendEndpoint {
            transport: Box::new(ConnectOnce { addr, done: false }),
            framing: Arc::new(LenPrefixFraming),
            codec: Arc::new(JsonLineCodec),
        };
        let receiver =
            ReceiverBuilder::new("test-receiver", frontend, Box::new(handler)).start();

        let result = receiver.send_command(serde_json::json!({"ping": true}));
        assert!(result.is_err());

        receiver.stop();
    }

    #[test]
    fn refresh_rate_tristate_conversion() {
        assert_eq!(
            RefreshRate::from_messages_per_second(None),
            RefreshRate::AsFastAsData
        );
        assert_eq!(
            RefreshRate::from_messages_per_second(Some(0.0)),
            RefreshRate::Disabled
        );
        match RefreshRate::from_messages_per_second(Some(10.0)) {
            RefreshRate::Periodic(d) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("expected Periodic, got {other:?}"),
        }
    }

    #[test]
    fn set_refresh_rate_updates_without_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _keep = listener;

        let count = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: Arc::clone(&count),
            refreshes: Arc::clone(&refreshes),
        };
        let frontend = FrontendEndpoint {
            transport: Box::new(ConnectOnce { addr, done: false }),
            framing: Arc::new(LenPrefixFraming),
            codec: Arc::new(JsonLineCodec),
        };
        let receiver =
            ReceiverBuilder::new("test-receiver", frontend, Box::new(handler)).start();

        receiver.set_refresh_rate(Some(0.0));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);

        receiver.stop();
    }
}
