use std::io::{Read, Write};
use std::time::Duration;

use crate::error::PluginError;

/// A single connected byte stream, as handed back by a [`Transport`].
///
/// Blanket-implemented for `std::net::TcpStream`; other transports (unix
/// sockets, in-process pipes for tests) implement it directly.
pub trait TransportStream: Read + Write + Send {
    fn peer_info(&self) -> String {
        "unknown".to_string()
    }

    /// Bound how long a `read` call may block, so the receive thread can
    /// come back and check its exit latch. Default: no-op (the stream
    /// must already be non-blocking or otherwise self-limiting).
    fn set_read_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    /// Bound how long a `write` call may block, so a stalled peer on one
    /// backend connection cannot wedge the interpret thread's fan-out.
    /// Default: no-op (the stream must already be non-blocking or
    /// otherwise self-limiting).
    fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    /// Duplicate this stream's underlying handle so a second thread can
    /// read from it independently (used for the bidirectional
    /// command-reader thread on a backend connection). Default: not
    /// supported.
    fn try_clone_boxed(&self) -> std::io::Result<Box<dyn TransportStream>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "this transport stream cannot be cloned",
        ))
    }
}

impl TransportStream for std::net::TcpStream {
    fn peer_info(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        std::net::TcpStream::set_write_timeout(self, timeout)
    }

    fn try_clone_boxed(&self) -> std::io::Result<Box<dyn TransportStream>> {
        self.try_clone()
            .map(|s| Box::new(s) as Box<dyn TransportStream>)
    }
}

/// A connection-oriented endpoint. Frontends use a connecting
/// implementation (dial once); backends use a binding implementation
/// (accept repeatedly, one stream per accepted connection).
///
/// All methods are blocking; the host calls them from a dedicated
/// thread, never from an async context directly.
pub trait Transport: Send {
    /// Perform setup (bind a listener, resolve DNS, ...). Called once
    /// before the first `next_connection`.
    fn start(&mut self) -> Result<(), PluginError>;

    /// Block until the next connection is available. Connecting
    /// transports return `Ok(None)` after their single connection has
    /// already been handed out; binding transports keep returning
    /// `Ok(Some(..))` for every accepted client.
    fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError>;

    /// Tear down (close the listener, drop the outbound socket).
    fn stop(&mut self) -> Result<(), PluginError>;
}

/// Delimits a byte stream into discrete frames. Decoding is buffer-at-a-
/// time: given however many bytes have accumulated so far, return the
/// next complete frame and how many bytes it consumed, or `None` if more
/// bytes are needed.
pub trait Framing: Send + Sync {
    fn decode(&self, buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PluginError>;
    fn encode(&self, data: &[u8], out: &mut Vec<u8>) -> Result<(), PluginError>;
}
