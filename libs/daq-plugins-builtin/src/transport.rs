use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use daq_api::{PluginError, Transport, TransportStream};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct TcpEndpointConfig {
    host: String,
    port: u16,
}

/// How long a frontend keeps retrying a peer that refuses the
/// connection before giving up. Spec.md §4.4 "the pipeline tolerates
/// temporary absence of peers" — workers may start in any order, so a
/// single failed connect attempt must not be fatal.
const CONNECT_RETRY_BUDGET: Duration = Duration::from_secs(30);
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Connects once to a remote address, retrying for up to
/// [`CONNECT_RETRY_BUDGET`] if the peer isn't listening yet. Used for
/// frontends. Grounded on `plugins/transport/tcp-client`.
pub struct TcpClientTransport {
    addr: String,
    connected: bool,
}

impl Transport for TcpClientTransport {
    fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
        if self.connected {
            return Ok(None);
        }
        let deadline = Instant::now() + CONNECT_RETRY_BUDGET;
        let mut last_err = None;
        loop {
            match TcpStream::connect(&self.addr) {
                Ok(stream) => {
                    self.connected = true;
                    tracing::info!(addr = %self.addr, "tcp-client connected");
                    return Ok(Some(Box::new(stream)));
                }
                Err(e) => {
                    if Instant::now() >= deadline {
                        last_err = Some(e);
                        break;
                    }
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        }
        Err(PluginError::io(format!(
            "tcp connect to {} timed out after {CONNECT_RETRY_BUDGET:?}: {}",
            self.addr,
            last_err.expect("retry loop only exits via a stored error")
        )))
    }

    fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

pub fn make_tcp_client(config: &Value) -> Result<Box<dyn Transport>, PluginError> {
    let cfg: TcpEndpointConfig = serde_json::from_value(config.clone())
        .map_err(|e| PluginError::config(format!("tcp-client config: {e}")))?;
    Ok(Box::new(TcpClientTransport {
        addr: format!("{}:{}", cfg.host, cfg.port),
        connected: false,
    }))
}

/// Binds a local address and accepts connections indefinitely. Used for
/// backends. Grounded on `plugins/transport/tcp-server`.
pub struct TcpServerTransport {
    addr: String,
    listener: Option<TcpListener>,
}

impl Transport for TcpServerTransport {
    fn start(&mut self) -> Result<(), PluginError> {
        let listener = TcpListener::bind(&self.addr)
            .map_err(|e| PluginError::io(format!("tcp bind {}: {e}", self.addr)))?;
        tracing::info!(addr = %self.addr, "tcp-server bound");
        self.listener = Some(listener);
        Ok(())
    }

    fn next_connection(&mut self) -> Result<Option<Box<dyn TransportStream>>, PluginError> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| PluginError::logic("tcp-server accept before start"))?;
        let (stream, peer) = listener
            .accept()
            .map_err(|e| PluginError::io(format!("tcp accept: {e}")))?;
        tracing::info!(%peer, "tcp-server accepted connection");
        Ok(Some(Box::new(stream)))
    }

    fn stop(&mut self) -> Result<(), PluginError> {
        self.listener = None;
        Ok(())
    }
}

pub fn make_tcp_server(config: &Value) -> Result<Box<dyn Transport>, PluginError> {
    let cfg: TcpEndpointConfig = serde_json::from_value(config.clone())
        .map_err(|e| PluginError::config(format!("tcp-server config: {e}")))?;
    Ok(Box::new(TcpServerTransport {
        addr: format!("{}:{}", cfg.host, cfg.port),
        listener: None,
    }))
}
