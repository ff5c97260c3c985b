use std::sync::Arc;

use daq_api::{Codec, Framing, Transport};

/// A frontend (upstream) endpoint: a connecting transport plus the
/// framing/codec pair used to decode inbound bytes.
pub struct FrontendEndpoint {
    pub transport: Box<dyn Transport>,
    pub framing: Arc<dyn Framing>,
    pub codec: Arc<dyn Codec>,
}

/// A backend (downstream) endpoint: a binding transport plus the
/// framing/codec pair used to encode outbound bytes. One backend fans
/// out to every connection it has accepted.
pub struct BackendEndpoint {
    pub transport: Box<dyn Transport>,
    pub framing: Arc<dyn Framing>,
    pub codec: Arc<dyn Codec>,
}
