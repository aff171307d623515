//! Endpoint settings shared by the command and streaming sockets.

use anyhow::{Context, Result};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest, handshake::client::Request, http::HeaderValue,
};
use url::Url;

pub use shared::protocol::DEVICE_SUBPROTOCOL;
pub const COMMAND_PATH: &str = "/command";
pub const STREAM_PATH: &str = "/stream";
pub const DEFAULT_COMMAND_PORT: u16 = 82;
pub const DEFAULT_STREAM_PORT: u16 = 81;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub subprotocol: String,
}

impl TransportConfig {
    pub fn command(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: COMMAND_PATH.to_string(),
            subprotocol: DEVICE_SUBPROTOCOL.to_string(),
        }
    }

    pub fn stream(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: STREAM_PATH.to_string(),
            subprotocol: DEVICE_SUBPROTOCOL.to_string(),
        }
    }

    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("ws://{}:{}", self.host, self.port))?;
        url.set_path(&self.path);
        Ok(url)
    }

    /// Handshake request carrying the device subprotocol header.
    pub(crate) fn client_request(&self) -> Result<Request> {
        let url = self
            .url()
            .with_context(|| format!("invalid socket address {}:{}", self.host, self.port))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .with_context(|| format!("failed to build websocket request for {url}"))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&self.subprotocol)
                .with_context(|| format!("invalid subprotocol '{}'", self.subprotocol))?,
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_endpoint_uses_device_subprotocol() {
        let config = TransportConfig::command("rover.local", 82);
        assert_eq!(config.url().unwrap().as_str(), "ws://rover.local:82/command");

        let request = config.client_request().expect("request");
        assert_eq!(
            request.headers().get("Sec-WebSocket-Protocol").unwrap(),
            shared::protocol::DEVICE_SUBPROTOCOL
        );
    }

    #[test]
    fn stream_endpoint_targets_stream_path() {
        let config = TransportConfig::stream("10.0.0.2", DEFAULT_STREAM_PORT);
        assert_eq!(config.url().unwrap().as_str(), "ws://10.0.0.2:81/stream");
    }

    #[test]
    fn bad_host_fails_to_build_a_request() {
        let config = TransportConfig::command("not a host", 82);
        assert!(config.client_request().is_err());
    }
}
