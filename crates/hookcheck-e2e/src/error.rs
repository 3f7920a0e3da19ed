use std::time::Duration;

use hookcheck_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while orchestrating or probing the webhook environment
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Docker is required but was not found in PATH")]
    DockerNotFound,

    #[error("`{command}` failed: {stderr}")]
    Docker { command: String, stderr: String },

    #[error("Port {port}/tcp of container {container} is not mapped")]
    PortNotMapped { container: String, port: u16 },

    #[error("{what} not ready after {timeout:?}")]
    NotReady { what: String, timeout: Duration },

    #[error("No public URL found for the tunnel")]
    NoPublicUrl,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ProtocolError> for HarnessError {
    fn from(e: ProtocolError) -> Self {
        tracing::debug!("Tunnel descriptor rejected: {}", e);
        HarnessError::NoPublicUrl
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
