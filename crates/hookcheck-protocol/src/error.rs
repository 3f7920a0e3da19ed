use thiserror::Error;

/// Errors decoding documents exchanged with the tunnel agent
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid tunnel descriptor: {0}")]
    InvalidDescriptor(#[from] serde_json::Error),

    #[error("No public URL found")]
    NoPublicUrl,
}
