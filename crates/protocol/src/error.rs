//! Error types for the wire vocabulary.

use thiserror::Error;

/// Errors raised while decoding identity service traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Text is not JSON or does not match any known message kind
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
}
