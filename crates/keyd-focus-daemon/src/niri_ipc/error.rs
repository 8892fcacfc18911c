//! Error types for the niri event stream

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while following niri's event stream
#[derive(Debug, Error)]
pub enum NiriError {
    /// The NIRI_SOCKET environment variable is not set
    #[error("NIRI_SOCKET environment variable not set - is niri running?")]
    SocketNotSet,

    /// The socket path does not exist
    #[error("Niri socket not found at {path}")]
    SocketNotFound { path: PathBuf },

    /// Failed to connect to the niri socket
    #[error("Failed to connect to niri socket at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to send the subscription request
    #[error("Failed to send request to niri: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read from the socket
    #[error("Failed to receive from niri: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Failed to serialize the request
    #[error("Failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// A reply or event line was not valid JSON for the expected type
    #[error("Failed to deserialize niri message: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// Niri refused the request
    #[error("Niri returned error: {message}")]
    Rejected { message: String },

    /// Connection was closed by niri
    #[error("Connection to niri closed unexpectedly")]
    ConnectionClosed,

    /// Gave up reconnecting
    #[error("Failed to connect to niri after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl NiriError {
    /// Whether the stream should be re-established after this error
    ///
    /// Covers niri restarting or crashing. Protocol errors are not retried.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::ReceiveFailed(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
