//! Error types for the named pipe channel

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while creating, opening or writing the pipe
///
/// None of these ever leave the pipe module: the channel logs them and
/// recovers on its own. They exist so the log lines carry the path and the
/// underlying OS error in one place.
#[derive(Debug, Error)]
pub enum PipeError {
    /// `mkfifo` failed for a reason other than the path already existing
    #[error("Failed to create pipe at {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// Something other than a FIFO already occupies the pipe path
    #[error("{path} exists but is not a named pipe")]
    NotAFifo { path: PathBuf },

    /// Could not inspect an existing file at the pipe path
    #[error("Failed to inspect {path}: {source}")]
    InspectFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening the pipe for writing failed
    #[error("Failed to open pipe at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a line failed, typically because the reader went away
    #[error("Failed to write to pipe at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
