//! FIFO special file creation and opening

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::stat::Mode;
use tracing::{debug, warn};

use super::error::PipeError;

/// Outcome of [`ensure_fifo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoStatus {
    /// The FIFO did not exist and was created
    Created,
    /// A FIFO was already present at the path
    Existing,
}

/// Create the named pipe at `path` if it is not already there
///
/// Calling this repeatedly is fine: an existing FIFO is reported as
/// [`FifoStatus::Existing`] rather than as an error. The pipe is created
/// with mode `0600`, subject to the process umask.
///
/// # Errors
///
/// Returns `PipeError::NotAFifo` if a regular file or directory sits at the
/// path, and `PipeError::CreateFailed` for any other `mkfifo` failure
/// (missing parent directory, permission denied, ...).
pub fn ensure_fifo(path: &Path) -> Result<FifoStatus, PipeError> {
    match nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {
            debug!("Created pipe at {}", path.display());
            Ok(FifoStatus::Created)
        }
        Err(Errno::EEXIST) => {
            let metadata = std::fs::metadata(path).map_err(|source| PipeError::InspectFailed {
                path: path.to_path_buf(),
                source,
            })?;

            if metadata.file_type().is_fifo() {
                Ok(FifoStatus::Existing)
            } else {
                Err(PipeError::NotAFifo {
                    path: path.to_path_buf(),
                })
            }
        }
        Err(source) => Err(PipeError::CreateFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort variant of [`ensure_fifo`] that logs instead of failing
pub fn prepare_fifo(path: &Path) {
    if let Err(e) = ensure_fifo(path) {
        warn!("{}", e);
    }
}

/// Open the pipe for appending, blocking until a reader attaches
///
/// The FIFO is re-created first if it has been removed since startup. The
/// file is never created as a regular file: without a FIFO at the path the
/// open fails instead, and anything else found there is left untouched.
pub fn open_for_append(path: &Path) -> std::io::Result<File> {
    match ensure_fifo(path) {
        Ok(_) => {}
        Err(e @ PipeError::NotAFifo { .. }) => {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
        // The open below reports the same condition with its own errno
        Err(e) => debug!("{}", e),
    }

    let file = OpenOptions::new().append(true).open(path)?;

    // The path may have been replaced between the check and the open
    if !file.metadata()?.file_type().is_fifo() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            PipeError::NotAFifo {
                path: path.to_path_buf(),
            },
        ));
    }

    Ok(file)
}
