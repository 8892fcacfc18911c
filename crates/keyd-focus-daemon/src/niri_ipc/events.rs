//! Niri IPC event stream
//!
//! ## Protocol
//!
//! 1. Connect to `$NIRI_SOCKET`
//! 2. Send `Request::EventStream` as JSON + newline
//! 3. Receive the initial `Ok(Handled)` reply
//! 4. Continuously receive `Event` messages (one JSON per line)
//!
//! After the subscription the socket only carries events. niri starts every
//! stream with the full window list (`WindowsChanged`), which is what lets
//! the tracker resynchronise after a reconnect.
//!
//! ## Reconnection
//!
//! - On EOF, connection reset or broken pipe: reconnect with exponential
//!   backoff (500ms, doubling, capped at 10s), 5 retries
//! - If reconnection fails the reader task ends with
//!   `NiriError::MaxRetriesExceeded`
//!
//! ```text
//! +-----------------+      +--------+      +------------+
//! | NiriEventStream | ---> | mpsc   | ---> | event loop |
//! | (reader task)   |      | channel|      | (tracker)  |
//! +-----------------+      +--------+      +------------+
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::NiriError;

/// Default number of reconnection retry attempts for event stream
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Initial delay between retry attempts (500ms)
const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Maximum delay between retry attempts (10 seconds)
const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Environment variable name for the niri socket path
const NIRI_SOCKET_ENV: &str = "NIRI_SOCKET";

/// Default channel buffer size for event dispatch
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Discover the niri IPC socket path from the environment
///
/// # Errors
///
/// Returns `NiriError::SocketNotSet` if `$NIRI_SOCKET` is not set.
/// Returns `NiriError::SocketNotFound` if the path doesn't exist.
pub fn get_socket_path() -> Result<PathBuf, NiriError> {
    let socket_path = std::env::var_os(NIRI_SOCKET_ENV)
        .map(PathBuf::from)
        .ok_or(NiriError::SocketNotSet)?;

    if !socket_path.exists() {
        return Err(NiriError::SocketNotFound { path: socket_path });
    }

    Ok(socket_path)
}

/// Subscribed connection delivering niri events
#[derive(Debug)]
pub struct NiriEventStream {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
}

impl NiriEventStream {
    /// Connect to niri and subscribe to its event stream
    ///
    /// # Errors
    ///
    /// Socket discovery errors, `ConnectionFailed`, `SendFailed`,
    /// `ReceiveFailed`, `DeserializeFailed`, or `Rejected` if niri answers
    /// the subscription with anything but `Handled`.
    pub async fn connect() -> Result<Self, NiriError> {
        let socket_path = get_socket_path()?;
        Self::connect_to(socket_path).await
    }

    /// Subscribe through the socket at `socket_path`
    pub async fn connect_to(socket_path: PathBuf) -> Result<Self, NiriError> {
        let socket = UnixStream::connect(&socket_path)
            .await
            .map_err(|e| NiriError::ConnectionFailed {
                path: socket_path.clone(),
                source: e,
            })?;

        let (read_half, mut write_half) = socket.into_split();

        let request_json = serde_json::to_string(&niri_ipc::Request::EventStream)
            .map_err(NiriError::SerializeFailed)?;

        write_half
            .write_all(request_json.as_bytes())
            .await
            .map_err(NiriError::SendFailed)?;
        write_half
            .write_all(b"\n")
            .await
            .map_err(NiriError::SendFailed)?;
        write_half.flush().await.map_err(NiriError::SendFailed)?;

        let mut stream = Self {
            reader: BufReader::new(read_half),
        };

        let reply: niri_ipc::Reply = stream.read_message().await?;
        match reply {
            Ok(niri_ipc::Response::Handled) => {
                debug!("Niri event stream connected at {}", socket_path.display());
                Ok(stream)
            }
            Ok(other) => Err(NiriError::Rejected {
                message: format!(
                    "Unexpected response to EventStream request: expected Handled, got {:?}",
                    std::mem::discriminant(&other)
                ),
            }),
            Err(message) => Err(NiriError::Rejected { message }),
        }
    }

    /// Connect with retry logic and exponential backoff
    ///
    /// `max_retries` of 0 means a single attempt. A missing `$NIRI_SOCKET`
    /// fails immediately since retrying cannot fix it.
    ///
    /// # Errors
    ///
    /// Returns `NiriError::MaxRetriesExceeded` if all attempts fail.
    pub async fn connect_with_retry(max_retries: u32) -> Result<Self, NiriError> {
        let mut attempt = 0;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        loop {
            attempt += 1;

            let err = match Self::connect().await {
                Ok(stream) => {
                    if attempt > 1 {
                        info!("Niri event stream connected after {} attempt(s)", attempt);
                    }
                    return Ok(stream);
                }
                Err(NiriError::SocketNotSet) => return Err(NiriError::SocketNotSet),
                Err(e) => e,
            };

            if attempt > max_retries {
                warn!(
                    attempts = attempt,
                    last_error = %err,
                    "Failed to connect to niri event stream after all retry attempts"
                );
                return Err(NiriError::MaxRetriesExceeded { attempts: attempt });
            }

            warn!(
                attempt = attempt,
                max_retries = max_retries,
                delay_ms = delay_ms,
                error = %err,
                "Niri event stream connection failed, retrying..."
            );

            sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = next_delay(delay_ms);
        }
    }

    /// Connect with the default retry settings
    pub async fn connect_with_default_retry() -> Result<Self, NiriError> {
        Self::connect_with_retry(DEFAULT_MAX_RETRIES).await
    }

    /// Read the next event
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` on EOF, `ReceiveFailed` on socket errors,
    /// `DeserializeFailed` for lines that are not a known event.
    pub async fn next_event(&mut self) -> Result<niri_ipc::Event, NiriError> {
        self.read_message().await
    }

    async fn read_message<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, NiriError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(NiriError::ReceiveFailed)?;

        if bytes_read == 0 {
            return Err(NiriError::ConnectionClosed);
        }

        serde_json::from_str(&line).map_err(NiriError::DeserializeFailed)
    }
}

fn next_delay(delay_ms: u64) -> u64 {
    (delay_ms * 2).min(MAX_RETRY_DELAY_MS)
}

/// Receiver for raw niri events from the dispatcher
pub type NiriEventReceiver = mpsc::Receiver<niri_ipc::Event>;

/// Handle to a spawned event reader task
///
/// Completes with `Ok(())` when the receiver is dropped, or with the error
/// that ended the stream.
pub type EventReaderHandle = tokio::task::JoinHandle<Result<(), NiriError>>;

/// Runs the event stream on its own task and forwards events over mpsc
///
/// The event loop owns the receiving end, so all state derived from the
/// events stays on the loop's task.
#[derive(Debug)]
pub struct NiriEventDispatcher {
    sender: mpsc::Sender<niri_ipc::Event>,
}

impl NiriEventDispatcher {
    /// Create a dispatcher and the receiver for its events
    pub fn new(buffer_size: usize) -> (Self, NiriEventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self { sender }, receiver)
    }

    /// Connect to niri and spawn the reader task
    ///
    /// The initial connection uses the same backoff as reconnects, so the
    /// daemon can be started slightly before niri's socket is up.
    ///
    /// # Errors
    ///
    /// Returns the connection error if niri cannot be reached at all.
    pub async fn spawn_reader(self) -> Result<EventReaderHandle, NiriError> {
        let stream = NiriEventStream::connect_with_default_retry().await?;
        info!("Subscribed to niri event stream");

        Ok(tokio::spawn(self.run_reader_loop(stream)))
    }

    async fn run_reader_loop(self, mut stream: NiriEventStream) -> Result<(), NiriError> {
        loop {
            let event = match stream.next_event().await {
                Ok(event) => event,
                Err(e) if e.is_disconnect() => {
                    warn!("Niri event stream lost ({}). Attempting to reconnect...", e);
                    stream = NiriEventStream::connect_with_default_retry().await?;
                    info!("Niri event stream reconnected successfully");
                    continue;
                }
                Err(NiriError::DeserializeFailed(e)) => {
                    // Newer niri versions may send events this build does not know
                    debug!("Skipping unrecognised niri event: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Niri event stream error: {}", e);
                    return Err(e);
                }
            };

            if self.sender.send(event).await.is_err() {
                debug!("Niri event receiver dropped, shutting down event reader");
                return Ok(());
            }
        }
    }
}
