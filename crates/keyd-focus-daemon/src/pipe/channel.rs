//! Self-healing write side of the named pipe
//!
//! `PipeChannel` owns the single write handle to the pipe and the state
//! machine around it:
//!
//! ```text
//!            open_async()              finish_open(Ok)
//!   Closed ---------------> Opening -------------------> Open
//!     ^                        |                          |
//!     |    finish_open(Err)    |      write failure       |
//!     +------------------------+--------------------------+
//! ```
//!
//! A write failure goes straight back through `Closed` into `Opening`, so a
//! reconnect is always in flight after the reader disappears. An open
//! failure parks the channel in `Closed`; the next `send` starts a new open.
//!
//! Opening a FIFO for writing blocks until a reader attaches, so the open
//! runs on a detached worker thread. Its result comes back as an
//! [`OpenCompletion`] over an mpsc channel, and the owning event loop hands
//! it to [`PipeChannel::finish_open`]. Everything else happens on the loop's
//! own task, so the state needs no locking.
//!
//! Lines sent while the channel is not `Open` are dropped, never queued.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::error::PipeError;
use super::fifo::open_for_append;

/// Strategy for opening the pipe's write handle
///
/// `open` runs on a worker thread and may block for as long as it likes.
pub trait PipeOpener: Send + Sync + 'static {
    /// The writable handle produced by a successful open
    type Handle: Write + Send + 'static;

    /// Open `path` for writing
    fn open(&self, path: &Path) -> std::io::Result<Self::Handle>;
}

/// Opens the real FIFO in append mode
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoOpener;

impl PipeOpener for FifoOpener {
    type Handle = File;

    fn open(&self, path: &Path) -> std::io::Result<File> {
        open_for_append(path)
    }
}

/// Result of one asynchronous open, delivered back to the event loop
#[derive(Debug)]
pub struct OpenCompletion<H> {
    result: std::io::Result<H>,
}

/// Receiving end for open completions
///
/// The event loop owning the channel must poll this and pass every message
/// to [`PipeChannel::finish_open`].
pub type OpenCompletions<H> = mpsc::UnboundedReceiver<OpenCompletion<H>>;

/// Internal state; the handle only exists while `Open`
enum ChannelState<H> {
    Closed,
    Opening,
    Open(H),
}

/// Externally visible channel state, without the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Closed,
    Opening,
    Open,
}

/// What happened to a line passed to [`PipeChannel::send`]
///
/// Purely informational. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// All bytes were written to the pipe
    Delivered,
    /// The channel was not open; the line was discarded
    Dropped,
    /// The write failed; the line was discarded and a reopen started
    Reconnecting,
}

/// Best-effort conduit for protocol lines to whichever reader is attached
pub struct PipeChannel<O: PipeOpener = FifoOpener> {
    path: PathBuf,
    opener: Arc<O>,
    state: ChannelState<O::Handle>,
    completions: mpsc::UnboundedSender<OpenCompletion<O::Handle>>,
    open_attempts: u64,
}

impl PipeChannel<FifoOpener> {
    /// Create a closed channel for the FIFO at `path`
    pub fn new(path: PathBuf) -> (Self, OpenCompletions<File>) {
        Self::with_opener(path, FifoOpener)
    }
}

impl<O: PipeOpener> PipeChannel<O> {
    /// Create a closed channel that opens its handle through `opener`
    pub fn with_opener(path: PathBuf, opener: O) -> (Self, OpenCompletions<O::Handle>) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            path,
            opener: Arc::new(opener),
            state: ChannelState::Closed,
            completions,
            open_attempts: 0,
        };
        (channel, receiver)
    }

    /// Path of the pipe this channel writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state of the channel
    pub fn status(&self) -> ChannelStatus {
        match self.state {
            ChannelState::Closed => ChannelStatus::Closed,
            ChannelState::Opening => ChannelStatus::Opening,
            ChannelState::Open(_) => ChannelStatus::Open,
        }
    }

    /// Number of opens started since the channel was created
    pub fn open_attempts(&self) -> u64 {
        self.open_attempts
    }

    /// Start opening the pipe without blocking the caller
    ///
    /// Does nothing unless the channel is `Closed`, so at most one open is
    /// ever in flight.
    pub fn open_async(&mut self) {
        if !matches!(self.state, ChannelState::Closed) {
            trace!("Pipe open requested while not closed, ignoring");
            return;
        }

        self.state = ChannelState::Opening;
        self.open_attempts += 1;

        let opener = Arc::clone(&self.opener);
        let path = self.path.clone();
        let completions = self.completions.clone();

        debug!(attempt = self.open_attempts, "Opening pipe {}", self.path.display());

        let spawned = std::thread::Builder::new()
            .name("keyd-pipe-open".to_string())
            .spawn(move || {
                let result = opener.open(&path);
                // The receiver only goes away when the daemon is shutting down
                let _ = completions.send(OpenCompletion { result });
            });

        if let Err(e) = spawned {
            warn!("Failed to start pipe open worker: {}", e);
            self.state = ChannelState::Closed;
        }
    }

    /// Apply the result of an open started by [`open_async`](Self::open_async)
    pub fn finish_open(&mut self, completion: OpenCompletion<O::Handle>) {
        if !matches!(self.state, ChannelState::Opening) {
            // Cannot happen with a single channel instance, but never replace
            // a live handle with a late one
            debug!("Discarding unexpected pipe open completion");
            return;
        }

        match completion.result {
            Ok(handle) => {
                info!("Pipe opened: {}", self.path.display());
                self.state = ChannelState::Open(handle);
            }
            Err(source) => {
                let err = PipeError::OpenFailed {
                    path: self.path.clone(),
                    source,
                };
                warn!("{}; retrying on next event", err);
                self.state = ChannelState::Closed;
            }
        }
    }

    /// Write `line` to the pipe if it is open, otherwise drop it
    ///
    /// A failed write closes the handle and immediately starts a reopen.
    /// A send on a `Closed` channel (left there by a failed open) drops the
    /// line and starts a reopen. Never blocks on the open and never fails.
    pub fn send(&mut self, line: &str) -> SendOutcome {
        let result = match &mut self.state {
            ChannelState::Open(handle) => write_line(handle, line),
            ChannelState::Opening => {
                trace!("Pipe still opening, dropping line");
                return SendOutcome::Dropped;
            }
            ChannelState::Closed => {
                debug!("Pipe closed, dropping line and reopening");
                self.open_async();
                return SendOutcome::Dropped;
            }
        };

        match result {
            Ok(()) => SendOutcome::Delivered,
            Err(source) => {
                let err = PipeError::WriteFailed {
                    path: self.path.clone(),
                    source,
                };
                warn!("{}; pipe closed, reopening", err);
                self.state = ChannelState::Closed;
                self.open_async();
                SendOutcome::Reconnecting
            }
        }
    }
}

fn write_line<W: Write>(handle: &mut W, line: &str) -> std::io::Result<()> {
    handle.write_all(line.as_bytes())?;
    handle.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::pipe::fifo::ensure_fifo;

    /// In-memory stand-in for a pipe that can be "disconnected"
    #[derive(Clone, Default)]
    struct Sink {
        written: Arc<Mutex<Vec<u8>>>,
        broken: Arc<AtomicBool>,
    }

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8(self.written.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(std::io::ErrorKind::BrokenPipe.into());
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockOpener {
        sink: Sink,
        fail: Arc<AtomicBool>,
        opens: Arc<AtomicUsize>,
    }

    impl PipeOpener for MockOpener {
        type Handle = Sink;

        fn open(&self, _path: &Path) -> std::io::Result<Sink> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::ErrorKind::PermissionDenied.into());
            }
            Ok(self.sink.clone())
        }
    }

    fn mock_channel() -> (PipeChannel<MockOpener>, OpenCompletions<Sink>, MockOpener) {
        let opener = MockOpener::default();
        let (channel, completions) =
            PipeChannel::with_opener(PathBuf::from("/nonexistent/keyd.fifo"), opener.clone());
        (channel, completions, opener)
    }

    async fn complete_open<O: PipeOpener>(
        channel: &mut PipeChannel<O>,
        completions: &mut OpenCompletions<O::Handle>,
    ) {
        let completion = completions.recv().await.unwrap();
        channel.finish_open(completion);
    }

    #[test]
    fn test_new_channel_is_closed() {
        let (channel, _completions, opener) = mock_channel();
        assert_eq!(channel.status(), ChannelStatus::Closed);
        assert_eq!(channel.open_attempts(), 0);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_while_opening_is_dropped() {
        let (mut channel, mut completions, opener) = mock_channel();

        channel.open_async();
        assert_eq!(channel.status(), ChannelStatus::Opening);

        assert_eq!(channel.send("code\tmain.rs\n"), SendOutcome::Dropped);
        assert_eq!(channel.send("root\t\n"), SendOutcome::Dropped);
        assert_eq!(channel.open_attempts(), 1);

        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Open);
        assert_eq!(opener.sink.contents(), "");
    }

    #[tokio::test]
    async fn test_open_then_send_writes_exact_bytes() {
        let (mut channel, mut completions, opener) = mock_channel();

        channel.open_async();
        complete_open(&mut channel, &mut completions).await;

        assert_eq!(channel.send("firefox\tMy Page\n"), SendOutcome::Delivered);
        assert_eq!(channel.send("root\t\n"), SendOutcome::Delivered);
        assert_eq!(opener.sink.contents(), "firefox\tMy Page\nroot\t\n");
    }

    #[tokio::test]
    async fn test_open_async_is_noop_unless_closed() {
        let (mut channel, mut completions, opener) = mock_channel();

        channel.open_async();
        channel.open_async();
        complete_open(&mut channel, &mut completions).await;
        channel.open_async();

        assert_eq!(channel.open_attempts(), 1);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(channel.status(), ChannelStatus::Open);
    }

    #[tokio::test]
    async fn test_write_failure_triggers_exactly_one_reopen() {
        let (mut channel, mut completions, opener) = mock_channel();

        channel.open_async();
        complete_open(&mut channel, &mut completions).await;

        opener.sink.broken.store(true, Ordering::SeqCst);
        assert_eq!(channel.send("code\tlost\n"), SendOutcome::Reconnecting);
        assert_eq!(channel.status(), ChannelStatus::Opening);
        assert_eq!(channel.open_attempts(), 2);

        // Further events while reconnecting neither write nor reopen
        assert_eq!(channel.send("code\talso lost\n"), SendOutcome::Dropped);
        assert_eq!(channel.open_attempts(), 2);

        opener.sink.broken.store(false, Ordering::SeqCst);
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Open);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);

        assert_eq!(channel.send("code\tback\n"), SendOutcome::Delivered);
        assert_eq!(opener.sink.contents(), "code\tback\n");
    }

    #[tokio::test]
    async fn test_open_failure_returns_to_closed_and_retries_lazily() {
        let (mut channel, mut completions, opener) = mock_channel();
        opener.fail.store(true, Ordering::SeqCst);

        channel.open_async();
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Closed);

        // No timer: nothing happens until the next send
        assert!(completions.try_recv().is_err());
        assert_eq!(channel.open_attempts(), 1);

        opener.fail.store(false, Ordering::SeqCst);
        assert_eq!(channel.send("root\t\n"), SendOutcome::Dropped);
        assert_eq!(channel.status(), ChannelStatus::Opening);
        assert_eq!(channel.open_attempts(), 2);

        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.send("root\t\n"), SendOutcome::Delivered);
        assert_eq!(opener.sink.contents(), "root\t\n");
    }

    #[tokio::test]
    async fn test_send_on_closed_channel_never_fails() {
        let (mut channel, _completions, opener) = mock_channel();
        opener.fail.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            assert_eq!(channel.send("root\t\n"), SendOutcome::Dropped);
        }
        // The first send started an open; the rest found it in flight
        assert_eq!(channel.open_attempts(), 1);
    }

    // =========================================================================
    // Real FIFO
    // =========================================================================

    fn spawn_line_reader(path: PathBuf) -> std::thread::JoinHandle<String> {
        std::thread::spawn(move || {
            let mut line = String::new();
            BufReader::new(File::open(path).unwrap())
                .read_line(&mut line)
                .unwrap();
            line
        })
    }

    #[tokio::test]
    async fn test_fifo_reader_reconnect_scenario() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyd.fifo");
        ensure_fifo(&path).unwrap();

        let (mut channel, mut completions) = PipeChannel::new(path.clone());

        // First reader takes one line and disconnects
        let first = spawn_line_reader(path.clone());
        channel.open_async();
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.send("firefox\tMy Page\n"), SendOutcome::Delivered);
        assert_eq!(first.join().unwrap(), "firefox\tMy Page\n");

        // Nobody is reading: the write fails and a reopen starts
        assert_eq!(channel.send("code\tmissed\n"), SendOutcome::Reconnecting);
        assert_eq!(channel.status(), ChannelStatus::Opening);

        // A new reader attaches and unblocks the pending open
        let second_path = path.clone();
        let second = std::thread::spawn(move || {
            let mut contents = String::new();
            File::open(second_path)
                .unwrap()
                .read_to_string(&mut contents)
                .unwrap();
            contents
        });
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Open);

        assert_eq!(channel.send("code\tmain.rs\n"), SendOutcome::Delivered);
        drop(channel);

        // Only the post-reattach event arrives; the missed one was not buffered
        assert_eq!(second.join().unwrap(), "code\tmain.rs\n");
    }

    #[tokio::test]
    async fn test_fifo_open_failure_when_path_is_unusable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("keyd.fifo");

        let (mut channel, mut completions) = PipeChannel::new(path);
        channel.open_async();
        complete_open(&mut channel, &mut completions).await;

        assert_eq!(channel.status(), ChannelStatus::Closed);
    }

    #[tokio::test]
    async fn test_regular_file_at_path_is_never_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyd.fifo");
        std::fs::write(&path, "precious\n").unwrap();

        let (mut channel, mut completions) = PipeChannel::new(path.clone());
        channel.open_async();
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Closed);

        // The next send retries the open, which fails the same way
        assert_eq!(channel.send("code\tmain.rs\n"), SendOutcome::Dropped);
        complete_open(&mut channel, &mut completions).await;
        assert_eq!(channel.status(), ChannelStatus::Closed);
        assert_eq!(channel.open_attempts(), 2);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious\n");
    }
}
