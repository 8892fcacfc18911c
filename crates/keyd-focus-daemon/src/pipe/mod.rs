//! Named pipe output to keyd's application mapper
//!
//! The pipe lives at `$XDG_RUNTIME_DIR/keyd.fifo` (see
//! `keyd_focus_config::PipeConfig::resolve_path`). It is created on startup
//! if missing and outlives this process, so the reader may be started
//! before or after the daemon.
//!
//! - `PipeChannel`: the write handle and its reconnect state machine
//! - `ensure_fifo` / `prepare_fifo`: idempotent FIFO creation
//! - `PipeError`: failures, all of them handled inside this module

mod channel;
mod error;
mod fifo;

pub use channel::{
    ChannelStatus, FifoOpener, OpenCompletion, OpenCompletions, PipeChannel, PipeOpener,
    SendOutcome,
};
pub use error::PipeError;
pub use fifo::{ensure_fifo, prepare_fifo, FifoStatus};
