//! niri compositor as the focus host
//!
//! niri exposes a Unix socket at `$NIRI_SOCKET`. After a `Request::EventStream`
//! subscription it pushes one JSON `Event` per line. This module follows that
//! stream and mirrors the window table so focus changes can be resolved to
//! an `app_id` and title.
//!
//! - `NiriEventStream`: a subscribed connection
//! - `NiriEventDispatcher`: reader task with reconnection, feeding an mpsc channel
//! - `WindowTracker`: window/focus mirror implementing `FocusHost`
//! - `NiriError`: error types for IPC operations

mod error;
mod events;
mod tracker;

pub use error::NiriError;
pub use events::{NiriEventDispatcher, DEFAULT_CHANNEL_BUFFER};
pub use tracker::{HostNotification, WindowTracker};
