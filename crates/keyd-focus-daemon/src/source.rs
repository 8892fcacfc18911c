//! Translation of host focus notifications into pipe records
//!
//! The desktop host (compositor or shell) is reached through the
//! [`FocusHost`] trait. Whenever it reports a change, the event loop calls
//! the matching `on_*` method of [`FocusEventSource`], which reads the
//! current state from the host, encodes one protocol line and hands it to
//! the pipe channel. Errors never come back out of here: the channel
//! absorbs them.

use crate::pipe::{FifoOpener, PipeChannel, PipeOpener};
use crate::protocol::FocusRecord;

/// The focused window as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FocusedWindow {
    /// Stable application identifier (X11 `WM_CLASS`, Wayland `app_id`)
    pub class: String,
    /// Current window title
    pub title: String,
}

/// Read access to the host's current focus state
pub trait FocusHost {
    /// The currently focused window, if any
    fn focused_window(&self) -> Option<FocusedWindow>;

    /// Title of the shell stage, reported alongside system modal records
    fn stage_title(&self) -> String;
}

/// Formats focus notifications and forwards them to the pipe
pub struct FocusEventSource<O: PipeOpener = FifoOpener> {
    channel: PipeChannel<O>,
}

impl<O: PipeOpener> FocusEventSource<O> {
    /// Take ownership of the channel all records will be sent through
    pub fn new(channel: PipeChannel<O>) -> Self {
        Self { channel }
    }

    /// The focused window changed
    pub fn on_focus_changed<H: FocusHost + ?Sized>(&mut self, host: &H) {
        let record = match host.focused_window() {
            Some(window) => FocusRecord::Window {
                class: window.class,
                title: window.title,
            },
            None => FocusRecord::NoFocus,
        };

        tracing::debug!("Focus changed: {:?}", record);
        self.forward(&record);
    }

    /// A system modal surface opened
    pub fn on_system_modal_opened<H: FocusHost + ?Sized>(&mut self, host: &H) {
        let record = FocusRecord::SystemModal {
            stage_title: host.stage_title(),
        };

        tracing::debug!("System modal opened: {:?}", record);
        self.forward(&record);
    }

    /// The channel records are sent through
    pub fn channel_mut(&mut self) -> &mut PipeChannel<O> {
        &mut self.channel
    }

    fn forward(&mut self, record: &FocusRecord) {
        let outcome = self.channel.send(&record.to_line());
        tracing::trace!(?outcome, "Forwarded record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;
    use tempfile::TempDir;

    use crate::pipe::{ensure_fifo, ChannelStatus};

    struct StaticHost {
        focused: Option<FocusedWindow>,
        stage: &'static str,
    }

    impl FocusHost for StaticHost {
        fn focused_window(&self) -> Option<FocusedWindow> {
            self.focused.clone()
        }

        fn stage_title(&self) -> String {
            self.stage.to_string()
        }
    }

    fn window(class: &str, title: &str) -> Option<FocusedWindow> {
        Some(FocusedWindow {
            class: class.to_string(),
            title: title.to_string(),
        })
    }

    /// Run `events` against an open FIFO channel and return what a reader saw
    async fn collect_lines<F>(events: F) -> String
    where
        F: FnOnce(&mut FocusEventSource),
    {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keyd.fifo");
        ensure_fifo(&path).unwrap();

        let reader_path = path.clone();
        let reader = std::thread::spawn(move || {
            let mut contents = String::new();
            File::open(reader_path)
                .unwrap()
                .read_to_string(&mut contents)
                .unwrap();
            contents
        });

        let (mut channel, mut completions) = PipeChannel::new(path);
        channel.open_async();
        channel.finish_open(completions.recv().await.unwrap());
        assert_eq!(channel.status(), ChannelStatus::Open);

        let mut source = FocusEventSource::new(channel);
        events(&mut source);
        drop(source);

        reader.join().unwrap()
    }

    #[tokio::test]
    async fn test_focused_window_line() {
        let host = StaticHost {
            focused: window("code", "main.rs — editor"),
            stage: "",
        };

        let output = collect_lines(|source| source.on_focus_changed(&host)).await;
        assert_eq!(output, "code\tmain.rs — editor\n");
    }

    #[tokio::test]
    async fn test_no_focus_line() {
        let host = StaticHost {
            focused: None,
            stage: "",
        };

        let output = collect_lines(|source| source.on_focus_changed(&host)).await;
        assert_eq!(output, "root\t\n");
    }

    #[tokio::test]
    async fn test_system_modal_line() {
        let host = StaticHost {
            focused: window("firefox", "My Page"),
            stage: "Lock Screen",
        };

        let output = collect_lines(|source| source.on_system_modal_opened(&host)).await;
        assert_eq!(output, "system-modal\tLock Screen\n");
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let browser = StaticHost {
            focused: window("firefox", "My Page"),
            stage: "gnome-shell",
        };
        let desktop = StaticHost {
            focused: None,
            stage: "gnome-shell",
        };

        let output = collect_lines(|source| {
            source.on_focus_changed(&browser);
            source.on_focus_changed(&desktop);
            source.on_system_modal_opened(&desktop);
        })
        .await;

        assert_eq!(output, "firefox\tMy Page\nroot\t\nsystem-modal\tgnome-shell\n");
    }

    #[test]
    fn test_events_before_open_are_dropped() {
        let dir = TempDir::new().unwrap();
        // Unusable path so the background open fails fast instead of waiting
        // for a reader
        let path = dir.path().join("missing").join("keyd.fifo");
        let (channel, _completions) = PipeChannel::new(path);
        let mut source = FocusEventSource::new(channel);

        let host = StaticHost {
            focused: window("code", "x"),
            stage: "",
        };
        source.on_focus_changed(&host);
        source.on_system_modal_opened(&host);

        // The first event kicked off an open; nothing was queued
        assert_eq!(source.channel_mut().status(), ChannelStatus::Opening);
        assert_eq!(source.channel_mut().open_attempts(), 1);
    }
}
