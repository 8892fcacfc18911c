//! Local mirror of niri's window and focus state
//!
//! niri's event stream reports window focus by id only, so the tracker keeps
//! a table of windows fed by `WindowsChanged`, `WindowOpenedOrChanged` and
//! `WindowClosed`. It then acts as the [`FocusHost`] for the event source:
//! [`WindowTracker::apply`] updates the table and says which notification,
//! if any, the event amounts to.

use std::collections::HashMap;

use crate::source::{FocusHost, FocusedWindow};

/// Stage title reported with system modal records
///
/// niri has no shell stage with a title of its own, so the compositor name
/// stands in for it.
pub const NIRI_STAGE_TITLE: &str = "niri";

/// Notification derived from a niri event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostNotification {
    /// The focused window changed (possibly to none)
    FocusChanged,
    /// The overview opened on top of all windows
    SystemModalOpened,
}

/// Window table plus focus and overview state
#[derive(Debug, Default)]
pub struct WindowTracker {
    windows: HashMap<u64, FocusedWindow>,
    focused: Option<u64>,
    overview_open: bool,
}

impl WindowTracker {
    /// Fold one niri event into the tracked state
    ///
    /// Returns the notification the event corresponds to. Title changes,
    /// window list refreshes and overview closing are tracked silently.
    pub fn apply(&mut self, event: niri_ipc::Event) -> Option<HostNotification> {
        match event {
            niri_ipc::Event::WindowsChanged { windows } => {
                self.focused = windows.iter().find(|w| w.is_focused).map(|w| w.id);
                self.windows = windows
                    .into_iter()
                    .map(|w| (w.id, FocusedWindow::from(&w)))
                    .collect();
                None
            }
            niri_ipc::Event::WindowOpenedOrChanged { window } => {
                if window.is_focused {
                    self.focused = Some(window.id);
                }
                self.windows.insert(window.id, FocusedWindow::from(&window));
                None
            }
            niri_ipc::Event::WindowClosed { id } => {
                self.windows.remove(&id);
                if self.focused == Some(id) {
                    self.focused = None;
                }
                None
            }
            niri_ipc::Event::WindowFocusChanged { id } => {
                if let Some(window_id) = id {
                    if !self.windows.contains_key(&window_id) {
                        tracing::debug!("Focus moved to unknown window {}", window_id);
                    }
                }
                self.focused = id;
                Some(HostNotification::FocusChanged)
            }
            niri_ipc::Event::OverviewOpenedOrClosed { is_open } => {
                let opened = is_open && !self.overview_open;
                self.overview_open = is_open;
                opened.then_some(HostNotification::SystemModalOpened)
            }
            _ => None,
        }
    }
}

impl FocusHost for WindowTracker {
    fn focused_window(&self) -> Option<FocusedWindow> {
        self.focused.and_then(|id| self.windows.get(&id)).cloned()
    }

    fn stage_title(&self) -> String {
        NIRI_STAGE_TITLE.to_string()
    }
}

impl From<&niri_ipc::Window> for FocusedWindow {
    fn from(window: &niri_ipc::Window) -> Self {
        Self {
            class: window.app_id.clone().unwrap_or_default(),
            title: window.title.clone().unwrap_or_default(),
        }
    }
}
