//! Line protocol spoken over the pipe
//!
//! Every record is two tab-separated fields terminated by a newline:
//!
//! ```text
//! <wm_class>\t<window_title>\n      focused window
//! root\t\n                          nothing focused
//! system-modal\t<stage_title>\n     shell-level modal surface opened
//! ```
//!
//! Fields are written as-is. A title containing a tab or newline breaks the
//! framing on the reader side; keyd's mapper has the same limitation.

use std::fmt;

/// Class reported when no window has focus
pub const ROOT_CLASS: &str = "root";

/// Class reported when a system modal surface opens
pub const SYSTEM_MODAL_CLASS: &str = "system-modal";

/// A single record destined for the pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusRecord {
    /// A window gained focus
    Window { class: String, title: String },
    /// Focus moved away from every window
    NoFocus,
    /// A shell-level modal surface (lock screen, overview, ...) opened
    SystemModal { stage_title: String },
}

impl FocusRecord {
    /// Encode the record as one protocol line, trailing newline included
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FocusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window { class, title } => writeln!(f, "{}\t{}", class, title),
            Self::NoFocus => writeln!(f, "{}\t", ROOT_CLASS),
            Self::SystemModal { stage_title } => {
                writeln!(f, "{}\t{}", SYSTEM_MODAL_CLASS, stage_title)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_record() {
        let record = FocusRecord::Window {
            class: "code".to_string(),
            title: "main.rs — editor".to_string(),
        };
        assert_eq!(record.to_line(), "code\tmain.rs — editor\n");
    }

    #[test]
    fn test_no_focus_record() {
        assert_eq!(FocusRecord::NoFocus.to_line(), "root\t\n");
    }

    #[test]
    fn test_system_modal_record() {
        let record = FocusRecord::SystemModal {
            stage_title: "Lock Screen".to_string(),
        };
        assert_eq!(record.to_line(), "system-modal\tLock Screen\n");
    }

    #[test]
    fn test_empty_fields_are_kept() {
        let record = FocusRecord::Window {
            class: String::new(),
            title: String::new(),
        };
        assert_eq!(record.to_line(), "\t\n");
    }

    #[test]
    fn test_fields_are_not_escaped() {
        let record = FocusRecord::Window {
            class: "term".to_string(),
            title: "a\tb".to_string(),
        };
        assert_eq!(record.to_line(), "term\ta\tb\n");
    }
}
