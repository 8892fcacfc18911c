//! Configuration data model

use std::path::PathBuf;

use crate::paths::{default_runtime_dir, PIPE_FILE_NAME};

/// Default location of the configuration file (before `~` expansion)
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/keyd-focus/config.kdl";

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub pipe: PipeConfig,
    /// Consumer process to run alongside the daemon, if any
    pub companion: Option<CompanionConfig>,
}

/// Global settings
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Where the named pipe lives
///
/// Both fields are optional. With neither set the pipe is
/// `$XDG_RUNTIME_DIR/keyd.fifo`, falling back to `/run/user/<uid>/keyd.fifo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipeConfig {
    /// Replaces the runtime directory lookup
    pub runtime_dir: Option<PathBuf>,
    /// Full path to the pipe; wins over `runtime_dir`
    pub path: Option<PathBuf>,
}

impl PipeConfig {
    /// Resolve the pipe path for this process
    ///
    /// The result is meant to be computed once at startup and reused for
    /// the lifetime of the process.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }

        let runtime_dir = match &self.runtime_dir {
            Some(dir) => dir.clone(),
            None => default_runtime_dir(),
        };

        runtime_dir.join(PIPE_FILE_NAME)
    }
}

/// The consumer process spawned at startup and terminated at shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            command: "keyd-application-mapper".to_string(),
            args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let pipe = PipeConfig {
            runtime_dir: Some(PathBuf::from("/run/user/4242")),
            path: Some(PathBuf::from("/tmp/custom.fifo")),
        };
        assert_eq!(pipe.resolve_path(), PathBuf::from("/tmp/custom.fifo"));
    }

    #[test]
    fn test_runtime_dir_override() {
        let pipe = PipeConfig {
            runtime_dir: Some(PathBuf::from("/run/user/4242")),
            path: None,
        };
        assert_eq!(
            pipe.resolve_path(),
            PathBuf::from("/run/user/4242/keyd.fifo")
        );
    }

    #[test]
    fn test_default_path_ends_with_fifo_name() {
        let path = PipeConfig::default().resolve_path();
        assert_eq!(path.file_name().unwrap(), PIPE_FILE_NAME);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }
}
