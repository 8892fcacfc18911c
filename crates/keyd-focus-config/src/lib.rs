//! Configuration parsing for keyd-focus
//!
//! This crate handles parsing the KDL configuration file and resolving the
//! location of the `keyd.fifo` named pipe shared with keyd's application
//! mapper.

mod error;
mod model;
mod parser;
mod paths;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str};
pub use paths::{default_runtime_dir, PIPE_FILE_NAME, RUNTIME_DIR_ENV};
