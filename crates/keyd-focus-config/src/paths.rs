//! Runtime directory lookup

use std::ffi::OsString;
use std::path::PathBuf;

/// File name of the pipe inside the runtime directory
pub const PIPE_FILE_NAME: &str = "keyd.fifo";

/// Environment variable naming the per-user runtime directory
pub const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

/// Determine the per-user runtime directory
///
/// Prefers `$XDG_RUNTIME_DIR`. When it is unset or empty, falls back to
/// `/run/user/<uid>` for the real user id of this process. The fallback
/// directory is not checked for existence; a wrong guess surfaces later as
/// failing pipe opens.
pub fn default_runtime_dir() -> PathBuf {
    runtime_dir_from(std::env::var_os(RUNTIME_DIR_ENV))
}

fn runtime_dir_from(value: Option<OsString>) -> PathBuf {
    match value.filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let uid = nix::unistd::getuid();
            tracing::debug!(
                "{} not set, using /run/user/{} as runtime directory",
                RUNTIME_DIR_ENV,
                uid
            );
            PathBuf::from(format!("/run/user/{}", uid))
        }
    }
}
