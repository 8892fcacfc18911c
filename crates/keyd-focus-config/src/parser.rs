//! KDL configuration parser

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse the configuration file, or fall back to defaults if it does not exist
///
/// The daemon is usable without any configuration, so a missing file is not
/// an error. A file that exists but fails to parse still is.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }

    parse_config(path)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl pins an older miette, so rebuild the span on our side
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "pipe" => {
                config.pipe = parse_pipe(node)?;
            }
            "companion" => {
                config.companion = Some(parse_companion(node)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    let val = required_string(child, "global.log-level")?;
                    global.log_level = val
                        .parse()
                        .map_err(|message| ConfigError::Invalid { message })?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_pipe(node: &kdl::KdlNode) -> Result<PipeConfig, ConfigError> {
    let mut pipe = PipeConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "runtime-dir" => {
                    let value = required_string(child, "pipe.runtime-dir")?;
                    pipe.runtime_dir = Some(expand_path(value));
                }
                "path" => {
                    pipe.path = Some(expand_path(required_string(child, "pipe.path")?));
                }
                name => {
                    tracing::warn!("Unknown pipe config option: {}", name);
                }
            }
        }
    }

    Ok(pipe)
}

fn parse_companion(node: &kdl::KdlNode) -> Result<CompanionConfig, ConfigError> {
    let mut companion = CompanionConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "command" => {
                    let command = required_string(child, "companion.command")?;
                    if command.trim().is_empty() {
                        return Err(ConfigError::Invalid {
                            message: "companion.command must not be empty".to_string(),
                        });
                    }
                    companion.command = shellexpand::tilde(command).into_owned();
                }
                "args" => {
                    companion.args = child
                        .entries()
                        .iter()
                        .filter(|e| e.name().is_none())
                        .filter_map(|e| e.value().as_string())
                        .map(|s| s.to_string())
                        .collect();
                }
                name => {
                    tracing::warn!("Unknown companion config option: {}", name);
                }
            }
        }
    }

    Ok(companion)
}

/// First positional string argument of a node, or a `MissingField` error
fn required_string<'a>(node: &'a kdl::KdlNode, field: &str) -> Result<&'a str, ConfigError> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: field.to_string(),
        })
}

fn expand_path(val: &str) -> PathBuf {
    shellexpand::tilde(val).into_owned().into()
}
