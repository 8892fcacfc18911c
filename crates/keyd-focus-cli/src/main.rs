//! keyd-focus CLI
//!
//! Inspection tool for keyd-focus: checks the configuration, shows where the
//! pipe lives, and can attach to the pipe as a reader to watch records.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use keyd_focus_config::{Config, DEFAULT_CONFIG_PATH};
use miette::IntoDiagnostic;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "keyd-focus")]
#[command(about = "Inspect the keyd-focus pipe and configuration")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// Print the resolved pipe path
    Path,

    /// Read records from the pipe and print them
    Listen {
        /// Print one JSON object per record
        #[arg(long)]
        json: bool,

        /// Exit when the writer closes the pipe instead of waiting for it
        #[arg(long)]
        once: bool,
    },
}

/// One decoded pipe record
#[derive(Debug, PartialEq, Eq, Serialize)]
struct Record<'a> {
    class: &'a str,
    title: &'a str,
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Path => cmd_path(&config_path),
        Commands::Listen { json, once } => cmd_listen(&config_path, json, once),
    }
}

fn load(config_path: &Path) -> miette::Result<Config> {
    Ok(keyd_focus_config::load_config(config_path)?)
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    if !config_path.exists() {
        println!("No configuration file; defaults apply.");
    }

    let config = load(config_path)?;

    println!("Configuration is valid!");
    println!("  Log level: {}", config.global.log_level.as_filter());
    println!("  Pipe: {}", config.pipe.resolve_path().display());
    match &config.companion {
        Some(companion) => println!(
            "  Companion: {} {}",
            companion.command,
            companion.args.join(" ")
        ),
        None => println!("  Companion: none"),
    }

    Ok(())
}

fn cmd_path(config_path: &Path) -> miette::Result<()> {
    let config = load(config_path)?;
    println!("{}", config.pipe.resolve_path().display());
    Ok(())
}

fn cmd_listen(config_path: &Path, json: bool, once: bool) -> miette::Result<()> {
    let config = load(config_path)?;
    let pipe_path = config.pipe.resolve_path();

    if !pipe_path.exists() {
        return Err(miette::miette!(
            "No pipe at {} (keyd-focusd creates it on startup)",
            pipe_path.display()
        ));
    }

    loop {
        tracing::info!("Waiting for a writer on {}", pipe_path.display());
        // Blocks until the daemon opens its end
        let file = File::open(&pipe_path).into_diagnostic()?;

        for line in read_records(file) {
            let line = line.into_diagnostic()?;
            let record = parse_record(&line);

            if json {
                println!("{}", serde_json::to_string(&record).into_diagnostic()?);
            } else {
                println!("class={:?} title={:?}", record.class, record.title);
            }
        }

        tracing::info!("Writer closed the pipe");
        if once {
            return Ok(());
        }
    }
}

/// Newline-delimited records from a writer, decoded lossily
///
/// A record with invalid UTF-8 still comes through (with replacement
/// characters) instead of ending the stream.
fn read_records<R: Read>(reader: R) -> impl Iterator<Item = std::io::Result<String>> {
    BufReader::new(reader).split(b'\n').map(|bytes| {
        bytes.map(|bytes| {
            let mut line = String::from_utf8_lossy(&bytes).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            line
        })
    })
}

/// Split a protocol line (newline already stripped) into its two fields
fn parse_record(line: &str) -> Record<'_> {
    let (class, title) = line.split_once('\t').unwrap_or((line, ""));
    Record { class, title }
}
