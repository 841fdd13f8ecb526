//! ccshard - target-language extraction from Common Crawl WET snapshots
//!
//! Downloads every shard listed in a snapshot manifest, keeps records in the
//! target language and writes one deduplicated JSON file per shard.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use ccshard_core::{ProgressContext, Shutdown};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "ccshard")]
#[command(about = "Extract target-language text from Common Crawl WET shards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./ccshard.toml or ~/.config/ccshard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// First retry delay in milliseconds (doubles per failure)
    #[arg(long, global = true)]
    backoff_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Process a snapshot from a start index to the end of its manifest
    Run(cmd::run::RunArgs),
    /// Process only the shard indices with no output file yet
    Complement(cmd::complement::ComplementArgs),
    /// Re-apply quality heuristics and dedupe to finished shard files
    Refine(cmd::refine::RefineArgs),
    /// Concatenate finished shard files into groups
    Merge(cmd::merge::MergeArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    ccshard_core::init_logging(quiet, cli.debug, multi);

    match dispatch(cli, progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, progress: ccshard_core::SharedProgress) -> Result<ExitCode> {
    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    let session = cmd::Session {
        http: config.http_config(cli.read_timeout),
        backoff: config.backoff(cli.backoff_ms),
        config,
        progress,
        shutdown: Shutdown::new(),
    };

    match cli.command {
        Command::Run(args) => {
            setup_signal_handler(&session.shutdown)?;
            cmd::run::run(args, &session)
        }
        Command::Complement(args) => {
            setup_signal_handler(&session.shutdown)?;
            cmd::complement::run(args, &session)
        }
        Command::Refine(args) => cmd::refine::run(args, &session),
        Command::Merge(args) => cmd::merge::run(args, &session),
        Command::Config => {
            cmd::print_summary("Setting", &config_rows(&session));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn config_rows(session: &cmd::Session) -> Vec<(&'static str, String)> {
    let config = &session.config;
    let quality = &config.quality.policy;
    vec![
        ("Root directory", config.paths.root.display().to_string()),
        ("Base URL", session.http.base_url.clone()),
        ("User-Agent", session.http.user_agent.clone()),
        (
            "Workers",
            config
                .workers
                .count
                .map_or_else(|| "not set (pass --workers)".to_string(), |n| n.to_string()),
        ),
        (
            "Read timeout",
            format!("{}s", session.http.read_timeout.as_secs()),
        ),
        (
            "Connect timeout",
            format!("{}s", session.http.connect_timeout.as_secs()),
        ),
        (
            "Backoff",
            format!("{}ms, doubling", session.backoff.initial.as_millis()),
        ),
        (
            "Language",
            format!(
                "{} / {}",
                config.language.header_code, config.language.model_label
            ),
        ),
        ("Output prefix", config.language.prefix.clone()),
        (
            "Quality",
            if config.quality.enabled {
                format!(
                    "on (min {} chars, {} marker groups)",
                    quality.min_chars,
                    quality.marker_groups.len()
                )
            } else {
                "off".to_string()
            },
        ),
    ]
}

/// First signal requests a graceful stop; a second one exits immediately.
fn setup_signal_handler(shutdown: &Shutdown) -> Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let shutdown = shutdown.clone();
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if shutdown.request() {
                    std::process::exit(130);
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}
