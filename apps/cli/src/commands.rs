//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use changelog_core::publish::PublishOutcome;
use changelog_core::service;
use changelog_shared::{AppConfig, init_config, load_config, load_config_from, validate_config};
use changelog_storage::PartsStore;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Changelog bot: collect pull request changelogs and publish them.
#[derive(Parser)]
#[command(
    name = "changelog",
    version,
    about = "Collect changelog entries from merged pull requests and publish them to the repository.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.changelog-bot/changelog.toml.
    #[arg(long, global = true, env = "CHANGELOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Extract the changelog from a pull request description.
    Parse {
        /// File holding the description, or `-` for stdin.
        file: String,

        /// Author to use when the header names none.
        #[arg(short, long, default_value = "unknown")]
        author: String,
    },

    /// Run the service, reading JSON-lines events from stdin.
    Serve,

    /// Run one publish cycle now.
    Publish,

    /// List part records waiting to be published.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "changelog=info",
        1 => "changelog=debug",
        _ => "changelog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `parse` output stays pipeable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Parse { file, author } => cmd_parse(config_path, &file, &author).await,
        Command::Serve => cmd_serve(config_path).await,
        Command::Publish => cmd_publish(config_path).await,
        Command::Status => cmd_status(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_parse(config_path: Option<&Path>, file: &str, author: &str) -> Result<()> {
    let config = resolve_config(config_path)?;

    let body = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).wrap_err_with(|| format!("failed to read {file}"))?
    };

    match changelog_grammar::parse_text(&body, &config.categories(), author) {
        Some(parsed) => {
            let json = serde_json::json!({
                "author": parsed.author,
                "categories": parsed.categories,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        None => println!("no changelog marker found"),
    }
    Ok(())
}

/// One line of `serve` input.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    payload: serde_json::Value,
}

async fn cmd_serve(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = service::start(&config, shutdown_rx)?;

    info!("reading events from stdin, Ctrl-C to stop");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.wrap_err("failed to read stdin")? else {
                    info!("stdin closed, draining pending update");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let envelope: Envelope = match serde_json::from_str(&line) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "skipping malformed event line");
                        continue;
                    }
                };
                match service.router.route(&envelope.event, envelope.payload) {
                    Ok(outcome) => info!(event = %envelope.event, ?outcome, "event routed"),
                    Err(e) => warn!(event = %envelope.event, error = %e, "event rejected"),
                }
            }
        }
    }

    // Dropping the router releases the last handle so a pending window can flush.
    let service::ChangelogService { router, task } = service;
    drop(router);

    tokio::select! {
        joined = task => joined.wrap_err("coordinator task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            info!("second interrupt, aborting pending update");
            let _ = shutdown_tx.send(true);
        }
    }
    Ok(())
}

async fn cmd_publish(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    validate_config(&config)?;

    let outcome = service::publisher_from_config(&config).run().await?;
    match outcome {
        PublishOutcome::NoChanges => println!("Nothing to publish."),
        PublishOutcome::Pushed { attempts } => {
            println!("Published changelog (push attempts: {attempts}).");
        }
        PublishOutcome::PushAbandoned { attempts } => {
            return Err(eyre!(
                "committed locally but push failed after {attempts} attempts"
            ));
        }
    }
    Ok(())
}

async fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = PartsStore::new(config.repo.parts_path());
    let files = store.list()?;

    if files.is_empty() {
        println!("No pending changelog parts in {}.", store.parts_dir().display());
        return Ok(());
    }

    println!("{} pending changelog part(s):", files.len());
    for path in files {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match PartsStore::read(&path) {
            Ok(record) => println!(
                "  {name}  {} change(s) by {}  {}",
                record.changes.len(),
                record.author,
                record.url
            ),
            Err(e) => println!("  {name}  unreadable: {e}"),
        }
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["changelog", "status", "--config", "/tmp/c.toml", "-vv"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/c.toml")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn parse_takes_file_and_author() {
        let cli = Cli::try_parse_from(["changelog", "parse", "-", "--author", "jdoe"]).unwrap();
        match cli.command {
            Command::Parse { file, author } => {
                assert_eq!(file, "-");
                assert_eq!(author, "jdoe");
            }
            _ => panic!("expected parse"),
        }
    }

    #[test]
    fn envelope_decodes() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"event":"push","payload":{"ref":"refs/heads/master"}}"#)
                .unwrap();
        assert_eq!(envelope.event, "push");
        assert_eq!(envelope.payload["ref"], "refs/heads/master");
    }
}
