//! reaper: abandoned cloud resource reaper
//!
//! Runs the reap loop against a JSON inventory snapshot, with notifications
//! and provider mutations written to the log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use reaper::ReaperError;
use reaper::config::{Config, ConfigError};
use reaper::events::TracingNotifier;
use reaper::provider::{InventoryFile, LoggingMutator};
use reaper::reaper::{Reaper, SavedStates, load_state_file};
use reaper::token::Action;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "reaper")]
#[command(about = "Finds abandoned cloud resources and escalates them to termination")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "reaper.toml", env = "REAPER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run reap cycles on the configured interval until interrupted
    Run {
        /// JSON inventory snapshot to discover resources from
        #[arg(short, long)]
        inventory: PathBuf,
    },

    /// Run a single reap cycle and print its summary
    Once {
        /// JSON inventory snapshot to discover resources from
        #[arg(short, long)]
        inventory: PathBuf,
    },

    /// Mint a signed action link
    Link {
        /// terminate, stop, forcestop, whitelist, ignore or schedule
        #[arg(long)]
        action: String,

        #[arg(long)]
        region: String,

        #[arg(long)]
        id: String,

        /// Snooze length for the ignore action
        #[arg(long, default_value = "1")]
        days: u64,

        /// Scale-down cron expression for the schedule action
        #[arg(long)]
        scale_down: Option<String>,

        /// Scale-up cron expression for the schedule action
        #[arg(long)]
        scale_up: Option<String>,
    },

    /// Apply an action token after one reap cycle, as the action endpoint would
    Act {
        /// JSON inventory snapshot to discover resources from
        #[arg(short, long)]
        inventory: PathBuf,

        /// Action name from the link
        #[arg(long)]
        action: String,

        /// Signed token from the link
        #[arg(long)]
        token: String,
    },

    /// Print the contents of a state file
    States {
        /// State file to read (defaults to the configured state_file)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print the error chain, then a hint when a reaper error explains it
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\x1b[1;31mreaper:\x1b[0m {e}");
    for cause in e.chain().skip(1) {
        let _ = writeln!(stderr, "  \x1b[2m-> {cause}\x1b[0m");
    }
    if let Some(hint) = hint(e) {
        let _ = writeln!(stderr, "  \x1b[36mhint:\x1b[0m {hint}");
    }
}

fn hint(e: &anyhow::Error) -> Option<String> {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<ReaperError>() {
            return match err {
                ReaperError::InvalidToken(_) => Some(
                    "the link was altered or signed with a different http.token_secret".into(),
                ),
                ReaperError::NotFound { .. } => Some(
                    "only resources reapable in the last cycle can be acted on; \
                     dependencies and whitelisted resources never are"
                        .into(),
                ),
                ReaperError::MalformedState { .. } => {
                    Some("states look like FIRST|1700000000|1700003600".into())
                }
                ReaperError::Provider(p) => p.code.as_ref().map(|code| format!("provider code {code}")),
            };
        }
        if let Some(err) = cause.downcast_ref::<ConfigError>() {
            return Some(
                match err {
                    ConfigError::EmptyTokenSecret => "set http.token_secret in the config file",
                    ConfigError::InvalidApiUrl { .. } => {
                        "http.api_url must be absolute, e.g. https://reaper.example.com/api"
                    }
                    ConfigError::ZeroInterval(_) => "durations are humantime strings such as \"1h\" or \"3days\"",
                    ConfigError::ParamClash => "give http.action_param and http.token_param different names",
                }
                .into(),
            );
        }
    }
    None
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::load(&args.config)?;

    match args.command {
        Command::Run { inventory } => {
            let reaper = Arc::new(build_reaper(config, &inventory).await?);
            let cancel = CancellationToken::new();

            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping after the current cycle");
                    ctrl_c.cancel();
                }
            });

            info!(
                inventory = %inventory.display(),
                interval = %humantime::format_duration(reaper.config().notifications.interval),
                dry_run = reaper.config().dry_run,
                "Starting reaper"
            );
            reaper.run(cancel).await;
        }

        Command::Once { inventory } => {
            let reaper = build_reaper(config, &inventory).await?;
            let report = reaper.run_cycle().await.join_background().await;
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        }

        Command::Link {
            action,
            region,
            id,
            days,
            scale_down,
            scale_up,
        } => {
            let action = parse_action(&action, days, scale_down, scale_up)?;
            let signer = config.link_signer()?;
            let link = signer.make_link(action, &region, &id, Utc::now())?;
            println!("{link}");
        }

        Command::Act {
            inventory,
            action,
            token,
        } => {
            let reaper = build_reaper(config, &inventory).await?;
            reaper.run_cycle().await.join_background().await;
            let applied = reaper
                .action_handler()
                .handle(&action, &token, Utc::now())
                .await
                .with_context(|| format!("Action '{action}' failed"))?;
            println!(
                "{} applied to {} in {}",
                applied.action.name(),
                applied.id,
                applied.region
            );
        }

        Command::States { file } => {
            let path = file
                .or(config.state_file)
                .context("No state file given and none configured")?;
            let states = load_state_file(&path).await?;
            for (region, id, state) in states.sorted() {
                println!(
                    "{region:<15} {id:<40} {:<8} {} -> {}",
                    state.stage().as_str(),
                    state.since(),
                    state.until()
                );
            }
        }
    }

    Ok(())
}

async fn build_reaper(
    config: Config,
    inventory: &Path,
) -> Result<Reaper<InventoryFile, LoggingMutator, TracingNotifier>> {
    let saved = match (&config.state_file, config.load_state_file) {
        (Some(path), true) => match load_state_file(path).await {
            Ok(states) => states,
            Err(e) => {
                warn!(error = ?e, "Starting without saved states");
                SavedStates::new()
            }
        },
        _ => SavedStates::new(),
    };

    let notifier = TracingNotifier::new(config.whitelist_tag.clone());
    let reaper = Reaper::new(config, InventoryFile::new(inventory), LoggingMutator, notifier)
        .context("Invalid configuration")?
        .with_saved_states(saved);
    Ok(reaper)
}

fn parse_action(
    name: &str,
    days: u64,
    scale_down: Option<String>,
    scale_up: Option<String>,
) -> Result<Action> {
    let action = match name {
        "terminate" => Action::Terminate,
        "stop" => Action::Stop,
        "forcestop" => Action::ForceStop,
        "whitelist" => Action::Whitelist,
        "ignore" => Action::ignore_for(Duration::from_secs(days.saturating_mul(86_400))),
        "schedule" => match (scale_down, scale_up) {
            (Some(scale_down), Some(scale_up)) => Action::Schedule {
                scale_down,
                scale_up,
            },
            _ => bail!("schedule needs both --scale-down and --scale-up"),
        },
        other => bail!("Unknown action '{other}'"),
    };
    Ok(action)
}

fn report_json(report: &reaper::reaper::CycleReport) -> serde_json::Value {
    serde_json::json!({
        "discovered": report.discovered,
        "reapable": report.reapable,
        "advanced": report.advanced,
        "whitelisted": report.whitelisted,
        "batches": report.batches,
        "individual": report.individual,
        "state_saved": report.state_saved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_rejected_token_behind_context() {
        let e = anyhow::Error::new(ReaperError::InvalidToken("bad signature".into()))
            .context("Action 'terminate' failed");
        assert!(hint(&e).unwrap().contains("http.token_secret"));
    }

    #[test]
    fn test_hint_for_config_and_provider_errors() {
        let e = anyhow::Error::new(ConfigError::EmptyTokenSecret).context("Invalid configuration");
        assert_eq!(hint(&e).as_deref(), Some("set http.token_secret in the config file"));

        let e = anyhow::Error::new(ReaperError::Provider(reaper::error::ProviderError::with_code(
            "Throttling",
            "rate exceeded",
        )));
        assert_eq!(hint(&e).as_deref(), Some("provider code Throttling"));

        let e = anyhow::Error::new(ReaperError::Provider(reaper::error::ProviderError::new("down")));
        assert_eq!(hint(&e), None);
        assert_eq!(hint(&anyhow::anyhow!("plain failure")), None);
    }
}
