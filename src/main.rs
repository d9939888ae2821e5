//! WebAudit CLI Entry Point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webaudit::commands;
use webaudit::models::response::CommandResponse;
use webaudit::services::browser::default_engine;
use webaudit::services::{AnalyzeOptions, TracingSink};
use webaudit::state::AppState;

/// WebAudit CLI
#[derive(Parser)]
#[command(name = "webaudit")]
#[command(about = "Audit a website for speed, SEO, security and mobile readiness", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ~/.webaudit/config.json)
    #[arg(short, long, env = "WEBAUDIT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a URL and print the report as JSON
    Analyze {
        url: String,

        /// Skip the mobile screenshot
        #[arg(long)]
        no_screenshots: bool,
    },
    /// Start the service and print its health
    Health,
    /// Show or reset the configuration
    Config {
        /// Restore default settings
        #[arg(long)]
        reset: bool,
    },
    /// Print the version
    Version,
}

fn print<T: Serialize>(response: &CommandResponse<T>) -> ExitCode {
    match serde_json::to_string_pretty(response) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode response: {}", e),
    }
    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let state = AppState::new();

    let code = match cli.command {
        Command::Version => print(&commands::get_version()),
        Command::Config { reset } => {
            if let Err(e) = state.load_config(cli.config).await {
                return print(&CommandResponse::<()>::err(e.to_string()));
            }
            if reset {
                print(&commands::reset_settings(&state).await)
            } else {
                print(&commands::get_settings(&state).await)
            }
        }
        Command::Health => {
            let init = commands::init_app(&state, cli.config, default_engine()).await;
            if !init.success {
                return print(&init);
            }
            print(&commands::get_health(&state).await)
        }
        Command::Analyze {
            url,
            no_screenshots,
        } => {
            let init = commands::init_app(&state, cli.config, default_engine()).await;
            if !init.success {
                return print(&init);
            }

            let token = CancellationToken::new();
            let ctrl_c = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, cancelling analysis");
                    ctrl_c.cancel();
                }
            });

            // Each invocation starts with an empty report cache.
            let options = AnalyzeOptions::default()
                .with_screenshots(!no_screenshots)
                .with_cancellation(token);
            print(&commands::analyze_url(&state, &url, options, &TracingSink).await)
        }
    };

    if let Err(e) = state.shutdown().await {
        warn!(error = %e, "Shutdown reported an error");
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_flags() {
        let cli = Cli::try_parse_from(["webaudit", "analyze", "example.com", "--no-screenshots"]).unwrap();
        match cli.command {
            Command::Analyze { url, no_screenshots } => {
                assert_eq!(url, "example.com");
                assert!(no_screenshots);
            }
            _ => panic!("expected analyze"),
        }

        // The report cache lives only as long as one process.
        assert!(Cli::try_parse_from(["webaudit", "analyze", "example.com", "--no-cache"]).is_err());
    }
}
