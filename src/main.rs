//! Command-line front end: runs one relay call and prints its result as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use account_relay_lib::config::Backend;
use account_relay_lib::{CallResult, Relay, RelayConfig, RelayError};
use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Dispatch one account relay call and print the result as JSON.
#[derive(Debug, Parser)]
#[command(name = "account-relay", version)]
struct Cli {
    /// Method name, e.g. `get-account` or `addAccount`.
    method: String,
    /// Arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    args: String,
    /// Record store backend.
    #[arg(long)]
    backend: Option<Backend>,
    /// SQLite database file (defaults to ./account_relay.db).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Store address, `content://<authority>/<path>`.
    #[arg(long)]
    address: Option<String>,
    /// Companion identifier checked by `is-companion-installed`.
    #[arg(long)]
    companion: Option<String>,
}

fn config(cli: &Cli) -> Result<RelayConfig, RelayError> {
    let mut config = RelayConfig::default().with_env_overrides()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(db) = &cli.db {
        config.database_path = Some(db.clone());
    }
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if let Some(companion) = &cli.companion {
        config.companion_id = companion.clone();
    }
    Ok(config.with_default_database_in(Path::new(".")))
}

fn run(cli: &Cli) -> Result<CallResult, RelayError> {
    let args: Map<String, Value> = serde_json::from_str(&cli.args)?;
    let relay = Relay::open(&config(cli)?)?;
    Ok(relay.dispatch(&cli.method, &args))
}

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_env("ACCOUNT_RELAY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(result) => {
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            }
            match result {
                CallResult::Success(_) => ExitCode::SUCCESS,
                CallResult::Error { .. } | CallResult::NotImplemented(_) => ExitCode::from(2),
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
