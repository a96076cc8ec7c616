//! Approval hub: server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config, init logger at the effective level
//!   4. Open the store (creates the schema on first run)
//!   5. Create the bootstrap admin when the user table is empty
//!   6. Spawn Ctrl-C → shutdown watcher and the session sweeper
//!   7. Serve the API until shutdown

use std::time::Duration;

use approval_hub::api::{self, AppState};
use approval_hub::auth::Auth;
use approval_hub::error::AppError;
use approval_hub::store::Store;
use approval_hub::{config, logger};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        name = %config.server.name,
        db_path = %config.db_path.display(),
        bind = %config.server.bind,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let store = Store::open(&config.db_path)?;
    let auth = Auth::new(store.clone(), config.auth.clone());
    if auth.bootstrap_admin()?.is_none() {
        debug!("bootstrap admin not needed");
    }
    let purged = store.purge_expired_sessions()?;
    if purged > 0 {
        info!(purged, "expired sessions removed");
    }

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    tokio::spawn(sweep_sessions(store.clone(), shutdown.clone()));

    let state = AppState::new(&config.server.name, store, auth);
    api::serve(&config.server.bind, state, shutdown).await
}

/// Periodically drop expired sessions until shutdown.
async fn sweep_sessions(store: Store, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    // The first tick completes immediately and startup already purged.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.purge_expired_sessions()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(purged)) => debug!(purged, "expired sessions removed"),
                    Ok(Err(e)) => warn!("session sweep failed: {e}"),
                    Err(e) => warn!("session sweep task failed: {e}"),
                }
            }
        }
    }
}

struct CliArgs {
    config_path: Option<String>,
    log_level: Option<&'static str>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: approval-hub [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { config_path, log_level }
}
