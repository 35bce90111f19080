//! finsync command-line host.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast;

use finsync::cli::{CacheCommand, Cli, Commands, OutputOptions, TokenCommand, output, session, sync};
use finsync::core::logging::{self, LogSettings};
use finsync::core::{Finsync, SessionEvent};
use finsync::storage::{ResolvedConfig, SqliteRecordStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = LogSettings::resolve(cli.log_level.as_deref(), cli.json, cli.verbose);
    logging::init(&settings);

    let out = OutputOptions {
        json: cli.json,
        pretty: cli.pretty,
    };

    match run(cli, out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}", output::render_error(&e, out));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli, out: OutputOptions) -> finsync::Result<()> {
    let config = ResolvedConfig::resolve(&cli.overrides())?;
    tracing::debug!(
        base_url = %config.base_url,
        base_url_source = ?config.sources.base_url,
        timeout_source = ?config.sources.timeout,
        "Configuration resolved"
    );

    match &cli.command {
        Commands::Cache(CacheCommand::List(args)) => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            sync::cache_list(&store, args, out)
        }
        Commands::Cache(CacheCommand::Clear { resource }) => {
            let store = SqliteRecordStore::open(&config.database_path)?;
            sync::cache_clear(&store, resource.as_deref(), out)
        }
        Commands::Login(args) => {
            let sdk = open_sdk(&config)?;
            session::login(&sdk, args, out).await
        }
        Commands::Logout => {
            let sdk = open_sdk(&config)?;
            session::logout(&sdk, out)
        }
        Commands::Token(TokenCommand::Status) => {
            let sdk = open_sdk(&config)?;
            session::token_status(&sdk, &config, out)
        }
        Commands::Sync(args) => {
            let sdk = open_sdk(&config)?;
            sync::sync(&sdk, args, out).await
        }
    }
}

fn open_sdk(config: &ResolvedConfig) -> finsync::Result<Finsync> {
    let sdk = Finsync::open(config.clone())?;
    tokio::spawn(log_session_events(sdk.session_events()));
    Ok(sdk)
}

async fn log_session_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::LoggedIn { expires_at }) => {
                tracing::info!(%expires_at, "Session started");
            }
            Ok(SessionEvent::TokenRefreshed { expires_at }) => {
                tracing::info!(%expires_at, "Session renewed");
            }
            Ok(SessionEvent::ReauthenticationRequired { reason }) => {
                tracing::warn!(reason = reason.description(), "Session ended; run `finsync login`");
            }
            Ok(SessionEvent::LoggedOut) => tracing::info!("Session closed"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Session events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
