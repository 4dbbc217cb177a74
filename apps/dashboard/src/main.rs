use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{InventoryClient, NotificationSink, Route};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod console;

use app::Dashboard;
use cli::{Args, Command};
use config::{load_settings, prepare_database_url, Settings};
use console::{ConsoleNavigator, StdinConfirm};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command, settings).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("dashboard: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, settings: Settings) -> Result<bool> {
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(
            database_url = %database_url,
            "failed to open local state database: {err:#}"
        );
        err
    })?;
    storage.health_check().await?;
    info!(api = %settings.api_base_url, database_url = %database_url, "dashboard: starting");

    let (sink, notifications) = NotificationSink::channel();

    let confirm = Arc::new(StdinConfirm::default());
    let client = InventoryClient::new(
        &settings.api_base_url,
        Arc::new(storage),
        Arc::new(ConsoleNavigator::new(Route::Login)),
        confirm.clone(),
        sink.clone(),
    )?;
    let dashboard = Dashboard::new(client, confirm, sink, notifications);
    dashboard.restore_session().await?;

    let outcome = match command {
        Command::Shell => dashboard.shell().await,
        other => dashboard.execute(other).await,
    };
    dashboard.flush_notifications();
    outcome
}
