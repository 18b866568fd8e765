mod auth;
mod cli;
mod config;
mod engine;
mod error;
mod gateway;
mod logging;
mod notify;
mod state_machine;
mod store;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use cli::{Cli, Command};
use config::BookingConfig;
use engine::LifecycleEngine;
use gateway::AppState;
use logging::LogFormat;
use notify::{Dispatcher, HttpNotifier, LogNotifier, Transport};
use state_machine::User;
use store::{JobFilter, JobStore, JsonFileStore};
use ui::JobTable;

fn transport(config: &BookingConfig) -> Result<Transport> {
    if config.notifications.has_gateway() {
        let notifier = HttpNotifier::new(&config.notifications)
            .context("building notification client")?;
        Ok(Transport::Http(notifier))
    } else {
        tracing::warn!("no notification gateway configured, notifications are only logged");
        Ok(Transport::Log(LogNotifier))
    }
}

fn build_engine(config: &BookingConfig) -> Result<LifecycleEngine<Transport>> {
    let store = JsonFileStore::open(&config.data_file)
        .with_context(|| format!("opening {}", config.data_file.display()))?;
    let dispatcher = Dispatcher::new(transport(config)?, config.notifications.timeout());
    Ok(LifecycleEngine::new(
        Arc::new(store),
        Arc::new(dispatcher),
        config.lifecycle.clone(),
        config.notifications.admin_email.clone(),
    ))
}

fn spawn_sweeper(engine: Arc<LifecycleEngine<Transport>>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep(Utc::now()).await {
                tracing::error!(error = %e, "sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = BookingConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_file = data;
    }
    logging::init(cli.verbose, LogFormat::parse(&config.log_format))?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let engine = Arc::new(build_engine(&config)?);
            spawn_sweeper(
                Arc::clone(&engine),
                Duration::from_secs(config.lifecycle.sweep_interval_secs.max(1)),
            );

            let app = gateway::router(AppState::new(engine, config.roles.clone()));
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            tracing::info!(%bind, data_file = %config.data_file.display(), "bookline listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("http server")?;
        }
        Command::Sweep => {
            let engine = build_engine(&config)?;
            let report = engine.sweep(Utc::now()).await?;
            JobTable::default().print_sweep(&report);
            // Alerts are delivered in the background; give them one timeout to land.
            if !report.alerted.is_empty() || !report.no_show_cancelled.is_empty() {
                tokio::time::sleep(config.notifications.timeout()).await;
            }
        }
        Command::Status { status } => {
            let store = JsonFileStore::open(&config.data_file)
                .with_context(|| format!("opening {}", config.data_file.display()))?;
            let filter = JobFilter {
                statuses: status.into_iter().collect(),
                ..Default::default()
            };
            let jobs = store.query(&filter)?;
            JobTable::default().print(&jobs);
        }
        Command::Users { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let users: Vec<User> = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", file.display()))?;
            let store = JsonFileStore::open(&config.data_file)
                .with_context(|| format!("opening {}", config.data_file.display()))?;
            let count = users.len();
            for user in users {
                store.add_user(user)?;
            }
            tracing::info!(count, path = %store.path().display(), "imported users");
            println!("Imported {count} users into {}", store.path().display());
        }
    }

    Ok(())
}
