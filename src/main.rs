//! # durable-timer
//!
//! Entry point of the durable timer CLI.
//!
//! ## Commands
//!
//! - `start`: durably record a start, optionally waiting for the fire
//! - `run`: recover every stored timer and report fires until Ctrl+C
//! - `inspect`: replay a timer's history offline and print it as JSON
//!
//! ## Shutdown
//!
//! Ctrl+C stops the supervisor, which stops every timer actor and disarms
//! its pending callback. Recorded starts stay in the journal and re-arm on
//! the next `run`.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use durable_timer::cli::{Cli, Commands, When};
use durable_timer::{AppConfig, inspect};
use timer_actors::{FireNotice, MonotonicClock, TimerId, TimerRegistry};
use timer_events::{EventStore, FileEventStore, TracingEventStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_data_dir(cli.data_dir);

    init_tracing(&config.log_filter);

    match cli.command {
        Commands::Start { id, when, wait } => start(&config, TimerId::new(id), &when, wait).await,
        Commands::Run => run(&config).await,
        Commands::Inspect { id } => inspect_timer(&config, &TimerId::new(id)).await,
    }
}

/// Initialize tracing subscriber with environment filter.
///
/// `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the journal directory named in the config.
async fn open_store(config: &AppConfig) -> Result<Arc<dyn EventStore>> {
    let store = FileEventStore::open(&config.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?;
    Ok(Arc::new(TracingEventStore::new(store)))
}

async fn spawn_registry(config: &AppConfig) -> Result<TimerRegistry> {
    let store = open_store(config).await?;
    TimerRegistry::spawn(store, config.registry.clone(), Arc::new(MonotonicClock::new()))
        .await
        .context("Failed to start timer supervisor")
}

async fn start(config: &AppConfig, timer_id: TimerId, when: &When, wait: bool) -> Result<()> {
    let execution_time = when
        .resolve(Utc::now())
        .ok_or_else(|| anyhow!("Execution time is out of range"))?;

    let registry = spawn_registry(config).await?;
    // Subscribe before starting so a past time cannot fire unseen
    let mut fires = registry.subscribe();

    registry
        .start_timer(&timer_id, execution_time)
        .await
        .with_context(|| format!("Failed to start timer '{timer_id}'"))?;
    println!("{timer_id} armed for {}", execution_time.to_rfc3339());

    if wait {
        info!(timer_id = %timer_id, "Waiting for timer to fire. Press Ctrl+C to stop.");
        tokio::select! {
            notice = wait_for_fire(&mut fires, &timer_id) => {
                if let Some(notice) = notice {
                    print_fire(&notice);
                }
            }
            () = wait_for_shutdown() => {}
        }
    }

    registry.shutdown().await.context("Failed to stop timers")
}

async fn run(config: &AppConfig) -> Result<()> {
    let registry = spawn_registry(config).await?;
    let mut fires = registry.subscribe();

    let recovered = registry
        .recover_all()
        .await
        .context("Failed to list stored timers")?;
    info!(
        timers = recovered.len(),
        data_dir = %config.data_dir.display(),
        "Durable timers running. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            received = fires.recv() => match received {
                Ok(notice) => print_fire(&notice),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Fire notices dropped"),
                Err(RecvError::Closed) => break,
            },
            () = wait_for_shutdown() => break,
        }
    }

    info!("Cleaning up...");
    registry.shutdown().await.context("Failed to stop timers")?;
    info!("Durable timers stopped gracefully");
    Ok(())
}

async fn inspect_timer(config: &AppConfig, timer_id: &TimerId) -> Result<()> {
    let store = open_store(config).await?;
    let report = inspect(store.as_ref(), timer_id)
        .await
        .with_context(|| format!("Failed to recover timer '{timer_id}'"))?;

    let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
    println!("{json}");
    Ok(())
}

/// Next fire of `timer_id`, or `None` if the channel closed.
async fn wait_for_fire(
    fires: &mut tokio::sync::broadcast::Receiver<FireNotice>,
    timer_id: &TimerId,
) -> Option<FireNotice> {
    loop {
        match fires.recv().await {
            Ok(notice) if &notice.timer_id == timer_id => return Some(notice),
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => warn!(missed, "Fire notices dropped"),
            Err(RecvError::Closed) => return None,
        }
    }
}

fn print_fire(notice: &FireNotice) {
    println!(
        "{} fired for {} ({} ms late)",
        notice.timer_id,
        notice.execution_time.to_rfc3339(),
        notice.elapsed.as_millis()
    );
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
