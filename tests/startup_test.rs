//! Integration tests for the binary's startup path.
//!
//! These tests verify that:
//! - A config file drives where timers are journaled
//! - A start recorded by one registry is visible to offline inspection
//! - A missing history inspects as an idle timer

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use durable_timer::{AppConfig, inspect};
use timer_actors::{MonotonicClock, TimerId, TimerRegistry};
use timer_events::{EventStore, FileEventStore, TimerPhase};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config_in(dir: &std::path::Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = dir.join("timer.toml");
    let data_dir = dir.join("journal");
    std::fs::write(
        &path,
        format!(
            "data_dir = {:?}\n\n[registry]\nsnapshot_every = 2\n",
            data_dir.display().to_string()
        ),
    )?;
    Ok(AppConfig::from_file(&path)?)
}

#[tokio::test]
async fn test_started_timer_is_visible_to_inspect() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = config_in(dir.path())?;
    assert_eq!(config.registry.snapshot_every, 2);

    let id = TimerId::new("invoice-42");
    let at = Utc::now() + TimeDelta::hours(1);

    let store: Arc<dyn EventStore> = Arc::new(FileEventStore::open(&config.data_dir).await?);
    let registry = TimerRegistry::spawn(
        Arc::clone(&store),
        config.registry.clone(),
        Arc::new(MonotonicClock::new()),
    )
    .await?;
    registry.start_timer(&id, at - TimeDelta::minutes(5)).await?;
    registry.start_timer(&id, at).await?;
    registry.shutdown().await?;

    let reopened = FileEventStore::open(&config.data_dir).await?;
    let report = inspect(&reopened, &id).await?;

    assert_eq!(report.phase, TimerPhase::Armed);
    assert_eq!(report.execution_time, Some(at));
    assert_eq!(report.last_sequence_nr, 2);
    assert_eq!(report.snapshot_sequence_nr, Some(2));
    assert_eq!(report.events_replayed, 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_timer_inspects_idle() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = FileEventStore::open(dir.path()).await?;

    let report = inspect(&store, &TimerId::new("nobody")).await?;

    assert_eq!(report.phase, TimerPhase::Idle);
    assert_eq!(report.last_sequence_nr, 0);
    Ok(())
}
