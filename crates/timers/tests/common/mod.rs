//! Shared helpers for timer integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::broadcast;

use timer_actors::{FireNotice, MonotonicClock, RegistryConfig, SupervisorConfig, TimerRegistry};
use timer_events::{
    Error, EventStore, InMemoryEventStore, PersistedEvent, Result, SequenceNr, Snapshot, StreamId,
    TimerEvent,
};

/// Fixed wall-clock origin for paused-time tests.
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("valid origin")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config() -> RegistryConfig {
    RegistryConfig {
        snapshot_every: 3,
        fire_channel_capacity: 64,
        call_timeout_ms: 1_000,
        supervisor: SupervisorConfig::for_testing(),
    }
}

/// Registry on `store` with a clock anchored at `origin()`.
pub async fn registry_on(store: Arc<dyn EventStore>) -> TimerRegistry {
    TimerRegistry::spawn(
        store,
        test_config(),
        Arc::new(MonotonicClock::starting_at(origin())),
    )
    .await
    .expect("registry spawn")
}

/// Next fire notice, failing the test if none arrives within `within`.
pub async fn next_fire(rx: &mut broadcast::Receiver<FireNotice>, within: Duration) -> FireNotice {
    tokio::time::timeout(within, rx.recv())
        .await
        .expect("no fire before timeout")
        .expect("fire channel closed")
}

/// Store wrapper that fails on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryEventStore,
    fail_appends: AtomicBool,
    corrupt_reads: AtomicBool,
}

impl FlakyStore {
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn corrupt_reads(&self, corrupt: bool) {
        self.corrupt_reads.store(corrupt, Ordering::SeqCst);
    }

    pub async fn event_count(&self, stream: &StreamId) -> usize {
        self.inner.event_count(stream).await
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::store_failed("append", stream.as_str(), "disk unavailable"));
        }
        self.inner.append(stream, event).await
    }

    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        if self.corrupt_reads.load(Ordering::SeqCst) {
            return Err(Error::corrupt(stream.as_str(), "snapshot is not valid JSON"));
        }
        self.inner.load_snapshot(stream).await
    }

    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>> {
        self.inner.replay(stream, after).await
    }

    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()> {
        self.inner.save_snapshot(stream, snapshot).await
    }

    async fn streams(&self) -> Result<Vec<StreamId>> {
        self.inner.streams().await
    }
}
