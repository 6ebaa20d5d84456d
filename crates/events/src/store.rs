//! Event store trait and implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::{PersistedEvent, TimerEvent};
use crate::state::Snapshot;
use crate::types::{SequenceNr, StreamId};

/// Trait for durable log/snapshot backends.
///
/// Write access is scoped per stream: implementations must keep each
/// stream's sequence numbers gapless and strictly increasing, starting at 1.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably append an event to a stream.
    ///
    /// Returns only once the record is durable for this backend.
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent>;

    /// Load the latest snapshot of a stream, if one was saved.
    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>>;

    /// Read events with `sequence_nr > after`, in log order.
    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>>;

    /// Save a snapshot, replacing any previous one for the stream.
    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()>;

    /// List every stream holding at least one event or snapshot.
    async fn streams(&self) -> Result<Vec<StreamId>>;
}

#[async_trait]
impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent> {
        (**self).append(stream, event).await
    }

    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        (**self).load_snapshot(stream).await
    }

    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>> {
        (**self).replay(stream, after).await
    }

    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()> {
        (**self).save_snapshot(stream, snapshot).await
    }

    async fn streams(&self) -> Result<Vec<StreamId>> {
        (**self).streams().await
    }
}

#[derive(Debug, Default)]
struct StreamLog {
    events: Vec<PersistedEvent>,
    snapshot: Option<Snapshot>,
}

impl StreamLog {
    fn next_sequence_nr(&self) -> SequenceNr {
        self.events
            .last()
            .map_or(0, |e| e.sequence_nr)
            .saturating_add(1)
    }
}

/// In-memory event store.
///
/// Outlives the actors that use it, so it stands in for a durable backend
/// when a test restarts timers inside one process.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, StreamLog>>,
}

impl InMemoryEventStore {
    /// Create a new in-memory event store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory event store wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of events recorded for a stream.
    pub async fn event_count(&self, stream: &StreamId) -> usize {
        let streams = self.streams.read().await;
        streams.get(stream).map_or(0, |log| log.events.len())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent> {
        let mut streams = self.streams.write().await;
        let log = streams.entry(stream.clone()).or_default();

        let persisted = PersistedEvent::new(log.next_sequence_nr(), Utc::now(), event);
        log.events.push(persisted.clone());
        Ok(persisted)
    }

    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        let streams = self.streams.read().await;
        Ok(streams.get(stream).and_then(|log| log.snapshot))
    }

    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .map(|log| {
                log.events
                    .iter()
                    .filter(|e| e.sequence_nr > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()> {
        let mut streams = self.streams.write().await;
        streams.entry(stream.clone()).or_default().snapshot = Some(snapshot);
        Ok(())
    }

    async fn streams(&self) -> Result<Vec<StreamId>> {
        let streams = self.streams.read().await;
        let mut ids: Vec<StreamId> = streams.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// A wrapper that adds tracing to an event store.
pub struct TracingEventStore<S: EventStore> {
    inner: S,
}

impl<S: EventStore> TracingEventStore<S> {
    /// Create a new tracing event store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Get the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: EventStore> EventStore for TracingEventStore<S> {
    async fn append(&self, stream: &StreamId, event: TimerEvent) -> Result<PersistedEvent> {
        tracing::debug!(
            stream = %stream,
            event_type = event.event_type(),
            "Appending event"
        );
        let result = self.inner.append(stream, event).await;
        match &result {
            Ok(persisted) => {
                tracing::trace!(stream = %stream, sequence_nr = persisted.sequence_nr, "Event appended");
            }
            Err(e) => tracing::warn!(stream = %stream, error = %e, "Append failed"),
        }
        result
    }

    async fn load_snapshot(&self, stream: &StreamId) -> Result<Option<Snapshot>> {
        tracing::debug!(stream = %stream, "Loading snapshot");
        self.inner.load_snapshot(stream).await
    }

    async fn replay(&self, stream: &StreamId, after: SequenceNr) -> Result<Vec<PersistedEvent>> {
        tracing::debug!(stream = %stream, after, "Replaying events");
        self.inner.replay(stream, after).await
    }

    async fn save_snapshot(&self, stream: &StreamId, snapshot: Snapshot) -> Result<()> {
        tracing::debug!(
            stream = %stream,
            sequence_nr = snapshot.sequence_nr,
            "Saving snapshot"
        );
        self.inner.save_snapshot(stream, snapshot).await
    }

    async fn streams(&self) -> Result<Vec<StreamId>> {
        self.inner.streams().await
    }
}
