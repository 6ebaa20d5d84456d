//! Offline view of a timer's stored history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use timer_actors::TimerId;
use timer_events::{EventStore, SequenceNr, StreamId, TimerPhase, recover};

/// What replay reconstructs for one timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub timer_id: TimerId,
    pub stream: StreamId,
    pub phase: TimerPhase,
    pub execution_time: Option<DateTime<Utc>>,
    pub last_sequence_nr: SequenceNr,
    pub snapshot_sequence_nr: Option<SequenceNr>,
    pub events_replayed: usize,
}

/// Replay a timer's stream without spawning or arming it.
///
/// # Errors
///
/// Returns the store's error if the history cannot be read or is corrupt.
pub async fn inspect(
    store: &dyn EventStore,
    timer_id: &TimerId,
) -> timer_events::Result<InspectReport> {
    let stream = timer_id.stream_id();
    let recovered = recover(store, &stream).await?;

    Ok(InspectReport {
        timer_id: timer_id.clone(),
        stream,
        phase: recovered.state.phase(),
        execution_time: recovered.state.execution_time(),
        last_sequence_nr: recovered.last_sequence_nr,
        snapshot_sequence_nr: recovered.snapshot_sequence_nr,
        events_replayed: recovered.events_replayed,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use timer_events::{InMemoryEventStore, TimerEvent};

    #[tokio::test]
    async fn test_unknown_timer_is_idle() {
        let store = InMemoryEventStore::new();
        let report = inspect(&store, &TimerId::new("nobody")).await.unwrap();

        assert_eq!(report.phase, TimerPhase::Idle);
        assert_eq!(report.execution_time, None);
        assert_eq!(report.stream.as_str(), "timer-nobody");
    }

    #[tokio::test]
    async fn test_report_serializes_last_start() {
        let store = InMemoryEventStore::new();
        let id = TimerId::new("a");
        let at = Utc::now();
        store.append(&id.stream_id(), TimerEvent::started(at)).await.unwrap();

        let report = inspect(&store, &id).await.unwrap();
        assert_eq!(report.execution_time, Some(at));
        assert_eq!(report.last_sequence_nr, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "armed");
        assert_eq!(json["stream"], "timer-a");
    }
}
