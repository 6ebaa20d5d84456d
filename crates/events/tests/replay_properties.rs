//! Property-based tests for deterministic replay using proptest.
//!
//! Properties verified:
//! - Last write wins regardless of where snapshots were taken
//! - Replaying the same log twice yields identical state
//! - Streams never influence each other

#![allow(clippy::panic)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use timer_events::{
    EventStore, InMemoryEventStore, Snapshot, StreamId, TimerEvent, TimerState, recover,
};

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{}: {}", context, e),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    unwrap_result(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
        "runtime creation should succeed",
    )
}

fn at(offset_secs: i64) -> DateTime<Utc> {
    let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single();
    epoch.map_or_else(Utc::now, |e| e + Duration::seconds(offset_secs))
}

/// Append every start, snapshotting after the positions in `snapshot_after`.
async fn record(
    store: &InMemoryEventStore,
    stream: &StreamId,
    offsets: &[i64],
    snapshot_after: &[usize],
) {
    let mut state = TimerState::idle();
    for (index, offset) in offsets.iter().enumerate() {
        let event = TimerEvent::started(at(*offset));
        let persisted = unwrap_result(store.append(stream, event.clone()).await, "append");
        state = state.apply(&event);

        if snapshot_after.contains(&index) {
            unwrap_result(
                store
                    .save_snapshot(stream, Snapshot::new(persisted.sequence_nr, state, Utc::now()))
                    .await,
                "snapshot",
            );
        }
    }
}

// ==========================================================================
// PROPERTY: Last write wins across snapshots
// ==========================================================================

proptest! {
    #[test]
    fn prop_last_start_wins_regardless_of_snapshots(
        offsets in prop::collection::vec(-10_000i64..10_000, 1..40),
        snapshot_after in prop::collection::vec(0usize..40, 0..5),
    ) {
        let rt = runtime();
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("timer-prop");

        let recovered = rt.block_on(async {
            record(&store, &stream, &offsets, &snapshot_after).await;
            recover(&store, &stream).await
        });
        let recovered = unwrap_result(recovered, "recover");

        let expected = offsets.last().map(|o| at(*o));
        prop_assert_eq!(recovered.state.execution_time(), expected);
        prop_assert_eq!(recovered.last_sequence_nr, offsets.len() as u64);
    }

    #[test]
    fn prop_replay_is_idempotent(
        offsets in prop::collection::vec(-10_000i64..10_000, 0..40),
        snapshot_after in prop::collection::vec(0usize..40, 0..5),
    ) {
        let rt = runtime();
        let store = InMemoryEventStore::new();
        let stream = StreamId::new("timer-idem");

        let (first, second) = rt.block_on(async {
            record(&store, &stream, &offsets, &snapshot_after).await;
            (recover(&store, &stream).await, recover(&store, &stream).await)
        });

        prop_assert_eq!(unwrap_result(first, "first"), unwrap_result(second, "second"));
    }

    #[test]
    fn prop_streams_are_independent(
        a_offsets in prop::collection::vec(-1_000i64..1_000, 1..20),
        b_offsets in prop::collection::vec(-1_000i64..1_000, 1..20),
    ) {
        let rt = runtime();
        let store = InMemoryEventStore::new();
        let a = StreamId::new("timer-A");
        let b = StreamId::new("timer-B");

        let (ra, rb) = rt.block_on(async {
            // Interleave appends across the two identities
            let longest = a_offsets.len().max(b_offsets.len());
            for i in 0..longest {
                if let Some(o) = a_offsets.get(i) {
                    unwrap_result(store.append(&a, TimerEvent::started(at(*o))).await, "append a");
                }
                if let Some(o) = b_offsets.get(i) {
                    unwrap_result(store.append(&b, TimerEvent::started(at(*o))).await, "append b");
                }
            }
            (recover(&store, &a).await, recover(&store, &b).await)
        });

        let ra = unwrap_result(ra, "recover a");
        let rb = unwrap_result(rb, "recover b");
        prop_assert_eq!(ra.state.execution_time(), a_offsets.last().map(|o| at(*o)));
        prop_assert_eq!(rb.state.execution_time(), b_offsets.last().map(|o| at(*o)));
        prop_assert_eq!(ra.last_sequence_nr, a_offsets.len() as u64);
        prop_assert_eq!(rb.last_sequence_nr, b_offsets.len() as u64);
    }
}
