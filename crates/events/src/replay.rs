//! Recovery of timer state from a snapshot plus the events after it.
//!
//! Replay is deterministic: the same stored history always yields the same
//! [`Recovered`] value, no matter how often it is replayed.

use crate::error::{Error, Result};
use crate::event::PersistedEvent;
use crate::state::{Snapshot, TimerState};
use crate::store::EventStore;
use crate::types::{SequenceNr, StreamId};

/// Result of replaying one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovered {
    /// State after the snapshot and every later event were applied.
    pub state: TimerState,
    /// Position of the last applied record (event or snapshot), `0` if none.
    pub last_sequence_nr: SequenceNr,
    /// Position the snapshot covered, if one was loaded.
    pub snapshot_sequence_nr: Option<SequenceNr>,
    /// Number of events applied on top of the snapshot.
    pub events_replayed: usize,
}

impl Recovered {
    /// Whether the stream had no history at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.last_sequence_nr == 0 && self.snapshot_sequence_nr.is_none()
    }
}

/// Replay a stream: snapshot first (if any), then later events in log order.
///
/// # Errors
///
/// Returns the store's error if loading fails, or [`Error::Corrupt`] when
/// sequence numbers are not strictly increasing past the snapshot point.
pub async fn recover(store: &dyn EventStore, stream: &StreamId) -> Result<Recovered> {
    let snapshot = store.load_snapshot(stream).await?;
    let after = snapshot.map_or(0, |s| s.sequence_nr);
    let events = store.replay(stream, after).await?;

    replay_from(stream, snapshot, &events)
}

/// Pure part of [`recover`]: fold `events` on top of `snapshot`.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if an event is at or before the previous
/// position.
pub fn replay_from(
    stream: &StreamId,
    snapshot: Option<Snapshot>,
    events: &[PersistedEvent],
) -> Result<Recovered> {
    let start = snapshot.map_or((TimerState::idle(), 0), |s| (s.state, s.sequence_nr));

    let (state, last_sequence_nr) =
        events
            .iter()
            .try_fold(start, |(state, last), persisted| {
                if persisted.sequence_nr <= last {
                    return Err(Error::corrupt(
                        stream.as_str(),
                        format!(
                            "event {} replayed after position {last}",
                            persisted.sequence_nr
                        ),
                    ));
                }
                Ok((state.apply(&persisted.event), persisted.sequence_nr))
            })?;

    Ok(Recovered {
        state,
        last_sequence_nr,
        snapshot_sequence_nr: snapshot.map(|s| s.sequence_nr),
        events_replayed: events.len(),
    })
}
