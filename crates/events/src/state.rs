//! Timer state as a pure reduction over its events.
//!
//! State is never mutated in place by callers: every transition goes through
//! [`TimerState::apply`], so recovery and live command handling produce the
//! same value for the same event sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TimerEvent;
use crate::types::SequenceNr;

/// Logical phase of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// No execution time has ever been recorded.
    Idle,
    /// An execution time is recorded. The callback may be pending or may
    /// already have fired.
    Armed,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
        }
    }
}

/// The only persisted entity of a timer: when it should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerState {
    /// `None` means no timer is armed.
    execution_time: Option<DateTime<Utc>>,
}

impl TimerState {
    /// The empty state of a timer that has never been started.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            execution_time: None,
        }
    }

    /// Get the recorded execution time, if any.
    #[must_use]
    pub const fn execution_time(&self) -> Option<DateTime<Utc>> {
        self.execution_time
    }

    /// Get the logical phase.
    #[must_use]
    pub const fn phase(&self) -> TimerPhase {
        match self.execution_time {
            Some(_) => TimerPhase::Armed,
            None => TimerPhase::Idle,
        }
    }

    /// Apply one event, returning the next state. Last write wins.
    #[must_use]
    pub fn apply(self, event: &TimerEvent) -> Self {
        match event {
            TimerEvent::Started { execution_time } => Self {
                execution_time: Some(*execution_time),
            },
        }
    }

    /// Apply an ordered sequence of events on top of `self`.
    #[must_use]
    pub fn replay_onto<'a>(self, events: impl IntoIterator<Item = &'a TimerEvent>) -> Self {
        events.into_iter().fold(self, Self::apply)
    }

    /// Reduce an ordered sequence of events from the idle state.
    #[must_use]
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a TimerEvent>) -> Self {
        Self::idle().replay_onto(events)
    }
}

/// Compacted state valid up to and including `sequence_nr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence_nr: SequenceNr,
    pub state: TimerState,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot of `state` at `sequence_nr`.
    #[must_use]
    pub const fn new(sequence_nr: SequenceNr, state: TimerState, taken_at: DateTime<Utc>) -> Self {
        Self {
            sequence_nr,
            state,
            taken_at,
        }
    }
}
