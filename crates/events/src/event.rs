//! Timer event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SequenceNr;

/// Events recorded in a timer's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    /// The timer's execution time is now `execution_time`.
    Started { execution_time: DateTime<Utc> },
}

impl TimerEvent {
    /// Create a started event.
    #[must_use]
    pub const fn started(execution_time: DateTime<Utc>) -> Self {
        Self::Started { execution_time }
    }

    /// Get the event type as a string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
        }
    }
}

/// An event as stored: its position in the stream plus when it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub sequence_nr: SequenceNr,
    pub recorded_at: DateTime<Utc>,
    pub event: TimerEvent,
}

impl PersistedEvent {
    /// Wrap an event at the given position.
    #[must_use]
    pub const fn new(sequence_nr: SequenceNr, recorded_at: DateTime<Utc>, event: TimerEvent) -> Self {
        Self {
            sequence_nr,
            recorded_at,
            event,
        }
    }
}
