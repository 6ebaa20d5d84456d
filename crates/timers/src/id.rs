//! Timer identity.

use serde::{Deserialize, Serialize};
use timer_events::StreamId;

/// Namespace prefix of every timer's persistent stream.
pub const PERSISTENCE_PREFIX: &str = "timer";

/// Caller-supplied identifier of a timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    /// Create a timer ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The stream this timer's events and snapshots live in.
    ///
    /// Derived only from the ID, so a recreated timer finds its history.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(format!("{PERSISTENCE_PREFIX}-{}", self.0))
    }

    /// Recover the timer ID from a stream ID, if it is a timer stream.
    #[must_use]
    pub fn from_stream_id(stream: &StreamId) -> Option<Self> {
        stream.strip_namespace(PERSISTENCE_PREFIX).map(Self::new)
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TimerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
