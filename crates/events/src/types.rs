//! Core types for the events crate.

use serde::{Deserialize, Serialize};

/// Identifier of one append-only stream in an event store.
///
/// Every timer identity owns exactly one stream; nothing else writes to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strip a `<prefix>-` namespace, returning the remainder.
    #[must_use]
    pub fn strip_namespace(&self, prefix: &str) -> Option<&str> {
        self.0
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its stream. The first event is `1`.
pub type SequenceNr = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_display() {
        let id = StreamId::new("timer-123");
        assert_eq!(format!("{id}"), "timer-123");
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(StreamId::new("timer-abc").strip_namespace("timer"), Some("abc"));
        assert_eq!(
            StreamId::new("timer-a-b").strip_namespace("timer"),
            Some("a-b")
        );
        assert_eq!(StreamId::new("timer-").strip_namespace("timer"), None);
        assert_eq!(StreamId::new("other-abc").strip_namespace("timer"), None);
        assert_eq!(StreamId::new("timerabc").strip_namespace("timer"), None);
    }
}
