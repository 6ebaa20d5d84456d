//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event store and replay errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A backend operation (append, read, snapshot) did not succeed.
    #[error("event store operation '{operation}' failed for stream '{stream}': {reason}")]
    StoreFailed {
        operation: String,
        stream: String,
        reason: String,
    },

    /// Persisted data for a stream could not be decoded or is inconsistent.
    #[error("stream '{stream}' is corrupt: {reason}")]
    Corrupt { stream: String, reason: String },

    /// Encoding a record failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a store failed error.
    pub fn store_failed(
        operation: impl Into<String>,
        stream: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Create a corruption error.
    pub fn corrupt(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Whether this error means the stored history itself is unusable.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::store_failed("append", "timer-a", "disk full");
        let text = err.to_string();
        assert!(text.contains("append"));
        assert!(text.contains("timer-a"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_corruption_classification() {
        assert!(Error::corrupt("timer-a", "bad json").is_corruption());
        assert!(!Error::store_failed("read", "timer-a", "eio").is_corruption());
        assert!(!Error::serialization("nope").is_corruption());
    }
}
