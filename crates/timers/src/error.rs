//! Timer error types.
//!
//! These are business errors returned in RPC replies and from the registry
//! handle. They are NOT actor crashes: a timer that fails to persist a start
//! keeps running with its previous state.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by timers and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The durable append (or another store operation) did not succeed.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Stored history for a timer could not be decoded.
    #[error("Recovery of timer '{timer_id}' failed: {reason}")]
    RecoveryCorruption { timer_id: String, reason: String },

    /// Failed to spawn an actor.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// The actor is not available (stopped or not started).
    #[error("Actor not available")]
    ActorUnavailable,

    /// RPC call timed out.
    #[error("RPC timeout after {0:?}")]
    RpcTimeout(Duration),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TimerError {
    /// Create a persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a recovery corruption error.
    pub fn recovery_corruption(timer_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecoveryCorruption {
            timer_id: timer_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create an actor unavailable error.
    #[must_use]
    pub const fn actor_unavailable() -> Self {
        Self::ActorUnavailable
    }

    /// Create an RPC timeout error.
    #[must_use]
    pub const fn rpc_timeout(duration: Duration) -> Self {
        Self::RpcTimeout(duration)
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a store error raised while bringing `timer_id` online.
    #[must_use]
    pub fn from_recovery(timer_id: &str, err: &timer_events::Error) -> Self {
        if err.is_corruption() {
            Self::recovery_corruption(timer_id, err.to_string())
        } else {
            Self::persistence(err.to_string())
        }
    }
}

impl From<timer_events::Error> for TimerError {
    fn from(e: timer_events::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
