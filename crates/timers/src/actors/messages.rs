//! Messages for the timer actors.
//!
//! Design principles:
//! - Start is a command with a reply so callers learn whether it was persisted
//! - Fire is internal: only the callback scheduler can produce a trigger
//! - Business errors are returned in RPC replies, NOT as actor crashes

use std::time::Duration;

use chrono::{DateTime, Utc};
use ractor::RpcReplyPort;
use serde::Serialize;
use timer_events::{SequenceNr, TimerPhase};

use crate::error::TimerError;
use crate::id::TimerId;

/// Delivery of an armed callback.
///
/// Carries the execution time it was armed for, so a delivery left over from
/// an earlier start can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireTrigger {
    armed_for: DateTime<Utc>,
}

impl FireTrigger {
    pub(crate) const fn new(armed_for: DateTime<Utc>) -> Self {
        Self { armed_for }
    }

    /// Execution time the callback was armed for.
    #[must_use]
    pub const fn armed_for(&self) -> DateTime<Utc> {
        self.armed_for
    }
}

/// Messages for the `DurableTimerActor`.
#[derive(Debug)]
pub enum TimerMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // COMMANDS
    // ═══════════════════════════════════════════════════════════════════════
    /// Durably record a new execution time and arm the callback.
    ///
    /// Past times are accepted and fire immediately.
    Start {
        /// When the timer should fire.
        execution_time: DateTime<Utc>,
        /// Reply port, answered once the start is persisted (or failed to be).
        reply: RpcReplyPort<Result<(), TimerError>>,
    },

    /// Callback delivery from the scheduler.
    Fire(FireTrigger),

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════
    /// Get the in-memory view of the timer.
    GetState {
        /// Reply port for the response.
        reply: RpcReplyPort<TimerView>,
    },
}

/// Snapshot of a timer as seen by its actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerView {
    /// The timer.
    pub timer_id: TimerId,
    /// Pending execution time, if any start was recorded.
    pub execution_time: Option<DateTime<Utc>>,
    /// Derived phase.
    pub phase: TimerPhase,
    /// Sequence number of the last persisted event (0 if none).
    pub last_sequence_nr: SequenceNr,
}

/// Published every time a timer fires.
///
/// Restarts can fire the same execution time again; consumers deduplicate
/// on `(timer_id, execution_time)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireNotice {
    /// The timer that fired.
    pub timer_id: TimerId,
    /// Execution time that was reached.
    pub execution_time: DateTime<Utc>,
    /// Clock reading when the fire was handled.
    pub fired_at: DateTime<Utc>,
    /// How late the fire was handled, zero if on time.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_remember_armed_time() {
        let at = Utc::now();
        assert_eq!(FireTrigger::new(at).armed_for(), at);
    }

    #[test]
    fn should_serialize_timer_view() {
        let view = TimerView {
            timer_id: TimerId::new("a"),
            execution_time: None,
            phase: TimerPhase::Idle,
            last_sequence_nr: 0,
        };

        let json = serde_json::to_value(&view).unwrap_or_default();
        assert_eq!(json["timer_id"], "a");
        assert!(json["execution_time"].is_null());
    }
}
