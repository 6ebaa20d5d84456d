//! DurableTimerActor - one event-sourced single-shot timer.
//!
//! Lifecycle:
//! - `pre_start` recovers state from the store (snapshot, then newer events)
//!   and re-arms the callback for the recovered execution time, if any
//! - `Start` appends first and only then touches in-memory state
//! - `Fire` is delivered by the scheduler and checked against current state
//! - `post_stop` disarms whatever this actor armed

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use timer_events::{EventStore, SequenceNr, Snapshot, StreamId, TimerEvent, TimerState, recover};

use crate::clock::{Clock, delay_until};
use crate::error::TimerError;
use crate::id::TimerId;
use crate::scheduler::{ArmedCallback, CallbackScheduler};

use super::messages::{FireNotice, FireTrigger, TimerMessage, TimerView};

/// The timer actor definition.
#[derive(Clone, Copy, Debug, Default)]
pub struct DurableTimerActor;

/// Arguments passed to the actor on startup.
#[derive(Clone)]
pub struct TimerArguments {
    /// Identity of the timer.
    pub timer_id: TimerId,
    /// Durable log and snapshot store.
    pub store: Arc<dyn EventStore>,
    /// Scheduler that delivers `Fire` back to this actor.
    pub scheduler: Arc<CallbackScheduler>,
    /// Time source for delays and elapsed time.
    pub clock: Arc<dyn Clock>,
    /// Channel receiving a notice for every fire.
    pub fire_tx: broadcast::Sender<FireNotice>,
    /// Take a snapshot after this many appends (0 disables snapshots).
    pub snapshot_every: u64,
}

impl std::fmt::Debug for TimerArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerArguments")
            .field("timer_id", &self.timer_id)
            .field("snapshot_every", &self.snapshot_every)
            .finish_non_exhaustive()
    }
}

impl TimerArguments {
    /// Create arguments with snapshots disabled and a fresh fire channel.
    #[must_use]
    pub fn new(
        timer_id: TimerId,
        store: Arc<dyn EventStore>,
        scheduler: Arc<CallbackScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (fire_tx, _) = broadcast::channel(16);
        Self {
            timer_id,
            store,
            scheduler,
            clock,
            fire_tx,
            snapshot_every: 0,
        }
    }

    /// Publish fire notices on `fire_tx`.
    #[must_use]
    pub fn with_fire_channel(mut self, fire_tx: broadcast::Sender<FireNotice>) -> Self {
        self.fire_tx = fire_tx;
        self
    }

    /// Snapshot after every `every` appends.
    #[must_use]
    pub const fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every;
        self
    }
}

/// Actor state: the recovered timer plus the handles it works with.
pub struct TimerActorState {
    timer_id: TimerId,
    stream: StreamId,
    timer: TimerState,
    last_sequence_nr: SequenceNr,
    appends_since_snapshot: u64,
    armed: Option<ArmedCallback>,
    args: TimerArguments,
}

impl TimerActorState {
    fn view(&self) -> TimerView {
        TimerView {
            timer_id: self.timer_id.clone(),
            execution_time: self.timer.execution_time(),
            phase: self.timer.phase(),
            last_sequence_nr: self.last_sequence_nr,
        }
    }
}

impl Actor for DurableTimerActor {
    type Msg = TimerMessage;
    type State = TimerActorState;
    type Arguments = TimerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let timer_id = args.timer_id.clone();
        let stream = timer_id.stream_id();

        let recovered = match recover(args.store.as_ref(), &stream).await {
            Ok(recovered) => recovered,
            Err(e) => {
                let err = TimerError::from_recovery(timer_id.as_str(), &e);
                error!(
                    timer_id = %timer_id,
                    stream = %stream,
                    error = %err,
                    "Timer recovery failed"
                );
                return Err(err.into());
            }
        };

        info!(
            timer_id = %timer_id,
            stream = %stream,
            phase = %recovered.state.phase(),
            last_sequence_nr = recovered.last_sequence_nr,
            snapshot_sequence_nr = ?recovered.snapshot_sequence_nr,
            events_replayed = recovered.events_replayed,
            "Timer recovered"
        );

        let mut state = TimerActorState {
            timer_id,
            stream,
            timer: recovered.state,
            last_sequence_nr: recovered.last_sequence_nr,
            appends_since_snapshot: u64::try_from(recovered.events_replayed).unwrap_or(u64::MAX),
            armed: None,
            args,
        };

        // Re-arm with the original absolute time; a time already passed fires at once
        if let Some(execution_time) = state.timer.execution_time() {
            Self::arm(&myself, &mut state, execution_time);
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            TimerMessage::Start {
                execution_time,
                reply,
            } => {
                let result = Self::handle_start(&myself, state, execution_time).await;
                // Ignore send error - caller may have timed out
                let _ = reply.send(result);
            }

            TimerMessage::Fire(trigger) => {
                Self::handle_fire(state, trigger);
            }

            TimerMessage::GetState { reply } => {
                let _ = reply.send(state.view());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(armed) = state.armed.take() {
            let disarmed = state.args.scheduler.disarm(&armed);
            debug!(
                key = armed.key(),
                generation = armed.generation(),
                disarmed,
                "Released callback"
            );
        }
        debug!(timer_id = %state.timer_id, "Timer actor stopped");
        Ok(())
    }
}

impl DurableTimerActor {
    /// Persist a start, then apply it and arm the callback.
    async fn handle_start(
        myself: &ActorRef<TimerMessage>,
        state: &mut TimerActorState,
        execution_time: DateTime<Utc>,
    ) -> Result<(), TimerError> {
        let event = TimerEvent::started(execution_time);

        let persisted = match state.args.store.append(&state.stream, event).await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(
                    timer_id = %state.timer_id,
                    execution_time = %execution_time,
                    error = %e,
                    "Failed to persist timer start, state unchanged"
                );
                return Err(TimerError::from(e));
            }
        };

        state.timer = state.timer.apply(&persisted.event);
        state.last_sequence_nr = persisted.sequence_nr;
        state.appends_since_snapshot = state.appends_since_snapshot.saturating_add(1);

        info!(
            timer_id = %state.timer_id,
            execution_time = %execution_time,
            sequence_nr = persisted.sequence_nr,
            "Timer started"
        );

        Self::maybe_snapshot(state).await;
        Self::arm(myself, state, execution_time);
        Ok(())
    }

    fn handle_fire(state: &TimerActorState, trigger: FireTrigger) {
        let armed_for = trigger.armed_for();

        if state.timer.execution_time() != Some(armed_for) {
            debug!(
                timer_id = %state.timer_id,
                armed_for = %armed_for,
                current = ?state.timer.execution_time(),
                "Discarding stale timer callback"
            );
            return;
        }

        let fired_at = state.args.clock.now();
        let elapsed = fired_at
            .signed_duration_since(armed_for)
            .to_std()
            .unwrap_or_default();

        info!(
            timer_id = %state.timer_id,
            execution_time = %armed_for,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Timer fired"
        );

        // No subscribers is fine
        let _ = state.args.fire_tx.send(FireNotice {
            timer_id: state.timer_id.clone(),
            execution_time: armed_for,
            fired_at,
            elapsed,
        });
    }

    fn arm(
        myself: &ActorRef<TimerMessage>,
        state: &mut TimerActorState,
        execution_time: DateTime<Utc>,
    ) {
        let delay = delay_until(state.args.clock.now(), execution_time);
        let armed = state.args.scheduler.arm_once(
            state.stream.as_str(),
            delay,
            myself.clone(),
            TimerMessage::Fire(FireTrigger::new(execution_time)),
        );

        debug!(
            timer_id = %state.timer_id,
            execution_time = %execution_time,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            generation = armed.generation(),
            "Timer armed"
        );
        state.armed = Some(armed);
    }

    async fn maybe_snapshot(state: &mut TimerActorState) {
        let every = state.args.snapshot_every;
        if every == 0 || state.appends_since_snapshot < every {
            return;
        }

        let snapshot = Snapshot::new(state.last_sequence_nr, state.timer, state.args.clock.now());
        match state.args.store.save_snapshot(&state.stream, snapshot).await {
            Ok(()) => {
                state.appends_since_snapshot = 0;
                debug!(
                    timer_id = %state.timer_id,
                    sequence_nr = state.last_sequence_nr,
                    "Snapshot saved"
                );
            }
            Err(e) => {
                warn!(timer_id = %state.timer_id, error = %e, "Failed to save snapshot");
            }
        }
    }
}

/// Spawn an unsupervised timer actor.
///
/// Recovery runs before this returns; a corrupt history is reported as
/// [`TimerError::RecoveryCorruption`].
pub async fn spawn_timer(
    args: TimerArguments,
) -> Result<(ActorRef<TimerMessage>, tokio::task::JoinHandle<()>), TimerError> {
    let timer_id = args.timer_id.clone();
    Actor::spawn(None, DurableTimerActor, args)
        .await
        .map_err(|e| spawn_error(&timer_id, e))
}

/// Recover the `TimerError` raised by `pre_start` from a spawn failure.
pub(crate) fn spawn_error(timer_id: &TimerId, err: ractor::SpawnErr) -> TimerError {
    match err {
        ractor::SpawnErr::StartupFailed(inner) => match inner.downcast::<TimerError>() {
            Ok(timer_err) => *timer_err,
            Err(other) => {
                TimerError::spawn_failed(format!("Failed to spawn timer '{timer_id}': {other}"))
            }
        },
        other => TimerError::spawn_failed(format!("Failed to spawn timer '{timer_id}': {other}")),
    }
}
