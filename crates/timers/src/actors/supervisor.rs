//! Supervisor owning one timer actor per timer identity.
//!
//! Children are addressed by `TimerId`. A child that exits while still
//! registered is respawned after an exponential backoff; the respawn runs
//! recovery, so the timer re-arms at its original execution time. Too many
//! restarts inside the window drop supervision of that child.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, ActorStatus, RpcReplyPort};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use timer_events::EventStore;

use crate::clock::Clock;
use crate::error::TimerError;
use crate::id::TimerId;
use crate::scheduler::CallbackScheduler;

use super::messages::{FireNotice, TimerMessage};
use super::timer::{DurableTimerActor, TimerArguments, spawn_error};

/// How long shutdown waits for each child to stop.
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for timer supervision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum restarts of one child inside the window.
    pub max_restarts: u32,
    /// Time window for restart counting (seconds).
    pub restart_window_secs: u64,
    /// Base backoff duration in milliseconds.
    pub base_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_window_secs: 60,
            base_backoff_ms: 100,
            max_backoff_ms: 3200,
        }
    }
}

impl SupervisorConfig {
    /// Create a config for testing with shorter timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_restarts: 3,
            restart_window_secs: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 320,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

/// Messages for supervisor communication.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Return the running actor for a timer, spawning it if needed.
    Locate {
        /// Timer to locate.
        timer_id: TimerId,
        /// Reply port for the actor reference or the spawn failure.
        reply: RpcReplyPort<Result<ActorRef<TimerMessage>, TimerError>>,
    },
    /// A child actor exited.
    ChildExited {
        /// Timer the child served.
        timer_id: TimerId,
        /// Actor that exited; ignored if a newer child took its place.
        actor_id: ActorId,
    },
    /// Respawn a child after its backoff elapsed.
    Respawn {
        /// Timer to respawn.
        timer_id: TimerId,
    },
    /// Request supervisor status.
    GetStatus {
        /// Reply port for the response.
        reply: RpcReplyPort<SupervisorStatus>,
    },
    /// Stop every child, then the supervisor.
    Shutdown,
}

/// State of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Supervisor is running normally.
    Running,
    /// Supervisor is shutting down.
    ShuttingDown,
    /// Supervisor has stopped.
    Stopped,
}

/// Status response from supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Current state.
    pub state: SupervisorState,
    /// Timers under supervision.
    pub supervised: usize,
    /// Children currently running.
    pub running: usize,
    /// Total restarts performed.
    pub total_restarts: u32,
    /// Failures in current window.
    pub failures_in_window: usize,
}

/// Information about a supervised child.
#[derive(Debug)]
struct ChildInfo {
    actor_ref: ActorRef<TimerMessage>,
    restart_count: u32,
    restart_times: Vec<Instant>,
}

impl ChildInfo {
    fn is_alive(&self) -> bool {
        matches!(
            self.actor_ref.get_status(),
            ActorStatus::Starting | ActorStatus::Running | ActorStatus::Upgrading
        )
    }
}

/// Definition for the timer supervisor actor.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerSupervisorActor;

/// Arguments for the supervisor actor.
#[derive(Clone)]
pub struct SupervisorArguments {
    /// Store shared by every timer.
    pub store: Arc<dyn EventStore>,
    /// Scheduler shared by every timer.
    pub scheduler: Arc<CallbackScheduler>,
    /// Time source shared by every timer.
    pub clock: Arc<dyn Clock>,
    /// Fire notice channel shared by every timer.
    pub fire_tx: broadcast::Sender<FireNotice>,
    /// Snapshot cadence handed to each timer.
    pub snapshot_every: u64,
    /// Restart policy.
    pub config: SupervisorConfig,
}

impl std::fmt::Debug for SupervisorArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorArguments")
            .field("snapshot_every", &self.snapshot_every)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SupervisorArguments {
    fn timer_args(&self, timer_id: TimerId) -> TimerArguments {
        TimerArguments::new(
            timer_id,
            Arc::clone(&self.store),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.clock),
        )
        .with_fire_channel(self.fire_tx.clone())
        .with_snapshot_every(self.snapshot_every)
    }
}

/// State for the supervisor actor.
pub struct SupervisorActorState {
    args: SupervisorArguments,
    state: SupervisorState,
    children: HashMap<TimerId, ChildInfo>,
    failure_times: Vec<Instant>,
    total_restarts: u32,
}

impl std::fmt::Debug for SupervisorActorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorActorState")
            .field("state", &self.state)
            .field("children", &self.children)
            .field("total_restarts", &self.total_restarts)
            .finish_non_exhaustive()
    }
}

impl Actor for TimerSupervisorActor {
    type Msg = SupervisorMessage;
    type State = SupervisorActorState;
    type Arguments = SupervisorArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            max_restarts = args.config.max_restarts,
            restart_window_secs = args.config.restart_window_secs,
            "Timer supervisor starting"
        );

        Ok(SupervisorActorState {
            args,
            state: SupervisorState::Running,
            children: HashMap::new(),
            failure_times: Vec::new(),
            total_restarts: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Locate { timer_id, reply } => {
                let result = Self::locate(&myself, state, timer_id).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::ChildExited { timer_id, actor_id } => {
                Self::handle_child_exited(&myself, state, &timer_id, actor_id);
            }

            SupervisorMessage::Respawn { timer_id } => {
                Self::handle_respawn(&myself, state, timer_id).await;
            }

            SupervisorMessage::GetStatus { reply } => {
                let _ = reply.send(Self::build_status(state));
            }

            SupervisorMessage::Shutdown => {
                info!(children = state.children.len(), "Timer supervisor shutdown requested");
                state.state = SupervisorState::ShuttingDown;

                for (timer_id, child) in state.children.drain() {
                    debug!(timer_id = %timer_id, "Stopping timer");
                    if child
                        .actor_ref
                        .stop_and_wait(
                            Some("Supervisor shutting down".to_string()),
                            Some(CHILD_STOP_TIMEOUT),
                        )
                        .await
                        .is_err()
                    {
                        debug!(timer_id = %timer_id, "Timer already stopped");
                    }
                }

                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Reached on a direct stop too, so stop any children still registered
        for child in state.children.values() {
            child.actor_ref.stop(None);
        }
        info!(
            children = state.children.len(),
            total_restarts = state.total_restarts,
            "Timer supervisor stopped"
        );
        state.state = SupervisorState::Stopped;
        Ok(())
    }
}

impl TimerSupervisorActor {
    /// Return the running child for `timer_id`, spawning one if needed.
    async fn locate(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        timer_id: TimerId,
    ) -> Result<ActorRef<TimerMessage>, TimerError> {
        if state.state != SupervisorState::Running {
            return Err(TimerError::actor_unavailable());
        }

        if let Some(child) = state.children.get(&timer_id).filter(|c| c.is_alive()) {
            return Ok(child.actor_ref.clone());
        }

        let actor_ref = Self::spawn_child(myself, state, &timer_id).await?;

        // A child that was dropped from supervision starts over with a clean count
        state
            .children
            .entry(timer_id)
            .and_modify(|child| child.actor_ref = actor_ref.clone())
            .or_insert_with(|| ChildInfo {
                actor_ref: actor_ref.clone(),
                restart_count: 0,
                restart_times: Vec::new(),
            });

        Ok(actor_ref)
    }

    /// Spawn a timer actor and watch it for exit.
    async fn spawn_child(
        myself: &ActorRef<SupervisorMessage>,
        state: &SupervisorActorState,
        timer_id: &TimerId,
    ) -> Result<ActorRef<TimerMessage>, TimerError> {
        let args = state.args.timer_args(timer_id.clone());
        let (actor_ref, handle) = Actor::spawn(None, DurableTimerActor, args)
            .await
            .map_err(|e| spawn_error(timer_id, e))?;

        // Monitor for exit
        let myself_clone = myself.clone();
        let child_timer = timer_id.clone();
        let actor_id = actor_ref.get_id();
        tokio::spawn(async move {
            let _ = handle.await;
            let _ = myself_clone.send_message(SupervisorMessage::ChildExited {
                timer_id: child_timer,
                actor_id,
            });
        });

        debug!(timer_id = %timer_id, actor_id = %actor_ref.get_id(), "Timer actor spawned");
        Ok(actor_ref)
    }

    /// Handle a child exit event.
    fn handle_child_exited(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        timer_id: &TimerId,
        actor_id: ActorId,
    ) {
        let is_current = state
            .children
            .get(timer_id)
            .is_some_and(|child| child.actor_ref.get_id() == actor_id);
        if !is_current {
            debug!(timer_id = %timer_id, actor_id = %actor_id, "Ignoring exit of replaced child");
            return;
        }

        if state.state != SupervisorState::Running {
            debug!(timer_id = %timer_id, "Not restarting child - supervisor shutting down");
            state.children.remove(timer_id);
            return;
        }

        warn!(timer_id = %timer_id, actor_id = %actor_id, "Timer actor exited");
        Self::schedule_restart(myself, state, timer_id);
    }

    /// Respawn a child whose backoff elapsed.
    async fn handle_respawn(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        timer_id: TimerId,
    ) {
        if state.state != SupervisorState::Running {
            return;
        }

        match state.children.get(&timer_id) {
            None => {
                debug!(timer_id = %timer_id, "Unknown child, skipping restart");
                return;
            }
            Some(child) if child.is_alive() => {
                debug!(timer_id = %timer_id, "Child already running, skipping restart");
                return;
            }
            Some(_) => {}
        }

        match Self::spawn_child(myself, state, &timer_id).await {
            Ok(actor_ref) => {
                info!(timer_id = %timer_id, "Timer actor restarted");
                if let Some(child) = state.children.get_mut(&timer_id) {
                    child.actor_ref = actor_ref;
                }
            }
            Err(e) => {
                error!(timer_id = %timer_id, error = %e, "Timer actor restart failed");
                Self::schedule_restart(myself, state, &timer_id);
            }
        }
    }

    /// Record a failure and schedule a respawn with backoff, unless the
    /// child used up its restarts for the window.
    fn schedule_restart(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        timer_id: &TimerId,
    ) {
        let window = state.args.config.window();
        let now = Instant::now();

        state.failure_times.push(now);
        state.failure_times.retain(|t| now.duration_since(*t) < window);

        let Some(child) = state.children.get_mut(timer_id) else {
            return;
        };
        child.restart_times.retain(|t| now.duration_since(*t) < window);

        let max_restarts = state.args.config.max_restarts;
        if child.restart_times.len() >= usize::try_from(max_restarts).unwrap_or(usize::MAX) {
            warn!(
                timer_id = %timer_id,
                restart_count = child.restart_count,
                max_restarts,
                "Max restarts exceeded, stopping supervision"
            );
            state.children.remove(timer_id);
            return;
        }

        let backoff = calculate_backoff(
            child.restart_count,
            state.args.config.base_backoff_ms,
            state.args.config.max_backoff_ms,
        );
        info!(
            timer_id = %timer_id,
            restart_count = child.restart_count,
            backoff_ms = %backoff.as_millis(),
            "Scheduling timer restart"
        );

        child.restart_count = child.restart_count.saturating_add(1);
        child.restart_times.push(now);
        state.total_restarts = state.total_restarts.saturating_add(1);

        // Schedule restart after backoff
        let myself_clone = myself.clone();
        let timer_id = timer_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = myself_clone.send_message(SupervisorMessage::Respawn { timer_id });
        });
    }

    /// Build a status response.
    fn build_status(state: &SupervisorActorState) -> SupervisorStatus {
        let window = state.args.config.window();
        SupervisorStatus {
            state: state.state,
            supervised: state.children.len(),
            running: state.children.values().filter(|c| c.is_alive()).count(),
            total_restarts: state.total_restarts,
            failures_in_window: state
                .failure_times
                .iter()
                .filter(|t| t.elapsed() < window)
                .count(),
        }
    }
}

/// Calculate exponential backoff duration.
#[must_use]
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(backoff.min(max_ms))
}

/// Spawn a timer supervisor.
pub async fn spawn_supervisor(
    args: SupervisorArguments,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), TimerError> {
    Actor::spawn(None, TimerSupervisorActor, args)
        .await
        .map_err(|e| TimerError::spawn_failed(format!("Failed to spawn supervisor: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::clock::MonotonicClock;
    use timer_events::InMemoryEventStore;

    fn test_args() -> SupervisorArguments {
        let (fire_tx, _) = broadcast::channel(16);
        SupervisorArguments {
            store: InMemoryEventStore::new_arc(),
            scheduler: CallbackScheduler::new_arc(),
            clock: Arc::new(MonotonicClock::new()),
            fire_tx,
            snapshot_every: 0,
            config: SupervisorConfig::for_testing(),
        }
    }

    async fn status(sup: &ActorRef<SupervisorMessage>) -> SupervisorStatus {
        match sup
            .call(|reply| SupervisorMessage::GetStatus { reply }, Some(Duration::from_secs(1)))
            .await
            .expect("call failed")
        {
            ractor::rpc::CallResult::Success(status) => status,
            _ => std::panic!("GetStatus failed"),
        }
    }

    async fn locate(
        sup: &ActorRef<SupervisorMessage>,
        id: &str,
    ) -> Result<ActorRef<TimerMessage>, TimerError> {
        match sup
            .call(
                |reply| SupervisorMessage::Locate {
                    timer_id: TimerId::new(id),
                    reply,
                },
                Some(Duration::from_secs(1)),
            )
            .await
            .expect("call failed")
        {
            ractor::rpc::CallResult::Success(result) => result,
            _ => std::panic!("Locate failed"),
        }
    }

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(0, 100, 3200).as_millis(), 100);
        assert_eq!(calculate_backoff(1, 100, 3200).as_millis(), 200);
        assert_eq!(calculate_backoff(2, 100, 3200).as_millis(), 400);
        assert_eq!(calculate_backoff(10, 100, 3200).as_millis(), 3200);
    }

    #[test]
    fn test_backoff_never_exceeds_max() {
        for attempt in 0..64 {
            assert!(calculate_backoff(attempt, 100, 3200).as_millis() <= 3200);
        }
    }

    #[test]
    fn test_supervisor_config_default() {
        let config = SupervisorConfig::default();
        assert_eq!(config.max_restarts, 3);
        assert_eq!(config.restart_window_secs, 60);
        assert_eq!(config.base_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 3200);
    }

    #[test]
    fn test_supervisor_config_fills_missing_fields() {
        let config: SupervisorConfig = serde_json::from_str(r#"{"max_restarts": 7}"#).unwrap();
        assert_eq!(config.max_restarts, 7);
        assert_eq!(config.base_backoff_ms, 100);
    }

    #[tokio::test]
    async fn test_locate_returns_same_child() {
        let (sup, _handle) = spawn_supervisor(test_args()).await.unwrap();

        let first = locate(&sup, "a").await.unwrap();
        let second = locate(&sup, "a").await.unwrap();
        assert_eq!(first.get_id(), second.get_id());

        let other = locate(&sup, "b").await.unwrap();
        assert_ne!(first.get_id(), other.get_id());

        let s = status(&sup).await;
        assert_eq!(s.state, SupervisorState::Running);
        assert_eq!(s.supervised, 2);
        assert_eq!(s.running, 2);

        sup.stop(None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_children() {
        let (sup, handle) = spawn_supervisor(test_args()).await.unwrap();
        let child = locate(&sup, "a").await.unwrap();

        let _ = sup.send_message(SupervisorMessage::Shutdown);
        handle.await.unwrap();

        assert!(matches!(child.get_status(), ActorStatus::Stopped));
        assert!(matches!(sup.get_status(), ActorStatus::Stopped));
    }
}
