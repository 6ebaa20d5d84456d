//! Addressing handle for timers.
//!
//! `TimerRegistry` is what callers hold. It routes every request through the
//! supervisor, so a timer is brought online (recovered and re-armed) the
//! first time it is addressed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ractor::rpc::CallResult;
use ractor::{ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use timer_events::EventStore;

use crate::actors::{
    FireNotice, SupervisorArguments, SupervisorConfig, SupervisorMessage, SupervisorStatus,
    TimerMessage, TimerView, spawn_supervisor,
};
use crate::clock::Clock;
use crate::error::TimerError;
use crate::id::TimerId;
use crate::scheduler::CallbackScheduler;

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Snapshot every N appends per timer (0 disables snapshots).
    pub snapshot_every: u64,
    /// Buffered fire notices per subscriber before it lags.
    pub fire_channel_capacity: usize,
    /// Timeout for calls into the actors, in milliseconds.
    pub call_timeout_ms: u64,
    /// Restart policy for timer actors.
    pub supervisor: SupervisorConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 100,
            fire_channel_capacity: 1024,
            call_timeout_ms: 5000,
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Call timeout as a `Duration`.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Handle for addressing timers by ID.
#[derive(Clone)]
pub struct TimerRegistry {
    supervisor: ActorRef<SupervisorMessage>,
    supervisor_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    store: Arc<dyn EventStore>,
    fire_tx: broadcast::Sender<FireNotice>,
    call_timeout: Duration,
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("supervisor", &self.supervisor.get_id())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl TimerRegistry {
    /// Start the supervisor and return a handle to it.
    ///
    /// No timer is brought online until it is addressed or
    /// [`recover_all`](Self::recover_all) is called.
    pub async fn spawn(
        store: Arc<dyn EventStore>,
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TimerError> {
        let (fire_tx, _) = broadcast::channel(config.fire_channel_capacity.max(1));

        let args = SupervisorArguments {
            store: Arc::clone(&store),
            scheduler: CallbackScheduler::new_arc(),
            clock,
            fire_tx: fire_tx.clone(),
            snapshot_every: config.snapshot_every,
            config: config.supervisor.clone(),
        };
        let (supervisor, handle) = spawn_supervisor(args).await?;

        Ok(Self {
            supervisor,
            supervisor_handle: Arc::new(Mutex::new(Some(handle))),
            store,
            fire_tx,
            call_timeout: config.call_timeout(),
        })
    }

    /// Subscribe to fire notices of every timer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FireNotice> {
        self.fire_tx.subscribe()
    }

    /// Get the running actor for a timer, recovering it if needed.
    pub async fn locate(&self, timer_id: &TimerId) -> Result<ActorRef<TimerMessage>, TimerError> {
        let timer_id = timer_id.clone();
        call(
            &self.supervisor,
            |reply| SupervisorMessage::Locate { timer_id, reply },
            self.call_timeout,
        )
        .await?
    }

    /// Durably start (or restart) a timer.
    ///
    /// Returns once the start is persisted. On error nothing was recorded
    /// and the timer keeps its previous execution time.
    pub async fn start_timer(
        &self,
        timer_id: &TimerId,
        execution_time: DateTime<Utc>,
    ) -> Result<(), TimerError> {
        let actor = self.locate(timer_id).await?;
        call(
            &actor,
            |reply| TimerMessage::Start {
                execution_time,
                reply,
            },
            self.call_timeout,
        )
        .await?
    }

    /// Current view of a timer.
    pub async fn timer_state(&self, timer_id: &TimerId) -> Result<TimerView, TimerError> {
        let actor = self.locate(timer_id).await?;
        call(&actor, |reply| TimerMessage::GetState { reply }, self.call_timeout).await
    }

    /// Bring every timer with stored history online.
    ///
    /// Each recovered timer re-arms itself. Timers that fail to recover are
    /// logged and skipped; their IDs are not in the returned list.
    pub async fn recover_all(&self) -> Result<Vec<TimerId>, TimerError> {
        let streams = self.store.streams().await?;
        let mut recovered = Vec::with_capacity(streams.len());

        for stream in &streams {
            let Some(timer_id) = TimerId::from_stream_id(stream) else {
                continue;
            };
            match self.locate(&timer_id).await {
                Ok(_) => recovered.push(timer_id),
                Err(e) => warn!(timer_id = %timer_id, error = %e, "Skipping unrecoverable timer"),
            }
        }

        info!(recovered = recovered.len(), streams = streams.len(), "Timers recovered");
        Ok(recovered)
    }

    /// Supervisor status.
    pub async fn status(&self) -> Result<SupervisorStatus, TimerError> {
        call(
            &self.supervisor,
            |reply| SupervisorMessage::GetStatus { reply },
            self.call_timeout,
        )
        .await
    }

    /// Stop every timer and the supervisor, waiting for them to finish.
    pub async fn shutdown(&self) -> Result<(), TimerError> {
        let Some(handle) = self.supervisor_handle.lock().await.take() else {
            return Ok(());
        };

        if self.supervisor.send_message(SupervisorMessage::Shutdown).is_err() {
            warn!("Supervisor already stopped");
        }
        handle
            .await
            .map_err(|e| TimerError::internal(format!("Supervisor task failed: {e}")))
    }
}

/// Call an actor and map ractor's call outcomes to `TimerError`.
async fn call<M, T>(
    actor: &ActorRef<M>,
    build: impl FnOnce(RpcReplyPort<T>) -> M,
    timeout: Duration,
) -> Result<T, TimerError>
where
    M: ractor::Message,
    T: Send + 'static,
{
    match actor.call(build, Some(timeout)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(TimerError::rpc_timeout(timeout)),
        Ok(CallResult::SenderError) | Err(_) => Err(TimerError::actor_unavailable()),
    }
}
