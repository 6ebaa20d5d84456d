//! Actors: the per-identity timer and its supervisor.

pub mod messages;
pub mod supervisor;
pub mod timer;

pub use messages::{FireNotice, FireTrigger, TimerMessage, TimerView};
pub use supervisor::{
    SupervisorArguments, SupervisorConfig, SupervisorMessage, SupervisorState, SupervisorStatus,
    TimerSupervisorActor, calculate_backoff, spawn_supervisor,
};
pub use timer::{DurableTimerActor, TimerArguments, spawn_timer};
