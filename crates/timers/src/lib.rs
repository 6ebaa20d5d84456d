//! Durable single-shot timers on ractor actors.
//!
//! Each timer identity is one [`DurableTimerActor`]. It recovers from the
//! [`EventStore`](timer_events::EventStore) before handling any command,
//! persists every start before acting on it, and fires through a keyed
//! [`CallbackScheduler`] that delivers into its own mailbox.
//!
//! Callers address timers through a [`TimerRegistry`], which owns the
//! supervisor that spawns and restarts timer actors.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use timer_actors::{MonotonicClock, RegistryConfig, TimerId, TimerRegistry};
//! use timer_events::InMemoryEventStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), timer_actors::TimerError> {
//!     let registry = TimerRegistry::spawn(
//!         InMemoryEventStore::new_arc(),
//!         RegistryConfig::default(),
//!         Arc::new(MonotonicClock::new()),
//!     )
//!     .await?;
//!
//!     let mut fires = registry.subscribe();
//!     let at = chrono::Utc::now() + chrono::TimeDelta::seconds(2);
//!     registry.start_timer(&TimerId::new("invoice-42"), at).await?;
//!
//!     if let Ok(notice) = fires.recv().await {
//!         println!("{} fired {:?} late", notice.timer_id, notice.elapsed);
//!     }
//!     registry.shutdown().await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod actors;
pub mod clock;
pub mod error;
pub mod id;
pub mod registry;
pub mod scheduler;

pub use actors::{
    DurableTimerActor, FireNotice, FireTrigger, SupervisorConfig, SupervisorState,
    SupervisorStatus, TimerArguments, TimerMessage, TimerView, spawn_timer,
};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use error::TimerError;
pub use id::{PERSISTENCE_PREFIX, TimerId};
pub use registry::{RegistryConfig, TimerRegistry};
pub use scheduler::{ArmedCallback, CallbackScheduler};
