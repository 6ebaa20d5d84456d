//! Event-sourced timer state.
//!
//! This crate owns everything a durable timer persists and how it is read
//! back:
//!
//! - **Events**: [`TimerEvent`], append-only, last write wins
//! - **State**: [`TimerState`], a pure fold over events
//! - **Snapshots**: [`Snapshot`], compacted state that shortens replay
//! - **Stores**: the [`EventStore`] trait with in-memory and file backends
//! - **Replay**: [`recover`], snapshot first then the events after it
//!
//! # Example
//!
//! ```ignore
//! use timer_events::{recover, EventStore, InMemoryEventStore, StreamId, TimerEvent};
//!
//! #[tokio::main]
//! async fn main() -> timer_events::Result<()> {
//!     let store = InMemoryEventStore::new();
//!     let stream = StreamId::new("timer-invoice-42");
//!
//!     store.append(&stream, TimerEvent::started(chrono::Utc::now())).await?;
//!
//!     let recovered = recover(&store, &stream).await?;
//!     println!("armed for {:?}", recovered.state.execution_time());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod event;
pub mod file_store;
pub mod replay;
pub mod state;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use event::{PersistedEvent, TimerEvent};
pub use file_store::FileEventStore;
pub use replay::{Recovered, recover, replay_from};
pub use state::{Snapshot, TimerPhase, TimerState};
pub use store::{EventStore, InMemoryEventStore, TracingEventStore};
pub use types::{SequenceNr, StreamId};
