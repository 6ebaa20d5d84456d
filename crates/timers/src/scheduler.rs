//! Keyed one-shot callback scheduler.
//!
//! Each key holds at most one armed callback. Arming a key again aborts the
//! previous task, so a timer never has two deliveries of its own in flight
//! from this scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ractor::{ActorRef, Message};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Handle to one arming of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedCallback {
    key: String,
    generation: u64,
}

impl ArmedCallback {
    /// Key this callback was armed under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Generation of this arming. Later armings of the same key get larger numbers.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    task: JoinHandle<()>,
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

/// Delivers a message into an actor's mailbox after a delay.
#[derive(Debug, Default)]
pub struct CallbackScheduler {
    entries: Entries,
    generations: AtomicU64,
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    // Entries stay consistent even if a holder panicked mid-update
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CallbackScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scheduler wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send `payload` to `target` once `delay` has elapsed.
    ///
    /// Replaces any callback already armed under `key`. A zero delay
    /// delivers as soon as the runtime polls the task.
    pub fn arm_once<M: Message>(
        &self,
        key: impl Into<String>,
        delay: Duration,
        target: ActorRef<M>,
        payload: M,
    ) -> ArmedCallback {
        let key = key.into();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed).saturating_add(1);

        // Hold the lock across spawn so the task cannot finish before its entry exists
        let mut entries = lock(&self.entries);

        let task = {
            let entries = Arc::clone(&self.entries);
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                {
                    let mut entries = lock(&entries);
                    if entries.get(&key).is_some_and(|e| e.generation == generation) {
                        entries.remove(&key);
                    }
                }

                if target.send_message(payload).is_err() {
                    debug!(key = %key, generation, "Callback target is gone, dropping delivery");
                } else {
                    trace!(key = %key, generation, "Callback delivered");
                }
            })
        };

        if let Some(previous) = entries.insert(key.clone(), Entry { generation, task }) {
            previous.task.abort();
            debug!(
                key = %key,
                replaced_generation = previous.generation,
                generation,
                "Replaced armed callback"
            );
        }

        trace!(key = %key, generation, delay_ms = delay.as_millis(), "Callback armed");
        ArmedCallback { key, generation }
    }

    /// Cancel `armed` if it is still the current arming of its key.
    ///
    /// Returns `false` when the callback already ran or was superseded.
    pub fn disarm(&self, armed: &ArmedCallback) -> bool {
        let mut entries = lock(&self.entries);
        let is_current = entries
            .get(&armed.key)
            .is_some_and(|e| e.generation == armed.generation);

        if !is_current {
            return false;
        }

        entries.remove(&armed.key).is_some_and(|entry| {
            entry.task.abort();
            debug!(key = %armed.key, generation = armed.generation, "Callback disarmed");
            true
        })
    }

    /// Whether a callback is currently armed under `key`.
    #[must_use]
    pub fn is_armed(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Number of keys with an armed callback.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.entries).len()
    }
}

impl Drop for CallbackScheduler {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.entries).drain() {
            entry.task.abort();
        }
    }
}
