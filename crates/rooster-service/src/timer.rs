//! Platform timer backed by tokio tasks.
//!
//! Each armed alarm owns one task that sleeps until its instant and then
//! sends the alarm id on the fired channel. Re-arming an id aborts the old
//! task first, so at most one timer per id is ever live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use rooster_core::{AlarmId, PlatformTimer, TimerError};

struct Armed {
    generation: u64,
    at: OffsetDateTime,
    handle: AbortHandle,
}

struct Shared {
    armed: Mutex<HashMap<AlarmId, Armed>>,
    fired_tx: mpsc::UnboundedSender<AlarmId>,
    next_generation: AtomicU64,
}

impl Shared {
    fn armed(&self) -> std::sync::MutexGuard<'_, HashMap<AlarmId, Armed>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process alarm timers.
pub struct TokioTimer {
    shared: Arc<Shared>,
    limit: Option<usize>,
}

impl TokioTimer {
    /// Create a timer and the channel on which fired ids are delivered.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlarmId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timer = Self {
            shared: Arc::new(Shared {
                armed: Mutex::new(HashMap::new()),
                fired_tx,
                next_generation: AtomicU64::new(0),
            }),
            limit: None,
        };
        (timer, fired_rx)
    }

    /// Refuse to hold more than `limit` distinct timers.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// When `id` is due, if armed.
    pub fn armed_at(&self, id: AlarmId) -> Option<OffsetDateTime> {
        self.shared.armed().get(&id).map(|armed| armed.at)
    }

    pub fn armed_count(&self) -> usize {
        self.shared.armed().len()
    }

    /// Abort every pending timer.
    pub fn cancel_all(&self) {
        let mut armed = self.shared.armed();
        for (_, timer) in armed.drain() {
            timer.handle.abort();
        }
    }
}

impl std::fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimer")
            .field("armed", &self.armed_count())
            .field("limit", &self.limit)
            .finish()
    }
}

#[async_trait]
impl PlatformTimer for TokioTimer {
    async fn arm(&self, id: AlarmId, at: OffsetDateTime) -> Result<(), TimerError> {
        // Already-due instants fire immediately.
        let delay =
            std::time::Duration::try_from(at - OffsetDateTime::now_utc()).unwrap_or_default();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut armed = self.shared.armed();
        if let Some(limit) = self.limit
            && !armed.contains_key(&id)
            && armed.len() >= limit
        {
            return Err(TimerError::LimitReached(limit));
        }

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut armed = shared.armed();
                match armed.get(&id) {
                    Some(entry) if entry.generation == generation => {
                        armed.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                debug!("Timer for alarm {} fired", id);
                let _ = shared.fired_tx.send(id);
            }
        });

        let entry = Armed {
            generation,
            at,
            handle: task.abort_handle(),
        };
        if let Some(previous) = armed.insert(id, entry) {
            previous.handle.abort();
        }
        debug!("Armed alarm {} in {:?}", id, delay);
        Ok(())
    }

    async fn cancel(&self, id: AlarmId) -> Result<(), TimerError> {
        if let Some(previous) = self.shared.armed().remove(&id) {
            previous.handle.abort();
            debug!("Cancelled timer for alarm {}", id);
        }
        Ok(())
    }
}
