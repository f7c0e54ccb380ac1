//! In-memory collaborators for testing.
//!
//! [`InMemoryAlarmStore`] and [`MockTimer`] implement the collaborator traits
//! without SQLite or real timers, so the orchestrator can be exercised in
//! plain unit and integration tests.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, the next `n` calls, or calls for
//!   specific alarm ids
//! - **Call recording**: the timer keeps an ordered log of arm and cancel calls

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use rooster_types::{Alarm, AlarmId};

use crate::error::{BoxError, TimerError};
use crate::traits::{AlarmStore, PlatformTimer, StoreResult};

/// Shared failure switches.
#[derive(Debug, Default)]
struct FailureInjector {
    should_fail: AtomicBool,
    remaining_failures: AtomicU32,
    failing_ids: RwLock<HashSet<AlarmId>>,
}

impl FailureInjector {
    async fn check(&self, id: Option<AlarmId>) -> bool {
        if self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return true;
        }
        match id {
            Some(id) => self.failing_ids.read().await.contains(&id),
            None => false,
        }
    }
}

/// An alarm store backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct InMemoryAlarmStore {
    alarms: RwLock<BTreeMap<AlarmId, Alarm>>,
    failures: FailureInjector,
}

impl InMemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `alarms`.
    pub async fn with_alarms(alarms: impl IntoIterator<Item = Alarm>) -> Self {
        let store = Self::new();
        for alarm in alarms {
            store.insert(alarm).await;
        }
        store
    }

    /// Insert or replace an alarm, bypassing failure injection.
    pub async fn insert(&self, alarm: Alarm) {
        self.alarms.write().await.insert(alarm.id, alarm);
    }

    /// Delete an alarm, bypassing failure injection.
    pub async fn remove(&self, id: AlarmId) -> Option<Alarm> {
        self.alarms.write().await.remove(&id)
    }

    /// Read an alarm, bypassing failure injection.
    pub async fn get(&self, id: AlarmId) -> Option<Alarm> {
        self.alarms.read().await.get(&id).cloned()
    }

    /// Make every subsequent call fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.failures.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` calls, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.failures
            .remaining_failures
            .store(count, Ordering::Relaxed);
    }

    /// Fail every call that concerns `id`.
    pub async fn fail_for(&self, id: AlarmId) {
        self.failures.failing_ids.write().await.insert(id);
    }

    async fn check(&self, id: Option<AlarmId>) -> StoreResult<()> {
        if self.failures.check(id).await {
            let err: BoxError = match id {
                Some(id) => format!("mock store failure for alarm {}", id).into(),
                None => "mock store failure".into(),
            };
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl AlarmStore for InMemoryAlarmStore {
    async fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<Alarm>> {
        self.check(Some(id)).await?;
        Ok(self.get(id).await)
    }

    async fn get_all_enabled(&self) -> StoreResult<Vec<Alarm>> {
        self.check(None).await?;
        Ok(self
            .alarms
            .read()
            .await
            .values()
            .filter(|alarm| alarm.enabled)
            .cloned()
            .collect())
    }

    async fn update(&self, alarm: &Alarm) -> StoreResult<()> {
        self.check(Some(alarm.id)).await?;
        let mut alarms = self.alarms.write().await;
        match alarms.get_mut(&alarm.id) {
            Some(stored) => {
                *stored = alarm.clone();
                Ok(())
            }
            None => Err(format!("alarm {} does not exist", alarm.id).into()),
        }
    }

    async fn update_calculated_time(
        &self,
        id: AlarmId,
        calculated_time: i64,
        needs_recompute: bool,
    ) -> StoreResult<()> {
        self.check(Some(id)).await?;
        let mut alarms = self.alarms.write().await;
        match alarms.get_mut(&id) {
            Some(stored) => {
                stored.calculated_time = calculated_time;
                stored.needs_recompute = needs_recompute;
                Ok(())
            }
            None => Err(format!("alarm {} does not exist", id).into()),
        }
    }
}

/// A call made to [`MockTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCall {
    Arm(AlarmId, OffsetDateTime),
    Cancel(AlarmId),
}

/// A platform timer that records calls instead of firing.
///
/// Each call yields to the scheduler before recording, so callers that do
/// not serialize their arm and cancel pairs interleave in the log.
#[derive(Debug, Default)]
pub struct MockTimer {
    armed: RwLock<HashMap<AlarmId, OffsetDateTime>>,
    calls: RwLock<Vec<TimerCall>>,
    failures: FailureInjector,
}

impl MockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the timer for `id` would fire, if armed.
    pub async fn armed_at(&self, id: AlarmId) -> Option<OffsetDateTime> {
        self.armed.read().await.get(&id).copied()
    }

    pub async fn armed_count(&self) -> usize {
        self.armed.read().await.len()
    }

    /// Every call so far, in order.
    pub async fn calls(&self) -> Vec<TimerCall> {
        self.calls.read().await.clone()
    }

    /// Calls that concern `id`, in order.
    pub async fn calls_for(&self, id: AlarmId) -> Vec<TimerCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| match call {
                TimerCall::Arm(call_id, _) | TimerCall::Cancel(call_id) => *call_id == id,
            })
            .copied()
            .collect()
    }

    /// Make every arm fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.failures.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` arms, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.failures
            .remaining_failures
            .store(count, Ordering::Relaxed);
    }

    /// Fail every arm for `id`.
    pub async fn fail_for(&self, id: AlarmId) {
        self.failures.failing_ids.write().await.insert(id);
    }
}

#[async_trait]
impl PlatformTimer for MockTimer {
    async fn arm(&self, id: AlarmId, at: OffsetDateTime) -> Result<(), TimerError> {
        tokio::task::yield_now().await;
        if self.failures.check(Some(id)).await {
            return Err(TimerError::PermissionDenied);
        }
        self.calls.write().await.push(TimerCall::Arm(id, at));
        self.armed.write().await.insert(id, at);
        Ok(())
    }

    async fn cancel(&self, id: AlarmId) -> Result<(), TimerError> {
        tokio::task::yield_now().await;
        self.calls.write().await.push(TimerCall::Cancel(id));
        self.armed.write().await.remove(&id);
        Ok(())
    }
}
