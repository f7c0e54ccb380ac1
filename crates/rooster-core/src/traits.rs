//! Collaborator traits used by the scheduling engine.
//!
//! The [`ScheduleOrchestrator`](crate::ScheduleOrchestrator) talks to
//! persistence, astronomy data and the platform alarm service only through
//! these traits, so the same engine runs against SQLite and tokio timers in
//! the service and against the in-memory doubles in [`crate::mock`] in tests.

use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use rooster_types::{Alarm, AlarmId, AstronomyData, Location, millis_from_datetime};

use crate::error::{BoxError, TimerError};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, BoxError>;

/// Persistent alarm storage.
///
/// Implementations must provide read-your-writes consistency: a value written
/// by [`update_calculated_time`](AlarmStore::update_calculated_time) is
/// visible to the next [`get_by_id`](AlarmStore::get_by_id).
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Load one alarm.
    async fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<Alarm>>;

    /// Load every enabled alarm.
    async fn get_all_enabled(&self) -> StoreResult<Vec<Alarm>>;

    /// Replace a stored alarm.
    async fn update(&self, alarm: &Alarm) -> StoreResult<()>;

    /// Write the next trigger instant (epoch milliseconds) for an alarm.
    async fn update_calculated_time(
        &self,
        id: AlarmId,
        calculated_time: i64,
        needs_recompute: bool,
    ) -> StoreResult<()>;
}

/// Source of solar event data.
///
/// Lookups never block on the network. When data is missing or stale the
/// engine calls [`request_refresh`](AstronomyProvider::request_refresh) and
/// continues with an approximate anchor.
pub trait AstronomyProvider: Send + Sync {
    /// Current snapshot for `location`, if any.
    fn get(&self, location: &Location) -> Option<Arc<AstronomyData>>;

    /// Whether `data` is older than `max_age` at `now`.
    fn is_stale(&self, data: &AstronomyData, now: OffsetDateTime, max_age: Duration) -> bool {
        let max_age_ms = i64::try_from(max_age.whole_milliseconds()).unwrap_or(i64::MAX);
        data.is_stale(millis_from_datetime(now), max_age_ms)
    }

    /// Ask for fresh data. Must return immediately.
    fn request_refresh(&self, location: &Location);
}

/// Platform alarm service.
///
/// At most one timer is armed per alarm id; arming an id that already has a
/// timer replaces it.
#[async_trait]
pub trait PlatformTimer: Send + Sync {
    /// Arm a timer that fires `id` at `at`.
    async fn arm(&self, id: AlarmId, at: OffsetDateTime) -> std::result::Result<(), TimerError>;

    /// Cancel the timer for `id`. Cancelling an unarmed id is not an error.
    async fn cancel(&self, id: AlarmId) -> std::result::Result<(), TimerError>;
}
