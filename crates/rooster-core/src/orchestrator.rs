//! Alarm scheduling orchestration.
//!
//! [`ScheduleOrchestrator`] ties the calculator to persistence, the platform
//! timer and astronomy data. Every operation on one alarm runs under that
//! alarm's lock, so a fire and a user edit for the same id never interleave,
//! while operations on different ids proceed in parallel.
//!
//! Scheduling is a two-step transaction: the trigger instant is persisted
//! first and the timer armed second. If arming fails the stored time stays in
//! place, [`state`](ScheduleOrchestrator::state) reports
//! [`ScheduleState::Unscheduled`], and the next
//! [`reschedule_all`](ScheduleOrchestrator::reschedule_all) re-arms it.
//!
//! The persisted time is the source of truth across processes. A bulk
//! reschedule re-arms every stored time that has not passed since the
//! previous one (or within the missed-fire grace at startup) instead of
//! recomputing it, so a time written by another process, a snooze, or an
//! approximate time all survive periodic reloads. Only elapsed or missing
//! times are recomputed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use rooster_core::mock::{InMemoryAlarmStore, MockTimer};
//! use rooster_core::{AstronomyCache, ScheduleOrchestrator, ScheduleState};
//! use rooster_types::{Alarm, AlarmId, AlarmMode, MILLIS_PER_HOUR};
//!
//! #[tokio::main]
//! async fn main() {
//!     let alarm = Alarm::new(AlarmId(1), AlarmMode::At).time1(7 * MILLIS_PER_HOUR);
//!     let store = Arc::new(InMemoryAlarmStore::with_alarms([alarm.clone()]).await);
//!     let timer = Arc::new(MockTimer::new());
//!     let orchestrator =
//!         ScheduleOrchestrator::new(store, timer, Arc::new(AstronomyCache::new()));
//!
//!     let outcome = orchestrator.schedule_alarm(&alarm).await.unwrap();
//!     assert!(matches!(
//!         orchestrator.state(AlarmId(1)),
//!         ScheduleState::Scheduled { at } if at == outcome.at
//!     ));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::join_all;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use rooster_types::{
    Alarm, AlarmId, AstronomyData, Location, datetime_from_millis, millis_from_datetime,
};

use crate::calculator::{AlarmTimeCalculator, CalculatorConfig, Candidate, UnavailableCause};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, ScheduleEvent};
use crate::selector::select_next_after;
use crate::traits::{AlarmStore, AstronomyProvider, PlatformTimer};
use crate::validation::validate_alarm;

/// Scheduling state of one alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleState {
    /// No timer is armed. The store may still hold a calculated time.
    #[default]
    Unscheduled,
    /// A timer is armed for the next regular occurrence.
    Scheduled { at: OffsetDateTime },
    /// A timer is armed for a snooze.
    Snoozed { until: OffsetDateTime },
}

/// Result of a successful schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub id: AlarmId,
    pub at: OffsetDateTime,
    /// The instant came from a fallback anchor and will be recomputed.
    pub approximate: bool,
}

/// What happened when a timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiredAction {
    /// A recurring alarm was scheduled for its next occurrence.
    Rescheduled(ScheduleOutcome),
    /// A one-shot alarm was disabled.
    Finalized,
    /// The alarm is unknown or disabled; nothing was done.
    Ignored,
}

/// Per-alarm results of a bulk reschedule.
#[derive(Debug, Default)]
pub struct RescheduleReport {
    pub scheduled: Vec<ScheduleOutcome>,
    pub failed: Vec<(AlarmId, Error)>,
}

impl RescheduleReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.scheduled.len() + self.failed.len()
    }
}

/// Coordinates calculation, persistence and timers for all alarms.
pub struct ScheduleOrchestrator {
    store: Arc<dyn AlarmStore>,
    timer: Arc<dyn PlatformTimer>,
    astronomy: Arc<dyn AstronomyProvider>,
    clock: Arc<dyn Clock>,
    calculator: AlarmTimeCalculator,
    location: Location,
    events: EventDispatcher,
    missed_grace: Duration,
    last_reconciled: Mutex<Option<OffsetDateTime>>,
    locks: Mutex<HashMap<AlarmId, Arc<tokio::sync::Mutex<()>>>>,
    states: RwLock<HashMap<AlarmId, ScheduleState>>,
}

/// How far in the past a stored time may be at the first bulk reschedule
/// and still be armed (and so ring late).
pub const DEFAULT_MISSED_GRACE: Duration = Duration::minutes(15);

/// A timer firing this much before the stored time is a leftover from an
/// older schedule.
const EARLY_FIRE_TOLERANCE: Duration = Duration::seconds(5);

impl std::fmt::Debug for ScheduleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleOrchestrator")
            .field("calculator", &self.calculator)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl ScheduleOrchestrator {
    /// Create an orchestrator using the system clock and default calculator
    /// settings.
    pub fn new(
        store: Arc<dyn AlarmStore>,
        timer: Arc<dyn PlatformTimer>,
        astronomy: Arc<dyn AstronomyProvider>,
    ) -> Self {
        Self {
            store,
            timer,
            astronomy,
            clock: Arc::new(SystemClock),
            calculator: AlarmTimeCalculator::default(),
            location: Location::default(),
            events: EventDispatcher::default(),
            missed_grace: DEFAULT_MISSED_GRACE,
            last_reconciled: Mutex::new(None),
            locks: Mutex::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_calculator(mut self, config: CalculatorConfig) -> Self {
        self.calculator = AlarmTimeCalculator::new(config);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn with_missed_grace(mut self, grace: Duration) -> Self {
        self.missed_grace = grace;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Current scheduling state of `id`.
    pub fn state(&self, id: AlarmId) -> ScheduleState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    /// Compute, persist and arm the next occurrence of `alarm`.
    ///
    /// The definition is re-read from the store under the alarm's lock;
    /// `alarm` only names the id. A one-shot finalized since the caller
    /// loaded it is therefore rejected as disabled.
    pub async fn schedule_alarm(&self, alarm: &Alarm) -> Result<ScheduleOutcome> {
        self.reschedule_one(alarm.id, None).await
    }

    /// Persist and arm an explicit instant, bypassing the calculator.
    ///
    /// This is the snooze path. `at` must be after the current time.
    pub async fn schedule_alarm_with_time(
        &self,
        alarm: &Alarm,
        at: OffsetDateTime,
    ) -> Result<ScheduleOutcome> {
        let lock = self.lock_for(alarm.id);
        let _guard = lock.lock().await;
        let result = self.schedule_with_time_locked(alarm, at).await;
        self.report_failure(alarm.id, &result);
        result
    }

    /// Schedule every enabled alarm. One failure never stops the rest.
    ///
    /// A stored time later than the previous reconciliation (or than
    /// `now - missed_grace`, whichever is earlier) is re-armed as is. Any
    /// other alarm is recomputed.
    pub async fn reschedule_all(&self) -> Result<RescheduleReport> {
        let alarms = self
            .store
            .get_all_enabled()
            .await
            .map_err(|source| Error::LoadFailed { source })?;
        info!("Rescheduling {} enabled alarms", alarms.len());

        let since = self.reconcile_since(self.clock.now());
        let ids: Vec<AlarmId> = alarms.iter().map(|alarm| alarm.id).collect();
        let report = self.schedule_each(&ids, Some(since)).await;
        self.prune(&ids);
        Ok(report)
    }

    /// Reschedule alarms whose stored time came from an approximate anchor.
    ///
    /// Called after each successful astronomy refresh.
    pub async fn recompute_approximate(&self) -> Result<RescheduleReport> {
        let ids: Vec<AlarmId> = self
            .store
            .get_all_enabled()
            .await
            .map_err(|source| Error::LoadFailed { source })?
            .into_iter()
            .filter(|alarm| alarm.needs_recompute)
            .map(|alarm| alarm.id)
            .collect();
        if !ids.is_empty() {
            info!("Recomputing {} approximate alarms", ids.len());
        }
        Ok(self.schedule_each(&ids, None).await)
    }

    /// Cancel the timer for `id`. The stored alarm is left untouched.
    pub async fn cancel_alarm(&self, id: AlarmId) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.timer
            .cancel(id)
            .await
            .map_err(|source| Error::TimerRegistrationFailure { id, source })?;
        self.set_state(id, ScheduleState::Unscheduled);
        self.events.send(ScheduleEvent::Cancelled { id });
        info!("Cancelled alarm {}", id);
        Ok(())
    }

    /// Handle a timer firing for `id`.
    ///
    /// Recurring alarms are scheduled for their next occurrence. One-shot
    /// alarms are disabled. A snooze expiring on a one-shot alarm that was
    /// already disabled still finalizes it. A fire well before the stored
    /// time comes from a superseded timer and is ignored.
    pub async fn on_fired(&self, id: AlarmId) -> Result<FiredAction> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let was_snoozed = matches!(self.state(id), ScheduleState::Snoozed { .. });

        let Some(mut alarm) = self
            .store
            .get_by_id(id)
            .await
            .map_err(|source| Error::PersistenceFailure { id, source })?
        else {
            warn!("Timer fired for unknown alarm {}", id);
            self.set_state(id, ScheduleState::Unscheduled);
            return Ok(FiredAction::Ignored);
        };

        if !alarm.enabled && !was_snoozed {
            debug!("Timer fired for disabled alarm {}", id);
            self.set_state(id, ScheduleState::Unscheduled);
            return Ok(FiredAction::Ignored);
        }

        let now = self.clock.now();
        if let Ok(stored) = datetime_from_millis(alarm.calculated_time)
            && alarm.calculated_time != 0
            && stored > now.saturating_add(EARLY_FIRE_TOLERANCE)
        {
            debug!(
                "Ignoring early timer for alarm {} (due at {})",
                id, stored
            );
            return Ok(FiredAction::Ignored);
        }
        self.set_state(id, ScheduleState::Unscheduled);

        if alarm.is_one_shot() {
            if alarm.enabled {
                alarm.enabled = false;
                self.store
                    .update(&alarm)
                    .await
                    .map_err(|source| Error::PersistenceFailure { id, source })?;
            }
            self.events.send(ScheduleEvent::Finalized { id });
            info!("One-shot alarm {} finalized", id);
            return Ok(FiredAction::Finalized);
        }

        // A timer may fire a little early; never hand back the same instant.
        let now = match datetime_from_millis(alarm.calculated_time) {
            Ok(stored) => now.max(stored),
            Err(_) => now,
        };
        let result = self.schedule_locked(&alarm, now).await;
        self.report_failure(id, &result);
        result.map(FiredAction::Rescheduled)
    }

    /// Snooze `id` for its configured duration, spending one unit of budget.
    pub async fn snooze(&self, id: AlarmId) -> Result<ScheduleOutcome> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut alarm = self
            .store
            .get_by_id(id)
            .await
            .map_err(|source| Error::PersistenceFailure { id, source })?
            .ok_or(Error::AlarmNotFound(id))?;

        if !alarm.snooze_enabled || alarm.snooze_count == 0 {
            return Err(Error::SnoozeUnavailable {
                id,
                remaining: alarm.snooze_count,
            });
        }

        alarm.snooze_count -= 1;
        self.store
            .update(&alarm)
            .await
            .map_err(|source| Error::PersistenceFailure { id, source })?;

        let at = self
            .clock
            .now()
            .saturating_add(Duration::minutes(i64::from(alarm.snooze_duration_minutes)));
        let result = self.schedule_with_time_locked(&alarm, at).await;
        self.report_failure(id, &result);
        result
    }

    /// The enabled alarm that rings next, from persisted times only.
    pub async fn next_alarm(&self) -> Result<Option<Alarm>> {
        let alarms = self
            .store
            .get_all_enabled()
            .await
            .map_err(|source| Error::LoadFailed { source })?;
        let now_ms = millis_from_datetime(self.clock.now());
        let next = select_next_after(&alarms, now_ms);
        Ok(next.and_then(|id| alarms.into_iter().find(|alarm| alarm.id == id)))
    }

    async fn schedule_each(
        &self,
        ids: &[AlarmId],
        since: Option<OffsetDateTime>,
    ) -> RescheduleReport {
        let results = join_all(ids.iter().map(|&id| self.reschedule_one(id, since))).await;

        let mut report = RescheduleReport::default();
        for (&id, result) in ids.iter().zip(results) {
            match result {
                Ok(outcome) => report.scheduled.push(outcome),
                Err(e) => report.failed.push((id, e)),
            }
        }
        if !report.is_complete() {
            warn!(
                "{} of {} alarms failed to schedule",
                report.failed.len(),
                report.total()
            );
        }
        report
    }

    /// Re-read `id` under its lock, then either keep its stored time (when
    /// `since` is given and the time is later) or recompute it.
    async fn reschedule_one(
        &self,
        id: AlarmId,
        since: Option<OffsetDateTime>,
    ) -> Result<ScheduleOutcome> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let result = self.reschedule_locked(id, since).await;
        self.report_failure(id, &result);
        result
    }

    async fn reschedule_locked(
        &self,
        id: AlarmId,
        since: Option<OffsetDateTime>,
    ) -> Result<ScheduleOutcome> {
        let alarm = self
            .store
            .get_by_id(id)
            .await
            .map_err(|source| Error::PersistenceFailure { id, source })?
            .ok_or(Error::AlarmNotFound(id))?;

        if let Some(since) = since
            && let Some(at) = pending_instant(&alarm, since)
        {
            return self.rearm_locked(&alarm, at).await;
        }
        self.schedule_locked(&alarm, self.clock.now()).await
    }

    /// Arm the stored instant `at` without recomputing or persisting.
    async fn rearm_locked(&self, alarm: &Alarm, at: OffsetDateTime) -> Result<ScheduleOutcome> {
        let outcome = ScheduleOutcome {
            id: alarm.id,
            at,
            approximate: alarm.needs_recompute,
        };
        let state = match self.state(alarm.id) {
            // Already armed for this instant.
            ScheduleState::Scheduled { at: armed } if armed == at => return Ok(outcome),
            ScheduleState::Snoozed { until } if until == at => return Ok(outcome),
            _ => ScheduleState::Scheduled { at },
        };

        self.arm(alarm.id, at).await?;
        self.set_state(alarm.id, state);
        self.events.send(ScheduleEvent::Scheduled {
            id: outcome.id,
            at: outcome.at,
            approximate: outcome.approximate,
        });
        info!("Re-armed alarm {} at stored time {}", alarm.id, at);
        Ok(outcome)
    }

    async fn schedule_locked(&self, alarm: &Alarm, now: OffsetDateTime) -> Result<ScheduleOutcome> {
        if !alarm.enabled {
            return Err(Error::AlarmDisabled(alarm.id));
        }
        validate_alarm(alarm)?;

        let astronomy = if alarm.uses_solar_events() {
            self.astronomy_snapshot(now)
        } else {
            None
        };

        let candidate = self
            .calculator
            .next_trigger(alarm, now, astronomy.as_deref());
        self.note_approximation(alarm.id, &candidate);

        self.store
            .update_calculated_time(alarm.id, candidate.millis(), candidate.is_approximate())
            .await
            .map_err(|source| Error::PersistenceFailure {
                id: alarm.id,
                source,
            })?;

        self.arm(alarm.id, candidate.instant).await?;
        self.set_state(
            alarm.id,
            ScheduleState::Scheduled {
                at: candidate.instant,
            },
        );

        let outcome = ScheduleOutcome {
            id: alarm.id,
            at: candidate.instant,
            approximate: candidate.is_approximate(),
        };
        self.events.send(ScheduleEvent::Scheduled {
            id: outcome.id,
            at: outcome.at,
            approximate: outcome.approximate,
        });
        info!("Scheduled alarm {} at {}", alarm.id, candidate.instant);
        Ok(outcome)
    }

    async fn schedule_with_time_locked(
        &self,
        alarm: &Alarm,
        at: OffsetDateTime,
    ) -> Result<ScheduleOutcome> {
        if at <= self.clock.now() {
            return Err(Error::InstantInPast { id: alarm.id, at });
        }

        self.store
            .update_calculated_time(alarm.id, millis_from_datetime(at), false)
            .await
            .map_err(|source| Error::PersistenceFailure {
                id: alarm.id,
                source,
            })?;

        self.arm(alarm.id, at).await?;
        self.set_state(alarm.id, ScheduleState::Snoozed { until: at });
        self.events.send(ScheduleEvent::Snoozed {
            id: alarm.id,
            at,
            remaining: alarm.snooze_count,
        });
        info!("Alarm {} snoozed until {}", alarm.id, at);
        Ok(ScheduleOutcome {
            id: alarm.id,
            at,
            approximate: false,
        })
    }

    /// Replace any armed timer for `id` with one at `at`.
    async fn arm(&self, id: AlarmId, at: OffsetDateTime) -> Result<()> {
        if let Err(e) = self.timer.cancel(id).await {
            debug!("Cancelling previous timer for alarm {} failed: {}", id, e);
        }
        if let Err(source) = self.timer.arm(id, at).await {
            self.set_state(id, ScheduleState::Unscheduled);
            return Err(Error::TimerRegistrationFailure { id, source });
        }
        Ok(())
    }

    fn astronomy_snapshot(&self, now: OffsetDateTime) -> Option<Arc<AstronomyData>> {
        let snapshot = self.astronomy.get(&self.location);
        let needs_refresh = match &snapshot {
            Some(data) => {
                self.astronomy
                    .is_stale(data, now, self.calculator.config().max_astronomy_age)
            }
            None => true,
        };
        if needs_refresh {
            debug!("Astronomy data missing or stale, requesting refresh");
            self.astronomy.request_refresh(&self.location);
        }
        snapshot
    }

    fn note_approximation(&self, id: AlarmId, candidate: &Candidate) {
        let Some(approximation) = candidate.approximation else {
            return;
        };
        warn!(
            "Alarm {} scheduled approximately at {} ({})",
            id, candidate.instant, approximation
        );
        if approximation.cause == UnavailableCause::OutOfRange {
            return;
        }
        if approximation.anchor.is_solar() {
            self.astronomy.request_refresh(&self.location);
        }
    }

    fn report_failure<T>(&self, id: AlarmId, result: &Result<T>) {
        if let Err(e) = result {
            warn!("Scheduling alarm {} failed: {}", id, e);
            self.events.send(ScheduleEvent::Failed {
                id,
                error: e.to_string(),
            });
        }
    }

    /// Lower bound for stored times kept by a bulk reschedule.
    fn reconcile_since(&self, now: OffsetDateTime) -> OffsetDateTime {
        let floor = now.saturating_sub(self.missed_grace);
        let mut last = self
            .last_reconciled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let since = last.map_or(floor, |last| last.min(floor));
        *last = Some(now);
        since
    }

    /// Drop bookkeeping for alarms that are gone or disabled. Snoozes and
    /// locks someone is holding or waiting on are kept.
    fn prune(&self, live: &[AlarmId]) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, state| {
                live.contains(id) || matches!(state, ScheduleState::Snoozed { .. })
            });
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, lock| live.contains(id) || Arc::strong_count(lock) > 1);
    }

    fn lock_for(&self, id: AlarmId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    fn set_state(&self, id: AlarmId, state: ScheduleState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, state);
    }
}

/// The stored instant of an enabled alarm, if later than `since`.
fn pending_instant(alarm: &Alarm, since: OffsetDateTime) -> Option<OffsetDateTime> {
    if !alarm.enabled || alarm.calculated_time == 0 {
        return None;
    }
    datetime_from_millis(alarm.calculated_time)
        .ok()
        .filter(|stored| *stored > since)
}
