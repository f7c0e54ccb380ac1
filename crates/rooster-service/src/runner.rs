//! Daemon event loop.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rooster_core::{
    AlarmId, AstronomyProvider, FiredAction, Location, RescheduleReport, ScheduleEvent,
};

use crate::astronomy::{self, AstronomyDataResult};
use crate::error::Result;
use crate::state::{AppState, Channels};

/// Drives the engine: fired timers, astronomy refreshes and periodic
/// reloads.
pub struct Runner {
    state: Arc<AppState>,
    channels: Channels,
    refresh_task: Option<JoinHandle<()>>,
}

impl Runner {
    pub fn new(state: Arc<AppState>, channels: Channels) -> Self {
        Self {
            state,
            channels,
            refresh_task: None,
        }
    }

    /// Schedule every enabled alarm, then serve until `shutdown` is
    /// cancelled. All timers are cancelled on the way out.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let report = self.state.orchestrator.reschedule_all().await?;
        log_report("Startup", &report);

        let location = self.state.orchestrator.location();
        if self.needs_refresh(&location) {
            self.spawn_refresh(location);
        }

        let refresh_every = self.state.config.astronomy.refresh_interval();
        let reload_every = self.state.config.scheduler.reload_interval();
        let mut refresh_timer = interval_at(Instant::now() + refresh_every, refresh_every);
        let mut reload_timer = interval_at(Instant::now() + reload_every, reload_every);
        let mut events = self.state.orchestrator.events().subscribe();

        info!(
            "Scheduler running (refresh every {:?}, reload every {:?})",
            refresh_every, reload_every
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down scheduler");
                    break;
                }
                Some(id) = self.channels.fired.recv() => self.handle_fired(id).await,
                Some(location) = self.channels.refresh.recv() => self.spawn_refresh(location),
                _ = refresh_timer.tick() => {
                    let location = self.state.orchestrator.location();
                    self.spawn_refresh(location);
                }
                _ = reload_timer.tick() => self.reload().await,
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} schedule events", missed),
                    Err(RecvError::Closed) => {}
                },
            }
        }

        if let Some(task) = self.refresh_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.state.timer.cancel_all();
        Ok(())
    }

    fn needs_refresh(&self, location: &Location) -> bool {
        let max_age = self.state.config.scheduler.calculator().max_astronomy_age;
        match self.state.astronomy.get(location) {
            Some(data) => self
                .state
                .astronomy
                .is_stale(&data, OffsetDateTime::now_utc(), max_age),
            None => true,
        }
    }

    async fn handle_fired(&self, id: AlarmId) {
        match self.state.orchestrator.on_fired(id).await {
            Ok(FiredAction::Rescheduled(outcome)) => {
                info!("Alarm {} is ringing; next occurrence at {}", id, outcome.at);
            }
            Ok(FiredAction::Finalized) => info!("Alarm {} is ringing (one-shot)", id),
            Ok(FiredAction::Ignored) => debug!("Ignored timer for alarm {}", id),
            Err(e) => error!("Failed to handle fired alarm {}: {}", id, e),
        }
    }

    /// Start a background refresh unless one is already running.
    fn spawn_refresh(&mut self, location: Location) {
        if self
            .refresh_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            debug!("Astronomy refresh already in progress");
            return;
        }

        let state = Arc::clone(&self.state);
        self.refresh_task = Some(tokio::spawn(async move {
            match astronomy::refresh(&state, location).await {
                AstronomyDataResult::Fresh(_) => {
                    match state.orchestrator.recompute_approximate().await {
                        Ok(report) => log_report("Recompute", &report),
                        Err(e) => error!("Failed to recompute approximate alarms: {}", e),
                    }
                }
                AstronomyDataResult::Cached { stale, age, .. } => {
                    warn!(
                        "Using cached astronomy data (age {}, stale: {})",
                        age, stale
                    );
                }
                AstronomyDataResult::Failure(e) => {
                    error!("No astronomy data available: {}", e);
                }
            }
        }));
    }

    async fn reload(&self) {
        match self.state.orchestrator.reschedule_all().await {
            Ok(report) => log_report("Reload", &report),
            Err(e) => error!("Reload failed: {}", e),
        }
    }
}

fn log_report(context: &str, report: &RescheduleReport) {
    if report.is_complete() {
        info!("{}: scheduled {} alarms", context, report.scheduled.len());
    } else {
        warn!(
            "{}: scheduled {} of {} alarms",
            context,
            report.scheduled.len(),
            report.total()
        );
        for (id, e) in &report.failed {
            warn!("  alarm {}: {}", id, e);
        }
    }
}

fn log_event(event: &ScheduleEvent) {
    match event {
        ScheduleEvent::Scheduled {
            id,
            at,
            approximate: true,
        } => debug!("Alarm {} scheduled for {} (approximate)", id, at),
        ScheduleEvent::Scheduled { id, at, .. } => debug!("Alarm {} scheduled for {}", id, at),
        ScheduleEvent::Snoozed { id, at, remaining } => {
            debug!("Alarm {} snoozed until {} ({} left)", id, at, remaining)
        }
        ScheduleEvent::Failed { id, error } => debug!("Alarm {} failed: {}", id, error),
        other => debug!("Schedule event for alarm {}: {:?}", other.id(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rooster_core::{Alarm, AlarmMode, PlatformTimer, ScheduleState};
    use rooster_store::Store;
    use rooster_types::{MILLIS_PER_HOUR, WeekdayMask};

    #[tokio::test]
    async fn test_run_schedules_and_shuts_down() {
        let store = Store::open_in_memory().unwrap();
        let alarm = store
            .insert_alarm(
                &Alarm::new(AlarmId(0), AlarmMode::At)
                    .time1(7 * MILLIS_PER_HOUR)
                    .weekdays(WeekdayMask::EVERY_DAY),
            )
            .unwrap();
        let (state, channels) = AppState::new(store, Config::default()).unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Runner::new(Arc::clone(&state), channels).run(shutdown.clone()));

        // Startup scheduling persists a time before the loop idles.
        let mut scheduled = false;
        for _ in 0..100 {
            if matches!(
                state.orchestrator.state(alarm.id),
                ScheduleState::Scheduled { .. }
            ) {
                scheduled = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(scheduled);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(state.timer.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_fired_recurring_alarm_is_rescheduled() {
        let store = Store::open_in_memory().unwrap();
        let alarm = store
            .insert_alarm(
                &Alarm::new(AlarmId(0), AlarmMode::At)
                    .time1(7 * MILLIS_PER_HOUR)
                    .weekdays(WeekdayMask::EVERY_DAY),
            )
            .unwrap();
        let (state, channels) = AppState::new(store, Config::default()).unwrap();
        let runner = Runner::new(Arc::clone(&state), channels);

        runner.handle_fired(alarm.id).await;
        let at = state.timer.armed_at(alarm.id).unwrap();
        assert!(at > OffsetDateTime::now_utc());
        state.timer.cancel(alarm.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_fired_one_shot_is_disabled() {
        let store = Store::open_in_memory().unwrap();
        let alarm = store
            .insert_alarm(&Alarm::new(AlarmId(0), AlarmMode::At).time1(7 * MILLIS_PER_HOUR))
            .unwrap();
        let (state, channels) = AppState::new(store, Config::default()).unwrap();
        let runner = Runner::new(Arc::clone(&state), channels);

        runner.handle_fired(alarm.id).await;
        let stored = state.store.lock().await.get_alarm(alarm.id).unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(state.timer.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_needs_refresh_without_data() {
        let (state, channels) =
            AppState::new(Store::open_in_memory().unwrap(), Config::default()).unwrap();
        let runner = Runner::new(state, channels);
        assert!(runner.needs_refresh(&Location::new(52.52, 13.405)));
    }
}
