//! End-to-end scheduling scenarios against the in-memory collaborators.
//!
//! Run with log output:
//! `RUST_LOG=rooster_core=debug cargo test --package rooster-core --test scheduling -- --nocapture`

use std::sync::Arc;

use time::macros::datetime;
use time::{Duration, OffsetDateTime, Weekday};

use rooster_core::mock::{InMemoryAlarmStore, MockTimer, TimerCall};
use rooster_core::{
    AstronomyCache, Error, FiredAction, ManualClock, ScheduleEvent, ScheduleOrchestrator,
    ScheduleState,
};
use rooster_types::{
    Alarm, AlarmId, AlarmMode, Anchor, AstronomyData, Location, MILLIS_PER_HOUR,
    MILLIS_PER_MINUTE, SolarEvent, WeekdayMask, millis_from_datetime,
};

/// Tuesday.
const NOW: OffsetDateTime = datetime!(2024-03-05 01:00 UTC);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Setup {
    store: Arc<InMemoryAlarmStore>,
    timer: Arc<MockTimer>,
    clock: Arc<ManualClock>,
    cache: Arc<AstronomyCache>,
    orchestrator: ScheduleOrchestrator,
}

async fn setup(alarms: Vec<Alarm>) -> Setup {
    init_tracing();
    let store = Arc::new(InMemoryAlarmStore::with_alarms(alarms).await);
    let timer = Arc::new(MockTimer::new());
    let clock = Arc::new(ManualClock::new(NOW));
    let cache = Arc::new(AstronomyCache::new());
    let orchestrator = ScheduleOrchestrator::new(store.clone(), timer.clone(), cache.clone())
        .with_clock(clock.clone())
        .with_location(berlin());
    Setup {
        store,
        timer,
        clock,
        cache,
        orchestrator,
    }
}

fn berlin() -> Location {
    Location::new(52.52, 13.40)
}

fn astronomy_with_sunset(sunset: OffsetDateTime) -> AstronomyData {
    AstronomyData {
        location: berlin(),
        civil_dawn: millis_from_datetime(datetime!(2024-03-05 05:40 UTC)),
        sunrise: millis_from_datetime(datetime!(2024-03-05 06:15 UTC)),
        solar_noon: millis_from_datetime(datetime!(2024-03-05 11:55 UTC)),
        sunset: millis_from_datetime(sunset),
        civil_dusk: millis_from_datetime(sunset + Duration::minutes(35)),
        last_updated: millis_from_datetime(NOW),
        day_length: 11 * MILLIS_PER_HOUR,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_monday_only_created_on_tuesday() {
    let at = NOW + Duration::hours(1);
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .time1(millis_from_datetime(at))
        .weekdays(WeekdayMask::NONE.with(Weekday::Monday));
    let s = setup(vec![alarm.clone()]).await;

    let outcome = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert_eq!(outcome.at, datetime!(2024-03-11 02:00 UTC));
    assert_eq!(outcome.at.weekday(), Weekday::Monday);
    assert_eq!(outcome.at.time(), at.time());
}

#[tokio::test]
async fn test_before_sunset() {
    let sunset = NOW + Duration::hours(18);
    let alarm = Alarm::new(AlarmId(1), AlarmMode::Before)
        .relative2(Anchor::Solar(SolarEvent::Sunset))
        .time1(30 * MILLIS_PER_MINUTE);
    let s = setup(vec![alarm.clone()]).await;
    s.cache.replace(astronomy_with_sunset(sunset));

    let outcome = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert_eq!(outcome.at, NOW + Duration::hours(18) - Duration::minutes(30));
    assert!(!outcome.approximate);
}

#[tokio::test]
async fn test_snooze_in_every_mode() {
    let alarms = vec![
        Alarm::new(AlarmId(1), AlarmMode::At).time1(millis_from_datetime(NOW)),
        Alarm::new(AlarmId(2), AlarmMode::Between)
            .time1(millis_from_datetime(NOW))
            .time2(millis_from_datetime(NOW + Duration::hours(1))),
        Alarm::new(AlarmId(3), AlarmMode::After)
            .relative2(Anchor::Solar(SolarEvent::Sunrise))
            .time1(10 * MILLIS_PER_MINUTE),
        Alarm::new(AlarmId(4), AlarmMode::Before)
            .relative2(Anchor::Solar(SolarEvent::Sunset))
            .time1(10 * MILLIS_PER_MINUTE),
    ];
    let s = setup(alarms.clone()).await;
    s.cache.replace(astronomy_with_sunset(datetime!(2024-03-05 17:45 UTC)));

    for alarm in &alarms {
        s.orchestrator.schedule_alarm(alarm).await.unwrap();
        let before = s.timer.calls_for(alarm.id).await.len();

        let outcome = s.orchestrator.snooze(alarm.id).await.unwrap();
        assert_eq!(outcome.at, NOW + Duration::minutes(10));

        let stored = s.store.get(alarm.id).await.unwrap();
        assert_eq!(stored.calculated_time, millis_from_datetime(outcome.at));
        assert_eq!(stored.snooze_count, Alarm::DEFAULT_SNOOZE_COUNT - 1);

        let calls = s.timer.calls_for(alarm.id).await;
        assert_eq!(
            &calls[before..],
            &[
                TimerCall::Cancel(alarm.id),
                TimerCall::Arm(alarm.id, outcome.at)
            ]
        );
        assert_eq!(
            s.orchestrator.state(alarm.id),
            ScheduleState::Snoozed { until: outcome.at }
        );
    }
}

#[tokio::test]
async fn test_reschedule_all_isolates_failures() {
    let alarms: Vec<Alarm> = (1..=4)
        .map(|id| {
            Alarm::new(AlarmId(id), AlarmMode::At)
                .time1(millis_from_datetime(NOW + Duration::minutes(id * 15)))
        })
        .collect();
    let s = setup(alarms).await;
    s.timer.fail_for(AlarmId(2)).await;
    s.store.fail_for(AlarmId(3)).await;

    let report = s.orchestrator.reschedule_all().await.unwrap();
    assert_eq!(report.total(), 4);

    let mut scheduled: Vec<AlarmId> = report.scheduled.iter().map(|o| o.id).collect();
    scheduled.sort();
    assert_eq!(scheduled, vec![AlarmId(1), AlarmId(4)]);

    for (id, err) in &report.failed {
        match id.0 {
            2 => assert!(matches!(err, Error::TimerRegistrationFailure { .. })),
            3 => assert!(matches!(err, Error::PersistenceFailure { .. })),
            other => panic!("unexpected failure for alarm {}", other),
        }
    }

    assert!(s.timer.armed_at(AlarmId(1)).await.is_some());
    assert!(s.timer.armed_at(AlarmId(2)).await.is_none());
    assert!(s.timer.armed_at(AlarmId(4)).await.is_some());
    // Stored but unarmed is visible as Unscheduled.
    assert_ne!(s.store.get(AlarmId(2)).await.unwrap().calculated_time, 0);
    assert_eq!(s.orchestrator.state(AlarmId(2)), ScheduleState::Unscheduled);
}

#[tokio::test]
async fn test_approximate_alarm_recomputed_after_refresh() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::After)
        .relative2(Anchor::Solar(SolarEvent::Sunrise))
        .time1(15 * MILLIS_PER_MINUTE)
        .weekdays(WeekdayMask::EVERY_DAY);
    let s = setup(vec![alarm.clone()]).await;

    let approximate = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert!(approximate.approximate);
    assert_eq!(
        approximate.at,
        NOW + Duration::hours(1) + Duration::minutes(15)
    );
    assert!(s.store.get(AlarmId(1)).await.unwrap().needs_recompute);

    s.cache
        .replace(astronomy_with_sunset(datetime!(2024-03-05 17:45 UTC)));
    let report = s.orchestrator.recompute_approximate().await.unwrap();
    assert_eq!(report.scheduled.len(), 1);

    let exact = report.scheduled[0];
    assert!(!exact.approximate);
    assert_eq!(exact.at, datetime!(2024-03-05 06:30 UTC));
    let stored = s.store.get(AlarmId(1)).await.unwrap();
    assert!(!stored.needs_recompute);
    assert_eq!(s.timer.armed_at(AlarmId(1)).await, Some(exact.at));
}

#[tokio::test]
async fn test_stale_astronomy_is_approximate() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At).relative1(Anchor::Solar(SolarEvent::Sunrise));
    let s = setup(vec![alarm.clone()]).await;
    let mut data = astronomy_with_sunset(datetime!(2024-03-05 17:45 UTC));
    data.last_updated = millis_from_datetime(NOW - Duration::hours(7));
    s.cache.replace(data);

    // The stale snapshot still places the alarm at sunrise.
    let outcome = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert!(outcome.approximate);
    assert_eq!(outcome.at, datetime!(2024-03-05 06:15 UTC));
    assert!(s.store.get(AlarmId(1)).await.unwrap().needs_recompute);
}

#[tokio::test]
async fn test_stale_solar_alarm_rings_through_reloads() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .relative1(Anchor::Solar(SolarEvent::Sunrise))
        .weekdays(WeekdayMask::WORKDAYS);
    let s = setup(vec![alarm]).await;
    let start = datetime!(2024-03-05 05:00 UTC);
    let mut data = astronomy_with_sunset(datetime!(2024-03-05 17:45 UTC));
    data.last_updated = millis_from_datetime(start - Duration::hours(7));
    s.cache.replace(data);

    // Reload every five minutes; ring whatever the timer says is due.
    let mut rang = Vec::new();
    let mut now = start;
    while now <= datetime!(2024-03-05 08:00 UTC) {
        s.clock.set(now);
        if let Some(due) = s.timer.armed_at(AlarmId(1)).await
            && due <= now
        {
            s.orchestrator.on_fired(AlarmId(1)).await.unwrap();
            rang.push(now);
        }
        s.orchestrator.reschedule_all().await.unwrap();
        now += Duration::minutes(5);
    }

    assert_eq!(rang, vec![datetime!(2024-03-05 06:15 UTC)]);
    let stored = s.store.get(AlarmId(1)).await.unwrap();
    assert_eq!(
        stored.calculated_time,
        millis_from_datetime(datetime!(2024-03-06 06:15 UTC))
    );
    assert!(stored.needs_recompute);
}

#[tokio::test]
async fn test_reload_keeps_approximate_fallback_time() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .relative1(Anchor::Solar(SolarEvent::Sunrise))
        .weekdays(WeekdayMask::EVERY_DAY);
    let s = setup(vec![alarm]).await;

    let first = s.orchestrator.reschedule_all().await.unwrap();
    assert_eq!(first.scheduled[0].at, NOW + Duration::hours(1));

    s.clock.set(NOW + Duration::minutes(30));
    let second = s.orchestrator.reschedule_all().await.unwrap();
    assert_eq!(second.scheduled[0].at, NOW + Duration::hours(1));
    assert!(second.scheduled[0].approximate);
    assert_eq!(
        s.timer.armed_at(AlarmId(1)).await,
        Some(NOW + Duration::hours(1))
    );
}

#[tokio::test]
async fn test_time_stored_by_another_process_rings_after_daemon_start() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .time1(millis_from_datetime(datetime!(2024-01-01 07:00 UTC)));
    let s = setup(vec![alarm.clone()]).await;

    // A short-lived command schedules the alarm and exits with its timer.
    s.clock.set(datetime!(2024-03-05 06:58 UTC));
    let scheduled = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert_eq!(scheduled.at, datetime!(2024-03-05 07:00 UTC));

    // The daemon starts three minutes after the instant.
    let timer = Arc::new(MockTimer::new());
    let daemon = ScheduleOrchestrator::new(s.store.clone(), timer.clone(), s.cache.clone())
        .with_clock(Arc::new(ManualClock::new(datetime!(2024-03-05 07:03 UTC))))
        .with_location(berlin());
    let report = daemon.reschedule_all().await.unwrap();
    assert_eq!(report.scheduled[0].at, datetime!(2024-03-05 07:00 UTC));
    assert_eq!(
        timer.armed_at(AlarmId(1)).await,
        Some(datetime!(2024-03-05 07:00 UTC))
    );

    // Ringing late finalizes the one-shot rather than moving it a day.
    assert_eq!(
        daemon.on_fired(AlarmId(1)).await.unwrap(),
        FiredAction::Finalized
    );
    assert!(!s.store.get(AlarmId(1)).await.unwrap().enabled);
}

#[tokio::test]
async fn test_reload_rings_time_written_between_reloads() {
    let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .time1(millis_from_datetime(datetime!(2024-01-01 07:00 UTC)))
        .weekdays(WeekdayMask::EVERY_DAY)
        .enabled(false);
    let s = setup(vec![alarm.clone()]).await;
    let daemon = ScheduleOrchestrator::new(s.store.clone(), s.timer.clone(), s.cache.clone())
        .with_clock(s.clock.clone())
        .with_location(berlin())
        .with_missed_grace(Duration::minutes(1));

    s.clock.set(datetime!(2024-03-05 06:00 UTC));
    assert_eq!(daemon.reschedule_all().await.unwrap().total(), 0);

    // Another process enables and schedules the alarm before it is due.
    s.store.insert(alarm.enabled(true)).await;
    let command = ScheduleOrchestrator::new(
        s.store.clone(),
        Arc::new(MockTimer::new()),
        s.cache.clone(),
    )
    .with_clock(Arc::new(ManualClock::new(datetime!(2024-03-05 06:58 UTC))));
    command.schedule_alarm(&Alarm::new(AlarmId(1), AlarmMode::At)).await.unwrap();

    // The next reload comes long after 07:00, past the grace period.
    s.clock.set(datetime!(2024-03-05 08:00 UTC));
    let report = daemon.reschedule_all().await.unwrap();
    assert_eq!(report.scheduled[0].at, datetime!(2024-03-05 07:00 UTC));
    assert_eq!(
        s.timer.armed_at(AlarmId(1)).await,
        Some(datetime!(2024-03-05 07:00 UTC))
    );
}

#[tokio::test]
async fn test_missed_time_beyond_grace_is_recomputed() {
    let mut alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .time1(millis_from_datetime(datetime!(2024-01-01 07:00 UTC)))
        .weekdays(WeekdayMask::EVERY_DAY);
    alarm.calculated_time = millis_from_datetime(datetime!(2024-03-05 07:00 UTC));
    let s = setup(vec![alarm]).await;

    s.clock.set(datetime!(2024-03-05 08:00 UTC));
    let report = s.orchestrator.reschedule_all().await.unwrap();
    assert_eq!(report.scheduled[0].at, datetime!(2024-03-06 07:00 UTC));
}

#[tokio::test]
async fn test_weekly_alarm_lifecycle() {
    let alarm = Alarm::new(AlarmId(7), AlarmMode::At)
        .time1(millis_from_datetime(datetime!(2024-01-01 06:30 UTC)))
        .weekdays(WeekdayMask::WORKDAYS);
    let s = setup(vec![alarm.clone()]).await;
    let mut events = s.orchestrator.events().subscribe();

    let first = s.orchestrator.schedule_alarm(&alarm).await.unwrap();
    assert_eq!(first.at, datetime!(2024-03-05 06:30 UTC));

    s.clock.set(first.at);
    let snoozed = s.orchestrator.snooze(AlarmId(7)).await.unwrap();
    s.clock.set(snoozed.at);
    let action = s.orchestrator.on_fired(AlarmId(7)).await.unwrap();
    assert_eq!(
        action,
        FiredAction::Rescheduled(rooster_core::ScheduleOutcome {
            id: AlarmId(7),
            at: datetime!(2024-03-06 06:30 UTC),
            approximate: false,
        })
    );

    s.orchestrator.cancel_alarm(AlarmId(7)).await.unwrap();
    assert_eq!(s.orchestrator.state(AlarmId(7)), ScheduleState::Unscheduled);
    assert!(s.store.get(AlarmId(7)).await.unwrap().enabled);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event);
    }
    assert!(matches!(kinds[0], ScheduleEvent::Scheduled { .. }));
    assert!(matches!(kinds[1], ScheduleEvent::Snoozed { remaining: 2, .. }));
    assert!(matches!(kinds[2], ScheduleEvent::Scheduled { .. }));
    assert!(matches!(kinds[3], ScheduleEvent::Cancelled { .. }));
    assert_eq!(kinds.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_on_one_id() {
    let mut alarm = Alarm::new(AlarmId(1), AlarmMode::At)
        .time1(millis_from_datetime(datetime!(2024-01-01 06:30 UTC)))
        .weekdays(WeekdayMask::EVERY_DAY)
        .snooze(true, 10, 100);
    alarm.calculated_time = millis_from_datetime(datetime!(2024-03-05 06:30 UTC));
    let s = setup(vec![alarm.clone()]).await;
    s.clock.set(datetime!(2024-03-05 06:30 UTC));
    let orchestrator = Arc::new(s.orchestrator);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let o = Arc::clone(&orchestrator);
        let a = alarm.clone();
        handles.push(tokio::spawn(async move {
            o.schedule_alarm(&a).await.map(|_| ())
        }));
        let o = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            o.on_fired(AlarmId(1)).await.map(|_| ())
        }));
        let o = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            o.snooze(AlarmId(1)).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every re-arm is a cancel immediately followed by its arm.
    let calls = s.timer.calls_for(AlarmId(1)).await;
    assert!(!calls.is_empty());
    for pair in calls.chunks(2) {
        assert!(
            matches!(pair, [TimerCall::Cancel(_), TimerCall::Arm(..)]),
            "interleaved timer calls: {:?}",
            calls
        );
    }

    let Some(TimerCall::Arm(_, last_armed)) = calls.last().copied() else {
        panic!("last call was not an arm: {:?}", calls);
    };
    let stored = s.store.get(AlarmId(1)).await.unwrap();
    assert_eq!(stored.calculated_time, millis_from_datetime(last_armed));
    assert_eq!(stored.snooze_count, 90);
    assert_eq!(s.timer.armed_at(AlarmId(1)).await, Some(last_armed));
    assert_eq!(s.timer.armed_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_operations_on_many_ids() {
    let alarms: Vec<Alarm> = (1..=20)
        .map(|id| {
            Alarm::new(AlarmId(id), AlarmMode::Between)
                .time1(millis_from_datetime(datetime!(2024-01-01 06:00 UTC)))
                .time2(millis_from_datetime(datetime!(2024-01-01 07:00 UTC)))
                .weekdays(WeekdayMask::EVERY_DAY)
        })
        .collect();
    let s = setup(alarms.clone()).await;
    let orchestrator = Arc::new(s.orchestrator);

    let mut handles = Vec::new();
    for alarm in alarms {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            let first = orchestrator.schedule_alarm(&alarm).await.unwrap();
            let second = orchestrator.schedule_alarm(&alarm).await.unwrap();
            assert_eq!(first, second);
            first
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.at >= datetime!(2024-03-05 06:00 UTC));
        assert!(outcome.at <= datetime!(2024-03-05 07:00 UTC));
    }
    assert_eq!(s.timer.armed_count().await, 20);
}
