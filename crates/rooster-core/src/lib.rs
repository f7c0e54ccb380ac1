//! Alarm time calculation and scheduling engine for the Rooster alarm clock.
//!
//! This crate decides when each alarm should next ring and keeps the
//! persisted trigger time and the platform timer in step with that decision.
//!
//! # Features
//!
//! - **Calculation**: fixed clock times, solar anchors (sunrise, civil dusk,
//!   ...), offsets before/after an anchor, and random windows
//! - **Recurrence**: weekday masks with one-shot alarms
//! - **Orchestration**: persist-then-arm scheduling with per-alarm locking,
//!   snooze with a budget, fire handling and bulk rescheduling
//! - **Degradation**: missing or stale astronomy data yields an approximate
//!   time that is recomputed once fresh data arrives
//! - **Local time**: weekdays and clock times follow the system time zone,
//!   daylight saving included
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use rooster_core::mock::{InMemoryAlarmStore, MockTimer};
//! use rooster_core::{AstronomyCache, ScheduleOrchestrator};
//! use rooster_types::{Alarm, AlarmId, AlarmMode, WeekdayMask, MILLIS_PER_HOUR};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
//!         .time1(6 * MILLIS_PER_HOUR + 30 * 60_000)
//!         .weekdays(WeekdayMask::WORKDAYS);
//!
//!     let store = Arc::new(InMemoryAlarmStore::with_alarms([alarm]).await);
//!     let orchestrator = ScheduleOrchestrator::new(
//!         store,
//!         Arc::new(MockTimer::new()),
//!         Arc::new(AstronomyCache::new()),
//!     );
//!
//!     let report = orchestrator.reschedule_all().await?;
//!     println!("{} alarms scheduled", report.scheduled.len());
//!     Ok(())
//! }
//! ```

pub mod astronomy;
pub mod calculator;
pub mod clock;
pub mod error;
pub mod events;
pub mod mock;
pub mod orchestrator;
pub mod recurrence;
pub mod selector;
pub mod traits;
pub mod validation;
pub mod zone;

pub use astronomy::AstronomyCache;
pub use calculator::{
    AlarmTimeCalculator, AnchorUnavailable, BetweenSampling, CalculatorConfig, Candidate,
    UnavailableCause,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, Error, Result, TimerError};
pub use events::{EventDispatcher, EventReceiver, EventSender, ScheduleEvent};
pub use orchestrator::{
    DEFAULT_MISSED_GRACE, FiredAction, RescheduleReport, ScheduleOrchestrator, ScheduleOutcome,
    ScheduleState,
};
pub use recurrence::RecurrenceResolver;
pub use selector::{select_next, select_next_after};
pub use traits::{AlarmStore, AstronomyProvider, PlatformTimer, StoreResult};
pub use validation::{AstronomyIssue, ValidationResult, validate_alarm, validate_astronomy};
pub use zone::LocalZone;

// Re-export the shared vocabulary from rooster-types
pub use rooster_types::{
    Alarm, AlarmId, AlarmMode, Anchor, AstronomyData, Location, SolarEvent, WeekdayMask,
};
