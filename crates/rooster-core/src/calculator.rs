//! Alarm time calculation.
//!
//! [`AlarmTimeCalculator::compute`] turns an alarm definition, the current
//! instant and the latest astronomy snapshot into a raw candidate instant.
//! It is pure and total: stale astronomy data still supplies event times but
//! flags the result approximate, while missing or out-of-range anchors fall
//! back to `now + fallback_offset`. Nothing here fails.
//!
//! Clock times and solar events are re-anchored by local wall-clock time in
//! the configured [`LocalZone`], so an alarm keeps its clock time across
//! daylight saving changes.
//!
//! # Modes
//!
//! | Mode | Result |
//! |------|--------|
//! | `At` | anchor `relative1` (or clock value `time1`) today |
//! | `Between` | uniform sample between the `relative1`/`time1` and `relative2`/`time2` bounds |
//! | `After` | anchor `relative2` plus offset `time1` |
//! | `Before` | anchor `relative2` minus offset `time1` |
//!
//! # Example
//!
//! ```
//! use rooster_core::{AlarmTimeCalculator, CalculatorConfig};
//! use rooster_types::{Alarm, AlarmId, AlarmMode, millis_from_datetime};
//! use time::macros::datetime;
//!
//! let calculator = AlarmTimeCalculator::new(CalculatorConfig::default());
//! let now = datetime!(2024-03-05 06:00 UTC);
//! let alarm = Alarm::new(AlarmId(1), AlarmMode::At)
//!     .time1(millis_from_datetime(datetime!(2020-01-01 07:30 UTC)));
//!
//! let candidate = calculator.compute(&alarm, now, None);
//! assert_eq!(candidate.instant, datetime!(2024-03-05 07:30 UTC));
//! assert!(!candidate.is_approximate());
//! ```

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use rooster_types::{
    Alarm, AlarmId, AlarmMode, Anchor, AstronomyData, datetime_from_millis, millis_from_datetime,
};

use crate::recurrence::RecurrenceResolver;
use crate::zone::LocalZone;

/// How `Between` alarms pick their instant inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetweenSampling {
    /// Seeded from the alarm id and the local date, so recomputing on the
    /// same day yields the same instant.
    #[default]
    Seeded,
    /// Fresh thread-local randomness on every computation.
    Random,
}

/// Calculator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatorConfig {
    /// Zone that decides what "today", "weekday" and clock times mean.
    pub zone: LocalZone,
    /// Astronomy data at least this old is treated as unavailable.
    pub max_astronomy_age: Duration,
    /// Distance from `now` used when an anchor is unavailable.
    pub fallback_offset: Duration,
    pub sampling: BetweenSampling,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            zone: LocalZone::UTC,
            max_astronomy_age: Duration::hours(6),
            fallback_offset: Duration::hours(1),
            sampling: BetweenSampling::Seeded,
        }
    }
}

impl CalculatorConfig {
    #[must_use]
    pub fn zone(mut self, zone: LocalZone) -> Self {
        self.zone = zone;
        self
    }

    /// Shorthand for a fixed-offset zone.
    #[must_use]
    pub fn utc_offset(self, offset: UtcOffset) -> Self {
        self.zone(LocalZone::Fixed(offset))
    }

    #[must_use]
    pub fn max_astronomy_age(mut self, age: Duration) -> Self {
        self.max_astronomy_age = age;
        self
    }

    #[must_use]
    pub fn fallback_offset(mut self, offset: Duration) -> Self {
        self.fallback_offset = offset;
        self
    }

    #[must_use]
    pub fn sampling(mut self, sampling: BetweenSampling) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Why an anchor could not be resolved exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum UnavailableCause {
    /// No astronomy data has been loaded yet.
    NoData,
    /// Astronomy data is older than the validity window. Its event times
    /// are still used.
    Stale,
    /// The event is not available for this location and day.
    EventMissing,
    /// The stored instant is outside the representable range.
    OutOfRange,
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no astronomy data"),
            Self::Stale => write!(f, "astronomy data is stale"),
            Self::EventMissing => write!(f, "event not available"),
            Self::OutOfRange => write!(f, "instant out of range"),
        }
    }
}

/// An anchor that could not be resolved from fresh data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorUnavailable {
    pub anchor: Anchor,
    pub cause: UnavailableCause,
}

impl fmt::Display for AnchorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unavailable: {}", self.anchor, self.cause)
    }
}

/// A computed trigger instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub instant: OffsetDateTime,
    /// Set when at least one anchor came from stale data or the fallback.
    pub approximation: Option<AnchorUnavailable>,
}

impl Candidate {
    pub fn exact(instant: OffsetDateTime) -> Self {
        Self {
            instant,
            approximation: None,
        }
    }

    pub fn is_approximate(&self) -> bool {
        self.approximation.is_some()
    }

    /// Trigger instant in epoch milliseconds.
    pub fn millis(&self) -> i64 {
        millis_from_datetime(self.instant)
    }
}

/// Inputs shared by every anchor lookup in one computation.
struct Context<'a> {
    now: OffsetDateTime,
    today: Date,
    astronomy: Option<&'a AstronomyData>,
}

/// Computes raw trigger instants for alarm definitions.
#[derive(Debug, Clone, Default)]
pub struct AlarmTimeCalculator {
    config: CalculatorConfig,
}

impl AlarmTimeCalculator {
    pub fn new(config: CalculatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Compute the raw candidate for `alarm` before weekday resolution.
    pub fn compute(
        &self,
        alarm: &Alarm,
        now: OffsetDateTime,
        astronomy: Option<&AstronomyData>,
    ) -> Candidate {
        let now = truncate_to_millis(now);
        let ctx = Context {
            now,
            today: self.config.zone.to_local(now).date(),
            astronomy,
        };

        match alarm.mode {
            AlarmMode::At => self.resolve_anchor(alarm.relative1, alarm.time1, &ctx),
            AlarmMode::Between => {
                let start = self.resolve_anchor(alarm.relative1, alarm.time1, &ctx);
                let end = self.resolve_anchor(alarm.relative2, alarm.time2, &ctx);
                Candidate {
                    instant: self.sample(alarm.id, start.instant, end.instant, ctx.today),
                    approximation: start.approximation.or(end.approximation),
                }
            }
            AlarmMode::After => {
                let anchor = self.resolve_anchor(alarm.relative2, alarm.time2, &ctx);
                Candidate {
                    instant: anchor
                        .instant
                        .saturating_add(Duration::milliseconds(alarm.time1)),
                    ..anchor
                }
            }
            AlarmMode::Before => {
                let anchor = self.resolve_anchor(alarm.relative2, alarm.time2, &ctx);
                Candidate {
                    instant: anchor
                        .instant
                        .saturating_sub(Duration::milliseconds(alarm.time1)),
                    ..anchor
                }
            }
        }
    }

    /// Compute the candidate and resolve it against the alarm's weekday
    /// mask. The returned instant is always after `now`.
    pub fn next_trigger(
        &self,
        alarm: &Alarm,
        now: OffsetDateTime,
        astronomy: Option<&AstronomyData>,
    ) -> Candidate {
        let candidate = self.compute(alarm, now, astronomy);
        let resolver = RecurrenceResolver::new(self.config.zone);
        Candidate {
            instant: resolver.resolve(candidate.instant, alarm.weekdays, now),
            ..candidate
        }
    }

    fn resolve_anchor(&self, anchor: Anchor, fixed_ms: i64, ctx: &Context<'_>) -> Candidate {
        let instant = match anchor {
            Anchor::Fixed => datetime_from_millis(fixed_ms)
                .map(|instant| (instant, None))
                .map_err(|_| UnavailableCause::OutOfRange),
            Anchor::Solar(event) => self.solar_instant(ctx).and_then(|(data, stale)| {
                let ms = data.event(event).ok_or(UnavailableCause::EventMissing)?;
                datetime_from_millis(ms)
                    .map(|instant| (instant, stale.then_some(UnavailableCause::Stale)))
                    .map_err(|_| UnavailableCause::OutOfRange)
            }),
        };

        match instant {
            Ok((instant, cause)) => Candidate {
                instant: self.on_day(instant, ctx.today),
                approximation: cause.map(|cause| AnchorUnavailable { anchor, cause }),
            },
            Err(cause) => Candidate {
                instant: ctx.now.saturating_add(self.config.fallback_offset),
                approximation: Some(AnchorUnavailable { anchor, cause }),
            },
        }
    }

    /// The snapshot, and whether it is past the validity window.
    fn solar_instant<'a>(
        &self,
        ctx: &Context<'a>,
    ) -> std::result::Result<(&'a AstronomyData, bool), UnavailableCause> {
        let data = ctx.astronomy.ok_or(UnavailableCause::NoData)?;
        let max_age_ms =
            i64::try_from(self.config.max_astronomy_age.whole_milliseconds()).unwrap_or(i64::MAX);
        Ok((data, data.is_stale(millis_from_datetime(ctx.now), max_age_ms)))
    }

    /// Keep the local time of day of `instant` but move it to `day`.
    fn on_day(&self, instant: OffsetDateTime, day: Date) -> OffsetDateTime {
        let local = self.config.zone.to_local(instant);
        self.config.zone.resolve_local(day.with_time(local.time()))
    }

    fn sample(
        &self,
        id: AlarmId,
        a: OffsetDateTime,
        b: OffsetDateTime,
        day: Date,
    ) -> OffsetDateTime {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let span = millis_from_datetime(end) - millis_from_datetime(start);
        if span <= 0 {
            return start;
        }

        let offset = match self.config.sampling {
            BetweenSampling::Seeded => {
                StdRng::seed_from_u64(window_seed(id, day)).random_range(0..=span)
            }
            BetweenSampling::Random => rand::rng().random_range(0..=span),
        };
        start.saturating_add(Duration::milliseconds(offset))
    }
}

fn window_seed(id: AlarmId, day: Date) -> u64 {
    (id.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (day.to_julian_day() as u64)
}

fn truncate_to_millis(instant: OffsetDateTime) -> OffsetDateTime {
    let sub_milli = i64::from(instant.nanosecond() % 1_000_000);
    instant.saturating_sub(Duration::nanoseconds(sub_milli))
}
