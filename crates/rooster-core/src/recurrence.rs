//! Weekday recurrence resolution.
//!
//! Turns a raw candidate instant into the next instant that is strictly after
//! `now` and falls on a weekday the alarm is allowed to ring. Weekdays and
//! times of day are wall-clock values in the configured [`LocalZone`], so a
//! 07:00 alarm at `+02:00` is a Monday alarm even though it is still Sunday
//! in UTC, and it stays at 07:00 when daylight saving starts.

use time::{Date, Duration, OffsetDateTime, Time};

use rooster_types::WeekdayMask;

use crate::zone::LocalZone;

/// Resolves candidates against a weekday mask.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceResolver {
    zone: LocalZone,
}

impl Default for RecurrenceResolver {
    fn default() -> Self {
        Self::new(LocalZone::UTC)
    }
}

impl RecurrenceResolver {
    pub fn new(zone: LocalZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Next instant after `now` on an allowed weekday, keeping the
    /// candidate's local time of day.
    ///
    /// A candidate that is already in the future and on an allowed day is
    /// returned unchanged. An elapsed candidate jumps forward to today, then
    /// to the first day whose occurrence lies past `now`, then scans at most
    /// seven days for an allowed weekday. An empty mask allows every day.
    pub fn resolve(
        &self,
        candidate: OffsetDateTime,
        mask: WeekdayMask,
        now: OffsetDateTime,
    ) -> OffsetDateTime {
        let local = self.zone.to_local(candidate);
        if local > now && mask.allows(local.weekday()) {
            return local;
        }

        let time = local.time();
        let mut day = local.date().max(self.zone.to_local(now).date());
        // Two steps cover any daylight saving shift.
        for _ in 0..2 {
            if self.at(day, time) > now {
                break;
            }
            day = next_day(day);
        }

        for _ in 0..7 {
            if mask.allows(day.weekday()) {
                break;
            }
            day = next_day(day);
        }

        self.at(day, time)
    }

    fn at(&self, day: Date, time: Time) -> OffsetDateTime {
        self.zone.resolve_local(day.with_time(time))
    }
}

fn next_day(day: Date) -> Date {
    day.saturating_add(Duration::DAY)
}
