//! Local time zone resolution.
//!
//! "Today", weekdays and clock times are wall-clock notions. [`LocalZone`]
//! maps between instants and wall-clock time, resolving the UTC offset for
//! the instant in question so alarms keep their clock time across daylight
//! saving changes.

use chrono::{LocalResult, Offset, TimeZone};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Source of the local UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// The system time zone, looked up per instant.
    #[default]
    System,
    /// A fixed offset with no daylight saving.
    Fixed(UtcOffset),
}

impl LocalZone {
    pub const UTC: LocalZone = LocalZone::Fixed(UtcOffset::UTC);

    /// UTC offset in effect at `instant`.
    pub fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        match self {
            Self::Fixed(offset) => *offset,
            Self::System => system_offset_at(instant).unwrap_or(UtcOffset::UTC),
        }
    }

    /// `instant` expressed in local wall-clock time.
    pub fn to_local(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset_at(instant))
    }

    /// The instant a local wall-clock time refers to.
    ///
    /// A time repeated when clocks go back resolves to its first occurrence.
    /// A time skipped when clocks go forward resolves to the same distance
    /// past the gap (02:30 becomes 03:30).
    pub fn resolve_local(&self, local: PrimitiveDateTime) -> OffsetDateTime {
        let offset = match self {
            Self::Fixed(offset) => *offset,
            Self::System => system_offset_for_local(local)
                .or_else(|| system_offset_for_local(local.saturating_sub(Duration::HOUR)))
                .unwrap_or(UtcOffset::UTC),
        };
        local.assume_offset(offset)
    }
}

fn system_offset_at(instant: OffsetDateTime) -> Option<UtcOffset> {
    let local = chrono::Local
        .timestamp_opt(instant.unix_timestamp(), 0)
        .single()?;
    UtcOffset::from_whole_seconds(local.offset().fix().local_minus_utc()).ok()
}

fn system_offset_for_local(local: PrimitiveDateTime) -> Option<UtcOffset> {
    let naive = chrono::NaiveDate::from_ymd_opt(
        local.year(),
        u32::from(u8::from(local.month())),
        u32::from(local.day()),
    )?
    .and_hms_opt(
        u32::from(local.hour()),
        u32::from(local.minute()),
        u32::from(local.second()),
    )?;
    let seconds = match chrono::Local.offset_from_local_datetime(&naive) {
        LocalResult::Single(offset) => offset.fix().local_minus_utc(),
        // The larger offset is the earlier instant.
        LocalResult::Ambiguous(a, b) => a.fix().local_minus_utc().max(b.fix().local_minus_utc()),
        LocalResult::None => return None,
    };
    UtcOffset::from_whole_seconds(seconds).ok()
}
