//! Core types for alarm definitions.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Weekday};

use crate::error::{ParseError, ParseResult};

/// Milliseconds in one second.
pub const MILLIS_PER_SECOND: i64 = 1_000;
/// Milliseconds in one minute.
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Maximum stored label length in characters.
pub const MAX_LABEL_LEN: usize = 100;

/// Convert epoch milliseconds into a UTC instant.
///
/// # Examples
///
/// ```
/// use rooster_types::{datetime_from_millis, millis_from_datetime};
///
/// let dt = datetime_from_millis(1_700_000_000_123).unwrap();
/// assert_eq!(millis_from_datetime(dt), 1_700_000_000_123);
/// ```
pub fn datetime_from_millis(ms: i64) -> ParseResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| ParseError::InstantOutOfRange(ms))
}

/// Convert an instant into epoch milliseconds, truncating sub-millisecond precision.
pub fn millis_from_datetime(dt: OffsetDateTime) -> i64 {
    dt.unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

/// Stable alarm identifier, assigned by the store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AlarmId(pub i64);

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AlarmId {
    fn from(value: i64) -> Self {
        AlarmId(value)
    }
}

/// How an alarm's trigger time is derived from its two time fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlarmMode {
    /// Fire exactly at `time1` (or at the `relative1` solar event).
    At,
    /// Fire at a uniformly sampled instant inside the window between the two bounds.
    Between,
    /// Fire `time1` milliseconds after the `relative2` solar event.
    After,
    /// Fire `time1` milliseconds before the `relative2` solar event.
    Before,
}

impl AlarmMode {
    /// All modes in display order.
    pub const ALL: [AlarmMode; 4] = [
        AlarmMode::At,
        AlarmMode::Between,
        AlarmMode::After,
        AlarmMode::Before,
    ];

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmMode::At => "At",
            AlarmMode::Between => "Between",
            AlarmMode::After => "After",
            AlarmMode::Before => "Before",
        }
    }
}

impl FromStr for AlarmMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlarmMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ParseError::UnknownMode(s.to_string()))
    }
}

impl fmt::Display for AlarmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A solar event usable as an alarm anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolarEvent {
    AstroDawn,
    NauticalDawn,
    CivilDawn,
    Sunrise,
    SolarNoon,
    Sunset,
    CivilDusk,
    NauticalDusk,
    AstroDusk,
}

impl SolarEvent {
    /// All events in chronological order over a typical day.
    pub const ALL: [SolarEvent; 9] = [
        SolarEvent::AstroDawn,
        SolarEvent::NauticalDawn,
        SolarEvent::CivilDawn,
        SolarEvent::Sunrise,
        SolarEvent::SolarNoon,
        SolarEvent::Sunset,
        SolarEvent::CivilDusk,
        SolarEvent::NauticalDusk,
        SolarEvent::AstroDusk,
    ];

    /// Human-readable name, also used as the persisted anchor string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SolarEvent::AstroDawn => "Astronomical Dawn",
            SolarEvent::NauticalDawn => "Nautical Dawn",
            SolarEvent::CivilDawn => "Civil Dawn",
            SolarEvent::Sunrise => "Sunrise",
            SolarEvent::SolarNoon => "Solar Noon",
            SolarEvent::Sunset => "Sunset",
            SolarEvent::CivilDusk => "Civil Dusk",
            SolarEvent::NauticalDusk => "Nautical Dusk",
            SolarEvent::AstroDusk => "Astronomical Dusk",
        }
    }
}

impl fmt::Display for SolarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `relative1`/`relative2` field refers to.
///
/// `Fixed` is the "pick a clock time" sentinel: the companion `time1`/`time2`
/// field carries the clock instant. `Solar` substitutes the named event.
///
/// ```
/// use rooster_types::{Anchor, SolarEvent};
///
/// assert_eq!("Pick Time".parse::<Anchor>(), Ok(Anchor::Fixed));
/// assert_eq!("Sunset".parse::<Anchor>(), Ok(Anchor::Solar(SolarEvent::Sunset)));
/// assert_eq!(Anchor::Solar(SolarEvent::CivilDawn).to_string(), "Civil Dawn");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Anchor {
    #[default]
    Fixed,
    Solar(SolarEvent),
}

impl Anchor {
    /// Persisted string for the fixed-time sentinel.
    pub const FIXED_STR: &'static str = "Pick Time";

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Fixed => Self::FIXED_STR,
            Anchor::Solar(event) => event.as_str(),
        }
    }

    /// The solar event, if this anchor names one.
    pub fn solar_event(&self) -> Option<SolarEvent> {
        match self {
            Anchor::Fixed => None,
            Anchor::Solar(event) => Some(*event),
        }
    }

    pub fn is_solar(&self) -> bool {
        matches!(self, Anchor::Solar(_))
    }
}

impl FromStr for Anchor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::FIXED_STR {
            return Ok(Anchor::Fixed);
        }
        SolarEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .map(Anchor::Solar)
            .ok_or_else(|| ParseError::UnknownAnchor(s.to_string()))
    }
}

impl TryFrom<String> for Anchor {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.as_str().to_string()
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of weekdays on which an alarm may fire.
///
/// Bit 0 is Monday, bit 6 is Sunday. An empty mask marks a one-shot alarm,
/// which fires on the next day its time comes round and is then consumed.
///
/// ```
/// use rooster_types::WeekdayMask;
/// use time::Weekday;
///
/// let mask = WeekdayMask::NONE.with(Weekday::Monday).with(Weekday::Friday);
/// assert!(mask.contains(Weekday::Friday));
/// assert!(!mask.contains(Weekday::Sunday));
/// assert!(WeekdayMask::NONE.allows(Weekday::Sunday));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "u8", into = "u8"))]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const NONE: WeekdayMask = WeekdayMask(0);
    pub const EVERY_DAY: WeekdayMask = WeekdayMask(0b0111_1111);
    pub const WORKDAYS: WeekdayMask = WeekdayMask(0b0001_1111);
    pub const WEEKEND: WeekdayMask = WeekdayMask(0b0110_0000);

    /// Build a mask from raw bits; bits above Sunday are discarded.
    pub const fn from_bits(bits: u8) -> Self {
        WeekdayMask(bits & 0b0111_1111)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a mask from a list of days.
    pub fn from_days<I: IntoIterator<Item = Weekday>>(days: I) -> Self {
        days.into_iter().fold(Self::NONE, |mask, day| mask.with(day))
    }

    /// Return a copy with `day` enabled.
    #[must_use]
    pub const fn with(self, day: Weekday) -> Self {
        WeekdayMask(self.0 | (1 << day.number_days_from_monday()))
    }

    /// Return a copy with `day` disabled.
    #[must_use]
    pub const fn without(self, day: Weekday) -> Self {
        WeekdayMask(self.0 & !(1 << day.number_days_from_monday()))
    }

    pub const fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.number_days_from_monday()) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether an alarm with this mask may fire on `day`.
    ///
    /// An empty mask accepts any day: one-shot alarms fire on the first day
    /// their time has not yet elapsed.
    pub const fn allows(self, day: Weekday) -> bool {
        self.is_empty() || self.contains(day)
    }

    /// Iterate over the enabled days, Monday first.
    pub fn days(self) -> impl Iterator<Item = Weekday> {
        let mut day = Weekday::Monday;
        (0..7).filter_map(move |_| {
            let current = day;
            day = day.next();
            self.contains(current).then_some(current)
        })
    }
}

impl From<u8> for WeekdayMask {
    fn from(bits: u8) -> Self {
        WeekdayMask::from_bits(bits)
    }
}

impl From<WeekdayMask> for u8 {
    fn from(mask: WeekdayMask) -> Self {
        mask.0
    }
}

impl fmt::Display for WeekdayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("once");
        }
        if *self == Self::EVERY_DAY {
            return f.write_str("daily");
        }
        let names: Vec<String> = self
            .days()
            .map(|day| day.to_string()[..3].to_string())
            .collect();
        f.write_str(&names.join(","))
    }
}

/// The scheduling-relevant projection of a persisted alarm.
///
/// `time1` and `time2` are epoch milliseconds whose meaning depends on
/// [`AlarmMode`]: an absolute clock instant, a window bound, or a signed
/// offset. `calculated_time` is the authoritative next trigger instant.
///
/// Builder-style setters share their field names:
///
/// ```
/// use rooster_types::{Alarm, AlarmId, AlarmMode, Anchor, SolarEvent, MILLIS_PER_MINUTE};
///
/// let alarm = Alarm::new(AlarmId(7), AlarmMode::Before)
///     .relative2(Anchor::Solar(SolarEvent::Sunset))
///     .time1(30 * MILLIS_PER_MINUTE);
/// assert!(alarm.uses_solar_events());
/// assert!(alarm.is_one_shot());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Alarm {
    pub id: AlarmId,
    pub label: String,
    pub enabled: bool,
    pub mode: AlarmMode,
    pub relative1: Anchor,
    pub relative2: Anchor,
    pub time1: i64,
    pub time2: i64,
    pub weekdays: WeekdayMask,
    /// Next trigger instant in epoch milliseconds (0 when never computed).
    pub calculated_time: i64,
    /// Set when `calculated_time` came from an approximate anchor and must be
    /// recomputed once fresh astronomy data arrives.
    #[cfg_attr(feature = "serde", serde(default))]
    pub needs_recompute: bool,
    pub snooze_enabled: bool,
    pub snooze_duration_minutes: u32,
    /// Remaining snooze budget.
    pub snooze_count: u32,
    /// Volume percentage (0-100).
    pub volume: u8,
    pub vibrate: bool,
    pub gradual_volume: bool,
    pub ringtone_uri: String,
}

impl Alarm {
    pub const DEFAULT_SNOOZE_DURATION_MINUTES: u32 = 10;
    pub const DEFAULT_SNOOZE_COUNT: u32 = 3;
    pub const DEFAULT_VOLUME: u8 = 80;
    pub const DEFAULT_RINGTONE: &'static str = "Default";

    /// Create an enabled one-shot alarm with fixed anchors and default
    /// presentation settings.
    pub fn new(id: AlarmId, mode: AlarmMode) -> Self {
        Self {
            id,
            label: String::new(),
            enabled: true,
            mode,
            relative1: Anchor::Fixed,
            relative2: Anchor::Fixed,
            time1: 0,
            time2: 0,
            weekdays: WeekdayMask::NONE,
            calculated_time: 0,
            needs_recompute: false,
            snooze_enabled: true,
            snooze_duration_minutes: Self::DEFAULT_SNOOZE_DURATION_MINUTES,
            snooze_count: Self::DEFAULT_SNOOZE_COUNT,
            volume: Self::DEFAULT_VOLUME,
            vibrate: true,
            gradual_volume: false,
            ringtone_uri: Self::DEFAULT_RINGTONE.to_string(),
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = sanitize_label(&label.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn relative1(mut self, anchor: Anchor) -> Self {
        self.relative1 = anchor;
        self
    }

    #[must_use]
    pub fn relative2(mut self, anchor: Anchor) -> Self {
        self.relative2 = anchor;
        self
    }

    #[must_use]
    pub fn time1(mut self, ms: i64) -> Self {
        self.time1 = ms;
        self
    }

    #[must_use]
    pub fn time2(mut self, ms: i64) -> Self {
        self.time2 = ms;
        self
    }

    #[must_use]
    pub fn weekdays(mut self, mask: WeekdayMask) -> Self {
        self.weekdays = mask;
        self
    }

    #[must_use]
    pub fn snooze(mut self, enabled: bool, duration_minutes: u32, count: u32) -> Self {
        self.snooze_enabled = enabled;
        self.snooze_duration_minutes = duration_minutes;
        self.snooze_count = count;
        self
    }

    /// A one-shot alarm has no weekday selected and is consumed after firing.
    pub fn is_one_shot(&self) -> bool {
        self.weekdays.is_empty()
    }

    /// Whether either anchor field names a solar event.
    pub fn uses_solar_events(&self) -> bool {
        self.relative1.is_solar() || self.relative2.is_solar()
    }
}

/// Trim a label and cap it at [`MAX_LABEL_LEN`] characters.
pub fn sanitize_label(label: &str) -> String {
    label.trim().chars().take(MAX_LABEL_LEN).collect()
}
