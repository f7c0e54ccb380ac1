//! Solar event data for a location.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::SolarEvent;

/// Geographic location in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both coordinates are inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// `(0, 0)` is what an unconfigured device reports.
    pub fn is_unset(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// Solar event instants for one location and day.
///
/// All instants are epoch milliseconds. A value of `0` means the event is not
/// available (polar day or night, or a failed parse upstream). The record is
/// always replaced wholesale, never patched field by field.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AstronomyData {
    pub location: Location,
    pub sunrise: i64,
    pub sunset: i64,
    pub solar_noon: i64,
    pub civil_dawn: i64,
    pub civil_dusk: i64,
    pub nautical_dawn: i64,
    pub nautical_dusk: i64,
    pub astro_dawn: i64,
    pub astro_dusk: i64,
    /// When this record was produced.
    pub last_updated: i64,
    /// Length of the day in milliseconds.
    pub day_length: i64,
}

impl AstronomyData {
    /// Instant of `event`, or `None` when the event is unavailable.
    pub fn event(&self, event: SolarEvent) -> Option<i64> {
        let ms = match event {
            SolarEvent::AstroDawn => self.astro_dawn,
            SolarEvent::NauticalDawn => self.nautical_dawn,
            SolarEvent::CivilDawn => self.civil_dawn,
            SolarEvent::Sunrise => self.sunrise,
            SolarEvent::SolarNoon => self.solar_noon,
            SolarEvent::Sunset => self.sunset,
            SolarEvent::CivilDusk => self.civil_dusk,
            SolarEvent::NauticalDusk => self.nautical_dusk,
            SolarEvent::AstroDusk => self.astro_dusk,
        };
        (ms != 0).then_some(ms)
    }

    /// Age of the record at `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_updated)
    }

    /// Whether the record is older than `max_age_ms` at `now_ms`.
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.age_ms(now_ms) >= max_age_ms
    }
}
