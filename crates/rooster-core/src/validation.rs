//! Validation for alarm definitions and astronomy data.
//!
//! Definition checks run before any calculation; a failing definition is
//! reported as [`Error::InvalidDefinition`] and nothing is persisted.
//! Astronomy checks run on freshly fetched data before it replaces the
//! cached snapshot.
//!
//! # Example
//!
//! ```
//! use rooster_core::validation::validate_astronomy;
//! use rooster_types::{AstronomyData, Location};
//!
//! let data = AstronomyData {
//!     location: Location::new(52.5, 13.4),
//!     civil_dawn: 1_000,
//!     sunrise: 2_000,
//!     sunset: 9_000,
//!     civil_dusk: 10_000,
//!     day_length: 7_000,
//!     ..Default::default()
//! };
//!
//! let result = validate_astronomy(&data);
//! assert!(result.is_valid());
//! ```

use serde::{Deserialize, Serialize};

use rooster_types::{
    Alarm, AlarmMode, Anchor, AstronomyData, Location, MAX_LABEL_LEN, datetime_from_millis,
};

use crate::error::{Error, Result};

/// Check that `alarm` can be scheduled.
pub fn validate_alarm(alarm: &Alarm) -> Result<()> {
    let invalid = |reason: String| Err(Error::invalid_definition(alarm.id, reason));

    match alarm.mode {
        AlarmMode::After | AlarmMode::Before if !alarm.relative2.is_solar() => {
            return invalid(format!(
                "{} alarms need a solar anchor, got {}",
                alarm.mode, alarm.relative2
            ));
        }
        _ => {}
    }

    for (anchor, field, value) in clock_fields(alarm) {
        if anchor == Anchor::Fixed && datetime_from_millis(value).is_err() {
            return invalid(format!("{field} is out of range: {value}"));
        }
    }

    if alarm.label.chars().count() > MAX_LABEL_LEN {
        return invalid(format!("label exceeds {MAX_LABEL_LEN} characters"));
    }

    if alarm.volume > 100 {
        return invalid(format!("volume {} exceeds 100", alarm.volume));
    }

    if alarm.snooze_enabled && alarm.snooze_duration_minutes == 0 {
        return invalid("snooze is enabled with a zero duration".to_string());
    }

    Ok(())
}

/// Time fields read as clock values, with the anchor that governs each.
fn clock_fields(alarm: &Alarm) -> Vec<(Anchor, &'static str, i64)> {
    match alarm.mode {
        AlarmMode::At => vec![(alarm.relative1, "time1", alarm.time1)],
        AlarmMode::Between => vec![
            (alarm.relative1, "time1", alarm.time1),
            (alarm.relative2, "time2", alarm.time2),
        ],
        AlarmMode::After | AlarmMode::Before => Vec::new(),
    }
}

/// Check that a location is inside the valid coordinate ranges.
pub fn validate_location(location: &Location) -> std::result::Result<(), AstronomyIssue> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(AstronomyIssue::InvalidLocation {
            latitude: location.latitude,
            longitude: location.longitude,
        })
    }
}

/// Problems found in astronomy data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new checks
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AstronomyIssue {
    /// Coordinates are outside [-90, 90] / [-180, 180].
    InvalidLocation { latitude: f64, longitude: f64 },
    /// Sunrise is not before sunset.
    SunriseNotBeforeSunset { sunrise: i64, sunset: i64 },
    /// Civil dawn is not before sunrise.
    CivilDawnNotBeforeSunrise { civil_dawn: i64, sunrise: i64 },
    /// Sunset is not before civil dusk.
    SunsetNotBeforeCivilDusk { sunset: i64, civil_dusk: i64 },
    /// Day length is zero or negative while both sunrise and sunset exist.
    NonPositiveDayLength(i64),
}

impl std::fmt::Display for AstronomyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AstronomyIssue::InvalidLocation {
                latitude,
                longitude,
            } => write!(f, "location ({}, {}) is out of range", latitude, longitude),
            AstronomyIssue::SunriseNotBeforeSunset { sunrise, sunset } => {
                write!(f, "sunrise {} is not before sunset {}", sunrise, sunset)
            }
            AstronomyIssue::CivilDawnNotBeforeSunrise {
                civil_dawn,
                sunrise,
            } => write!(
                f,
                "civil dawn {} is not before sunrise {}",
                civil_dawn, sunrise
            ),
            AstronomyIssue::SunsetNotBeforeCivilDusk { sunset, civil_dusk } => write!(
                f,
                "sunset {} is not before civil dusk {}",
                sunset, civil_dusk
            ),
            AstronomyIssue::NonPositiveDayLength(ms) => {
                write!(f, "day length {} ms is not positive", ms)
            }
        }
    }
}

/// Result of validating astronomy data.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<AstronomyIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check the ordering constraints of solar events.
///
/// Events that are unavailable (`0`) are skipped, so polar day and night
/// records pass as long as the events that do exist are consistent.
pub fn validate_astronomy(data: &AstronomyData) -> ValidationResult {
    let mut issues = Vec::new();

    if let Err(issue) = validate_location(&data.location) {
        issues.push(issue);
    }

    let both = |a: i64, b: i64| a != 0 && b != 0;

    if both(data.sunrise, data.sunset) {
        if data.sunrise >= data.sunset {
            issues.push(AstronomyIssue::SunriseNotBeforeSunset {
                sunrise: data.sunrise,
                sunset: data.sunset,
            });
        }
        if data.day_length <= 0 {
            issues.push(AstronomyIssue::NonPositiveDayLength(data.day_length));
        }
    }
    if both(data.civil_dawn, data.sunrise) && data.civil_dawn >= data.sunrise {
        issues.push(AstronomyIssue::CivilDawnNotBeforeSunrise {
            civil_dawn: data.civil_dawn,
            sunrise: data.sunrise,
        });
    }
    if both(data.sunset, data.civil_dusk) && data.sunset >= data.civil_dusk {
        issues.push(AstronomyIssue::SunsetNotBeforeCivilDusk {
            sunset: data.sunset,
            civil_dusk: data.civil_dusk,
        });
    }

    ValidationResult { issues }
}
