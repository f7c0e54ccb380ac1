//! Platform-agnostic types for the Rooster alarm clock.
//!
//! This crate provides the shared vocabulary used by the scheduling engine
//! (rooster-core), the SQLite store (rooster-store) and the service binary.
//!
//! # Features
//!
//! - Alarm definitions: mode, anchors, time fields, weekday mask
//! - Solar event data and locations
//! - Epoch-millisecond conversion helpers
//! - Error types for parsing persisted values
//!
//! # Example
//!
//! ```
//! use rooster_types::{Alarm, AlarmId, AlarmMode, WeekdayMask};
//!
//! let alarm = Alarm::new(AlarmId(1), AlarmMode::At).weekdays(WeekdayMask::WORKDAYS);
//! assert!(!alarm.is_one_shot());
//! ```

pub mod astronomy;
pub mod error;
pub mod types;

pub use astronomy::{AstronomyData, Location};
pub use error::{ParseError, ParseResult};
pub use types::{
    Alarm, AlarmId, AlarmMode, Anchor, MAX_LABEL_LEN, MILLIS_PER_DAY, MILLIS_PER_HOUR,
    MILLIS_PER_MINUTE, MILLIS_PER_SECOND, SolarEvent, WeekdayMask, datetime_from_millis,
    millis_from_datetime, sanitize_label,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::Weekday;

    // --- AlarmMode tests ---

    #[test]
    fn test_alarm_mode_parse() {
        assert_eq!("At".parse::<AlarmMode>(), Ok(AlarmMode::At));
        assert_eq!("Between".parse::<AlarmMode>(), Ok(AlarmMode::Between));
        assert_eq!("After".parse::<AlarmMode>(), Ok(AlarmMode::After));
        assert_eq!("Before".parse::<AlarmMode>(), Ok(AlarmMode::Before));
    }

    #[test]
    fn test_alarm_mode_parse_unknown() {
        let err = "Around".parse::<AlarmMode>().unwrap_err();
        assert_eq!(err, ParseError::UnknownMode("Around".to_string()));
        assert_eq!(err.to_string(), "Unknown alarm mode: Around");
    }

    #[test]
    fn test_alarm_mode_display_matches_persisted_form() {
        for mode in AlarmMode::ALL {
            assert_eq!(mode.to_string().parse::<AlarmMode>(), Ok(mode));
        }
    }

    // --- Anchor tests ---

    #[test]
    fn test_anchor_parse_all_solar_events() {
        for event in SolarEvent::ALL {
            assert_eq!(event.as_str().parse::<Anchor>(), Ok(Anchor::Solar(event)));
        }
    }

    #[test]
    fn test_anchor_fixed_sentinel() {
        assert_eq!(Anchor::default(), Anchor::Fixed);
        assert_eq!(Anchor::Fixed.as_str(), "Pick Time");
        assert!(Anchor::Fixed.solar_event().is_none());
        assert!(!Anchor::Fixed.is_solar());
    }

    #[test]
    fn test_anchor_parse_unknown() {
        assert!(matches!(
            "Moonrise".parse::<Anchor>(),
            Err(ParseError::UnknownAnchor(_))
        ));
    }

    // --- WeekdayMask tests ---

    #[test]
    fn test_weekday_mask_bits() {
        assert_eq!(WeekdayMask::NONE.with(Weekday::Monday).bits(), 0b0000_0001);
        assert_eq!(WeekdayMask::NONE.with(Weekday::Sunday).bits(), 0b0100_0000);
        assert_eq!(WeekdayMask::from_bits(0xFF), WeekdayMask::EVERY_DAY);
    }

    #[test]
    fn test_weekday_mask_from_days() {
        let mask = WeekdayMask::from_days([Weekday::Saturday, Weekday::Sunday]);
        assert_eq!(mask, WeekdayMask::WEEKEND);
        assert_eq!(
            mask.days().collect::<Vec<_>>(),
            vec![Weekday::Saturday, Weekday::Sunday]
        );
    }

    #[test]
    fn test_weekday_mask_without() {
        let mask = WeekdayMask::WORKDAYS.without(Weekday::Friday);
        assert!(!mask.contains(Weekday::Friday));
        assert!(mask.contains(Weekday::Thursday));
    }

    #[test]
    fn test_empty_mask_allows_every_day() {
        for day in WeekdayMask::EVERY_DAY.days() {
            assert!(WeekdayMask::NONE.allows(day));
        }
        assert!(!WeekdayMask::WORKDAYS.allows(Weekday::Sunday));
    }

    #[test]
    fn test_weekday_mask_display() {
        assert_eq!(WeekdayMask::NONE.to_string(), "once");
        assert_eq!(WeekdayMask::EVERY_DAY.to_string(), "daily");
        assert_eq!(WeekdayMask::WEEKEND.to_string(), "Sat,Sun");
    }

    // --- Alarm tests ---

    #[test]
    fn test_alarm_defaults() {
        let alarm = Alarm::new(AlarmId(1), AlarmMode::At);
        assert!(alarm.enabled);
        assert!(alarm.is_one_shot());
        assert!(!alarm.uses_solar_events());
        assert_eq!(alarm.snooze_duration_minutes, 10);
        assert_eq!(alarm.snooze_count, 3);
        assert_eq!(alarm.volume, 80);
        assert_eq!(alarm.ringtone_uri, "Default");
        assert_eq!(alarm.calculated_time, 0);
    }

    #[test]
    fn test_alarm_label_is_sanitized() {
        let long = "x".repeat(150);
        let alarm = Alarm::new(AlarmId(1), AlarmMode::At).label(format!("  {}  ", long));
        assert_eq!(alarm.label.chars().count(), MAX_LABEL_LEN);

        let alarm = Alarm::new(AlarmId(1), AlarmMode::At).label("  Wake up ");
        assert_eq!(alarm.label, "Wake up");
    }

    // --- Astronomy tests ---

    #[test]
    fn test_astronomy_event_zero_is_unavailable() {
        let data = AstronomyData {
            sunrise: 1_000,
            ..Default::default()
        };
        assert_eq!(data.event(SolarEvent::Sunrise), Some(1_000));
        assert_eq!(data.event(SolarEvent::Sunset), None);
    }

    #[test]
    fn test_astronomy_staleness() {
        let data = AstronomyData {
            last_updated: 0,
            ..Default::default()
        };
        assert!(!data.is_stale(MILLIS_PER_HOUR, 6 * MILLIS_PER_HOUR));
        assert!(data.is_stale(6 * MILLIS_PER_HOUR, 6 * MILLIS_PER_HOUR));
    }

    #[test]
    fn test_location_validity() {
        assert!(Location::new(52.5, 13.4).is_valid());
        assert!(!Location::new(91.0, 0.0).is_valid());
        assert!(!Location::new(0.0, -181.0).is_valid());
        assert!(Location::default().is_unset());
    }

    // --- Serialization tests ---

    #[test]
    fn test_alarm_json_shape() {
        let alarm = Alarm::new(AlarmId(3), AlarmMode::After)
            .relative2(Anchor::Solar(SolarEvent::Sunrise))
            .weekdays(WeekdayMask::WEEKEND);
        let json = serde_json::to_string(&alarm).unwrap();
        assert!(json.contains("\"id\":3"));
        assert!(json.contains("\"mode\":\"After\""));
        assert!(json.contains("\"relative2\":\"Sunrise\""));
        assert!(json.contains("\"relative1\":\"Pick Time\""));
        assert!(json.contains("\"weekdays\":96"));
    }

    #[test]
    fn test_alarm_json_without_recompute_flag() {
        let alarm = Alarm::new(AlarmId(3), AlarmMode::At);
        let mut value = serde_json::to_value(&alarm).unwrap();
        value.as_object_mut().unwrap().remove("needs_recompute");
        let parsed: Alarm = serde_json::from_value(value).unwrap();
        assert!(!parsed.needs_recompute);
    }

    #[test]
    fn test_anchor_deserialize_rejects_unknown() {
        let result: Result<Anchor, _> = serde_json::from_str("\"Moonrise\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_millis_roundtrip_negative() {
        let dt = datetime_from_millis(-1).unwrap();
        assert_eq!(millis_from_datetime(dt), -1);
    }

    #[test]
    fn test_millis_out_of_range() {
        assert_eq!(
            datetime_from_millis(i64::MAX),
            Err(ParseError::InstantOutOfRange(i64::MAX))
        );
    }

    // --- Property tests ---

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn weekday_mask_days_roundtrip(bits in any::<u8>()) {
                let mask = WeekdayMask::from_bits(bits);
                prop_assert_eq!(WeekdayMask::from_days(mask.days()), mask);
            }

            #[test]
            fn millis_roundtrip(ms in -10_000_000_000_000i64..10_000_000_000_000i64) {
                let dt = datetime_from_millis(ms).unwrap();
                prop_assert_eq!(millis_from_datetime(dt), ms);
            }
        }
    }
}
