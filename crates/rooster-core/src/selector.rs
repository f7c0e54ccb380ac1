//! Next-alarm selection.
//!
//! Selection only reads the persisted `calculated_time`; it never recomputes.

use rooster_types::{Alarm, AlarmId};

/// The enabled alarm with the earliest `calculated_time`.
///
/// Ties go to the smaller id. Disabled alarms are ignored.
///
/// ```
/// use rooster_core::select_next;
/// use rooster_types::{Alarm, AlarmId, AlarmMode};
///
/// let mut early = Alarm::new(AlarmId(2), AlarmMode::At);
/// early.calculated_time = 1_000;
/// let mut late = Alarm::new(AlarmId(1), AlarmMode::At);
/// late.calculated_time = 2_000;
///
/// assert_eq!(select_next(&[late, early]), Some(AlarmId(2)));
///
/// let none: [Alarm; 0] = [];
/// assert_eq!(select_next(&none), None);
/// ```
pub fn select_next<'a, I>(alarms: I) -> Option<AlarmId>
where
    I: IntoIterator<Item = &'a Alarm>,
{
    select_next_after(alarms, i64::MIN)
}

/// Like [`select_next`], but only considers alarms whose `calculated_time`
/// is strictly after `now_ms`.
pub fn select_next_after<'a, I>(alarms: I, now_ms: i64) -> Option<AlarmId>
where
    I: IntoIterator<Item = &'a Alarm>,
{
    alarms
        .into_iter()
        .filter(|alarm| alarm.enabled && alarm.calculated_time > now_ms)
        .min_by_key(|alarm| (alarm.calculated_time, alarm.id))
        .map(|alarm| alarm.id)
}
