//! Error types for the scheduling engine.
//!
//! The calculator never fails; everything here is produced by the
//! [`ScheduleOrchestrator`](crate::ScheduleOrchestrator) or by one of its
//! collaborators. Anchor unavailability is not an error at all: it is
//! reported on the [`Candidate`](crate::Candidate) as an
//! [`AnchorUnavailable`](crate::AnchorUnavailable) approximation.

use thiserror::Error;
use time::OffsetDateTime;

use rooster_types::AlarmId;

/// Boxed error returned by [`AlarmStore`](crate::AlarmStore) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while scheduling alarms.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The alarm definition cannot be scheduled. Nothing was persisted.
    #[error("Invalid definition for alarm {id}: {reason}")]
    InvalidDefinition {
        /// The rejected alarm.
        id: AlarmId,
        /// What is wrong with it.
        reason: String,
    },

    /// The store rejected a read or write. No timer was armed.
    #[error("Persistence failed for alarm {id}: {source}")]
    PersistenceFailure {
        /// The alarm being persisted.
        id: AlarmId,
        /// Underlying store error.
        #[source]
        source: BoxError,
    },

    /// The time was persisted but the platform timer could not be armed.
    #[error("Failed to arm timer for alarm {id}: {source}")]
    TimerRegistrationFailure {
        /// The alarm whose timer failed.
        id: AlarmId,
        /// Underlying timer error.
        #[source]
        source: TimerError,
    },

    /// The store could not list alarms.
    #[error("Failed to load alarms: {source}")]
    LoadFailed {
        /// Underlying store error.
        #[source]
        source: BoxError,
    },

    /// No alarm with this id exists in the store.
    #[error("Alarm not found: {0}")]
    AlarmNotFound(AlarmId),

    /// The alarm is disabled and will not be scheduled.
    #[error("Alarm {0} is disabled")]
    AlarmDisabled(AlarmId),

    /// An explicit trigger instant is not after the current time.
    #[error("Trigger time {at} for alarm {id} is not in the future")]
    InstantInPast {
        /// The alarm being scheduled.
        id: AlarmId,
        /// The rejected instant.
        at: OffsetDateTime,
    },

    /// Snoozing is disabled for this alarm or its budget is exhausted.
    #[error("Snooze unavailable for alarm {id} ({remaining} snoozes left)")]
    SnoozeUnavailable {
        /// The alarm that was snoozed.
        id: AlarmId,
        /// Remaining snooze budget.
        remaining: u32,
    },
}

impl Error {
    /// Create an invalid definition error.
    pub fn invalid_definition(id: AlarmId, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id,
            reason: reason.into(),
        }
    }

    /// Wrap a store error.
    pub fn persistence(id: AlarmId, source: impl Into<BoxError>) -> Self {
        Self::PersistenceFailure {
            id,
            source: source.into(),
        }
    }

    /// The alarm this error concerns, if it concerns a single one.
    pub fn alarm_id(&self) -> Option<AlarmId> {
        match self {
            Self::InvalidDefinition { id, .. }
            | Self::PersistenceFailure { id, .. }
            | Self::TimerRegistrationFailure { id, .. }
            | Self::InstantInPast { id, .. }
            | Self::SnoozeUnavailable { id, .. } => Some(*id),
            Self::AlarmNotFound(id) | Self::AlarmDisabled(id) => Some(*id),
            Self::LoadFailed { .. } => None,
        }
    }
}

/// Errors reported by a [`PlatformTimer`](crate::PlatformTimer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TimerError {
    /// The platform refused to register an exact timer.
    #[error("Exact timer permission denied")]
    PermissionDenied,

    /// The platform limit on pending timers was reached.
    #[error("Timer limit reached ({0} pending)")]
    LimitReached(usize),

    /// The timer backend is not running.
    #[error("Timer backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias using rooster-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_definition(AlarmId(4), "After requires a solar anchor");
        assert_eq!(
            err.to_string(),
            "Invalid definition for alarm 4: After requires a solar anchor"
        );

        let err = Error::SnoozeUnavailable {
            id: AlarmId(2),
            remaining: 0,
        };
        assert_eq!(
            err.to_string(),
            "Snooze unavailable for alarm 2 (0 snoozes left)"
        );
    }

    #[test]
    fn test_persistence_wraps_source() {
        let err = Error::persistence(AlarmId(9), "disk full");
        assert!(matches!(err, Error::PersistenceFailure { .. }));
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_timer_error_source() {
        let err = Error::TimerRegistrationFailure {
            id: AlarmId(1),
            source: TimerError::LimitReached(500),
        };
        assert_eq!(
            err.to_string(),
            "Failed to arm timer for alarm 1: Timer limit reached (500 pending)"
        );
    }

    #[test]
    fn test_alarm_id() {
        assert_eq!(Error::AlarmNotFound(AlarmId(7)).alarm_id(), Some(AlarmId(7)));
        assert_eq!(
            Error::persistence(AlarmId(3), "x").alarm_id(),
            Some(AlarmId(3))
        );
        let err = Error::LoadFailed {
            source: "locked".into(),
        };
        assert_eq!(err.alarm_id(), None);
    }
}
