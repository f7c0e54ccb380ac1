//! Error types for data parsing in rooster-types.

use thiserror::Error;

/// Errors that can occur when parsing persisted alarm or astronomy data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The alarm mode string is not one of `At`, `Between`, `After`, `Before`.
    #[error("Unknown alarm mode: {0}")]
    UnknownMode(String),

    /// The anchor string names neither a solar event nor the fixed-time sentinel.
    #[error("Unknown anchor: {0}")]
    UnknownAnchor(String),

    /// An epoch-millisecond value cannot be represented as a calendar instant.
    #[error("Instant out of range: {0} ms")]
    InstantOutOfRange(i64),

    /// Generic malformed data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using rooster-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
