//! Error types for rooster-service.

use rooster_core::AstronomyIssue;

use crate::config::ConfigError;

/// Result type for rooster-service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while wiring up or running the service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] rooster_store::Error),

    #[error("Scheduling error: {0}")]
    Schedule(#[from] rooster_core::Error),

    #[error("Astronomy fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Errors from fetching astronomy data.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("API returned HTTP {0}")]
    Status(u16),

    /// The response body reported a status other than `OK`.
    #[error("API reported status '{0}'")]
    Api(String),

    /// The response body could not be interpreted.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The data parsed but is not internally consistent.
    #[error("Fetched data failed validation: {}", format_issues(.0))]
    Invalid(Vec<AstronomyIssue>),

    /// No usable location is configured.
    #[error("No valid location configured")]
    NoLocation,
}

fn format_issues(issues: &[AstronomyIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
