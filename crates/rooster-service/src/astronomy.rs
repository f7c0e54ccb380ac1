//! Fetching solar event data from a sunrise-sunset style HTTP API.

use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use rooster_core::validation::validate_location;
use rooster_core::{AstronomyData, Location, validate_astronomy};
use rooster_types::{MILLIS_PER_SECOND, millis_from_datetime};

use crate::config::AstronomyConfig;
use crate::error::FetchError;
use crate::retry::{RetryConfig, with_retry};
use crate::state::AppState;

/// The API reports events that do not occur on a given day (polar day or
/// night) as instants at or just after the Unix epoch.
const ABSENT_EVENT_MS: i64 = MILLIS_PER_SECOND;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    results: Option<ApiResults>,
}

#[derive(Debug, Deserialize)]
struct ApiResults {
    sunrise: String,
    sunset: String,
    solar_noon: String,
    day_length: Option<i64>,
    civil_twilight_begin: String,
    civil_twilight_end: String,
    nautical_twilight_begin: String,
    nautical_twilight_end: String,
    astronomical_twilight_begin: String,
    astronomical_twilight_end: String,
}

/// Parse and validate an API response body.
///
/// `now_ms` becomes the record's `last_updated`. Missing `day_length` is
/// derived from sunrise and sunset.
pub fn parse_response(
    body: &str,
    location: Location,
    now_ms: i64,
) -> Result<AstronomyData, FetchError> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    if response.status != "OK" {
        return Err(FetchError::Api(response.status));
    }
    let results = response
        .results
        .ok_or_else(|| FetchError::Malformed("missing results".to_string()))?;

    let sunrise = parse_instant(&results.sunrise)?;
    let sunset = parse_instant(&results.sunset)?;
    let day_length = match results.day_length {
        Some(secs) => secs.saturating_mul(MILLIS_PER_SECOND),
        None => sunset - sunrise,
    };

    let data = AstronomyData {
        location,
        sunrise,
        sunset,
        solar_noon: parse_instant(&results.solar_noon)?,
        civil_dawn: parse_instant(&results.civil_twilight_begin)?,
        civil_dusk: parse_instant(&results.civil_twilight_end)?,
        nautical_dawn: parse_instant(&results.nautical_twilight_begin)?,
        nautical_dusk: parse_instant(&results.nautical_twilight_end)?,
        astro_dawn: parse_instant(&results.astronomical_twilight_begin)?,
        astro_dusk: parse_instant(&results.astronomical_twilight_end)?,
        last_updated: now_ms,
        day_length,
    };

    let validation = validate_astronomy(&data);
    if !validation.is_valid() {
        return Err(FetchError::Invalid(validation.issues));
    }
    Ok(data)
}

/// RFC 3339 instant to epoch milliseconds, with 0 for absent events.
fn parse_instant(value: &str) -> Result<i64, FetchError> {
    let instant = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| FetchError::Malformed(format!("bad instant '{}': {}", value, e)))?;
    let ms = millis_from_datetime(instant);
    Ok(if ms <= ABSENT_EVENT_MS { 0 } else { ms })
}

/// HTTP client for the astronomy API.
#[derive(Debug, Clone)]
pub struct AstronomyFetcher {
    client: reqwest::Client,
    api_url: String,
    retry: RetryConfig,
}

impl AstronomyFetcher {
    pub fn new(config: &AstronomyConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("rooster/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            retry: config.retry(),
        })
    }

    /// Fetch and validate today's data for `location`, retrying transient
    /// failures.
    pub async fn fetch(&self, location: Location) -> Result<AstronomyData, FetchError> {
        validate_location(&location).map_err(|_| FetchError::NoLocation)?;
        if location.is_unset() {
            return Err(FetchError::NoLocation);
        }
        with_retry(&self.retry, "Astronomy fetch", || self.fetch_once(location)).await
    }

    async fn fetch_once(&self, location: Location) -> Result<AstronomyData, FetchError> {
        debug!(
            "Requesting astronomy data for {}, {}",
            location.latitude, location.longitude
        );
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lng", location.longitude.to_string()),
                ("formatted", "0".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_response(&body, location, millis_from_datetime(OffsetDateTime::now_utc()))
    }
}

/// Outcome of a refresh attempt.
#[derive(Debug)]
pub enum AstronomyDataResult {
    /// New data was fetched, stored and published.
    Fresh(Arc<AstronomyData>),
    /// The fetch failed; previously cached data remains in use.
    Cached {
        data: Arc<AstronomyData>,
        stale: bool,
        age: time::Duration,
    },
    /// The fetch failed and nothing is cached.
    Failure(FetchError),
}

/// Fetch data for `location`, persist it, and swap it into the shared cache.
///
/// On failure the cached snapshot is reported together with its age.
pub async fn refresh(state: &AppState, location: Location) -> AstronomyDataResult {
    match state.fetcher.fetch(location).await {
        Ok(data) => {
            if let Err(e) = state.store.lock().await.save_astronomy(&data) {
                warn!("Failed to persist astronomy data: {}", e);
            }
            let data = state.astronomy.replace(data);
            info!(
                "Astronomy data refreshed (sunrise {}, sunset {})",
                data.sunrise, data.sunset
            );
            AstronomyDataResult::Fresh(data)
        }
        Err(e) => {
            warn!("Astronomy refresh failed: {}", e);
            state.astronomy.refresh_failed();
            fallback(state, e)
        }
    }
}

fn fallback(state: &AppState, error: FetchError) -> AstronomyDataResult {
    let Some(data) = state.astronomy.current() else {
        return AstronomyDataResult::Failure(error);
    };
    let now_ms = millis_from_datetime(OffsetDateTime::now_utc());
    let max_age_ms =
        i64::try_from(state.config.scheduler.astronomy_max_age.saturating_mul(1000))
            .unwrap_or(i64::MAX);
    let stale = data.is_stale(now_ms, max_age_ms);
    let age = time::Duration::milliseconds(data.age_ms(now_ms));
    AstronomyDataResult::Cached { data, stale, age }
}
