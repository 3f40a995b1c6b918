use std::{
    sync::atomic::{AtomicU64, Ordering},
    thread,
    time::Duration,
};

use chrono::{Days, NaiveDate};
use reqwest::{
    blocking::{Client, Response},
    header::RETRY_AFTER,
    StatusCode,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    cache::{MarineObservation, WeatherObservation},
    config::HttpConfig,
    geodesy::GeoPoint,
};

/// The archive API reports wind in km/h; rows carry knots.
pub const KMH_TO_KNOTS: f64 = 0.54;

const WEATHER_DAILY_FIELDS: &str = "wind_speed_10m_max,precipitation_sum,temperature_2m_max";
const MARINE_DAILY_FIELDS: &str = "wave_height_max";
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Remote observation provider. `None` is a normal answer meaning "no usable
/// data"; implementations never surface transport failures to the caller.
pub trait ObservationSource: Send + Sync {
    fn fetch_weather(&self, point: GeoPoint, date: NaiveDate) -> Option<WeatherObservation>;

    /// First non-null wave height in the `2 * half_window + 1` day range
    /// centred on `center`.
    fn fetch_marine(
        &self,
        point: GeoPoint,
        center: NaiveDate,
        half_window: u32,
    ) -> Option<MarineObservation>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Default)]
struct ClientCounters {
    requests: AtomicU64,
    retries: AtomicU64,
    absent: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    pub retries: u64,
    pub absent: u64,
}

/// Open-Meteo archive + marine client over a pooled blocking transport.
pub struct OpenMeteoClient {
    http: Client,
    config: HttpConfig,
    counters: ClientCounters,
}

impl OpenMeteoClient {
    pub fn new(config: &HttpConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_size)
            .gzip(true)
            .user_agent(concat!("voyage_core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            counters: ClientCounters::default(),
        })
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            absent: self.counters.absent.load(Ordering::Relaxed),
        }
    }

    /// Body of the first successful response, across the top-level attempts.
    fn get_body(&self, url: &str, query: &[(&str, String)]) -> Option<String> {
        let attempts = self.config.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(body) = self.send_with_retry(url, query) {
                return Some(body);
            }
            if attempt < attempts {
                thread::sleep(self.config.attempt_pause());
            }
        }
        None
    }

    /// One logical request with transport-level retries on transient failures.
    fn send_with_retry(&self, url: &str, query: &[(&str, String)]) -> Option<String> {
        let mut retries_used = 0u32;
        loop {
            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            let outcome = self.http.get(url).query(query).send();
            let spacing = self.config.request_spacing();
            if !spacing.is_zero() {
                thread::sleep(spacing);
            }

            let wait = match outcome {
                Ok(response) if response.status() == StatusCode::OK => {
                    return match response.text() {
                        Ok(body) => Some(body),
                        Err(err) => {
                            debug!(
                                target: "voyage::client",
                                %url,
                                error = %err,
                                "request.body_failed"
                            );
                            None
                        }
                    };
                }
                Ok(response) => {
                    let status = response.status();
                    if !self.is_retryable(status) || retries_used >= self.config.retries {
                        debug!(
                            target: "voyage::client",
                            %url,
                            status = status.as_u16(),
                            "request.rejected"
                        );
                        return None;
                    }
                    retry_after(&response).unwrap_or_else(|| {
                        backoff_delay(self.config.backoff_factor, retries_used + 1)
                    })
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect() || err.is_request();
                    if !transient || retries_used >= self.config.retries {
                        debug!(target: "voyage::client", %url, error = %err, "request.failed");
                        return None;
                    }
                    backoff_delay(self.config.backoff_factor, retries_used + 1)
                }
            };

            retries_used += 1;
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            thread::sleep(wait);
        }
    }

    fn is_retryable(&self, status: StatusCode) -> bool {
        self.config.retry_statuses.contains(&status.as_u16())
    }

    fn record<T>(&self, result: Option<T>) -> Option<T> {
        if result.is_none() {
            self.counters.absent.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl ObservationSource for OpenMeteoClient {
    fn fetch_weather(&self, point: GeoPoint, date: NaiveDate) -> Option<WeatherObservation> {
        let day = date.to_string();
        let query = [
            ("latitude", format!("{:.2}", point.lat)),
            ("longitude", format!("{:.2}", point.lon)),
            ("start_date", day.clone()),
            ("end_date", day),
            ("daily", WEATHER_DAILY_FIELDS.to_string()),
            ("timezone", "UTC".to_string()),
        ];
        let observation = self
            .get_body(&self.config.weather_url, &query)
            .and_then(|body| parse_weather_body(&body));
        self.record(observation)
    }

    fn fetch_marine(
        &self,
        point: GeoPoint,
        center: NaiveDate,
        half_window: u32,
    ) -> Option<MarineObservation> {
        let days = Days::new(u64::from(half_window));
        let start = center.checked_sub_days(days).unwrap_or(center);
        let end = center.checked_add_days(days).unwrap_or(center);
        let query = [
            ("latitude", format!("{:.2}", point.lat)),
            ("longitude", format!("{:.2}", point.lon)),
            ("start_date", start.to_string()),
            ("end_date", end.to_string()),
            ("daily", MARINE_DAILY_FIELDS.to_string()),
            ("timezone", "UTC".to_string()),
        ];
        let observation = self
            .get_body(&self.config.marine_url, &query)
            .and_then(|body| parse_marine_body(&body));
        self.record(observation)
    }
}

/// `factor * 2^(n-1)` for the n-th retry.
pub fn backoff_delay(factor: f64, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(16) as i32;
    Duration::from_secs_f64((factor * 2f64.powi(exponent)).max(0.0))
}

fn retry_after(response: &Response) -> Option<Duration> {
    let status = response.status();
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

/// Numeric `Retry-After` values only; HTTP-date forms fall back to backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

#[derive(Debug, Deserialize)]
struct DailyEnvelope<T> {
    daily: Option<T>,
}

#[derive(Debug, Deserialize)]
struct WeatherDaily {
    wind_speed_10m_max: Option<Vec<Option<f64>>>,
    precipitation_sum: Option<Vec<Option<f64>>>,
    temperature_2m_max: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct MarineDaily {
    wave_height_max: Option<Vec<Option<f64>>>,
}

fn first_day(series: Option<Vec<Option<f64>>>) -> Option<f64> {
    series?.into_iter().next().flatten()
}

/// Parses a single-day archive response. Any missing series or null value
/// makes the whole observation absent.
pub fn parse_weather_body(body: &str) -> Option<WeatherObservation> {
    let envelope: DailyEnvelope<WeatherDaily> = serde_json::from_str(body).ok()?;
    let daily = envelope.daily?;
    Some(WeatherObservation {
        max_wind_knots: first_day(daily.wind_speed_10m_max)? * KMH_TO_KNOTS,
        rain_mm: first_day(daily.precipitation_sum)?,
        temp_c: first_day(daily.temperature_2m_max)?,
    })
}

/// Takes the first non-null wave height of the returned series.
pub fn parse_marine_body(body: &str) -> Option<MarineObservation> {
    let envelope: DailyEnvelope<MarineDaily> = serde_json::from_str(body).ok()?;
    let max_wave_m = envelope
        .daily?
        .wave_height_max?
        .into_iter()
        .flatten()
        .next()?;
    Some(MarineObservation { max_wave_m })
}
