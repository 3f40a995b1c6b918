use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::profile::{EscalationSchedule, FetchProfile};

pub const BUILTIN_PIPELINE_CONFIG: &str = include_str!("data/pipeline_config.json");

/// Run parameters for one dataset build. Every field has a default so partial
/// JSON files are valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_rows: u64,
    pub batch_size: usize,
    pub max_passes: u32,
    /// Overall cap on batches across every pass, on top of `max_passes`.
    pub max_batches: Option<u64>,
    pub workers: usize,
    pub seed: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_path: PathBuf,
    pub checkpoint_interval: u64,
    /// Eastward longitude push for the marine open-water retry.
    pub sea_push_deg: f64,
    pub profiles: Vec<FetchProfile>,
    pub http: HttpConfig,
    pub synthetic: SyntheticConfig,
    pub delay: DelayModelConfig,
}

impl PipelineConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_PIPELINE_CONFIG)
                .expect("builtin pipeline config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = PipelineConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn schedule(&self) -> EscalationSchedule {
        EscalationSchedule::new(self.profiles.clone())
    }

    /// Rejects configurations that could never make progress. Runs before any
    /// remote call is issued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_rows == 0 {
            return Err(ConfigError::Invalid("target_rows must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be positive".into()));
        }
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid("max_passes must be positive".into()));
        }
        if self.max_batches == Some(0) {
            return Err(ConfigError::Invalid("max_batches must be positive when set".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint_interval must be positive".into(),
            ));
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if !self.sea_push_deg.is_finite() {
            return Err(ConfigError::Invalid("sea_push_deg must be finite".into()));
        }
        if self.schedule().is_empty() {
            return Err(ConfigError::Invalid(
                "escalation schedule needs at least one profile".into(),
            ));
        }
        for (index, profile) in self.profiles.iter().enumerate() {
            if profile.fractions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "profile {index} has no route fractions"
                )));
            }
            if let Some(bad) = profile
                .fractions
                .iter()
                .find(|f| !f.is_finite() || **f < 0.0 || **f > 1.0)
            {
                return Err(ConfigError::Invalid(format!(
                    "profile {index} fraction {bad} is outside [0, 1]"
                )));
            }
        }
        self.http.validate()?;
        self.synthetic.validate()?;
        self.delay.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let schedule = EscalationSchedule::cross(
            &[2, 3, 4],
            &[vec![0.5], vec![0.4, 0.7], vec![0.3, 0.5, 0.7]],
        );
        Self {
            target_rows: 10_000,
            batch_size: 5_000,
            max_passes: 50,
            max_batches: None,
            workers: 32,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid default start date"),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid default end date"),
            output_path: PathBuf::from("maritime_delays.csv"),
            checkpoint_interval: 500,
            sea_push_deg: 0.2,
            profiles: schedule.iter().cloned().collect(),
            http: HttpConfig::default(),
            synthetic: SyntheticConfig::default(),
            delay: DelayModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub weather_url: String,
    pub marine_url: String,
    /// Idle connections kept per host.
    pub pool_size: usize,
    pub timeout_secs: f64,
    /// Transport-level retries for retryable statuses and connection errors.
    pub retries: u32,
    /// Base of the exponential backoff between transport retries, in seconds.
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
    /// Top-level attempts before a query is declared absent.
    pub attempts: u32,
    pub attempt_pause_ms: u64,
    /// Optional pause after every remote call.
    pub request_spacing_ms: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn attempt_pause(&self) -> Duration {
        Duration::from_millis(self.attempt_pause_ms)
    }

    pub fn request_spacing(&self) -> Duration {
        Duration::from_millis(self.request_spacing_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be positive".into(),
            ));
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor >= 0.0) {
            return Err(ConfigError::Invalid(
                "http.backoff_factor must be non-negative".into(),
            ));
        }
        if self.retry_statuses.is_empty() {
            return Err(ConfigError::Invalid(
                "http.retry_statuses must not be empty".into(),
            ));
        }
        if self.attempts == 0 {
            return Err(ConfigError::Invalid("http.attempts must be positive".into()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("http.pool_size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            weather_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            marine_url: "https://marine-api.open-meteo.com/v1/marine".to_string(),
            pool_size: 100,
            timeout_secs: 8.0,
            retries: 3,
            backoff_factor: 0.2,
            retry_statuses: vec![429, 500, 502, 503, 504],
            attempts: 2,
            attempt_pause_ms: 300,
            request_spacing_ms: 0,
        }
    }
}

/// Ranges for the filler covariates attached to every row.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Exclusive upper bound for queue depths.
    pub queue_max: u32,
    pub congestion_min: f64,
    pub congestion_max: f64,
    pub visibility_base_km: f64,
    pub visibility_rain_slope: f64,
    pub visibility_noise_sd: f64,
    pub visibility_floor_km: f64,
}

impl SyntheticConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_max == 0 {
            return Err(ConfigError::Invalid(
                "synthetic.queue_max must be positive".into(),
            ));
        }
        if !(self.congestion_min < self.congestion_max) {
            return Err(ConfigError::Invalid(
                "synthetic congestion range is empty".into(),
            ));
        }
        if !(self.visibility_noise_sd.is_finite() && self.visibility_noise_sd >= 0.0) {
            return Err(ConfigError::Invalid(
                "synthetic.visibility_noise_sd must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            queue_max: 8,
            congestion_min: 0.2,
            congestion_max: 1.2,
            visibility_base_km: 18.0,
            visibility_rain_slope: 0.4,
            visibility_noise_sd: 1.2,
            visibility_floor_km: 2.0,
        }
    }
}

/// Coefficients of the delay label.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelayModelConfig {
    pub wind: f64,
    pub rain: f64,
    pub wave: f64,
    pub congestion: f64,
    pub origin_queue: f64,
    pub dest_queue: f64,
    pub noise_mean: f64,
    pub noise_sd: f64,
}

impl DelayModelConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.noise_sd.is_finite() && self.noise_sd >= 0.0) {
            return Err(ConfigError::Invalid(
                "delay.noise_sd must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DelayModelConfig {
    fn default() -> Self {
        Self {
            wind: 0.22,
            rain: 0.12,
            wave: 1.05,
            congestion: 0.55,
            origin_queue: 0.30,
            dest_queue: 0.30,
            noise_mean: 1.2,
            noise_sd: 1.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse pipeline config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read pipeline config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid pipeline config: {0}")]
    Invalid(String),
}

/// Resolves the config from `explicit`, then `VOYAGE_CONFIG_PATH`, then the
/// builtin defaults. Returns the path actually used, if any.
pub fn load_pipeline_config_from_env(
    explicit: Option<&Path>,
) -> (Arc<PipelineConfig>, Option<PathBuf>) {
    let override_path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var("VOYAGE_CONFIG_PATH").ok().map(PathBuf::from));

    if let Some(path) = override_path {
        match PipelineConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "voyage::config",
                    path = %path.display(),
                    "pipeline_config.loaded=file"
                );
                return (Arc::new(config), Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "voyage::config",
                    path = %path.display(),
                    error = %err,
                    "pipeline_config.load_failed"
                );
            }
        }
    }

    let config = PipelineConfig::builtin();
    tracing::info!(target: "voyage::config", "pipeline_config.loaded=builtin");
    (config, None)
}
