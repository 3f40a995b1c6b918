#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use chrono::NaiveDate;
use parking_lot::Mutex;
use voyage_core::{
    GeoPoint, MarineObservation, ObservationSource, PipelineConfig, Port, PortRegistry,
    WeatherObservation,
};

static INIT: Once = Once::new();

pub fn fixture_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_pipeline_config.json")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_config_path();

        debug_assert!(
            config_path.exists(),
            "missing test pipeline config at {}",
            config_path.display()
        );

        std::env::set_var("VOYAGE_CONFIG_PATH", &config_path);
    });
}

/// Longitude offset putting two equatorial ports 1000 km apart.
pub const THOUSAND_KM_LON: f64 = 8.993_216;

pub fn two_port_registry() -> Arc<PortRegistry> {
    Arc::new(
        PortRegistry::from_ports(vec![
            Port::new("Equator West", 0.0, 0.0),
            Port::new("Equator East", 0.0, THOUSAND_KM_LON),
        ])
        .expect("two distinct ports"),
    )
}

pub fn small_config(target_rows: u64) -> PipelineConfig {
    PipelineConfig {
        target_rows,
        batch_size: 20,
        max_passes: 2,
        workers: 4,
        seed: 7,
        start_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        checkpoint_interval: 10,
        ..PipelineConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarineCoverage {
    Everywhere,
    Nowhere,
    /// Only cells at or east of this longitude (e2 units) have wave data.
    EastOf(i64),
}

/// Deterministic in-process observation source that records every call.
pub struct StubSource {
    coverage: MarineCoverage,
    calls: Mutex<HashMap<String, usize>>,
}

impl StubSource {
    pub fn new(coverage: MarineCoverage) -> Arc<Self> {
        Arc::new(Self {
            coverage,
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn always_valid() -> Arc<Self> {
        Self::new(MarineCoverage::Everywhere)
    }

    pub fn marine_absent() -> Arc<Self> {
        Self::new(MarineCoverage::Nowhere)
    }

    fn record(&self, call: String) {
        *self.calls.lock().entry(call).or_default() += 1;
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Highest number of times any single query was issued.
    pub fn max_repeats(&self) -> usize {
        self.calls.lock().values().copied().max().unwrap_or(0)
    }

    pub fn marine_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(call, _)| call.starts_with("marine"))
            .map(|(_, count)| count)
            .sum()
    }
}

fn cell(point: GeoPoint) -> (i64, i64) {
    (
        (point.lat * 100.0).round() as i64,
        (point.lon * 100.0).round() as i64,
    )
}

impl ObservationSource for StubSource {
    fn fetch_weather(&self, point: GeoPoint, date: NaiveDate) -> Option<WeatherObservation> {
        let (lat, lon) = cell(point);
        self.record(format!("weather:{lat}:{lon}:{date}"));
        Some(WeatherObservation {
            max_wind_knots: 10.0 + (lon.rem_euclid(7)) as f64,
            rain_mm: 1.0,
            temp_c: 26.0,
        })
    }

    fn fetch_marine(
        &self,
        point: GeoPoint,
        center: NaiveDate,
        half_window: u32,
    ) -> Option<MarineObservation> {
        let (lat, lon) = cell(point);
        self.record(format!("marine:{lat}:{lon}:{center}:{half_window}"));
        let covered = match self.coverage {
            MarineCoverage::Everywhere => true,
            MarineCoverage::Nowhere => false,
            MarineCoverage::EastOf(limit) => lon >= limit,
        };
        covered.then_some(MarineObservation { max_wave_m: 1.8 })
    }
}
