//! Write-once observation store shared by the prefetch workers.
//!
//! Keys are quantized to two decimal places of latitude/longitude (~1.1 km),
//! so nearby route points and repeated dates collapse onto one remote query.
//! A resolved key holds either an observation or an explicit absent marker;
//! both block re-querying for the rest of the run.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use chrono::{Days, NaiveDate};
use parking_lot::Mutex;

use crate::geodesy::{normalize_lon, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherObservation {
    pub max_wind_knots: f64,
    pub rain_mm: f64,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarineObservation {
    pub max_wave_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Weather(WeatherObservation),
    Marine(MarineObservation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObservationKind {
    Weather,
    Marine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateSpan {
    Day(NaiveDate),
    Window { start: NaiveDate, end: NaiveDate },
}

/// Cache identity of one remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuantizedKey {
    kind: ObservationKind,
    lat_e2: i32,
    lon_e2: i32,
    span: DateSpan,
}

fn quantize(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

impl QuantizedKey {
    pub fn weather(point: GeoPoint, date: NaiveDate) -> Self {
        Self {
            kind: ObservationKind::Weather,
            lat_e2: quantize(point.lat),
            lon_e2: quantize(point.lon),
            span: DateSpan::Day(date),
        }
    }

    /// Marine key for the `2 * half_window + 1` day range centred on `center`.
    pub fn marine(point: GeoPoint, center: NaiveDate, half_window: u32) -> Self {
        let days = Days::new(u64::from(half_window));
        let start = center.checked_sub_days(days).unwrap_or(center);
        let end = center.checked_add_days(days).unwrap_or(center);
        Self {
            kind: ObservationKind::Marine,
            lat_e2: quantize(point.lat),
            lon_e2: quantize(point.lon),
            span: DateSpan::Window { start, end },
        }
    }

    pub fn kind(&self) -> ObservationKind {
        self.kind
    }

    pub fn span(&self) -> DateSpan {
        self.span
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.lat_e2) / 100.0
    }

    pub fn lon(&self) -> f64 {
        f64::from(self.lon_e2) / 100.0
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat(), self.lon())
    }

    /// Centre date and half-width of a marine window.
    pub fn window(&self) -> Option<(NaiveDate, u32)> {
        match self.span {
            DateSpan::Window { start, end } => {
                let half = (end - start).num_days().max(0) / 2;
                let center = start
                    .checked_add_days(Days::new(half as u64))
                    .unwrap_or(start);
                Some((center, half as u32))
            }
            DateSpan::Day(_) => None,
        }
    }

    /// Same kind and dates, different cell.
    pub fn relocated(&self, point: GeoPoint) -> Self {
        Self {
            lat_e2: quantize(point.lat),
            lon_e2: quantize(point.lon),
            ..*self
        }
    }

    /// The open-water retry cell: `push_deg` further east, wrapped at the
    /// antimeridian. `None` for weather keys or when the push stays in the
    /// same cell.
    pub fn sea_pushed(&self, push_deg: f64) -> Option<Self> {
        if self.kind != ObservationKind::Marine {
            return None;
        }
        let east = normalize_lon(self.lon() + push_deg);
        let pushed = self.relocated(GeoPoint::new(self.lat(), east));
        (pushed != *self).then_some(pushed)
    }
}

/// Three-valued cache answer. `Absent` means "queried, nothing found" and is
/// distinct from `NotPresent` ("never queried").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheLookup {
    Present(Observation),
    Absent,
    NotPresent,
}

type Cell = Arc<OnceLock<Option<Observation>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub present: usize,
    pub absent: usize,
    pub pending: usize,
}

impl CacheStats {
    pub fn resolved(&self) -> usize {
        self.present + self.absent
    }
}

/// Concurrency-safe, append-only map from [`QuantizedKey`] to a resolved
/// observation. Lives for one run; never evicts.
#[derive(Debug, Default)]
pub struct ObservationCache {
    cells: Mutex<HashMap<QuantizedKey, Cell>>,
}

impl ObservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: QuantizedKey) -> Cell {
        let mut cells = self.cells.lock();
        Arc::clone(cells.entry(key).or_default())
    }

    pub fn get(&self, key: &QuantizedKey) -> CacheLookup {
        let cell = {
            let cells = self.cells.lock();
            match cells.get(key) {
                Some(cell) => Arc::clone(cell),
                None => return CacheLookup::NotPresent,
            }
        };
        match cell.get() {
            Some(Some(observation)) => CacheLookup::Present(*observation),
            Some(None) => CacheLookup::Absent,
            None => CacheLookup::NotPresent,
        }
    }

    pub fn is_resolved(&self, key: &QuantizedKey) -> bool {
        !matches!(self.get(key), CacheLookup::NotPresent)
    }

    /// Records a result. The first writer wins; returns `false` when the key was
    /// already resolved and the value was dropped.
    pub fn put(&self, key: QuantizedKey, value: Option<Observation>) -> bool {
        self.cell(key).set(value).is_ok()
    }

    /// Returns the value for `key`, running `resolve` only if no other caller has
    /// resolved (or is resolving) it. Concurrent callers for the same key block
    /// until the single resolution finishes. The flag reports whether this call
    /// ran `resolve`.
    pub fn resolve_with<F>(&self, key: QuantizedKey, resolve: F) -> (Option<Observation>, bool)
    where
        F: FnOnce() -> Option<Observation>,
    {
        let cell = self.cell(key);
        let mut ran = false;
        let value = *cell.get_or_init(|| {
            ran = true;
            resolve()
        });
        (value, ran)
    }

    pub fn weather(&self, key: &QuantizedKey) -> Option<WeatherObservation> {
        match self.get(key) {
            CacheLookup::Present(Observation::Weather(weather)) => Some(weather),
            _ => None,
        }
    }

    pub fn marine(&self, key: &QuantizedKey) -> Option<MarineObservation> {
        match self.get(key) {
            CacheLookup::Present(Observation::Marine(marine)) => Some(marine),
            _ => None,
        }
    }

    /// Marine observation for `key`, or for its open-water retry cell when the
    /// primary cell resolved absent.
    pub fn marine_or_pushed(&self, key: &QuantizedKey, push_deg: f64) -> Option<MarineObservation> {
        match self.get(key) {
            CacheLookup::Present(Observation::Marine(marine)) => Some(marine),
            CacheLookup::Absent => key
                .sea_pushed(push_deg)
                .and_then(|pushed| self.marine(&pushed)),
            _ => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let cells = self.cells.lock();
        let mut stats = CacheStats::default();
        for cell in cells.values() {
            match cell.get() {
                Some(Some(_)) => stats.present += 1,
                Some(None) => stats.absent += 1,
                None => stats.pending += 1,
            }
        }
        stats
    }
}
