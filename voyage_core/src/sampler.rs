use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rand::{seq::index, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    geodesy::{interpolate, GeoPoint},
    ports::{Port, PortRegistry},
    profile::FetchProfile,
};

/// One candidate voyage. Route points follow the profile's fraction order,
/// which is also the priority order used during assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSample {
    pub origin: Port,
    pub destination: Port,
    pub departure: NaiveDate,
    pub points: Vec<GeoPoint>,
}

/// Draws route samples from a port registry with a run-seeded RNG, so the
/// sequence of draws is reproducible for a given seed.
pub struct SampleGenerator {
    ports: Arc<PortRegistry>,
    start_date: NaiveDate,
    span_days: u64,
    rng: ChaCha8Rng,
}

impl SampleGenerator {
    /// `start_date..=end_date` is the departure range; an inverted range
    /// collapses to `start_date`.
    pub fn new(
        ports: Arc<PortRegistry>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        seed: u64,
    ) -> Self {
        let span_days = end_date
            .signed_duration_since(start_date)
            .num_days()
            .max(0) as u64;
        Self {
            ports,
            start_date,
            span_days,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn draw(&mut self, profile: &FetchProfile) -> RouteSample {
        // Two distinct indices without replacement; the registry guarantees len >= 2.
        let picked = index::sample(&mut self.rng, self.ports.len(), 2);
        let origin = self.ports.ports()[picked.index(0)].clone();
        let destination = self.ports.ports()[picked.index(1)].clone();

        let offset = self.rng.gen_range(0..=self.span_days);
        let departure = self
            .start_date
            .checked_add_days(Days::new(offset))
            .unwrap_or(self.start_date);

        let from = origin.location();
        let to = destination.location();
        let points = profile
            .fractions
            .iter()
            .map(|&fraction| interpolate(from, to, fraction))
            .collect();

        RouteSample {
            origin,
            destination,
            departure,
            points,
        }
    }

    pub fn draw_batch(&mut self, profile: &FetchProfile, count: usize) -> Vec<RouteSample> {
        (0..count).map(|_| self.draw(profile)).collect()
    }
}
