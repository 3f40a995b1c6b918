use std::sync::Arc;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use voyage_schema::VoyageRow;

use crate::{
    cache::{MarineObservation, ObservationCache, WeatherObservation},
    config::{ConfigError, DelayModelConfig, SyntheticConfig},
    geodesy::haversine_km,
    prefetch::point_keys,
    profile::FetchProfile,
    sampler::RouteSample,
};

/// Turns a resolved sample into a finished row.
///
/// Reads the cache only; never triggers a remote call. Randomness comes from
/// the caller's RNG so the controller owns the draw sequence.
pub struct RowAssembler {
    cache: Arc<ObservationCache>,
    synthetic: SyntheticConfig,
    delay: DelayModelConfig,
    sea_push_deg: f64,
    visibility_noise: Normal<f64>,
    delay_noise: Normal<f64>,
}

impl RowAssembler {
    pub fn new(
        cache: Arc<ObservationCache>,
        synthetic: SyntheticConfig,
        delay: DelayModelConfig,
        sea_push_deg: f64,
    ) -> Result<Self, ConfigError> {
        synthetic.validate()?;
        delay.validate()?;
        let visibility_noise = Normal::new(0.0, synthetic.visibility_noise_sd)
            .map_err(|err| ConfigError::Invalid(format!("visibility noise: {err}")))?;
        let delay_noise = Normal::new(delay.noise_mean, delay.noise_sd)
            .map_err(|err| ConfigError::Invalid(format!("delay noise: {err}")))?;
        Ok(Self {
            cache,
            synthetic,
            delay,
            sea_push_deg,
            visibility_noise,
            delay_noise,
        })
    }

    /// First route point (in fraction order) with both observations cached.
    pub fn first_resolved_point(
        &self,
        sample: &RouteSample,
        profile: &FetchProfile,
    ) -> Option<(WeatherObservation, MarineObservation)> {
        (0..sample.points.len()).find_map(|index| {
            let (weather_key, marine_key) = point_keys(sample, index, profile)?;
            let marine = self.cache.marine_or_pushed(&marine_key, self.sea_push_deg)?;
            let weather = self.cache.weather(&weather_key)?;
            Some((weather, marine))
        })
    }

    /// Builds the row for `sample`, or `None` when no route point resolved.
    /// Consumes randomness only when a row is produced.
    pub fn assemble<R: Rng>(
        &self,
        sample: &RouteSample,
        profile: &FetchProfile,
        rng: &mut R,
    ) -> Option<VoyageRow> {
        let (weather, marine) = self.first_resolved_point(sample, profile)?;

        let origin_queue = rng.gen_range(0..self.synthetic.queue_max);
        let dest_queue = rng.gen_range(0..self.synthetic.queue_max);
        let congestion =
            rng.gen_range(self.synthetic.congestion_min..self.synthetic.congestion_max);

        let visibility = (self.synthetic.visibility_base_km
            - self.synthetic.visibility_rain_slope * weather.rain_mm
            + self.visibility_noise.sample(rng))
        .max(self.synthetic.visibility_floor_km);

        let d = &self.delay;
        let delay_hours = (d.wind * weather.max_wind_knots
            + d.rain * weather.rain_mm
            + d.wave * marine.max_wave_m
            + d.congestion * congestion
            + d.origin_queue * f64::from(origin_queue)
            + d.dest_queue * f64::from(dest_queue)
            + self.delay_noise.sample(rng))
        .max(0.0);

        let (month, season) = VoyageRow::calendar_fields(sample.departure);
        Some(VoyageRow {
            port_origin: sample.origin.name.clone(),
            port_dest: sample.destination.name.clone(),
            lat_o: sample.origin.latitude,
            lon_o: sample.origin.longitude,
            lat_d: sample.destination.latitude,
            lon_d: sample.destination.longitude,
            gc_distance_km: haversine_km(sample.origin.location(), sample.destination.location()),
            departure_date: sample.departure,
            avg_wind_knots: weather.max_wind_knots,
            rain_mm: weather.rain_mm,
            temp_c: weather.temp_c,
            max_wave_m: marine.max_wave_m,
            visibility_km: visibility,
            month,
            season,
            origin_queue,
            dest_queue,
            port_congestion_idx: congestion,
            delay_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{Observation, QuantizedKey},
        geodesy::{interpolate, GeoPoint},
        ports::Port,
    };
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use voyage_schema::Season;

    fn profile() -> FetchProfile {
        FetchProfile::new(2, vec![0.3, 0.5, 0.7])
    }

    fn sample() -> RouteSample {
        let origin = Port::new("Lisbon", 38.7223, -9.1393);
        let destination = Port::new("Casablanca", 33.5731, -7.5898);
        let points = profile()
            .fractions
            .iter()
            .map(|&f| interpolate(origin.location(), destination.location(), f))
            .collect();
        RouteSample {
            origin,
            destination,
            departure: NaiveDate::from_ymd_opt(2021, 7, 14).unwrap(),
            points,
        }
    }

    fn assembler(cache: &Arc<ObservationCache>) -> RowAssembler {
        RowAssembler::new(
            Arc::clone(cache),
            SyntheticConfig::default(),
            DelayModelConfig::default(),
            0.2,
        )
        .unwrap()
    }

    fn weather(wind: f64) -> Option<Observation> {
        Some(Observation::Weather(WeatherObservation {
            max_wind_knots: wind,
            rain_mm: 2.0,
            temp_c: 24.0,
        }))
    }

    fn wave(height: f64) -> Option<Observation> {
        Some(Observation::Marine(MarineObservation { max_wave_m: height }))
    }

    fn fill(
        cache: &ObservationCache,
        sample: &RouteSample,
        index: usize,
        w: Option<Observation>,
        m: Option<Observation>,
    ) {
        let (weather_key, marine_key) = point_keys(sample, index, &profile()).unwrap();
        cache.put(weather_key, w);
        cache.put(marine_key, m);
    }

    #[test]
    fn all_absent_yields_none() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        for index in 0..3 {
            fill(&cache, &sample, index, None, None);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(assembler(&cache).assemble(&sample, &profile(), &mut rng).is_none());
    }

    #[test]
    fn weather_and_marine_must_share_a_point() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        fill(&cache, &sample, 0, weather(10.0), None);
        fill(&cache, &sample, 1, None, wave(1.0));
        fill(&cache, &sample, 2, None, None);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(assembler(&cache).assemble(&sample, &profile(), &mut rng).is_none());
    }

    #[test]
    fn earliest_fraction_wins() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        fill(&cache, &sample, 0, None, wave(3.0));
        fill(&cache, &sample, 1, weather(12.0), wave(1.25));
        fill(&cache, &sample, 2, weather(30.0), wave(4.0));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let row = assembler(&cache).assemble(&sample, &profile(), &mut rng).unwrap();
        assert_eq!(row.avg_wind_knots, 12.0);
        assert_eq!(row.max_wave_m, 1.25);
    }

    #[test]
    fn pushed_marine_cell_backs_absent_primary() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        fill(&cache, &sample, 0, weather(8.0), None);
        let (_, marine_key) = point_keys(&sample, 0, &profile()).unwrap();
        cache.put(marine_key.sea_pushed(0.2).unwrap(), wave(2.5));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let row = assembler(&cache).assemble(&sample, &profile(), &mut rng).unwrap();
        assert_eq!(row.max_wave_m, 2.5);
    }

    #[test]
    fn same_seed_gives_identical_rows() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        fill(&cache, &sample, 0, weather(15.0), wave(2.0));
        let assembler = assembler(&cache);

        let mut first = ChaCha8Rng::seed_from_u64(2024);
        let mut second = ChaCha8Rng::seed_from_u64(2024);
        for _ in 0..20 {
            let a = assembler.assemble(&sample, &profile(), &mut first).unwrap();
            let b = assembler.assemble(&sample, &profile(), &mut second).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.delay_hours.to_bits(), b.delay_hours.to_bits());
        }
    }

    #[test]
    fn derived_fields_respect_bounds() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        // Heavy rain drives visibility well under the floor before clipping.
        cache.put(
            point_keys(&sample, 0, &profile()).unwrap().0,
            Some(Observation::Weather(WeatherObservation {
                max_wind_knots: 0.0,
                rain_mm: 120.0,
                temp_c: 20.0,
            })),
        );
        cache.put(point_keys(&sample, 0, &profile()).unwrap().1, wave(0.0));
        let assembler = assembler(&cache);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..500 {
            let row = assembler.assemble(&sample, &profile(), &mut rng).unwrap();
            assert!(row.delay_hours >= 0.0);
            assert_eq!(row.visibility_km, 2.0);
            assert!(row.origin_queue < 8 && row.dest_queue < 8);
            assert!((0.2..1.2).contains(&row.port_congestion_idx));
        }
    }

    #[test]
    fn row_carries_route_and_calendar_fields() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        fill(&cache, &sample, 2, weather(5.0), wave(0.5));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let row = assembler(&cache).assemble(&sample, &profile(), &mut rng).unwrap();
        assert_eq!(row.port_origin, "Lisbon");
        assert_eq!(row.port_dest, "Casablanca");
        assert_eq!(row.month, 7);
        assert_eq!(row.season, Season::Summer);
        let expected = haversine_km(sample.origin.location(), sample.destination.location());
        assert_eq!(row.gc_distance_km, expected);
        assert_eq!(row.temp_c, 24.0);
    }

    #[test]
    fn negative_noise_sd_is_rejected() {
        let synthetic = SyntheticConfig {
            visibility_noise_sd: -1.0,
            ..SyntheticConfig::default()
        };
        let result = RowAssembler::new(
            Arc::new(ObservationCache::new()),
            synthetic,
            DelayModelConfig::default(),
            0.2,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let delay = DelayModelConfig {
            noise_sd: -0.5,
            ..DelayModelConfig::default()
        };
        let result = RowAssembler::new(
            Arc::new(ObservationCache::new()),
            SyntheticConfig::default(),
            delay,
            0.2,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn pushed_cell_never_substitutes_for_weather() {
        let cache = Arc::new(ObservationCache::new());
        let sample = sample();
        let (weather_key, marine_key) = point_keys(&sample, 0, &profile()).unwrap();
        cache.put(marine_key, wave(1.0));
        let east = GeoPoint::new(weather_key.lat(), weather_key.lon() + 0.2);
        cache.put(QuantizedKey::weather(east, sample.departure), weather(9.0));
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        assert!(assembler(&cache).assemble(&sample, &profile(), &mut rng).is_none());
    }
}
