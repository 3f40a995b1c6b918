//! Batch-level key resolution over a bounded worker pool.
//!
//! `resolve` is the only synchronization barrier per batch: it returns once
//! every key the batch depends on is resolved (present or absent), so assembly
//! never observes a half-populated cache.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::unbounded;
use tracing::debug;

use crate::{
    cache::{CacheLookup, DateSpan, Observation, ObservationCache, ObservationKind, QuantizedKey},
    client::ObservationSource,
    profile::FetchProfile,
    sampler::RouteSample,
};

/// Distinct keys a batch needs, split by observation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    pub weather: BTreeSet<QuantizedKey>,
    pub marine: BTreeSet<QuantizedKey>,
}

impl KeySet {
    pub fn len(&self) -> usize {
        self.weather.len() + self.marine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weather.is_empty() && self.marine.is_empty()
    }
}

/// Weather and marine keys for one route point of a sample under `profile`.
pub fn point_keys(
    sample: &RouteSample,
    index: usize,
    profile: &FetchProfile,
) -> Option<(QuantizedKey, QuantizedKey)> {
    let point = *sample.points.get(index)?;
    Some((
        QuantizedKey::weather(point, sample.departure),
        QuantizedKey::marine(point, sample.departure, profile.half_window_days),
    ))
}

/// Deduplicated keys implied by every route point of every sample.
pub fn required_keys(samples: &[RouteSample], profile: &FetchProfile) -> KeySet {
    let mut keys = KeySet::default();
    for sample in samples {
        for index in 0..sample.points.len() {
            if let Some((weather, marine)) = point_keys(sample, index, profile) {
                keys.weather.insert(weather);
                keys.marine.insert(marine);
            }
        }
    }
    keys
}

/// What one `resolve` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub weather_keys: usize,
    pub marine_keys: usize,
    /// Keys already resolved before this call, across both phases.
    pub cache_hits: usize,
    /// Keys resolved by a remote call made during this call.
    pub fetched: usize,
    pub fetched_absent: usize,
    /// Open-water retry cells consulted for absent marine primaries.
    pub fallback_keys: usize,
    pub fallback_hits: usize,
}

#[derive(Debug, Default)]
struct PoolTally {
    fetched: AtomicUsize,
    fetched_absent: AtomicUsize,
}

pub struct PrefetchScheduler {
    source: Arc<dyn ObservationSource>,
    cache: Arc<ObservationCache>,
    workers: usize,
    sea_push_deg: f64,
}

impl PrefetchScheduler {
    pub fn new(
        source: Arc<dyn ObservationSource>,
        cache: Arc<ObservationCache>,
        workers: usize,
        sea_push_deg: f64,
    ) -> Self {
        Self {
            source,
            cache,
            workers: workers.max(1),
            sea_push_deg,
        }
    }

    pub fn cache(&self) -> &Arc<ObservationCache> {
        &self.cache
    }

    /// Resolves every key `samples` need under `profile`, blocking until done.
    ///
    /// Phase one fetches primary weather and marine keys. Phase two fetches the
    /// eastward open-water cell for each marine primary that came back absent.
    /// Both phases skip keys the cache already holds.
    pub fn resolve(&self, samples: &[RouteSample], profile: &FetchProfile) -> PrefetchReport {
        let keys = required_keys(samples, profile);
        let mut report = PrefetchReport {
            weather_keys: keys.weather.len(),
            marine_keys: keys.marine.len(),
            ..PrefetchReport::default()
        };

        // Marine first: it is the sparser series and the one fallbacks depend on.
        let primaries: Vec<QuantizedKey> = keys
            .marine
            .iter()
            .chain(keys.weather.iter())
            .copied()
            .collect();
        let pending = self.unresolved(&primaries, &mut report);
        self.dispatch(pending, &mut report);

        let fallbacks: BTreeSet<QuantizedKey> = keys
            .marine
            .iter()
            .filter(|key| self.cache.get(key) == CacheLookup::Absent)
            .filter_map(|key| key.sea_pushed(self.sea_push_deg))
            .collect();
        if !fallbacks.is_empty() {
            let fallbacks: Vec<QuantizedKey> = fallbacks.into_iter().collect();
            report.fallback_keys = fallbacks.len();
            let pending = self.unresolved(&fallbacks, &mut report);
            self.dispatch(pending, &mut report);
            report.fallback_hits = fallbacks
                .iter()
                .filter(|key| self.cache.marine(key).is_some())
                .count();
        }

        debug!(
            target: "voyage::prefetch",
            weather_keys = report.weather_keys,
            marine_keys = report.marine_keys,
            cache_hits = report.cache_hits,
            fetched = report.fetched,
            fetched_absent = report.fetched_absent,
            fallback_keys = report.fallback_keys,
            fallback_hits = report.fallback_hits,
            "prefetch.completed"
        );
        report
    }

    fn unresolved(&self, keys: &[QuantizedKey], report: &mut PrefetchReport) -> Vec<QuantizedKey> {
        let pending: Vec<QuantizedKey> = keys
            .iter()
            .filter(|key| !self.cache.is_resolved(key))
            .copied()
            .collect();
        report.cache_hits += keys.len() - pending.len();
        pending
    }

    /// Fans `keys` out to the worker pool and joins it. Workers only write
    /// through the cache.
    fn dispatch(&self, keys: Vec<QuantizedKey>, report: &mut PrefetchReport) {
        if keys.is_empty() {
            return;
        }
        let worker_count = self.workers.min(keys.len());
        let (sender, receiver) = unbounded::<QuantizedKey>();
        for key in keys {
            // The receiver is alive until the scope below ends.
            let _ = sender.send(key);
        }
        drop(sender);

        let tally = PoolTally::default();
        thread::scope(|scope| {
            for _ in 0..worker_count {
                let receiver = receiver.clone();
                let tally = &tally;
                scope.spawn(move || {
                    for key in receiver.iter() {
                        let (value, ran) = self.cache.resolve_with(key, || self.fetch(&key));
                        if ran {
                            tally.fetched.fetch_add(1, Ordering::Relaxed);
                            if value.is_none() {
                                tally.fetched_absent.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                });
            }
        });

        report.fetched += tally.fetched.load(Ordering::Relaxed);
        report.fetched_absent += tally.fetched_absent.load(Ordering::Relaxed);
    }

    fn fetch(&self, key: &QuantizedKey) -> Option<Observation> {
        match (key.kind(), key.span()) {
            (ObservationKind::Weather, DateSpan::Day(date)) => self
                .source
                .fetch_weather(key.point(), date)
                .map(Observation::Weather),
            (ObservationKind::Marine, DateSpan::Window { .. }) => {
                let (center, half_window) = key.window()?;
                self.source
                    .fetch_marine(key.point(), center, half_window)
                    .map(Observation::Marine)
            }
            _ => None,
        }
    }
}
