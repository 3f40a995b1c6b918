//! Guaranteed-yield loop: batches over an escalating schedule of fetch
//! profiles until the row target is met or the batch budget runs out.

use std::{fmt, sync::Arc};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{info, warn};
use voyage_schema::{RowSink, SinkError};

use crate::{
    assembler::RowAssembler,
    cache::{CacheStats, ObservationCache},
    client::ObservationSource,
    config::{ConfigError, PipelineConfig},
    ports::PortRegistry,
    prefetch::PrefetchScheduler,
    profile::{EscalationSchedule, FetchProfile},
    sampler::SampleGenerator,
};

/// RNG stream for row assembly; stream 0 belongs to the sample generator.
const ROW_RNG_STREAM: u64 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Running {
        pass: u32,
        profile_index: usize,
    },
    Done,
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    BudgetExhausted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Done => "done",
            RunOutcome::BudgetExhausted => "budget_exhausted",
        }
    }
}

/// Run counters. Only the controller mutates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YieldState {
    pub confirmed_rows: u64,
    pub batches_attempted: u64,
    pub passes_completed: u32,
    pub phase: Phase,
}

impl YieldState {
    fn confirm_row(&mut self) {
        self.confirmed_rows += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_confirmed: u64,
    pub target: u64,
    pub batches: u64,
    pub passes: u32,
    pub outcome: RunOutcome,
    pub cache: CacheStats,
}

impl RunSummary {
    pub fn shortfall(&self) -> u64 {
        self.target.saturating_sub(self.rows_confirmed)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={} target={} outcome={}",
            self.rows_confirmed,
            self.target,
            self.outcome.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchEnd {
    Exhausted,
    TargetReached,
}

pub struct YieldController {
    config: Arc<PipelineConfig>,
    schedule: EscalationSchedule,
    sampler: SampleGenerator,
    scheduler: PrefetchScheduler,
    assembler: RowAssembler,
    rng: ChaCha8Rng,
    state: YieldState,
}

impl YieldController {
    /// Validates `config` and wires a fresh per-run cache. Fails before any
    /// remote call is made.
    pub fn new(
        config: Arc<PipelineConfig>,
        ports: Arc<PortRegistry>,
        source: Arc<dyn ObservationSource>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache = Arc::new(ObservationCache::new());
        let scheduler =
            PrefetchScheduler::new(source, Arc::clone(&cache), config.workers, config.sea_push_deg);
        let assembler = RowAssembler::new(
            cache,
            config.synthetic.clone(),
            config.delay.clone(),
            config.sea_push_deg,
        )?;
        let sampler = SampleGenerator::new(ports, config.start_date, config.end_date, config.seed);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        rng.set_stream(ROW_RNG_STREAM);

        Ok(Self {
            schedule: config.schedule(),
            config,
            sampler,
            scheduler,
            assembler,
            rng,
            state: YieldState::default(),
        })
    }

    pub fn state(&self) -> YieldState {
        self.state
    }

    pub fn cache(&self) -> &Arc<ObservationCache> {
        self.scheduler.cache()
    }

    /// Drives the run to completion. The sink is flushed every checkpoint
    /// interval and once more at the end, also when a sink write fails.
    pub fn run<S: RowSink + ?Sized>(&mut self, sink: &mut S) -> Result<RunSummary, PipelineError> {
        let outcome = match self.drive(sink) {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = sink.flush();
                return Err(err);
            }
        };
        sink.flush()?;

        self.state.phase = match outcome {
            RunOutcome::Done => Phase::Done,
            RunOutcome::BudgetExhausted => Phase::BudgetExhausted,
        };
        let summary = RunSummary {
            rows_confirmed: self.state.confirmed_rows,
            target: self.config.target_rows,
            batches: self.state.batches_attempted,
            passes: self.state.passes_completed,
            outcome,
            cache: self.cache().stats(),
        };
        match outcome {
            RunOutcome::Done => info!(
                target: "voyage::controller",
                rows = summary.rows_confirmed,
                batches = summary.batches,
                "run.target_reached"
            ),
            RunOutcome::BudgetExhausted => warn!(
                target: "voyage::controller",
                rows = summary.rows_confirmed,
                target_rows = summary.target,
                shortfall = summary.shortfall(),
                batches = summary.batches,
                passes = summary.passes,
                "run.budget_exhausted"
            ),
        }
        Ok(summary)
    }

    fn drive<S: RowSink + ?Sized>(&mut self, sink: &mut S) -> Result<RunOutcome, PipelineError> {
        let schedule = self.schedule.clone();
        for pass in 1..=self.config.max_passes {
            for (profile_index, profile) in schedule.iter().enumerate() {
                if self.batch_budget_spent() {
                    return Ok(RunOutcome::BudgetExhausted);
                }
                self.state.phase = Phase::Running {
                    pass,
                    profile_index,
                };
                if self.run_batch(pass, profile_index, profile, sink)? == BatchEnd::TargetReached {
                    return Ok(RunOutcome::Done);
                }
            }
            self.state.passes_completed = pass;
        }
        Ok(RunOutcome::BudgetExhausted)
    }

    fn batch_budget_spent(&self) -> bool {
        self.config
            .max_batches
            .is_some_and(|cap| self.state.batches_attempted >= cap)
    }

    fn run_batch<S: RowSink + ?Sized>(
        &mut self,
        pass: u32,
        profile_index: usize,
        profile: &FetchProfile,
        sink: &mut S,
    ) -> Result<BatchEnd, PipelineError> {
        self.state.batches_attempted += 1;
        let samples = self.sampler.draw_batch(profile, self.config.batch_size);
        let report = self.scheduler.resolve(&samples, profile);

        let mut written = 0u64;
        let mut end = BatchEnd::Exhausted;
        for sample in &samples {
            let Some(row) = self.assembler.assemble(sample, profile, &mut self.rng) else {
                continue;
            };
            sink.append(&row)?;
            self.state.confirm_row();
            written += 1;
            if self.state.confirmed_rows % self.config.checkpoint_interval == 0 {
                sink.flush()?;
            }
            if self.state.confirmed_rows >= self.config.target_rows {
                end = BatchEnd::TargetReached;
                break;
            }
        }

        let cache = self.cache().stats();
        info!(
            target: "voyage::controller",
            pass,
            profile_index,
            profiles = self.schedule.len(),
            half_window_days = profile.half_window_days,
            points = profile.point_count(),
            keys = report.weather_keys + report.marine_keys,
            cache_hits = report.cache_hits,
            fetched = report.fetched,
            fallback_hits = report.fallback_hits,
            cached_present = cache.present,
            cached_absent = cache.absent,
            rows_batch = written,
            rows_total = self.state.confirmed_rows,
            "batch.completed"
        );
        Ok(end)
    }
}
