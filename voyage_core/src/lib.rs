//! Guaranteed-yield dataset pipeline for maritime voyage records.
//!
//! Draws candidate routes between ports, resolves weather and wave
//! observations for their route points through a cached, retrying client and
//! widens its search along an escalation schedule until the requested number
//! of rows has been written, see [`YieldController::run`].

pub mod assembler;
pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod geodesy;
pub mod ports;
pub mod prefetch;
pub mod profile;
pub mod sampler;

pub use assembler::RowAssembler;
pub use cache::{
    CacheLookup, CacheStats, MarineObservation, Observation, ObservationCache, ObservationKind,
    QuantizedKey, WeatherObservation,
};
pub use client::{ClientError, ClientStats, ObservationSource, OpenMeteoClient};
pub use config::{
    load_pipeline_config_from_env, ConfigError, DelayModelConfig, HttpConfig, PipelineConfig,
    SyntheticConfig,
};
pub use controller::{Phase, PipelineError, RunOutcome, RunSummary, YieldController, YieldState};
pub use geodesy::{haversine_km, interpolate, GeoPoint};
pub use ports::{load_port_registry, Port, PortRegistry, PortRegistryError};
pub use prefetch::{required_keys, KeySet, PrefetchReport, PrefetchScheduler};
pub use profile::{EscalationSchedule, FetchProfile};
pub use sampler::{RouteSample, SampleGenerator};
