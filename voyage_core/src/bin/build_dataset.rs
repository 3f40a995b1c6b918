use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voyage_core::{
    load_pipeline_config_from_env, load_port_registry, OpenMeteoClient, PipelineConfig,
    YieldController,
};
use voyage_schema::CsvRowSink;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build the maritime voyage delay dataset", long_about = None)]
struct Cli {
    /// Pipeline config JSON. Falls back to VOYAGE_CONFIG_PATH, then the builtin defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Port registry JSON. Falls back to VOYAGE_PORTS_PATH, then the builtin registry.
    #[arg(long)]
    ports: Option<PathBuf>,
    /// Rows to produce before stopping.
    #[arg(long)]
    target: Option<u64>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Concurrent remote requests per batch.
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    max_passes: Option<u32>,
    /// CSV output path; truncated at start.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    timeout_secs: Option<f64>,
}

impl Cli {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(target) = self.target {
            config.target_rows = target;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(max_passes) = self.max_passes {
            config.max_passes = max_passes;
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.http.timeout_secs = timeout;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (config, _) = load_pipeline_config_from_env(cli.config.as_deref());
    let mut config = PipelineConfig::clone(&config);
    cli.apply(&mut config);
    config.validate().context("pipeline config rejected")?;
    let config = Arc::new(config);

    let ports = load_port_registry(cli.ports.as_deref());
    let client = Arc::new(OpenMeteoClient::new(&config.http)?);
    let mut controller = YieldController::new(Arc::clone(&config), ports, client.clone())?;

    let mut sink = CsvRowSink::create(&config.output_path)
        .with_context(|| format!("opening {}", config.output_path.display()))?;
    info!(
        target: "voyage::controller",
        target_rows = config.target_rows,
        batch_size = config.batch_size,
        workers = config.workers,
        profiles = config.profiles.len(),
        output = %config.output_path.display(),
        "run.started"
    );

    let summary = controller.run(&mut sink)?;

    let stats = client.stats();
    info!(
        target: "voyage::client",
        requests = stats.requests,
        retries = stats.retries,
        absent = stats.absent,
        "client.stats"
    );
    println!("{summary}");
    Ok(())
}
