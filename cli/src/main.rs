use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use queueing_sim_core::{ModelConfig, SimTime, SimulationReport};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qsim", author, version, about = "Queueing network simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a model and print per-node statistics
    Run {
        model: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        warmup: Option<f64>,
        #[arg(long)]
        horizon: Option<f64>,
        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse and validate a model, then print the discovered node order
    Validate { model: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            model,
            seed,
            warmup,
            horizon,
            format,
            output,
        } => run_model(&model, seed, warmup, horizon, format, output.as_deref()),
        Commands::Validate { model } => validate_model(&model),
    }
}

fn load(path: &Path) -> Result<ModelConfig> {
    ModelConfig::from_path(path).with_context(|| format!("loading {}", path.display()))
}

fn run_model(
    path: &Path,
    seed: Option<u64>,
    warmup: Option<f64>,
    horizon: Option<f64>,
    format: Format,
    output: Option<&Path>,
) -> Result<()> {
    let mut config = load(path)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(warmup) = warmup {
        config.warmup = warmup;
    }
    if let Some(horizon) = horizon {
        config.horizon = horizon;
    }

    let mut sim = config.build().context("building model")?;
    let started = Instant::now();
    let summary = sim
        .run_with_warmup(config.warmup_time(), config.horizon_time())
        .context("running model")?;
    info!(
        steps = summary.steps,
        wall_ms = started.elapsed().as_millis() as u64,
        "simulation complete"
    );

    let report = sim.report()?;
    let rendered = match format {
        Format::Table => render_table(&report),
        Format::Json => serde_json::to_string_pretty(&report)?,
    };

    match output {
        Some(out) => {
            fs::write(out, rendered).with_context(|| format!("writing {}", out.display()))?;
            info!("Report written to {}", out.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn validate_model(path: &Path) -> Result<()> {
    let config = load(path)?;
    let sim = config.build().context("validating model")?;
    let network = sim.network();

    println!(
        "{}: {} nodes, {} reachable, horizon {} after warm-up {}",
        config.name.as_deref().unwrap_or("model"),
        network.len(),
        sim.order().len(),
        SimTime::from_units(config.horizon),
        SimTime::from_units(config.warmup),
    );
    for (i, &id) in sim.order().iter().enumerate() {
        let node = network.node(id)?;
        println!("  {:>3}  {:<8} {}", i, node.tag().to_string(), node.name());
    }
    Ok(())
}

fn render_table(report: &SimulationReport) -> String {
    let mut out = format!(
        "elapsed {:.2}, measured {:.2}\n",
        report.elapsed, report.measured
    );
    for node in &report.nodes {
        out.push_str(&format!("\n{} ({})\n", node.name, node.metrics.kind()));
        for (metric, value) in node.metrics.pairs() {
            out.push_str(&format!("  {:<26} {:>14.4}\n", metric, value));
        }
    }
    out
}
