use anyhow::{Context, Result, anyhow};
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;

use swarm_radio_simulator::kernel::ModelId;
use swarm_radio_simulator::simulation::log_capture::{self, TeeLogger};
use swarm_radio_simulator::simulation::{RunSummary, SimulationRunner, load_scenario, validate_scenario};

#[derive(Parser)]
#[command(name = "swarm-radio-simulator")]
#[command(about = "Discrete-event radio simulator for 802.11 and 802.15.4 swarms", long_about = None)]
struct Cli {
    /// Scenario file (.toml or .json)
    scenario: PathBuf,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the simulated end time in milliseconds
    #[arg(long)]
    end_ms: Option<u64>,

    /// Host seconds per simulated second, 0 runs as fast as possible
    #[arg(long)]
    real_time_scale: Option<f64>,

    /// Hold the run until Enter is pressed
    #[arg(long)]
    start_paused: bool,

    /// Write the run summary as pretty JSON
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// Print the captured log lines of one model after the run
    #[arg(long, value_name = "ID")]
    trace_model: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let crate_level = if verbose { LevelFilter::Trace } else { LevelFilter::Debug };
    let inner = Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("swarm_radio_simulator"), crate_level)
        .parse_default_env()
        .build();
    let logger = TeeLogger::new(inner);
    let max_level = logger.filter();

    log_capture::init_log_capture();
    log::set_boxed_logger(Box::new(logger)).context("Failed to install logger")?;
    log::set_max_level(max_level);
    Ok(())
}

fn write_report(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write report: {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut scenario = load_scenario(&cli.scenario).with_context(|| format!("Failed to load scenario {}", cli.scenario.display()))?;
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    if let Some(end_ms) = cli.end_ms {
        scenario.end_time_ms = end_ms;
    }
    if let Some(scale) = cli.real_time_scale {
        scenario.real_time_scale = scale;
    }
    scenario.start_paused |= cli.start_paused;
    validate_scenario(&scenario).map_err(|e| anyhow!("Invalid command line override: {}", e))?;

    info!("Starting up with {} models from {}", scenario.models.len(), cli.scenario.display());
    let mut runner = SimulationRunner::from_scenario(&scenario).context("Failed to build scenario")?;

    if scenario.start_paused {
        let handle = runner.clock_handle();
        info!("paused, press Enter to start");
        thread::Builder::new()
            .name("resume-on-enter".to_string())
            .spawn(move || {
                let mut line = String::new();
                if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
                    warn!("failed to read stdin, starting anyway: {}", e);
                }
                handle.resume();
            })
            .context("Failed to spawn resume thread")?;
    }

    let summary = runner.run().context("Simulation failed")?;

    if let Some(path) = &cli.report {
        write_report(path, &summary)?;
    }
    if let Some(id) = cli.trace_model {
        for entry in log_capture::captured_logs_for(ModelId(id)) {
            println!("{} {:<5} {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.level, entry.content);
        }
    }
    Ok(())
}
