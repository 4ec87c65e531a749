#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for rent-gap welfare loss runs.
//!
//! A full run is `generate-tasks`, then `partition` into one batch per
//! worker, then `run-batch` on each worker, then `reconcile` to find and
//! explain whatever is missing. `reconcile --missing-out` writes a batch
//! that can be fed straight back into `run-batch`.
//!
//! Uses `indicatif-log-bridge` (via [`rent_gap_cli_utils::init_logger`]) so
//! that log lines and the lane progress bar never fight for the terminal.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rent_gap_cli_utils::IndicatifProgress;
use rent_gap_ledger::batch::write_batches;
use rent_gap_ledger::lanes::wall_time;
use rent_gap_ledger::tasks::discover_tasks;
use rent_gap_ledger::{TaskList, reconcile};
use rent_gap_models::{CityKey, CityUnit, TaskId, UnitOutcome};
use rent_gap_pipeline::{BatchRunner, CityPipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "rent_gap", about = "Urban rent gap welfare loss estimation")]
struct Cli {
    /// Pipeline config file (TOML)
    #[arg(long, global = true, env = "RENT_GAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the task list from the parcel directory and create the result store
    GenerateTasks {
        /// Where to write the task list
        #[arg(long, default_value = "tasks.csv")]
        output: PathBuf,
        /// Truncate an existing result store
        #[arg(long)]
        reset_results: bool,
    },
    /// Split a task list into batch files, one per worker lane
    Partition {
        #[arg(long, default_value = "tasks.csv")]
        tasks: PathBuf,
        /// Number of batches
        #[arg(long)]
        batches: usize,
        #[arg(long, default_value = "batches")]
        out_dir: PathBuf,
    },
    /// Run a single city
    RunCity {
        /// City as `{province}-{city}`
        city: String,
        /// Task list to take the city's task id from
        #[arg(long)]
        tasks: Option<PathBuf>,
        /// Task id to log under when the city is not in a task list
        #[arg(long)]
        task_id: Option<u32>,
    },
    /// Run every city in a batch file as one worker lane
    RunBatch {
        batch: PathBuf,
        /// Lane name for the start/end markers (defaults to the batch number)
        #[arg(long)]
        lane: Option<String>,
    },
    /// Diff the task list against the result store and diagnose missing cities
    Reconcile {
        #[arg(long, default_value = "tasks.csv")]
        tasks: PathBuf,
        /// Write the missing cities as a batch file
        #[arg(long)]
        missing_out: Option<PathBuf>,
        /// Write the missing cities as plain `prov,city` rows
        #[arg(long)]
        missing_list: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Report total wall time from the lane markers
    WallTime {
        /// Marker directory (defaults to the configured log directory)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
}

/// Lane name for a batch file: `batch_3.csv` -> `3`.
fn lane_name(batch: &Path) -> String {
    let stem = batch
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    stem.strip_prefix("batch_").unwrap_or(&stem).to_string()
}

fn print_outcome(unit: &CityUnit, outcome: &UnitOutcome) {
    match outcome {
        UnitOutcome::Computed(result) => println!(
            "{},{}: loss = {:.6}, loss_ratio = {:.4}%",
            unit.province,
            unit.city,
            result.loss,
            result.loss_ratio_percent()
        ),
        UnitOutcome::ZeroLoss(_) => {
            println!("{},{}: zero loss (not recorded)", unit.province, unit.city);
        }
        UnitOutcome::Failed { kind, message } => {
            println!("{},{}: {kind}: {message}", unit.province, unit.city);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = rent_gap_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::GenerateTasks {
            output,
            reset_results,
        } => {
            let tasks = discover_tasks(&config.parcel_dir)?;
            tasks.write(&output)?;
            config.store().initialize(reset_results)?;
            log::info!("Wrote {} tasks to {}", tasks.len(), output.display());
        }
        Commands::Partition {
            tasks,
            batches,
            out_dir,
        } => {
            let tasks = TaskList::load(&tasks)?;
            let paths = write_batches(&tasks, batches, &out_dir)?;
            log::info!(
                "Split {} tasks into {} batches under {}",
                tasks.len(),
                paths.len(),
                out_dir.display()
            );
        }
        Commands::RunCity {
            city,
            tasks,
            task_id,
        } => {
            let key = CityKey::parse(&city)
                .ok_or_else(|| format!("Expected {{province}}-{{city}}, got '{city}'"))?;
            let unit = match tasks {
                Some(path) => TaskList::load(&path)?
                    .find(&key)
                    .cloned()
                    .ok_or_else(|| format!("{key} is not in {}", path.display()))?,
                None => CityUnit::new(TaskId(task_id.unwrap_or(0)), &key),
            };

            let pipeline = CityPipeline::new(config)?;
            let outcome = tokio::task::spawn_blocking({
                let unit = unit.clone();
                move || pipeline.run(&unit)
            })
            .await??;
            print_outcome(&unit, &outcome);
        }
        Commands::RunBatch { batch, lane } => {
            let lane = lane.unwrap_or_else(|| lane_name(&batch));
            let tasks = TaskList::load(&batch)?;
            let runner = BatchRunner::new(CityPipeline::new(config)?);

            let progress = IndicatifProgress::lane_bar(&multi, &format!("lane {lane}"));
            let summary = runner.run_lane(&lane, &tasks, progress).await?;

            for (kind, count) in summary.failures_by_kind() {
                log::info!("{kind}: {count}");
            }
            if summary.zero_loss() > 0 {
                log::info!("{} zero-loss cities not recorded", summary.zero_loss());
            }
            for (unit, error) in &summary.errored {
                log::error!("{},{}: {error}", unit.province, unit.city);
            }
        }
        Commands::Reconcile {
            tasks,
            missing_out,
            missing_list,
            json,
        } => {
            let tasks = TaskList::load(&tasks)?;
            let report = reconcile(&tasks, &config.store(), &config.log_dir)?;

            println!(
                "{} of {} cities have results, {} missing",
                report.completed,
                report.total,
                report.missing.len()
            );
            for (kind, count) in report.counts_by_kind() {
                println!(
                    "  {:<28} {count}",
                    kind.as_deref().unwrap_or("OTHER")
                );
            }

            if let Some(path) = missing_out {
                report.missing_tasks().write(&path)?;
                log::info!("Wrote {} missing tasks to {}", report.missing.len(), path.display());
            }
            if let Some(path) = missing_list {
                report.write_missing(&path)?;
            }
            if let Some(path) = json {
                let file = std::fs::File::create(&path)?;
                serde_json::to_writer_pretty(file, &report)?;
                log::info!("Wrote reconciliation report to {}", path.display());
            }
        }
        Commands::WallTime { log_dir } => {
            let log_dir = log_dir.unwrap_or(config.log_dir);
            match wall_time(&log_dir)? {
                Some(wall) => {
                    let elapsed = wall.elapsed();
                    println!("Start: {}", wall.start);
                    println!("End:   {}", wall.end);
                    println!(
                        "Lanes: {} started, {} finished",
                        wall.started_lanes, wall.finished_lanes
                    );
                    println!(
                        "Total wall time: {}h {}m {}s",
                        elapsed.num_hours(),
                        elapsed.num_minutes() % 60,
                        elapsed.num_seconds() % 60
                    );
                }
                None => println!("No complete start/end markers in {}", log_dir.display()),
            }
        }
    }

    Ok(())
}
