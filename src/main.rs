//! `av-planner`: drives the planner from step records on stdin.
//!
//! Each input line is one step record as JSON; each output line is the planning
//! result for it. Kinematic violations are logged to stderr. A line that cannot be
//! read repeats the previous command.

use anyhow::{Context, Result};
use av_planner::{Planner, PlannerConfig, PlanningMode, ReferenceTrajectory, StepInfo};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "av-planner", about = "Per-tick AV planner")]
struct Cli {
    /// Planner configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reference trajectory to replay
    #[arg(long)]
    trajectory: Option<PathBuf>,
    /// Format of the reference trajectory file
    #[arg(long, value_enum, default_value_t = TrajectoryFormat::Csv)]
    format: TrajectoryFormat,
    /// Skip auditing each result against the kinematic limits
    #[arg(long)]
    no_audit: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum TrajectoryFormat {
    Csv,
    Jsonl,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            PlannerConfig::from_json_reader(BufReader::new(file))
                .with_context(|| format!("reading {}", path.display()))?
        }
        None => PlannerConfig::default(),
    };

    let trajectory = match &cli.trajectory {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let reader = BufReader::new(file);
            let trajectory = match cli.format {
                TrajectoryFormat::Csv => ReferenceTrajectory::from_csv_reader(reader),
                TrajectoryFormat::Jsonl => ReferenceTrajectory::from_json_lines_reader(reader),
            };
            // A trajectory without a configured mode means replay.
            if cli.config.is_none() {
                config.mode = PlanningMode::Replay;
            }
            Some(trajectory.with_context(|| format!("reading {}", path.display()))?)
        }
        None => None,
    };

    let mut planner = Planner::initialize(config, trajectory)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (idx, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let step_info = match StepInfo::from_json(&line) {
            Ok(step_info) => step_info,
            Err(err) => {
                warn!("unreadable step record on line {}: {}", idx + 1, err);
                match planner.hold() {
                    Some(held) => writeln!(out, "{}", held.to_json()?)?,
                    None => warn!("no previous command to hold, skipping line {}", idx + 1),
                }
                continue;
            }
        };
        let result = planner.step_or_fallback(&step_info);
        if !cli.no_audit {
            let report = planner.audit(&step_info, &result);
            if !report.is_empty() {
                info!("line {}: {} kinematic violation(s)", idx + 1, report.len());
            }
        }
        writeln!(out, "{}", result.to_json()?)?;
    }

    Ok(())
}
