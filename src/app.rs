//! Top-level application orchestration.
//!
//! `src/main.rs` only sets up the environment and logging; this module is the real
//! entry point that:
//! - parses CLI arguments
//! - resolves the pipeline config
//! - runs the requested command
//! - prints reports and writes optional exports

use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, GenerateArgs, InspectArgs, ShowArgs};
use crate::config::PipelineConfig;
use crate::data::{DataManager, SampleConfig, generate_sample};
use crate::error::TireError;
use crate::io::export::{FitExport, read_fit_json, write_dat, write_fit_json};

pub mod controller;
pub mod pipeline;

pub use controller::DataController;

/// Entry point for the `tirefit` binary.
pub fn run() -> Result<(), TireError> {
    let cli = crate::cli::Cli::parse_from(std::env::args_os());

    match cli.command {
        Command::Inspect(args) => handle_inspect(args),
        Command::Fit(args) => handle_fit(args),
        Command::Generate(args) => handle_generate(args),
        Command::Show(args) => handle_show(args),
    }
}

fn handle_inspect(args: InspectArgs) -> Result<(), TireError> {
    let config = PipelineConfig::resolve(args.config.as_deref())?;
    let controller = DataController::new(DataManager::shared(), config.command_options());
    for file in &args.files {
        let dataset = pipeline::prepare(&controller, file, &config, args.assume_units)?;
        println!("{}", crate::report::format_dataset_summary(&dataset));
    }
    if args.files.len() > 1 {
        println!("Channels across all files: {}", controller.channel_names()?.join(", "));
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), TireError> {
    let mut config = PipelineConfig::resolve(args.config.as_deref())?;
    apply_filter_args(&mut config, &args);
    let job = pipeline::FitJob {
        model: args.model,
        x_channel: args.x,
        y_channel: args.y,
        by_level: args.by_level,
        conditions: args.conditions,
        assume_units: args.assume_units,
        name: args.name,
    };
    let run = pipeline::run_fit(&args.file, &config, &job)?;
    println!("{}", crate::report::format_run_summary(&run));

    if let Some(path) = &args.export {
        match &run.outcome {
            pipeline::FitOutcome::Single(fit) => {
                write_fit_json(path, &FitExport::new(&run.subset, fit))?;
                info!("Wrote {}", path.display());
            }
            pipeline::FitOutcome::PerLevel(levels) => {
                for lf in levels {
                    let Ok(fit) = &lf.result else { continue };
                    let target = level_path(path, lf.level);
                    write_fit_json(&target, &FitExport::new(&run.subset, fit))?;
                    info!("Wrote {}", target.display());
                }
            }
        }
    }
    Ok(())
}

fn handle_generate(args: GenerateArgs) -> Result<(), TireError> {
    let dataset = generate_sample(&SampleConfig {
        rows: args.rows,
        seed: args.seed,
        fy_noise: args.noise,
        ..SampleConfig::default()
    })?;
    write_dat(&args.out, &dataset)?;
    println!("Wrote {} rows to {}", dataset.len(), args.out.display());
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), TireError> {
    let export = read_fit_json(&args.json)?;
    println!("{}", crate::report::format_export(&export));
    for x in &args.at {
        println!("  {}({x}) = {:.6e}", export.y_channel, export.evaluate(*x));
    }
    Ok(())
}

/// Command-line filter options override the config file.
fn apply_filter_args(config: &mut PipelineConfig, args: &FitArgs) {
    if let Some(kind) = args.filter {
        config.filter_type = kind;
    }
    if args.cutoff.is_some() {
        config.filter_cutoff = args.cutoff;
    }
    if args.cutoff_high.is_some() {
        config.filter_cutoff_high = args.cutoff_high;
    }
}

/// `fit.json` at level -445 -> `fit_-445.json`.
fn level_path(path: &Path, level: f64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fit".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    path.with_file_name(format!("{stem}_{level}.{ext}"))
}
