//! Command-line parsing for the tire test-data fitter.
//!
//! Argument parsing and command dispatch stay apart from the conversion and
//! fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Condition, ModelKind, UnitSystem};
use crate::signal::FilterType;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tirefit", version, about = "Tire test-rig data conditioning and model fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import a rig log and print its channels, units and metadata.
    Inspect(InspectArgs),
    /// Condition a rig log and fit a tire model to one channel pair.
    Fit(FitArgs),
    /// Write a synthetic cornering sweep as an ASCII rig log.
    Generate(GenerateArgs),
    /// Print a fit previously saved with `tirefit fit --export`.
    Show(ShowArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct InspectArgs {
    /// Rig logs (`.dat`, `.txt`, `.csv` or `.mat`).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Unit system of a file that does not declare one.
    #[arg(long, value_enum)]
    pub assume_units: Option<UnitSystem>,

    /// Pipeline config (TOML); defaults to $TIREFIT_CONFIG.
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Rig log (`.dat`, `.txt`, `.csv` or `.mat`).
    pub file: PathBuf,

    /// Model to fit: poly1..poly5, mf, mf-shifted.
    #[arg(short, long, default_value = "mf")]
    pub model: ModelKind,

    /// Independent channel.
    #[arg(short, long, default_value = "SA")]
    pub x: String,

    /// Dependent channel.
    #[arg(short, long, default_value = "FY")]
    pub y: String,

    /// Fit each level of this command channel separately (e.g. CmdFZ).
    #[arg(long, value_name = "CHANNEL")]
    pub by_level: Option<String>,

    /// Keep only rows where CHANNEL equals one of the levels, e.g. `CmdFZ=-445,-667`.
    /// May be repeated; all conditions must hold.
    #[arg(long = "where", value_name = "CHANNEL=LEVELS", value_parser = parse_condition)]
    pub conditions: Vec<Condition>,

    /// Unit system of a file that does not declare one.
    #[arg(long, value_enum)]
    pub assume_units: Option<UnitSystem>,

    /// Pipeline config (TOML); defaults to $TIREFIT_CONFIG.
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Filter force and moment channels before fitting; overrides the config.
    #[arg(long, value_enum, value_name = "TYPE")]
    pub filter: Option<FilterType>,

    /// Filter cutoff, or the lower band edge, Hz.
    #[arg(long, value_name = "HZ")]
    pub cutoff: Option<f64>,

    /// Upper band edge for bandpass and bandstop, Hz.
    #[arg(long, value_name = "HZ")]
    pub cutoff_high: Option<f64>,

    /// Dataset name for the report and export; defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,

    /// Save the fit as JSON. Per-level fits get one file each, suffixed with the level.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct GenerateArgs {
    /// Output rig log.
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Number of rows.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub rows: usize,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Standard deviation of the lateral force noise, lbf.
    #[arg(long, default_value_t = 2.0)]
    pub noise: f64,
}

#[derive(Debug, Parser, Clone)]
pub struct ShowArgs {
    /// Fit JSON produced by `tirefit fit --export`.
    pub json: PathBuf,

    /// Also print the model evaluated at these x values.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub at: Vec<f64>,
}

/// `CHANNEL=L1,L2,...`
pub fn parse_condition(s: &str) -> Result<Condition, String> {
    let (channel, levels) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CHANNEL=LEVELS, found '{s}'"))?;
    let channel = channel.trim();
    if channel.is_empty() {
        return Err(format!("missing channel name in '{s}'"));
    }
    let levels = levels
        .split(',')
        .map(|l| {
            l.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", l.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Condition::new(channel, levels))
}
