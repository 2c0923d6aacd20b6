//! Command channels: continuous rig signals snapped to nominal test levels.
//!
//! A tire test holds load, pressure, speed, camber and slip at a handful of nominal
//! values. `CmdChannelGenerator` maps each sample of a source channel (`FZ`, `P`, ...)
//! to the nearest nominal level so data can be grouped by test condition.
//!
//! Level tables are per unit system and SAE-referenced. Samples are compared in the
//! dataset's unit system (a mismatch is an error, never assumed away) and in SAE
//! signs; the resulting channel is written back in the dataset's convention.

use std::fmt;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::convert::convention::ConventionConverter;
use crate::domain::{Channel, Dataset, Provenance, SignConvention, UnitSystem};
use crate::error::TireError;
use crate::signal::{FilterSpec, SampleClock, butterworth};

/// Rate assumed for the `FZ` pre-filter when the dataset has no usable `ET` channel.
pub const FALLBACK_RATE_HZ: f64 = 100.0;

/// Channels that get a command counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSource {
    V,
    P,
    Fz,
    Ia,
    Sa,
}

impl CommandSource {
    pub const ALL: [CommandSource; 5] = [
        CommandSource::V,
        CommandSource::P,
        CommandSource::Fz,
        CommandSource::Ia,
        CommandSource::Sa,
    ];

    pub fn channel_name(self) -> &'static str {
        match self {
            CommandSource::V => "V",
            CommandSource::P => "P",
            CommandSource::Fz => "FZ",
            CommandSource::Ia => "IA",
            CommandSource::Sa => "SA",
        }
    }

    pub fn command_name(self) -> &'static str {
        match self {
            CommandSource::V => "CmdV",
            CommandSource::P => "CmdP",
            CommandSource::Fz => "CmdFZ",
            CommandSource::Ia => "CmdIA",
            CommandSource::Sa => "CmdSA",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel_name())
    }
}

/// Nominal levels (SAE signs) per source and unit system.
///
/// Only USCS and Metric have tables: rig programs are written in one of those two.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTargetTable;

impl CommandTargetTable {
    pub fn levels(&self, source: CommandSource, system: UnitSystem) -> Result<&'static [f64], TireError> {
        use CommandSource as S;
        use UnitSystem as U;
        match (source, system) {
            (S::V, U::Uscs) => Ok(&[0.0, 2.0, 15.0, 25.0, 45.0]),
            (S::V, U::Metric) => Ok(&[0.0, 3.0, 24.0, 40.0, 72.0]),
            (S::P, U::Uscs) => Ok(&[0.0, 8.0, 10.0, 12.0, 14.0]),
            (S::P, U::Metric) => Ok(&[0.0, 55.0, 69.0, 83.0, 97.0]),
            (S::Fz, U::Uscs) => Ok(&[0.0, -50.0, -100.0, -150.0, -200.0, -250.0, -350.0]),
            (S::Fz, U::Metric) => Ok(&[0.0, -222.0, -445.0, -667.0, -890.0, -1112.0, -1557.0]),
            (S::Ia, U::Uscs | U::Metric) => Ok(&[0.0, 2.0, 4.0]),
            (S::Sa, U::Uscs | U::Metric) => Ok(&[0.0, -1.0, -3.0, -6.0, 1.0, 6.0]),
            (_, U::Si) => Err(TireError::conversion(format!(
                "no {source} command levels for unit system {system}; convert the dataset to USCS or Metric first"
            ))),
        }
    }
}

/// One classified sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandLevel {
    Level(f64),
    Unclassified,
}

impl CommandLevel {
    /// Dataset storage form: unclassified samples become NaN.
    pub fn as_f64(self) -> f64 {
        match self {
            CommandLevel::Level(v) => v,
            CommandLevel::Unclassified => f64::NAN,
        }
    }
}

/// A generated command channel before it is attached to a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandChannel {
    pub source: CommandSource,
    pub unit: String,
    pub levels: Vec<CommandLevel>,
}

impl CommandChannel {
    pub fn name(&self) -> &'static str {
        self.source.command_name()
    }

    pub fn unclassified(&self) -> usize {
        self.levels.iter().filter(|l| matches!(l, CommandLevel::Unclassified)).count()
    }

    pub fn to_channel(&self, source: &Channel) -> Channel {
        Channel::new(
            self.name(),
            self.unit.clone(),
            source.kind,
            self.levels.iter().map(|l| l.as_f64()).collect(),
        )
        .with_provenance(Provenance::Command)
    }
}

/// Half the smallest gap by default; anything farther from every level is unclassified.
pub fn level_tolerance(levels: &[f64], fraction: f64) -> f64 {
    let mut sorted = levels.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|g| *g > 0.0)
        .fold(None, |acc: Option<f64>, g| Some(acc.map_or(g, |a| a.min(g))))
        .map_or(f64::INFINITY, |gap| fraction * gap)
}

/// Nearest level by absolute distance; ties go to the lower-magnitude level.
pub fn classify(value: f64, levels: &[f64], tolerance: f64) -> CommandLevel {
    if !value.is_finite() {
        return CommandLevel::Unclassified;
    }
    let mut best: Option<(f64, f64)> = None;
    for &level in levels {
        let d = (value - level).abs();
        best = match best {
            None => Some((level, d)),
            Some((bl, bd)) if d < bd || (d == bd && level.abs() < bl.abs()) => Some((level, d)),
            keep => keep,
        };
    }
    match best {
        Some((level, d)) if d <= tolerance => CommandLevel::Level(level),
        _ => CommandLevel::Unclassified,
    }
}

#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Tolerance as a fraction of the smallest gap between adjacent levels.
    pub tolerance_fraction: f64,
    /// Low-pass applied to `FZ` before classification; `None` disables it.
    pub fz_prefilter: Option<FilterSpec>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            tolerance_fraction: 0.5,
            fz_prefilter: Some(FilterSpec::lowpass(1.0, 2)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmdChannelGenerator {
    targets: CommandTargetTable,
    convention: ConventionConverter,
    options: CommandOptions,
}

impl CmdChannelGenerator {
    pub fn new(convention: ConventionConverter, options: CommandOptions) -> Self {
        Self {
            targets: CommandTargetTable,
            convention,
            options,
        }
    }

    /// Build command channels for every source present in `dataset` that does not
    /// already have one.
    pub fn create_cmd_channels(&self, dataset: &Dataset) -> Result<Vec<CommandChannel>, TireError> {
        let system = dataset.unit_system.ok_or_else(|| {
            TireError::conversion(format!(
                "dataset '{}' has no unit system; command levels cannot be resolved",
                dataset.id
            ))
        })?;

        let pending: Vec<CommandSource> = CommandSource::ALL
            .into_iter()
            .filter(|s| {
                if !dataset.has_channel(s.channel_name()) {
                    return false;
                }
                if dataset.has_channel(s.command_name()) {
                    debug!("Dataset '{}' already has {}; skipped", dataset.id, s.command_name());
                    return false;
                }
                true
            })
            .collect();

        let out = pending
            .par_iter()
            .map(|&s| self.create_one(dataset, s, system))
            .collect::<Result<Vec<_>, _>>()?;

        for cmd in &out {
            let unclassified = cmd.unclassified();
            if unclassified > 0 {
                debug!("{}: {unclassified} of {} samples unclassified", cmd.name(), cmd.levels.len());
            }
        }
        Ok(out)
    }

    /// Return a copy of `dataset` with its command channels appended.
    pub fn with_command_channels(&self, dataset: &Dataset) -> Result<Dataset, TireError> {
        let cmds = self.create_cmd_channels(dataset)?;
        let mut out = dataset.clone();
        for cmd in &cmds {
            let source = dataset.channel(cmd.source.channel_name()).ok_or_else(|| {
                TireError::validation(Some(&dataset.id), format!("missing source channel {}", cmd.source))
            })?;
            out.push_channel(cmd.to_channel(source))?;
        }
        info!(
            "Added {} command channel(s) to dataset '{}'",
            cmds.len(),
            dataset.id
        );
        Ok(out)
    }

    fn create_one(
        &self,
        dataset: &Dataset,
        source: CommandSource,
        system: UnitSystem,
    ) -> Result<CommandChannel, TireError> {
        let levels = self.targets.levels(source, system)?;
        let channel = dataset.channel(source.channel_name()).ok_or_else(|| {
            TireError::validation(Some(&dataset.id), format!("missing source channel {source}"))
        })?;

        let mut values = channel.values.clone();
        if source == CommandSource::Fz {
            if let Some(spec) = &self.options.fz_prefilter {
                values = self.prefilter(dataset, values, spec);
            }
        }

        let current = dataset.sign_convention;
        self.convention
            .convert_values(source.channel_name(), &mut values, current, SignConvention::Sae);

        let tolerance = level_tolerance(levels, self.options.tolerance_fraction);
        let mut classified: Vec<f64> = values
            .iter()
            .map(|&v| classify(v, levels, tolerance).as_f64())
            .collect();

        self.convention
            .convert_values(source.command_name(), &mut classified, SignConvention::Sae, current);

        Ok(CommandChannel {
            source,
            unit: channel.unit.clone(),
            levels: classified
                .into_iter()
                .map(|v| if v.is_nan() { CommandLevel::Unclassified } else { CommandLevel::Level(v) })
                .collect(),
        })
    }

    fn prefilter(&self, dataset: &Dataset, values: Vec<f64>, spec: &FilterSpec) -> Vec<f64> {
        let clock = match dataset.values("ET") {
            Ok(t) => SampleClock::Time(t),
            Err(_) => SampleClock::Rate(FALLBACK_RATE_HZ),
        };
        match butterworth(&values, clock, spec) {
            Ok(filtered) => filtered,
            Err(e) => {
                warn!("FZ pre-filter skipped for dataset '{}': {e}", dataset.id);
                values
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convention::SignTable;
    use crate::domain::{DatasetId, DatasetMeta, QuantityKind};
    use std::path::PathBuf;

    const FZ_USCS: [f64; 4] = [0.0, -50.0, -100.0, -150.0];

    fn generator() -> CmdChannelGenerator {
        let opts = CommandOptions {
            fz_prefilter: None,
            ..CommandOptions::default()
        };
        CmdChannelGenerator::new(ConventionConverter::new(SignTable::shared()), opts)
    }

    fn dataset(system: Option<UnitSystem>, convention: SignConvention, fz: Vec<f64>) -> Dataset {
        let n = fz.len();
        Dataset::new(
            DatasetId::from("cmd"),
            PathBuf::new(),
            vec![
                Channel::new("FZ", "lb", QuantityKind::Force, fz),
                Channel::new("IA", "deg", QuantityKind::Angle, vec![2.1; n]),
            ],
            system,
            convention,
            DatasetMeta::default(),
        )
        .unwrap()
    }

    #[test]
    fn nearest_level_and_ties() {
        let tol = level_tolerance(&FZ_USCS, 0.5);
        assert_eq!(tol, 25.0);
        assert_eq!(classify(-100.0, &FZ_USCS, tol), CommandLevel::Level(-100.0));
        assert_eq!(classify(-74.0, &FZ_USCS, tol), CommandLevel::Level(-50.0));
        assert_eq!(classify(-75.0, &FZ_USCS, tol), CommandLevel::Level(-50.0));
        assert_eq!(classify(-175.0, &FZ_USCS, tol), CommandLevel::Level(-150.0));
    }

    #[test]
    fn far_samples_are_unclassified() {
        let tol = level_tolerance(&FZ_USCS, 0.5);
        assert_eq!(classify(-190.0, &FZ_USCS, tol), CommandLevel::Unclassified);
        assert_eq!(classify(f64::NAN, &FZ_USCS, tol), CommandLevel::Unclassified);
    }

    #[test]
    fn every_sample_resolves() {
        let ds = dataset(Some(UnitSystem::Uscs), SignConvention::Sae, vec![-49.0, -101.0, -340.0, 3.0]);
        let cmds = generator().create_cmd_channels(&ds).unwrap();
        let fz = cmds.iter().find(|c| c.source == CommandSource::Fz).unwrap();
        assert_eq!(
            fz.levels,
            vec![
                CommandLevel::Level(-50.0),
                CommandLevel::Level(-100.0),
                CommandLevel::Level(-350.0),
                CommandLevel::Level(0.0),
            ]
        );
        let ia = cmds.iter().find(|c| c.source == CommandSource::Ia).unwrap();
        assert!(ia.levels.iter().all(|l| *l == CommandLevel::Level(2.0)));
    }

    #[test]
    fn iso_dataset_is_compared_in_sae_and_written_back() {
        // ISO load is positive downward; SAE levels are negative.
        let ds = dataset(Some(UnitSystem::Uscs), SignConvention::Iso, vec![49.0, 151.0]);
        let out = generator().with_command_channels(&ds).unwrap();
        assert_eq!(out.values("CmdFZ").unwrap(), &[50.0, 150.0]);
        assert_eq!(out.channel("CmdFZ").unwrap().provenance, Provenance::Command);
        assert_eq!(out.len(), ds.len());
    }

    #[test]
    fn si_or_unknown_unit_system_is_rejected() {
        let si = dataset(Some(UnitSystem::Si), SignConvention::Sae, vec![-445.0]);
        let err = generator().create_cmd_channels(&si).unwrap_err();
        assert!(matches!(err, TireError::Conversion { .. }), "{err}");

        let unknown = dataset(None, SignConvention::Sae, vec![-445.0]);
        assert!(matches!(
            generator().create_cmd_channels(&unknown),
            Err(TireError::Conversion { .. })
        ));
    }

    #[test]
    fn existing_command_channels_are_kept() {
        let mut ds = dataset(Some(UnitSystem::Uscs), SignConvention::Sae, vec![-50.0, -100.0]);
        ds.push_channel(
            Channel::new("CmdFZ", "lb", QuantityKind::Force, vec![-1.0, -1.0]).with_provenance(Provenance::Command),
        )
        .unwrap();
        let out = generator().with_command_channels(&ds).unwrap();
        assert_eq!(out.values("CmdFZ").unwrap(), &[-1.0, -1.0]);
        assert!(out.has_channel("CmdIA"));
    }

    #[test]
    fn fz_prefilter_smooths_noise_before_classification() {
        let n = 600;
        let fz: Vec<f64> = (0..n)
            .map(|i| if i < n / 2 { -100.0 } else { -150.0 } + if i % 2 == 0 { 30.0 } else { -30.0 })
            .collect();
        let filtered = CmdChannelGenerator::new(ConventionConverter::new(SignTable::shared()), CommandOptions::default());
        let ds = dataset(Some(UnitSystem::Uscs), SignConvention::Sae, fz);
        let out = filtered.with_command_channels(&ds).unwrap();
        let cmd = out.values("CmdFZ").unwrap();
        assert_eq!(cmd[50], -100.0);
        assert_eq!(cmd[n - 50], -150.0);
    }
}
