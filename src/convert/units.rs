//! Unit-system conversion.
//!
//! Every supported quantity is defined per unit system as an affine map onto SI:
//!
//! ```text
//! si = value * scale + offset
//! ```
//!
//! `ConversionTable::new` composes those maps for every `(kind, from, to)` triple once.
//! The table is immutable afterwards and is shared (`Arc`) by every converter and
//! worker thread; applying a conversion is a lookup plus one multiply-add per sample.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;

use crate::domain::{Channel, Dataset, Provenance, QuantityKind, UnitSystem};
use crate::error::TireError;

/// Rows per rayon task when scaling a channel.
const PAR_CHUNK: usize = 1 << 16;

/// Unit definition of one quantity in one unit system.
#[derive(Debug, Clone, Copy)]
struct UnitDef {
    label: &'static str,
    scale: f64,
    offset: f64,
}

const fn def(label: &'static str, scale: f64, offset: f64) -> UnitDef {
    UnitDef { label, scale, offset }
}

fn unit_def(kind: QuantityKind, system: UnitSystem) -> Option<UnitDef> {
    use QuantityKind as K;
    use UnitSystem as U;
    let d = match (kind, system) {
        (K::Length, U::Si) => def("m", 1.0, 0.0),
        (K::Length, U::Metric) => def("cm", 0.01, 0.0),
        (K::Length, U::Uscs) => def("in", 0.0254, 0.0),
        (K::Force, U::Si | U::Metric) => def("N", 1.0, 0.0),
        (K::Force, U::Uscs) => def("lb", 4.44822, 0.0),
        (K::Moment, U::Si | U::Metric) => def("Nm", 1.0, 0.0),
        (K::Moment, U::Uscs) => def("ft-lb", 1.35582, 0.0),
        (K::Pressure, U::Si) => def("Pa", 1.0, 0.0),
        (K::Pressure, U::Metric) => def("kPa", 1000.0, 0.0),
        (K::Pressure, U::Uscs) => def("psi", 6894.76, 0.0),
        (K::Angle, U::Si) => def("rad", 1.0, 0.0),
        (K::Angle, U::Metric | U::Uscs) => def("deg", std::f64::consts::PI / 180.0, 0.0),
        (K::Speed, U::Si) => def("m/s", 1.0, 0.0),
        (K::Speed, U::Metric) => def("kph", 1000.0 / 3600.0, 0.0),
        (K::Speed, U::Uscs) => def("mph", 0.44704, 0.0),
        (K::RotationalSpeed, U::Si) => def("rad/s", 1.0, 0.0),
        (K::RotationalSpeed, U::Metric | U::Uscs) => def("rpm", 2.0 * std::f64::consts::PI / 60.0, 0.0),
        (K::Temperature, U::Si) => def("deg K", 1.0, 0.0),
        (K::Temperature, U::Metric) => def("deg C", 1.0, 273.15),
        (K::Temperature, U::Uscs) => def("deg F", 5.0 / 9.0, 459.67 * 5.0 / 9.0),
        (K::Time, _) => def("sec", 1.0, 0.0),
        (K::Dimensionless, _) => def("-", 1.0, 0.0),
        (K::Unknown, _) => return None,
    };
    Some(d)
}

/// Unit label used for `kind` in `system` (`None` for unknown kinds).
pub fn unit_label(kind: QuantityKind, system: UnitSystem) -> Option<&'static str> {
    unit_def(kind, system).map(|d| d.label)
}

/// Resolve a recorded unit string to a quantity kind and the unit systems that use it.
pub fn parse_unit_label(label: &str) -> Option<(QuantityKind, &'static [UnitSystem])> {
    use QuantityKind as K;
    use UnitSystem as U;
    const ALL: &[UnitSystem] = &[U::Uscs, U::Metric, U::Si];
    const METRIC_SI: &[UnitSystem] = &[U::Metric, U::Si];
    const METRIC_USCS: &[UnitSystem] = &[U::Metric, U::Uscs];
    const SI: &[UnitSystem] = &[U::Si];
    const METRIC: &[UnitSystem] = &[U::Metric];
    const USCS: &[UnitSystem] = &[U::Uscs];

    let l = label.trim().to_ascii_lowercase();
    let hit = match l.as_str() {
        "m" => (K::Length, SI),
        "cm" => (K::Length, METRIC),
        "in" => (K::Length, USCS),
        "n" => (K::Force, METRIC_SI),
        "lb" | "lbf" | "lbs" => (K::Force, USCS),
        "nm" | "n-m" | "n*m" | "n.m" => (K::Moment, METRIC_SI),
        "ft-lb" | "ft*lb" | "ft-lbf" | "lb-ft" => (K::Moment, USCS),
        "pa" => (K::Pressure, SI),
        "kpa" => (K::Pressure, METRIC),
        "psi" => (K::Pressure, USCS),
        "rad" => (K::Angle, SI),
        "deg" => (K::Angle, METRIC_USCS),
        "m/s" => (K::Speed, SI),
        "kph" | "km/h" => (K::Speed, METRIC),
        "mph" => (K::Speed, USCS),
        "rad/s" => (K::RotationalSpeed, SI),
        "rpm" => (K::RotationalSpeed, METRIC_USCS),
        "deg k" | "k" => (K::Temperature, SI),
        "deg c" | "degc" => (K::Temperature, METRIC),
        "deg f" | "degf" => (K::Temperature, USCS),
        "sec" | "s" => (K::Time, ALL),
        _ => return None,
    };
    Some(hit)
}

/// Infer the unit system from recorded unit strings.
///
/// Returns `Some` only when the recognized units agree on exactly one system.
pub fn infer_unit_system<'a>(labels: impl IntoIterator<Item = &'a str>) -> Option<UnitSystem> {
    let mut candidates: Vec<UnitSystem> = UnitSystem::ALL.to_vec();
    let mut any = false;
    for label in labels {
        if let Some((_, systems)) = parse_unit_label(label) {
            any = true;
            candidates.retain(|s| systems.contains(s));
        }
    }
    match (any, candidates.as_slice()) {
        (true, [only]) => Some(*only),
        _ => None,
    }
}

/// `to = from * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub scale: f64,
    pub offset: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine { scale: 1.0, offset: 0.0 };

    #[inline]
    pub fn apply(self, v: f64) -> f64 {
        v * self.scale + self.offset
    }

    /// Apply in place over a whole channel.
    pub fn apply_slice(self, values: &mut [f64]) {
        if self == Affine::IDENTITY {
            return;
        }
        values.par_chunks_mut(PAR_CHUNK).for_each(|chunk| {
            for v in chunk {
                *v = *v * self.scale + self.offset;
            }
        });
    }
}

/// Precomputed factors for every `(kind, from, to)` triple. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConversionTable {
    factors: HashMap<(QuantityKind, UnitSystem, UnitSystem), Affine>,
}

impl ConversionTable {
    pub fn new() -> Self {
        let mut factors = HashMap::new();
        let kinds = [
            QuantityKind::Length,
            QuantityKind::Force,
            QuantityKind::Moment,
            QuantityKind::Pressure,
            QuantityKind::Angle,
            QuantityKind::Speed,
            QuantityKind::RotationalSpeed,
            QuantityKind::Temperature,
            QuantityKind::Time,
            QuantityKind::Dimensionless,
        ];
        for kind in kinds {
            for from in UnitSystem::ALL {
                for to in UnitSystem::ALL {
                    let (Some(f), Some(t)) = (unit_def(kind, from), unit_def(kind, to)) else {
                        continue;
                    };
                    let affine = if from == to {
                        Affine::IDENTITY
                    } else {
                        // v -> si = v*f.s + f.o -> (si - t.o) / t.s
                        Affine {
                            scale: f.scale / t.scale,
                            offset: (f.offset - t.offset) / t.scale,
                        }
                    };
                    factors.insert((kind, from, to), affine);
                }
            }
        }
        Self { factors }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Factor for one triple, or a `ConversionError` naming the combination.
    pub fn factor(&self, kind: QuantityKind, from: UnitSystem, to: UnitSystem) -> Result<Affine, TireError> {
        self.factors.get(&(kind, from, to)).copied().ok_or_else(|| {
            TireError::conversion(format!("unsupported conversion of {kind} from {from} to {to}"))
        })
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts values and whole datasets between unit systems.
#[derive(Debug, Clone)]
pub struct UnitSystemConverter {
    table: Arc<ConversionTable>,
}

impl UnitSystemConverter {
    pub fn new(table: Arc<ConversionTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ConversionTable {
        &self.table
    }

    pub fn convert_value(
        &self,
        value: f64,
        kind: QuantityKind,
        from: UnitSystem,
        to: UnitSystem,
    ) -> Result<f64, TireError> {
        Ok(self.table.factor(kind, from, to)?.apply(value))
    }

    /// Return a copy of `dataset` expressed in `to`. The input is never modified.
    ///
    /// Channels of unknown kind are carried over unchanged. Command channels are
    /// rounded to whole numbers when converting into USCS or Metric, the systems with
    /// command-level tables; SI command values are kept exact.
    pub fn convert_dataset(&self, dataset: &Dataset, to: UnitSystem) -> Result<Dataset, TireError> {
        let from = dataset.unit_system.ok_or_else(|| {
            TireError::conversion(format!(
                "dataset '{}' has no unit system; assign one before converting",
                dataset.id
            ))
        })?;

        let mut out = dataset.clone();
        if from == to {
            return Ok(out);
        }

        let converted = dataset
            .channels()
            .par_iter()
            .map(|ch| self.convert_channel(ch, from, to))
            .collect::<Result<Vec<Channel>, TireError>>()
            .map_err(|e| match e {
                TireError::Conversion { message } => {
                    TireError::conversion(format!("dataset '{}': {message}", dataset.id))
                }
                other => other,
            })?;

        out.replace_channels(converted)?;
        out.unit_system = Some(to);
        info!("Converted dataset '{}' from {from} to {to}", dataset.id);
        Ok(out)
    }

    fn convert_channel(&self, ch: &Channel, from: UnitSystem, to: UnitSystem) -> Result<Channel, TireError> {
        if ch.kind == QuantityKind::Unknown {
            debug!("Channel '{}' has no known quantity kind; passed through", ch.name);
            return Ok(ch.clone());
        }
        let affine = self.table.factor(ch.kind, from, to)?;
        let mut out = ch.clone();
        affine.apply_slice(&mut out.values);
        if ch.provenance == Provenance::Command && to != UnitSystem::Si {
            out.values.iter_mut().for_each(|v| *v = v.round());
        }
        if let Some(label) = unit_label(ch.kind, to) {
            out.unit = label.to_string();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetId, DatasetMeta, SignConvention};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::path::PathBuf;

    const KINDS: [QuantityKind; 10] = [
        QuantityKind::Length,
        QuantityKind::Force,
        QuantityKind::Moment,
        QuantityKind::Pressure,
        QuantityKind::Angle,
        QuantityKind::Speed,
        QuantityKind::RotationalSpeed,
        QuantityKind::Temperature,
        QuantityKind::Time,
        QuantityKind::Dimensionless,
    ];

    #[test]
    fn round_trip_all_supported_triples() {
        let conv = UnitSystemConverter::new(ConversionTable::shared());
        let mut rng = StdRng::seed_from_u64(7);
        for kind in KINDS {
            for a in UnitSystem::ALL {
                for b in UnitSystem::ALL {
                    for _ in 0..20 {
                        let x: f64 = rng.gen_range(-5000.0..5000.0);
                        let there = conv.convert_value(x, kind, a, b).unwrap();
                        let back = conv.convert_value(there, kind, b, a).unwrap();
                        assert!(
                            (back - x).abs() <= 1e-9 * x.abs().max(1.0),
                            "{kind} {a}->{b}->{a}: {x} became {back}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn known_factors() {
        let conv = UnitSystemConverter::new(ConversionTable::shared());
        let n = conv
            .convert_value(-100.0, QuantityKind::Force, UnitSystem::Uscs, UnitSystem::Metric)
            .unwrap();
        assert!((n + 444.822).abs() < 1e-9);

        let c = conv
            .convert_value(212.0, QuantityKind::Temperature, UnitSystem::Uscs, UnitSystem::Metric)
            .unwrap();
        assert!((c - 100.0).abs() < 1e-9, "212F should be 100C, got {c}");

        let rad = conv
            .convert_value(180.0, QuantityKind::Angle, UnitSystem::Metric, UnitSystem::Si)
            .unwrap();
        assert!((rad - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn unknown_kind_is_an_error_not_identity() {
        let conv = UnitSystemConverter::new(ConversionTable::shared());
        let err = conv
            .convert_value(1.0, QuantityKind::Unknown, UnitSystem::Uscs, UnitSystem::Metric)
            .unwrap_err();
        assert!(matches!(err, TireError::Conversion { .. }));
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn dataset_conversion_leaves_input_untouched_and_rounds_commands() {
        let ds = Dataset::new(
            DatasetId::from("d"),
            PathBuf::new(),
            vec![
                Channel::new("FZ", "lb", QuantityKind::Force, vec![-50.0, -100.0]),
                Channel::new("CmdFZ", "lb", QuantityKind::Force, vec![-50.0, -100.0])
                    .with_provenance(Provenance::Command),
                Channel::new("XYZ", "?", QuantityKind::Unknown, vec![1.0, 2.0]),
            ],
            Some(UnitSystem::Uscs),
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap();

        let conv = UnitSystemConverter::new(ConversionTable::shared());
        let metric = conv.convert_dataset(&ds, UnitSystem::Metric).unwrap();

        assert_eq!(ds.unit_system, Some(UnitSystem::Uscs));
        assert_eq!(ds.values("FZ").unwrap(), &[-50.0, -100.0]);

        assert_eq!(metric.unit_system, Some(UnitSystem::Metric));
        assert_eq!(metric.values("CmdFZ").unwrap(), &[-222.0, -445.0]);
        assert!((metric.values("FZ").unwrap()[0] + 222.411).abs() < 1e-9);
        assert_eq!(metric.channel("FZ").unwrap().unit, "N");
        assert_eq!(metric.values("XYZ").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn command_channels_survive_a_trip_through_si() {
        let cmd = |name: &str, unit: &str, kind, values: Vec<f64>| {
            Channel::new(name, unit, kind, values).with_provenance(Provenance::Command)
        };
        let ds = Dataset::new(
            DatasetId::from("m"),
            PathBuf::new(),
            vec![
                cmd("CmdSA", "deg", QuantityKind::Angle, vec![-6.0, -1.0, 1.0, 6.0]),
                cmd("CmdIA", "deg", QuantityKind::Angle, vec![0.0, 2.0, 4.0, 2.0]),
                cmd("CmdV", "kph", QuantityKind::Speed, vec![3.0, 24.0, 40.0, 72.0]),
            ],
            Some(UnitSystem::Metric),
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap();

        let conv = UnitSystemConverter::new(ConversionTable::shared());
        let si = conv.convert_dataset(&ds, UnitSystem::Si).unwrap();
        let sa_si = si.values("CmdSA").unwrap();
        assert!((sa_si[0] + 6.0_f64.to_radians()).abs() < 1e-12, "{sa_si:?}");
        assert!((si.values("CmdV").unwrap()[0] - 3.0 / 3.6).abs() < 1e-12);

        let back = conv.convert_dataset(&si, UnitSystem::Metric).unwrap();
        for name in ["CmdSA", "CmdIA", "CmdV"] {
            assert_eq!(back.values(name).unwrap(), ds.values(name).unwrap(), "{name}");
        }
    }

    #[test]
    fn dataset_without_unit_system_fails() {
        let ds = Dataset::new(
            DatasetId::from("u"),
            PathBuf::new(),
            vec![Channel::new("FZ", "", QuantityKind::Force, vec![1.0])],
            None,
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap();
        let conv = UnitSystemConverter::new(ConversionTable::shared());
        assert!(conv.convert_dataset(&ds, UnitSystem::Si).is_err());
    }

    #[test]
    fn infers_system_only_when_unambiguous() {
        assert_eq!(infer_unit_system(["lb", "deg", "psi"]), Some(UnitSystem::Uscs));
        assert_eq!(infer_unit_system(["N", "deg", "kPa"]), Some(UnitSystem::Metric));
        assert_eq!(infer_unit_system(["N", "sec"]), None);
        assert_eq!(infer_unit_system(["lb", "kPa"]), None);
        assert_eq!(infer_unit_system(["-", "?"]), None);
    }
}
