//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during conversion, conditioning and fitting
//! - read from a config file or the command line
//! - exported to JSON alongside fitted parameters

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Unit system a dataset's samples are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
pub enum UnitSystem {
    /// US customary: lb, ft-lb, psi, mph, in, deg F.
    #[serde(rename = "USCS", alias = "uscs")]
    Uscs,
    /// Engineering metric: N, N·m, kPa, kph, cm, deg C.
    #[serde(rename = "Metric", alias = "metric")]
    Metric,
    /// Strict SI: N, N·m, Pa, m/s, m, rad, K.
    #[serde(rename = "SI", alias = "si")]
    Si,
}

impl UnitSystem {
    pub const ALL: [UnitSystem; 3] = [UnitSystem::Uscs, UnitSystem::Metric, UnitSystem::Si];

    pub fn label(self) -> &'static str {
        match self {
            UnitSystem::Uscs => "USCS",
            UnitSystem::Metric => "Metric",
            UnitSystem::Si => "SI",
        }
    }

    /// Parse a header value such as `USCS` or `metric` (case-insensitive).
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|u| u.label().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sign convention for forces, moments and angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum SignConvention {
    /// SAE J670, as supplied by the Tire Test Consortium.
    #[serde(rename = "SAE", alias = "sae")]
    Sae,
    /// Modified SAE used in Pacejka (2012).
    #[serde(rename = "Adapted SAE")]
    AdaptedSae,
    /// ISO 8855, used by most commercial simulation tools.
    #[serde(rename = "ISO", alias = "iso")]
    Iso,
    /// Modified ISO used in Besselink (2000).
    #[serde(rename = "Adapted ISO")]
    AdaptedIso,
}

impl SignConvention {
    pub const ALL: [SignConvention; 4] = [
        SignConvention::Sae,
        SignConvention::AdaptedSae,
        SignConvention::Iso,
        SignConvention::AdaptedIso,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SignConvention::Sae => "SAE",
            SignConvention::AdaptedSae => "Adapted SAE",
            SignConvention::Iso => "ISO",
            SignConvention::AdaptedIso => "Adapted ISO",
        }
    }

    /// Column index into sign tables.
    pub fn index(self) -> usize {
        match self {
            SignConvention::Sae => 0,
            SignConvention::AdaptedSae => 1,
            SignConvention::Iso => 2,
            SignConvention::AdaptedIso => 3,
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|c| c.label().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for SignConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical quantity a channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Length,
    Force,
    Moment,
    Pressure,
    Angle,
    Speed,
    RotationalSpeed,
    Temperature,
    Time,
    /// Slip ratio and other unitless ratios.
    Dimensionless,
    /// No unit or name mapping matched; never converted.
    Unknown,
}

impl QuantityKind {
    /// Resolve a kind from a rig channel name (`FZ`, `CmdSA`, `TSTI`, ...).
    pub fn from_channel_name(name: &str) -> Self {
        let base = name.strip_prefix("Cmd").unwrap_or(name);
        match base {
            "RL" | "RE" => QuantityKind::Length,
            "FX" | "FY" | "FZ" => QuantityKind::Force,
            "MX" | "MY" | "MZ" => QuantityKind::Moment,
            "P" => QuantityKind::Pressure,
            "SA" | "IA" => QuantityKind::Angle,
            "V" => QuantityKind::Speed,
            "N" => QuantityKind::RotationalSpeed,
            "RST" | "TSTI" | "TSTC" | "TSTO" | "AmbTmp" => QuantityKind::Temperature,
            "ET" => QuantityKind::Time,
            "SR" | "SL" => QuantityKind::Dimensionless,
            _ => QuantityKind::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuantityKind::Length => "length",
            QuantityKind::Force => "force",
            QuantityKind::Moment => "moment",
            QuantityKind::Pressure => "pressure",
            QuantityKind::Angle => "angle",
            QuantityKind::Speed => "speed",
            QuantityKind::RotationalSpeed => "rotational speed",
            QuantityKind::Temperature => "temperature",
            QuantityKind::Time => "time",
            QuantityKind::Dimensionless => "dimensionless",
            QuantityKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a channel's samples came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Recorded by the rig.
    Raw,
    /// Computed from other channels (filtered copies, etc.).
    Derived,
    /// Discretized nominal test condition (`CmdFZ`, ...).
    Command,
}

/// Tire model families the fitter understands.
///
/// Adding a family means adding a variant here; every `match` on it in
/// `models` must then be extended before the crate compiles again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    /// `y = a0 + a1 x + ... + ad x^d`.
    Polynomial { degree: u8 },
    /// Pacejka Magic Formula `y = D sin(C atan(Bx - E(Bx - atan(Bx))))`.
    MagicFormula,
    /// Magic Formula with horizontal (`Sh`) and vertical (`Sv`) shifts.
    MagicFormulaShifted,
}

/// Fit quality diagnostics, computed on every input sample of the fitted dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitQuality {
    /// Coefficient of determination, clamped to `[0, 1]`.
    pub r_squared: f64,
    pub rmse: f64,
    pub sse: f64,
    /// Number of finite samples the metrics were computed on.
    pub n: usize,
}

/// Output of a single model fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub model: ModelKind,
    pub x_channel: String,
    pub y_channel: String,
    /// Parameter name -> fitted value (in model order via `param_names`).
    pub parameters: BTreeMap<String, f64>,
    /// Parameter name -> standard error, when the problem is overdetermined.
    pub uncertainties: Option<BTreeMap<String, f64>>,
    pub quality: FitQuality,
    /// `y - y_fit` for every row of the input dataset (NaN where inputs were not finite).
    pub residuals: Vec<f64>,
    pub iterations: usize,
}

impl FitResult {
    /// Parameter values in model order.
    pub fn values(&self) -> Vec<f64> {
        self.model
            .param_names()
            .iter()
            .map(|n| self.parameters.get(n.as_str()).copied().unwrap_or(f64::NAN))
            .collect()
    }
}
