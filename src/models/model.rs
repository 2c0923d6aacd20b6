//! Model evaluation, parameter metadata and starting guesses.
//!
//! The fitter relies on four primitive operations per model kind:
//! - parameter names (which also fixes the parameter count and order)
//! - box bounds, derived from the data range where a parameter has physical scale
//! - `evaluate(x, params)`
//! - a default initial guess when the caller supplies none
//!
//! Magic Formula:
//!
//! ```text
//! y = D sin(C atan(B x - E (B x - atan(B x))))
//! ```
//!
//! The shifted variant evaluates the same curve at `x + Sh` and adds `Sv`.

use std::fmt;
use std::str::FromStr;

use crate::domain::ModelKind;
use crate::error::FitError;
use crate::math::{finite_values, mean};

/// Highest polynomial degree accepted.
pub const MAX_POLY_DEGREE: u8 = 5;

/// Default shape factor; typical for lateral force.
const DEFAULT_C: f64 = 1.3;

/// Fraction of the x range treated as the linear region when estimating stiffness.
const LINEAR_REGION: f64 = 0.2;

impl ModelKind {
    pub fn param_names(&self) -> Vec<String> {
        match self {
            ModelKind::Polynomial { degree } => (0..=*degree).map(|i| format!("a{i}")).collect(),
            ModelKind::MagicFormula => ["B", "C", "D", "E"].map(String::from).to_vec(),
            ModelKind::MagicFormulaShifted => ["B", "C", "D", "E", "Sh", "Sv"].map(String::from).to_vec(),
        }
    }

    pub fn param_count(&self) -> usize {
        match self {
            ModelKind::Polynomial { degree } => *degree as usize + 1,
            ModelKind::MagicFormula => 4,
            ModelKind::MagicFormulaShifted => 6,
        }
    }

    /// Linear in its parameters (solved directly, no iteration).
    pub fn is_linear(&self) -> bool {
        matches!(self, ModelKind::Polynomial { .. })
    }

    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            ModelKind::Polynomial { .. } => params.iter().rev().fold(0.0, |acc, a| acc * x + a),
            ModelKind::MagicFormula => magic_formula(x, params[0], params[1], params[2], params[3]),
            ModelKind::MagicFormulaShifted => {
                magic_formula(x + params[4], params[0], params[1], params[2], params[3]) + params[5]
            }
        }
    }

    /// `(lower, upper)` per parameter for the given data.
    pub fn bounds(&self, x: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
        let x_span = max_abs(x).max(1.0);
        let y_span = max_abs(y).max(1.0);
        let mf = [(1e-6, 100.0), (0.1, 5.0), (-10.0 * y_span, 10.0 * y_span), (-20.0, 1.0)];
        match self {
            ModelKind::Polynomial { .. } => vec![(f64::NEG_INFINITY, f64::INFINITY); self.param_count()],
            ModelKind::MagicFormula => mf.to_vec(),
            ModelKind::MagicFormulaShifted => {
                let mut b = mf.to_vec();
                b.push((-x_span, x_span));
                b.push((-y_span, y_span));
                b
            }
        }
    }

    /// Starting point estimated from the data.
    ///
    /// For the Magic Formula: `D` is the peak magnitude carrying the sign of the
    /// initial slope, and `B` follows from the slope `BCD` near the origin.
    pub fn initial_guess(&self, x: &[f64], y: &[f64]) -> Vec<f64> {
        match self {
            ModelKind::Polynomial { .. } => vec![0.0; self.param_count()],
            ModelKind::MagicFormula | ModelKind::MagicFormulaShifted => {
                let k0 = origin_slope(x, y);
                let peak = max_abs(y).max(f64::MIN_POSITIVE);
                let d = if k0 < 0.0 { -peak } else { peak };
                let b = (k0.abs() / (DEFAULT_C * peak)).clamp(1e-6, 100.0);
                let mut guess = vec![b, DEFAULT_C, d, 0.0];
                if *self == ModelKind::MagicFormulaShifted {
                    guess.extend([0.0, 0.0]);
                }
                guess
            }
        }
    }

    /// Reject model kinds the fitter cannot handle (e.g. a deserialized degree 9).
    pub fn validate(&self) -> Result<(), FitError> {
        match self {
            ModelKind::Polynomial { degree } if *degree == 0 || *degree > MAX_POLY_DEGREE => {
                Err(FitError::InvalidBounds {
                    model: *self,
                    message: format!("polynomial degree must be in 1..={MAX_POLY_DEGREE}"),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Polynomial { degree } => write!(f, "poly{degree}"),
            ModelKind::MagicFormula => f.write_str("mf"),
            ModelKind::MagicFormulaShifted => f.write_str("mf-shifted"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "mf" | "magic-formula" => Ok(ModelKind::MagicFormula),
            "mf-shifted" | "magic-formula-shifted" => Ok(ModelKind::MagicFormulaShifted),
            other => {
                let degree = other
                    .strip_prefix("poly")
                    .and_then(|d| d.parse::<u8>().ok())
                    .filter(|d| (1..=MAX_POLY_DEGREE).contains(d))
                    .ok_or_else(|| FitError::UnknownModel(s.to_string()))?;
                Ok(ModelKind::Polynomial { degree })
            }
        }
    }
}

pub fn magic_formula(x: f64, b: f64, c: f64, d: f64, e: f64) -> f64 {
    let bx = b * x;
    d * (c * (bx - e * (bx - bx.atan())).atan()).sin()
}

fn max_abs(values: &[f64]) -> f64 {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// Least-squares slope through the samples nearest the origin.
fn origin_slope(x: &[f64], y: &[f64]) -> f64 {
    let limit = LINEAR_REGION * max_abs(x);
    let near: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(xi, yi)| xi.is_finite() && yi.is_finite() && xi.abs() <= limit)
        .map(|(&xi, &yi)| (xi, yi))
        .collect();
    let pairs: Vec<(f64, f64)> = if near.len() >= 3 {
        near
    } else {
        x.iter()
            .zip(y)
            .filter(|(xi, yi)| xi.is_finite() && yi.is_finite())
            .map(|(&xi, &yi)| (xi, yi))
            .collect()
    };

    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let (Some(mx), Some(my)) = (mean(&finite_values(&xs)), mean(&finite_values(&ys))) else {
        return 0.0;
    };
    let sxx: f64 = xs.iter().map(|v| (v - mx) * (v - mx)).sum();
    if sxx == 0.0 {
        return 0.0;
    }
    let sxy: f64 = xs.iter().zip(&ys).map(|(a, b)| (a - mx) * (b - my)).sum();
    sxy / sxx
}
