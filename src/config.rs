//! Pipeline configuration (TOML).
//!
//! ```toml
//! unit_system = "Metric"
//! sign_convention = "ISO"
//! downsample_strategy = "grid"
//! downsample_factor = 5
//! filter_type = "lowpass"
//! filter_cutoff = 10.0
//! outlier_threshold = 3.5
//! ```
//!
//! Every key is optional. A missing conditioning key disables that step. Unknown
//! keys are rejected.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::convert::CommandOptions;
use crate::domain::{SignConvention, UnitSystem};
use crate::downsample::{DownsampleMethod, DownsampleStrategy};
use crate::error::TireError;
use crate::signal::{FilterSpec, FilterType, OutlierMethod};

/// Environment variable naming the default config file.
pub const CONFIG_ENV: &str = "TIREFIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Target unit system; `None` keeps the imported one.
    pub unit_system: Option<UnitSystem>,
    /// Target sign convention; `None` keeps the imported one.
    pub sign_convention: Option<SignConvention>,
    pub downsample_strategy: Option<DownsampleMethod>,
    pub downsample_factor: usize,
    pub downsample_seed: u64,
    pub downsample_x_channel: String,
    pub downsample_y_channel: String,
    pub filter_type: FilterType,
    /// Cutoff, or the lower band edge for band filters, Hz.
    pub filter_cutoff: Option<f64>,
    /// Upper band edge for band-pass and band-stop, Hz.
    pub filter_cutoff_high: Option<f64>,
    pub filter_order: usize,
    pub outlier_threshold: Option<f64>,
    pub outlier_method: OutlierMethod,
    pub cmd_tolerance_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            unit_system: None,
            sign_convention: None,
            downsample_strategy: None,
            downsample_factor: 5,
            downsample_seed: 42,
            downsample_x_channel: "SA".to_string(),
            downsample_y_channel: "FY".to_string(),
            filter_type: FilterType::Lowpass,
            filter_cutoff: None,
            filter_cutoff_high: None,
            filter_order: 4,
            outlier_threshold: None,
            outlier_method: OutlierMethod::Zscore,
            cmd_tolerance_fraction: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, TireError> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| TireError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, TireError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TireError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: PipelineConfig =
            toml::from_str(&text).map_err(|e| TireError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// `path` if given, else the file named by `TIREFIT_CONFIG`, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, TireError> {
        if let Some(p) = path {
            return Self::load(p);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Self::load(&PathBuf::from(p)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), TireError> {
        if self.downsample_factor == 0 {
            return Err(TireError::config("downsample_factor must be a positive integer"));
        }
        if let Some(c) = self.filter_cutoff {
            if !(c.is_finite() && c > 0.0) {
                return Err(TireError::config(format!("filter_cutoff must be positive, got {c}")));
            }
        }
        if self.filter_order == 0 {
            return Err(TireError::config("filter_order must be at least 1"));
        }
        if let (true, Some(low)) = (self.filter_type.is_band(), self.filter_cutoff) {
            match self.filter_cutoff_high {
                Some(high) if high.is_finite() && high > low => {}
                Some(high) => {
                    return Err(TireError::config(format!(
                        "filter_cutoff_high ({high}) must exceed filter_cutoff ({low})"
                    )));
                }
                None => return Err(TireError::config("band filters need filter_cutoff_high")),
            }
        }
        if let Some(t) = self.outlier_threshold {
            if !(t.is_finite() && t > 0.0) {
                return Err(TireError::config(format!("outlier_threshold must be positive, got {t}")));
            }
        }
        if !(self.cmd_tolerance_fraction.is_finite() && self.cmd_tolerance_fraction > 0.0) {
            return Err(TireError::config("cmd_tolerance_fraction must be positive"));
        }
        Ok(())
    }

    pub fn filter_spec(&self) -> Option<FilterSpec> {
        self.filter_cutoff.map(|cutoff| FilterSpec {
            kind: self.filter_type,
            cutoff_hz: cutoff,
            high_cutoff_hz: self.filter_cutoff_high,
            order: self.filter_order,
            zero_phase: true,
        })
    }

    pub fn downsample(&self) -> Option<DownsampleStrategy> {
        let factor = self.downsample_factor;
        self.downsample_strategy.map(|method| match method {
            DownsampleMethod::Uniform => DownsampleStrategy::Uniform { factor },
            DownsampleMethod::Random => DownsampleStrategy::Random {
                factor,
                seed: self.downsample_seed,
            },
            DownsampleMethod::Grid => DownsampleStrategy::Grid {
                factor,
                x_channel: self.downsample_x_channel.clone(),
            },
            DownsampleMethod::Smart => DownsampleStrategy::Smart {
                factor,
                x_channel: self.downsample_x_channel.clone(),
                y_channel: self.downsample_y_channel.clone(),
            },
        })
    }

    pub fn command_options(&self) -> CommandOptions {
        CommandOptions {
            tolerance_fraction: self.cmd_tolerance_fraction,
            ..CommandOptions::default()
        }
    }
}
