//! Synthetic cornering data in the shape of a TTC rig log.
//!
//! The sweep holds each normal load for an equal block of rows and runs one slip
//! angle triangle (0 -> +A -> -A -> 0) per block. Lateral force follows a Magic
//! Formula whose peak scales with load, plus Gaussian noise. Values are USCS/SAE,
//! like the raw consortium logs.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{Channel, Dataset, DatasetId, DatasetMeta, QuantityKind, SignConvention, UnitSystem};
use crate::error::TireError;
use crate::models::magic_formula;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub rows: usize,
    pub seed: u64,
    pub sample_rate_hz: f64,
    /// Normal load steps, lbf (SAE: negative is compression).
    pub fz_levels: Vec<f64>,
    /// Slip angle sweep amplitude, deg.
    pub sa_amplitude: f64,
    /// Magic Formula shape for FY vs SA (deg).
    pub stiffness: f64,
    pub shape: f64,
    pub curvature: f64,
    /// Peak friction coefficient, `|D| = mu * |FZ|`.
    pub mu: f64,
    pub fy_noise: f64,
    pub fz_noise: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            rows: 1000,
            seed: 42,
            sample_rate_hz: 100.0,
            fz_levels: vec![-50.0, -100.0, -150.0],
            sa_amplitude: 12.0,
            stiffness: 0.25,
            shape: 1.5,
            curvature: -0.5,
            mu: 2.2,
            fy_noise: 2.0,
            fz_noise: 0.5,
        }
    }
}

pub fn generate_sample(config: &SampleConfig) -> Result<Dataset, TireError> {
    if config.rows < 2 {
        return Err(TireError::config("sample needs at least 2 rows"));
    }
    if config.fz_levels.is_empty() {
        return Err(TireError::config("sample needs at least one FZ level"));
    }
    if !(config.sample_rate_hz > 0.0) {
        return Err(TireError::config("sample rate must be positive"));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let fy_noise = noise(config.fy_noise)?;
    let fz_noise = noise(config.fz_noise)?;

    let block = config.rows.div_ceil(config.fz_levels.len());
    let n = config.rows;
    let mut et = Vec::with_capacity(n);
    let mut fz = Vec::with_capacity(n);
    let mut sa = Vec::with_capacity(n);
    let mut fy = Vec::with_capacity(n);

    for i in 0..n {
        let level = config.fz_levels[(i / block).min(config.fz_levels.len() - 1)];
        let phase = (i % block) as f64 / block as f64;
        let alpha = config.sa_amplitude * triangle(phase);
        let load = level + fz_noise.sample(&mut rng);
        // SAE: positive slip produces negative lateral force.
        let peak = -config.mu * load.abs();
        let force = magic_formula(alpha, config.stiffness, config.shape, peak, config.curvature);

        et.push(i as f64 / config.sample_rate_hz);
        fz.push(load);
        sa.push(alpha);
        fy.push(force + fy_noise.sample(&mut rng));
    }

    let ia = vec![0.0; n];
    let meta = DatasetMeta {
        name: "synthetic".to_string(),
        tire_id: "synthetic 18.0x6.0-10".to_string(),
        rim_width: Some(6.0),
        test_date: None,
        notes: format!("seed={}", config.seed),
    };
    Dataset::new(
        DatasetId::from("synthetic"),
        PathBuf::new(),
        vec![
            Channel::new("ET", "sec", QuantityKind::Time, et),
            Channel::new("SA", "deg", QuantityKind::Angle, sa),
            Channel::new("IA", "deg", QuantityKind::Angle, ia),
            Channel::new("FZ", "lb", QuantityKind::Force, fz),
            Channel::new("FY", "lb", QuantityKind::Force, fy),
        ],
        Some(UnitSystem::Uscs),
        SignConvention::Sae,
        meta,
    )
}

fn noise(std_dev: f64) -> Result<Normal<f64>, TireError> {
    Normal::new(0.0, std_dev).map_err(|e| TireError::config(format!("invalid noise level {std_dev}: {e}")))
}

/// 0 -> 1 -> -1 -> 0 over one period.
fn triangle(phase: f64) -> f64 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() {
        let a = generate_sample(&SampleConfig::default()).unwrap();
        let b = generate_sample(&SampleConfig::default()).unwrap();
        assert_eq!(a.values("FY").unwrap(), b.values("FY").unwrap());

        let c = generate_sample(&SampleConfig {
            seed: 7,
            ..SampleConfig::default()
        })
        .unwrap();
        assert_ne!(a.values("FY").unwrap(), c.values("FY").unwrap());
    }

    #[test]
    fn loads_step_through_the_levels() {
        let ds = generate_sample(&SampleConfig::default()).unwrap();
        assert_eq!(ds.len(), 1000);
        let fz = ds.values("FZ").unwrap();
        assert!((fz[10] + 50.0).abs() < 5.0);
        assert!((fz[500] + 100.0).abs() < 5.0);
        assert!((fz[990] + 150.0).abs() < 5.0);
        let sa = ds.values("SA").unwrap();
        let max = sa.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(max <= 12.0 && max > 11.5);
    }

    #[test]
    fn lateral_force_opposes_slip() {
        let ds = generate_sample(&SampleConfig {
            fy_noise: 0.0,
            ..SampleConfig::default()
        })
        .unwrap();
        let sa = ds.values("SA").unwrap();
        let fy = ds.values("FY").unwrap();
        for (a, f) in sa.iter().zip(fy) {
            if a.abs() > 1.0 {
                assert!(a.signum() != f.signum(), "SA {a} FY {f}");
            }
        }
    }

    #[test]
    fn rejects_degenerate_configs() {
        assert!(
            generate_sample(&SampleConfig {
                rows: 1,
                ..SampleConfig::default()
            })
            .is_err()
        );
        assert!(
            generate_sample(&SampleConfig {
                fy_noise: -1.0,
                ..SampleConfig::default()
            })
            .is_err()
        );
    }
}
