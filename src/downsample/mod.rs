//! Point reduction for large sweeps.
//!
//! Every strategy returns a sorted, duplicate-free row index set that always
//! contains the first and last row. Indices apply to every channel, so the derived
//! dataset (`Dataset::select_rows`) stays row-synchronized. The source dataset is
//! never modified.
//!
//! `factor` is the nominal reduction ratio. With `target = max(ceil(len / factor), 2)`,
//! no strategy keeps more than `target + 1` rows (uniform may add the last row).

use std::collections::BTreeSet;
use std::fmt;

use clap::ValueEnum;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::domain::Dataset;
use crate::error::TireError;

/// Strategy name as written in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMethod {
    Uniform,
    Random,
    Grid,
    Smart,
}

impl fmt::Display for DownsampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownsampleMethod::Uniform => "uniform",
            DownsampleMethod::Random => "random",
            DownsampleMethod::Grid => "grid",
            DownsampleMethod::Smart => "smart",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownsampleStrategy {
    /// Every `factor`-th row.
    Uniform { factor: usize },
    /// Seeded random subset; the same seed always selects the same rows.
    Random { factor: usize, seed: u64 },
    /// Regular bins over `x_channel`, one row per occupied bin (nearest the bin centre).
    Grid { factor: usize, x_channel: String },
    /// Bins over `x_channel`, keeping the min and max of `y_channel` in each bin
    /// plus the global extrema of `y_channel`.
    Smart {
        factor: usize,
        x_channel: String,
        y_channel: String,
    },
}

impl DownsampleStrategy {
    pub fn factor(&self) -> usize {
        match self {
            DownsampleStrategy::Uniform { factor }
            | DownsampleStrategy::Random { factor, .. }
            | DownsampleStrategy::Grid { factor, .. }
            | DownsampleStrategy::Smart { factor, .. } => *factor,
        }
    }

    pub fn method(&self) -> DownsampleMethod {
        match self {
            DownsampleStrategy::Uniform { .. } => DownsampleMethod::Uniform,
            DownsampleStrategy::Random { .. } => DownsampleMethod::Random,
            DownsampleStrategy::Grid { .. } => DownsampleMethod::Grid,
            DownsampleStrategy::Smart { .. } => DownsampleMethod::Smart,
        }
    }
}

/// One x bin (its min and max) plus both endpoints.
const SMART_MIN_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct DataDownsampler;

impl DataDownsampler {
    /// Rows to keep.
    pub fn indices(&self, dataset: &Dataset, strategy: &DownsampleStrategy) -> Result<Vec<usize>, TireError> {
        let factor = strategy.factor();
        if factor == 0 {
            return Err(TireError::validation(Some(&dataset.id), "downsample factor must be positive"));
        }
        let len = dataset.len();
        if len <= 2 || factor == 1 {
            return Ok((0..len).collect());
        }
        let target = len.div_ceil(factor).max(2);

        let mut keep: BTreeSet<usize> = match strategy {
            DownsampleStrategy::Uniform { factor } => uniform(len, *factor),
            DownsampleStrategy::Random { seed, .. } => random(len, target, *seed),
            DownsampleStrategy::Grid { x_channel, factor } => {
                let x = dataset.values(x_channel)?;
                grid(x, target).unwrap_or_else(|| {
                    debug!("'{x_channel}' has no spread; falling back to uniform");
                    uniform(len, *factor)
                })
            }
            DownsampleStrategy::Smart {
                x_channel,
                y_channel,
                factor,
            } => {
                let x = dataset.values(x_channel)?;
                let y = dataset.values(y_channel)?;
                if target < SMART_MIN_ROWS {
                    debug!("{target} rows requested; too few for min/max bins, using uniform");
                    uniform(len, *factor)
                } else {
                    smart(x, y, target).unwrap_or_else(|| {
                        debug!("'{x_channel}' has no spread; falling back to uniform");
                        uniform(len, *factor)
                    })
                }
            }
        };
        keep.insert(0);
        keep.insert(len - 1);
        Ok(keep.into_iter().collect())
    }

    /// Derived dataset holding only the kept rows.
    pub fn downsample(&self, dataset: &Dataset, strategy: &DownsampleStrategy) -> Result<Dataset, TireError> {
        let rows = self.indices(dataset, strategy)?;
        info!(
            "Downsampled '{}' ({}): {} -> {} rows",
            dataset.id,
            strategy.method(),
            dataset.len(),
            rows.len()
        );
        dataset.select_rows(&rows)
    }
}

fn uniform(len: usize, factor: usize) -> BTreeSet<usize> {
    (0..len).step_by(factor).collect()
}

fn random(len: usize, target: usize, seed: u64) -> BTreeSet<usize> {
    let interior = len - 2;
    let k = target.saturating_sub(2).min(interior);
    let mut rng = StdRng::seed_from_u64(seed);
    index::sample(&mut rng, interior, k).into_iter().map(|i| i + 1).collect()
}

/// Bin layout over the finite range of `x`; `None` if `x` has no spread.
fn bins(x: &[f64], count: usize) -> Option<(f64, f64, usize)> {
    let (lo, hi) = x
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(hi > lo) {
        return None;
    }
    let count = count.max(1);
    Some((lo, (hi - lo) / count as f64, count))
}

fn bin_of(v: f64, lo: f64, width: f64, count: usize) -> usize {
    (((v - lo) / width) as usize).min(count - 1)
}

fn grid(x: &[f64], target: usize) -> Option<BTreeSet<usize>> {
    let (lo, width, count) = bins(x, target.saturating_sub(2))?;
    let mut best: Vec<Option<(usize, f64)>> = vec![None; count];
    for (i, &v) in x.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        let b = bin_of(v, lo, width, count);
        let centre = lo + (b as f64 + 0.5) * width;
        let d = (v - centre).abs();
        if best[b].is_none_or(|(_, bd)| d < bd) {
            best[b] = Some((i, d));
        }
    }
    Some(best.into_iter().flatten().map(|(i, _)| i).collect())
}

fn smart(x: &[f64], y: &[f64], target: usize) -> Option<BTreeSet<usize>> {
    let (lo, width, count) = bins(x, target.saturating_sub(4) / 2)?;
    let mut lows: Vec<Option<usize>> = vec![None; count];
    let mut highs: Vec<Option<usize>> = vec![None; count];
    let mut global_min: Option<usize> = None;
    let mut global_max: Option<usize> = None;

    let lower = |slot: &mut Option<usize>, i: usize| {
        if slot.is_none_or(|j| y[i] < y[j]) {
            *slot = Some(i);
        }
    };
    let higher = |slot: &mut Option<usize>, i: usize| {
        if slot.is_none_or(|j| y[i] > y[j]) {
            *slot = Some(i);
        }
    };

    for i in 0..x.len() {
        if !(x[i].is_finite() && y[i].is_finite()) {
            continue;
        }
        let b = bin_of(x[i], lo, width, count);
        lower(&mut lows[b], i);
        higher(&mut highs[b], i);
        lower(&mut global_min, i);
        higher(&mut global_max, i);
    }

    Some(
        lows.into_iter()
            .chain(highs)
            .chain([global_min, global_max])
            .flatten()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, DatasetId, DatasetMeta, QuantityKind, SignConvention, UnitSystem};
    use std::path::PathBuf;

    /// Triangle slip sweep with a lateral force peak at a single row.
    fn sweep(n: usize) -> Dataset {
        let sa: Vec<f64> = (0..n)
            .map(|i| {
                let u = i as f64 / (n - 1) as f64;
                if u < 0.5 { -12.0 + 48.0 * u } else { 36.0 - 48.0 * u }
            })
            .collect();
        let mut fy: Vec<f64> = sa.iter().map(|a| -150.0 * a).collect();
        fy[n / 3] = 5000.0;
        Dataset::new(
            DatasetId::from("ds"),
            PathBuf::new(),
            vec![
                Channel::new("SA", "deg", QuantityKind::Angle, sa),
                Channel::new("FY", "N", QuantityKind::Force, fy),
            ],
            Some(UnitSystem::Metric),
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap()
    }

    fn all_strategies() -> Vec<DownsampleStrategy> {
        vec![
            DownsampleStrategy::Uniform { factor: 7 },
            DownsampleStrategy::Random { factor: 7, seed: 42 },
            DownsampleStrategy::Grid {
                factor: 7,
                x_channel: "SA".into(),
            },
            DownsampleStrategy::Smart {
                factor: 7,
                x_channel: "SA".into(),
                y_channel: "FY".into(),
            },
        ]
    }

    #[test]
    fn every_strategy_keeps_endpoints_sorted_and_unique() {
        let ds = sweep(1000);
        for s in all_strategies() {
            let idx = DataDownsampler.indices(&ds, &s).unwrap();
            assert_eq!(idx.first(), Some(&0), "{s:?}");
            assert_eq!(idx.last(), Some(&999), "{s:?}");
            assert!(idx.windows(2).all(|w| w[0] < w[1]), "{s:?}");
            assert!(idx.len() < 1000 / 3, "{s:?} kept {}", idx.len());
        }
    }

    #[test]
    fn kept_rows_stay_within_one_of_the_target() {
        for len in [3, 4, 9, 10, 11, 37, 250, 1000] {
            let ds = sweep(len);
            for factor in [2, 3, 5, 7, 20] {
                let target = len.div_ceil(factor).max(2);
                let strategies = [
                    DownsampleStrategy::Uniform { factor },
                    DownsampleStrategy::Random { factor, seed: 3 },
                    DownsampleStrategy::Grid {
                        factor,
                        x_channel: "SA".into(),
                    },
                    DownsampleStrategy::Smart {
                        factor,
                        x_channel: "SA".into(),
                        y_channel: "FY".into(),
                    },
                ];
                for s in strategies {
                    let idx = DataDownsampler.indices(&ds, &s).unwrap();
                    assert!(idx.len() <= target + 1, "{s:?} len {len}: kept {} for target {target}", idx.len());
                    assert!(idx.len() >= 2, "{s:?} len {len}");
                    match s {
                        DownsampleStrategy::Uniform { .. } => {
                            let extra = usize::from((len - 1) % factor != 0);
                            assert_eq!(idx.len(), len.div_ceil(factor) + extra, "len {len} factor {factor}");
                        }
                        DownsampleStrategy::Random { .. } => assert_eq!(idx.len(), target, "len {len} factor {factor}"),
                        _ => {}
                    }
                }
            }
        }
    }

    #[test]
    fn smart_on_a_short_sweep_keeps_at_most_three_rows() {
        let ds = sweep(10);
        let s = DownsampleStrategy::Smart {
            factor: 5,
            x_channel: "SA".into(),
            y_channel: "FY".into(),
        };
        assert_eq!(DataDownsampler.indices(&ds, &s).unwrap(), vec![0, 5, 9]);
    }

    #[test]
    fn uniform_takes_every_nth() {
        let ds = sweep(10);
        let idx = DataDownsampler
            .indices(&ds, &DownsampleStrategy::Uniform { factor: 4 })
            .unwrap();
        assert_eq!(idx, vec![0, 4, 8, 9]);
    }

    #[test]
    fn random_is_reproducible_per_seed() {
        let ds = sweep(1000);
        let a = DataDownsampler
            .indices(&ds, &DownsampleStrategy::Random { factor: 5, seed: 1 })
            .unwrap();
        let b = DataDownsampler
            .indices(&ds, &DownsampleStrategy::Random { factor: 5, seed: 1 })
            .unwrap();
        let c = DataDownsampler
            .indices(&ds, &DownsampleStrategy::Random { factor: 5, seed: 2 })
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 200);
    }

    #[test]
    fn grid_keeps_at_most_one_row_per_bin() {
        let ds = sweep(1000);
        let idx = DataDownsampler
            .indices(
                &ds,
                &DownsampleStrategy::Grid {
                    factor: 5,
                    x_channel: "SA".into(),
                },
            )
            .unwrap();
        assert!(idx.len() <= 200, "kept {}", idx.len());
        assert!(idx.len() >= 190, "kept {}", idx.len());
    }

    #[test]
    fn smart_keeps_the_peak() {
        let ds = sweep(1000);
        let s = DownsampleStrategy::Smart {
            factor: 20,
            x_channel: "SA".into(),
            y_channel: "FY".into(),
        };
        let out = DataDownsampler.downsample(&ds, &s).unwrap();
        let fy = out.values("FY").unwrap();
        assert!(fy.contains(&5000.0));
        let max = fy.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(max, 5000.0);
        // Source untouched.
        assert_eq!(ds.len(), 1000);
    }

    #[test]
    fn rows_stay_synchronized() {
        let ds = sweep(500);
        let s = DownsampleStrategy::Random { factor: 4, seed: 9 };
        let idx = DataDownsampler.indices(&ds, &s).unwrap();
        let out = DataDownsampler.downsample(&ds, &s).unwrap();
        let sa = ds.values("SA").unwrap();
        let fy = ds.values("FY").unwrap();
        for (k, &i) in idx.iter().enumerate() {
            assert_eq!(out.values("SA").unwrap()[k], sa[i]);
            assert_eq!(out.values("FY").unwrap()[k], fy[i]);
        }
    }

    #[test]
    fn zero_factor_is_rejected() {
        let ds = sweep(10);
        assert!(
            DataDownsampler
                .indices(&ds, &DownsampleStrategy::Uniform { factor: 0 })
                .is_err()
        );
    }
}
