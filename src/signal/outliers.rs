//! Outlier detection.
//!
//! Detection never shortens a channel. Flagged samples become NaN in `cleaned` and
//! `mask[i]` is `true`; callers wanting synchronized removal pass the mask to
//! `Dataset::drop_rows`. Samples that are already non-finite are left as they are
//! and never flagged.

use serde::{Deserialize, Serialize};

use crate::error::TireError;
use crate::math::{finite_values, median_mut, percentile_sorted, std_dev};

/// Window used by `OutlierMethod::Local` when none is given.
pub const DEFAULT_LOCAL_WINDOW: usize = 11;

/// MAD to standard deviation for normally distributed data.
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    /// |x - mean| / std > threshold.
    #[serde(alias = "z-score")]
    Zscore,
    /// Outside [Q1 - t·IQR, Q3 + t·IQR].
    Iqr,
    /// Deviation from a rolling median, scaled by the rolling MAD.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    pub cleaned: Vec<f64>,
    pub mask: Vec<bool>,
}

impl OutlierReport {
    pub fn flagged(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

pub fn remove_outliers(values: &[f64], method: OutlierMethod, threshold: f64) -> Result<OutlierReport, TireError> {
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(TireError::validation(
            None,
            format!("outlier threshold must be positive, got {threshold}"),
        ));
    }
    let mask = match method {
        OutlierMethod::Zscore => zscore_mask(values, threshold),
        OutlierMethod::Iqr => iqr_mask(values, threshold),
        OutlierMethod::Local => local_mask(values, DEFAULT_LOCAL_WINDOW, threshold)?,
    };
    let cleaned = values
        .iter()
        .zip(&mask)
        .map(|(&v, &m)| if m { f64::NAN } else { v })
        .collect();
    Ok(OutlierReport { cleaned, mask })
}

fn zscore_mask(values: &[f64], threshold: f64) -> Vec<bool> {
    let finite = finite_values(values);
    let (Some(mean), Some(std)) = (crate::math::mean(&finite), std_dev(&finite)) else {
        return vec![false; values.len()];
    };
    if std == 0.0 {
        return vec![false; values.len()];
    }
    values
        .iter()
        .map(|v| v.is_finite() && ((v - mean) / std).abs() > threshold)
        .collect()
}

fn iqr_mask(values: &[f64], threshold: f64) -> Vec<bool> {
    let mut sorted = finite_values(values);
    sorted.sort_by(f64::total_cmp);
    let (Some(q1), Some(q3)) = (percentile_sorted(&sorted, 25.0), percentile_sorted(&sorted, 75.0)) else {
        return vec![false; values.len()];
    };
    let iqr = q3 - q1;
    let lo = q1 - threshold * iqr;
    let hi = q3 + threshold * iqr;
    values.iter().map(|&v| v.is_finite() && (v < lo || v > hi)).collect()
}

/// Rolling-median detector for spikes riding on a trend.
///
/// `window` must be odd and at least 3. Windows are truncated at the ends.
pub fn local_mask(values: &[f64], window: usize, threshold: f64) -> Result<Vec<bool>, TireError> {
    if window < 3 || window % 2 == 0 {
        return Err(TireError::validation(
            None,
            format!("local outlier window must be odd and >= 3, got {window}"),
        ));
    }
    let half = window / 2;
    let n = values.len();
    let mut buf = Vec::with_capacity(window);
    let mut dev = Vec::with_capacity(window);
    let mut mask = vec![false; n];

    for i in 0..n {
        let v = values[i];
        if !v.is_finite() {
            continue;
        }
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        buf.clear();
        buf.extend(values[lo..hi].iter().copied().filter(|x| x.is_finite()));
        let Some(med) = median_mut(&mut buf) else { continue };
        dev.clear();
        dev.extend(buf.iter().map(|x| (x - med).abs()));
        let mad = median_mut(&mut dev).unwrap_or(0.0);
        let scale = (MAD_SCALE * mad).max(f64::EPSILON * med.abs().max(1.0));
        mask[i] = (v - med).abs() / scale > threshold;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_spike() -> Vec<f64> {
        let mut v: Vec<f64> = (0..200).map(|i| (i as f64 * 0.1).sin()).collect();
        v[57] = 40.0;
        v
    }

    #[test]
    fn zscore_flags_spike_only() {
        let r = remove_outliers(&with_spike(), OutlierMethod::Zscore, 3.0).unwrap();
        assert_eq!(r.cleaned.len(), 200);
        assert_eq!(r.flagged(), 1);
        assert!(r.mask[57]);
        assert!(r.cleaned[57].is_nan());
    }

    #[test]
    fn iqr_flags_spike_only() {
        let r = remove_outliers(&with_spike(), OutlierMethod::Iqr, 1.5).unwrap();
        assert!(r.mask[57]);
        assert_eq!(r.flagged(), 1);
    }

    #[test]
    fn local_catches_spike_on_a_ramp() {
        // A global detector misses a spike riding on a large ramp.
        let mut v: Vec<f64> = (0..300).map(|i| i as f64).collect();
        v[150] += 50.0;
        let r = remove_outliers(&v, OutlierMethod::Local, 3.5).unwrap();
        assert!(r.mask[150]);
        assert_eq!(r.flagged(), 1);
        let z = remove_outliers(&v, OutlierMethod::Zscore, 3.0).unwrap();
        assert_eq!(z.flagged(), 0);
    }

    #[test]
    fn constant_channel_has_no_outliers() {
        let v = vec![2.5; 50];
        for m in [OutlierMethod::Zscore, OutlierMethod::Iqr, OutlierMethod::Local] {
            assert_eq!(remove_outliers(&v, m, 3.0).unwrap().flagged(), 0);
        }
    }

    #[test]
    fn local_leaves_clean_load_steps_alone() {
        // Command-style staircase: every window has zero MAD except at the steps.
        let steps: Vec<f64> = [-222.0, -445.0, -667.0, -445.0]
            .iter()
            .flat_map(|&level| std::iter::repeat_n(level, 60))
            .collect();
        let r = remove_outliers(&steps, OutlierMethod::Local, 3.5).unwrap();
        let flagged: Vec<usize> = (0..steps.len()).filter(|&i| r.mask[i]).collect();
        assert!(flagged.is_empty(), "{flagged:?}");
        assert_eq!(r.cleaned, steps);

        let mask = local_mask(&steps, 3, 3.5).unwrap();
        assert!(mask.iter().all(|m| !m));
    }

    #[test]
    fn local_flags_a_spike_on_a_flat_segment() {
        let mut v = vec![-445.0; 120];
        v[40] = -430.0;
        v[41] = f64::NAN;
        let r = remove_outliers(&v, OutlierMethod::Local, 3.5).unwrap();
        assert_eq!(r.flagged(), 1);
        assert!(r.mask[40]);
        assert!(!r.mask[41]);
        assert!(r.cleaned[39] == -445.0 && r.cleaned[42] == -445.0);
    }

    #[test]
    fn existing_nan_is_preserved_not_flagged() {
        let mut v = with_spike();
        v[3] = f64::NAN;
        let r = remove_outliers(&v, OutlierMethod::Zscore, 3.0).unwrap();
        assert!(!r.mask[3]);
        assert!(r.cleaned[3].is_nan());
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(remove_outliers(&[1.0], OutlierMethod::Zscore, 0.0).is_err());
        assert!(local_mask(&[1.0, 2.0], 4, 3.0).is_err());
    }
}
