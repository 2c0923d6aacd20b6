//! Signal conditioning on raw channel arrays.

pub mod filter;
pub mod outliers;

pub use filter::*;
pub use outliers::*;

use log::info;
use rayon::prelude::*;

use crate::domain::{Dataset, Provenance};
use crate::error::TireError;

/// Rate assumed when a dataset has no `ET` time channel.
pub const DEFAULT_RATE_HZ: f64 = 100.0;

/// Filter the named channels of `dataset`, returning a new dataset.
///
/// The `ET` channel is used as the time base when present. Filtered channels are
/// marked `Provenance::Derived`; command channels are never filtered.
pub fn apply_filter(dataset: &Dataset, channels: &[&str], spec: &FilterSpec) -> Result<Dataset, TireError> {
    let time = dataset.values("ET").ok();
    let clock = match time {
        Some(t) => SampleClock::Time(t),
        None => SampleClock::Rate(DEFAULT_RATE_HZ),
    };

    let filtered = channels
        .par_iter()
        .map(|&name| {
            let ch = dataset
                .channel(name)
                .ok_or_else(|| TireError::validation(Some(&dataset.id), format!("unknown channel '{name}'")))?;
            if ch.provenance == Provenance::Command {
                return Err(TireError::validation(
                    Some(&dataset.id),
                    format!("command channel '{name}' cannot be filtered"),
                ));
            }
            let values = butterworth(&ch.values, clock, spec)
                .map_err(|e| TireError::validation(Some(&dataset.id), format!("channel '{name}': {e}")))?;
            Ok((name, values))
        })
        .collect::<Result<Vec<_>, TireError>>()?;

    let mut out = dataset.clone();
    for ch in out.channels_mut() {
        if let Some((_, values)) = filtered.iter().find(|(n, _)| *n == ch.name) {
            ch.values.clone_from(values);
            ch.provenance = Provenance::Derived;
        }
    }
    info!(
        "Filtered {} channel(s) of '{}' ({:?} at {} Hz, order {})",
        filtered.len(),
        dataset.id,
        spec.kind,
        spec.cutoff_hz,
        spec.order
    );
    Ok(out)
}

/// Mask outliers in one channel; the dataset keeps its length.
pub fn mask_outliers(
    dataset: &Dataset,
    channel: &str,
    method: OutlierMethod,
    threshold: f64,
) -> Result<(Dataset, OutlierReport), TireError> {
    let values = dataset.values(channel)?;
    let report = remove_outliers(values, method, threshold)?;
    let mut out = dataset.clone();
    for ch in out.channels_mut() {
        if ch.name == channel {
            ch.values.clone_from(&report.cleaned);
            ch.provenance = Provenance::Derived;
        }
    }
    info!(
        "Masked {} outlier(s) in '{}' of '{}'",
        report.flagged(),
        channel,
        dataset.id
    );
    Ok((out, report))
}
