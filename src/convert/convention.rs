//! Sign-convention conversion (SAE, Adapted SAE, ISO, Adapted ISO).
//!
//! Each signed channel carries one multiplier per convention, relative to SAE.
//! Converting `from -> to` multiplies a channel by `sign[from] * sign[to]`, which is
//! always ±1, so conversions are exact and `A -> B -> A` restores the input bit-for-bit.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::domain::{Dataset, SignConvention};

/// Channels whose sign depends on the convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedChannel {
    Ia,
    Sa,
    Sr,
    Sl,
    Fx,
    Fy,
    Fz,
    Mx,
    My,
    Mz,
    CmdIa,
    CmdSa,
    CmdFz,
}

impl SignedChannel {
    pub const ALL: [SignedChannel; 13] = [
        SignedChannel::Ia,
        SignedChannel::Sa,
        SignedChannel::Sr,
        SignedChannel::Sl,
        SignedChannel::Fx,
        SignedChannel::Fy,
        SignedChannel::Fz,
        SignedChannel::Mx,
        SignedChannel::My,
        SignedChannel::Mz,
        SignedChannel::CmdIa,
        SignedChannel::CmdSa,
        SignedChannel::CmdFz,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignedChannel::Ia => "IA",
            SignedChannel::Sa => "SA",
            SignedChannel::Sr => "SR",
            SignedChannel::Sl => "SL",
            SignedChannel::Fx => "FX",
            SignedChannel::Fy => "FY",
            SignedChannel::Fz => "FZ",
            SignedChannel::Mx => "MX",
            SignedChannel::My => "MY",
            SignedChannel::Mz => "MZ",
            SignedChannel::CmdIa => "CmdIA",
            SignedChannel::CmdSa => "CmdSA",
            SignedChannel::CmdFz => "CmdFZ",
        }
    }

    /// Signs in `SignConvention::index` order: SAE, Adapted SAE, ISO, Adapted ISO.
    pub fn signs(self) -> [i8; 4] {
        match self {
            SignedChannel::Ia | SignedChannel::CmdIa => [1, 1, 1, -1],
            SignedChannel::Sa | SignedChannel::CmdSa => [1, -1, -1, 1],
            SignedChannel::Sr | SignedChannel::Sl => [1, 1, 1, 1],
            SignedChannel::Fx | SignedChannel::Mx => [1, 1, 1, 1],
            SignedChannel::Fy | SignedChannel::My | SignedChannel::Mz => [1, 1, -1, -1],
            SignedChannel::Fz | SignedChannel::CmdFz => [1, -1, -1, -1],
        }
    }
}

/// Immutable lookup from channel name to per-convention sign.
#[derive(Debug, Clone)]
pub struct SignTable {
    signs: HashMap<&'static str, [i8; 4]>,
}

impl SignTable {
    pub fn new() -> Self {
        let signs = SignedChannel::ALL.iter().map(|c| (c.name(), c.signs())).collect();
        Self { signs }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Multiplier taking `channel` from one convention to another.
    ///
    /// `None` means the channel is not sign-dependent and passes through unchanged.
    pub fn multiplier(&self, channel: &str, from: SignConvention, to: SignConvention) -> Option<f64> {
        let s = self.signs.get(channel)?;
        Some(f64::from(s[from.index()] * s[to.index()]))
    }
}

impl Default for SignTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ConventionConverter {
    table: Arc<SignTable>,
}

impl ConventionConverter {
    pub fn new(table: Arc<SignTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SignTable {
        &self.table
    }

    /// Return a copy of `dataset` in the `target` convention.
    ///
    /// Already at `target`: an unchanged copy is returned, so applying the same
    /// target twice is a no-op.
    pub fn convert_dataset_convention(&self, dataset: &Dataset, target: SignConvention) -> Dataset {
        let from = dataset.sign_convention;
        let mut out = dataset.clone();
        if from == target {
            debug!("Dataset '{}' already in {target}", dataset.id);
            return out;
        }

        for ch in out.channels_mut() {
            match self.table.multiplier(&ch.name, from, target) {
                Some(m) if m < 0.0 => ch.values.iter_mut().for_each(|v| *v = -*v),
                Some(_) => {}
                None => debug!("Channel '{}' is not sign-dependent; passed through", ch.name),
            }
        }
        out.sign_convention = target;
        info!("Converted dataset '{}' from {from} to {target}", dataset.id);
        out
    }

    /// Flip a single column in place (used when comparing against SAE-referenced tables).
    pub fn convert_values(&self, channel: &str, values: &mut [f64], from: SignConvention, to: SignConvention) {
        if let Some(m) = self.table.multiplier(channel, from, to) {
            if m < 0.0 {
                values.iter_mut().for_each(|v| *v = -*v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, DatasetId, DatasetMeta, QuantityKind, UnitSystem};
    use std::path::PathBuf;

    fn sample() -> Dataset {
        Dataset::new(
            DatasetId::from("s"),
            PathBuf::new(),
            vec![
                Channel::new("SA", "deg", QuantityKind::Angle, vec![-3.0, 0.5, 6.25]),
                Channel::new("FY", "lb", QuantityKind::Force, vec![120.5, -3.0, 0.0]),
                Channel::new("FZ", "lb", QuantityKind::Force, vec![-50.0, -100.0, -150.0]),
                Channel::new("ET", "sec", QuantityKind::Time, vec![0.0, 0.01, 0.02]),
            ],
            Some(UnitSystem::Uscs),
            SignConvention::Sae,
            DatasetMeta::default(),
        )
        .unwrap()
    }

    #[test]
    fn sae_to_iso_flips_expected_channels() {
        let conv = ConventionConverter::new(SignTable::shared());
        let iso = conv.convert_dataset_convention(&sample(), SignConvention::Iso);
        assert_eq!(iso.sign_convention, SignConvention::Iso);
        assert_eq!(iso.values("SA").unwrap(), &[3.0, -0.5, -6.25]);
        assert_eq!(iso.values("FY").unwrap(), &[-120.5, 3.0, -0.0]);
        assert_eq!(iso.values("FZ").unwrap(), &[50.0, 100.0, 150.0]);
        assert_eq!(iso.values("ET").unwrap(), &[0.0, 0.01, 0.02]);
    }

    #[test]
    fn round_trip_is_exact_for_every_pair() {
        let conv = ConventionConverter::new(SignTable::shared());
        let ds = sample();
        for a in SignConvention::ALL {
            let start = conv.convert_dataset_convention(&ds, a);
            for b in SignConvention::ALL {
                let back = conv.convert_dataset_convention(&conv.convert_dataset_convention(&start, b), a);
                for (x, y) in start.channels().iter().zip(back.channels()) {
                    let xb: Vec<u64> = x.values.iter().map(|v| v.to_bits()).collect();
                    let yb: Vec<u64> = y.values.iter().map(|v| v.to_bits()).collect();
                    assert_eq!(xb, yb, "{a} -> {b} -> {a} changed {}", x.name);
                }
            }
        }
    }

    #[test]
    fn same_target_twice_is_a_no_op() {
        let conv = ConventionConverter::new(SignTable::shared());
        let once = conv.convert_dataset_convention(&sample(), SignConvention::AdaptedIso);
        let twice = conv.convert_dataset_convention(&once, SignConvention::AdaptedIso);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_channels_have_no_multiplier() {
        let table = SignTable::new();
        assert_eq!(table.multiplier("TSTC", SignConvention::Sae, SignConvention::Iso), None);
        assert_eq!(table.multiplier("FZ", SignConvention::Iso, SignConvention::AdaptedSae), Some(1.0));
        assert_eq!(table.multiplier("SA", SignConvention::Sae, SignConvention::Iso), Some(-1.0));
    }
}
