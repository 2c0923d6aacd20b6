//! Canonical in-memory representation of one imported rig record.
//!
//! A `Dataset` is a table: every channel is one column and all columns share the
//! same row count. The constructor and every mutating method enforce that, so a
//! `Dataset` that exists is always synchronized.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Provenance, QuantityKind, SignConvention, UnitSystem};
use crate::error::TireError;

/// Stable identifier of a dataset inside a `DataManager`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DatasetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DatasetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One named column of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    /// Unit label as recorded (or as rewritten by the last conversion).
    pub unit: String,
    pub kind: QuantityKind,
    pub provenance: Provenance,
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, kind: QuantityKind, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            kind,
            provenance: Provenance::Raw,
            values,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Free-form description of the tested tire and run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub name: String,
    pub tire_id: String,
    pub rim_width: Option<f64>,
    pub test_date: Option<NaiveDate>,
    pub notes: String,
}

/// Rows selected by a nominal test condition, e.g. `CmdFZ ∈ {-445, -667}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub channel: String,
    pub levels: Vec<f64>,
}

impl Condition {
    pub fn new(channel: impl Into<String>, levels: Vec<f64>) -> Self {
        Self {
            channel: channel.into(),
            levels,
        }
    }

    fn matches(&self, v: f64) -> bool {
        self.levels
            .iter()
            .any(|&l| (v - l).abs() <= 1e-9 * l.abs().max(1.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: DatasetId,
    pub path: PathBuf,
    /// `None` when the source file did not say and it could not be inferred.
    pub unit_system: Option<UnitSystem>,
    pub sign_convention: SignConvention,
    pub meta: DatasetMeta,
    channels: Vec<Channel>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset, rejecting ragged or duplicate channels.
    pub fn new(
        id: DatasetId,
        path: PathBuf,
        channels: Vec<Channel>,
        unit_system: Option<UnitSystem>,
        sign_convention: SignConvention,
        meta: DatasetMeta,
    ) -> Result<Self, TireError> {
        let rows = channels.first().map(Channel::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for ch in &channels {
            if ch.len() != rows {
                return Err(TireError::validation(
                    Some(&id),
                    format!("channel '{}' has {} samples, expected {rows}", ch.name, ch.len()),
                ));
            }
            if !seen.insert(ch.name.as_str()) {
                return Err(TireError::validation(
                    Some(&id),
                    format!("duplicate channel name '{}'", ch.name),
                ));
            }
        }
        Ok(Self {
            id,
            path,
            unit_system,
            sign_convention,
            meta,
            channels,
            rows,
        })
    }

    /// Number of rows (samples per channel).
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    /// Samples of a channel, or a validation error naming the missing channel.
    pub fn values(&self, name: &str) -> Result<&[f64], TireError> {
        self.channel(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| TireError::validation(Some(&self.id), format!("channel '{name}' not found")))
    }

    /// Append a channel; it must match the row count and have a fresh name.
    pub fn push_channel(&mut self, channel: Channel) -> Result<(), TireError> {
        if self.channels.is_empty() {
            self.rows = channel.len();
        }
        if channel.len() != self.rows {
            return Err(TireError::validation(
                Some(&self.id),
                format!(
                    "channel '{}' has {} samples, expected {}",
                    channel.name,
                    channel.len(),
                    self.rows
                ),
            ));
        }
        if self.has_channel(&channel.name) {
            return Err(TireError::validation(
                Some(&self.id),
                format!("duplicate channel name '{}'", channel.name),
            ));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Replace all channels at once. Used by conversions, which build every new
    /// column before swapping so a failure never leaves a half-converted table.
    pub(crate) fn replace_channels(&mut self, channels: Vec<Channel>) -> Result<(), TireError> {
        let checked = Dataset::new(
            self.id.clone(),
            PathBuf::new(),
            channels,
            None,
            self.sign_convention,
            DatasetMeta::default(),
        )?;
        self.rows = checked.rows;
        self.channels = checked.channels;
        Ok(())
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    /// Derived dataset containing only `rows` (sorted or not, duplicates allowed),
    /// taken at identical indices in every channel.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Dataset, TireError> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.rows) {
            return Err(TireError::validation(
                Some(&self.id),
                format!("row index {bad} out of range (len {})", self.rows),
            ));
        }
        let channels = self
            .channels
            .iter()
            .map(|c| Channel {
                values: rows.iter().map(|&r| c.values[r]).collect(),
                ..c.clone_header()
            })
            .collect();
        Ok(Dataset {
            id: self.id.clone(),
            path: self.path.clone(),
            unit_system: self.unit_system,
            sign_convention: self.sign_convention,
            meta: self.meta.clone(),
            channels,
            rows: rows.len(),
        })
    }

    /// Synchronized drop: remove every row whose mask entry is `true` from all channels.
    pub fn drop_rows(&self, mask: &[bool]) -> Result<Dataset, TireError> {
        if mask.len() != self.rows {
            return Err(TireError::validation(
                Some(&self.id),
                format!("drop mask has {} entries, dataset has {} rows", mask.len(), self.rows),
            ));
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &drop)| (!drop).then_some(i))
            .collect();
        self.select_rows(&keep)
    }

    /// Indices of rows satisfying every condition.
    pub fn rows_matching(&self, conditions: &[Condition]) -> Result<Vec<usize>, TireError> {
        let columns = conditions
            .iter()
            .map(|c| self.values(&c.channel).map(|v| (c, v)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.rows)
            .filter(|&i| columns.iter().all(|(c, v)| c.matches(v[i])))
            .collect())
    }
}

impl Channel {
    fn clone_header(&self) -> Channel {
        Channel {
            name: self.name.clone(),
            unit: self.unit.clone(),
            kind: self.kind,
            provenance: self.provenance,
            values: Vec::new(),
        }
    }
}
