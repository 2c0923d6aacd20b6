//! MATLAB Level-5 import (`.mat`), as distributed by the Tire Test Consortium.
//!
//! TTC files store each channel as a top-level `N x 1` double array named after the
//! channel (`ET`, `FZ`, `SA`, ...), read here with `matfile`. Channel order and unit
//! labels come from the `channel` struct (field 0 names, field 1 units); `tireid`,
//! `units`, `sign` and `notes` char arrays fill the metadata. Files without a
//! `channel` struct keep every numeric column with empty unit labels and no unit
//! system.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info, warn};
use matfile::{MatFile, NumericData};

use crate::convert::infer_unit_system;
use crate::domain::{Channel, Dataset, DatasetId, DatasetMeta, SignConvention, UnitSystem};
use crate::error::TireError;
use crate::io::ingest::build_channel;
use crate::io::level5::{self, MatValue};

/// Metadata carried by char, cell and struct variables.
#[derive(Debug, Default)]
struct MatHeader {
    /// Names and units from the `channel` struct.
    channels: Option<(Vec<String>, Vec<String>)>,
    tire_id: Option<String>,
    unit_system: Option<String>,
    sign: Option<String>,
    notes: Option<String>,
}

impl MatHeader {
    fn from_variables(path: &Path, variables: Vec<(String, MatValue)>) -> Self {
        let mut header = Self::default();
        for (name, value) in variables {
            let text = || value.as_text().map(str::to_string);
            match name.as_str() {
                "channel" => {
                    let names = value.field(0).and_then(MatValue::strings);
                    let units = value.field(1).and_then(MatValue::strings);
                    match (names, units) {
                        (Some(n), Some(u)) if n.len() == u.len() => header.channels = Some((n, u)),
                        _ => warn!(
                            "'{}': 'channel' is not a struct of matching name and unit lists (fields {:?}); ignored",
                            path.display(),
                            value.field_names()
                        ),
                    }
                }
                "tireid" => header.tire_id = text(),
                "units" => header.unit_system = text(),
                "sign" | "coord" => header.sign = text(),
                "notes" => header.notes = text(),
                _ => {}
            }
        }
        header
    }
}

pub fn read_mat(path: &Path) -> Result<Dataset, TireError> {
    let bytes = std::fs::read(path).map_err(|e| TireError::import(path, format!("cannot open file: {e}")))?;
    let mat = MatFile::parse(bytes.as_slice())
        .map_err(|e| TireError::import(path, format!("not a MATLAB Level-5 file: {e:?}")))?;

    let mut vectors: Vec<(String, Vec<f64>)> = Vec::new();
    for array in mat.arrays() {
        let size = array.size();
        let len = match size.as_slice() {
            [n, 1] | [1, n] => *n,
            _ => {
                debug!("Skipping '{}' with shape {size:?}", array.name());
                continue;
            }
        };
        match numeric_to_f64(array.data()) {
            Some(values) if values.len() == len => vectors.push((array.name().to_string(), values)),
            _ => debug!("Skipping non-numeric or complex array '{}'", array.name()),
        }
    }

    let header = match level5::read_variables(&bytes) {
        Ok(variables) => MatHeader::from_variables(path, variables),
        Err(e) => {
            warn!("Cannot read text variables of '{}' ({e}); importing numeric arrays only", path.display());
            MatHeader::default()
        }
    };

    let mut channels = match &header.channels {
        Some((names, units)) => listed_channels(path, vectors, names, units)?,
        None => numeric_channels(path, vectors)?,
    };
    let rows = channels.first().map_or(0, Channel::len);
    if !channels.iter().any(|c| c.name == "SL") {
        debug!("'{}' has no SL channel; adding zeros", path.display());
        channels.push(build_channel("SL".into(), "-".into(), vec![0.0; rows]));
    }

    let unit_system = resolve_unit_system(path, &header);
    let sign_convention = match header.sign.as_deref().and_then(SignConvention::from_label) {
        Some(c) => c,
        None => {
            warn!("Sign convention not given in '{}'; defaulting to SAE", path.display());
            SignConvention::Sae
        }
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let (tire_id, rim_width) = header.tire_id.as_deref().map(split_tire_id).unwrap_or_default();
    let meta = DatasetMeta {
        name: stem.clone(),
        tire_id,
        rim_width,
        test_date: None,
        notes: header.notes.unwrap_or_default(),
    };
    let dataset = Dataset::new(
        DatasetId::from(stem),
        path.to_path_buf(),
        channels,
        unit_system,
        sign_convention,
        meta,
    )
    .map_err(|e| TireError::import(path, e.to_string()))?;

    info!(
        "Imported '{}': {} channels x {} rows",
        path.display(),
        dataset.channels().len(),
        dataset.len()
    );
    Ok(dataset)
}

/// Channels in `channel` struct order. Every listed name must have a data array.
fn listed_channels(
    path: &Path,
    vectors: Vec<(String, Vec<f64>)>,
    names: &[String],
    units: &[String],
) -> Result<Vec<Channel>, TireError> {
    let mut arrays: HashMap<String, Vec<f64>> = vectors.into_iter().collect();
    names
        .iter()
        .zip(units)
        .map(|(name, unit)| {
            let values = arrays.remove(name).ok_or_else(|| {
                TireError::import(path, format!("channel '{name}' is listed but has no N x 1 numeric array"))
            })?;
            Ok(build_channel(name.clone(), unit.clone(), values))
        })
        .collect()
}

/// Every numeric column sharing the most common length; anything else is auxiliary.
fn numeric_channels(path: &Path, vectors: Vec<(String, Vec<f64>)>) -> Result<Vec<Channel>, TireError> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for (_, v) in &vectors {
        *counts.entry(v.len()).or_default() += 1;
    }
    let Some(rows) = counts
        .into_iter()
        .filter(|(len, _)| *len > 1)
        .max_by_key(|&(len, count)| (count, len))
        .map(|(len, _)| len)
    else {
        return Err(TireError::import(
            path,
            "expected at least one numeric N x 1 channel array, found none",
        ));
    };
    Ok(vectors
        .into_iter()
        .filter_map(|(name, values)| {
            if values.len() == rows {
                Some(build_channel(name, String::new(), values))
            } else {
                debug!("Skipping '{name}': {} samples, channels have {rows}", values.len());
                None
            }
        })
        .collect())
}

/// `units` variable first, then the recorded unit labels.
fn resolve_unit_system(path: &Path, header: &MatHeader) -> Option<UnitSystem> {
    if let Some(label) = &header.unit_system {
        match UnitSystem::from_label(label) {
            Some(s) => return Some(s),
            None => warn!("'{}': unknown unit system '{label}'", path.display()),
        }
    }
    let Some((_, units)) = &header.channels else {
        warn!(
            "'{}' carries no unit system or unit labels; assign one before converting",
            path.display()
        );
        return None;
    };
    let inferred = infer_unit_system(units.iter().map(String::as_str)).unwrap_or_else(|| {
        if units.iter().any(|u| u.contains("lb")) {
            UnitSystem::Uscs
        } else {
            UnitSystem::Metric
        }
    });
    warn!("Unit system not given in '{}'; inferred {inferred} from unit labels", path.display());
    Some(inferred)
}

/// `"Hoosier 43075 16x7.5-10 R20, 7 inch rim"` splits into the id and the first
/// integer after the comma.
fn split_tire_id(s: &str) -> (String, Option<f64>) {
    let (id, rest) = s.split_once(',').unwrap_or((s, ""));
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    (id.trim().to_string(), digits.parse().ok())
}

/// Real part of a numeric array as `f64`; `None` for complex data.
fn numeric_to_f64(data: &NumericData) -> Option<Vec<f64>> {
    fn real<T: Copy + Into<f64>>(real: &[T], imag: &Option<Vec<T>>) -> Option<Vec<f64>> {
        if imag.is_some() {
            return None;
        }
        Some(real.iter().map(|&v| v.into()).collect())
    }
    match data {
        NumericData::Double { real: r, imag } => real(r, imag),
        NumericData::Single { real: r, imag } => real(r, imag),
        NumericData::Int8 { real: r, imag } => real(r, imag),
        NumericData::UInt8 { real: r, imag } => real(r, imag),
        NumericData::Int16 { real: r, imag } => real(r, imag),
        NumericData::UInt16 { real: r, imag } => real(r, imag),
        NumericData::Int32 { real: r, imag } => real(r, imag),
        NumericData::UInt32 { real: r, imag } => real(r, imag),
        // 64-bit integers have no lossless `Into<f64>`; rig logs never use them.
        NumericData::Int64 { .. } | NumericData::UInt64 { .. } => None,
    }
}
