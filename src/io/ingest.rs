//! ASCII rig-log import (`.dat`, `.txt`, `.csv`).
//!
//! Layout:
//!
//! ```text
//! Tire_Name=Hoosier 43075;Rim_Width=7;Unit_System=USCS;Sign_Convention=SAE;Notes=...
//! ET    V     N     SA    IA    RL    RE    P     FX    FY    FZ    MX    MZ   ...
//! sec   mph   rpm   deg   deg   in    in    psi   lb    lb    lb    ft-lb ft-lb ...
//! 0.000 24.98 ...
//! ```
//!
//! Line 1 holds `key=value` pairs separated by `;` (any other text is ignored).
//! Lines 2 and 3 hold channel names and unit labels, then one row per sample.
//! Fields are tab separated; comma is accepted when line 2 contains no tab.
//!
//! Import either yields a complete dataset or fails with `TireError::Import`; it
//! never returns a partially populated dataset.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::convert::{infer_unit_system, parse_unit_label};
use crate::domain::{
    Channel, Dataset, DatasetId, DatasetMeta, Provenance, QuantityKind, SignConvention, UnitSystem,
};
use crate::error::TireError;

/// Header keys recognized on line 1.
pub const META_TIRE_NAME: &str = "Tire_Name";
pub const META_RIM_WIDTH: &str = "Rim_Width";
pub const META_UNIT_SYSTEM: &str = "Unit_System";
pub const META_SIGN_CONVENTION: &str = "Sign_Convention";
pub const META_TEST_DATE: &str = "Test_Date";
pub const META_NOTES: &str = "Notes";

/// Metadata parsed from line 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMeta {
    pub tire_id: Option<String>,
    pub rim_width: Option<f64>,
    pub unit_system: Option<UnitSystem>,
    pub sign_convention: Option<SignConvention>,
    pub test_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Read an ASCII rig log.
pub fn read_dat(path: &Path) -> Result<Dataset, TireError> {
    let text = fs::read_to_string(path).map_err(|e| TireError::import(path, format!("cannot read file: {e}")))?;
    parse_dat(path, &text)
}

/// Parse ASCII rig-log text; `path` names the source in errors and on the dataset.
pub fn parse_dat(path: &Path, text: &str) -> Result<Dataset, TireError> {
    let mut lines = text.splitn(4, '\n');
    let (Some(meta_line), Some(name_line), Some(unit_line)) = (lines.next(), lines.next(), lines.next()) else {
        return Err(TireError::import(
            path,
            "expected 3 header lines (metadata, channel names, units)",
        ));
    };
    let body = lines.next().unwrap_or("");

    let delimiter = if name_line.contains('\t') { b'\t' } else { b',' };
    let names = split_header(name_line, delimiter, None);
    let units = split_header(unit_line, delimiter, Some(names.len()));
    if names.is_empty() || names.iter().any(String::is_empty) {
        return Err(TireError::import(path, "line 2: empty channel name"));
    }
    if units.len() != names.len() {
        return Err(TireError::import(
            path,
            format!("line 3: expected {} unit labels, found {}", names.len(), units.len()),
        ));
    }

    let header = parse_header_meta(meta_line).map_err(|m| TireError::import(path, format!("line 1: {m}")))?;
    let columns = read_rows(path, body, delimiter, names.len())?;

    let unit_system = header.unit_system.or_else(|| {
        let inferred = infer_unit_system(units.iter().map(String::as_str));
        match inferred {
            Some(s) => warn!("Unit system not given in '{}'; inferred {s} from unit labels", path.display()),
            None => warn!(
                "Unit system not given in '{}' and not inferable; assign one before converting",
                path.display()
            ),
        }
        inferred
    });
    let sign_convention = header.sign_convention.unwrap_or_else(|| {
        warn!("Sign convention not given in '{}'; defaulting to SAE", path.display());
        SignConvention::Sae
    });

    let channels: Vec<Channel> = names
        .into_iter()
        .zip(units)
        .zip(columns)
        .map(|((name, unit), values)| build_channel(name, unit, values))
        .collect();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let meta = DatasetMeta {
        name: stem.clone(),
        tire_id: header.tire_id.unwrap_or_default(),
        rim_width: header.rim_width,
        test_date: header.test_date,
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

/// Parse `key=value;key=value` pairs. Unknown keys are ignored.
pub fn parse_header_meta(line: &str) -> Result<HeaderMeta, String> {
    let mut meta = HeaderMeta::default();
    for pair in line.trim().split(';') {
        let Some((key, value)) = pair.split_once('=') else { continue };
        let (key, value) = (key.trim(), value.trim());
        match key {
            META_TIRE_NAME => meta.tire_id = Some(value.to_string()),
            META_RIM_WIDTH => {
                let w = value
                    .parse::<f64>()
                    .map_err(|_| format!("{META_RIM_WIDTH}: expected a number, found '{value}'"))?;
                meta.rim_width = Some(w);
            }
            META_UNIT_SYSTEM => {
                let s = UnitSystem::from_label(value)
                    .ok_or_else(|| format!("{META_UNIT_SYSTEM}: expected USCS, Metric or SI, found '{value}'"))?;
                meta.unit_system = Some(s);
            }
            META_SIGN_CONVENTION => {
                let c = SignConvention::from_label(value).ok_or_else(|| {
                    format!("{META_SIGN_CONVENTION}: expected SAE, Adapted SAE, ISO or Adapted ISO, found '{value}'")
                })?;
                meta.sign_convention = Some(c);
            }
            META_TEST_DATE => {
                let d = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| format!("{META_TEST_DATE}: expected YYYY-MM-DD, found '{value}'"))?;
                meta.test_date = Some(d);
            }
            META_NOTES => meta.notes = Some(value.to_string()),
            other => debug!("Ignoring header key '{other}'"),
        }
    }
    Ok(meta)
}

/// Split a header line. Rig exports often end every line with a delimiter; a
/// trailing empty field is dropped unless `width` says it is a real (empty) label.
fn split_header(line: &str, delimiter: u8, width: Option<usize>) -> Vec<String> {
    let mut fields: Vec<String> = line
        .trim_end_matches(['\r', '\n'])
        .split(char::from(delimiter))
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();
    let trailing = fields.len() > 1 && fields.last().is_some_and(String::is_empty);
    if trailing && width.is_none_or(|w| fields.len() > w) {
        fields.pop();
    }
    fields
}

/// Read data rows column-major, rejecting ragged rows and non-numeric fields.
fn read_rows(path: &Path, body: &str, delimiter: u8, width: usize) -> Result<Vec<Vec<f64>>, TireError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); width];
    for result in reader.records() {
        let record = result.map_err(|e| TireError::import(path, format!("malformed row: {e}")))?;
        // Header lines precede the body.
        let line = record.position().map_or(0, |p| p.line() as usize) + 3;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let mut fields: Vec<&str> = record.iter().collect();
        if fields.len() == width + 1 && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        if fields.len() != width {
            return Err(TireError::import(
                path,
                format!("line {line}: expected {width} fields, found {}", fields.len()),
            ));
        }
        for (col, field) in fields.into_iter().enumerate() {
            let v = field.parse::<f64>().map_err(|_| {
                TireError::import(path, format!("line {line}, column {}: expected a number, found '{field}'", col + 1))
            })?;
            columns[col].push(v);
        }
    }

    if columns[0].is_empty() {
        return Err(TireError::import(path, "no data rows after the 3 header lines"));
    }
    Ok(columns)
}

/// Kind from the unit label when it is recognized, else from the channel name.
pub(crate) fn build_channel(name: String, unit: String, values: Vec<f64>) -> Channel {
    let kind = match parse_unit_label(&unit) {
        Some((kind, _)) if kind != QuantityKind::Unknown => kind,
        _ => QuantityKind::from_channel_name(&name),
    };
    let provenance = if name.starts_with("Cmd") {
        Provenance::Command
    } else {
        Provenance::Raw
    };
    Channel::new(name, unit, kind, values).with_provenance(provenance)
}
