//! Text-bearing variables of a MATLAB Level-5 file.
//!
//! `matfile` skips char, cell and struct arrays. TTC logs keep channel names and
//! units in a `channel` struct of cell arrays, and the tire id, unit system, sign
//! convention and notes in char arrays; this walker recovers those. Numeric arrays
//! come back as `MatValue::Other` and are left to `matfile`.

use std::io::Read;

use libflate::zlib::Decoder;
use log::debug;

const HEADER_LEN: usize = 128;

const MI_UINT16: u32 = 4;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;

const CLASS_CELL: u32 = 1;
const CLASS_STRUCT: u32 = 2;
const CLASS_CHAR: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    /// Char array. Rows of a 2-D array are joined with `\n`.
    Text(String),
    Cell(Vec<MatValue>),
    /// `elements[e][f]` is field `f` of struct element `e`.
    Struct {
        fields: Vec<String>,
        elements: Vec<Vec<MatValue>>,
    },
    /// Zero-byte matrix, as written for `[]` or `''` inside a cell.
    Empty,
    Other,
}

impl MatValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MatValue::Text(s) => Some(s),
            MatValue::Empty => Some(""),
            _ => None,
        }
    }

    /// Strings of a cell array of char arrays, or the single string of a char array.
    pub fn strings(&self) -> Option<Vec<String>> {
        match self {
            MatValue::Cell(items) => items.iter().map(|v| v.as_text().map(str::to_string)).collect(),
            other => other.as_text().map(|s| vec![s.to_string()]),
        }
    }

    pub fn field_names(&self) -> &[String] {
        match self {
            MatValue::Struct { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Field `index` of the first struct element.
    pub fn field(&self, index: usize) -> Option<&MatValue> {
        match self {
            MatValue::Struct { elements, .. } => elements.first()?.get(index),
            _ => None,
        }
    }
}

/// Named top-level variables, in file order. Compressed variables are inflated.
pub fn read_variables(bytes: &[u8]) -> Result<Vec<(String, MatValue)>, String> {
    if bytes.len() < HEADER_LEN {
        return Err("shorter than the 128-byte header".into());
    }
    let big_endian = match &bytes[126..HEADER_LEN] {
        b"IM" => false,
        b"MI" => true,
        other => return Err(format!("bad endian indicator {other:?}")),
    };
    let mut out = Vec::new();
    collect(&mut Cursor::new(&bytes[HEADER_LEN..], big_endian), &mut out)?;
    Ok(out)
}

fn collect(cursor: &mut Cursor<'_>, out: &mut Vec<(String, MatValue)>) -> Result<(), String> {
    while !cursor.is_done() {
        let (kind, data) = cursor.element()?;
        match kind {
            MI_MATRIX => out.push(matrix(data, cursor.big_endian)?),
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                Decoder::new(data)
                    .and_then(|mut d| d.read_to_end(&mut inflated))
                    .map_err(|e| format!("cannot inflate compressed variable: {e}"))?;
                collect(&mut Cursor::new(&inflated, cursor.big_endian), out)?;
            }
            other => debug!("Skipping top-level element of type {other}"),
        }
    }
    Ok(())
}

fn matrix(data: &[u8], big_endian: bool) -> Result<(String, MatValue), String> {
    if data.is_empty() {
        return Ok((String::new(), MatValue::Empty));
    }
    let mut c = Cursor::new(data, big_endian);
    let (_, flags) = c.element()?;
    let class = words(flags, big_endian)
        .first()
        .map(|w| w & 0xFF)
        .ok_or("array flags are missing")?;
    let (_, dims) = c.element()?;
    let dims: Vec<usize> = words(dims, big_endian).into_iter().map(|d| d as usize).collect();
    let (_, name) = c.element()?;
    let name = String::from_utf8_lossy(name).into_owned();
    let count: usize = dims.iter().product();

    let value = match class {
        CLASS_CHAR if count == 0 => MatValue::Text(String::new()),
        CLASS_CHAR => {
            let (kind, raw) = c.element()?;
            MatValue::Text(text(kind, raw, &dims, big_endian))
        }
        CLASS_CELL => {
            let items = (0..count).map(|_| child(&mut c)).collect::<Result<_, _>>()?;
            MatValue::Cell(items)
        }
        CLASS_STRUCT => {
            let (_, width) = c.element()?;
            let width = words(width, big_endian)
                .first()
                .map(|&w| w as usize)
                .ok_or("struct field name length is missing")?;
            let (_, names) = c.element()?;
            let fields: Vec<String> = if width == 0 {
                Vec::new()
            } else {
                names
                    .chunks_exact(width)
                    .map(|n| String::from_utf8_lossy(n).trim_end_matches('\0').to_string())
                    .collect()
            };
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                elements.push((0..fields.len()).map(|_| child(&mut c)).collect::<Result<_, _>>()?);
            }
            MatValue::Struct { fields, elements }
        }
        _ => MatValue::Other,
    };
    Ok((name, value))
}

/// A cell or struct member, which is always a nameless `miMATRIX`.
fn child(c: &mut Cursor<'_>) -> Result<MatValue, String> {
    match c.element()? {
        (MI_MATRIX, data) => Ok(matrix(data, c.big_endian)?.1),
        (kind, _) => Err(format!("expected a matrix element, found type {kind}")),
    }
}

/// Char data is stored column-major; other encodings are one byte per char.
fn text(kind: u32, raw: &[u8], dims: &[usize], big_endian: bool) -> String {
    let chars: Vec<char> = match kind {
        MI_UTF8 => String::from_utf8_lossy(raw).chars().collect(),
        MI_UINT16 | MI_UTF16 => {
            let units = raw.chunks_exact(2).map(|b| {
                let b = [b[0], b[1]];
                if big_endian {
                    u16::from_be_bytes(b)
                } else {
                    u16::from_le_bytes(b)
                }
            });
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        _ => raw.iter().map(|&b| char::from(b)).collect(),
    };
    let rows = dims.first().copied().unwrap_or(0);
    let cols: usize = dims.iter().skip(1).product();
    if rows <= 1 || chars.len() != rows * cols {
        return chars.into_iter().collect::<String>().trim_end().to_string();
    }
    (0..rows)
        .map(|r| {
            let row: String = (0..cols).map(|c| chars[c * rows + r]).collect();
            row.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn word(b: [u8; 4], big_endian: bool) -> u32 {
    if big_endian {
        u32::from_be_bytes(b)
    } else {
        u32::from_le_bytes(b)
    }
}

fn words(data: &[u8], big_endian: bool) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|b| word([b[0], b[1], b[2], b[3]], big_endian))
        .collect()
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], big_endian: bool) -> Self {
        Self {
            bytes,
            pos: 0,
            big_endian,
        }
    }

    /// Fewer than one tag's worth of bytes left (trailing padding).
    fn is_done(&self) -> bool {
        self.bytes.len().saturating_sub(self.pos) < 8
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| format!("element at byte {} runs past the end of its parent", self.pos))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(word([b[0], b[1], b[2], b[3]], self.big_endian))
    }

    /// Next element as `(type, payload)`, leaving the cursor on the one after it.
    fn element(&mut self) -> Result<(u32, &'a [u8]), String> {
        let first = self.u32()?;
        let len = (first >> 16) as usize;
        if len != 0 {
            // Small element: up to 4 payload bytes packed into the tag.
            if len > 4 {
                return Err(format!("small element at byte {} claims {len} bytes", self.pos));
            }
            let data = self.take(4)?;
            return Ok((first & 0xFFFF, &data[..len]));
        }
        let len = self.u32()? as usize;
        let data = self.take(len)?;
        if first != MI_COMPRESSED {
            let padded = self.pos + (8 - len % 8) % 8;
            self.pos = padded.min(self.bytes.len());
        }
        Ok((first, data))
    }
}
