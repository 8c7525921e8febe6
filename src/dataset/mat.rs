//! MATLAB level 5 MAT-file reader.
//!
//! Decodes the variables of a `.mat` file into [`serde_json::Value`] trees
//! so record parsing is shared with the JSON layout:
//!
//! - numeric and logical arrays become nested lists, outermost list on the
//!   first dimension, with singleton dimensions squeezed away (a `1x1`
//!   array is a bare number)
//! - char arrays become strings
//! - structs become objects, struct arrays and cells become lists
//!
//! Compressed variables are inflated with zlib. Sparse arrays, objects and
//! the HDF5-based 7.3 format are rejected.

use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use serde_json::{Map, Number, Value};

use crate::util::{Error, Result};

const HEADER_LEN: usize = 128;

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

// Array classes
const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_OBJECT: u32 = 3;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;
const MX_DOUBLE: u32 = 6;
const MX_UINT64: u32 = 15;

const FLAG_LOGICAL: u32 = 0x0200;

#[derive(Debug, thiserror::Error)]
enum MatError {
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("{0}")]
    Format(String),
    #[error("unsupported {0}")]
    Unsupported(String),
    #[error("inflate failed: {0}")]
    Inflate(#[from] std::io::Error),
}

type MatResult<T> = std::result::Result<T, MatError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Cursor over a run of data elements.
struct Elements<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Elements<'a> {
    fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self { buf, pos: 0, endian }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize, what: &'static str) -> MatResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len()).ok_or(MatError::Truncated(what))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> MatResult<u32> {
        let b = self.take(4, "tag")?;
        Ok(match self.endian {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        })
    }

    /// Next element as `(type, payload)`. Handles the packed small form and
    /// the 8-byte alignment of regular elements.
    fn element(&mut self) -> MatResult<(u32, &'a [u8])> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            let n = (first >> 16) as usize;
            if n > 4 {
                return Err(MatError::Format(format!("small element of {} bytes", n)));
            }
            let data = self.take(4, "small element")?;
            return Ok((first & 0xffff, &data[..n]));
        }
        let n = self.u32()? as usize;
        let data = self.take(n, "element")?;
        if first != MI_COMPRESSED {
            let pad = (8 - n % 8) % 8;
            self.pos = (self.pos + pad).min(self.buf.len());
        }
        Ok((first, data))
    }

    fn expect(&mut self, ty: u32, what: &'static str) -> MatResult<&'a [u8]> {
        match self.element()? {
            (t, data) if t == ty => Ok(data),
            (t, _) => Err(MatError::Format(format!("{} has element type {}", what, t))),
        }
    }
}

/// Read every variable of a MAT-file into a name-keyed map.
pub(crate) fn read_mat(path: &Path) -> Result<Map<String, Value>> {
    let bytes = std::fs::read(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
    parse_mat(&bytes).map_err(|e| Error::archive(path, e))
}

fn parse_mat(bytes: &[u8]) -> MatResult<Map<String, Value>> {
    if bytes.len() < HEADER_LEN {
        return Err(MatError::Truncated("header"));
    }
    let text = String::from_utf8_lossy(&bytes[..116]);
    if text.contains("MATLAB 7.3") {
        return Err(MatError::Unsupported("HDF5-based MAT-file (7.3)".into()));
    }
    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        _ => return Err(MatError::Format("not a level 5 MAT-file".into())),
    };

    let mut vars = Map::new();
    let mut top = Elements::new(&bytes[HEADER_LEN..], endian);
    while !top.at_end() {
        let (ty, data) = top.element()?;
        let (name, value) = match ty {
            MI_MATRIX => matrix(data, endian)?,
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut inflated)?;
                let inner = Elements::new(&inflated, endian).expect(MI_MATRIX, "compressed variable")?;
                matrix(inner, endian)?
            }
            other => {
                tracing::debug!("skipping top-level element of type {}", other);
                continue;
            }
        };
        vars.insert(name, value);
    }
    Ok(vars)
}

/// Decode one `miMATRIX` payload into its name and value.
fn matrix(data: &[u8], endian: Endian) -> MatResult<(String, Value)> {
    if data.is_empty() {
        return Ok((String::new(), Value::Array(Vec::new())));
    }
    let mut el = Elements::new(data, endian);

    let flags = numbers(MI_UINT32, el.expect(MI_UINT32, "array flags")?, endian)?;
    let word = flags.first().copied().unwrap_or(0.0) as u32;
    let class = word & 0xff;
    let logical = word & FLAG_LOGICAL != 0;

    let dims: Vec<usize> = numbers(MI_INT32, el.expect(MI_INT32, "dimensions")?, endian)?
        .into_iter()
        .map(|d| d.max(0.0) as usize)
        .collect();
    let count: usize = dims.iter().product();
    let (_, raw_name) = el.element()?;
    let name = text(raw_name);

    let value = match class {
        MX_CELL => {
            let items = (0..count)
                .map(|_| matrix(el.expect(MI_MATRIX, "cell")?, endian).map(|(_, v)| v))
                .collect::<MatResult<Vec<_>>>()?;
            shaped(&dims, items)?
        }
        MX_STRUCT => {
            let (ty, raw_len) = el.element()?;
            let field_len = numbers(ty, raw_len, endian)?.first().copied().unwrap_or(0.0) as usize;
            let raw_names = el.expect(MI_INT8, "field names")?;
            let names: Vec<String> = match field_len {
                0 => Vec::new(),
                n => raw_names.chunks(n).map(text).collect(),
            };
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let mut fields = Map::new();
                for field in &names {
                    let (_, v) = matrix(el.expect(MI_MATRIX, "struct field")?, endian)?;
                    fields.insert(field.clone(), v);
                }
                items.push(Value::Object(fields));
            }
            shaped(&dims, items)?
        }
        MX_CHAR => {
            let units = if el.at_end() { Vec::new() } else { chars(el.element()?, endian)? };
            char_array(&dims, &units)
        }
        MX_SPARSE | MX_OBJECT => return Err(MatError::Unsupported(format!("array class {} in {}", class, name))),
        MX_DOUBLE..=MX_UINT64 => {
            let (ty, real) = el.element()?;
            let items = numbers(ty, real, endian)?
                .into_iter()
                .map(|x| if logical { Value::Bool(x != 0.0) } else { number(x) })
                .collect();
            shaped(&dims, items)?
        }
        other => return Err(MatError::Unsupported(format!("array class {} in {}", other, name))),
    };
    Ok((name, value))
}

fn text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\0').to_string()
}

fn number(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

/// Numeric payload widened to `f64`.
fn numbers(ty: u32, data: &[u8], endian: Endian) -> MatResult<Vec<f64>> {
    match endian {
        Endian::Little => widen::<LittleEndian>(ty, data),
        Endian::Big => widen::<BigEndian>(ty, data),
    }
}

fn widen<E: ByteOrder>(ty: u32, data: &[u8]) -> MatResult<Vec<f64>> {
    let width = match ty {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        other => return Err(MatError::Format(format!("element type {} is not numeric", other))),
    };
    if data.len() % width != 0 {
        return Err(MatError::Format(format!("{} bytes of {}-byte values", data.len(), width)));
    }
    Ok(data
        .chunks_exact(width)
        .map(|b| match ty {
            MI_INT8 => b[0] as i8 as f64,
            MI_UINT8 => b[0] as f64,
            MI_INT16 => E::read_i16(b) as f64,
            MI_UINT16 => E::read_u16(b) as f64,
            MI_INT32 => E::read_i32(b) as f64,
            MI_UINT32 => E::read_u32(b) as f64,
            MI_SINGLE => E::read_f32(b) as f64,
            MI_INT64 => E::read_i64(b) as f64,
            MI_UINT64 => E::read_u64(b) as f64,
            _ => E::read_f64(b),
        })
        .collect())
}

/// Character payload as one `char` per array element.
fn chars((ty, data): (u32, &[u8]), endian: Endian) -> MatResult<Vec<char>> {
    Ok(match ty {
        MI_UTF8 | MI_INT8 | MI_UINT8 => String::from_utf8_lossy(data).chars().collect(),
        MI_UINT16 | MI_UTF16 => numbers(MI_UINT16, data, endian)?
            .into_iter()
            .map(|u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
        MI_UTF32 | MI_UINT32 | MI_INT32 => numbers(MI_UINT32, data, endian)?
            .into_iter()
            .map(|u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
        other => return Err(MatError::Format(format!("char data of element type {}", other))),
    })
}

/// `R x C` char array: one string per row, a bare string for one row.
fn char_array(dims: &[usize], units: &[char]) -> Value {
    let rows = dims.first().copied().unwrap_or(0);
    if rows <= 1 {
        return Value::String(units.iter().collect());
    }
    let cols = units.len() / rows;
    let lines = (0..rows)
        .map(|r| Value::String((0..cols).filter_map(|c| units.get(r + c * rows)).collect()))
        .collect();
    Value::Array(lines)
}

/// Squeeze singleton dimensions and nest column-major `items`.
fn shaped(dims: &[usize], items: Vec<Value>) -> MatResult<Value> {
    let count: usize = dims.iter().product();
    if count != items.len() {
        return Err(MatError::Format(format!("{} values for dimensions {:?}", items.len(), dims)));
    }
    let squeezed: Vec<usize> = dims.iter().copied().filter(|&d| d != 1).collect();
    if count == 0 {
        return Ok(Value::Array(Vec::new()));
    }
    if squeezed.is_empty() {
        return Ok(items.into_iter().next().unwrap_or(Value::Null));
    }
    Ok(nest(&items, &squeezed, 0, 1))
}

fn nest(items: &[Value], dims: &[usize], offset: usize, stride: usize) -> Value {
    let (len, rest) = match dims.split_first() {
        Some((len, rest)) => (*len, rest),
        None => return items.get(offset).cloned().unwrap_or(Value::Null),
    };
    Value::Array(
        (0..len)
            .map(|i| nest(items, rest, offset + i * stride, stride * len))
            .collect(),
    )
}
