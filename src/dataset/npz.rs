//! Numpy `.npz` archive access.
//!
//! Numeric arrays go through `ndarray-npy`; string scalars (the AMASS
//! `gender` entry) are decoded straight from the `.npy` member since
//! `ndarray-npy` has no string element type.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::{Array1, Array2, Array3, Axis, Ix1, Ix2, Ix3, OwnedRepr};
use ndarray_npy::NpzReader;

use crate::util::{Error, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Open `.npz` archive with typed accessors.
pub struct NpzArchive {
    path: PathBuf,
    arrays: NpzReader<File>,
}

impl NpzArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        let arrays = NpzReader::new(file).map_err(|e| Error::archive(path, e))?;
        Ok(Self { path: path.to_path_buf(), arrays })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the archive has an entry with this name.
    pub fn contains(&mut self, name: &str) -> bool {
        let npy = format!("{}.npy", name);
        self.arrays
            .names()
            .map(|names| names.iter().any(|n| n == name || *n == npy))
            .unwrap_or(false)
    }

    /// 2D float array (f64 or f32). A 1D array is returned as a single row
    /// together with `true`.
    pub fn matrix(&mut self, name: &str) -> Result<Option<(Array2<f64>, bool)>> {
        if !self.contains(name) {
            return Ok(None);
        }
        if let Ok(m) = self.arrays.by_name::<OwnedRepr<f64>, Ix2>(name) {
            return Ok(Some((m, false)));
        }
        if let Ok(m) = self.arrays.by_name::<OwnedRepr<f32>, Ix2>(name) {
            return Ok(Some((m.mapv(f64::from), false)));
        }
        match self.vector(name)? {
            Some(v) => Ok(Some((v.insert_axis(Axis(0)), true))),
            None => Err(Error::malformed(name, &self.path, "expected a 1D or 2D float array")),
        }
    }

    /// 1D float array (f64 or f32).
    pub fn vector(&mut self, name: &str) -> Result<Option<Array1<f64>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        if let Ok(v) = self.arrays.by_name::<OwnedRepr<f64>, Ix1>(name) {
            return Ok(Some(v));
        }
        if let Ok(v) = self.arrays.by_name::<OwnedRepr<f32>, Ix1>(name) {
            return Ok(Some(v.mapv(f64::from)));
        }
        Err(Error::malformed(name, &self.path, "expected a 1D float array"))
    }

    /// 3D float array (f64 or f32).
    pub fn array3(&mut self, name: &str) -> Result<Option<Array3<f64>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        if let Ok(a) = self.arrays.by_name::<OwnedRepr<f64>, Ix3>(name) {
            return Ok(Some(a));
        }
        if let Ok(a) = self.arrays.by_name::<OwnedRepr<f32>, Ix3>(name) {
            return Ok(Some(a.mapv(f64::from)));
        }
        Err(Error::malformed(name, &self.path, "expected a 3D float array"))
    }

    /// 2D index array stored with any common integer type.
    pub fn indices(&mut self, name: &str) -> Result<Option<Array2<u32>>> {
        if !self.contains(name) {
            return Ok(None);
        }
        if let Ok(a) = self.arrays.by_name::<OwnedRepr<u32>, Ix2>(name) {
            return Ok(Some(a));
        }
        let wide = if let Ok(a) = self.arrays.by_name::<OwnedRepr<i32>, Ix2>(name) {
            a.mapv(i64::from)
        } else if let Ok(a) = self.arrays.by_name::<OwnedRepr<i64>, Ix2>(name) {
            a
        } else if let Ok(a) = self.arrays.by_name::<OwnedRepr<u64>, Ix2>(name) {
            a.mapv(|v| v as i64)
        } else {
            return Err(Error::malformed(name, &self.path, "expected a 2D integer array"));
        };
        if wide.iter().any(|&v| v < 0 || v > u32::MAX as i64) {
            return Err(Error::malformed(name, &self.path, "index out of range"));
        }
        Ok(Some(wide.mapv(|v| v as u32)))
    }

    /// Scalar float stored as a 0D array.
    pub fn scalar(&mut self, name: &str) -> Option<f64> {
        if !self.contains(name) {
            return None;
        }
        if let Ok(v) = self.arrays.by_name::<OwnedRepr<f64>, ndarray::Ix0>(name) {
            return Some(v.into_scalar());
        }
        self.arrays
            .by_name::<OwnedRepr<f32>, ndarray::Ix0>(name)
            .ok()
            .map(|v| f64::from(v.into_scalar()))
    }

    /// String scalar (`<U*` or `|S*` dtype).
    pub fn string(&self, name: &str) -> Result<Option<String>> {
        let file = File::open(&self.path)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::archive(&self.path, e))?;

        let entry_name = format!("{}.npy", name);
        let mut entry = match zip.by_name(&entry_name) {
            Ok(e) => e,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(Error::archive(&self.path, e)),
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        decode_npy_string(&bytes)
            .map(Some)
            .ok_or_else(|| Error::malformed(name, &self.path, "not a numpy string scalar"))
    }
}

/// Decode a `.npy` payload holding a single string.
pub(crate) fn decode_npy_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return None;
    }
    let major = bytes[6];
    let mut cursor = Cursor::new(&bytes[8..]);
    let (header_len, prefix) = if major == 1 {
        (cursor.read_u16::<LittleEndian>().ok()? as usize, 10)
    } else {
        (cursor.read_u32::<LittleEndian>().ok()? as usize, 12)
    };
    let header = std::str::from_utf8(bytes.get(prefix..prefix + header_len)?).ok()?;
    let data = &bytes[prefix + header_len..];
    let descr = header_field(header, "descr")?;

    let text = if descr.starts_with("<U") {
        let units: Vec<u32> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .take_while(|&u| u != 0)
            .collect();
        units.into_iter().filter_map(char::from_u32).collect()
    } else if descr.starts_with("|S") {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end]).into_owned()
    } else {
        return None;
    };
    Some(text)
}

/// Value of a quoted field in a numpy header dict literal.
fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{}'", key))? + key.len() + 2;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();
    let quote = rest.chars().next()?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a version 1 `.npy` payload for a string scalar.
    pub(crate) fn npy_string(value: &str, unicode: bool) -> Vec<u8> {
        let (descr, data): (String, Vec<u8>) = if unicode {
            let data = value.chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
            (format!("<U{}", value.chars().count()), data)
        } else {
            (format!("|S{}", value.len()), value.as_bytes().to_vec())
        };
        let mut header = format!("{{'descr': '{}', 'fortran_order': False, 'shape': (), }}", descr);
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = NPY_MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn test_decode_unicode_string() {
        assert_eq!(decode_npy_string(&npy_string("female", true)).as_deref(), Some("female"));
    }

    #[test]
    fn test_decode_byte_string() {
        assert_eq!(decode_npy_string(&npy_string("male", false)).as_deref(), Some("male"));
    }

    #[test]
    fn test_decode_rejects_numeric() {
        let mut bytes = npy_string("male", false);
        let pos = bytes.windows(2).position(|w| w == b"|S").unwrap();
        bytes[pos..pos + 2].copy_from_slice(b"<f");
        assert!(decode_npy_string(&bytes).is_none());
        assert!(decode_npy_string(b"not numpy").is_none());
    }

    #[test]
    fn test_header_field() {
        let h = "{'descr': '<U6', 'fortran_order': False, 'shape': (), }";
        assert_eq!(header_field(h, "descr"), Some("<U6"));
        assert_eq!(header_field(h, "missing"), None);
    }
}
