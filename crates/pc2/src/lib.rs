//! PC2 point-cache codec.
//!
//! PC2 stores an ordered sequence of frames, each a full array of vertex
//! positions. PC16 is the same container with half-precision components;
//! it is only ever decoded; encoding always produces 32-bit PC2.
//!
//! ## File Structure
//!
//! ```text
//! +----------------------+
//! | "POINTCACHE2\0"      |  12 bytes
//! +----------------------+
//! | Version              |  i32 LE (1)
//! +----------------------+
//! | Vertex count         |  i32 LE
//! +----------------------+
//! | Start frame          |  f32 LE
//! +----------------------+
//! | Sample rate          |  f32 LE
//! +----------------------+
//! | Frame count          |  i32 LE
//! +----------------------+
//! | frames x verts x 3   |  f32 LE (PC2) or f16 LE (PC16)
//! +----------------------+
//! ```

use std::io::Write;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;
use thiserror::Error;

/// Signature at the start of every point cache.
pub const SIGNATURE: &[u8; 12] = b"POINTCACHE2\0";

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Format version written by this codec.
pub const VERSION: i32 = 1;

/// Codec errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Signature bytes do not match `POINTCACHE2\0`
    #[error("Invalid point cache: bad signature")]
    BadSignature,

    /// Not enough bytes for the header or the declared body
    #[error("Truncated point cache: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Negative count in the header
    #[error("Invalid point cache: negative {field} ({value})")]
    NegativeCount { field: &'static str, value: i32 },

    /// Position count does not match the header
    #[error("Position count {len} does not match header ({num_points} vertices per frame)")]
    Inconsistent { len: usize, num_points: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Component precision of the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    /// 32-bit floats (`.pc2`)
    F32,
    /// 16-bit floats (`.pc16`)
    F16,
}

impl Precision {
    /// Size of one component in bytes.
    #[inline]
    const fn component_size(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F16 => 2,
        }
    }

    /// Guess precision from a file extension (`pc2` / `pc16`).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pc2" => Some(Precision::F32),
            "pc16" => Some(Precision::F16),
            _ => None,
        }
    }
}

/// Fixed-size point cache header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub version: i32,
    pub num_points: usize,
    pub start_frame: f32,
    pub sample_rate: f32,
    pub num_samples: usize,
}

impl Header {
    /// Header for `num_samples` frames of `num_points` vertices, starting at frame 0.
    pub fn new(num_points: usize, num_samples: usize) -> Self {
        Self {
            version: VERSION,
            num_points,
            start_frame: 0.0,
            sample_rate: 1.0,
            num_samples,
        }
    }

    /// Parse and validate a header from the first [`HEADER_SIZE`] bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated { expected: HEADER_SIZE, actual: data.len() });
        }
        if &data[0..12] != SIGNATURE {
            return Err(Error::BadSignature);
        }

        let mut cursor = &data[12..HEADER_SIZE];
        let version = cursor.read_i32::<LittleEndian>()?;
        let num_points = cursor.read_i32::<LittleEndian>()?;
        let start_frame = cursor.read_f32::<LittleEndian>()?;
        let sample_rate = cursor.read_f32::<LittleEndian>()?;
        let num_samples = cursor.read_i32::<LittleEndian>()?;

        Ok(Self {
            version,
            num_points: non_negative("vertex count", num_points)?,
            start_frame,
            sample_rate,
            num_samples: non_negative("frame count", num_samples)?,
        })
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..12].copy_from_slice(SIGNATURE);
        LittleEndian::write_i32(&mut out[12..16], self.version);
        LittleEndian::write_i32(&mut out[16..20], self.num_points as i32);
        LittleEndian::write_f32(&mut out[20..24], self.start_frame);
        LittleEndian::write_f32(&mut out[24..28], self.sample_rate);
        LittleEndian::write_i32(&mut out[28..32], self.num_samples as i32);
        out
    }

    /// Number of body bytes declared by this header.
    #[inline]
    fn body_len(&self, precision: Precision) -> usize {
        self.num_samples * self.num_points * 3 * precision.component_size()
    }
}

fn non_negative(field: &'static str, value: i32) -> Result<usize> {
    if value < 0 {
        return Err(Error::NegativeCount { field, value });
    }
    Ok(value as usize)
}

/// Decode a body into frame-major positions.
///
/// Trailing bytes past the declared body are ignored.
fn decode_body(header: &Header, body: &[u8], precision: Precision) -> Result<Vec<[f32; 3]>> {
    let expected = header.body_len(precision);
    if body.len() < expected {
        return Err(Error::Truncated { expected: HEADER_SIZE + expected, actual: HEADER_SIZE + body.len() });
    }
    let body = &body[..expected];
    let count = header.num_samples * header.num_points;

    let mut flat = vec![0f32; count * 3];
    match precision {
        Precision::F32 => LittleEndian::read_f32_into(body, &mut flat),
        Precision::F16 => {
            let mut bits = vec![0u16; count * 3];
            LittleEndian::read_u16_into(body, &mut bits);
            for (dst, b) in flat.iter_mut().zip(bits) {
                *dst = f16::from_bits(b).to_f32();
            }
        }
    }

    Ok(flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

/// Decode a complete in-memory cache.
pub fn decode(data: &[u8], precision: Precision) -> Result<(Header, Vec<[f32; 3]>)> {
    let header = Header::parse(data)?;
    let points = decode_body(&header, &data[HEADER_SIZE..], precision)?;
    Ok((header, points))
}

/// Write a 32-bit PC2 cache.
///
/// `points` holds `header.num_samples * header.num_points` positions, frame-major.
pub fn write_to<W: Write>(mut writer: W, header: &Header, points: &[[f32; 3]]) -> Result<()> {
    let expected = header.num_samples * header.num_points;
    if points.len() != expected {
        return Err(Error::Inconsistent { len: points.len(), num_points: header.num_points });
    }

    writer.write_all(&header.to_bytes())?;
    if cfg!(target_endian = "little") {
        writer.write_all(bytemuck::cast_slice(points))?;
    } else {
        for p in points {
            for &c in p {
                writer.write_f32::<LittleEndian>(c)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
