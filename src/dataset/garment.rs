//! CLOTH3D-style garment capture reader.
//!
//! Each sample directory holds:
//!
//! ```text
//! <sample>/info.mat           poses, trans, shape, gender, zrot, outfit
//! <sample>/<garment>.obj      garment mesh
//! <sample>/<garment>.pc16     garment vertex animation (or .pc2)
//! <sample>/<garment>.png      pattern texture, when the outfit asks for one
//! ```
//!
//! `info.json` with the same fields is read when no `info.mat` exists.
//! Time-varying fields keep the frame axis last: `poses` is `[72]`,
//! `[72][F]` or `[24][3][F]`, `trans` is `[3]` or `[3][F]`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::pose::{Gender, PoseVector};
use crate::util::{DVec3, Error, Result};
use super::mat::read_mat;
use super::{Garment, Sample, SequenceRecord, TextureDescriptor};

/// Record file inside each sample directory.
pub const RECORD_FILE: &str = "info.mat";

/// Record file read when [`RECORD_FILE`] is absent.
pub const JSON_RECORD_FILE: &str = "info.json";

/// Dense row-major array parsed from nested JSON lists.
#[derive(Debug, PartialEq)]
struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self { shape: Vec::new(), data: vec![n.as_f64()?] }),
            Value::Array(items) => {
                let mut shape = None;
                let mut data = Vec::new();
                for item in items {
                    let t = Self::parse(item)?;
                    match &shape {
                        None => shape = Some(t.shape),
                        Some(s) if *s != t.shape => return None,
                        Some(_) => {}
                    }
                    data.extend(t.data);
                }
                let mut full = vec![items.len()];
                full.extend(shape.unwrap_or_default());
                Some(Self { shape: full, data })
            }
            _ => None,
        }
    }

    /// Split into frames along the last axis. Rank-1 tensors are one frame.
    fn frames(&self) -> (Vec<Vec<f64>>, bool) {
        if self.shape.len() <= 1 {
            return (vec![self.data.clone()], true);
        }
        let count = *self.shape.last().unwrap_or(&1);
        let per_frame = self.data.len() / count.max(1);
        let frames = (0..count)
            .map(|i| (0..per_frame).map(|k| self.data[k * count + i]).collect())
            .collect();
        (frames, false)
    }
}

/// Reads garment capture samples into [`SequenceRecord`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct GarmentCaptureReader;

impl GarmentCaptureReader {
    /// Path of the record file of a sample, MAT-file first.
    pub fn record_path(sample: &Sample) -> PathBuf {
        let mat = sample.path.join(RECORD_FILE);
        let json = sample.path.join(JSON_RECORD_FILE);
        if !mat.is_file() && json.is_file() {
            json
        } else {
            mat
        }
    }

    /// Garment mesh imported by the host.
    pub fn mesh_path(sample: &Sample, garment: &str) -> PathBuf {
        sample.path.join(format!("{}.obj", garment))
    }

    /// Pattern image for a garment with [`TextureDescriptor::Pattern`].
    pub fn pattern_path(sample: &Sample, garment: &str) -> PathBuf {
        sample.path.join(format!("{}.png", garment))
    }

    /// Garment vertex animation source, PC16 preferred over PC2.
    pub fn vertex_source(sample: &Sample, garment: &str) -> Result<PathBuf> {
        ["pc16", "pc2"]
            .iter()
            .map(|ext| sample.path.join(format!("{}.{}", garment, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| Error::FileNotFound(sample.path.join(format!("{}.pc16", garment))))
    }

    /// Load the record of a sample.
    pub fn load(&self, sample: &Sample) -> Result<SequenceRecord> {
        let path = Self::record_path(sample);
        let info = if path.extension().is_some_and(|e| e == "json") {
            let text = fs::read_to_string(&path).map_err(|_| Error::FileNotFound(path.clone()))?;
            serde_json::from_str(&text).map_err(|e| Error::malformed("info", &path, e.to_string()))?
        } else {
            Value::Object(read_mat(&path)?)
        };
        let record = parse_record(sample.stem(), info, &path)?;

        tracing::debug!(
            frames = record.frame_count(),
            garments = record.outfit.len(),
            "loaded garment record {}",
            path.display()
        );
        Ok(record)
    }
}

fn field<'a>(info: &'a Value, name: &str, path: &Path) -> Result<&'a Value> {
    info.get(name).ok_or_else(|| Error::missing(name, path))
}

fn tensor(info: &Value, name: &str, path: &Path) -> Result<Tensor> {
    Tensor::parse(field(info, name, path)?)
        .ok_or_else(|| Error::malformed(name, path, "expected a rectangular numeric array"))
}

fn parse_record(name: &str, info: Value, path: &Path) -> Result<SequenceRecord> {
    let (pose_frames, single_frame) = tensor(&info, "poses", path)?.frames();
    let poses = pose_frames
        .iter()
        .map(|p| PoseVector::from_slice(p))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::malformed("poses", path, e.to_string()))?;

    let (trans_frames, _) = tensor(&info, "trans", path)?.frames();
    let trans = trans_frames
        .iter()
        .map(|t| match t.as_slice() {
            [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
            other => Err(Error::malformed("trans", path, format!("expected 3 components, got {}", other.len()))),
        })
        .collect::<Result<Vec<_>>>()?;

    let shape = tensor(&info, "shape", path)?.data;

    let gender = match field(&info, "gender", path)? {
        Value::Bool(male) => Some(if *male { Gender::Male } else { Gender::Female }),
        Value::Number(n) => n.as_f64().map(|v| if v != 0.0 { Gender::Male } else { Gender::Female }),
        Value::String(s) => Gender::parse(s),
        _ => None,
    }
    .ok_or_else(|| Error::malformed("gender", path, "expected a bool, number or gender name"))?;

    let zrot = field(&info, "zrot", path)?
        .as_f64()
        .ok_or_else(|| Error::malformed("zrot", path, "expected a number"))?;

    let outfit = field(&info, "outfit", path)?
        .as_object()
        .ok_or_else(|| Error::malformed("outfit", path, "expected a map of garments"))?
        .iter()
        .map(|(garment, entry)| parse_garment(garment, entry, path))
        .collect::<Result<Vec<_>>>()?;

    let record = SequenceRecord {
        name: name.to_string(),
        poses,
        trans,
        shape,
        gender,
        dmpls: None,
        outfit,
        zrot,
        single_frame,
        info,
    };
    record.validate(path)?;
    Ok(record)
}

fn parse_garment(name: &str, entry: &Value, path: &Path) -> Result<Garment> {
    let key = format!("outfit.{}.texture", name);
    let texture = entry.get("texture").ok_or_else(|| Error::missing(&key, path))?;

    let texture = match texture.get("type").and_then(Value::as_str) {
        Some("color") => {
            let data = texture
                .get("data")
                .and_then(Tensor::parse)
                .filter(|t| t.data.len() >= 3)
                .ok_or_else(|| Error::malformed(&key, path, "color needs 3 components"))?;
            TextureDescriptor::Color([data.data[0] as f32, data.data[1] as f32, data.data[2] as f32])
        }
        Some("pattern") => TextureDescriptor::Pattern,
        other => {
            return Err(Error::malformed(&key, path, format!("unknown texture type {:?}", other)));
        }
    };
    Ok(Garment { name: name.to_string(), texture })
}
