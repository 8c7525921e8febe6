//! Normalized per-sample records.

use std::path::{Path, PathBuf};

use crate::pose::{Gender, PoseVector, NUM_SHAPE_COEFFS};
use crate::util::{DVec3, Error, Result};

/// One unit of batch work: an identifier plus its directory.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sample {
    pub id: String,
    pub path: PathBuf,
}

impl Sample {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { id: id.into(), path: path.into() }
    }

    /// Sample id without any file extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.id)
    }
}

/// How a garment surface is coloured.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureDescriptor {
    /// Solid RGB colour in `[0, 1]`
    Color([f32; 3]),
    /// UV pattern image stored next to the garment mesh
    Pattern,
}

/// One garment of an outfit.
#[derive(Clone, Debug, PartialEq)]
pub struct Garment {
    pub name: String,
    pub texture: TextureDescriptor,
}

/// Pose, shape and translation sequence for one sample, independent of
/// the dataset it came from.
#[derive(Clone, Debug)]
pub struct SequenceRecord {
    /// Display name used for output folders and artifacts.
    pub name: String,
    pub poses: Vec<PoseVector>,
    pub trans: Vec<DVec3>,
    /// Shape coefficients (betas); only the first ten drive the body.
    pub shape: Vec<f64>,
    pub gender: Gender,
    /// Soft-tissue coefficients per frame, when the source has them.
    pub dmpls: Option<Vec<Vec<f64>>>,
    pub outfit: Vec<Garment>,
    /// Global rotation about Z applied to the actors.
    pub zrot: f64,
    /// Source had no time axis.
    pub single_frame: bool,
    /// Source metadata carried into the trajectory export.
    pub info: serde_json::Value,
}

impl SequenceRecord {
    /// Number of animated frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.poses.len()
    }

    /// Shape coefficients applied to the body (at most ten).
    pub fn body_shape(&self) -> &[f64] {
        &self.shape[..self.shape.len().min(NUM_SHAPE_COEFFS)]
    }

    /// Check the frame invariants against the source path.
    pub fn validate(&self, source: &Path) -> Result<()> {
        if self.poses.is_empty() {
            return Err(Error::malformed("poses", source, "no frames"));
        }
        if self.poses.len() != self.trans.len() {
            return Err(Error::malformed(
                "trans",
                source,
                format!("{} frames, poses has {}", self.trans.len(), self.poses.len()),
            ));
        }
        if self.single_frame && self.poses.len() != 1 {
            return Err(Error::malformed("poses", source, "single-frame record with several poses"));
        }
        Ok(())
    }
}
