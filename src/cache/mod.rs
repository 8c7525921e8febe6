//! Vertex animation cache.
//!
//! Per-frame vertex positions are stored as PC2 point caches, one file per
//! (sample, garment) pair. A cache is written once and trusted for every
//! later run; there is no staleness check, deleting the file is the only
//! way to force recomputation.

mod io;
mod store;

pub use io::*;
pub use store::*;

use crate::util::{as_vec3_slice, Error, Result, Vec3};

/// Frame-major vertex positions for one animated mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexCache {
    vertex_count: usize,
    positions: Vec<Vec3>,
    start_frame: f32,
    sample_rate: f32,
}

impl VertexCache {
    /// Empty cache for meshes with `vertex_count` vertices.
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            positions: Vec::new(),
            start_frame: 0.0,
            sample_rate: 1.0,
        }
    }

    /// Build from a list of frames; every frame must have the same length.
    pub fn from_frames(frames: &[Vec<Vec3>]) -> Result<Self> {
        let vertex_count = frames.first().map(|f| f.len()).unwrap_or(0);
        let mut cache = Self::new(vertex_count);
        for frame in frames {
            cache.push_frame(frame)?;
        }
        Ok(cache)
    }

    pub(crate) fn from_pc2(header: &pc2::Header, points: Vec<[f32; 3]>) -> Self {
        Self {
            vertex_count: header.num_points,
            positions: as_vec3_slice(&points).to_vec(),
            start_frame: header.start_frame,
            sample_rate: header.sample_rate,
        }
    }

    /// Append one frame.
    pub fn push_frame(&mut self, frame: &[Vec3]) -> Result<()> {
        if frame.len() != self.vertex_count {
            return Err(Error::VertexCountMismatch {
                expected: self.vertex_count,
                actual: frame.len(),
            });
        }
        self.positions.extend_from_slice(frame);
        Ok(())
    }

    /// Vertices per frame.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        if self.vertex_count == 0 {
            0
        } else {
            self.positions.len() / self.vertex_count
        }
    }

    /// Positions of one frame.
    pub fn frame(&self, index: usize) -> Option<&[Vec3]> {
        if index >= self.frame_count() {
            return None;
        }
        let start = index * self.vertex_count;
        Some(&self.positions[start..start + self.vertex_count])
    }

    /// Mutable positions of one frame.
    pub fn frame_mut(&mut self, index: usize) -> Option<&mut [Vec3]> {
        if index >= self.frame_count() {
            return None;
        }
        let start = index * self.vertex_count;
        Some(&mut self.positions[start..start + self.vertex_count])
    }

    /// Iterate frames in order.
    pub fn frames(&self) -> impl Iterator<Item = &[Vec3]> {
        self.positions.chunks_exact(self.vertex_count.max(1))
    }

    /// All positions, frame-major.
    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub(crate) fn header(&self) -> pc2::Header {
        pc2::Header {
            start_frame: self.start_frame,
            sample_rate: self.sample_rate,
            ..pc2::Header::new(self.vertex_count, self.frame_count())
        }
    }
}

/// Compare a cache against the live mesh vertex count.
///
/// A mismatch is reported as a warning and never fails; returns whether the
/// counts agree.
pub fn check_vertex_count(cache: &VertexCache, expected: usize, label: &str) -> bool {
    if cache.vertex_count() != expected {
        tracing::warn!(
            cache = cache.vertex_count(),
            mesh = expected,
            "vertex count mismatch for {}",
            label
        );
        return false;
    }
    true
}
