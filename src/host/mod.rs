//! Scene host capability interface.
//!
//! The pipeline never touches scene objects directly. Everything it needs
//! from a 3D authoring environment goes through [`SceneHost`]: importing
//! garments, keying bone transforms and blendshape weights per frame,
//! evaluating deformed vertices and writing mesh/scene artifacts.
//!
//! [`HeadlessHost`] implements the interface in-process with a linear
//! blend skinning [`BodyModel`], so the whole pipeline runs without an
//! external application.

pub(crate) mod body_model;
mod headless;
mod stl;

pub use body_model::*;
pub use headless::*;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::pose::{Gender, RotationFrame, NUM_JOINTS};
use crate::util::{DMat3, DVec3, Result, Vec3};

// ============================================================================
// Handles
// ============================================================================

/// Opaque handle to a scene object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two canonical rigged body actors, retained across samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BodyActors {
    pub male: ObjectId,
    pub female: ObjectId,
}

impl BodyActors {
    #[inline]
    pub fn for_gender(&self, gender: Gender) -> ObjectId {
        match gender {
            Gender::Male => self.male,
            Gender::Female => self.female,
        }
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        id == self.male || id == self.female
    }
}

/// Positional blendshape slot on a body actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendshapeSlot {
    /// Pose corrective, `0..207`
    Pose(usize),
    /// Shape coefficient, `0..10`
    Shape(usize),
    /// Soft-tissue coefficient, `0..8`
    Dmpl(usize),
}

impl fmt::Display for BlendshapeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlendshapeSlot::Pose(i) => write!(f, "Pose{:03}", i),
            BlendshapeSlot::Shape(i) => write!(f, "Shape{:03}", i),
            BlendshapeSlot::Dmpl(i) => write!(f, "Dmpl{:03}", i),
        }
    }
}

/// Surface appearance handed to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    Image(PathBuf),
    Color([f32; 3]),
}

/// Inclusive frame range of the scene timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    /// Range covering `count` frames from zero (at least one frame).
    pub fn from_count(count: usize) -> Self {
        Self { start: 0, end: count.max(1) - 1 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame <= self.end
    }
}

/// What and where to export.
#[derive(Clone, Debug)]
pub struct ExportTarget {
    /// Output root; artifacts go to `<dir>/<name>/`.
    pub dir: PathBuf,
    pub name: String,
    pub objects: Vec<ObjectId>,
    pub zrot: f64,
    /// Only export this frame instead of the whole range.
    pub frame: Option<usize>,
}

impl ExportTarget {
    /// Directory that receives the artifacts.
    pub fn folder(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

// ============================================================================
// SceneHost
// ============================================================================

/// Operations the pipeline needs from a 3D authoring environment.
///
/// Transform and weight setters key the value at the current frame (see
/// [`SceneHost::set_frame`]); evaluation reads the keyed state of the
/// current frame.
pub trait SceneHost {
    /// Drop every object, including the body actors.
    fn reset_environment(&mut self) -> Result<()>;

    /// Create (or re-create) the two rigged body actors.
    fn load_body_actors(&mut self) -> Result<BodyActors>;

    /// Remove every object except `keep`. Retained actors keep their
    /// identity but lose per-sample animation, caches and textures.
    fn clear_transient(&mut self, keep: &BodyActors) -> Result<()>;

    /// Import a garment mesh as a new transient object.
    fn import_garment(&mut self, name: &str, mesh: &Path) -> Result<ObjectId>;

    /// Drive an object's vertices from a point cache file.
    fn bind_vertex_cache(&mut self, object: ObjectId, cache: &Path) -> Result<()>;

    fn apply_texture(&mut self, object: ObjectId, texture: &TextureSource) -> Result<()>;

    /// Rotate an object about the world Z axis.
    fn set_actor_orientation(&mut self, object: ObjectId, zrot: f64) -> Result<()>;

    fn set_frame_range(&mut self, range: FrameRange) -> Result<()>;

    fn set_frame(&mut self, frame: usize) -> Result<()>;

    fn set_bone_rotation(&mut self, actor: ObjectId, joint: usize, rotation: DMat3) -> Result<()>;

    fn set_bone_location(&mut self, actor: ObjectId, joint: usize, location: DVec3) -> Result<()>;

    fn set_blendshape_weight(&mut self, actor: ObjectId, slot: BlendshapeSlot, weight: f64) -> Result<()>;

    /// Re-anchor the skeleton on rest-pose joint locations.
    fn set_rest_joints(&mut self, actor: ObjectId, joints: &[DVec3; NUM_JOINTS]) -> Result<()>;

    /// Deformed vertices of an object at the current frame, object space.
    fn evaluate_vertices(&mut self, object: ObjectId) -> Result<Vec<Vec3>>;

    /// Vertex count of an object's mesh, if known.
    fn vertex_count(&self, object: ObjectId) -> Option<usize>;

    /// World-space bone heads at the current frame, in joint order.
    fn bone_heads(&mut self, actor: ObjectId) -> Result<Vec<DVec3>>;

    /// Write a static mesh snapshot of the target objects.
    fn export_mesh_snapshot(&mut self, target: &ExportTarget) -> Result<PathBuf>;

    /// Write an animated scene export, if the host supports one.
    fn export_scene(&mut self, target: &ExportTarget) -> Result<Option<PathBuf>>;

    /// Key every joint rotation of a frame.
    fn apply_rotations(&mut self, actor: ObjectId, frame: &RotationFrame) -> Result<()> {
        for (joint, rotation) in frame.rotations.iter().enumerate() {
            self.set_bone_rotation(actor, joint, *rotation)?;
        }
        Ok(())
    }

    /// Key pose-corrective and shape blendshape weights.
    fn apply_blendshapes(&mut self, actor: ObjectId, frame: &RotationFrame, shape: &[f64]) -> Result<()> {
        for (i, weight) in frame.blendshapes.iter().enumerate() {
            self.set_blendshape_weight(actor, BlendshapeSlot::Pose(i), *weight)?;
        }
        for (i, weight) in shape.iter().enumerate() {
            self.set_blendshape_weight(actor, BlendshapeSlot::Shape(i), *weight)?;
        }
        Ok(())
    }

    /// Key soft-tissue (DMPL) coefficients.
    fn apply_dmpls(&mut self, actor: ObjectId, coeffs: &[f64]) -> Result<()> {
        for (i, weight) in coeffs.iter().enumerate() {
            self.set_blendshape_weight(actor, BlendshapeSlot::Dmpl(i), *weight)?;
        }
        Ok(())
    }
}
