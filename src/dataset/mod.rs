//! Dataset sample readers.
//!
//! Two adapters normalize raw samples into a [`SequenceRecord`]:
//!
//! - [`MotionSequenceReader`] - AMASS `.npz` motion sequences, located
//!   through the [`SubDatasetRegistry`]
//! - [`GarmentCaptureReader`] - CLOTH3D-style samples with an outfit of
//!   garments, each with its own mesh and vertex animation; records are
//!   MAT-files, with a JSON fallback

pub(crate) mod garment;
pub(crate) mod mat;
pub(crate) mod motion;
pub(crate) mod npz;
pub(crate) mod record;
mod registry;

pub use garment::*;
pub use motion::*;
pub use npz::NpzArchive;
pub use record::*;
pub use registry::*;
