//! Parametric body pose transform.
//!
//! Converts SMPL axis-angle pose vectors into per-joint rotation matrices
//! and the 207 pose-corrective blendshape weights, and regresses rest-pose
//! joint locations from a deformed rest mesh.
//!
//! ## Blendshape ordering
//!
//! ```text
//! joint 1: (R1 - I) row 0, row 1, row 2   -> slots   0..9
//! joint 2: (R2 - I) row 0, row 1, row 2   -> slots   9..18
//! ...
//! joint 23                                -> slots 198..207
//! ```
//!
//! Joint 0 is the global orientation and never contributes a blendshape.

mod joints;
mod regressor;
mod rodrigues;

pub use joints::*;
pub use regressor::*;
pub use rodrigues::*;
