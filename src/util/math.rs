//! Math type re-exports and rotation helpers.
//!
//! Pose math runs in double precision (`DMat3`, `DVec3`); vertex data is
//! single precision (`Vec3`) to match the point cache layout.

pub use glam::{
    // Single precision
    Vec3, Mat3, Mat4, Quat,
    // Double precision
    DVec3, DMat3, DMat4, DQuat, DAffine3,
};

/// Rotation of `zrot` radians around the Z axis.
#[inline]
pub fn z_rotation_matrix(zrot: f64) -> DMat3 {
    let (s, c) = zrot.sin_cos();
    DMat3::from_cols(
        DVec3::new(c, s, 0.0),
        DVec3::new(-s, c, 0.0),
        DVec3::Z,
    )
}

/// Flatten a 3x3 matrix in row-major order.
#[inline]
pub fn row_major(m: &DMat3) -> [f64; 9] {
    m.transpose().to_cols_array()
}

/// Skew-symmetric cross-product matrix `[k]x`.
#[inline]
pub fn skew(k: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, k.z, -k.y),
        DVec3::new(-k.z, 0.0, k.x),
        DVec3::new(k.y, -k.x, 0.0),
    )
}

/// Reinterpret `[f32; 3]` positions as `Vec3` without copying.
#[inline]
pub fn as_vec3_slice(points: &[[f32; 3]]) -> &[Vec3] {
    bytemuck::cast_slice(points)
}

/// Reinterpret `Vec3` positions as `[f32; 3]` without copying.
#[inline]
pub fn as_array_slice(points: &[Vec3]) -> &[[f32; 3]] {
    bytemuck::cast_slice(points)
}
