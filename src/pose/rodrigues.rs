//! Axis-angle to rotation matrix conversion and pose blendshapes.

use crate::util::{row_major, skew, DMat3, DVec3, Error, Result};
use super::joints::*;

/// Rotation matrix for an axis-angle vector (Rodrigues' formula).
///
/// `R = cos t * I + (1 - cos t) * k k^T + sin t * [k]x` with `t = |r|`,
/// `k = r / t`. A zero vector yields the identity.
pub fn rodrigues(r: DVec3) -> DMat3 {
    let theta = r.length();
    if theta == 0.0 {
        return DMat3::IDENTITY;
    }
    let k = r / theta;
    let (s, c) = theta.sin_cos();
    let kkt = DMat3::from_cols(k * k.x, k * k.y, k * k.z);
    DMat3::IDENTITY * c + kkt * (1.0 - c) + skew(k) * s
}

/// A validated 72-scalar pose vector (24 joints x axis-angle).
#[derive(Clone, Debug, PartialEq)]
pub struct PoseVector([f64; POSE_LEN]);

impl PoseVector {
    /// Zero pose (every joint at rest).
    pub const ZERO: Self = Self([0.0; POSE_LEN]);

    /// Build from 72 values, or 66 values with the two hand joints zero-padded.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values.len() {
            POSE_LEN | BODY_POSE_LEN => {
                let mut out = [0.0; POSE_LEN];
                out[..values.len()].copy_from_slice(values);
                Ok(Self(out))
            }
            n => Err(Error::InvalidPoseLength(n)),
        }
    }

    /// Build from an SMPL-H style pose: body joints are kept, hand
    /// articulation past the first 66 values is replaced by zeros.
    pub fn from_smplh(values: &[f64]) -> Result<Self> {
        if values.len() < BODY_POSE_LEN {
            return Err(Error::InvalidPoseLength(values.len()));
        }
        Self::from_slice(&values[..BODY_POSE_LEN])
    }

    /// Axis-angle vector of one joint.
    #[inline]
    pub fn joint(&self, index: usize) -> DVec3 {
        DVec3::new(self.0[index * 3], self.0[index * 3 + 1], self.0[index * 3 + 2])
    }

    /// Global (root) orientation.
    #[inline]
    pub fn root_orientation(&self) -> DVec3 {
        self.joint(0)
    }

    /// Raw scalars.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Per-frame rotations and pose blendshapes derived from one pose vector.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationFrame {
    /// One rotation per joint, joint 0 is the global orientation.
    pub rotations: [DMat3; NUM_JOINTS],
    /// `(R_i - I)` row-major for joints 1..23, joint-major.
    pub blendshapes: [f64; NUM_POSE_BLENDSHAPES],
}

impl RotationFrame {
    /// Compute rotations and blendshapes for a pose.
    pub fn from_pose(pose: &PoseVector) -> Self {
        let mut rotations = [DMat3::IDENTITY; NUM_JOINTS];
        for (j, rot) in rotations.iter_mut().enumerate() {
            *rot = rodrigues(pose.joint(j));
        }

        let mut blendshapes = [0.0; NUM_POSE_BLENDSHAPES];
        for (j, rot) in rotations.iter().enumerate().skip(1) {
            let delta = row_major(&(*rot - DMat3::IDENTITY));
            blendshapes[(j - 1) * 9..j * 9].copy_from_slice(&delta);
        }

        Self { rotations, blendshapes }
    }

    /// Rest frame (identity rotations, zero blendshapes).
    pub fn identity() -> Self {
        Self::from_pose(&PoseVector::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-5;

    fn assert_proper_rotation(r: &DMat3) {
        let rtr = r.transpose() * *r;
        assert!(rtr.abs_diff_eq(DMat3::IDENTITY, TOL), "R^T R != I: {:?}", rtr);
        assert!((r.determinant() - 1.0).abs() < TOL, "det = {}", r.determinant());
    }

    #[test]
    fn test_zero_pose_is_identity() {
        let frame = RotationFrame::from_pose(&PoseVector::ZERO);
        for r in &frame.rotations {
            assert_eq!(*r, DMat3::IDENTITY);
        }
        assert!(frame.blendshapes.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_rodrigues_orthonormal() {
        let axes = [
            DVec3::X,
            DVec3::Y,
            DVec3::Z,
            DVec3::new(1.0, 1.0, 1.0).normalize(),
            DVec3::new(-0.3, 0.8, 0.1).normalize(),
            DVec3::new(0.0, -1.0, 2.5).normalize(),
        ];
        for axis in axes {
            for i in 0..32 {
                let theta = -6.0 + i as f64 * 0.4;
                assert_proper_rotation(&rodrigues(axis * theta));
            }
        }
    }

    #[test]
    fn test_rodrigues_matches_axis_angle() {
        let axis = DVec3::new(0.2, -0.7, 0.4).normalize();
        let theta = 1.3;
        let expected = DMat3::from_axis_angle(axis, theta);
        assert!(rodrigues(axis * theta).abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn test_blendshape_ordering() {
        // Rotate only joint 2 by 90 degrees about Z.
        let mut values = [0.0; POSE_LEN];
        values[2 * 3 + 2] = std::f64::consts::FRAC_PI_2;
        let frame = RotationFrame::from_pose(&PoseVector::from_slice(&values).unwrap());

        // Joint 1 untouched.
        assert!(frame.blendshapes[0..9].iter().all(|b| b.abs() < 1e-12));

        // Rz(90) - I, row-major: [-1 -1 0 | 1 -1 0 | 0 0 0]
        let expected = [-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 0.0, 0.0];
        for (got, want) in frame.blendshapes[9..18].iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{} != {}", got, want);
        }
        assert!(frame.blendshapes[18..].iter().all(|b| b.abs() < 1e-12));
    }

    #[test]
    fn test_root_excluded_from_blendshapes() {
        let mut values = [0.0; POSE_LEN];
        values[0] = 0.7;
        values[1] = -0.2;
        let frame = RotationFrame::from_pose(&PoseVector::from_slice(&values).unwrap());
        assert_ne!(frame.rotations[0], DMat3::IDENTITY);
        assert!(frame.blendshapes.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_pose_length_validation() {
        assert!(PoseVector::from_slice(&[0.0; 72]).is_ok());

        let padded = PoseVector::from_slice(&[0.5; 66]).unwrap();
        assert_eq!(padded.joint(21), DVec3::splat(0.5));
        assert_eq!(padded.joint(22), DVec3::ZERO);
        assert_eq!(padded.joint(23), DVec3::ZERO);

        assert!(matches!(PoseVector::from_slice(&[0.0; 69]), Err(Error::InvalidPoseLength(69))));
        assert!(matches!(PoseVector::from_slice(&[]), Err(Error::InvalidPoseLength(0))));
    }

    #[test]
    fn test_from_smplh_drops_hands() {
        let values: Vec<f64> = (0..156).map(|i| i as f64).collect();
        let pose = PoseVector::from_smplh(&values).unwrap();
        assert_eq!(pose.joint(21), DVec3::new(63.0, 64.0, 65.0));
        assert_eq!(pose.joint(22), DVec3::ZERO);
        assert!(PoseVector::from_smplh(&values[..50]).is_err());
    }
}
