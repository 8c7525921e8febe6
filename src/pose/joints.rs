//! SMPL joint layout.

/// Number of SMPL joints (including the global root orientation).
pub const NUM_JOINTS: usize = 24;

/// Scalars in a full pose vector (24 joints x axis-angle).
pub const POSE_LEN: usize = NUM_JOINTS * 3;

/// Scalars in a body-only pose (22 joints, hands omitted).
pub const BODY_POSE_LEN: usize = 66;

/// Pose-corrective blendshapes (23 non-root joints x 9).
pub const NUM_POSE_BLENDSHAPES: usize = (NUM_JOINTS - 1) * 9;

/// Shape coefficients driven on the body.
pub const NUM_SHAPE_COEFFS: usize = 10;

/// Soft-tissue (DMPL) coefficients driven on the body.
pub const NUM_DMPL_COEFFS: usize = 8;

/// Joint names in bone order (bone_00 .. bone_23).
pub const JOINT_NAMES: [&str; NUM_JOINTS] = [
    "Pelvis",
    "L_Hip",
    "R_Hip",
    "Spine1",
    "L_Knee",
    "R_Knee",
    "Spine2",
    "L_Ankle",
    "R_Ankle",
    "Spine3",
    "L_Foot",
    "R_Foot",
    "Neck",
    "L_Collar",
    "R_Collar",
    "Head",
    "L_Shoulder",
    "R_Shoulder",
    "L_Elbow",
    "R_Elbow",
    "L_Wrist",
    "R_Wrist",
    "L_Hand",
    "R_Hand",
];

/// Kinematic parent of each joint (`None` for the pelvis).
pub const JOINT_PARENTS: [Option<usize>; NUM_JOINTS] = [
    None,
    Some(0), Some(0), Some(0),
    Some(1), Some(2), Some(3),
    Some(4), Some(5), Some(6),
    Some(7), Some(8), Some(9),
    Some(9), Some(9), Some(12),
    Some(13), Some(14), Some(16),
    Some(17), Some(18), Some(19),
    Some(20), Some(21),
];

/// Body gender; selects the body actor, model and joint regressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Lowercase name as used in asset file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Single-letter prefix (`m` / `f`).
    pub fn initial(self) -> char {
        match self {
            Gender::Male => 'm',
            Gender::Female => 'f',
        }
    }

    /// Parse dataset gender strings (`male`, `m`, `female`, `f`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(POSE_LEN, 72);
        assert_eq!(NUM_POSE_BLENDSHAPES, 207);
    }

    #[test]
    fn test_parents_precede_children() {
        for (i, parent) in JOINT_PARENTS.iter().enumerate() {
            if let Some(p) = parent {
                assert!(*p < i, "joint {} has parent {}", i, p);
            }
        }
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("male"), Some(Gender::Male));
        assert_eq!(Gender::parse(" F "), Some(Gender::Female));
        assert_eq!(Gender::parse("neutral"), None);
        assert_eq!(Gender::Female.initial(), 'f');
    }
}
