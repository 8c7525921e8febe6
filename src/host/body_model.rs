//! SMPL linear blend skinning body model.

use std::path::Path;

use ndarray::{Array2, Array3};

use crate::dataset::NpzArchive;
use crate::pose::{
    Gender, JointRegressor, JOINT_PARENTS, NUM_DMPL_COEFFS, NUM_JOINTS, NUM_POSE_BLENDSHAPES, NUM_SHAPE_COEFFS,
};
use crate::util::{DAffine3, DMat3, DVec3, Error, Result, Vec3};

/// Keyed articulation of a body at one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyPose {
    pub rotations: [DMat3; NUM_JOINTS],
    /// Offset applied to the pelvis, in body space.
    pub root_location: DVec3,
    pub pose_weights: [f64; NUM_POSE_BLENDSHAPES],
    pub shape_weights: [f64; NUM_SHAPE_COEFFS],
    pub dmpl_weights: [f64; NUM_DMPL_COEFFS],
}

impl Default for BodyPose {
    fn default() -> Self {
        Self {
            rotations: [DMat3::IDENTITY; NUM_JOINTS],
            root_location: DVec3::ZERO,
            pose_weights: [0.0; NUM_POSE_BLENDSHAPES],
            shape_weights: [0.0; NUM_SHAPE_COEFFS],
            dmpl_weights: [0.0; NUM_DMPL_COEFFS],
        }
    }
}

/// Evaluated body: skinned vertices and posed joint locations.
#[derive(Clone, Debug)]
pub struct BodyMesh {
    pub vertices: Vec<Vec3>,
    pub joints: [DVec3; NUM_JOINTS],
}

/// Template mesh, blendshape bases, joint regressor and skinning weights
/// of one gender, optionally with a DMPL soft-tissue basis.
#[derive(Clone, Debug)]
pub struct BodyModel {
    gender: Gender,
    template: Vec<DVec3>,
    /// V x 3 x B
    shape_dirs: Array3<f64>,
    /// V x 3 x 207
    pose_dirs: Array3<f64>,
    /// V x 3 x D, added with the shape blend
    dmpl_dirs: Option<Array3<f64>>,
    regressor: JointRegressor,
    /// V x 24
    weights: Array2<f64>,
    faces: Vec<[u32; 3]>,
}

impl BodyModel {
    /// Assemble a model, checking that every array agrees on the vertex count.
    pub fn new(
        gender: Gender,
        template: Vec<DVec3>,
        shape_dirs: Array3<f64>,
        pose_dirs: Array3<f64>,
        regressor: JointRegressor,
        weights: Array2<f64>,
        faces: Vec<[u32; 3]>,
    ) -> Result<Self> {
        let v = template.len();
        let check = |what: &str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(Error::other(format!("body model {} does not match {} template vertices", what, v)))
            }
        };
        check("shapedirs", shape_dirs.dim().0 == v && shape_dirs.dim().1 == 3)?;
        check("posedirs", pose_dirs.dim() == (v, 3, NUM_POSE_BLENDSHAPES))?;
        check("J_regressor", regressor.num_vertices() == v)?;
        check("weights", weights.dim() == (v, NUM_JOINTS))?;
        check("faces", faces.iter().flatten().all(|&i| (i as usize) < v))?;

        Ok(Self { gender, template, shape_dirs, pose_dirs, dmpl_dirs: None, regressor, weights, faces })
    }

    /// Load `v_template`, `shapedirs`, `posedirs`, `J_regressor`, `weights`
    /// and `f` from an SMPL `.npz` model file.
    pub fn load(path: impl AsRef<Path>, gender: Gender) -> Result<Self> {
        let path = path.as_ref();
        let mut npz = NpzArchive::open(path)?;

        let (template, _) = npz.matrix("v_template")?.ok_or_else(|| Error::missing("v_template", path))?;
        if template.ncols() != 3 {
            return Err(Error::malformed("v_template", path, "expected V x 3"));
        }
        let template = template.rows().into_iter().map(|r| DVec3::new(r[0], r[1], r[2])).collect();
        let shape_dirs = npz.array3("shapedirs")?.ok_or_else(|| Error::missing("shapedirs", path))?;
        let pose_dirs = npz.array3("posedirs")?.ok_or_else(|| Error::missing("posedirs", path))?;
        let (j_reg, _) = npz.matrix("J_regressor")?.ok_or_else(|| Error::missing("J_regressor", path))?;
        let (weights, _) = npz.matrix("weights")?.ok_or_else(|| Error::missing("weights", path))?;
        let faces = npz.indices("f")?.ok_or_else(|| Error::missing("f", path))?;
        if faces.ncols() != 3 {
            return Err(Error::malformed("f", path, "expected triangles"));
        }
        let faces = faces.rows().into_iter().map(|r| [r[0], r[1], r[2]]).collect();

        let model = Self::new(gender, template, shape_dirs, pose_dirs, JointRegressor::new(j_reg)?, weights, faces)
            .map_err(|e| Error::malformed("model", path, e.to_string()))?;
        tracing::info!(
            vertices = model.num_vertices(),
            faces = model.faces.len(),
            "loaded {} body model from {}",
            gender,
            path.display()
        );
        Ok(model)
    }

    /// Attach a soft-tissue basis. Weights beyond its depth are ignored.
    pub fn with_dmpls(mut self, dirs: Array3<f64>) -> Result<Self> {
        let (v, c, _) = dirs.dim();
        if v != self.num_vertices() || c != 3 {
            return Err(Error::other(format!(
                "DMPL basis {:?} does not match {} template vertices",
                dirs.dim(),
                self.num_vertices()
            )));
        }
        self.dmpl_dirs = Some(dirs);
        Ok(self)
    }

    /// Load the `eigvec` soft-tissue basis of a DMPL `.npz` file.
    pub fn load_dmpls(path: impl AsRef<Path>) -> Result<Array3<f64>> {
        let path = path.as_ref();
        let mut npz = NpzArchive::open(path)?;
        npz.array3("eigvec")?.ok_or_else(|| Error::missing("eigvec", path))
    }

    #[inline]
    pub fn has_dmpls(&self) -> bool {
        self.dmpl_dirs.is_some()
    }

    #[inline]
    pub fn gender(&self) -> Gender {
        self.gender
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.template.len()
    }

    #[inline]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    #[inline]
    pub fn regressor(&self) -> &JointRegressor {
        &self.regressor
    }

    /// Template plus shape and soft-tissue blendshapes.
    fn shaped(&self, shape: &[f64], dmpls: &[f64]) -> Vec<DVec3> {
        let betas = shape.len().min(self.shape_dirs.dim().2);
        let mut verts = self.template.clone();
        add_blendshapes(&mut verts, &self.shape_dirs, &shape[..betas]);
        if let Some(dirs) = &self.dmpl_dirs {
            let depth = dmpls.len().min(dirs.dim().2);
            add_blendshapes(&mut verts, dirs, &dmpls[..depth]);
        }
        verts
    }

    /// Joints regressed from the shaped template.
    pub fn rest_joints(&self, shape: &[f64]) -> Result<[DVec3; NUM_JOINTS]> {
        self.regressor.regress(&to_f32(&self.shaped(shape, &[])))
    }

    /// Posed joint locations without skinning the mesh.
    pub fn posed_joints(
        &self,
        pose: &BodyPose,
        rest_joints: Option<&[DVec3; NUM_JOINTS]>,
    ) -> Result<[DVec3; NUM_JOINTS]> {
        let rest = match rest_joints {
            Some(j) => *j,
            None => self.regressor.regress(&to_f32(&self.shaped(&pose.shape_weights, &pose.dmpl_weights)))?,
        };
        Ok(joint_locations(&chain(&pose.rotations, &rest), pose.root_location))
    }

    /// Evaluate the model.
    ///
    /// `rest_joints` overrides the joints regressed from the shaped
    /// template, the way a re-anchored skeleton does.
    pub fn evaluate(&self, pose: &BodyPose, rest_joints: Option<&[DVec3; NUM_JOINTS]>) -> Result<BodyMesh> {
        let mut verts = self.shaped(&pose.shape_weights, &pose.dmpl_weights);
        let rest = match rest_joints {
            Some(j) => *j,
            None => self.regressor.regress(&to_f32(&verts))?,
        };
        add_blendshapes(&mut verts, &self.pose_dirs, &pose.pose_weights);

        let global = chain(&pose.rotations, &rest);
        let skinning: Vec<DAffine3> = global
            .iter()
            .zip(&rest)
            .map(|(g, j)| *g * DAffine3::from_translation(-*j))
            .collect();

        let vertices = verts
            .iter()
            .zip(self.weights.rows())
            .map(|(v, w)| {
                let mut blended = DAffine3 { matrix3: DMat3::ZERO, translation: DVec3::ZERO };
                for (a, &wj) in skinning.iter().zip(w.iter()) {
                    if wj != 0.0 {
                        blended.matrix3 += a.matrix3 * wj;
                        blended.translation += a.translation * wj;
                    }
                }
                (blended.transform_point3(*v) + pose.root_location).as_vec3()
            })
            .collect();

        let joints = joint_locations(&global, pose.root_location);
        Ok(BodyMesh { vertices, joints })
    }
}

fn joint_locations(global: &[DAffine3; NUM_JOINTS], offset: DVec3) -> [DVec3; NUM_JOINTS] {
    let mut joints = [DVec3::ZERO; NUM_JOINTS];
    for (out, g) in joints.iter_mut().zip(global) {
        *out = g.translation + offset;
    }
    joints
}

/// Forward kinematics along the SMPL tree.
fn chain(rotations: &[DMat3; NUM_JOINTS], rest: &[DVec3; NUM_JOINTS]) -> [DAffine3; NUM_JOINTS] {
    let mut global = [DAffine3::IDENTITY; NUM_JOINTS];
    for j in 0..NUM_JOINTS {
        global[j] = match JOINT_PARENTS[j] {
            Some(p) => global[p] * DAffine3::from_mat3_translation(rotations[j], rest[j] - rest[p]),
            None => DAffine3::from_mat3_translation(rotations[j], rest[j]),
        };
    }
    global
}

fn add_blendshapes(verts: &mut [DVec3], dirs: &Array3<f64>, weights: &[f64]) {
    for (k, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for (v, vert) in verts.iter_mut().enumerate() {
            *vert += DVec3::new(dirs[[v, 0, k]], dirs[[v, 1, k]], dirs[[v, 2, k]]) * w;
        }
    }
}

fn to_f32(verts: &[DVec3]) -> Vec<Vec3> {
    verts.iter().map(|v| v.as_vec3()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pose::{rodrigues, PoseVector, RotationFrame};

    /// One vertex per joint sitting on the joint, rigidly bound to it,
    /// plus a single triangle. Shape coefficient 0 lifts every vertex in Z.
    pub(crate) fn toy_model(gender: Gender) -> BodyModel {
        let template: Vec<DVec3> = (0..NUM_JOINTS).map(|j| DVec3::new(0.0, j as f64 * 0.1, 0.0)).collect();
        let mut shape_dirs = Array3::zeros((NUM_JOINTS, 3, NUM_SHAPE_COEFFS));
        for v in 0..NUM_JOINTS {
            shape_dirs[[v, 2, 0]] = 1.0;
        }
        let pose_dirs = Array3::zeros((NUM_JOINTS, 3, NUM_POSE_BLENDSHAPES));
        let regressor = JointRegressor::new(Array2::eye(NUM_JOINTS)).unwrap();
        let weights = Array2::eye(NUM_JOINTS);
        BodyModel::new(gender, template, shape_dirs, pose_dirs, regressor, weights, vec![[0, 1, 2]]).unwrap()
    }

    #[test]
    fn test_rest_pose_is_template() {
        let model = toy_model(Gender::Male);
        let mesh = model.evaluate(&BodyPose::default(), None).unwrap();
        for (j, v) in mesh.vertices.iter().enumerate() {
            assert!((v.y - j as f32 * 0.1).abs() < 1e-6);
        }
        assert!(mesh.joints[5].abs_diff_eq(DVec3::new(0.0, 0.5, 0.0), 1e-12));
    }

    #[test]
    fn test_shape_moves_vertices() {
        let model = toy_model(Gender::Female);
        let mut pose = BodyPose::default();
        pose.shape_weights[0] = 0.5;
        let mesh = model.evaluate(&pose, None).unwrap();
        assert!(mesh.vertices.iter().all(|v| (v.z - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_root_rotation_and_location() {
        let model = toy_model(Gender::Male);
        let mut values = [0.0; 72];
        values[2] = std::f64::consts::FRAC_PI_2;
        let frame = RotationFrame::from_pose(&PoseVector::from_slice(&values).unwrap());

        let mut pose = BodyPose { rotations: frame.rotations, ..Default::default() };
        pose.root_location = DVec3::new(1.0, 0.0, 0.0);
        let mesh = model.evaluate(&pose, None).unwrap();

        // Vertex 3 (spine1, child of the pelvis) at y = 0.3 swings to -x
        let expected = rodrigues(DVec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2)) * DVec3::new(0.0, 0.3, 0.0)
            + DVec3::new(1.0, 0.0, 0.0);
        assert!(mesh.vertices[3].as_dvec3().abs_diff_eq(expected, 1e-6));
        assert!(mesh.joints[0].abs_diff_eq(DVec3::new(1.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn test_posed_joints_match_evaluate() {
        let model = toy_model(Gender::Female);
        let mut values = [0.0; 72];
        values[3 * 3] = 0.4;
        values[6 * 3 + 1] = -0.3;
        let frame = RotationFrame::from_pose(&PoseVector::from_slice(&values).unwrap());
        let pose = BodyPose { rotations: frame.rotations, ..Default::default() };

        let mesh = model.evaluate(&pose, None).unwrap();
        let joints = model.posed_joints(&pose, None).unwrap();
        for (a, b) in mesh.joints.iter().zip(&joints) {
            assert!(a.abs_diff_eq(*b, 1e-12));
        }
    }

    #[test]
    fn test_rest_joint_override() {
        let model = toy_model(Gender::Male);
        let rest = [DVec3::new(0.0, 0.0, 1.0); NUM_JOINTS];
        let mesh = model.evaluate(&BodyPose::default(), Some(&rest)).unwrap();
        assert!(mesh.joints[0].abs_diff_eq(DVec3::new(0.0, 0.0, 1.0), 1e-12));
    }

    #[test]
    fn test_rejects_inconsistent_arrays() {
        let err = BodyModel::new(
            Gender::Male,
            vec![DVec3::ZERO; 3],
            Array3::zeros((3, 3, 10)),
            Array3::zeros((3, 3, NUM_POSE_BLENDSHAPES)),
            JointRegressor::new(Array2::zeros((NUM_JOINTS, 3))).unwrap(),
            Array2::zeros((4, NUM_JOINTS)),
            vec![],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_dmpl_moves_vertices() {
        let mut dirs = Array3::zeros((NUM_JOINTS, 3, NUM_DMPL_COEFFS));
        for v in 0..NUM_JOINTS {
            dirs[[v, 0, 1]] = v as f64;
        }
        let mut pose = BodyPose::default();
        pose.dmpl_weights[1] = 0.5;

        // Without a basis the weights have nothing to drive
        let plain = toy_model(Gender::Male).evaluate(&pose, None).unwrap();
        assert!(plain.vertices.iter().all(|v| v.x.abs() < 1e-6));

        let model = toy_model(Gender::Male).with_dmpls(dirs).unwrap();
        assert!(model.has_dmpls());
        let rest = model.rest_joints(&[]).unwrap();
        let mesh = model.evaluate(&pose, Some(&rest)).unwrap();
        assert!((mesh.vertices[4].x - 2.0).abs() < 1e-6);
        assert!((mesh.vertices[4].y - 0.4).abs() < 1e-6);
        assert!(mesh.vertices[0].x.abs() < 1e-6);
    }

    #[test]
    fn test_dmpl_basis_must_match_template() {
        let err = toy_model(Gender::Female).with_dmpls(Array3::zeros((3, 3, NUM_DMPL_COEFFS)));
        assert!(err.is_err());
    }
}
