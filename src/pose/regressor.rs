//! Rest-pose joint regression.

use std::fs::File;
use std::path::Path;

use ndarray::Array2;
use ndarray_npy::NpzReader;

use crate::util::{DVec3, Error, Result, Vec3};
use super::joints::{Gender, NUM_JOINTS};

/// Fixed linear map from mesh vertices to joint locations (24 x V).
#[derive(Clone, Debug)]
pub struct JointRegressor {
    weights: Array2<f64>,
}

impl JointRegressor {
    /// Wrap a dense `24 x V` weight matrix.
    pub fn new(weights: Array2<f64>) -> Result<Self> {
        if weights.nrows() != NUM_JOINTS {
            return Err(Error::other(format!(
                "joint regressor must have {} rows, got {}",
                NUM_JOINTS,
                weights.nrows()
            )));
        }
        Ok(Self { weights })
    }

    /// Load a regressor from an `.npz` asset.
    ///
    /// Looks up `J_regressor_<gender>` first (combined regressor file),
    /// then a plain `J_regressor` entry (per-model file).
    pub fn load(path: impl AsRef<Path>, gender: Gender) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        let mut npz = NpzReader::new(file).map_err(|e| Error::archive(path, e))?;

        let keyed = format!("J_regressor_{}", gender.as_str());
        let weights = match read_matrix(&mut npz, &keyed) {
            Some(w) => w,
            None => read_matrix(&mut npz, "J_regressor")
                .ok_or_else(|| Error::missing(keyed, path))?,
        };
        Self::new(weights)
    }

    /// Number of mesh vertices this regressor expects.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.weights.ncols()
    }

    /// Regress joint locations from (rest pose) vertices.
    pub fn regress(&self, vertices: &[Vec3]) -> Result<[DVec3; NUM_JOINTS]> {
        if vertices.len() != self.num_vertices() {
            return Err(Error::VertexCountMismatch {
                expected: self.num_vertices(),
                actual: vertices.len(),
            });
        }

        let mut joints = [DVec3::ZERO; NUM_JOINTS];
        for (j, joint) in joints.iter_mut().enumerate() {
            let row = self.weights.row(j);
            for (w, v) in row.iter().zip(vertices) {
                if *w != 0.0 {
                    *joint += v.as_dvec3() * *w;
                }
            }
        }
        Ok(joints)
    }
}

/// Read a 2D float matrix stored as f64 or f32.
pub(crate) fn read_matrix<R>(npz: &mut NpzReader<R>, name: &str) -> Option<Array2<f64>>
where
    R: std::io::Read + std::io::Seek,
{
    if let Ok(m) = npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix2>(name) {
        return Some(m);
    }
    npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix2>(name)
        .ok()
        .map(|m| m.mapv(f64::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regress_weighted_average() {
        // Every joint is the mean of vertices 0 and 1, except joint 3 which picks vertex 2.
        let mut w = Array2::<f64>::zeros((NUM_JOINTS, 3));
        for j in 0..NUM_JOINTS {
            w[[j, 0]] = 0.5;
            w[[j, 1]] = 0.5;
        }
        w[[3, 0]] = 0.0;
        w[[3, 1]] = 0.0;
        w[[3, 2]] = 1.0;

        let reg = JointRegressor::new(w).unwrap();
        let verts = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 4.0, -2.0), Vec3::new(7.0, 8.0, 9.0)];
        let joints = reg.regress(&verts).unwrap();
        assert_eq!(joints[0], DVec3::new(1.0, 2.0, -1.0));
        assert_eq!(joints[3], DVec3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_regress_vertex_count_mismatch() {
        let reg = JointRegressor::new(Array2::zeros((NUM_JOINTS, 5))).unwrap();
        let err = reg.regress(&[Vec3::ZERO; 4]).unwrap_err();
        assert!(matches!(err, Error::VertexCountMismatch { expected: 5, actual: 4 }));
    }

    #[test]
    fn test_rejects_wrong_row_count() {
        assert!(JointRegressor::new(Array2::zeros((23, 5))).is_err());
    }
}
