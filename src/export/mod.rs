//! Artifact export.
//!
//! Every sample produces, under `<out>/<name>/`:
//!
//! - `<name>.json`: the [`Trajectory`] (bone heads per frame, optional
//!   vertices, source metadata and the frame range),
//! - a static mesh snapshot written by the host,
//! - optionally an animated scene export, also written by the host.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::host::{ExportTarget, FrameRange, SceneHost};
use crate::util::{DVec3, Error, Result, Vec3};

/// Frame-indexed skeleton (and optionally mesh) trajectory of one sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trajectory {
    /// Frame number of every entry.
    pub frame: Vec<usize>,
    /// World-space bone heads, pelvis excluded: `[F][23][3]`.
    pub bones: Vec<Vec<[f32; 3]>>,
    /// World-space vertices: `[F][V][3]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verts: Option<Vec<Vec<[f32; 3]>>>,
    /// Source metadata of the sample.
    pub info: serde_json::Value,
    /// First frame.
    pub sf: usize,
    /// One past the last frame.
    pub ef: usize,
    /// Frame step between consecutive entries.
    pub nframes: usize,
    /// Actor rotation about Z.
    pub zrot: f64,
}

impl Trajectory {
    pub fn new(range: FrameRange, info: serde_json::Value, zrot: f64, with_verts: bool) -> Self {
        Self {
            frame: Vec::with_capacity(range.len()),
            bones: Vec::with_capacity(range.len()),
            verts: with_verts.then(Vec::new),
            info,
            sf: range.start,
            ef: range.end + 1,
            nframes: 1,
            zrot,
        }
    }

    /// Append one frame. Vertices are ignored unless the trajectory was
    /// created with vertex recording enabled.
    pub fn push(&mut self, frame: usize, bones: &[DVec3], verts: Option<&[Vec3]>) {
        self.frame.push(frame);
        self.bones.push(bones.iter().map(|b| b.as_vec3().to_array()).collect());
        if let (Some(all), Some(v)) = (self.verts.as_mut(), verts) {
            all.push(v.iter().map(|p| p.to_array()).collect());
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// `[frames, bones, 3]`
    pub fn bones_shape(&self) -> [usize; 3] {
        [self.bones.len(), self.bones.first().map_or(0, Vec::len), 3]
    }

    /// Read a trajectory written by [`JsonExporter`].
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| Error::FileNotFound(path.to_path_buf()))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Paths written by one export.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportArtifacts {
    pub trajectory: PathBuf,
    pub snapshot: PathBuf,
    pub scene: Option<PathBuf>,
}

/// Serializes a processed sample.
pub trait Exporter {
    fn export(
        &mut self,
        host: &mut dyn SceneHost,
        target: &ExportTarget,
        trajectory: &Trajectory,
    ) -> Result<ExportArtifacts>;
}

/// Writes the trajectory as JSON and asks the host for the mesh artifacts.
#[derive(Clone, Debug, Default)]
pub struct JsonExporter {
    /// Also request an animated scene export.
    pub scene_export: bool,
}

impl JsonExporter {
    pub fn new(scene_export: bool) -> Self {
        Self { scene_export }
    }
}

impl Exporter for JsonExporter {
    fn export(
        &mut self,
        host: &mut dyn SceneHost,
        target: &ExportTarget,
        trajectory: &Trajectory,
    ) -> Result<ExportArtifacts> {
        let folder = target.folder();
        fs::create_dir_all(&folder)?;

        let scene = if self.scene_export {
            let scene = host.export_scene(target)?;
            if scene.is_none() {
                tracing::warn!("host has no scene export, skipping");
            }
            scene
        } else {
            None
        };

        let snapshot = host.export_mesh_snapshot(target)?;

        let path = folder.join(format!("{}.json", target.name));
        let mut w = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut w, trajectory)
            .map_err(|e| Error::Export(format!("{}: {}", path.display(), e)))?;
        w.flush()?;

        tracing::info!(
            frames = trajectory.len(),
            verts = trajectory.verts.is_some(),
            "exported {}",
            path.display()
        );
        Ok(ExportArtifacts { trajectory: path, snapshot, scene })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::body_model::tests::toy_model;
    use crate::host::HeadlessHost;
    use crate::pose::Gender;
    use serde_json::json;

    #[test]
    fn test_trajectory_frames() {
        let mut t = Trajectory::new(FrameRange::from_count(2), json!({"gender": "male"}), 0.5, false);
        let bones = vec![DVec3::ONE; 23];
        t.push(0, &bones, Some(&[Vec3::ZERO]));
        t.push(1, &bones, None);

        assert_eq!(t.len(), 2);
        assert_eq!(t.bones_shape(), [2, 23, 3]);
        assert!(t.verts.is_none());
        assert_eq!((t.sf, t.ef), (0, 2));
    }

    #[test]
    fn test_single_frame_range() {
        let t = Trajectory::new(FrameRange::from_count(1), json!({}), 0.0, true);
        assert_eq!((t.sf, t.ef), (0, 1));
        assert_eq!(t.bones_shape(), [0, 0, 3]);
        assert!(t.is_empty());
    }

    #[test]
    fn test_json_export_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = HeadlessHost::new(toy_model(Gender::Male), toy_model(Gender::Female));
        let actors = host.load_body_actors().unwrap();

        let mut t = Trajectory::new(FrameRange::from_count(1), json!({"name": "00007"}), 0.0, true);
        t.push(0, &[DVec3::X; 23], Some(&[Vec3::Y; 24]));

        let target = ExportTarget {
            dir: dir.path().to_path_buf(),
            name: "00007_with_cache".into(),
            objects: vec![actors.male],
            zrot: 0.0,
            frame: None,
        };
        let out = JsonExporter::new(false).export(&mut host, &target, &t).unwrap();
        assert!(out.trajectory.ends_with("00007_with_cache/00007_with_cache.json"));
        assert!(out.snapshot.exists());
        assert!(out.scene.is_none());

        let back = Trajectory::load(&out.trajectory).unwrap();
        assert_eq!(back.bones_shape(), [1, 23, 3]);
        assert_eq!(back.verts.unwrap()[0].len(), 24);
        assert_eq!(back.info["name"], "00007");
    }
}
