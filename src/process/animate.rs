//! Body animation loop shared by both processors.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;

use crate::assets::{AssetLayout, ClothingOption};
use crate::cache::{check_vertex_count, CacheKey, VertexCache, VertexCacheStore};
use crate::dataset::SequenceRecord;
use crate::export::{Exporter, JsonExporter, Trajectory};
use crate::host::{ExportTarget, FrameRange, ObjectId, SceneHost, TextureSource};
use crate::pose::{Gender, JointRegressor, RotationFrame, NUM_JOINTS};
use crate::util::{z_rotation_matrix, DVec3, Error, Result, Vec3};
use super::{ProcessorOptions, Workspace};

/// Per-gender rest-pose joint regressors.
#[derive(Clone, Debug)]
pub struct JointRegressors {
    pub male: JointRegressor,
    pub female: JointRegressor,
}

impl JointRegressors {
    pub fn new(male: JointRegressor, female: JointRegressor) -> Self {
        Self { male, female }
    }

    /// Load both regressors from one `.npz` asset.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            male: JointRegressor::load(path, Gender::Male)?,
            female: JointRegressor::load(path, Gender::Female)?,
        })
    }

    #[inline]
    pub fn for_gender(&self, gender: Gender) -> &JointRegressor {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }
}

/// How the root translation of a frame is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RootTranslation {
    /// `trans[i]` as recorded
    Absolute,
    /// `trans[i]` minus the rest-pose root joint
    NetOfRestRoot,
}

/// One body animation request.
pub(crate) struct BodyJob<'a> {
    pub record: &'a SequenceRecord,
    /// Output folder name (`<stem>` or `<stem>_with_cache`).
    pub name: String,
    pub store: &'a VertexCacheStore,
    /// Transient objects exported together with the body.
    pub extra_objects: Vec<ObjectId>,
    pub root: RootTranslation,
}

/// State shared by both processors.
pub(crate) struct Animator {
    pub options: ProcessorOptions,
    pub rng: StdRng,
    regressors: JointRegressors,
    skin: Option<(AssetLayout, ClothingOption)>,
    exporter: JsonExporter,
}

impl Animator {
    pub fn new(options: ProcessorOptions, regressors: JointRegressors) -> Self {
        Self {
            rng: options.rng(),
            exporter: JsonExporter::new(options.scene_export),
            options,
            regressors,
            skin: None,
        }
    }

    pub fn set_skin_textures(&mut self, assets: AssetLayout, option: ClothingOption) {
        self.skin = Some((assets, option));
    }

    /// Create `<out>/<name>/view_cache/` and return the cache store on it.
    pub fn prepare_output(&self, name: &str) -> Result<VertexCacheStore> {
        let cache_dir = self.options.output_dir.join(name).join("view_cache");
        fs::create_dir_all(&cache_dir)?;
        Ok(VertexCacheStore::new(cache_dir))
    }

    fn dress_body(&mut self, host: &mut dyn SceneHost, actor: ObjectId, gender: Gender) -> Result<()> {
        let Some((assets, option)) = &self.skin else {
            return Ok(());
        };
        match assets.pick_skin_texture(gender, *option, &mut self.rng) {
            Ok(path) => host.apply_texture(actor, &TextureSource::Image(path)),
            Err(Error::FileNotFound(list)) => {
                tracing::warn!("no skin texture list at {}, body left untextured", list.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Regress rest joints from the shaped body and re-anchor the skeleton.
    fn anchor_skeleton(
        &self,
        host: &mut dyn SceneHost,
        actor: ObjectId,
        gender: Gender,
        shape: &[f64],
    ) -> Result<[DVec3; NUM_JOINTS]> {
        let rest = RotationFrame::identity();
        host.set_frame(0)?;
        host.set_bone_location(actor, 0, DVec3::ZERO)?;
        host.apply_rotations(actor, &rest)?;
        host.apply_blendshapes(actor, &rest, shape)?;

        let verts = host.evaluate_vertices(actor)?;
        let joints = self.regressors.for_gender(gender).regress(&verts)?;
        host.set_rest_joints(actor, &joints)?;
        Ok(joints)
    }

    /// Animate the body of `job.record`, persist its cache and export.
    ///
    /// Returns the trajectory file.
    pub fn animate_body(
        &mut self,
        ws: &mut Workspace<'_>,
        job: BodyJob<'_>,
        frame: Option<usize>,
    ) -> Result<PathBuf> {
        let record = job.record;
        let actor = ws.actors().for_gender(record.gender);
        let host = ws.host();

        let frames = record.frame_count();
        let range = FrameRange::from_count(frames);
        host.set_frame_range(range)?;
        host.set_actor_orientation(actor, record.zrot)?;
        self.dress_body(host, actor, record.gender)?;

        let shape = record.body_shape();
        let rest = self.anchor_skeleton(host, actor, record.gender, shape)?;

        let key = CacheKey::body(&record.name);
        let cached = if self.options.with_cache {
            match job.store.lookup(&key)? {
                Some(cache) => {
                    let expected = host.vertex_count(actor).unwrap_or(cache.vertex_count());
                    check_vertex_count(&cache, expected, "body");
                    host.bind_vertex_cache(actor, &job.store.path_for(&key))?;
                    true
                }
                None => false,
            }
        } else {
            false
        };
        let record_cache = self.options.with_cache && !cached;
        let write_verts = self.options.write_verts;

        tracing::info!(frames, cached, "animating {} body for {}", record.gender, record.name);

        let world = z_rotation_matrix(record.zrot);
        let mut pending: Vec<Vec<Vec3>> = Vec::new();
        let mut trajectory = Trajectory::new(range, record.info.clone(), record.zrot, write_verts);

        for (i, (pose, trans)) in record.poses.iter().zip(&record.trans).enumerate() {
            host.set_frame(i)?;
            let rotations = RotationFrame::from_pose(pose);
            let root = match job.root {
                RootTranslation::Absolute => *trans,
                RootTranslation::NetOfRestRoot => *trans - rest[0],
            };
            host.set_bone_location(actor, 0, root)?;
            host.apply_rotations(actor, &rotations)?;
            if !cached {
                host.apply_blendshapes(actor, &rotations, shape)?;
                if let Some(coeffs) = record.dmpls.as_ref().and_then(|d| d.get(i)) {
                    host.apply_dmpls(actor, coeffs)?;
                }
            }

            let verts = if record_cache || write_verts {
                Some(host.evaluate_vertices(actor)?)
            } else {
                None
            };
            let world_verts = match (&verts, write_verts) {
                (Some(v), true) => Some(v.iter().map(|p| (world * p.as_dvec3()).as_vec3()).collect::<Vec<_>>()),
                _ => None,
            };

            let heads = host.bone_heads(actor)?;
            trajectory.push(i, heads.get(1..).unwrap_or(&[]), world_verts.as_deref());

            if record_cache {
                if let Some(v) = verts {
                    pending.push(v);
                }
            }
        }

        if record_cache {
            let cache = VertexCache::from_frames(&pending)?;
            job.store.persist(&key, &cache)?;
            host.bind_vertex_cache(actor, &job.store.path_for(&key))?;
        }

        let export_frame = match frame {
            Some(f) if range.contains(f) => {
                host.set_frame(f)?;
                Some(f)
            }
            Some(f) => {
                tracing::warn!("frame {} outside 0..={}, exporting the whole sequence", f, range.end);
                host.set_frame(range.start)?;
                None
            }
            None => {
                host.set_frame(range.start)?;
                None
            }
        };

        let mut objects = job.extra_objects;
        objects.push(actor);
        let target = ExportTarget {
            dir: self.options.output_dir.clone(),
            name: job.name,
            objects,
            zrot: record.zrot,
            frame: export_frame,
        };
        let artifacts = self.exporter.export(host, &target, &trajectory)?;
        Ok(artifacts.trajectory)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::record::tests::record;
    use crate::host::body_model::tests::toy_model;
    use crate::host::HeadlessHost;
    use crate::pose::PoseVector;
    use ndarray::Array2;

    pub(crate) fn toy_regressors() -> JointRegressors {
        let r = JointRegressor::new(Array2::eye(NUM_JOINTS)).unwrap();
        JointRegressors::new(r.clone(), r)
    }

    fn setup(with_cache: bool) -> (tempfile::TempDir, HeadlessHost, Animator) {
        setup_with(with_cache, false)
    }

    fn setup_with(with_cache: bool, scene_export: bool) -> (tempfile::TempDir, HeadlessHost, Animator) {
        let dir = tempfile::tempdir().unwrap();
        let host = HeadlessHost::new(toy_model(Gender::Male), toy_model(Gender::Female));
        let mut options = ProcessorOptions::new(dir.path().join("out"), dir.path().join("samples"));
        options.with_cache = with_cache;
        options.scene_export = scene_export;
        options.seed = Some(7);
        (dir, host, Animator::new(options, toy_regressors()))
    }

    #[test]
    fn test_cache_written_once_then_bound() {
        let (_dir, mut host, mut animator) = setup(true);
        let actors = host.load_body_actors().unwrap();
        let rec = record(4);
        let store = animator.prepare_output("s_with_cache").unwrap();

        for _ in 0..2 {
            let mut ws = Workspace::acquire(&mut host, actors);
            let job = BodyJob {
                record: &rec,
                name: "s_with_cache".into(),
                store: &store,
                extra_objects: Vec::new(),
                root: RootTranslation::Absolute,
            };
            animator.animate_body(&mut ws, job, None).unwrap();
        }

        let cache = crate::cache::read_cache(store.path_for(&CacheKey::body(&rec.name))).unwrap();
        assert_eq!(cache.frame_count(), 4);
        // Rest regression twice, per-frame deformation only on the first run
        assert_eq!(host.deformation_count(), 2 + 4);
    }

    #[test]
    fn test_target_frame_out_of_range_is_ignored() {
        let (_dir, mut host, mut animator) = setup(false);
        let actors = host.load_body_actors().unwrap();
        let rec = record(3);
        let store = animator.prepare_output("s").unwrap();

        let mut ws = Workspace::acquire(&mut host, actors);
        let job = BodyJob {
            record: &rec,
            name: "s".into(),
            store: &store,
            extra_objects: Vec::new(),
            root: RootTranslation::Absolute,
        };
        let path = animator.animate_body(&mut ws, job, Some(99)).unwrap();
        drop(ws);

        let t = Trajectory::load(&path).unwrap();
        assert_eq!(t.frame, vec![0, 1, 2]);
        assert!(!store.contains(&CacheKey::body(&rec.name)));
    }

    #[test]
    fn test_root_net_of_rest_joint() {
        let (_dir, mut host, mut animator) = setup(false);
        let actors = host.load_body_actors().unwrap();
        let mut rec = record(1);
        rec.poses = vec![PoseVector::ZERO];
        rec.trans = vec![DVec3::new(0.0, 1.0, 0.0)];
        // Lifts the toy rest skeleton by 0.5 in Z
        rec.shape = vec![0.5];
        let store = animator.prepare_output("s").unwrap();

        let mut ws = Workspace::acquire(&mut host, actors);
        let job = BodyJob {
            record: &rec,
            name: "s".into(),
            store: &store,
            extra_objects: Vec::new(),
            root: RootTranslation::NetOfRestRoot,
        };
        let path = animator.animate_body(&mut ws, job, None).unwrap();
        drop(ws);

        // The pelvis lands on trans, so the left hip (first exported bone)
        // sits 0.1 above it with the rest Z offset removed
        let t = Trajectory::load(&path).unwrap();
        let hip = t.bones[0][0];
        assert!((hip[1] - 1.1).abs() < 1e-5, "{:?}", hip);
        assert!(hip[2].abs() < 1e-5, "{:?}", hip);
    }

    #[test]
    fn test_mismatched_body_cache_still_exports() {
        let (dir, mut host, mut animator) = setup_with(true, true);
        let actors = host.load_body_actors().unwrap();
        let rec = record(4);
        let store = animator.prepare_output("s_with_cache").unwrap();
        // Left behind by a different body model: 2 vertices instead of 24
        let stale = VertexCache::from_frames(&vec![vec![Vec3::ZERO, Vec3::Y]; 4]).unwrap();
        store.persist(&CacheKey::body(&rec.name), &stale).unwrap();

        let mut ws = Workspace::acquire(&mut host, actors);
        let job = BodyJob {
            record: &rec,
            name: "s_with_cache".into(),
            store: &store,
            extra_objects: Vec::new(),
            root: RootTranslation::Absolute,
        };
        let path = animator.animate_body(&mut ws, job, None).unwrap();
        drop(ws);

        assert_eq!(Trajectory::load(&path).unwrap().len(), 4);
        let folder = dir.path().join("out/s_with_cache");
        assert!(folder.join("s_with_cache.stl").is_file());
        let scene = crate::cache::read_cache(folder.join("s_with_cache_body_0.pc2")).unwrap();
        assert_eq!(scene.vertex_count(), 2);
    }

    #[test]
    fn test_dmpls_keyed_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut dirs = ndarray::Array3::zeros((NUM_JOINTS, 3, crate::pose::NUM_DMPL_COEFFS));
        for v in 0..NUM_JOINTS {
            dirs[[v, 0, 0]] = 1.0;
        }
        let male = toy_model(Gender::Male).with_dmpls(dirs).unwrap();
        let mut host = HeadlessHost::new(male, toy_model(Gender::Female));
        let mut options = ProcessorOptions::new(dir.path().join("out"), dir.path().join("samples"));
        options.with_cache = true;
        let mut animator = Animator::new(options, toy_regressors());

        let actors = host.load_body_actors().unwrap();
        let mut rec = record(2);
        rec.dmpls = Some(vec![vec![0.0; 8], vec![0.5]]);
        let store = animator.prepare_output("s_with_cache").unwrap();

        let mut ws = Workspace::acquire(&mut host, actors);
        let job = BodyJob {
            record: &rec,
            name: "s_with_cache".into(),
            store: &store,
            extra_objects: Vec::new(),
            root: RootTranslation::Absolute,
        };
        animator.animate_body(&mut ws, job, None).unwrap();
        drop(ws);

        let cache = crate::cache::read_cache(store.path_for(&CacheKey::body(&rec.name))).unwrap();
        let x = |f: usize| cache.frame(f).unwrap()[3].x;
        assert!(x(0).abs() < 1e-6, "{}", x(0));
        assert!((x(1) - 0.5).abs() < 1e-6, "{}", x(1));
    }
}
