//! In-process scene host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assets::AssetLayout;
use crate::cache::{read_cache, write_cache, VertexCache};
use crate::pose::{Gender, NUM_DMPL_COEFFS, NUM_JOINTS, NUM_POSE_BLENDSHAPES, NUM_SHAPE_COEFFS};
use crate::util::{z_rotation_matrix, DMat3, DVec3, Error, Result, Vec3};
use super::stl::{parse_obj, write_obj, write_stl, MeshRef};
use super::{
    BlendshapeSlot, BodyActors, BodyModel, BodyPose, ExportTarget, FrameRange, ObjectId, SceneHost,
    TextureSource,
};

#[derive(Debug)]
struct BodyRig {
    gender: Gender,
    /// Keyed poses by frame; frames between keys hold the previous key.
    keys: BTreeMap<usize, BodyPose>,
    rest_joints: Option<[DVec3; NUM_JOINTS]>,
}

impl BodyRig {
    fn new(gender: Gender) -> Self {
        Self { gender, keys: BTreeMap::new(), rest_joints: None }
    }

    fn pose_at(&self, frame: usize) -> BodyPose {
        self.keys
            .range(..=frame)
            .next_back()
            .or_else(|| self.keys.iter().next())
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
enum ObjectKind {
    Body(BodyRig),
    Garment { vertex_count: usize, faces: Vec<[u32; 3]> },
}

#[derive(Debug)]
struct SceneObject {
    name: String,
    kind: ObjectKind,
    zrot: f64,
    cache: Option<VertexCache>,
    texture: Option<TextureSource>,
}

impl SceneObject {
    fn reset(&mut self) {
        self.zrot = 0.0;
        self.cache = None;
        self.texture = None;
        if let ObjectKind::Body(rig) = &mut self.kind {
            *rig = BodyRig::new(rig.gender);
        }
    }
}

/// Frame step of the STL snapshot sweep.
pub const SNAPSHOT_STEP: usize = 5;

/// Scene host backed by [`BodyModel`] skinning.
///
/// Bodies deform with linear blend skinning unless a vertex cache is bound;
/// garments are driven by their caches only. Snapshots are written as
/// binary STL, scene exports as an OBJ plus a PC2 cache per body.
pub struct HeadlessHost {
    male: BodyModel,
    female: BodyModel,
    objects: BTreeMap<ObjectId, SceneObject>,
    next_id: u32,
    frame: usize,
    range: FrameRange,
    deformations: usize,
}

impl HeadlessHost {
    pub fn new(male: BodyModel, female: BodyModel) -> Self {
        Self {
            male,
            female,
            objects: BTreeMap::new(),
            next_id: 1,
            frame: 0,
            range: FrameRange::from_count(1),
            deformations: 0,
        }
    }

    /// Load both body models from the asset layout, with their DMPL
    /// soft-tissue bases when present.
    pub fn from_assets(layout: &AssetLayout) -> Result<Self> {
        let load = |gender: Gender| -> Result<BodyModel> {
            let path = layout.body_model(gender);
            layout.require(&path)?;
            let model = BodyModel::load(path, gender)?;
            let dmpls = layout.dmpl_model(gender);
            if !dmpls.is_file() {
                tracing::debug!("no DMPL basis at {}", dmpls.display());
                return Ok(model);
            }
            model.with_dmpls(BodyModel::load_dmpls(&dmpls)?)
        };
        Ok(Self::new(load(Gender::Male)?, load(Gender::Female)?))
    }

    /// Number of skinning evaluations performed so far.
    #[inline]
    pub fn deformation_count(&self) -> usize {
        self.deformations
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn frame_range(&self) -> FrameRange {
        self.range
    }

    /// Ids of every live object.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    pub fn object_name(&self, id: ObjectId) -> Option<&str> {
        self.objects.get(&id).map(|o| o.name.as_str())
    }

    pub fn texture(&self, id: ObjectId) -> Option<&TextureSource> {
        self.objects.get(&id).and_then(|o| o.texture.as_ref())
    }

    pub fn orientation(&self, id: ObjectId) -> Option<f64> {
        self.objects.get(&id).map(|o| o.zrot)
    }

    pub fn has_cache(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(|o| o.cache.is_some())
    }

    fn model(&self, gender: Gender) -> &BodyModel {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }

    fn insert(&mut self, name: String, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, SceneObject { name, kind, zrot: 0.0, cache: None, texture: None });
        id
    }

    fn object(&self, id: ObjectId) -> Result<&SceneObject> {
        self.objects.get(&id).ok_or_else(|| Error::host(format!("no object {}", id)))
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject> {
        self.objects.get_mut(&id).ok_or_else(|| Error::host(format!("no object {}", id)))
    }

    fn rig_mut(&mut self, id: ObjectId) -> Result<&mut BodyRig> {
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Body(rig) => Ok(rig),
            ObjectKind::Garment { .. } => Err(Error::host(format!("object {} is not a body actor", id))),
        }
    }

    /// Pose keyed at the current frame, created from the held pose if absent.
    fn key_mut(&mut self, id: ObjectId) -> Result<&mut BodyPose> {
        let frame = self.frame;
        let rig = self.rig_mut(id)?;
        if !rig.keys.contains_key(&frame) {
            let held = rig.pose_at(frame);
            rig.keys.insert(frame, held);
        }
        rig.keys
            .get_mut(&frame)
            .ok_or_else(|| Error::host(format!("no key at frame {}", frame)))
    }

    /// Object-space vertices at `frame`.
    fn vertices_at(&mut self, id: ObjectId, frame: usize) -> Result<Vec<Vec3>> {
        let obj = self.object(id)?;
        if let Some(cache) = &obj.cache {
            let last = cache.frame_count().checked_sub(1).ok_or_else(|| {
                Error::host(format!("vertex cache bound to {} is empty", obj.name))
            })?;
            return cache
                .frame(frame.min(last))
                .map(<[Vec3]>::to_vec)
                .ok_or_else(|| Error::host(format!("no cached frame {}", frame)));
        }
        let rig = match &obj.kind {
            ObjectKind::Body(rig) => rig,
            ObjectKind::Garment { .. } => {
                return Err(Error::host(format!("garment {} has no vertex cache bound", obj.name)));
            }
        };
        let mesh = self.model(rig.gender).evaluate(&rig.pose_at(frame), rig.rest_joints.as_ref())?;
        self.deformations += 1;
        Ok(mesh.vertices)
    }

    fn world(&self, id: ObjectId, verts: Vec<Vec3>) -> Result<Vec<Vec3>> {
        let rot = z_rotation_matrix(self.object(id)?.zrot);
        Ok(verts.into_iter().map(|v| (rot * v.as_dvec3()).as_vec3()).collect())
    }

    /// World-space meshes among `objects` at `frame`. Garments without a
    /// bound cache have nothing to show and are skipped.
    fn world_meshes(&mut self, objects: &[ObjectId], frame: usize) -> Result<Vec<(ObjectId, Vec<Vec3>)>> {
        let mut out = Vec::new();
        for &id in objects {
            let obj = self.object(id)?;
            if matches!(obj.kind, ObjectKind::Garment { .. }) && obj.cache.is_none() {
                tracing::debug!("skipping {} without a vertex cache", obj.name);
                continue;
            }
            let verts = self.vertices_at(id, frame)?;
            out.push((id, self.world(id, verts)?));
        }
        Ok(out)
    }

    fn faces_of(&self, id: ObjectId) -> &[[u32; 3]] {
        match self.objects.get(&id).map(|o| &o.kind) {
            Some(ObjectKind::Body(rig)) => self.model(rig.gender).faces(),
            Some(ObjectKind::Garment { faces, .. }) => faces.as_slice(),
            None => &[],
        }
    }
}

impl SceneHost for HeadlessHost {
    fn reset_environment(&mut self) -> Result<()> {
        tracing::debug!(objects = self.objects.len(), "resetting environment");
        self.objects.clear();
        self.frame = 0;
        self.range = FrameRange::from_count(1);
        Ok(())
    }

    fn load_body_actors(&mut self) -> Result<BodyActors> {
        self.objects.retain(|_, o| !matches!(o.kind, ObjectKind::Body(_)));
        let male = self.insert("body_0".into(), ObjectKind::Body(BodyRig::new(Gender::Male)));
        let female = self.insert("body_1".into(), ObjectKind::Body(BodyRig::new(Gender::Female)));
        Ok(BodyActors { male, female })
    }

    fn clear_transient(&mut self, keep: &BodyActors) -> Result<()> {
        self.objects.retain(|id, _| keep.contains(*id));
        for obj in self.objects.values_mut() {
            obj.reset();
        }
        self.frame = 0;
        Ok(())
    }

    fn import_garment(&mut self, name: &str, mesh: &Path) -> Result<ObjectId> {
        let text = fs::read_to_string(mesh).map_err(|_| Error::FileNotFound(mesh.to_path_buf()))?;
        let topo = parse_obj(&text);
        tracing::debug!(vertices = topo.vertex_count, faces = topo.faces.len(), "imported garment {}", name);
        Ok(self.insert(name.to_string(), ObjectKind::Garment { vertex_count: topo.vertex_count, faces: topo.faces }))
    }

    fn bind_vertex_cache(&mut self, object: ObjectId, cache: &Path) -> Result<()> {
        let data = read_cache(cache)?;
        self.object_mut(object)?.cache = Some(data);
        Ok(())
    }

    fn apply_texture(&mut self, object: ObjectId, texture: &TextureSource) -> Result<()> {
        self.object_mut(object)?.texture = Some(texture.clone());
        Ok(())
    }

    fn set_actor_orientation(&mut self, object: ObjectId, zrot: f64) -> Result<()> {
        self.object_mut(object)?.zrot = zrot;
        Ok(())
    }

    fn set_frame_range(&mut self, range: FrameRange) -> Result<()> {
        self.range = range;
        Ok(())
    }

    fn set_frame(&mut self, frame: usize) -> Result<()> {
        self.frame = frame;
        Ok(())
    }

    fn set_bone_rotation(&mut self, actor: ObjectId, joint: usize, rotation: DMat3) -> Result<()> {
        if joint >= NUM_JOINTS {
            return Err(Error::host(format!("joint {} out of range", joint)));
        }
        self.key_mut(actor)?.rotations[joint] = rotation;
        Ok(())
    }

    fn set_bone_location(&mut self, actor: ObjectId, joint: usize, location: DVec3) -> Result<()> {
        if joint != 0 {
            return Err(Error::host("only the pelvis bone can be translated"));
        }
        self.key_mut(actor)?.root_location = location;
        Ok(())
    }

    fn set_blendshape_weight(&mut self, actor: ObjectId, slot: BlendshapeSlot, weight: f64) -> Result<()> {
        let key = self.key_mut(actor)?;
        match slot {
            BlendshapeSlot::Pose(i) if i < NUM_POSE_BLENDSHAPES => key.pose_weights[i] = weight,
            BlendshapeSlot::Shape(i) if i < NUM_SHAPE_COEFFS => key.shape_weights[i] = weight,
            BlendshapeSlot::Dmpl(i) if i < NUM_DMPL_COEFFS => key.dmpl_weights[i] = weight,
            _ => return Err(Error::host(format!("no blendshape {}", slot))),
        }
        Ok(())
    }

    fn set_rest_joints(&mut self, actor: ObjectId, joints: &[DVec3; NUM_JOINTS]) -> Result<()> {
        self.rig_mut(actor)?.rest_joints = Some(*joints);
        Ok(())
    }

    fn evaluate_vertices(&mut self, object: ObjectId) -> Result<Vec<Vec3>> {
        self.vertices_at(object, self.frame)
    }

    fn vertex_count(&self, object: ObjectId) -> Option<usize> {
        match &self.objects.get(&object)?.kind {
            ObjectKind::Body(rig) => Some(self.model(rig.gender).num_vertices()),
            ObjectKind::Garment { vertex_count, .. } => Some(*vertex_count),
        }
    }

    fn bone_heads(&mut self, actor: ObjectId) -> Result<Vec<DVec3>> {
        let obj = self.object(actor)?;
        let rig = match &obj.kind {
            ObjectKind::Body(rig) => rig,
            ObjectKind::Garment { .. } => return Err(Error::host(format!("object {} has no skeleton", actor))),
        };
        let joints = self
            .model(rig.gender)
            .posed_joints(&rig.pose_at(self.frame), rig.rest_joints.as_ref())?;
        let rot = z_rotation_matrix(obj.zrot);
        Ok(joints.iter().map(|j| rot * *j).collect())
    }

    fn export_mesh_snapshot(&mut self, target: &ExportTarget) -> Result<PathBuf> {
        let folder = target.folder();
        fs::create_dir_all(&folder)?;
        let path = folder.join(format!("{}.stl", target.name));

        // One target frame, or a sweep over the timeline
        let frames: Vec<usize> = match target.frame {
            Some(f) => vec![f],
            None => (self.range.start..=self.range.end).step_by(SNAPSHOT_STEP).collect(),
        };
        let mut meshes = Vec::new();
        for &f in &frames {
            meshes.extend(self.world_meshes(&target.objects, f)?);
        }
        let refs: Vec<MeshRef<'_>> = meshes
            .iter()
            .map(|(id, positions)| MeshRef { positions, faces: self.faces_of(*id) })
            .collect();
        write_stl(&path, &refs)?;

        tracing::info!(meshes = refs.len(), frames = frames.len(), "wrote snapshot {}", path.display());
        Ok(path)
    }

    fn export_scene(&mut self, target: &ExportTarget) -> Result<Option<PathBuf>> {
        let folder = target.folder();
        fs::create_dir_all(&folder)?;

        let frames: Vec<usize> = match target.frame {
            Some(f) => vec![f],
            None => (self.range.start..=self.range.end).collect(),
        };
        let mut first = None;
        for &id in &target.objects {
            if !matches!(self.object(id)?.kind, ObjectKind::Body(_)) {
                continue;
            }
            let object_name = self.object(id)?.name.clone();
            // Sized from what the object evaluates to, which follows a bound cache
            let mut cache: Option<VertexCache> = None;
            for &f in &frames {
                let local = self.vertices_at(id, f)?;
                let verts = self.world(id, local)?;
                cache.get_or_insert_with(|| VertexCache::new(verts.len())).push_frame(&verts)?;
            }
            let cache = cache.unwrap_or_else(|| VertexCache::new(0));

            let stem = format!("{}_{}", target.name, object_name);
            let obj_path = folder.join(format!("{}.obj", stem));
            let rest = cache.frame(0).unwrap_or(&[]);
            write_obj(&obj_path, &object_name, &MeshRef { positions: rest, faces: self.faces_of(id) })?;
            write_cache(folder.join(format!("{}.pc2", stem)), &cache)?;
            first.get_or_insert(obj_path);
        }

        if let Some(path) = &first {
            tracing::info!(frames = frames.len(), "wrote scene export {}", path.display());
        }
        Ok(first)
    }
}
