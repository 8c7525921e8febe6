//! Garment capture processor.

use rand::Rng;

use crate::assets::{AssetLayout, ClothingOption};
use crate::cache::{check_vertex_count, read_cache, CacheKey, VertexCache, VertexCacheStore};
use crate::dataset::{Garment, GarmentCaptureReader, Sample, SequenceRecord, TextureDescriptor};
use crate::host::{ObjectId, SceneHost, TextureSource};
use crate::util::{DVec3, Result};
use super::animate::{Animator, BodyJob, RootTranslation};
use super::{DatasetProcessor, JointRegressors, ProcessorOptions, SampleOutcome, Workspace};

/// Loads the outfit of a sample, then animates the body underneath it.
pub struct GarmentCaptureProcessor {
    animator: Animator,
    reader: GarmentCaptureReader,
}

impl GarmentCaptureProcessor {
    pub fn new(options: ProcessorOptions, regressors: JointRegressors) -> Self {
        Self { animator: Animator::new(options, regressors), reader: GarmentCaptureReader }
    }

    /// Pick a skin texture per sample from the asset texture lists.
    pub fn set_skin_textures(&mut self, assets: AssetLayout, option: ClothingOption) {
        self.animator.set_skin_textures(assets, option);
    }

    /// Import one garment, bind its cache and texture.
    fn load_garment(
        &mut self,
        host: &mut dyn SceneHost,
        sample: &Sample,
        record: &SequenceRecord,
        garment: &Garment,
        store: &VertexCacheStore,
    ) -> Result<ObjectId> {
        let mesh = GarmentCaptureReader::mesh_path(sample, &garment.name);
        let id = host.import_garment(&format!("{}_{}", record.name, garment.name), &mesh)?;
        host.set_actor_orientation(id, record.zrot)?;

        let key = CacheKey::garment(&record.name, &garment.name);
        let cache = match store.lookup(&key)? {
            Some(cache) => cache,
            None => {
                let source = GarmentCaptureReader::vertex_source(sample, &garment.name)?;
                tracing::info!("converting {} to PC2", source.display());
                let mut cache = read_cache(&source)?;
                add_root_translation(&mut cache, &record.trans);
                store.persist(&key, &cache)?;
                cache
            }
        };
        if let Some(expected) = host.vertex_count(id) {
            check_vertex_count(&cache, expected, &garment.name);
        }
        host.bind_vertex_cache(id, &store.path_for(&key))?;

        let texture = match &garment.texture {
            TextureDescriptor::Color(rgb) => TextureSource::Color(*rgb),
            TextureDescriptor::Pattern => {
                let pattern = GarmentCaptureReader::pattern_path(sample, &garment.name);
                if pattern.is_file() {
                    TextureSource::Image(pattern)
                } else {
                    tracing::warn!("pattern {} missing, using a random colour", pattern.display());
                    let rng = &mut self.animator.rng;
                    TextureSource::Color([rng.gen(), rng.gen(), rng.gen()])
                }
            }
        };
        host.apply_texture(id, &texture)?;

        tracing::debug!("loaded garment {}", garment.name);
        Ok(id)
    }
}

/// Offset every frame by its root translation; frames past the end of
/// `trans` reuse the last one.
fn add_root_translation(cache: &mut VertexCache, trans: &[DVec3]) {
    for i in 0..cache.frame_count() {
        let Some(t) = trans.get(i).or(trans.last()) else {
            return;
        };
        let t = t.as_vec3();
        if let Some(frame) = cache.frame_mut(i) {
            frame.iter_mut().for_each(|v| *v += t);
        }
    }
}

impl DatasetProcessor for GarmentCaptureProcessor {
    fn name(&self) -> &'static str {
        "cloth3d"
    }

    fn process_sample(
        &mut self,
        workspace: &mut Workspace<'_>,
        sample: &Sample,
        frame: Option<usize>,
    ) -> Result<SampleOutcome> {
        let record = self.reader.load(sample)?;
        if record.single_frame {
            tracing::warn!("sample {} has a single frame", sample.id);
        }

        let name = self.animator.options.subfolder(sample.stem());
        let store = self.animator.prepare_output(&name)?;

        let mut garments = Vec::with_capacity(record.outfit.len());
        for garment in &record.outfit {
            garments.push(self.load_garment(workspace.host(), sample, &record, garment, &store)?);
        }

        let job = BodyJob {
            record: &record,
            name,
            store: &store,
            extra_objects: garments,
            root: RootTranslation::NetOfRestRoot,
        };
        self.animator.animate_body(workspace, job, frame)?;
        Ok(SampleOutcome::Exported(vec![record.name.clone()]))
    }
}
