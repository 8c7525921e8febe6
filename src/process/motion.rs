//! Motion sequence processor.

use std::fs;
use std::path::Path;

use crate::assets::{AssetLayout, ClothingOption};
use crate::dataset::{MotionConfig, MotionSequenceReader, Sample, SubDatasetRegistry};
use crate::util::{Error, Result};
use super::animate::{Animator, BodyJob, RootTranslation};
use super::{DatasetProcessor, JointRegressors, ProcessorOptions, SampleOutcome, Workspace};

/// Animates every `.npz` sequence of a subject directory.
///
/// A sample is a subject id; each sequence file inside it is exported
/// under its own stem.
pub struct MotionSequenceProcessor {
    animator: Animator,
    config: MotionConfig,
    registry: SubDatasetRegistry,
    reader: MotionSequenceReader,
}

impl MotionSequenceProcessor {
    pub fn new(
        options: ProcessorOptions,
        config: MotionConfig,
        registry: SubDatasetRegistry,
        regressors: JointRegressors,
    ) -> Self {
        Self {
            animator: Animator::new(options, regressors),
            reader: MotionSequenceReader::new(&config),
            config,
            registry,
        }
    }

    /// Pick a skin texture per sequence from the asset texture lists.
    pub fn set_skin_textures(&mut self, assets: AssetLayout, option: ClothingOption) {
        self.animator.set_skin_textures(assets, option);
    }

    /// Sequence files of a subject directory, sorted.
    fn sequences(dir: &Path) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map_err(|_| Error::FileNotFound(dir.to_path_buf()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "npz"))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl DatasetProcessor for MotionSequenceProcessor {
    fn name(&self) -> &'static str {
        "amass"
    }

    fn process_sample(
        &mut self,
        workspace: &mut Workspace<'_>,
        sample: &Sample,
        frame: Option<usize>,
    ) -> Result<SampleOutcome> {
        if !self.config.includes_subject(&sample.id) {
            tracing::info!("subject {} not selected, skipping", sample.id);
            return Ok(SampleOutcome::Skipped);
        }

        let sequences = Self::sequences(&sample.path)?;
        if sequences.is_empty() {
            tracing::warn!("no sequences in {}", sample.path.display());
            return Ok(SampleOutcome::Skipped);
        }

        let mut exported = Vec::with_capacity(sequences.len());
        for file in &sequences {
            let path = self.registry.sequence_path(
                &self.config.sub_dataset_id,
                Some(&sample.id),
                file,
                &mut self.animator.rng,
            )?;
            let stem = Path::new(file)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            let record = self.reader.load(&path, &stem)?;

            let name = self.animator.options.subfolder(&stem);
            let store = self.animator.prepare_output(&name)?;
            let job = BodyJob {
                record: &record,
                name,
                store: &store,
                extra_objects: Vec::new(),
                root: RootTranslation::Absolute,
            };
            self.animator.animate_body(workspace, job, frame)?;

            // Next sequence starts from a clean body
            let actors = workspace.actors();
            workspace.host().clear_transient(&actors)?;
            exported.push(stem);
        }
        Ok(SampleOutcome::Exported(exported))
    }
}
