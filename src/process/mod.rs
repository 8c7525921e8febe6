//! Dataset processors.
//!
//! A processor turns one [`Sample`] into an animated body (plus garments)
//! inside a [`Workspace`] and hands the result to the exporter. The two
//! supported datasets are a closed set, see [`DatasetKind`].

mod animate;
mod garment;
mod motion;
mod workspace;

pub use animate::JointRegressors;
pub use garment::GarmentCaptureProcessor;
pub use motion::MotionSequenceProcessor;
pub use workspace::Workspace;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::assets::{AssetLayout, ClothingOption};
use crate::dataset::{MotionConfig, Sample, SubDatasetRegistry};
use crate::util::{Error, Result};

// ============================================================================
// Options and outcome
// ============================================================================

/// Settings shared by both processors.
#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    /// Experiment output root.
    pub output_dir: PathBuf,
    /// Directory holding one entry per sample.
    pub samples_dir: PathBuf,
    /// Reuse and write body vertex caches instead of keying blendshapes.
    pub with_cache: bool,
    /// Store per-frame vertices in the trajectory export.
    pub write_verts: bool,
    /// Ask the host for an animated scene export.
    pub scene_export: bool,
    /// Fixed seed for texture and subject picks.
    pub seed: Option<u64>,
}

impl ProcessorOptions {
    pub fn new(output_dir: impl Into<PathBuf>, samples_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            samples_dir: samples_dir.into(),
            with_cache: true,
            write_verts: false,
            scene_export: false,
            seed: None,
        }
    }

    /// Output folder name for a sample (`<stem>` or `<stem>_with_cache`).
    pub fn subfolder(&self, stem: &str) -> String {
        sample_folder_name(stem, self.with_cache)
    }

    /// Output folder of a sample.
    pub fn sample_dir(&self, stem: &str) -> PathBuf {
        self.output_dir.join(self.subfolder(stem))
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Output folder name of a sample stem.
pub fn sample_folder_name(stem: &str, with_cache: bool) -> String {
    if with_cache {
        format!("{}_with_cache", stem)
    } else {
        stem.to_string()
    }
}

/// Result of one successful attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Artifacts written for these sequence names.
    Exported(Vec<String>),
    /// Nothing to do for this sample (e.g. subject not selected).
    Skipped,
}

/// Per-sample processing against a scene host.
pub trait DatasetProcessor {
    /// Short dataset name used in logs.
    fn name(&self) -> &'static str;

    /// Animate and export one sample.
    ///
    /// `frame` selects a single target frame for the export; values outside
    /// the animated range are ignored with a warning.
    fn process_sample(
        &mut self,
        workspace: &mut Workspace<'_>,
        sample: &Sample,
        frame: Option<usize>,
    ) -> Result<SampleOutcome>;
}

// ============================================================================
// DatasetKind
// ============================================================================

/// Supported datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// AMASS-style `.npz` motion sequences
    MotionSequence,
    /// CLOTH3D-style garment captures
    GarmentCapture,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::MotionSequence, DatasetKind::GarmentCapture];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::MotionSequence => "amass",
            DatasetKind::GarmentCapture => "cloth3d",
        }
    }

    /// Build the processor for this dataset.
    ///
    /// Loads every asset the processor needs up front, so a missing
    /// regressor, taxonomy or config file fails before any sample is
    /// touched.
    pub fn build(
        self,
        options: ProcessorOptions,
        assets: &AssetLayout,
        config_file: Option<&Path>,
    ) -> Result<Box<dyn DatasetProcessor>> {
        let regressors_path = assets.joint_regressors();
        assets.require(&regressors_path)?;
        let regressors = JointRegressors::load(&regressors_path)?;

        let processor: Box<dyn DatasetProcessor> = match self {
            DatasetKind::MotionSequence => {
                let config = match config_file {
                    Some(path) => MotionConfig::load(path)?,
                    None => MotionConfig::default(),
                };
                let registry = SubDatasetRegistry::load(assets.taxonomy(), &options.samples_dir)?;
                // Validate the sub-dataset id now rather than on the first sample
                registry.get(&config.sub_dataset_id)?;
                let mut p = MotionSequenceProcessor::new(options, config, registry, regressors);
                p.set_skin_textures(assets.clone(), ClothingOption::All);
                Box::new(p)
            }
            DatasetKind::GarmentCapture => {
                let mut p = GarmentCaptureProcessor::new(options, regressors);
                p.set_skin_textures(assets.clone(), ClothingOption::Grey);
                Box::new(p)
            }
        };
        tracing::info!("processing {} data", self);
        Ok(processor)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownDataset {
                name: s.to_string(),
                available: Self::ALL.map(DatasetKind::as_str).join(", "),
            })
    }
}
