//! # humangen
//!
//! Batch generator of animated SMPL bodies for synthetic datasets.
//!
//! Motion sequences (AMASS `.npz`) and garment captures (CLOTH3D-style
//! samples) are turned into posed, optionally dressed bodies inside a
//! scene host, their vertex animation is cached as PC2, and per-frame
//! skeleton trajectories are exported as JSON.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math helpers
//! - [`pose`] - Pose vectors, Rodrigues rotations, joint regression
//! - [`cache`] - Write-once PC2 vertex animation caches
//! - [`assets`] - SMPL asset directory layout
//! - [`dataset`] - Sample readers for both datasets
//! - [`host`] - Scene host abstraction and the headless LBS host
//! - [`process`] - Dataset processors
//! - [`export`] - Trajectory export
//! - [`batch`] - Resumable batch driver with bounded retries
//!
//! ## Example
//!
//! ```ignore
//! use humangen::prelude::*;
//!
//! let assets = AssetLayout::new("smpl_data");
//! let mut host = HeadlessHost::from_assets(&assets)?;
//! let options = ProcessorOptions::new("out/run", "samples");
//! let mut processor = DatasetKind::GarmentCapture.build(options, &assets, None)?;
//!
//! let report = BatchDriver::new(&mut host, processor.as_mut(), BatchOptions::new("samples", "out/run")).run()?;
//! println!("{} done, {} abandoned", report.done.len(), report.abandoned.len());
//! ```

pub mod util;
pub mod pose;
pub mod cache;
pub mod assets;
pub mod dataset;
pub mod host;
pub mod process;
pub mod export;
pub mod batch;

// Re-export commonly used types
pub use util::{Error, Result};
pub use cache::{CacheKey, VertexCache, VertexCacheStore};
pub use process::{DatasetKind, DatasetProcessor, ProcessorOptions};
pub use batch::{BatchDriver, BatchOptions, BatchReport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::assets::{AssetLayout, ClothingOption};
    pub use crate::cache::{CacheKey, VertexCache, VertexCacheStore};
    pub use crate::dataset::{Sample, SequenceRecord};
    pub use crate::host::{BodyActors, HeadlessHost, SceneHost};
    pub use crate::pose::{Gender, PoseVector, RotationFrame};
    pub use crate::process::{DatasetKind, DatasetProcessor, ProcessorOptions, SampleOutcome, Workspace};
    pub use crate::export::{Exporter, JsonExporter, Trajectory};
    pub use crate::batch::{BatchDriver, BatchOptions, BatchReport};
}
