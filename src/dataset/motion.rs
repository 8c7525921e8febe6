//! AMASS-style motion sequence reader.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::pose::{Gender, PoseVector, NUM_DMPL_COEFFS};
use crate::util::{DVec3, Error, Result};
use super::npz::NpzArchive;
use super::SequenceRecord;

/// Motion dataset options, read from the `--config-file` JSON.
///
/// ```json
/// { "sub_dataset_id": "CMU", "num_betas": 10, "num_dmpls": 8, "subject_ids": "01 02 15" }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Sub-dataset id from the taxonomy registry.
    pub sub_dataset_id: String,
    /// Shape coefficients kept from `betas`.
    pub num_betas: usize,
    /// Soft-tissue coefficients kept from `dmpls` (at most 8).
    pub num_dmpls: usize,
    /// Subjects to process; empty accepts every subject.
    #[serde(deserialize_with = "subject_list")]
    pub subject_ids: Vec<String>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sub_dataset_id: String::new(),
            num_betas: 10,
            num_dmpls: 8,
            subject_ids: Vec::new(),
        }
    }
}

impl MotionConfig {
    /// Load from a JSON file; a missing or invalid file is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|_| Error::config(format!("config file could not be found: {}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Whether a subject directory should be processed.
    pub fn includes_subject(&self, id: &str) -> bool {
        self.subject_ids.is_empty() || self.subject_ids.iter().any(|s| s == id)
    }
}

/// Accept either a whitespace separated string or a list of ids.
fn subject_list<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        Text(String),
        List(Vec<String>),
    }
    Ok(match Ids::deserialize(de)? {
        Ids::Text(s) => s.split_whitespace().map(str::to_string).collect(),
        Ids::List(v) => v,
    })
}

/// Reads `.npz` motion sequences into [`SequenceRecord`]s.
#[derive(Clone, Debug)]
pub struct MotionSequenceReader {
    num_betas: usize,
    num_dmpls: usize,
}

impl MotionSequenceReader {
    pub fn new(config: &MotionConfig) -> Self {
        Self { num_betas: config.num_betas, num_dmpls: config.num_dmpls.min(NUM_DMPL_COEFFS) }
    }

    /// Load one sequence file.
    ///
    /// Required entries: `poses` (F x >=66), `trans` (F x 3), `betas`,
    /// `gender`. `dmpls` is optional and keys the soft-tissue basis.
    /// Hand articulation beyond the first 66 pose values is dropped: the
    /// 24-joint rig has no finger bones.
    pub fn load(&self, path: impl AsRef<Path>, name: &str) -> Result<SequenceRecord> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let mut npz = NpzArchive::open(path)?;

        let (poses_raw, single_frame) = npz.matrix("poses")?.ok_or_else(|| Error::missing("poses", path))?;
        let poses = poses_raw
            .rows()
            .into_iter()
            .map(|row| PoseVector::from_smplh(&row.to_vec()))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::malformed("poses", path, e.to_string()))?;

        let (trans_raw, _) = npz.matrix("trans")?.ok_or_else(|| Error::missing("trans", path))?;
        if trans_raw.ncols() != 3 {
            return Err(Error::malformed("trans", path, format!("expected 3 columns, got {}", trans_raw.ncols())));
        }
        let trans = trans_raw
            .rows()
            .into_iter()
            .map(|r| DVec3::new(r[0], r[1], r[2]))
            .collect::<Vec<_>>();

        let betas = npz.vector("betas")?.ok_or_else(|| Error::missing("betas", path))?;
        let shape: Vec<f64> = betas.iter().take(self.num_betas).copied().collect();

        let gender_str = npz.string("gender")?.ok_or_else(|| Error::missing("gender", path))?;
        let gender = Gender::parse(&gender_str)
            .ok_or_else(|| Error::malformed("gender", path, format!("unknown gender '{}'", gender_str)))?;

        let dmpls = npz.matrix("dmpls")?.map(|(m, _)| {
            m.rows()
                .into_iter()
                .map(|r| r.iter().take(self.num_dmpls).copied().collect())
                .collect::<Vec<Vec<f64>>>()
        });

        // Actor orientation follows the z component of the first root rotation
        let zrot = poses.first().map(|p| p.root_orientation().z).unwrap_or(0.0);

        let mut info = json!({
            "source": path.display().to_string(),
            "gender": gender,
            "betas": &shape,
            "num_frames": poses.len(),
        });
        if let Some(fps) = npz.scalar("mocap_framerate") {
            info["mocap_framerate"] = json!(fps);
        }

        let record = SequenceRecord {
            name: name.to_string(),
            poses,
            trans,
            shape,
            gender,
            dmpls,
            outfit: Vec::new(),
            zrot,
            single_frame,
            info,
        };
        record.validate(path)?;

        tracing::debug!(
            frames = record.frame_count(),
            gender = %record.gender,
            "loaded motion sequence {}",
            path.display()
        );
        Ok(record)
    }
}
