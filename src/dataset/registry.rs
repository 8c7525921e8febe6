//! Sub-dataset registry read from the taxonomy file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::util::{Error, Result};

#[derive(Debug, Deserialize)]
struct TaxonomyEntry {
    sub_data_id: Option<String>,
    path: Option<String>,
}

/// Mapping of motion sub-dataset ids (e.g. `CMU`) to their directories.
#[derive(Clone, Debug, Default)]
pub struct SubDatasetRegistry {
    datasets: BTreeMap<String, PathBuf>,
}

impl SubDatasetRegistry {
    /// Load `taxonomy.json`; entry paths are resolved against `data_root`.
    ///
    /// Entries without a `sub_data_id` are ignored.
    pub fn load(taxonomy: impl AsRef<Path>, data_root: impl AsRef<Path>) -> Result<Self> {
        let taxonomy = taxonomy.as_ref();
        let text = fs::read_to_string(taxonomy).map_err(|_| {
            Error::config(format!("taxonomy file could not be found: {}", taxonomy.display()))
        })?;
        let entries: Vec<TaxonomyEntry> = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("invalid taxonomy {}: {}", taxonomy.display(), e)))?;

        let data_root = data_root.as_ref();
        let datasets = entries
            .into_iter()
            .filter_map(|e| {
                let id = e.sub_data_id?;
                let path = data_root.join(e.path.unwrap_or_else(|| id.clone()));
                Some((id, path))
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(count = datasets.len(), "loaded sub-dataset registry");
        Ok(Self { datasets })
    }

    /// Registry from explicit pairs.
    pub fn from_pairs<I, S, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            datasets: pairs.into_iter().map(|(s, p)| (s.into(), p.into())).collect(),
        }
    }

    /// Known sub-dataset ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Directory of a sub-dataset; unknown ids are a configuration error.
    pub fn get(&self, id: &str) -> Result<&Path> {
        self.datasets.get(id).map(PathBuf::as_path).ok_or_else(|| {
            Error::config(format!(
                "sub-dataset '{}' is not supported, choose one of: {}",
                id,
                self.ids().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Path of a sequence file.
    ///
    /// Numeric subject ids are zero-padded to two digits. Without a subject
    /// one is picked at random from the sub-dataset's subject directories.
    pub fn sequence_path<R: Rng + ?Sized>(
        &self,
        sub_dataset: &str,
        subject: Option<&str>,
        sequence: &str,
        rng: &mut R,
    ) -> Result<PathBuf> {
        let root = self.get(sub_dataset)?;
        let subject = match subject.filter(|s| !s.is_empty()) {
            Some(s) => subject_dir_name(s),
            None => random_subject(root, rng)?,
        };
        Ok(root.join(subject).join(sequence))
    }
}

fn subject_dir_name(subject: &str) -> String {
    match subject.parse::<i64>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => subject.to_string(),
    }
}

fn random_subject<R: Rng + ?Sized>(root: &Path, rng: &mut R) -> Result<String> {
    let mut subjects: Vec<String> = fs::read_dir(root)
        .map_err(|_| Error::FileNotFound(root.to_path_buf()))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    subjects.sort();
    subjects
        .choose(rng)
        .cloned()
        .ok_or_else(|| Error::other(format!("no subjects found in {}", root.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_load_taxonomy() {
        let dir = tempfile::tempdir().unwrap();
        let taxonomy = dir.path().join("taxonomy.json");
        fs::write(
            &taxonomy,
            r#"[{"sub_data_id": "CMU", "path": "CMU/CMU"}, {"name": "ignored"}, {"sub_data_id": "KIT"}]"#,
        )
        .unwrap();

        let reg = SubDatasetRegistry::load(&taxonomy, "/amass").unwrap();
        assert_eq!(reg.ids().collect::<Vec<_>>(), ["CMU", "KIT"]);
        assert_eq!(reg.get("CMU").unwrap(), Path::new("/amass/CMU/CMU"));
        assert_eq!(reg.get("KIT").unwrap(), Path::new("/amass/KIT"));
    }

    #[test]
    fn test_missing_taxonomy_is_config_error() {
        let err = SubDatasetRegistry::load("/nope/taxonomy.json", "/amass").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_sub_dataset_lists_known() {
        let reg = SubDatasetRegistry::from_pairs([("CMU", "/a"), ("KIT", "/b")]);
        let msg = reg.get("HumanEva").unwrap_err().to_string();
        assert!(msg.contains("HumanEva"));
        assert!(msg.contains("CMU, KIT"));
    }

    #[test]
    fn test_sequence_path_pads_subject() {
        let reg = SubDatasetRegistry::from_pairs([("CMU", "/amass/CMU")]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let p = reg.sequence_path("CMU", Some("7"), "07_01_poses.npz", &mut rng).unwrap();
        assert_eq!(p, PathBuf::from("/amass/CMU/07/07_01_poses.npz"));

        let p = reg.sequence_path("CMU", Some("rub001"), "a.npz", &mut rng).unwrap();
        assert_eq!(p, PathBuf::from("/amass/CMU/rub001/a.npz"));
    }

    #[test]
    fn test_random_subject() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("01")).unwrap();
        fs::create_dir(dir.path().join("02")).unwrap();
        let reg = SubDatasetRegistry::from_pairs([("CMU", dir.path())]);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);

        let p = reg.sequence_path("CMU", None, "s.npz", &mut rng).unwrap();
        let subject = p.parent().unwrap().file_name().unwrap().to_str().unwrap().to_string();
        assert!(subject == "01" || subject == "02");

        let empty = tempfile::tempdir().unwrap();
        let reg = SubDatasetRegistry::from_pairs([("CMU", empty.path())]);
        assert!(reg.sequence_path("CMU", None, "s.npz", &mut rng).is_err());
    }
}
