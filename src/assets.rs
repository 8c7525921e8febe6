//! Asset layout under the parent data directory and skin texture selection.
//!
//! ```text
//! <parent>/
//!   taxonomy.json                         sub-dataset registry
//!   body_models/smpl/<gender>/model.npz   body model (headless host)
//!   body_models/dmpls/<gender>/model.npz  soft-tissue basis (optional)
//!   surreal/datageneration/smpl_data/
//!     joint_regressors.npz                J_regressor_{male,female}
//!     textures/<gender>_<split>.txt       skin texture lists
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::pose::Gender;
use crate::util::{Error, Result};

/// Texture pool used when picking a skin texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClothingOption {
    /// Only textures without "nongrey" in the path
    #[default]
    Grey,
    /// Only "nongrey" textures
    NonGrey,
    /// A single fixed texture
    Same,
    /// Every listed texture
    All,
}

/// Fixed texture used by [`ClothingOption::Same`].
const SAME_TEXTURE: &str = "textures/male/nongrey_male_0244.jpg";

/// Paths of the assets the pipeline needs.
#[derive(Clone, Debug)]
pub struct AssetLayout {
    parent: PathBuf,
}

impl AssetLayout {
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self { parent: parent.into() }
    }

    #[inline]
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    pub fn smpl_data_dir(&self) -> PathBuf {
        self.parent.join("surreal").join("datageneration").join("smpl_data")
    }

    pub fn joint_regressors(&self) -> PathBuf {
        self.smpl_data_dir().join("joint_regressors.npz")
    }

    pub fn body_model(&self, gender: Gender) -> PathBuf {
        self.parent.join("body_models").join("smpl").join(gender.as_str()).join("model.npz")
    }

    pub fn dmpl_model(&self, gender: Gender) -> PathBuf {
        self.parent.join("body_models").join("dmpls").join(gender.as_str()).join("model.npz")
    }

    pub fn taxonomy(&self) -> PathBuf {
        self.parent.join("taxonomy.json")
    }

    pub fn texture_list(&self, gender: Gender, split: &str) -> PathBuf {
        self.smpl_data_dir().join("textures").join(format!("{}_{}.txt", gender.as_str(), split))
    }

    /// Fail with a configuration error if a required asset is absent.
    pub fn require(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::config(format!("required asset missing: {}", path.display())));
        }
        Ok(())
    }

    /// Pick a random skin texture for a gender from the `all` split.
    pub fn pick_skin_texture<R: Rng + ?Sized>(
        &self,
        gender: Gender,
        option: ClothingOption,
        rng: &mut R,
    ) -> Result<PathBuf> {
        let list = self.texture_list(gender, "all");
        let content = fs::read_to_string(&list).map_err(|_| Error::FileNotFound(list.clone()))?;

        let candidates: Vec<&str> = match option {
            ClothingOption::Same => vec![SAME_TEXTURE],
            _ => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .filter(|l| match option {
                    ClothingOption::NonGrey => l.contains("nongrey"),
                    ClothingOption::Grey => !l.contains("nongrey"),
                    _ => true,
                })
                .collect(),
        };

        let picked = candidates
            .choose(rng)
            .ok_or_else(|| Error::config(format!("no skin textures match {:?} in {}", option, list.display())))?;
        let path = self.smpl_data_dir().join(picked);
        tracing::debug!("picked skin texture {}", path.display());
        Ok(path)
    }
}
