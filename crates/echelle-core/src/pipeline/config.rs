use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::background::BackgroundConfig;
use crate::error::Result;

/// Configuration of a reduction session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dispersion-direction code of the instrument setup, part of the
    /// archive key.
    #[serde(default = "default_direction")]
    pub direction: String,
    /// Separator of per-fiber object names in the object string.
    #[serde(default = "default_fiber_delimiter")]
    pub fiber_delimiter: char,
    /// Historical background archive consulted when the session has no
    /// match.
    #[serde(default)]
    pub archive: Option<PathBuf>,
    /// Also store self-measured backgrounds in the archive.
    #[serde(default)]
    pub update_archive: bool,
    /// Directory the session's measured backgrounds are written to.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
    #[serde(default)]
    pub background: BackgroundConfig,
}

fn default_direction() -> String {
    "xr-".to_string()
}
fn default_fiber_delimiter() -> char {
    '|'
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            fiber_delimiter: default_fiber_delimiter(),
            archive: None,
            update_archive: false,
            session_dir: None,
            background: BackgroundConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.background.validate()?;
        Ok(config)
    }
}
