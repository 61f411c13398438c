use anyhow::Context;
use aprescore::ControllerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Console settings file: where the instrument is and how to drive it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub address: String,
    pub key: String,
    pub controller: ControllerSettings,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            address: "http://192.168.1.1".into(),
            key: "18052021".into(),
            controller: ControllerSettings::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading console config {}", path_ref.display()))?;
        let config: ConsoleConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing console config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
