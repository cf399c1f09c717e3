use serde::Deserialize;
use std::path::Path;

/// Tunables for one build. Distances are metres in the local working frame.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Buffer around junction points when deciding which edges they cut
    pub split_tolerance_m: f64,
    /// Junction points this close to a reference node reuse that node
    pub coincidence_tolerance_m: f64,
    /// How far an edge endpoint may sit from the node it is matched to
    pub endpoint_search_radius_m: f64,
    /// Written to the `generator` attribute of the interchange document
    pub generator: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            split_tolerance_m: 1.0,
            coincidence_tolerance_m: 0.05,
            endpoint_search_radius_m: 5.0,
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BuildConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_ron_str(&text)?)
    }
}
