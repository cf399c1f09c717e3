use crate::topology::types::{FinalGraph, TagMap};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Road class a user picks for the lines they draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkPreset {
    Motorway,
    Residential,
    Path,
}

impl NetworkPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkPreset::Motorway => "motorway",
            NetworkPreset::Residential => "residential",
            NetworkPreset::Path => "path",
        }
    }

    /// Tag map for this preset. Paths never get a speed limit.
    pub fn tags(&self, mph: Option<u32>) -> TagMap {
        let mut tags = TagMap::new();
        tags.insert("highway".to_string(), self.as_str().to_string());
        if let Some(mph) = mph.filter(|&mph| mph > 0) {
            if *self != NetworkPreset::Path {
                tags.insert("maxspeed".to_string(), format!("{} mph", mph));
            }
        }
        tags
    }
}

impl fmt::Display for NetworkPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "motorway" => Ok(NetworkPreset::Motorway),
            "residential" => Ok(NetworkPreset::Residential),
            "path" => Ok(NetworkPreset::Path),
            _ => Err(format!(
                "Unknown network preset: '{}'. Valid options: motorway, residential, path",
                s
            )),
        }
    }
}

/// Overwrite `tags` onto every custom edge. Returns how many edges were touched.
pub fn apply_tags(graph: &mut FinalGraph, tags: &TagMap) -> usize {
    if tags.is_empty() {
        return 0;
    }

    let mut touched = 0;
    for edge in graph.edges.iter_mut().filter(|edge| edge.custom) {
        for (key, value) in tags {
            edge.attributes.set(key.clone(), value.clone());
        }
        touched += 1;
    }

    info!("Applied {} tags to {} custom edges", tags.len(), touched);
    touched
}
