use geo_types::{Coord, LineString, MultiLineString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Typed wrapper for node identifiers (provider-assigned or freshly allocated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final, dense edge identifier (`1..N` over the finalized table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied tag overrides for custom edges.
pub type TagMap = BTreeMap<String, String>;

/// Tags the routing engine reads, in output order.
pub const OUTPUT_TAGS: [&str; 8] = [
    "highway", "width", "oneway", "maxspeed", "bridge", "lanes", "access", "service",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Longitude in WGS84, or metres east in the working frame
    pub x: f64,
    /// Latitude in WGS84, or metres north in the working frame
    pub y: f64,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    pub fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

/// Route attributes carried by every edge.
///
/// The routing tags are fixed fields so the serializer's allow-list is closed;
/// anything else a feature carries rides along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    pub highway: Option<String>,
    pub width: Option<String>,
    pub oneway: Option<String>,
    pub maxspeed: Option<String>,
    pub bridge: Option<String>,
    pub lanes: Option<String>,
    pub access: Option<String>,
    pub service: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl EdgeAttributes {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut attributes = Self::default();
        for (key, value) in pairs {
            attributes.set(key.into(), value.into());
        }
        attributes
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "highway" => Some(&mut self.highway),
            "width" => Some(&mut self.width),
            "oneway" => Some(&mut self.oneway),
            "maxspeed" => Some(&mut self.maxspeed),
            "bridge" => Some(&mut self.bridge),
            "lanes" => Some(&mut self.lanes),
            "access" => Some(&mut self.access),
            "service" => Some(&mut self.service),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let slot = match key {
            "highway" => &self.highway,
            "width" => &self.width,
            "oneway" => &self.oneway,
            "maxspeed" => &self.maxspeed,
            "bridge" => &self.bridge,
            "lanes" => &self.lanes,
            "access" => &self.access,
            "service" => &self.service,
            _ => return self.extra.get(key).map(String::as_str),
        };
        slot.as_deref()
    }

    pub fn set(&mut self, key: String, value: String) {
        match self.slot_mut(&key) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Allow-listed tags present on this edge, in output order.
    pub fn output_tags(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        OUTPUT_TAGS
            .iter()
            .filter_map(move |&key| self.get(key).map(|value| (key, value)))
    }
}

/// Working edge, flowing through stages 2–7.
///
/// `u`/`v` are `None` until the edge has been matched to nodes; reference
/// edges arrive with both set.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub u: Option<NodeId>,
    pub v: Option<NodeId>,
    pub geometry: LineString<f64>,
    pub attributes: EdgeAttributes,
    pub custom: bool,
    pub split: bool,
}

impl Edge {
    pub fn needs_resolution(&self) -> bool {
        self.split || self.u.is_none() || self.v.is_none()
    }

    pub fn start(&self) -> Option<Coord> {
        self.geometry.0.first().copied()
    }

    pub fn end(&self) -> Option<Coord> {
        self.geometry.0.last().copied()
    }
}

/// A reference-network edge as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEdge {
    pub u: NodeId,
    pub v: NodeId,
    pub geometry: LineString<f64>,
    pub attributes: EdgeAttributes,
}

/// Node and edge tables for a bounding region, with their declared CRS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceNetwork {
    pub crs: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<ReferenceEdge>,
}

/// One user-supplied feature; may hold several line parts.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomLine {
    pub geometry: MultiLineString<f64>,
    pub attributes: EdgeAttributes,
}

impl CustomLine {
    pub fn new(geometry: impl Into<MultiLineString<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: EdgeAttributes::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomLines {
    pub crs: Option<String>,
    pub lines: Vec<CustomLine>,
}

impl CustomLines {
    pub fn wgs84(lines: Vec<CustomLine>) -> Self {
        Self {
            crs: Some("EPSG:4326".to_string()),
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.geometry.0.is_empty())
    }
}

/// Edge of the finalized graph; endpoints are always resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub u: NodeId,
    pub v: NodeId,
    pub geometry: LineString<f64>,
    pub attributes: EdgeAttributes,
    pub custom: bool,
    pub split: bool,
}

/// The finished node and edge tables, in WGS84.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<GraphEdge>,
}

impl FinalGraph {
    pub fn custom_edge_count(&self) -> usize {
        self.edges.iter().filter(|edge| edge.custom).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_route_known_tags_to_fields() {
        let attributes = EdgeAttributes::from_pairs([
            ("highway", "residential"),
            ("name", "Elm Street"),
            ("maxspeed", "25 mph"),
        ]);

        assert_eq!(attributes.highway.as_deref(), Some("residential"));
        assert_eq!(attributes.maxspeed.as_deref(), Some("25 mph"));
        assert_eq!(attributes.get("name"), Some("Elm Street"));
        assert_eq!(attributes.extra.len(), 1);
    }

    #[test]
    fn test_output_tags_follow_allow_list_order() {
        let attributes = EdgeAttributes::from_pairs([
            ("service", "driveway"),
            ("name", "ignored"),
            ("highway", "service"),
            ("lanes", "1"),
        ]);

        let tags: Vec<_> = attributes.output_tags().collect();
        assert_eq!(
            tags,
            vec![("highway", "service"), ("lanes", "1"), ("service", "driveway")]
        );
    }

    #[test]
    fn test_edge_needs_resolution() {
        let mut edge = Edge {
            u: Some(NodeId(1)),
            v: Some(NodeId(2)),
            geometry: LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
            attributes: EdgeAttributes::default(),
            custom: false,
            split: false,
        };
        assert!(!edge.needs_resolution());

        edge.split = true;
        assert!(edge.needs_resolution());

        edge.split = false;
        edge.v = None;
        assert!(edge.needs_resolution());
    }
}
