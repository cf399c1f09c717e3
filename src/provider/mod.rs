//! Reference network providers.
//!
//! The builder never goes looking for road data itself; callers hand it a
//! [`NetworkProvider`] that answers "nodes and edges for this bounding box".

use crate::custom_input::{attributes_from_properties, declared_crs, line_from_positions};
use crate::topology::crs::{Crs, lat_lng_to_web_merc};
use crate::topology::geometry::line_envelope;
use crate::topology::types::{Node, NodeId, ReferenceEdge, ReferenceNetwork};
use ahash::{AHashMap, AHashSet};
use geo::{Intersects, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, JsonValue, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid GeoJSON in '{path}': {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },
    #[error("feature {index} in '{path}' is missing property '{property}'")]
    MissingProperty {
        path: PathBuf,
        index: usize,
        property: &'static str,
    },
    #[error("feature {index} in '{path}' has invalid geometry: {reason}")]
    InvalidGeometry {
        path: PathBuf,
        index: usize,
        reason: String,
    },
}

pub trait NetworkProvider {
    /// Node and edge tables covering `bbox` (WGS84 lon/lat).
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<ReferenceNetwork, ProviderError>;
}

impl<P: NetworkProvider + ?Sized> NetworkProvider for &P {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<ReferenceNetwork, ProviderError> {
        (**self).fetch_network(bbox)
    }
}

/// `bbox` (WGS84) expressed in the reference the network declares, or `None`
/// when that reference is missing or unknown.
fn bbox_in_network_crs(crs: Option<&str>, bbox: Rect<f64>) -> Option<Rect<f64>> {
    match crs?.parse::<Crs>().ok()? {
        Crs::Wgs84 => Some(bbox),
        Crs::WebMercator => {
            let (min_x, min_y) = lat_lng_to_web_merc(bbox.min().x, bbox.min().y);
            let (max_x, max_y) = lat_lng_to_web_merc(bbox.max().x, bbox.max().y);
            Some(Rect::new((min_x, min_y), (max_x, max_y)))
        }
    }
}

/// Edges whose extent overlaps `bbox`, plus the nodes they reference.
///
/// Clipping happens in the network's own reference. A network whose
/// reference cannot be read is returned whole so the CRS normalizer can
/// reject it with a proper error.
fn clip_network(network: &ReferenceNetwork, bbox: Rect<f64>) -> ReferenceNetwork {
    let Some(bbox) = bbox_in_network_crs(network.crs.as_deref(), bbox) else {
        debug!(
            "Not clipping network with unreadable reference {:?}",
            network.crs
        );
        return network.clone();
    };

    let edges: Vec<ReferenceEdge> = network
        .edges
        .iter()
        .filter(|edge| {
            line_envelope(&edge.geometry, 0.0).is_some_and(|envelope| {
                let [min_x, min_y] = envelope.lower();
                let [max_x, max_y] = envelope.upper();
                Rect::new((min_x, min_y), (max_x, max_y)).intersects(&bbox)
            })
        })
        .cloned()
        .collect();

    let referenced: AHashSet<NodeId> = edges.iter().flat_map(|edge| [edge.u, edge.v]).collect();
    let nodes = network
        .nodes
        .iter()
        .filter(|node| referenced.contains(&node.id))
        .copied()
        .collect();

    ReferenceNetwork {
        crs: network.crs.clone(),
        nodes,
        edges,
    }
}

/// Serves a network prepared ahead of time.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    network: ReferenceNetwork,
}

impl InMemoryProvider {
    pub fn new(network: ReferenceNetwork) -> Self {
        Self { network }
    }
}

impl NetworkProvider for InMemoryProvider {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<ReferenceNetwork, ProviderError> {
        Ok(clip_network(&self.network, bbox))
    }
}

/// Reads a network exported as two GeoJSON FeatureCollections, the way
/// osmnx writes graphs: a node collection of Points with an `osmid`
/// property, and an edge collection of LineStrings with `u` and `v`.
#[derive(Debug, Clone)]
pub struct GeoJsonFileProvider {
    nodes_path: PathBuf,
    edges_path: PathBuf,
}

fn read_collection(path: &Path) -> Result<FeatureCollection, ProviderError> {
    let text = std::fs::read_to_string(path).map_err(|source| ProviderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let geojson = text.parse::<GeoJson>().map_err(|source| ProviderError::GeoJson {
        path: path.to_path_buf(),
        source,
    })?;
    FeatureCollection::try_from(geojson).map_err(|source| ProviderError::GeoJson {
        path: path.to_path_buf(),
        source,
    })
}

fn integer_property(feature: &Feature, name: &str) -> Option<i64> {
    match feature.property(name)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl GeoJsonFileProvider {
    pub fn new(nodes_path: impl Into<PathBuf>, edges_path: impl Into<PathBuf>) -> Self {
        Self {
            nodes_path: nodes_path.into(),
            edges_path: edges_path.into(),
        }
    }

    fn load_nodes(&self) -> Result<(Option<String>, Vec<Node>), ProviderError> {
        let collection = read_collection(&self.nodes_path)?;
        let crs = declared_crs(collection.foreign_members.as_ref());
        let path = &self.nodes_path;

        let mut nodes = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.iter().enumerate() {
            let id = integer_property(feature, "osmid").ok_or_else(|| ProviderError::MissingProperty {
                path: path.clone(),
                index,
                property: "osmid",
            })?;
            let position = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::Point(position)) => position,
                _ => {
                    return Err(ProviderError::InvalidGeometry {
                        path: path.clone(),
                        index,
                        reason: "node feature must be a Point".to_string(),
                    });
                }
            };
            let [x, y, ..] = position.as_slice() else {
                return Err(ProviderError::InvalidGeometry {
                    path: path.clone(),
                    index,
                    reason: "point has fewer than two ordinates".to_string(),
                });
            };
            nodes.push(Node::new(NodeId(id), *x, *y));
        }
        Ok((crs, nodes))
    }

    fn load_edges(&self) -> Result<(Option<String>, Vec<ReferenceEdge>), ProviderError> {
        let collection = read_collection(&self.edges_path)?;
        let crs = declared_crs(collection.foreign_members.as_ref());
        let path = &self.edges_path;

        let mut edges = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.iter().enumerate() {
            let endpoint = |property: &'static str| {
                integer_property(feature, property)
                    .map(NodeId)
                    .ok_or_else(|| ProviderError::MissingProperty {
                        path: path.clone(),
                        index,
                        property,
                    })
            };
            let u = endpoint("u")?;
            let v = endpoint("v")?;

            let geometry = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::LineString(positions)) => line_from_positions(positions),
                _ => None,
            }
            .ok_or_else(|| ProviderError::InvalidGeometry {
                path: path.clone(),
                index,
                reason: "edge feature must be a LineString with at least two positions".to_string(),
            })?;

            let mut attributes = attributes_from_properties(feature.properties.as_ref());
            for key in ["u", "v", "key", "osmid"] {
                attributes.extra.remove(key);
            }
            edges.push(ReferenceEdge {
                u,
                v,
                geometry,
                attributes,
            });
        }
        Ok((crs, edges))
    }

    pub fn load(&self) -> Result<ReferenceNetwork, ProviderError> {
        let (node_crs, nodes) = self.load_nodes()?;
        let (edge_crs, edges) = self.load_edges()?;
        if node_crs != edge_crs {
            debug!(
                "Node and edge files declare different references ({:?} vs {:?}); using the node file's",
                node_crs, edge_crs
            );
        }
        let crs = node_crs
            .or(edge_crs)
            .unwrap_or_else(|| crate::custom_input::DEFAULT_GEOJSON_CRS.to_string());

        info!(
            "Loaded reference network: {} nodes, {} edges from {}",
            nodes.len(),
            edges.len(),
            self.edges_path.display()
        );
        Ok(ReferenceNetwork {
            crs: Some(crs),
            nodes,
            edges,
        })
    }
}

impl NetworkProvider for GeoJsonFileProvider {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<ReferenceNetwork, ProviderError> {
        Ok(clip_network(&self.load()?, bbox))
    }
}

fn bbox_key(bbox: &Rect<f64>) -> [u64; 4] {
    [
        bbox.min().x.to_bits(),
        bbox.min().y.to_bits(),
        bbox.max().x.to_bits(),
        bbox.max().y.to_bits(),
    ]
}

/// Memoises another provider's answers per bounding box for as long as the
/// wrapper lives. Errors are not cached.
pub struct CachedProvider<P> {
    inner: P,
    cache: Mutex<AHashMap<[u64; 4], ReferenceNetwork>>,
}

impl<P: NetworkProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(AHashMap::new()),
        }
    }

    pub fn cached_regions(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: NetworkProvider> NetworkProvider for CachedProvider<P> {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<ReferenceNetwork, ProviderError> {
        let key = bbox_key(&bbox);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                debug!("Reference network cache hit");
                return Ok(hit.clone());
            }
        }

        let network = self.inner.fetch_network(bbox)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, network.clone());
        }
        Ok(network)
    }
}
