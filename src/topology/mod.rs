//! Network topology builder.
//!
//! Merges a reference road network with user-drawn lines into one graph in
//! which every edge runs between two nodes of the node table, then writes the
//! graph as an OSM XML document for the routing engine.
//!
//! Stages run strictly in order, each taking ownership of the previous
//! stage's tables:
//!
//! 1. [`crs`] normalises both inputs to WGS84, then everything is projected
//!    into a metric [`crs::LocalTangentPlane`] around the region
//! 2. [`combine`] unions reference edges and exploded custom lines
//! 3. [`junctions`] finds crossings and custom vertices, then
//!    [`node_merge::consolidate_junctions`] snaps them onto nearby reference
//!    nodes and folds near-duplicates
//! 4. [`split`] cuts edges at those junctions
//! 5. [`node_merge`] turns junctions into nodes
//! 6. [`endpoints`] resolves `u`/`v` for split and custom edges
//! 7. [`finalize`] writes endpoints back, numbers edges, returns to WGS84
//! 8. [`validation`] drops anything still inconsistent
//! 9. [`tags`] stamps the caller's tags onto custom edges
//! 10. [`osm_xml`] serialises

pub mod combine;
pub mod config;
pub mod crs;
pub mod endpoints;
pub mod error;
pub mod finalize;
pub mod geometry;
pub mod junctions;
pub mod node_id_allocator;
pub mod node_merge;
pub mod osm_xml;
pub mod split;
pub mod tags;
pub mod types;
pub mod validation;

mod test_pipeline;

use crate::provider::NetworkProvider;
use config::BuildConfig;
use crs::LocalTangentPlane;
use error::{BuildWarning, TopologyError};
use geo::{BoundingRect, Polygon};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use types::{CustomLine, CustomLines, FinalGraph, Node, ReferenceEdge, ReferenceNetwork, TagMap};

/// Everything one build consumes.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Region of interest, WGS84
    pub region: Polygon<f64>,
    pub custom: CustomLines,
    pub reference: ReferenceNetwork,
    /// Applied to custom edges only
    pub tags: TagMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub reference_nodes: usize,
    pub reference_edges: usize,
    /// Custom line parts after exploding multi-part features
    pub custom_edges: usize,
    pub junction_candidates: usize,
    /// Candidates moved onto a nearby reference node before splitting
    pub junctions_snapped_to_reference: usize,
    pub edges_split: usize,
    pub segments_created: usize,
    pub new_nodes: usize,
    pub junctions_outside_region: usize,
    pub endpoint_edges_considered: usize,
    pub endpoint_edges_resolved: usize,
    pub endpoint_edges_dropped: usize,
    pub self_loops_removed: usize,
    pub dangling_edges_removed: usize,
    pub final_nodes: usize,
    pub final_edges: usize,
    pub custom_edges_tagged: usize,
}

/// Non-fatal outcome of a successful build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub stats: BuildStats,
    pub warnings: Vec<BuildWarning>,
}

impl BuildReport {
    pub fn unresolved_endpoint_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, BuildWarning::UnresolvedEndpoint { .. }))
            .count()
    }

    pub fn referential_integrity_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, BuildWarning::ReferentialIntegrity { .. }))
            .count()
    }
}

fn project_reference(frame: &LocalTangentPlane, reference: ReferenceNetwork) -> (Vec<Node>, Vec<ReferenceEdge>) {
    let nodes = reference
        .nodes
        .into_iter()
        .map(|node| {
            let c = frame.project(node.coord());
            Node::new(node.id, c.x, c.y)
        })
        .collect();
    let edges = reference
        .edges
        .into_iter()
        .map(|edge| ReferenceEdge {
            geometry: frame.project_geometry(&edge.geometry),
            ..edge
        })
        .collect();
    (nodes, edges)
}

fn project_custom(frame: &LocalTangentPlane, custom: CustomLines) -> Vec<CustomLine> {
    custom
        .lines
        .into_iter()
        .map(|line| CustomLine {
            geometry: frame.project_geometry(&line.geometry),
            attributes: line.attributes,
        })
        .collect()
}

/// Run stages 1 through 9 and return the finished graph in memory.
pub fn build_graph(
    request: BuildRequest,
    config: &BuildConfig,
) -> Result<(FinalGraph, BuildReport), TopologyError> {
    let started = Instant::now();
    let BuildRequest {
        region,
        custom,
        reference,
        tags,
    } = request;

    let custom = crs::normalize_custom(custom)?;
    let reference = crs::normalize_reference(reference)?;
    if reference.edges.is_empty() && custom.is_empty() {
        return Err(TopologyError::EmptyInput);
    }

    let mut stats = BuildStats {
        reference_nodes: reference.nodes.len(),
        reference_edges: reference.edges.len(),
        ..Default::default()
    };

    let frame = LocalTangentPlane::for_region(&region);
    let working_region = frame.project_geometry(&region);
    let (reference_nodes, reference_edges) = project_reference(&frame, reference);
    let custom_lines = project_custom(&frame, custom);

    let edges = combine::combine_edges(reference_edges, custom_lines);
    stats.custom_edges = edges.iter().filter(|edge| edge.custom).count();

    let raw_junctions = junctions::resolve_junctions(&edges);
    let settled = node_merge::consolidate_junctions(
        &raw_junctions,
        &reference_nodes,
        config.split_tolerance_m.max(config.coincidence_tolerance_m),
        config.coincidence_tolerance_m,
    );
    let junction_points = settled.points;
    stats.junction_candidates = junction_points.len();
    stats.junctions_snapped_to_reference = settled.snapped_to_reference;

    let split = split::split_edges_at_junctions(edges, &junction_points, config.split_tolerance_m);
    stats.edges_split = split.edges_split;
    stats.segments_created = split.segments_created;

    let merged = node_merge::merge_junction_nodes(
        &junction_points,
        reference_nodes,
        &working_region,
        config.coincidence_tolerance_m,
    );
    stats.new_nodes = merged.new_nodes;
    stats.junctions_outside_region = merged.outside_region;

    let assigned = endpoints::assign_endpoints(&split.edges, &merged.nodes, config.endpoint_search_radius_m);
    stats.endpoint_edges_considered = assigned.considered;
    stats.endpoint_edges_resolved = assigned.assignments.len();
    stats.endpoint_edges_dropped = assigned.drops.len();

    let mut warnings: Vec<BuildWarning> = Vec::new();
    for dropped in &assigned.drops {
        let warning = BuildWarning::UnresolvedEndpoint {
            edge: dropped.edge,
            reason: dropped.reason,
        };
        warn!("{}", warning);
        warnings.push(warning);
    }

    let mut graph = finalize::finalize(split.edges, &assigned.assignments, merged.nodes, &frame);

    let validated = validation::validate_graph(&mut graph);
    stats.self_loops_removed = validated.self_loops_removed;
    stats.dangling_edges_removed = validated.dangling_removed;
    warnings.extend(validated.warnings);

    stats.custom_edges_tagged = tags::apply_tags(&mut graph, &tags);
    stats.final_nodes = graph.nodes.len();
    stats.final_edges = graph.edges.len();

    info!(
        "Built graph with {} nodes and {} edges ({} custom) in {:?}; {} warnings",
        stats.final_nodes,
        stats.final_edges,
        graph.custom_edge_count(),
        started.elapsed(),
        warnings.len()
    );

    Ok((graph, BuildReport { stats, warnings }))
}

/// Build the graph and write it to `output`.
///
/// On error nothing is left at `output` or beside it.
pub fn build_network(
    request: BuildRequest,
    output: &Path,
    config: &BuildConfig,
) -> Result<BuildReport, TopologyError> {
    let (graph, report) = build_graph(request, config)?;
    osm_xml::write_osm_file(&graph, &config.generator, output).map_err(|source| {
        TopologyError::Serialization {
            path: output.to_path_buf(),
            source,
        }
    })?;
    Ok(report)
}

/// Fetch the reference network for the region's bounding box, then build.
pub fn build_with_provider<P: NetworkProvider + ?Sized>(
    provider: &P,
    region: Polygon<f64>,
    custom: CustomLines,
    tags: TagMap,
    output: &Path,
    config: &BuildConfig,
) -> Result<BuildReport, TopologyError> {
    let bbox = region.bounding_rect().ok_or(TopologyError::EmptyInput)?;
    info!(
        "Fetching reference network for ({:.5}, {:.5}) - ({:.5}, {:.5})",
        bbox.min().x,
        bbox.min().y,
        bbox.max().x,
        bbox.max().y
    );
    let reference = provider.fetch_network(bbox)?;

    build_network(
        BuildRequest {
            region,
            custom,
            reference,
            tags,
        },
        output,
        config,
    )
}
