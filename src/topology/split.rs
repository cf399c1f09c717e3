use crate::topology::geometry::{cut_polyline, locate_on_polyline, point_envelope, polyline_length};
use crate::topology::junctions::build_edge_rtree;
use crate::topology::types::Edge;
use ahash::AHashMap;
use geo::Coord;
use tracing::{debug, info};

pub struct SplitOutcome {
    pub edges: Vec<Edge>,
    /// Parent edges that were replaced by sub-segments
    pub edges_split: usize,
    /// Sub-segments created
    pub segments_created: usize,
}

/// Cut every edge touched by a buffered junction point.
///
/// A point touches an edge when it lies within `tolerance` of the line.
/// Touching points are ordered by their distance along the line; those that
/// fall on the line's own ends (or on top of one another) are collapsed, so
/// an edge touched only at its ends passes through unchanged. Sub-segments
/// keep the parent's attributes, lose its endpoint ids and are marked split.
pub fn split_edges_at_junctions(edges: Vec<Edge>, junctions: &[Coord], tolerance: f64) -> SplitOutcome {
    info!(
        "Splitting {} edges at {} junction candidates (tolerance {}m)",
        edges.len(),
        junctions.len(),
        tolerance
    );
    let tree = build_edge_rtree(&edges);

    // edge row -> (distance along, cut point)
    let mut touches: AHashMap<usize, Vec<(f64, Coord)>> = AHashMap::new();
    for &point in junctions {
        for item in tree.locate_in_envelope_intersecting(&point_envelope(point, tolerance)) {
            let idx = item.data;
            if let Some((along, off)) = locate_on_polyline(point, &edges[idx].geometry) {
                if off <= tolerance {
                    touches.entry(idx).or_default().push((along, point));
                }
            }
        }
    }

    let mut result = Vec::with_capacity(edges.len() + touches.len());
    let mut edges_split = 0;
    let mut segments: Vec<Edge> = Vec::new();

    for (idx, edge) in edges.into_iter().enumerate() {
        let Some(mut cuts) = touches.remove(&idx) else {
            result.push(edge);
            continue;
        };

        let length = polyline_length(&edge.geometry);
        cuts.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut interior: Vec<(f64, Coord)> = Vec::with_capacity(cuts.len());
        for (along, point) in cuts {
            if along <= tolerance || along >= length - tolerance {
                continue;
            }
            if interior
                .last()
                .is_some_and(|&(prev, _)| along - prev <= tolerance)
            {
                continue;
            }
            interior.push((along, point));
        }

        if interior.is_empty() {
            result.push(edge);
            continue;
        }

        edges_split += 1;
        for piece in cut_polyline(&edge.geometry, &interior) {
            segments.push(Edge {
                u: None,
                v: None,
                geometry: piece,
                attributes: edge.attributes.clone(),
                custom: edge.custom,
                split: true,
            });
        }
    }

    let segments_created = segments.len();
    debug!(
        "Replaced {} edges with {} sub-segments",
        edges_split,
        segments_created
    );

    // untouched edges keep their order, sub-segments follow
    result.extend(segments);
    SplitOutcome {
        edges: result,
        edges_split,
        segments_created,
    }
}
