// ===========================================================================
// Junction Resolver
// ===========================================================================
//
// Finds every point where an unresolved (custom) edge must share a node:
//   1. exact crossings/touches with any other edge, found through an R-tree
//      over edge envelopes and confirmed segment by segment;
//   2. every vertex of the unresolved edge itself, so topology also breaks
//      wherever a custom line bends.
// The result is deduplicated on exact coordinates, first occurrence wins.
// ===========================================================================

use crate::topology::geometry::line_envelope;
use crate::topology::types::Edge;
use ahash::AHashSet;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, LineString};
use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};
use tracing::{debug, info};

pub type EdgeTree = RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>;

/// Build R-tree for edges using bounding boxes; data is the row index.
pub fn build_edge_rtree(edges: &[Edge]) -> EdgeTree {
    let items: Vec<_> = edges
        .iter()
        .enumerate()
        .filter_map(|(idx, edge)| {
            let envelope = line_envelope(&edge.geometry, 0.0)?;
            Some(GeomWithData::new(
                Rectangle::from_corners(envelope.lower(), envelope.upper()),
                idx,
            ))
        })
        .collect();

    RTree::bulk_load(items)
}

fn is_unresolved(edge: &Edge) -> bool {
    edge.u.is_none() || edge.v.is_none()
}

/// All points where two polylines meet. Collinear overlaps contribute both
/// ends of the shared stretch.
pub fn intersect_lines(a: &LineString<f64>, b: &LineString<f64>) -> Vec<Coord> {
    let mut points = Vec::new();
    for seg_a in a.lines() {
        for seg_b in b.lines() {
            match line_intersection(seg_a, seg_b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(intersection);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    points.push(intersection.start);
                    points.push(intersection.end);
                }
                None => {}
            }
        }
    }
    points
}

/// Candidate junction points for the current working edge table.
pub fn resolve_junctions(edges: &[Edge]) -> Vec<Coord> {
    let tree = build_edge_rtree(edges);
    let unresolved: Vec<usize> = (0..edges.len())
        .filter(|&idx| is_unresolved(&edges[idx]))
        .collect();

    info!(
        "Resolving junctions for {} unresolved edges out of {}",
        unresolved.len(),
        edges.len()
    );

    // Crossings per unresolved edge, in edge order so output is deterministic.
    let crossings: Vec<Vec<Coord>> = unresolved
        .par_iter()
        .map(|&i| {
            let line = &edges[i].geometry;
            let Some(envelope) = line_envelope(line, 0.0) else {
                return Vec::new();
            };

            let mut candidates: Vec<usize> = tree
                .locate_in_envelope_intersecting(&envelope)
                .map(|item| item.data)
                .filter(|&j| j != i)
                // a pair of unresolved edges is handled once, from the lower index
                .filter(|&j| !(j < i && is_unresolved(&edges[j])))
                .collect();
            candidates.sort_unstable();

            let mut points = Vec::new();
            for j in candidates {
                // canonical order keeps the computed point independent of pair order
                let (first, second) = if i < j { (i, j) } else { (j, i) };
                points.extend(intersect_lines(
                    &edges[first].geometry,
                    &edges[second].geometry,
                ));
            }
            points
        })
        .collect();

    let crossing_count: usize = crossings.iter().map(Vec::len).sum();
    let vertices = unresolved
        .iter()
        .flat_map(|&i| edges[i].geometry.0.iter().copied());

    let mut seen: AHashSet<(u64, u64)> = AHashSet::new();
    let mut junctions = Vec::new();
    for point in crossings.into_iter().flatten().chain(vertices) {
        // + 0.0 folds -0.0 into 0.0
        let key = ((point.x + 0.0).to_bits(), (point.y + 0.0).to_bits());
        if seen.insert(key) {
            junctions.push(point);
        }
    }

    debug!(
        "{} raw crossings, {} unique junction candidates",
        crossing_count,
        junctions.len()
    );
    junctions
}
