use crate::topology::error::DropReason;
use crate::topology::node_merge::{NodeTree, build_node_rtree};
use crate::topology::types::{Edge, Node, NodeId};
use geo::Coord;
use rayon::prelude::*;
use tracing::{debug, info};

/// Resolved endpoints for one working edge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointAssignment {
    pub edge: usize,
    pub u: NodeId,
    pub v: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDrop {
    pub edge: usize,
    pub reason: DropReason,
}

#[derive(Debug, Default)]
pub struct EndpointOutcome {
    /// Rows that entered the assigner
    pub considered: usize,
    pub assignments: Vec<EndpointAssignment>,
    pub drops: Vec<EndpointDrop>,
}

/// Nearest node within `radius` of `point`; ties go to the lower node ID.
pub fn nearest_node_within(tree: &NodeTree, point: Coord, radius: f64) -> Option<NodeId> {
    tree.locate_within_distance([point.x, point.y], radius * radius)
        .map(|item| {
            let [x, y] = *item.geom();
            let d2 = (x - point.x).powi(2) + (y - point.y).powi(2);
            (d2, item.data)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

fn assign_one(tree: &NodeTree, idx: usize, edge: &Edge, radius: f64) -> Result<EndpointAssignment, EndpointDrop> {
    let drop = |reason| EndpointDrop { edge: idx, reason };
    let (Some(start), Some(end)) = (edge.start(), edge.end()) else {
        return Err(drop(DropReason::EmptyGeometry));
    };
    if edge.geometry.0.len() < 2 {
        return Err(drop(DropReason::EmptyGeometry));
    }

    let u = nearest_node_within(tree, start, radius);
    let v = nearest_node_within(tree, end, radius);
    match (u, v) {
        (Some(u), Some(v)) if u == v => Err(drop(DropReason::SelfLoop)),
        (Some(u), Some(v)) => Ok(EndpointAssignment { edge: idx, u, v }),
        (None, Some(_)) => Err(drop(DropReason::UnresolvedStart)),
        (Some(_), None) => Err(drop(DropReason::UnresolvedEnd)),
        (None, None) => Err(drop(DropReason::UnresolvedBoth)),
    }
}

/// Match the start and end vertex of every edge that needs it (split, or
/// missing an endpoint) to the nearest node within `radius`.
///
/// Every edge that enters ends up in exactly one of `assignments` or `drops`.
pub fn assign_endpoints(edges: &[Edge], nodes: &[Node], radius: f64) -> EndpointOutcome {
    let tree = build_node_rtree(nodes);
    let pending: Vec<usize> = (0..edges.len())
        .filter(|&idx| edges[idx].needs_resolution())
        .collect();

    let results: Vec<Result<EndpointAssignment, EndpointDrop>> = pending
        .par_iter()
        .map(|&idx| assign_one(&tree, idx, &edges[idx], radius))
        .collect();

    let mut outcome = EndpointOutcome {
        considered: pending.len(),
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(assignment) => outcome.assignments.push(assignment),
            Err(dropped) => outcome.drops.push(dropped),
        }
    }

    info!(
        "Endpoint assignment: {} considered, {} resolved, {} dropped",
        outcome.considered,
        outcome.assignments.len(),
        outcome.drops.len()
    );
    if !outcome.drops.is_empty() {
        debug!("Search radius was {}m", radius);
    }
    outcome
}
