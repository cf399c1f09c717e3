use crate::topology::crs::{LocalTangentPlane, round7};
use crate::topology::endpoints::EndpointAssignment;
use crate::topology::types::{Edge, EdgeId, FinalGraph, GraphEdge, Node};
use ahash::AHashMap;
use geo::{Coord, LineString};
use tracing::info;

fn to_output(frame: &LocalTangentPlane, c: Coord) -> Coord {
    let c = frame.unproject(c);
    Coord {
        x: round7(c.x),
        y: round7(c.y),
    }
}

/// Produce the final tables: resolved endpoints written back, unresolved
/// rows gone, dense edge IDs `1..N` in table order, coordinates back in
/// WGS84 at output precision.
pub fn finalize(
    edges: Vec<Edge>,
    assignments: &[EndpointAssignment],
    nodes: Vec<Node>,
    frame: &LocalTangentPlane,
) -> FinalGraph {
    let by_row: AHashMap<usize, &EndpointAssignment> =
        assignments.iter().map(|a| (a.edge, a)).collect();

    let total = edges.len();
    let mut final_edges = Vec::with_capacity(total);
    for (idx, edge) in edges.into_iter().enumerate() {
        let endpoints = if edge.needs_resolution() {
            by_row.get(&idx).map(|a| (a.u, a.v))
        } else {
            edge.u.zip(edge.v)
        };
        let Some((u, v)) = endpoints else {
            continue;
        };

        let geometry: LineString<f64> = edge
            .geometry
            .0
            .iter()
            .map(|&c| to_output(frame, c))
            .collect();

        final_edges.push(GraphEdge {
            id: EdgeId(final_edges.len() as u64 + 1),
            u,
            v,
            geometry,
            attributes: edge.attributes,
            custom: edge.custom,
            split: edge.split,
        });
    }

    let final_nodes: Vec<Node> = nodes
        .into_iter()
        .map(|node| {
            let c = to_output(frame, node.coord());
            Node::new(node.id, c.x, c.y)
        })
        .collect();

    info!(
        "Finalized graph: {} nodes, {} of {} edges kept",
        final_nodes.len(),
        final_edges.len(),
        total
    );

    FinalGraph {
        nodes: final_nodes,
        edges: final_edges,
    }
}
