use crate::topology::types::{CustomLine, Edge, ReferenceEdge};
use tracing::debug;

/// Union reference edges and custom lines into one working edge table.
///
/// Reference edges come first, in provider order, keeping their endpoints.
/// Every part of a multi-part custom line becomes its own edge with no
/// endpoints and `custom = true`. Nothing is dropped here.
pub fn combine_edges(reference: Vec<ReferenceEdge>, custom: Vec<CustomLine>) -> Vec<Edge> {
    let reference_count = reference.len();
    let mut edges: Vec<Edge> = reference
        .into_iter()
        .map(|edge| Edge {
            u: Some(edge.u),
            v: Some(edge.v),
            geometry: edge.geometry,
            attributes: edge.attributes,
            custom: false,
            split: false,
        })
        .collect();

    for line in custom {
        let CustomLine {
            geometry,
            attributes,
        } = line;
        for part in geometry.0 {
            edges.push(Edge {
                u: None,
                v: None,
                geometry: part,
                attributes: attributes.clone(),
                custom: true,
                split: false,
            });
        }
    }

    debug!(
        "Combined {} reference edges with {} custom line parts",
        reference_count,
        edges.len() - reference_count
    );
    edges
}
