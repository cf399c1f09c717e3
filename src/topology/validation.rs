use crate::topology::error::BuildWarning;
use crate::topology::types::{EdgeId, FinalGraph};
use ahash::AHashSet;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub self_loops_removed: usize,
    pub dangling_removed: usize,
    pub warnings: Vec<BuildWarning>,
}

/// Final integrity pass over the finished tables.
///
/// Removes self-loops, and removes any edge whose `u` or `v` is missing from
/// the node table, recording a warning for each missing reference. Survivors
/// are renumbered `1..=N` in their existing order; warnings carry the id the
/// edge had before the drop.
pub fn validate_graph(graph: &mut FinalGraph) -> ValidationOutcome {
    let known: AHashSet<_> = graph.nodes.iter().map(|node| node.id).collect();
    let mut outcome = ValidationOutcome::default();

    graph.edges.retain(|edge| {
        if edge.u == edge.v {
            outcome.self_loops_removed += 1;
            return false;
        }

        let mut intact = true;
        for endpoint in [edge.u, edge.v] {
            if !known.contains(&endpoint) {
                warn!("Edge {} references missing node {}", edge.id, endpoint);
                outcome.warnings.push(BuildWarning::ReferentialIntegrity {
                    edge: edge.id,
                    missing: endpoint,
                });
                intact = false;
            }
        }
        if !intact {
            outcome.dangling_removed += 1;
        }
        intact
    });

    if outcome.self_loops_removed + outcome.dangling_removed > 0 {
        for (index, edge) in graph.edges.iter_mut().enumerate() {
            edge.id = EdgeId(index as u64 + 1);
        }
    }

    info!(
        "Validation: {} self-loops and {} dangling edges removed, {} edges remain",
        outcome.self_loops_removed,
        outcome.dangling_removed,
        graph.edges.len()
    );
    outcome
}
