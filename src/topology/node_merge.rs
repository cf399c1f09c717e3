use crate::topology::node_id_allocator::NodeIdAllocator;
use crate::topology::types::{Node, NodeId};
use geo::{Coord, Intersects, Polygon};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use tracing::{debug, info};

pub type NodeTree = RTree<GeomWithData<[f64; 2], NodeId>>;

/// Build R-tree for nodes
pub fn build_node_rtree(nodes: &[Node]) -> NodeTree {
    let items: Vec<_> = nodes
        .iter()
        .map(|node| GeomWithData::new([node.x, node.y], node.id))
        .collect();

    RTree::bulk_load(items)
}

pub struct JunctionConsolidation {
    pub points: Vec<Coord>,
    /// Candidates moved onto a reference node
    pub snapped_to_reference: usize,
    /// Candidates folded into an earlier candidate
    pub merged_duplicates: usize,
}

/// Settle junction candidates before any edge is cut.
///
/// A candidate within `snap_tolerance` of a reference node takes that node's
/// exact position, so the splitter and the merger agree that the junction is
/// the node. Candidates within `coincidence_tolerance` of an earlier one are
/// dropped. Order of first occurrence is kept.
pub fn consolidate_junctions(
    junctions: &[Coord],
    reference_nodes: &[Node],
    snap_tolerance: f64,
    coincidence_tolerance: f64,
) -> JunctionConsolidation {
    let reference_tree = build_node_rtree(reference_nodes);
    let snap_2 = snap_tolerance * snap_tolerance;
    let coincidence_2 = coincidence_tolerance * coincidence_tolerance;

    let mut kept: RTree<[f64; 2]> = RTree::new();
    let mut points = Vec::with_capacity(junctions.len());
    let mut snapped_to_reference = 0;
    let mut merged_duplicates = 0;

    for &candidate in junctions {
        let mut point = candidate;
        let nearest = reference_tree
            .locate_within_distance([point.x, point.y], snap_2)
            .min_by(|a, b| {
                let da = (a.geom()[0] - point.x).powi(2) + (a.geom()[1] - point.y).powi(2);
                let db = (b.geom()[0] - point.x).powi(2) + (b.geom()[1] - point.y).powi(2);
                da.total_cmp(&db).then(a.data.cmp(&b.data))
            });
        if let Some(node) = nearest {
            let [x, y] = *node.geom();
            if x != point.x || y != point.y {
                snapped_to_reference += 1;
            }
            point = Coord { x, y };
        }

        if kept
            .locate_within_distance([point.x, point.y], coincidence_2)
            .next()
            .is_some()
        {
            merged_duplicates += 1;
            continue;
        }
        kept.insert([point.x, point.y]);
        points.push(point);
    }

    debug!(
        "Junction consolidation: {} in, {} out ({} snapped to reference nodes, {} near-duplicates)",
        junctions.len(),
        points.len(),
        snapped_to_reference,
        merged_duplicates
    );
    JunctionConsolidation {
        points,
        snapped_to_reference,
        merged_duplicates,
    }
}

pub struct NodeMergeOutcome {
    /// Reference nodes in provider order, then new junction nodes
    pub nodes: Vec<Node>,
    pub new_nodes: usize,
    /// Candidates dropped in favour of an existing reference node
    pub coincident: usize,
    /// Candidates dropped for lying outside the region
    pub outside_region: usize,
}

/// Union junction candidates with the reference node table.
///
/// A candidate within `tolerance` of a reference node is that node; a
/// candidate outside `region` has no reference coverage and is skipped.
/// Every other candidate becomes a node with a freshly allocated ID.
pub fn merge_junction_nodes(
    junctions: &[Coord],
    reference_nodes: Vec<Node>,
    region: &Polygon<f64>,
    tolerance: f64,
) -> NodeMergeOutcome {
    let tree = build_node_rtree(&reference_nodes);
    let mut allocator = NodeIdAllocator::after(reference_nodes.iter().map(|n| &n.id));
    let tolerance_2 = tolerance * tolerance;

    let mut coincident = 0;
    let mut outside_region = 0;
    let mut new_nodes = Vec::new();
    for &point in junctions {
        if tree
            .locate_within_distance([point.x, point.y], tolerance_2)
            .next()
            .is_some()
        {
            coincident += 1;
            continue;
        }
        if !region.intersects(&point) {
            outside_region += 1;
            continue;
        }
        new_nodes.push(Node::new(allocator.next(), point.x, point.y));
    }

    info!(
        "Merged nodes: {} reference + {} new ({} coincident, {} outside region)",
        reference_nodes.len(),
        new_nodes.len(),
        coincident,
        outside_region
    );
    debug!("Next free node id: {}", allocator.current());

    let new_count = new_nodes.len();
    let mut nodes = reference_nodes;
    nodes.extend(new_nodes);
    NodeMergeOutcome {
        nodes,
        new_nodes: new_count,
        coincident,
        outside_region,
    }
}
