#[cfg(test)]
mod tests {
    use crate::provider::InMemoryProvider;
    use crate::topology::config::BuildConfig;
    use crate::topology::crs::lat_lng_to_web_merc;
    use crate::topology::error::{BuildWarning, ProjectionError, TopologyError};
    use crate::topology::osm_xml;
    use crate::topology::types::{
        CustomLine, CustomLines, EdgeAttributes, EdgeId, FinalGraph, GraphEdge, Node, NodeId,
        ReferenceEdge, ReferenceNetwork, TagMap,
    };
    use crate::topology::{BuildRequest, build_graph, build_network, build_with_provider};
    use ahash::AHashSet;
    use geo::{Coord, LineString, Polygon, polygon};
    use std::path::PathBuf;

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
        ]
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roadweave-pipeline-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A(0,0) -> B(1,1), with a 45 mph limit.
    fn diagonal_reference() -> ReferenceNetwork {
        ReferenceNetwork {
            crs: Some("EPSG:4326".to_string()),
            nodes: vec![Node::new(NodeId(1), 0.0, 0.0), Node::new(NodeId(2), 1.0, 1.0)],
            edges: vec![ReferenceEdge {
                u: NodeId(1),
                v: NodeId(2),
                geometry: LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
                attributes: EdgeAttributes::from_pairs([("highway", "primary"), ("maxspeed", "45 mph")]),
            }],
        }
    }

    fn crossing_custom() -> CustomLines {
        CustomLines::wgs84(vec![CustomLine::new(LineString::from(vec![(0.0, 1.0), (1.0, 0.0)]))])
    }

    fn small_reference() -> ReferenceNetwork {
        ReferenceNetwork {
            crs: Some("EPSG:4326".to_string()),
            nodes: vec![
                Node::new(NodeId(240_001), -122.4194, 37.7749),
                Node::new(NodeId(240_002), -122.4180, 37.7749),
                Node::new(NodeId(240_003), -122.4180, 37.7760),
            ],
            edges: vec![
                ReferenceEdge {
                    u: NodeId(240_001),
                    v: NodeId(240_002),
                    geometry: LineString::from(vec![(-122.4194, 37.7749), (-122.4180, 37.7749)]),
                    attributes: EdgeAttributes::from_pairs([("highway", "residential"), ("name", "Fell St")]),
                },
                ReferenceEdge {
                    u: NodeId(240_002),
                    v: NodeId(240_003),
                    geometry: LineString::from(vec![
                        (-122.4180, 37.7749),
                        (-122.4179, 37.7755),
                        (-122.4180, 37.7760),
                    ]),
                    attributes: EdgeAttributes::from_pairs([("highway", "service"), ("service", "alley")]),
                },
            ],
        }
    }

    fn small_region() -> Polygon<f64> {
        polygon![
            (x: -122.43, y: 37.77),
            (x: -122.41, y: 37.77),
            (x: -122.41, y: 37.78),
            (x: -122.43, y: 37.78),
        ]
    }

    fn request(region: Polygon<f64>, custom: CustomLines, reference: ReferenceNetwork) -> BuildRequest {
        BuildRequest {
            region,
            custom,
            reference,
            tags: TagMap::new(),
        }
    }

    fn assert_referential_integrity(graph: &FinalGraph) {
        let ids: AHashSet<NodeId> = graph.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), graph.nodes.len(), "node ids must be unique");
        for edge in &graph.edges {
            assert!(ids.contains(&edge.u), "edge {} has dangling u", edge.id);
            assert!(ids.contains(&edge.v), "edge {} has dangling v", edge.id);
            assert_ne!(edge.u, edge.v, "edge {} is a self-loop", edge.id);
        }
        let edge_ids: Vec<u64> = graph.edges.iter().map(|e| e.id.0).collect();
        assert_eq!(edge_ids, (1..=graph.edges.len() as u64).collect::<Vec<_>>());
    }

    fn node_at(graph: &FinalGraph, x: f64, y: f64) -> Option<NodeId> {
        graph
            .nodes
            .iter()
            .find(|n| (n.x - x).abs() < 1e-6 && (n.y - y).abs() < 1e-6)
            .map(|n| n.id)
    }

    #[test]
    fn test_crossing_splits_both_lines_at_shared_node() {
        let (graph, report) = build_graph(
            request(square(-0.5, 1.5), crossing_custom(), diagonal_reference()),
            &BuildConfig::default(),
        )
        .unwrap();

        assert_referential_integrity(&graph);
        let crossing = node_at(&graph, 0.5, 0.5).expect("node at the crossing");
        assert!(crossing.0 > 2, "crossing node gets a fresh id");

        let reference: Vec<&GraphEdge> = graph.edges.iter().filter(|e| !e.custom).collect();
        assert_eq!(reference.len(), 2);
        assert_eq!((reference[0].u, reference[0].v), (NodeId(1), crossing));
        assert_eq!((reference[1].u, reference[1].v), (crossing, NodeId(2)));
        assert!(reference.iter().all(|e| e.split));

        let custom: Vec<&GraphEdge> = graph.edges.iter().filter(|e| e.custom).collect();
        assert_eq!(custom.len(), 2);
        assert!(custom.iter().all(|e| e.u == crossing || e.v == crossing));

        // A, B, the crossing and the two custom ends
        assert_eq!(graph.nodes.len(), 5);
        assert!(graph.edges.len() >= 3);
        assert!(report.warnings.is_empty());
        assert_eq!(report.stats.edges_split, 2);
    }

    #[test]
    fn test_crossing_just_off_a_reference_node_joins_that_node() {
        // about 0.56 m east of A: beyond node coincidence, inside the split buffer
        let reference = ReferenceNetwork {
            crs: Some("EPSG:4326".to_string()),
            nodes: vec![Node::new(NodeId(1), 0.0, 0.0), Node::new(NodeId(2), 0.001, 0.0)],
            edges: vec![ReferenceEdge {
                u: NodeId(1),
                v: NodeId(2),
                geometry: LineString::from(vec![(0.0, 0.0), (0.001, 0.0)]),
                attributes: EdgeAttributes::from_pairs([("highway", "residential")]),
            }],
        };
        let custom = CustomLines::wgs84(vec![CustomLine::new(LineString::from(vec![
            (0.000005, -0.0005),
            (0.000005, 0.0005),
        ]))]);

        let (graph, report) = build_graph(
            request(square(-0.01, 0.01), custom, reference),
            &BuildConfig::default(),
        )
        .unwrap();

        assert_referential_integrity(&graph);
        assert!(report.warnings.is_empty());
        assert_eq!(report.stats.junctions_snapped_to_reference, 1);

        let reference: Vec<&GraphEdge> = graph.edges.iter().filter(|e| !e.custom).collect();
        assert_eq!(reference.len(), 1);
        assert_eq!((reference[0].u, reference[0].v), (NodeId(1), NodeId(2)));

        let custom: Vec<&GraphEdge> = graph.edges.iter().filter(|e| e.custom).collect();
        assert_eq!(custom.len(), 2);
        assert!(custom.iter().all(|e| e.u == NodeId(1) || e.v == NodeId(1)));

        let reference_nodes: AHashSet<NodeId> = reference.iter().flat_map(|e| [e.u, e.v]).collect();
        let custom_nodes: AHashSet<NodeId> = custom.iter().flat_map(|e| [e.u, e.v]).collect();
        assert!(reference_nodes.intersection(&custom_nodes).next().is_some());

        // A, B and the two custom ends; nothing minted at the crossing
        assert_eq!(graph.nodes.len(), 4);
        let used: AHashSet<NodeId> = graph.edges.iter().flat_map(|e| [e.u, e.v]).collect();
        assert!(graph.nodes.iter().all(|n| used.contains(&n.id)), "no orphan nodes");
    }

    #[test]
    fn test_far_custom_edge_is_dropped_once() {
        let custom = CustomLines::wgs84(vec![CustomLine::new(LineString::from(vec![
            (-121.0, 38.5),
            (-120.99, 38.5),
        ]))]);
        let baseline = build_graph(
            request(small_region(), CustomLines::wgs84(Vec::new()), small_reference()),
            &BuildConfig::default(),
        )
        .unwrap()
        .0;

        let (graph, report) = build_graph(
            request(small_region(), custom, small_reference()),
            &BuildConfig::default(),
        )
        .unwrap();

        assert_eq!(report.unresolved_endpoint_count(), 1);
        assert_eq!(report.stats.endpoint_edges_dropped, 1);
        assert_eq!(graph, baseline);
    }

    #[test]
    fn test_empty_custom_input_reserializes_reference() {
        let reference = small_reference();
        let (graph, report) = build_graph(
            request(small_region(), CustomLines::wgs84(Vec::new()), reference.clone()),
            &BuildConfig::default(),
        )
        .unwrap();

        let expected = FinalGraph {
            nodes: reference.nodes.clone(),
            edges: reference
                .edges
                .iter()
                .enumerate()
                .map(|(i, edge)| GraphEdge {
                    id: EdgeId(i as u64 + 1),
                    u: edge.u,
                    v: edge.v,
                    geometry: edge.geometry.clone(),
                    attributes: edge.attributes.clone(),
                    custom: false,
                    split: false,
                })
                .collect(),
        };

        assert_eq!(graph.custom_edge_count(), 0);
        assert!(report.warnings.is_empty());
        assert_eq!(
            osm_xml::to_bytes(&graph, "g").unwrap(),
            osm_xml::to_bytes(&expected, "g").unwrap()
        );
    }

    #[test]
    fn test_tag_map_only_reaches_custom_edges() {
        let mut req = request(square(-0.5, 1.5), crossing_custom(), diagonal_reference());
        req.tags = TagMap::from([("maxspeed".to_string(), "30 mph".to_string())]);

        let (graph, report) = build_graph(req, &BuildConfig::default()).unwrap();

        assert!(report.stats.custom_edges_tagged > 0);
        for edge in &graph.edges {
            let expected = if edge.custom { "30 mph" } else { "45 mph" };
            assert_eq!(edge.attributes.maxspeed.as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_drop_accounting() {
        let custom = CustomLines::wgs84(vec![
            // touches the region, ends far outside it
            CustomLine::new(LineString::from(vec![(-122.4194, 37.7749), (-121.0, 39.0)])),
            CustomLine::new(LineString::from(vec![(-122.4190, 37.7740), (-122.4185, 37.7755)])),
            CustomLine::new(LineString::from(vec![(-100.0, 10.0), (-100.1, 10.1)])),
        ]);

        let (graph, report) = build_graph(
            request(small_region(), custom, small_reference()),
            &BuildConfig::default(),
        )
        .unwrap();

        let stats = &report.stats;
        assert_eq!(
            stats.endpoint_edges_considered,
            stats.endpoint_edges_resolved + stats.endpoint_edges_dropped
        );
        assert_eq!(report.unresolved_endpoint_count(), stats.endpoint_edges_dropped);
        assert!(stats.endpoint_edges_dropped >= 2);
        assert_referential_integrity(&graph);
    }

    #[test]
    fn test_dangling_reference_edge_is_dropped_with_warning() {
        let mut reference = small_reference();
        reference.edges.push(ReferenceEdge {
            u: NodeId(240_003),
            v: NodeId(999_999),
            geometry: LineString::from(vec![(-122.4180, 37.7760), (-122.4170, 37.7760)]),
            attributes: EdgeAttributes::default(),
        });

        let (graph, report) = build_graph(
            request(small_region(), CustomLines::wgs84(Vec::new()), reference),
            &BuildConfig::default(),
        )
        .unwrap();

        assert_eq!(graph.edges.len(), 2);
        assert_eq!(
            report.warnings,
            vec![BuildWarning::ReferentialIntegrity {
                edge: EdgeId(3),
                missing: NodeId(999_999),
            }]
        );
    }

    #[test]
    fn test_web_mercator_custom_input_is_reprojected() {
        let to_merc = |lon: f64, lat: f64| {
            let (x, y) = lat_lng_to_web_merc(lon, lat);
            Coord { x, y }
        };
        let custom = CustomLines {
            crs: Some("EPSG:3857".to_string()),
            lines: vec![CustomLine::new(LineString::new(vec![to_merc(0.0, 1.0), to_merc(1.0, 0.0)]))],
        };

        let (graph, _) = build_graph(
            request(square(-0.5, 1.5), custom, diagonal_reference()),
            &BuildConfig::default(),
        )
        .unwrap();

        assert!(node_at(&graph, 0.0, 1.0).is_some());
        assert!(node_at(&graph, 1.0, 0.0).is_some());
        assert_eq!(graph.custom_edge_count(), 2);
    }

    #[test]
    fn test_fatal_inputs() {
        let mut reference = small_reference();
        reference.crs = None;
        let result = build_graph(
            request(small_region(), CustomLines::wgs84(Vec::new()), reference),
            &BuildConfig::default(),
        );
        assert!(matches!(
            result,
            Err(TopologyError::Projection(ProjectionError::Missing { .. }))
        ));

        let unknown = CustomLines {
            crs: Some("EPSG:27700".to_string()),
            lines: Vec::new(),
        };
        let result = build_graph(request(small_region(), unknown, small_reference()), &BuildConfig::default());
        assert!(matches!(
            result,
            Err(TopologyError::Projection(ProjectionError::Unrecognized { .. }))
        ));

        let empty = ReferenceNetwork {
            crs: Some("EPSG:4326".to_string()),
            ..Default::default()
        };
        let result = build_graph(
            request(small_region(), CustomLines::wgs84(Vec::new()), empty),
            &BuildConfig::default(),
        );
        assert!(matches!(result, Err(TopologyError::EmptyInput)));
    }

    #[test]
    fn test_repeated_builds_write_identical_files() {
        let dir = temp_dir();
        let first = dir.join("first.osm");
        let second = dir.join("second.osm");

        for output in [&first, &second] {
            build_network(
                request(square(-0.5, 1.5), crossing_custom(), diagonal_reference()),
                output,
                &BuildConfig::default(),
            )
            .unwrap();
        }

        let first_bytes = std::fs::read(&first).unwrap();
        assert!(!first_bytes.is_empty());
        assert_eq!(first_bytes, std::fs::read(&second).unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unwritable_output_is_fatal() {
        let dir = temp_dir();
        let output = dir.join("no-such-dir").join("network.osm");

        let result = build_network(
            request(small_region(), CustomLines::wgs84(Vec::new()), small_reference()),
            &output,
            &BuildConfig::default(),
        );

        assert!(matches!(result, Err(TopologyError::Serialization { .. })));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_build_with_provider() {
        let dir = temp_dir();
        let output = dir.join("network.osm");
        let mut reference = small_reference();
        // outside the region's bounding box, clipped away by the provider
        reference.nodes.push(Node::new(NodeId(7), 10.0, 10.0));
        reference.nodes.push(Node::new(NodeId(8), 10.001, 10.0));
        reference.edges.push(ReferenceEdge {
            u: NodeId(7),
            v: NodeId(8),
            geometry: LineString::from(vec![(10.0, 10.0), (10.001, 10.0)]),
            attributes: EdgeAttributes::default(),
        });
        let provider = InMemoryProvider::new(reference);

        let report = build_with_provider(
            &provider,
            small_region(),
            CustomLines::wgs84(Vec::new()),
            TagMap::new(),
            &output,
            &BuildConfig::default(),
        )
        .unwrap();

        assert_eq!(report.stats.reference_edges, 2);
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text.matches("<way ").count(), 2);
        assert!(!text.contains("id=\"7\""));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
