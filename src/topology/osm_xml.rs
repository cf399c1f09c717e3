// ===========================================================================
// OSM XML interchange writer
// ===========================================================================
//
// Emits the finished graph in the OSM 0.6 XML dialect the routing engine
// ingests:
//
//   <?xml version="1.0" encoding="UTF-8"?>
//   <osm version="0.6" generator="...">
//     <bounds minlat=".." minlon=".." maxlat=".." maxlon=".."/>
//     <node id=".." lat=".." lon=".."/>
//     <way id="..">
//       <nd ref="u"/>
//       <nd ref="v"/>
//       <tag k="highway" v=".."/>
//     </way>
//   </osm>
//
// Element order follows table order, so identical tables give identical bytes.
// ===========================================================================

use crate::topology::crs::round7;
use crate::topology::types::FinalGraph;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// Union extent of node positions and edge geometry, `None` for an empty graph.
pub fn graph_bounds(graph: &FinalGraph) -> Option<Bounds> {
    let coords = graph
        .nodes
        .iter()
        .map(|node| node.coord())
        .chain(graph.edges.iter().flat_map(|edge| edge.geometry.0.iter().copied()));

    let mut bounds: Option<Bounds> = None;
    for c in coords {
        let b = bounds.get_or_insert(Bounds {
            min_lat: c.y,
            min_lon: c.x,
            max_lat: c.y,
            max_lon: c.x,
        });
        b.min_lat = b.min_lat.min(c.y);
        b.min_lon = b.min_lon.min(c.x);
        b.max_lat = b.max_lat.max(c.y);
        b.max_lon = b.max_lon.max(c.x);
    }
    bounds
}

fn coord_text(value: f64) -> String {
    format!("{:.7}", round7(value))
}

fn xml_err(err: quick_xml::Error) -> io::Error {
    io::Error::other(err)
}

/// Write the interchange document for `graph` to `out`.
pub fn write_document<W: Write>(graph: &FinalGraph, generator: &str, out: W) -> io::Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("osm").with_attributes([("version", "0.6"), ("generator", generator)]),
        ))
        .map_err(xml_err)?;

    if let Some(bounds) = graph_bounds(graph) {
        let (min_lat, min_lon) = (coord_text(bounds.min_lat), coord_text(bounds.min_lon));
        let (max_lat, max_lon) = (coord_text(bounds.max_lat), coord_text(bounds.max_lon));
        writer
            .write_event(Event::Empty(BytesStart::new("bounds").with_attributes([
                ("minlat", min_lat.as_str()),
                ("minlon", min_lon.as_str()),
                ("maxlat", max_lat.as_str()),
                ("maxlon", max_lon.as_str()),
            ])))
            .map_err(xml_err)?;
    }

    for node in &graph.nodes {
        let id = node.id.to_string();
        let (lat, lon) = (coord_text(node.y), coord_text(node.x));
        writer
            .write_event(Event::Empty(BytesStart::new("node").with_attributes([
                ("id", id.as_str()),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
            ])))
            .map_err(xml_err)?;
    }

    for edge in &graph.edges {
        let id = edge.id.to_string();
        writer
            .write_event(Event::Start(
                BytesStart::new("way").with_attributes([("id", id.as_str())]),
            ))
            .map_err(xml_err)?;
        for node_ref in [edge.u, edge.v] {
            let node_ref = node_ref.to_string();
            writer
                .write_event(Event::Empty(
                    BytesStart::new("nd").with_attributes([("ref", node_ref.as_str())]),
                ))
                .map_err(xml_err)?;
        }
        for (key, value) in edge.attributes.output_tags() {
            writer
                .write_event(Event::Empty(
                    BytesStart::new("tag").with_attributes([("k", key), ("v", value)]),
                ))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("way")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("osm")))
        .map_err(xml_err)?;

    let mut out = writer.into_inner();
    out.write_all(b"\n")?;
    out.flush()
}

/// Render the document into memory.
pub fn to_bytes(graph: &FinalGraph, generator: &str) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_document(graph, generator, &mut buffer)?;
    Ok(buffer)
}

fn temp_path_for(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "network.osm".to_string());
    output.with_file_name(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
}

/// Write the document to `output` atomically: a sibling temp file is written
/// and renamed over the target, and removed again if anything fails.
pub fn write_osm_file(graph: &FinalGraph, generator: &str, output: &Path) -> io::Result<()> {
    let temp_path = temp_path_for(output);
    debug!("Writing interchange document via {}", temp_path.display());

    let result = File::create(&temp_path)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            write_document(graph, generator, &mut out)?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, output));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
        return result;
    }

    info!(
        "Wrote {} nodes and {} ways to {}",
        graph.nodes.len(),
        graph.edges.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{EdgeAttributes, EdgeId, GraphEdge, Node, NodeId};
    use geo::LineString;

    fn sample_graph() -> FinalGraph {
        FinalGraph {
            nodes: vec![
                Node::new(NodeId(101), -122.4, 37.8),
                Node::new(NodeId(102), -122.399, 37.801),
            ],
            edges: vec![GraphEdge {
                id: EdgeId(1),
                u: NodeId(101),
                v: NodeId(102),
                geometry: LineString::from(vec![(-122.4, 37.8), (-122.4005, 37.8012), (-122.399, 37.801)]),
                attributes: EdgeAttributes::from_pairs([
                    ("service", "alley"),
                    ("name", "Ross & Co"),
                    ("highway", "service"),
                    ("oneway", "yes"),
                ]),
                custom: false,
                split: false,
            }],
        }
    }

    #[test]
    fn test_document_layout() {
        let text = String::from_utf8(to_bytes(&sample_graph(), "roadweave test").unwrap()).unwrap();

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("<osm version=\"0.6\" generator=\"roadweave test\">"));
        assert!(text.contains(
            "<bounds minlat=\"37.8000000\" minlon=\"-122.4005000\" maxlat=\"37.8012000\" maxlon=\"-122.3990000\"/>"
        ));
        assert!(text.contains("<node id=\"101\" lat=\"37.8000000\" lon=\"-122.4000000\"/>"));

        let way = &text[text.find("<way id=\"1\">").unwrap()..text.find("</way>").unwrap()];
        let nd_u = way.find("<nd ref=\"101\"/>").unwrap();
        let nd_v = way.find("<nd ref=\"102\"/>").unwrap();
        let highway = way.find("<tag k=\"highway\" v=\"service\"/>").unwrap();
        let oneway = way.find("<tag k=\"oneway\"").unwrap();
        let service = way.find("<tag k=\"service\"").unwrap();
        assert!(nd_u < nd_v && nd_v < highway && highway < oneway && oneway < service);
        assert!(!way.contains("name"));
        assert!(text.trim_end().ends_with("</osm>"));
    }

    #[test]
    fn test_serialization_is_byte_identical() {
        let graph = sample_graph();
        assert_eq!(
            to_bytes(&graph, "g").unwrap(),
            to_bytes(&graph, "g").unwrap()
        );
    }

    #[test]
    fn test_empty_graph_has_no_bounds() {
        let text = String::from_utf8(to_bytes(&FinalGraph::default(), "g").unwrap()).unwrap();
        assert!(!text.contains("<bounds"));
        assert!(text.contains("</osm>"));
    }

    #[test]
    fn test_unwritable_output_leaves_no_file() {
        let dir = std::env::temp_dir().join(format!("roadweave-{}", uuid::Uuid::new_v4()));
        let output = dir.join("missing").join("network.osm");

        assert!(write_osm_file(&sample_graph(), "g", &output).is_err());
        assert!(!output.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_atomic_write_replaces_target() {
        let dir = std::env::temp_dir().join(format!("roadweave-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let output = dir.join("network.osm");
        fs::write(&output, "stale").unwrap();

        write_osm_file(&sample_graph(), "g", &output).unwrap();

        let written = fs::read(&output).unwrap();
        assert_eq!(written, to_bytes(&sample_graph(), "g").unwrap());
        let leftovers = fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 1);
        fs::remove_dir_all(&dir).unwrap();
    }
}
