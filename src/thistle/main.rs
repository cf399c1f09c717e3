// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Thistle: builds a routable OSM XML network from a reference road network
//! plus user-drawn lines.

use anyhow::{Context, Result, bail};
use clap::Parser;
use geo::{Rect, coord};
use roadweave::custom_input::{load_custom_lines, load_region};
use roadweave::provider::{CachedProvider, GeoJsonFileProvider};
use roadweave::topology::build_with_provider;
use roadweave::topology::config::BuildConfig;
use roadweave::topology::tags::NetworkPreset;
use roadweave::topology::types::{CustomLines, TagMap};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Reference network nodes (GeoJSON Points with `osmid`).
    #[arg(long, env = "REFERENCE_NODES")]
    nodes: PathBuf,

    /// Reference network edges (GeoJSON LineStrings with `u` and `v`).
    #[arg(long, env = "REFERENCE_EDGES")]
    edges: PathBuf,

    /// User-drawn lines (GeoJSON FeatureCollection). Omit to rebuild the
    /// reference network alone.
    #[arg(long, env = "CUSTOM_LINES")]
    custom: Option<PathBuf>,

    /// Region of interest as a GeoJSON polygon.
    #[arg(long, conflicts_with = "bbox")]
    region: Option<PathBuf>,

    /// Region of interest as min_lon,min_lat,max_lon,max_lat.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,

    /// Where the OSM XML document is written.
    #[arg(long, short, env = "OUTPUT_OSM", default_value = "network.osm")]
    output: PathBuf,

    /// Road class applied to custom lines: motorway, residential or path.
    #[arg(long)]
    network: Option<String>,

    /// Speed limit for custom lines, in mph.
    #[arg(long)]
    mph: Option<u32>,

    /// Extra tag for custom lines as key=value; repeatable, wins over --network.
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// RON build configuration.
    #[arg(long, env = "ROADWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Also write the build statistics as JSON here.
    #[arg(long)]
    stats: Option<PathBuf>,
}

fn parse_tag(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid tag '{}', expected key=value", raw),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BuildConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BuildConfig::default(),
    };

    let region = match (&args.region, &args.bbox) {
        (Some(path), _) => load_region(path)
            .with_context(|| format!("Failed to load region {}", path.display()))?,
        (None, Some(bbox)) => match bbox.as_slice() {
            &[min_x, min_y, max_x, max_y] => {
                Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon()
            }
            _ => bail!("--bbox takes exactly four numbers"),
        },
        (None, None) => bail!("One of --region or --bbox is required"),
    };

    let custom = match &args.custom {
        Some(path) => load_custom_lines(path)
            .with_context(|| format!("Failed to load custom lines {}", path.display()))?,
        None => CustomLines::wgs84(Vec::new()),
    };

    let mut tags = TagMap::new();
    if let Some(network) = &args.network {
        let preset = network
            .parse::<NetworkPreset>()
            .map_err(|e| anyhow::anyhow!(e))?;
        tags.extend(preset.tags(args.mph));
    } else if args.mph.is_some() {
        warn!("--mph has no effect without --network");
    }
    for raw in &args.tags {
        let (key, value) = parse_tag(raw)?;
        tags.insert(key, value);
    }

    let provider = CachedProvider::new(GeoJsonFileProvider::new(&args.nodes, &args.edges));
    let report = build_with_provider(&provider, region, custom, tags, &args.output, &config)
        .with_context(|| format!("Failed to build network into {}", args.output.display()))?;

    let stats = &report.stats;
    info!(
        "Done: {} nodes, {} edges written to {}",
        stats.final_nodes,
        stats.final_edges,
        args.output.display()
    );
    if let Some(path) = &args.stats {
        let json = serde_json::to_string_pretty(stats)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write stats {}", path.display()))?;
    }
    if !report.warnings.is_empty() {
        warn!(
            "{} edges dropped for unresolved endpoints, {} for missing nodes",
            report.unresolved_endpoint_count(),
            report.referential_integrity_count()
        );
    }

    Ok(())
}
