//! Loading user-drawn lines from GeoJSON.

use crate::topology::types::{CustomLine, CustomLines, EdgeAttributes};
use geo::{Coord, LineString, MultiLineString, Polygon};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// RFC 7946 documents are WGS84 unless they say otherwise.
pub const DEFAULT_GEOJSON_CRS: &str = "EPSG:4326";

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("feature {index} has unsupported geometry type '{kind}'")]
    UnsupportedGeometry { index: usize, kind: String },
    #[error("expected a FeatureCollection")]
    NotAFeatureCollection,
    #[error("document contains no geometry")]
    MissingGeometry,
}

/// The legacy `crs.properties.name` member, if the document carries one.
pub(crate) fn declared_crs(foreign_members: Option<&JsonObject>) -> Option<String> {
    foreign_members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Positions to a line; `None` when a position lacks x/y or there are fewer than two.
pub(crate) fn line_from_positions(positions: &[Vec<f64>]) -> Option<LineString<f64>> {
    if positions.len() < 2 {
        return None;
    }
    positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect::<Option<Vec<Coord>>>()
        .map(LineString::new)
}

/// Feature properties as pass-through attributes; nulls are skipped.
pub(crate) fn attributes_from_properties(properties: Option<&JsonObject>) -> EdgeAttributes {
    let pairs = properties.into_iter().flatten().filter_map(|(key, value)| {
        let text = match value {
            JsonValue::Null => return None,
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some((key.clone(), text))
    });
    EdgeAttributes::from_pairs(pairs)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Parse a custom-line FeatureCollection already in memory.
///
/// Features without geometry are skipped. Degenerate line parts (fewer than
/// two positions) are left out of their feature.
pub fn parse_custom_lines(text: &str) -> Result<CustomLines, InputError> {
    let GeoJson::FeatureCollection(FeatureCollection {
        features,
        foreign_members,
        ..
    }) = text.parse::<GeoJson>()?
    else {
        return Err(InputError::NotAFeatureCollection);
    };

    let crs = declared_crs(foreign_members.as_ref()).unwrap_or_else(|| DEFAULT_GEOJSON_CRS.to_string());

    let mut lines = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            debug!("Feature {} has no geometry, skipping", index);
            continue;
        };
        let parts: Vec<LineString<f64>> = match &geometry.value {
            Value::LineString(positions) => line_from_positions(positions).into_iter().collect(),
            Value::MultiLineString(parts) => parts
                .iter()
                .filter_map(|positions| line_from_positions(positions))
                .collect(),
            other => {
                return Err(InputError::UnsupportedGeometry {
                    index,
                    kind: value_kind(other).to_string(),
                });
            }
        };
        if parts.is_empty() {
            debug!("Feature {} has no usable line parts, skipping", index);
            continue;
        }

        lines.push(CustomLine {
            geometry: MultiLineString::new(parts),
            attributes: attributes_from_properties(feature.properties.as_ref()),
        });
    }

    info!("Loaded {} custom line features ({})", lines.len(), crs);
    Ok(CustomLines {
        crs: Some(crs),
        lines,
    })
}

/// First Polygon in a GeoJSON document (bare geometry, Feature or
/// FeatureCollection), used as the build region. Holes are kept.
pub fn parse_region(text: &str) -> Result<Polygon<f64>, InputError> {
    let geometries: Vec<Value> = match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => vec![geometry.value],
        GeoJson::Feature(feature) => feature.geometry.into_iter().map(|g| g.value).collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|feature| feature.geometry.map(|g| g.value))
            .collect(),
    };

    let first = geometries.first().ok_or(InputError::MissingGeometry)?;
    let rings = match first {
        Value::Polygon(rings) => rings,
        Value::MultiPolygon(polygons) if !polygons.is_empty() => &polygons[0],
        other => {
            return Err(InputError::UnsupportedGeometry {
                index: 0,
                kind: value_kind(other).to_string(),
            });
        }
    };
    let mut rings = rings.iter().filter_map(|ring| line_from_positions(ring));
    let exterior = rings.next().ok_or_else(|| InputError::UnsupportedGeometry {
        index: 0,
        kind: "empty Polygon".to_string(),
    })?;
    Ok(Polygon::new(exterior, rings.collect()))
}

pub fn load_region(path: &Path) -> Result<Polygon<f64>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_region(&text)
}

/// Load a custom-line FeatureCollection from disk.
pub fn load_custom_lines(path: &Path) -> Result<CustomLines, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_custom_lines(&text)
}
