// ===========================================================================
// CRS normalisation and the local working frame
// ===========================================================================
use crate::topology::error::ProjectionError;
use crate::topology::types::{CustomLines, Node, ReferenceNetwork};
use geo::{Centroid, Coord, CoordsIter, MapCoords, Polygon};
use std::str::FromStr;

pub const EARTH_RADIUS: f64 = 6378137.0;

pub const WGS84_NAME: &str = "EPSG:4326";

/// Coordinate references the builder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic lon/lat, EPSG:4326 / OGC CRS84
    Wgs84,
    /// Spherical Web Mercator, EPSG:3857
    WebMercator,
}

impl FromStr for Crs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        // URN forms: urn:ogc:def:crs:EPSG::4326, urn:ogc:def:crs:OGC:1.3:CRS84
        let code = normalized.rsplit(':').next().unwrap_or("");
        let authority_is_epsg = normalized.contains("EPSG");
        match code {
            "CRS84" => Ok(Crs::Wgs84),
            "4326" if authority_is_epsg || normalized == "4326" => Ok(Crs::Wgs84),
            "3857" | "900913" | "3785" if authority_is_epsg || normalized == code => {
                Ok(Crs::WebMercator)
            }
            _ => Err(format!("Unknown coordinate reference: '{}'", s)),
        }
    }
}

/// Convert Web Mercator (EPSG:3857) to lat/lng (EPSG:4326)
/// Input: (x, y) in meters
/// Output: (longitude, latitude) in degrees
pub fn web_merc_to_lat_lng(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

/// Convert lat/lng (EPSG:4326) to Web Mercator (EPSG:3857)
pub fn lat_lng_to_web_merc(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * ((std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan()).ln();
    (x, y)
}

fn to_wgs84(crs: Crs, c: Coord) -> Coord {
    match crs {
        Crs::Wgs84 => c,
        Crs::WebMercator => {
            let (x, y) = web_merc_to_lat_lng(c.x, c.y);
            Coord { x, y }
        }
    }
}

fn resolve(declared: Option<&str>, collection: &'static str) -> Result<Crs, ProjectionError> {
    let declared = declared.ok_or(ProjectionError::Missing { collection })?;
    declared
        .parse::<Crs>()
        .map_err(|_| ProjectionError::Unrecognized {
            collection,
            crs: declared.to_string(),
        })
}

fn check_finite(
    mut coords: impl Iterator<Item = Coord>,
    collection: &'static str,
    crs: &str,
) -> Result<(), ProjectionError> {
    if coords.all(|c| c.x.is_finite() && c.y.is_finite()) {
        Ok(())
    } else {
        Err(ProjectionError::NonFinite {
            collection,
            crs: crs.to_string(),
        })
    }
}

/// Reproject the custom collection to WGS84 if it is not already there.
pub fn normalize_custom(custom: CustomLines) -> Result<CustomLines, ProjectionError> {
    const COLLECTION: &str = "custom edge collection";
    let crs = resolve(custom.crs.as_deref(), COLLECTION)?;
    let declared = custom.crs.clone().unwrap_or_default();

    let mut lines = custom.lines;
    if crs != Crs::Wgs84 {
        tracing::info!("Reprojecting {} custom features from {}", lines.len(), declared);
        for line in &mut lines {
            line.geometry = line.geometry.map_coords(|c| to_wgs84(crs, c));
        }
    }
    check_finite(
        lines.iter().flat_map(|line| line.geometry.coords_iter()),
        COLLECTION,
        &declared,
    )?;

    Ok(CustomLines {
        crs: Some(WGS84_NAME.to_string()),
        lines,
    })
}

/// Reproject the reference network to WGS84 if it is not already there.
pub fn normalize_reference(network: ReferenceNetwork) -> Result<ReferenceNetwork, ProjectionError> {
    const COLLECTION: &str = "reference network";
    let crs = resolve(network.crs.as_deref(), COLLECTION)?;
    let declared = network.crs.clone().unwrap_or_default();

    let ReferenceNetwork {
        mut nodes,
        mut edges,
        ..
    } = network;
    if crs != Crs::Wgs84 {
        tracing::info!(
            "Reprojecting reference network ({} nodes, {} edges) from {}",
            nodes.len(),
            edges.len(),
            declared
        );
        for node in &mut nodes {
            let c = to_wgs84(crs, node.coord());
            node.x = c.x;
            node.y = c.y;
        }
        for edge in &mut edges {
            edge.geometry = edge.geometry.map_coords(|c| to_wgs84(crs, c));
        }
    }
    check_finite(
        nodes
            .iter()
            .map(Node::coord)
            .chain(edges.iter().flat_map(|e| e.geometry.coords_iter())),
        COLLECTION,
        &declared,
    )?;

    Ok(ReferenceNetwork {
        crs: Some(WGS84_NAME.to_string()),
        nodes,
        edges,
    })
}

/// A Local Tangent Plane projection centered at a specific (lon0, lat0).
/// Projects (lon, lat) to (x, y) meters and back.
/// Equirectangular approximation: x = R * cos(lat0) * dlon, y = R * dlat
#[derive(Debug, Clone, Copy)]
pub struct LocalTangentPlane {
    origin_lon_rad: f64,
    origin_lat_rad: f64,
    cos_lat0: f64,
    radius: f64,
}

impl LocalTangentPlane {
    const EARTH_RADIUS: f64 = 6_371_007.2;

    pub fn new(lon0: f64, lat0: f64) -> Self {
        let origin_lon_rad = lon0.to_radians();
        let origin_lat_rad = lat0.to_radians();
        Self {
            origin_lon_rad,
            origin_lat_rad,
            cos_lat0: origin_lat_rad.cos(),
            radius: Self::EARTH_RADIUS,
        }
    }

    /// Centered on the region's centroid; falls back to its first vertex for degenerate rings.
    pub fn for_region(region: &Polygon<f64>) -> Self {
        let origin = region
            .centroid()
            .map(|p| p.0)
            .or_else(|| region.exterior().0.first().copied())
            .unwrap_or(Coord { x: 0.0, y: 0.0 });
        Self::new(origin.x, origin.y)
    }

    pub fn project(&self, c: Coord) -> Coord {
        let dlon = c.x.to_radians() - self.origin_lon_rad;
        let dlat = c.y.to_radians() - self.origin_lat_rad;
        Coord {
            x: self.radius * self.cos_lat0 * dlon,
            y: self.radius * dlat,
        }
    }

    pub fn unproject(&self, c: Coord) -> Coord {
        let dlon = c.x / (self.radius * self.cos_lat0);
        let dlat = c.y / self.radius;
        Coord {
            x: (self.origin_lon_rad + dlon).to_degrees(),
            y: (self.origin_lat_rad + dlat).to_degrees(),
        }
    }

    pub fn project_geometry<G: MapCoords<f64, f64>>(&self, geometry: &G) -> G::Output {
        geometry.map_coords(|c| self.project(c))
    }

    pub fn unproject_geometry<G: MapCoords<f64, f64>>(&self, geometry: &G) -> G::Output {
        geometry.map_coords(|c| self.unproject(c))
    }
}

/// Round to the 7-decimal precision of the interchange document.
pub fn round7(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}
