//! Administrative boundaries from GeoJSON feature collections

use crate::raster::{Geometry, Region, Ring};
use crate::types::{BoundingBox, LstError, LstResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Administrative level of a boundary set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminLevel {
    Province,
    City,
    County,
}

impl AdminLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminLevel::Province => "province",
            AdminLevel::City => "city",
            AdminLevel::County => "county",
        }
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminLevel {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "province" => Ok(AdminLevel::Province),
            "city" => Ok(AdminLevel::City),
            "county" => Ok(AdminLevel::County),
            other => Err(LstError::Config(format!(
                "unknown administrative level '{}', expected province, city or county",
                other
            ))),
        }
    }
}

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: Option<GeoJsonGeometry>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeatureCollection {
    features: Vec<GeoJsonFeature>,
}

fn to_ring(positions: &[Position]) -> LstResult<Ring> {
    positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok((*x, *y)),
            _ => Err(LstError::InvalidFormat("GeoJSON position needs two coordinates".to_string())),
        })
        .collect()
}

fn to_polygon(rings: &[Vec<Position>]) -> LstResult<Vec<Ring>> {
    rings.iter().map(|r| to_ring(r)).collect()
}

impl GeoJsonGeometry {
    fn to_geometry(&self) -> LstResult<Geometry> {
        Ok(match self {
            GeoJsonGeometry::Polygon { coordinates } => Geometry::Polygon(to_polygon(coordinates)?),
            GeoJsonGeometry::MultiPolygon { coordinates } => Geometry::MultiPolygon(
                coordinates
                    .iter()
                    .map(|p| to_polygon(p))
                    .collect::<LstResult<Vec<_>>>()?,
            ),
        })
    }
}

/// Named boundaries of one administrative level
#[derive(Debug, Clone)]
pub struct BoundarySet {
    pub level: AdminLevel,
    regions: Vec<Region>,
}

impl BoundarySet {
    /// Parse a GeoJSON FeatureCollection, naming each feature by `name_property`.
    ///
    /// Coordinates are taken as-is and must already be in the projected CRS of the scene
    /// grids (UTM metres). No reprojection happens; a boundary set that looks like
    /// longitude/latitude degrees is logged as a warning.
    pub fn from_geojson(content: &str, level: AdminLevel, name_property: &str) -> LstResult<Self> {
        let collection: GeoJsonFeatureCollection = serde_json::from_str(content)?;
        let mut regions = Vec::with_capacity(collection.features.len());
        for feature in &collection.features {
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            let name = match feature.properties.get(name_property) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    log::debug!("Skipping feature without '{}' property", name_property);
                    continue;
                }
            };
            regions.push(Region::new(name, geometry.to_geometry()?));
        }
        log::debug!("Loaded {} {} boundaries", regions.len(), level);
        let set = Self { level, regions };
        if set.looks_geographic() {
            log::warn!(
                "{} boundaries lie within longitude/latitude range; scene grids are projected, regions may never overlap a footprint",
                level
            );
        }
        Ok(set)
    }

    /// Whether every boundary fits inside [-180, 180] x [-90, 90]
    pub fn looks_geographic(&self) -> bool {
        let degrees = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        let mut bounds = self.regions.iter().filter_map(|r| r.bounds()).peekable();
        bounds.peek().is_some()
            && bounds.all(|b| degrees.contains(b.min_x, b.min_y) && degrees.contains(b.max_x, b.max_y))
    }

    pub fn load<P: AsRef<Path>>(path: P, level: AdminLevel, name_property: &str) -> LstResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_geojson(&content, level, name_property)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    /// Boundary with the given name
    pub fn find(&self, name: &str) -> LstResult<&Region> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| LstError::Config(format!("no {} boundary named '{}'", self.level, name)))
    }
}
