use crate::types::{BoundingBox, GeoTransform};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A linear ring as a closed or open list of (x, y) vertices
pub type Ring = Vec<(f64, f64)>;

/// Analysis geometry in the grid coordinate reference system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// Everything covered by the raster
    Unbounded,
    Rectangle(BoundingBox),
    /// Exterior ring followed by optional holes
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

/// Named analysis region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub geometry: Geometry,
}

impl Region {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self { name: name.into(), geometry }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, Geometry::Unbounded)
    }

    pub fn rectangle(name: impl Into<String>, bbox: BoundingBox) -> Self {
        Self::new(name, Geometry::Rectangle(bbox))
    }

    /// Bounds of the geometry; `None` when unbounded or empty
    pub fn bounds(&self) -> Option<BoundingBox> {
        match &self.geometry {
            Geometry::Unbounded => None,
            Geometry::Rectangle(b) => Some(*b),
            Geometry::Polygon(rings) => rings.first().and_then(|r| BoundingBox::from_points(r.iter())),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .filter_map(|rings| rings.first().and_then(|r| BoundingBox::from_points(r.iter())))
                .reduce(|a, b| a.union(&b)),
        }
    }

    /// Whether the region may overlap `footprint` (bounding-box test)
    pub fn intersects(&self, footprint: &BoundingBox) -> bool {
        match &self.geometry {
            Geometry::Unbounded => true,
            _ => self.bounds().map_or(false, |b| b.intersects(footprint)),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        match &self.geometry {
            Geometry::Unbounded => true,
            Geometry::Rectangle(b) => b.contains(x, y),
            Geometry::Polygon(rings) => polygon_contains(rings, x, y),
            Geometry::MultiPolygon(polys) => polys.iter().any(|rings| polygon_contains(rings, x, y)),
        }
    }

    /// Rasterise the region onto a grid by pixel centre
    pub fn pixel_mask(&self, geo_transform: &GeoTransform, shape: (usize, usize)) -> Array2<bool> {
        if let Geometry::Unbounded = self.geometry {
            return Array2::from_elem(shape, true);
        }
        Array2::from_shape_fn(shape, |(row, col)| {
            let (x, y) = geo_transform.pixel_center(row, col);
            self.contains(x, y)
        })
    }
}

/// Even-odd ray casting over all rings, so holes are excluded
fn polygon_contains(rings: &[Ring], x: f64, y: f64) -> bool {
    let mut inside = false;
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = ring[i];
            let (xj, yj) = ring[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}
