use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel value type used throughout the raster engine
pub type Pixel = f64;

/// Landsat sensor generations supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorId {
    L4,
    L5,
    L7,
    L8,
    L9,
}

impl SensorId {
    pub const ALL: [SensorId; 5] = [
        SensorId::L4,
        SensorId::L5,
        SensorId::L7,
        SensorId::L8,
        SensorId::L9,
    ];

    /// Short id as used in configuration files ("L8")
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::L4 => "L4",
            SensorId::L5 => "L5",
            SensorId::L7 => "L7",
            SensorId::L8 => "L8",
            SensorId::L9 => "L9",
        }
    }

    /// Sensor/satellite code used in Collection 2 product identifiers
    pub fn product_code(&self) -> &'static str {
        match self {
            SensorId::L4 => "LT04",
            SensorId::L5 => "LT05",
            SensorId::L7 => "LE07",
            SensorId::L8 => "LC08",
            SensorId::L9 => "LC09",
        }
    }

    /// Resolve a product code ("LC08") back to the sensor
    pub fn from_product_code(code: &str) -> LstResult<Self> {
        SensorId::ALL
            .iter()
            .copied()
            .find(|s| s.product_code().eq_ignore_ascii_case(code))
            .ok_or_else(|| LstError::UnknownSensor(code.to_string()))
    }

    /// Resolve the MTL `SPACECRAFT_ID` value ("LANDSAT_8")
    pub fn from_spacecraft_id(spacecraft: &str) -> LstResult<Self> {
        match spacecraft.trim().to_uppercase().as_str() {
            "LANDSAT_4" => Ok(SensorId::L4),
            "LANDSAT_5" => Ok(SensorId::L5),
            "LANDSAT_7" => Ok(SensorId::L7),
            "LANDSAT_8" => Ok(SensorId::L8),
            "LANDSAT_9" => Ok(SensorId::L9),
            other => Err(LstError::UnknownSensor(other.to_string())),
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SensorId {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "L4" => Ok(SensorId::L4),
            "L5" => Ok(SensorId::L5),
            "L7" => Ok(SensorId::L7),
            "L8" => Ok(SensorId::L8),
            "L9" => Ok(SensorId::L9),
            _ => Err(LstError::UnknownSensor(s.to_string())),
        }
    }
}

/// Axis-aligned bounds in the grid coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Smallest box covering all points, `None` for an empty set
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, &(x, y)| {
            Some(match acc {
                None => BoundingBox::new(x, y, x, y),
                Some(b) => BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            })
        })
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }
}

/// Affine pixel-to-grid transform (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Grid coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Nominal ground pixel size in grid units
    pub fn pixel_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounds covered by a raster of `shape` (rows, cols)
    pub fn bounds(&self, shape: (usize, usize)) -> BoundingBox {
        let (rows, cols) = shape;
        let corners = [
            (self.top_left_x, self.top_left_y),
            (
                self.top_left_x + cols as f64 * self.pixel_width,
                self.top_left_y + cols as f64 * self.rotation_y,
            ),
            (
                self.top_left_x + rows as f64 * self.rotation_x,
                self.top_left_y + rows as f64 * self.pixel_height,
            ),
            (
                self.top_left_x + cols as f64 * self.pixel_width + rows as f64 * self.rotation_x,
                self.top_left_y + cols as f64 * self.rotation_y + rows as f64 * self.pixel_height,
            ),
        ];
        // four corners always yield a box
        BoundingBox::from_points(corners.iter()).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Transform of the coarse grid produced by aggregating `factor` x `factor` blocks
    pub fn coarsened(&self, factor: usize) -> Self {
        let f = factor as f64;
        Self {
            pixel_width: self.pixel_width * f,
            rotation_x: self.rotation_x * f,
            rotation_y: self.rotation_y * f,
            pixel_height: self.pixel_height * f,
            ..*self
        }
    }
}

/// Inclusive-start, exclusive-end acquisition window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimePeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        let day = time.date_naive();
        day >= self.start && day < self.end
    }

    /// "20230101_20231231", as used in export file names
    pub fn compact_label(&self) -> String {
        format!("{}_{}", self.start.format("%Y%m%d"), self.end.format("%Y%m%d"))
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Scene-level cloud cover bounds in percent, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudCoverRange {
    pub min: f64,
    pub max: f64,
}

impl CloudCoverRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, cloud_cover: f64) -> bool {
        cloud_cover >= self.min && cloud_cover <= self.max
    }

    /// "cloud_0_100"
    pub fn label(&self) -> String {
        format!("cloud_{}_{}", self.min, self.max)
    }
}

impl Default for CloudCoverRange {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

/// Acquisition metadata carried by every scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Collection-level identifier used to join SR and TOA records ("LC08_123032_20200101")
    pub scene_id: String,
    /// Full Collection 2 product identifier
    pub product_id: String,
    pub sensor: SensorId,
    /// MTL `SPACECRAFT_ID` ("LANDSAT_8")
    pub spacecraft_id: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover: f64,
    pub wrs_path: u32,
    pub wrs_row: u32,
    pub sun_azimuth: Option<f64>,
    pub sun_elevation: Option<f64>,
}

impl SceneMetadata {
    pub fn date_acquired(&self) -> NaiveDate {
        self.acquired.date_naive()
    }

    /// Scene centre time formatted like the MTL `SCENE_CENTER_TIME` field
    pub fn scene_center_time(&self) -> String {
        self.acquired.format("%H:%M:%S%.6fZ").to_string()
    }
}

/// Error types for LST processing
#[derive(Debug, thiserror::Error)]
pub enum LstError {
    #[error("Unknown sensor id: {0}")]
    UnknownSensor(String),

    #[error("Invalid emissivity method '{0}', expected 'aster' or 'ndvi'")]
    InvalidEmissivityMethod(String),

    #[error("Invalid statistic type '{0}', expected 'mean', 'max', 'min' or 'score_first'")]
    InvalidStatType(String),

    #[error("Scene {scene} has no quality band {band}")]
    MissingQualityBand { scene: String, band: String },

    #[error("Scene {scene} has no band {band}")]
    MissingBand { scene: String, band: String },

    #[error("No images found between {start} and {end}")]
    NoImagesFound { start: NaiveDate, end: NaiveDate },

    #[error("Degenerate region statistics (mean {mean}, std dev {std_dev})")]
    DegenerateStats { mean: f64, std_dev: f64 },

    #[error("Raster grid mismatch: {0}")]
    GridMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl LstError {
    /// Errors that only skip the current period in a batch run
    pub fn is_skippable(&self) -> bool {
        matches!(self, LstError::NoImagesFound { .. })
    }
}

/// Result type for LST operations
pub type LstResult<T> = Result<T, LstError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sensor_id_parsing() {
        assert_eq!("L8".parse::<SensorId>().unwrap(), SensorId::L8);
        assert_eq!(" l5 ".parse::<SensorId>().unwrap(), SensorId::L5);
        assert!(matches!("L6".parse::<SensorId>(), Err(LstError::UnknownSensor(_))));
        assert_eq!(SensorId::from_product_code("LE07").unwrap(), SensorId::L7);
        assert_eq!(SensorId::from_spacecraft_id("LANDSAT_9").unwrap(), SensorId::L9);
    }

    #[test]
    fn test_time_period_is_end_exclusive() {
        let period = TimePeriod::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        );
        assert!(period.contains(&Utc.with_ymd_and_hms(2023, 1, 1, 2, 0, 0).unwrap()));
        assert!(!period.contains(&Utc.with_ymd_and_hms(2023, 12, 31, 2, 0, 0).unwrap()));
        assert_eq!(period.compact_label(), "20230101_20231231");
    }

    #[test]
    fn test_cloud_label_formats_whole_numbers() {
        assert_eq!(CloudCoverRange::default().label(), "cloud_0_100");
        assert_eq!(CloudCoverRange::new(0.0, 20.5).label(), "cloud_0_20.5");
    }

    #[test]
    fn test_pixel_center_and_bounds() {
        let gt = GeoTransform::north_up(1000.0, 2000.0, 30.0);
        assert_eq!(gt.pixel_center(0, 0), (1015.0, 1985.0));
        let b = gt.bounds((2, 3));
        assert_eq!(b, BoundingBox::new(1000.0, 1940.0, 1090.0, 2000.0));
    }
}
