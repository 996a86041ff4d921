//! Collection 2 MTL metadata (`*_MTL.xml`)

use crate::io::product_id::ProductId;
use crate::types::{BoundingBox, GeoTransform, LstError, LstResult, SceneMetadata, SensorId};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The root `<LANDSAT_METADATA_FILE>` element
#[derive(Debug, Deserialize)]
pub struct MtlDocument {
    #[serde(rename = "PRODUCT_CONTENTS")]
    pub product_contents: BTreeMap<String, String>,
    #[serde(rename = "IMAGE_ATTRIBUTES")]
    pub image_attributes: ImageAttributes,
    #[serde(rename = "PROJECTION_ATTRIBUTES", default)]
    pub projection_attributes: BTreeMap<String, String>,
    #[serde(rename = "LEVEL1_RADIOMETRIC_RESCALING", default)]
    pub radiometric_rescaling: BTreeMap<String, String>,
    #[serde(rename = "LEVEL1_THERMAL_CONSTANTS", default)]
    pub thermal_constants: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageAttributes {
    #[serde(rename = "SPACECRAFT_ID")]
    pub spacecraft_id: String,
    #[serde(rename = "SENSOR_ID", default)]
    pub sensor_id: Option<String>,
    #[serde(rename = "WRS_PATH")]
    pub wrs_path: u32,
    #[serde(rename = "WRS_ROW")]
    pub wrs_row: u32,
    #[serde(rename = "DATE_ACQUIRED")]
    pub date_acquired: String,
    #[serde(rename = "SCENE_CENTER_TIME")]
    pub scene_center_time: String,
    #[serde(rename = "CLOUD_COVER")]
    pub cloud_cover: f64,
    #[serde(rename = "SUN_AZIMUTH", default)]
    pub sun_azimuth: Option<f64>,
    #[serde(rename = "SUN_ELEVATION", default)]
    pub sun_elevation: Option<f64>,
}

/// Radiometric rescaling and thermal constants of one thermal band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalConstants {
    pub radiance_mult: f64,
    pub radiance_add: f64,
    pub k1: f64,
    pub k2: f64,
}

impl ThermalConstants {
    /// At-sensor spectral radiance, W/(m² sr µm)
    pub fn radiance(&self, dn: f64) -> f64 {
        self.radiance_mult * dn + self.radiance_add
    }

    /// At-sensor brightness temperature in Kelvin; `None` for non-positive radiance
    pub fn brightness_temperature(&self, dn: f64) -> Option<f64> {
        let radiance = self.radiance(dn);
        if radiance <= 0.0 {
            return None;
        }
        Some(self.k2 / (self.k1 / radiance + 1.0).ln())
    }
}

/// "B10" -> "BAND_10", "B6_VCID_1" -> "BAND_6_VCID_1"
fn mtl_band_suffix(band: &str) -> LstResult<String> {
    band.strip_prefix('B')
        .map(|rest| format!("BAND_{}", rest))
        .ok_or_else(|| LstError::Metadata(format!("{} is not a Level-1 band", band)))
}

fn number(section: &BTreeMap<String, String>, key: &str) -> LstResult<f64> {
    let raw = section
        .get(key)
        .ok_or_else(|| LstError::Metadata(format!("MTL field {} not found", key)))?;
    raw.trim()
        .trim_matches('"')
        .parse::<f64>()
        .map_err(|e| LstError::Metadata(format!("MTL field {}='{}': {}", key, raw, e)))
}

pub struct MtlParser;

impl MtlParser {
    pub fn parse_mtl(xml_content: &str) -> LstResult<MtlDocument> {
        from_str::<MtlDocument>(xml_content)
            .map_err(|e| LstError::XmlParsing(format!("Failed to parse MTL XML: {}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LstResult<MtlDocument> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Reading MTL metadata from {}", path.as_ref().display());
        Self::parse_mtl(&content)
    }
}

impl MtlDocument {
    pub fn product_id(&self) -> LstResult<ProductId> {
        let id = self
            .product_contents
            .get("LANDSAT_PRODUCT_ID")
            .ok_or_else(|| LstError::Metadata("LANDSAT_PRODUCT_ID not found".to_string()))?;
        ProductId::parse(id.trim_matches('"'))
    }

    pub fn sensor(&self) -> LstResult<SensorId> {
        SensorId::from_spacecraft_id(&self.image_attributes.spacecraft_id)
    }

    /// Acquisition metadata; the scene id is the product's scene key so that Level-1 and
    /// Level-2 records of the same acquisition share it
    pub fn to_scene_metadata(&self) -> LstResult<SceneMetadata> {
        let attrs = &self.image_attributes;
        let product = self.product_id()?;
        let sensor = self.sensor()?;
        if sensor != product.sensor {
            return Err(LstError::Metadata(format!(
                "SPACECRAFT_ID {} does not match product {}",
                attrs.spacecraft_id, product
            )));
        }

        let date = NaiveDate::parse_from_str(attrs.date_acquired.trim(), "%Y-%m-%d")
            .map_err(|e| LstError::Metadata(format!("DATE_ACQUIRED '{}': {}", attrs.date_acquired, e)))?;
        let time_str = attrs.scene_center_time.trim().trim_matches('"').trim_end_matches('Z');
        let time = NaiveTime::parse_from_str(time_str, "%H:%M:%S%.f")
            .map_err(|e| LstError::Metadata(format!("SCENE_CENTER_TIME '{}': {}", attrs.scene_center_time, e)))?;

        Ok(SceneMetadata {
            scene_id: product.scene_key(),
            product_id: product.to_string(),
            sensor,
            spacecraft_id: attrs.spacecraft_id.clone(),
            acquired: Utc.from_utc_datetime(&date.and_time(time)),
            cloud_cover: attrs.cloud_cover,
            wrs_path: attrs.wrs_path,
            wrs_row: attrs.wrs_row,
            sun_azimuth: attrs.sun_azimuth,
            sun_elevation: attrs.sun_elevation,
        })
    }

    /// GeoTIFF file of every band, keyed by band name ("SR_B4", "B10", "QA_PIXEL")
    pub fn band_files(&self) -> BTreeMap<String, String> {
        let product = self
            .product_contents
            .get("LANDSAT_PRODUCT_ID")
            .map(|p| p.trim_matches('"').to_string())
            .unwrap_or_default();

        self.product_contents
            .iter()
            .filter(|(key, _)| key.starts_with("FILE_NAME_"))
            .filter_map(|(_, file)| {
                let file = file.trim_matches('"');
                let stem = file.strip_suffix(".TIF")?;
                let band = stem.strip_prefix(product.as_str())?.trim_start_matches('_');
                (!band.is_empty()).then(|| (band.to_string(), file.to_string()))
            })
            .collect()
    }

    pub fn band_file(&self, band: &str) -> Option<String> {
        self.band_files().remove(band)
    }

    pub fn thermal_constants(&self, band: &str) -> LstResult<ThermalConstants> {
        let suffix = mtl_band_suffix(band)?;
        Ok(ThermalConstants {
            radiance_mult: number(&self.radiometric_rescaling, &format!("RADIANCE_MULT_{}", suffix))?,
            radiance_add: number(&self.radiometric_rescaling, &format!("RADIANCE_ADD_{}", suffix))?,
            k1: number(&self.thermal_constants, &format!("K1_CONSTANT_{}", suffix))?,
            k2: number(&self.thermal_constants, &format!("K2_CONSTANT_{}", suffix))?,
        })
    }

    /// Grid of the given cell size anchored at the product's upper-left corner. MTL corner
    /// coordinates refer to pixel centres.
    pub fn geo_transform(&self, cell_size: f64) -> LstResult<GeoTransform> {
        let ul_x = number(&self.projection_attributes, "CORNER_UL_PROJECTION_X_PRODUCT")?;
        let ul_y = number(&self.projection_attributes, "CORNER_UL_PROJECTION_Y_PRODUCT")?;
        Ok(GeoTransform::north_up(ul_x - cell_size / 2.0, ul_y + cell_size / 2.0, cell_size))
    }

    pub fn reflective_cell_size(&self) -> LstResult<f64> {
        number(&self.projection_attributes, "GRID_CELL_SIZE_REFLECTIVE")
    }

    /// Product extent in projection coordinates
    pub fn footprint(&self) -> LstResult<BoundingBox> {
        let p = &self.projection_attributes;
        let half = self.reflective_cell_size().unwrap_or(30.0) / 2.0;
        let corners = ["UL", "UR", "LL", "LR"]
            .iter()
            .map(|c| {
                Ok((
                    number(p, &format!("CORNER_{}_PROJECTION_X_PRODUCT", c))?,
                    number(p, &format!("CORNER_{}_PROJECTION_Y_PRODUCT", c))?,
                ))
            })
            .collect::<LstResult<Vec<(f64, f64)>>>()?;
        let bounds = BoundingBox::from_points(corners.iter())
            .ok_or_else(|| LstError::Metadata("no projection corners".to_string()))?;
        Ok(BoundingBox::new(
            bounds.min_x - half,
            bounds.min_y - half,
            bounds.max_x + half,
            bounds.max_y + half,
        ))
    }

    /// EPSG code of a WGS84 UTM product (Landsat keeps southern scenes in northern zones)
    pub fn epsg(&self) -> Option<u32> {
        let p = &self.projection_attributes;
        if p.get("MAP_PROJECTION").map(|s| s.trim_matches('"')) != Some("UTM") {
            return None;
        }
        let zone = number(p, "UTM_ZONE").ok()? as u32;
        Some(32600 + zone)
    }
}
