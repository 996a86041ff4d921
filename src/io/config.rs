//! JSON run configuration

use crate::core::batch::RunSettings;
use crate::core::emissivity::EmissivityMethod;
use crate::core::histogram::HistogramParams;
use crate::core::quality_mask::MaskPolicy;
use crate::core::temporal_composite::{CompositeParams, StatType};
use crate::io::boundaries::{AdminLevel, BoundarySet};
use crate::raster::{Geometry, Region};
use crate::types::{CloudCoverRange, LstError, LstResult, SensorId, TimePeriod};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Study area: a named administrative boundary or a custom geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionConfig {
    Admin {
        level: String,
        name: String,
        /// Replaces `name` in export file names
        #[serde(default)]
        custom_name: Option<String>,
        /// GeoJSON FeatureCollection holding the boundaries of `level`
        boundaries: PathBuf,
        #[serde(default = "default_name_property")]
        name_property: String,
    },
    Custom {
        name: String,
        geometry: Geometry,
    },
}

fn default_name_property() -> String {
    "name".to_string()
}

fn default_method() -> String {
    "ndvi".to_string()
}

fn default_stat_type() -> String {
    "mean".to_string()
}

fn default_cloud_max() -> f64 {
    100.0
}

fn default_local_offset() -> f64 {
    8.0
}

/// Batch configuration as written by users. String-typed choices are checked by
/// [`RunConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub periods: Vec<TimePeriod>,
    pub region: RegionConfig,
    /// Sensor id ("L8") to enabled flag
    pub satellites: BTreeMap<String, bool>,
    #[serde(default)]
    pub cloud_min: f64,
    #[serde(default = "default_cloud_max")]
    pub cloud_max: f64,
    /// "ndvi" or "aster"
    #[serde(default = "default_method")]
    pub method: String,
    /// "mean", "max", "min" or "score_first"
    #[serde(default = "default_stat_type")]
    pub stat_type: String,
    #[serde(default)]
    pub analysis_scale: Option<f64>,
    #[serde(default)]
    pub z_threshold: Option<f64>,
    #[serde(default)]
    pub histogram: Option<HistogramParams>,
    /// Hours east of UTC for the local scene time column
    #[serde(default = "default_local_offset")]
    pub local_utc_offset_hours: f64,
    /// Fail on scenes without a quality band instead of leaving them unmasked
    #[serde(default)]
    pub strict_quality: bool,
}

impl RunConfig {
    pub fn from_json(content: &str) -> LstResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LstResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded run configuration from {}", path.as_ref().display());
        Self::from_json(&content)
    }

    /// Enabled sensors in generation order; unknown ids fail
    pub fn sensors(&self) -> LstResult<Vec<SensorId>> {
        let mut sensors = Vec::new();
        for (id, enabled) in &self.satellites {
            let sensor: SensorId = id.parse()?;
            if *enabled {
                sensors.push(sensor);
            }
        }
        sensors.sort();
        Ok(sensors)
    }

    /// Resolve the study area and its export label
    pub fn region(&self) -> LstResult<(Region, String)> {
        match &self.region {
            RegionConfig::Admin {
                level,
                name,
                custom_name,
                boundaries,
                name_property,
            } => {
                let level: AdminLevel = level.parse()?;
                let set = BoundarySet::load(boundaries, level, name_property)?;
                let region = set.find(name)?.clone();
                let label = format!("{}_{}", level, custom_name.as_deref().unwrap_or(name));
                Ok((region, label))
            }
            RegionConfig::Custom { name, geometry } => Ok((Region::new(name.clone(), geometry.clone()), name.clone())),
        }
    }

    /// Check every field and build the typed settings. Configuration mistakes fail here,
    /// before any scene is touched.
    pub fn validate(&self) -> LstResult<RunSettings> {
        let emissivity_method: EmissivityMethod = self.method.parse()?;
        let stat_type: StatType = self.stat_type.parse()?;
        let sensors = self.sensors()?;
        if sensors.is_empty() {
            return Err(LstError::Config("no satellite is enabled".to_string()));
        }

        if self.periods.is_empty() {
            return Err(LstError::Config("no time period configured".to_string()));
        }
        for period in &self.periods {
            if period.start >= period.end {
                return Err(LstError::Config(format!("period {} ends before it starts", period)));
            }
        }

        let cloud_cover = CloudCoverRange::new(self.cloud_min, self.cloud_max);
        if !(0.0..=100.0).contains(&cloud_cover.min)
            || !(0.0..=100.0).contains(&cloud_cover.max)
            || cloud_cover.min > cloud_cover.max
        {
            return Err(LstError::Config(format!(
                "cloud cover range {}..{} is not within 0..100",
                cloud_cover.min, cloud_cover.max
            )));
        }

        let mut composite = CompositeParams { stat_type, ..CompositeParams::default() };
        if let Some(scale) = self.analysis_scale {
            if !(scale > 0.0) {
                return Err(LstError::Config(format!("analysis scale must be positive, got {}", scale)));
            }
            composite.analysis_scale = scale;
        }
        if let Some(z) = self.z_threshold {
            if !(z > 0.0) {
                return Err(LstError::Config(format!("z threshold must be positive, got {}", z)));
            }
            composite.z_threshold = z;
        }

        let histogram = self.histogram.unwrap_or_default();
        histogram.validate()?;

        let local_offset = FixedOffset::east_opt((self.local_utc_offset_hours * 3600.0).round() as i32)
            .ok_or_else(|| LstError::Config(format!("invalid UTC offset {} h", self.local_utc_offset_hours)))?;

        let (region, region_label) = self.region()?;

        log::info!(
            "Configuration: {} periods, sensors {:?}, method {}, reducer {}, region {}",
            self.periods.len(),
            sensors,
            emissivity_method,
            stat_type,
            region_label
        );

        Ok(RunSettings {
            periods: self.periods.clone(),
            region,
            region_label,
            sensors,
            cloud_cover,
            emissivity_method,
            mask_policy: if self.strict_quality { MaskPolicy::Strict } else { MaskPolicy::Lenient },
            composite,
            histogram,
            local_offset,
        })
    }
}
