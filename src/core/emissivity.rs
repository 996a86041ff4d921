//! Surface emissivity strategies and the NDVI threshold model

use crate::core::quality_mask::scene_flags;
use crate::core::scene::Scene;
use crate::core::spectral_index::NDVI_BAND;
use crate::raster::RasterExpr;
use crate::types::{LstError, LstResult, Pixel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const EMISSIVITY_BAND: &str = "EM";

/// How surface emissivity is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissivityMethod {
    /// ASTER GED based model, supplied externally
    Aster,
    /// NDVI threshold model
    Ndvi,
}

impl EmissivityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmissivityMethod::Aster => "aster",
            EmissivityMethod::Ndvi => "ndvi",
        }
    }

    /// Single letter used in export file names
    pub fn tag(&self) -> &'static str {
        match self {
            EmissivityMethod::Aster => "A",
            EmissivityMethod::Ndvi => "N",
        }
    }
}

impl fmt::Display for EmissivityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmissivityMethod {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aster" => Ok(EmissivityMethod::Aster),
            "ndvi" => Ok(EmissivityMethod::Ndvi),
            _ => Err(LstError::InvalidEmissivityMethod(s.to_string())),
        }
    }
}

/// NDVI threshold emissivity model with water and snow overrides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdviEmissivityModel {
    pub soil: f64,
    pub vegetation: f64,
    pub urban: f64,
    pub water: f64,
    pub snow: f64,
    /// Below this NDVI the surface is bare soil
    pub soil_threshold: f64,
    /// Above this NDVI the surface is fully vegetated
    pub vegetation_threshold: f64,
}

impl Default for NdviEmissivityModel {
    fn default() -> Self {
        Self {
            soil: 0.97,
            vegetation: 0.99,
            urban: 0.97,
            water: 0.99,
            snow: 0.989,
            soil_threshold: 0.2,
            vegetation_threshold: 0.7,
        }
    }
}

impl NdviEmissivityModel {
    fn blend(&self, ndvi: Pixel) -> Pixel {
        let span = self.vegetation_threshold - self.soil_threshold;
        self.soil + (self.vegetation - self.soil) * (ndvi - self.soil_threshold) / span
    }

    /// Piecewise emissivity for one NDVI value, before overrides
    pub fn emissivity(&self, ndvi: Pixel) -> Pixel {
        if ndvi < 0.0 {
            self.urban
        } else if ndvi < self.soil_threshold {
            self.soil
        } else if ndvi > self.vegetation_threshold {
            self.vegetation
        } else {
            self.blend(ndvi)
        }
    }

    /// Emissivity for one pixel including the water and snow overrides
    pub fn classify(&self, ndvi: Pixel, is_water: bool, is_snow: bool) -> Pixel {
        if is_snow {
            self.snow
        } else if is_water {
            self.water
        } else {
            self.emissivity(ndvi)
        }
    }

    /// Piecewise rule as a raster expression
    pub fn expression(&self, ndvi: RasterExpr) -> RasterExpr {
        let span = self.vegetation_threshold - self.soil_threshold;
        ndvi.clone()
            .sub(self.soil_threshold)
            .div(span)
            .mul(self.vegetation - self.soil)
            .add(self.soil)
            .where_(ndvi.clone().gt(self.vegetation_threshold), self.vegetation)
            .where_(ndvi.clone().lt(self.soil_threshold), self.soil)
            .where_(ndvi.lt(0.0), self.urban)
    }

    /// Emissivity band for a scene carrying `NDVI`; water then snow overrides are applied
    /// from the quality flags when the scene has a quality band.
    pub fn scene_emissivity(&self, scene: &Scene) -> LstResult<RasterExpr> {
        let ndvi = scene.band(NDVI_BAND)?;
        let base = self.expression(ndvi);
        match scene_flags(scene) {
            Ok(flags) => Ok(base
                .where_(flags.is_water, self.water)
                .where_(flags.is_snow, self.snow)),
            Err(LstError::MissingQualityBand { .. }) => {
                log::warn!(
                    "Scene {} has no quality band, emissivity has no water/snow overrides",
                    scene.id()
                );
                Ok(base)
            }
            Err(err) => Err(err),
        }
    }

    /// Add the `EM` band to a scene
    pub fn add_band(&self, mut scene: Scene) -> LstResult<Scene> {
        let em = self.scene_emissivity(&scene)?;
        scene.add_band(EMISSIVITY_BAND, em)?;
        Ok(scene)
    }
}
