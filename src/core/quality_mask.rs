//! Pixel quality bit decoding and cloud masking.
//!
//! Collection 2 `QA_PIXEL` (modern layout) and pre-collection `BQA` (legacy layout) encode
//! cloud and shadow at different bit positions; only the modern layout carries cirrus,
//! snow and water flags.

use crate::core::scene::Scene;
use crate::raster::RasterExpr;
use crate::types::{LstError, LstResult};

/// Bit layout of the quality band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityKind {
    Legacy,
    Modern,
}

impl QualityKind {
    pub fn band_name(&self) -> &'static str {
        match self {
            QualityKind::Legacy => "BQA",
            QualityKind::Modern => "QA_PIXEL",
        }
    }

    pub fn cloud_bit(&self) -> u8 {
        match self {
            QualityKind::Legacy => 4,
            QualityKind::Modern => 3,
        }
    }

    pub fn shadow_bit(&self) -> u8 {
        match self {
            QualityKind::Legacy => 3,
            QualityKind::Modern => 4,
        }
    }

    pub fn cirrus_bit(&self) -> Option<u8> {
        match self {
            QualityKind::Legacy => None,
            QualityKind::Modern => Some(2),
        }
    }

    pub fn snow_bit(&self) -> Option<u8> {
        match self {
            QualityKind::Legacy => None,
            QualityKind::Modern => Some(5),
        }
    }

    pub fn water_bit(&self) -> Option<u8> {
        match self {
            QualityKind::Legacy => None,
            QualityKind::Modern => Some(7),
        }
    }

    /// Recognise the quality band a scene carries, preferring the modern layout
    pub fn detect(scene: &Scene) -> Option<QualityKind> {
        [QualityKind::Modern, QualityKind::Legacy]
            .into_iter()
            .find(|kind| scene.has_band(kind.band_name()))
    }
}

/// Independent 0/1 indicator fields decoded from one quality band
#[derive(Debug, Clone)]
pub struct QualityFlags {
    pub is_cloud: RasterExpr,
    pub is_shadow: RasterExpr,
    pub is_cirrus: RasterExpr,
    pub is_snow: RasterExpr,
    pub is_water: RasterExpr,
}

impl QualityFlags {
    /// 1 where the pixel is free of cloud, shadow and cirrus
    pub fn clear_sky(&self) -> RasterExpr {
        self.is_cloud
            .clone()
            .or(self.is_shadow.clone())
            .or(self.is_cirrus.clone())
            .not()
    }
}

/// Decode the quality bitmask into indicator fields
pub fn build_mask(quality: &RasterExpr, kind: QualityKind) -> QualityFlags {
    let flag = |bit: Option<u8>| match bit {
        Some(bit) => quality.clone().bit_set(bit),
        // all-zero field on the quality grid
        None => quality.clone().bitwise_and(0).neq(0.0),
    };
    QualityFlags {
        is_cloud: flag(Some(kind.cloud_bit())),
        is_shadow: flag(Some(kind.shadow_bit())),
        is_cirrus: flag(kind.cirrus_bit()),
        is_snow: flag(kind.snow_bit()),
        is_water: flag(kind.water_bit()),
    }
}

/// How a missing quality band is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Leave the scene unmasked and log a warning
    #[default]
    Lenient,
    /// Fail with `MissingQualityBand`
    Strict,
}

/// Quality flags of a scene, read from the unmasked quality band
pub fn scene_flags(scene: &Scene) -> LstResult<QualityFlags> {
    let kind = QualityKind::detect(scene).ok_or_else(|| LstError::MissingQualityBand {
        scene: scene.id().to_string(),
        band: QualityKind::Modern.band_name().to_string(),
    })?;
    Ok(build_mask(&scene.raw_band(kind.band_name())?, kind))
}

fn mask_with<F>(mut scene: Scene, policy: MaskPolicy, cleared: F) -> LstResult<Scene>
where
    F: Fn(&QualityFlags) -> RasterExpr,
{
    match scene_flags(&scene) {
        Ok(flags) => {
            scene.apply_mask(cleared(&flags).not());
            Ok(scene)
        }
        Err(err @ LstError::MissingQualityBand { .. }) => match policy {
            MaskPolicy::Strict => Err(err),
            MaskPolicy::Lenient => {
                log::warn!("Scene {} has no quality band, leaving it unmasked", scene.id());
                Ok(scene)
            }
        },
        Err(err) => Err(err),
    }
}

/// Top-of-atmosphere mask: clear cloudy pixels
pub fn toa_mask(scene: Scene, policy: MaskPolicy) -> LstResult<Scene> {
    mask_with(scene, policy, |flags| flags.is_cloud.clone())
}

/// Surface reflectance mask: clear cloudy and shadowed pixels
pub fn sr_mask(scene: Scene, policy: MaskPolicy) -> LstResult<Scene> {
    mask_with(scene, policy, |flags| flags.is_cloud.clone().or(flags.is_shadow.clone()))
}
