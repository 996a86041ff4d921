//! NDVI from Collection 2 surface reflectance

use crate::core::scene::Scene;
use crate::core::sensor_catalog::spec_for;
use crate::raster::RasterExpr;
use crate::types::{LstResult, Pixel, SensorId};

pub const NDVI_BAND: &str = "NDVI";

/// Collection 2 Level-2 reflectance scale factor
pub const REFLECTANCE_SCALE: f64 = 0.0000275;
/// Collection 2 Level-2 reflectance offset
pub const REFLECTANCE_OFFSET: f64 = -0.2;

/// Rescale a digital number to surface reflectance
pub fn reflectance(dn: Pixel) -> Pixel {
    dn * REFLECTANCE_SCALE + REFLECTANCE_OFFSET
}

/// Normalised difference; `None` where the denominator vanishes
pub fn normalized_difference(nir: Pixel, red: Pixel) -> Option<Pixel> {
    let sum = nir + red;
    if sum == 0.0 {
        None
    } else {
        Some((nir - red) / sum)
    }
}

/// NDVI computed from a pair of digital numbers
pub fn ndvi_from_dn(nir_dn: Pixel, red_dn: Pixel) -> Option<Pixel> {
    normalized_difference(reflectance(nir_dn), reflectance(red_dn))
}

/// Whether an NDVI value lies in the physical range [-1, 1]
pub fn is_physical_ndvi(ndvi: Pixel) -> bool {
    ndvi.is_finite() && (-1.0..=1.0).contains(&ndvi)
}

fn rescaled(band: RasterExpr) -> RasterExpr {
    band.mul(REFLECTANCE_SCALE).add(REFLECTANCE_OFFSET)
}

/// NDVI expression for a scene. Values are not clamped; see [`physical_range_mask`].
pub fn ndvi(scene: &Scene, sensor: SensorId) -> LstResult<RasterExpr> {
    let spec = spec_for(sensor);
    let nir = rescaled(scene.band(spec.nir_band)?);
    let red = rescaled(scene.band(spec.red_band)?);
    Ok(nir.clone().sub(red.clone()).div(nir.add(red)))
}

/// 1 where NDVI is within [-1, 1]
pub fn physical_range_mask(ndvi: RasterExpr) -> RasterExpr {
    ndvi.clone().gte(-1.0).and(ndvi.lte(1.0))
}

/// Add the `NDVI` band to a scene
pub fn add_ndvi_band(mut scene: Scene, sensor: SensorId) -> LstResult<Scene> {
    let index = ndvi(&scene, sensor)?;
    log::debug!("Adding NDVI to scene {} ({})", scene.id(), sensor);
    scene.add_band(NDVI_BAND, index)?;
    Ok(scene)
}
