//! Physical models the harmonizer consumes but does not define.
//!
//! Each provider takes a scene and returns it with one additional band. Implementations
//! are expected to be pure: the same scene yields the same band.

use crate::core::emissivity::EMISSIVITY_BAND;
use crate::core::scene::{Scene, LST_BAND};
use crate::core::sensor_catalog::spec_for;
use crate::raster::RasterExpr;
use crate::types::{LstError, LstResult, SensorId};

pub const TPW_BAND: &str = "TPW";
pub const FVC_BAND: &str = "FVC";

/// Atmospheric total precipitable water, adds `TPW`
pub trait TpwProvider: Send + Sync {
    fn add_tpw(&self, scene: Scene) -> LstResult<Scene>;
}

/// Fractional vegetation cover, adds `FVC`
pub trait FvcProvider: Send + Sync {
    fn add_fvc(&self, scene: Scene, sensor: SensorId) -> LstResult<Scene>;
}

/// ASTER GED based emissivity, adds `EM`
pub trait AsterEmissivityProvider: Send + Sync {
    fn add_emissivity(&self, scene: Scene, sensor: SensorId) -> LstResult<Scene>;
}

/// Split-window / single-channel retrieval, adds `LST` in Kelvin
pub trait SplitWindowAlgorithm: Send + Sync {
    fn add_lst(&self, scene: Scene, sensor: SensorId) -> LstResult<Scene>;
}

/// TPW provider returning one value for every pixel, for scenes without reanalysis data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantTpw(pub f64);

impl TpwProvider for ConstantTpw {
    fn add_tpw(&self, mut scene: Scene) -> LstResult<Scene> {
        let template = scene
            .band_names()
            .next()
            .map(|name| name.to_string())
            .ok_or_else(|| LstError::Processing(format!("scene {} has no bands", scene.id())))?;
        // zero times any band keeps the scene grid
        let tpw = scene.raw_band(&template)?.mul(0.0).add(self.0);
        scene.add_band(TPW_BAND, tpw)?;
        Ok(scene)
    }
}

/// Single-channel retrieval driven by brightness temperature and emissivity.
///
/// `LST = BT / (1 + (lambda * BT / rho) * ln(EM))` with the effective wavelength of the
/// primary thermal band. TPW is not used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissivityCorrectedBrightness {
    /// Effective wavelength in metres
    pub wavelength: f64,
}

/// h * c / k_B in metre Kelvin
const RHO: f64 = 1.438e-2;

impl EmissivityCorrectedBrightness {
    pub fn for_sensor(sensor: SensorId) -> Self {
        let wavelength = match sensor {
            SensorId::L8 | SensorId::L9 => 10.895e-6,
            SensorId::L7 => 11.335e-6,
            SensorId::L4 | SensorId::L5 => 11.457e-6,
        };
        Self { wavelength }
    }

    /// Retrieval for one pixel
    pub fn lst(&self, brightness_temperature: f64, emissivity: f64) -> f64 {
        brightness_temperature / (1.0 + (self.wavelength * brightness_temperature / RHO) * emissivity.ln())
    }
}

impl SplitWindowAlgorithm for EmissivityCorrectedBrightness {
    fn add_lst(&self, mut scene: Scene, sensor: SensorId) -> LstResult<Scene> {
        let bt = scene.band(spec_for(sensor).primary_thermal_band())?;
        let em = scene.band(EMISSIVITY_BAND)?;
        let factor: RasterExpr = bt.clone().mul(self.wavelength / RHO).mul(em.ln()).add(1.0);
        scene.add_band(LST_BAND, bt.div(factor))?;
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::tests::scene_with;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_constant_tpw_covers_scene_grid() {
        let scene = scene_with("t", 1, &[("QA_PIXEL", array![[0.0, 8.0]])]);
        let scene = ConstantTpw(1.5).add_tpw(scene).unwrap();
        let tpw = scene.band(TPW_BAND).unwrap().materialize().unwrap();
        assert_eq!(tpw.values, array![[1.5, 1.5]]);
    }

    #[test]
    fn test_unit_emissivity_keeps_brightness_temperature() {
        let model = EmissivityCorrectedBrightness::for_sensor(SensorId::L8);
        assert_abs_diff_eq!(model.lst(300.0, 1.0), 300.0, epsilon = 1e-12);
        // lower emissivity means the surface is warmer than it looks
        assert!(model.lst(300.0, 0.97) > 300.0);
    }

    #[test]
    fn test_lst_band_matches_scalar() {
        let model = EmissivityCorrectedBrightness::for_sensor(SensorId::L8);
        let scene = scene_with("l", 1, &[("B10", array![[295.0]]), ("EM", array![[0.98]])]);
        let scene = model.add_lst(scene, SensorId::L8).unwrap();
        let lst = scene.band("LST").unwrap().materialize().unwrap();
        assert_abs_diff_eq!(lst.values[[0, 0]], model.lst(295.0, 0.98), epsilon = 1e-9);
    }
}
