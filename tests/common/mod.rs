#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use landsat_lst::core::providers::SplitWindowAlgorithm;
use landsat_lst::core::sensor_catalog::spec_for;
use landsat_lst::core::{InMemorySceneSource, Scene, LST_BAND};
use landsat_lst::{GeoTransform, LstResult, MaskedRaster, RasterExpr, SceneMetadata, SensorId};
use ndarray::Array2;

pub const KELVIN: f64 = 273.15;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn grid() -> GeoTransform {
    GeoTransform::north_up(500_000.0, 4_000_000.0, 30.0)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Collection 2 style scene key, e.g. "LC08_123032_20230605"
pub fn scene_id(sensor: SensorId, day: NaiveDate) -> String {
    format!("{}_123032_{}", sensor.product_code(), day.format("%Y%m%d"))
}

pub fn metadata(sensor: SensorId, day: NaiveDate, cloud_cover: f64) -> SceneMetadata {
    SceneMetadata {
        scene_id: scene_id(sensor, day),
        product_id: format!("{}_L2SP_123032_{}_20240101_02_T1", sensor.product_code(), day.format("%Y%m%d")),
        sensor,
        spacecraft_id: format!("LANDSAT_{}", &sensor.as_str()[1..]),
        acquired: Utc.from_utc_datetime(&day.and_hms_opt(2, 55, 30).unwrap()),
        cloud_cover,
        wrs_path: 123,
        wrs_row: 32,
        sun_azimuth: Some(130.5),
        sun_elevation: Some(62.25),
    }
}

pub fn raster(values: &Array2<f64>) -> RasterExpr {
    RasterExpr::source(MaskedRaster::from_values(values.clone(), grid()))
}

pub fn scene(md: SceneMetadata, bands: &[(&str, Array2<f64>)]) -> Scene {
    let shape = bands[0].1.dim();
    let mut scene = Scene::new(md, shape, grid());
    for (name, values) in bands {
        scene.add_band(*name, raster(values)).unwrap();
    }
    scene
}

/// Raw surface reflectance scene: vegetated DN everywhere, quality bits as given
pub fn sr_scene(sensor: SensorId, day: NaiveDate, qa: &Array2<f64>) -> Scene {
    let spec = spec_for(sensor);
    let shape = qa.dim();
    let mut bands: Vec<(&str, Array2<f64>)> = spec
        .reflective_bands
        .iter()
        .map(|&b| (b, Array2::from_elem(shape, 10_000.0)))
        .collect();
    for (name, values) in bands.iter_mut() {
        if *name == spec.nir_band {
            *values = Array2::from_elem(shape, 30_000.0);
        } else if *name == spec.red_band {
            *values = Array2::from_elem(shape, 9_000.0);
        }
    }
    bands.push((spec.quality_band, qa.clone()));
    scene(metadata(sensor, day, 10.0), &bands)
}

/// Raw top-of-atmosphere scene with every thermal band set to `bt` (Kelvin)
pub fn toa_scene(sensor: SensorId, day: NaiveDate, bt: &Array2<f64>) -> Scene {
    let spec = spec_for(sensor);
    let mut bands: Vec<(&str, Array2<f64>)> = spec.thermal_bands.iter().map(|&b| (b, bt.clone())).collect();
    bands.push((spec.quality_band, Array2::zeros(bt.dim())));
    scene(metadata(sensor, day, 10.0), &bands)
}

/// Store an SR/TOA pair for one acquisition
pub fn insert_pair(source: &InMemorySceneSource, sensor: SensorId, day: NaiveDate, qa: &Array2<f64>, bt: &Array2<f64>) {
    let spec = spec_for(sensor);
    source.insert(spec.sr_collection, sr_scene(sensor, day, qa)).unwrap();
    source.insert(spec.toa_collection, toa_scene(sensor, day, bt)).unwrap();
}

/// Harmonised scene with an `LST` band in Kelvin and a quality band
pub fn lst_scene(sensor: SensorId, day: NaiveDate, lst_kelvin: &Array2<f64>, qa: &Array2<f64>) -> Scene {
    scene(metadata(sensor, day, 10.0), &[(LST_BAND, lst_kelvin.clone()), ("QA_PIXEL", qa.clone())])
}

/// Split-window stand-in: LST equals the brightness temperature of the primary thermal band
pub struct BrightnessAsLst;

impl SplitWindowAlgorithm for BrightnessAsLst {
    fn add_lst(&self, mut scene: Scene, sensor: SensorId) -> LstResult<Scene> {
        let bt = scene.band(spec_for(sensor).primary_thermal_band())?;
        scene.add_band(LST_BAND, bt)?;
        Ok(scene)
    }
}
