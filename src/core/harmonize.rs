//! Per-sensor scene harmonisation.
//!
//! Surface reflectance scenes are cloud masked and enriched with NDVI, optional FVC, TPW and
//! emissivity; the matching top-of-atmosphere scenes contribute the thermal bands; the
//! split-window model then adds `LST`. Every harmonised scene exposes the same band
//! vocabulary whatever sensor produced it.

use crate::core::emissivity::{EmissivityMethod, NdviEmissivityModel, EMISSIVITY_BAND};
use crate::core::providers::{
    AsterEmissivityProvider, FvcProvider, SplitWindowAlgorithm, TpwProvider, FVC_BAND, TPW_BAND,
};
use crate::core::quality_mask::{sr_mask, toa_mask, MaskPolicy};
use crate::core::scene::{Scene, SceneCollection, SceneFilter, LST_BAND};
use crate::core::sensor_catalog::{spec_for, SensorSpec};
use crate::core::spectral_index::add_ndvi_band;
use crate::types::{LstError, LstResult, SensorId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Supplier of raw scenes for a collection reference ("LANDSAT/LC08/C02/T1_L2")
pub trait SceneSource: Send + Sync {
    fn fetch(&self, collection: &str, filter: &SceneFilter) -> LstResult<SceneCollection>;
}

/// Scenes held in memory, keyed by collection reference
#[derive(Debug, Default)]
pub struct InMemorySceneSource {
    collections: RwLock<HashMap<String, Vec<Scene>>>,
}

impl InMemorySceneSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: impl Into<String>, scene: Scene) -> LstResult<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| LstError::Processing("scene store lock poisoned".to_string()))?;
        collections.entry(collection.into()).or_default().push(scene);
        Ok(())
    }
}

impl SceneSource for InMemorySceneSource {
    fn fetch(&self, collection: &str, filter: &SceneFilter) -> LstResult<SceneCollection> {
        let collections = self
            .collections
            .read()
            .map_err(|_| LstError::Processing("scene store lock poisoned".to_string()))?;
        let scenes = collections.get(collection).cloned().unwrap_or_default();
        let outside_region = scenes
            .iter()
            .filter(|s| {
                filter.period.contains(&s.metadata.acquired)
                    && filter.cloud_cover.map_or(true, |range| range.contains(s.metadata.cloud_cover))
                    && !filter.region.intersects(&s.footprint())
            })
            .count();
        let kept = SceneCollection::from(scenes).filter(filter);
        if kept.is_empty() && outside_region > 0 {
            log::warn!(
                "No {} footprint overlaps region '{}' ({} scenes in {} lie outside it); check the region uses the scene grid CRS",
                collection,
                filter.region.name,
                outside_region,
                filter.period
            );
        }
        Ok(kept)
    }
}

/// Harmonizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonizerParams {
    pub emissivity_method: EmissivityMethod,
    pub mask_policy: MaskPolicy,
    pub ndvi_model: NdviEmissivityModel,
}

impl Default for HarmonizerParams {
    fn default() -> Self {
        Self {
            emissivity_method: EmissivityMethod::Ndvi,
            mask_policy: MaskPolicy::Lenient,
            ndvi_model: NdviEmissivityModel::default(),
        }
    }
}

/// External models used while harmonising
#[derive(Clone)]
pub struct ModelProviders {
    pub tpw: Arc<dyn TpwProvider>,
    pub split_window: Arc<dyn SplitWindowAlgorithm>,
    pub fvc: Option<Arc<dyn FvcProvider>>,
    pub aster: Option<Arc<dyn AsterEmissivityProvider>>,
}

impl ModelProviders {
    pub fn new(tpw: Arc<dyn TpwProvider>, split_window: Arc<dyn SplitWindowAlgorithm>) -> Self {
        Self { tpw, split_window, fvc: None, aster: None }
    }

    pub fn with_fvc(mut self, fvc: Arc<dyn FvcProvider>) -> Self {
        self.fvc = Some(fvc);
        self
    }

    pub fn with_aster(mut self, aster: Arc<dyn AsterEmissivityProvider>) -> Self {
        self.aster = Some(aster);
        self
    }
}

/// Fail with `MissingBand` unless a provider actually added `band`
fn ensure_band(scene: Scene, band: &str) -> LstResult<Scene> {
    if scene.has_band(band) {
        Ok(scene)
    } else {
        Err(LstError::MissingBand {
            scene: scene.id().to_string(),
            band: band.to_string(),
        })
    }
}

/// Builds LST scene collections for one sensor at a time
pub struct SceneHarmonizer {
    source: Arc<dyn SceneSource>,
    providers: ModelProviders,
    params: HarmonizerParams,
}

impl SceneHarmonizer {
    pub fn new(source: Arc<dyn SceneSource>, providers: ModelProviders, params: HarmonizerParams) -> Self {
        Self { source, providers, params }
    }

    pub fn params(&self) -> &HarmonizerParams {
        &self.params
    }

    /// Mask and enrich one surface reflectance scene up to the `EM` band
    pub fn prepare_reflectance(&self, scene: Scene, spec: &SensorSpec) -> LstResult<Scene> {
        let sensor = spec.sensor;
        let mut bands = spec.reflective_bands.to_vec();
        if scene.has_band(spec.quality_band) {
            bands.push(spec.quality_band);
        }
        let scene = scene.select(&bands)?;
        let scene = sr_mask(scene, self.params.mask_policy)?;
        let mut scene = add_ndvi_band(scene, sensor)?;

        if let Some(fvc) = &self.providers.fvc {
            scene = ensure_band(fvc.add_fvc(scene, sensor)?, FVC_BAND)?;
        }
        scene = ensure_band(self.providers.tpw.add_tpw(scene)?, TPW_BAND)?;

        scene = match self.params.emissivity_method {
            EmissivityMethod::Ndvi => self.params.ndvi_model.add_band(scene)?,
            EmissivityMethod::Aster => {
                let aster = self.providers.aster.as_ref().ok_or_else(|| {
                    LstError::Config("ASTER emissivity requested but no ASTER provider is configured".to_string())
                })?;
                aster.add_emissivity(scene, sensor)?
            }
        };
        ensure_band(scene, EMISSIVITY_BAND)
    }

    /// Harmonised LST collection for one sensor
    pub fn harmonize(&self, sensor: SensorId, filter: &SceneFilter) -> LstResult<SceneCollection> {
        let spec = spec_for(sensor);
        if self.params.emissivity_method == EmissivityMethod::Aster && self.providers.aster.is_none() {
            return Err(LstError::Config(
                "ASTER emissivity requested but no ASTER provider is configured".to_string(),
            ));
        }

        let toa = self.source.fetch(spec.toa_collection, filter)?;
        let sr = self.source.fetch(spec.sr_collection, filter)?;
        log::info!(
            "Harmonising {}: {} SR and {} TOA scenes for {}",
            sensor,
            sr.len(),
            toa.len(),
            filter.period
        );

        let toa_by_id: HashMap<String, Scene> =
            toa.into_iter().map(|s| (s.id().to_string(), s)).collect();

        let mut harmonised = SceneCollection::new();
        for scene in sr {
            let Some(thermal) = toa_by_id.get(scene.id()) else {
                log::debug!("No TOA scene matches {}, dropping it", scene.id());
                continue;
            };
            let mut scene = self.prepare_reflectance(scene, spec)?;
            let thermal = toa_mask(thermal.clone(), self.params.mask_policy)?;
            scene.combine(&thermal, spec.thermal_bands)?;
            let scene = ensure_band(self.providers.split_window.add_lst(scene, sensor)?, LST_BAND)?;
            harmonised.push(scene);
        }

        log::info!("Harmonised {} {} scenes", harmonised.len(), sensor);
        Ok(harmonised)
    }

    /// Harmonise every sensor and merge into one time-ordered collection
    pub fn harmonize_all(&self, sensors: &[SensorId], filter: &SceneFilter) -> LstResult<SceneCollection> {
        let collections = sensors
            .iter()
            .map(|&sensor| self.harmonize(sensor, filter))
            .collect::<LstResult<Vec<_>>>()?;
        SceneCollection::merge(collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::providers::{ConstantTpw, EmissivityCorrectedBrightness};
    use crate::core::scene::tests::scene_with;
    use crate::raster::Region;
    use crate::types::TimePeriod;
    use chrono::NaiveDate;
    use ndarray::array;

    struct NoOpTpw;

    impl TpwProvider for NoOpTpw {
        fn add_tpw(&self, scene: Scene) -> LstResult<Scene> {
            Ok(scene)
        }
    }

    fn filter() -> SceneFilter {
        SceneFilter::new(
            TimePeriod::new(
                NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            ),
            Region::unbounded("test"),
        )
    }

    fn sr_scene(id: &str) -> Scene {
        let dn = array![[20000.0, 20000.0]];
        scene_with(
            id,
            5,
            &[
                ("SR_B1", dn.clone()),
                ("SR_B2", dn.clone()),
                ("SR_B3", dn.clone()),
                ("SR_B4", array![[12000.0, 12000.0]]),
                ("SR_B5", dn.clone()),
                ("SR_B6", dn.clone()),
                ("SR_B7", dn),
                ("QA_PIXEL", array![[0.0, 8.0]]),
            ],
        )
    }

    fn source() -> Arc<InMemorySceneSource> {
        let source = InMemorySceneSource::new();
        let spec = spec_for(SensorId::L8);
        source.insert(spec.sr_collection, sr_scene("LC08_123032_20230605")).unwrap();
        source.insert(spec.sr_collection, sr_scene("LC08_123032_20230621")).unwrap();
        source
            .insert(
                spec.toa_collection,
                scene_with("LC08_123032_20230605", 5, &[("B10", array![[300.0, 301.0]])]),
            )
            .unwrap();
        Arc::new(source)
    }

    fn providers(tpw: Arc<dyn TpwProvider>) -> ModelProviders {
        ModelProviders::new(tpw, Arc::new(EmissivityCorrectedBrightness::for_sensor(SensorId::L8)))
    }

    #[test]
    fn test_harmonize_joins_and_masks() {
        let harmonizer = SceneHarmonizer::new(source(), providers(Arc::new(ConstantTpw(2.0))), HarmonizerParams::default());
        let scenes = harmonizer.harmonize(SensorId::L8, &filter()).unwrap();
        // only the scene with a TOA counterpart survives
        assert_eq!(scenes.len(), 1);
        let scene = &scenes.scenes()[0];
        for band in ["NDVI", "TPW", "EM", "B10", "LST", "QA_PIXEL"] {
            assert!(scene.has_band(band), "missing {}", band);
        }
        let lst = scene.band("LST").unwrap().materialize().unwrap();
        // second pixel is cloudy
        assert!(lst.get(0, 0).unwrap() > 300.0);
        assert_eq!(lst.get(0, 1), None);
    }

    #[test]
    fn test_provider_must_add_its_band() {
        let harmonizer = SceneHarmonizer::new(source(), providers(Arc::new(NoOpTpw)), HarmonizerParams::default());
        assert!(matches!(
            harmonizer.harmonize(SensorId::L8, &filter()),
            Err(LstError::MissingBand { band, .. }) if band == "TPW"
        ));
    }

    #[test]
    fn test_aster_without_provider_is_a_config_error() {
        let params = HarmonizerParams {
            emissivity_method: EmissivityMethod::Aster,
            ..HarmonizerParams::default()
        };
        let harmonizer = SceneHarmonizer::new(source(), providers(Arc::new(ConstantTpw(2.0))), params);
        assert!(matches!(harmonizer.harmonize(SensorId::L8, &filter()), Err(LstError::Config(_))));
    }

    #[test]
    fn test_empty_sensor_yields_empty_collection() {
        let harmonizer = SceneHarmonizer::new(source(), providers(Arc::new(ConstantTpw(2.0))), HarmonizerParams::default());
        assert!(harmonizer.harmonize(SensorId::L5, &filter()).unwrap().is_empty());
    }
}
