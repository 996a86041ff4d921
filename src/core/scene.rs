//! Scenes and scene collections.
//!
//! A [`Scene`] is one acquisition: metadata, a grid and a set of named band expressions.
//! Cloud masking is recorded as a scene-wide mask expression that is applied whenever a band
//! is fetched, so the pixel values themselves are never altered.

use crate::core::quality_mask::QualityKind;
use crate::raster::{RasterExpr, Region};
use crate::types::{
    BoundingBox, CloudCoverRange, GeoTransform, LstError, LstResult, SceneMetadata, SensorId, TimePeriod,
};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the land surface temperature band
pub const LST_BAND: &str = "LST";

#[derive(Debug, Clone)]
pub struct Scene {
    pub metadata: SceneMetadata,
    shape: (usize, usize),
    geo_transform: GeoTransform,
    bands: BTreeMap<String, RasterExpr>,
    mask: Option<RasterExpr>,
    /// Clear-sky score in percent, set by the compositor when ranking scenes
    pub cloud_score: Option<f64>,
}

impl Scene {
    pub fn new(metadata: SceneMetadata, shape: (usize, usize), geo_transform: GeoTransform) -> Self {
        Self {
            metadata,
            shape,
            geo_transform,
            bands: BTreeMap::new(),
            mask: None,
            cloud_score: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.scene_id
    }

    pub fn sensor(&self) -> SensorId {
        self.metadata.sensor
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn footprint(&self) -> BoundingBox {
        self.geo_transform.bounds(self.shape)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(|k| k.as_str())
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Add or replace a band. Bands backed by pixels must sit on the scene grid.
    pub fn add_band(&mut self, name: impl Into<String>, expr: RasterExpr) -> LstResult<()> {
        let name = name.into();
        if let Some((shape, gt)) = expr.grid() {
            if shape != self.shape || gt != self.geo_transform {
                return Err(LstError::GridMismatch(format!(
                    "band {} of scene {} has shape {:?}, scene grid is {:?}",
                    name, self.metadata.scene_id, shape, self.shape
                )));
            }
        }
        self.bands.insert(name, expr);
        Ok(())
    }

    pub fn with_band(mut self, name: impl Into<String>, expr: RasterExpr) -> LstResult<Self> {
        self.add_band(name, expr)?;
        Ok(self)
    }

    /// Band with the scene mask applied
    pub fn band(&self, name: &str) -> LstResult<RasterExpr> {
        let raw = self.raw_band(name)?;
        Ok(match &self.mask {
            Some(mask) => raw.update_mask(mask.clone()),
            None => raw,
        })
    }

    /// Band as stored, ignoring the scene mask
    pub fn raw_band(&self, name: &str) -> LstResult<RasterExpr> {
        self.bands.get(name).cloned().ok_or_else(|| LstError::MissingBand {
            scene: self.metadata.scene_id.clone(),
            band: name.to_string(),
        })
    }

    /// Restrict valid pixels to where `keep` is non-zero; combines with any existing mask
    pub fn apply_mask(&mut self, keep: RasterExpr) {
        self.mask = Some(match self.mask.take() {
            Some(existing) => existing.and(keep),
            None => keep,
        });
    }

    /// Keep only the named bands; a missing name fails with `MissingBand`
    pub fn select(&self, names: &[&str]) -> LstResult<Scene> {
        let mut bands = BTreeMap::new();
        for name in names {
            bands.insert(name.to_string(), self.raw_band(name)?);
        }
        Ok(Scene { bands, ..self.clone() })
    }

    /// Copy bands from another acquisition of the same scene, carrying that scene's mask
    pub fn combine(&mut self, other: &Scene, names: &[&str]) -> LstResult<()> {
        for name in names {
            let band = other.band(name)?;
            self.add_band(*name, band)?;
        }
        Ok(())
    }
}

/// Time, space and cloud-cover constraints applied when fetching scenes
#[derive(Debug, Clone)]
pub struct SceneFilter {
    pub period: TimePeriod,
    pub region: Region,
    pub cloud_cover: Option<CloudCoverRange>,
}

impl SceneFilter {
    pub fn new(period: TimePeriod, region: Region) -> Self {
        Self { period, region, cloud_cover: None }
    }

    pub fn with_cloud_cover(mut self, range: CloudCoverRange) -> Self {
        self.cloud_cover = Some(range);
        self
    }

    /// Test scene metadata and footprint before any pixels are loaded
    pub fn accepts(&self, metadata: &SceneMetadata, footprint: &BoundingBox) -> bool {
        self.period.contains(&metadata.acquired)
            && self.region.intersects(footprint)
            && self.cloud_cover.map_or(true, |range| range.contains(metadata.cloud_cover))
    }
}

/// Ordered set of scenes
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl From<Vec<Scene>> for SceneCollection {
    fn from(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }
}

impl IntoIterator for SceneCollection {
    type Item = Scene;
    type IntoIter = std::vec::IntoIter<Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.into_iter()
    }
}

impl SceneCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }

    pub fn filter_date(self, period: &TimePeriod) -> Self {
        self.retain(|s| period.contains(&s.metadata.acquired))
    }

    pub fn filter_bounds(self, region: &Region) -> Self {
        self.retain(|s| region.intersects(&s.footprint()))
    }

    pub fn filter_cloud_cover(self, range: &CloudCoverRange) -> Self {
        self.retain(|s| range.contains(s.metadata.cloud_cover))
    }

    pub fn filter(self, filter: &SceneFilter) -> Self {
        self.retain(|s| filter.accepts(&s.metadata, &s.footprint()))
    }

    fn retain<F: Fn(&Scene) -> bool>(mut self, keep: F) -> Self {
        self.scenes.retain(|s| keep(s));
        self
    }

    /// Transform every scene, stopping at the first error
    pub fn try_map<F>(self, f: F) -> LstResult<Self>
    where
        F: Fn(Scene) -> LstResult<Scene>,
    {
        let scenes = self.scenes.into_iter().map(f).collect::<LstResult<Vec<_>>>()?;
        Ok(Self { scenes })
    }

    /// Stable sort by acquisition time, oldest first
    pub fn sort_by_time(mut self) -> Self {
        self.scenes.sort_by_key(|s| s.metadata.acquired);
        self
    }

    /// Concatenate collections from several sensors.
    ///
    /// Every scene must carry an `LST` band. Scenes without a recognised quality band are
    /// kept unmasked and reported. The result is sorted by acquisition time.
    pub fn merge<I>(collections: I) -> LstResult<Self>
    where
        I: IntoIterator<Item = SceneCollection>,
    {
        let mut scenes = Vec::new();
        for collection in collections {
            for scene in collection.scenes {
                if !scene.has_band(LST_BAND) {
                    return Err(LstError::MissingBand {
                        scene: scene.metadata.scene_id.clone(),
                        band: LST_BAND.to_string(),
                    });
                }
                if QualityKind::detect(&scene).is_none() {
                    log::warn!("Scene {} has no quality band, it will carry the default score", scene.id());
                }
                scenes.push(scene);
            }
        }
        Ok(Self { scenes }.sort_by_time())
    }

    /// Distinct WRS (path, row) pairs per sensor, sorted by path then row
    pub fn path_rows(&self) -> BTreeMap<SensorId, Vec<(u32, u32)>> {
        let mut by_sensor: BTreeMap<SensorId, BTreeSet<(u32, u32)>> = BTreeMap::new();
        for scene in &self.scenes {
            by_sensor
                .entry(scene.metadata.sensor)
                .or_default()
                .insert((scene.metadata.wrs_path, scene.metadata.wrs_row));
        }
        by_sensor
            .into_iter()
            .map(|(sensor, set)| (sensor, set.into_iter().collect()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::raster::MaskedRaster;
    use chrono::{NaiveDate, TimeZone, Utc};
    use ndarray::{array, Array2};

    pub(crate) fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 60.0, 30.0)
    }

    pub(crate) fn metadata(id: &str, sensor: SensorId, day: u32, cloud_cover: f64) -> SceneMetadata {
        SceneMetadata {
            scene_id: id.to_string(),
            product_id: format!("{}_L2SP", id),
            sensor,
            spacecraft_id: format!("LANDSAT_{}", &sensor.as_str()[1..]),
            acquired: Utc.with_ymd_and_hms(2023, 6, day, 3, 0, 0).unwrap(),
            cloud_cover,
            wrs_path: 123,
            wrs_row: 32,
            sun_azimuth: Some(120.0),
            sun_elevation: Some(60.0),
        }
    }

    pub(crate) fn scene_with(id: &str, day: u32, bands: &[(&str, Array2<f64>)]) -> Scene {
        let shape = bands.first().map(|(_, a)| a.dim()).unwrap_or((2, 2));
        let mut scene = Scene::new(metadata(id, SensorId::L8, day, 10.0), shape, grid());
        for (name, values) in bands {
            scene
                .add_band(*name, RasterExpr::source(MaskedRaster::from_values(values.clone(), grid())))
                .unwrap();
        }
        scene
    }

    #[test]
    fn test_mask_applies_on_fetch_only() {
        let mut scene = scene_with("a", 1, &[("B", array![[1.0, 2.0]])]);
        scene.apply_mask(RasterExpr::source(MaskedRaster::from_values(array![[1.0, 0.0]], grid())));
        let masked = scene.band("B").unwrap().materialize().unwrap();
        let raw = scene.raw_band("B").unwrap().materialize().unwrap();
        assert_eq!(masked.valid_count(), 1);
        assert_eq!(raw.valid_count(), 2);
        assert_eq!(masked.values, raw.values);
    }

    #[test]
    fn test_band_on_other_grid_is_rejected() {
        let mut scene = scene_with("a", 1, &[("B", array![[1.0, 2.0]])]);
        let other = MaskedRaster::from_values(array![[1.0, 2.0, 3.0]], grid());
        assert!(matches!(
            scene.add_band("C", RasterExpr::source(other)),
            Err(LstError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_missing_band() {
        let scene = scene_with("a", 1, &[("B", array![[1.0]])]);
        assert!(matches!(scene.band("LST"), Err(LstError::MissingBand { .. })));
        assert!(scene.select(&["B", "X"]).is_err());
        assert_eq!(scene.select(&["B"]).unwrap().band_names().count(), 1);
    }

    #[test]
    fn test_merge_requires_lst_and_sorts() {
        let late = scene_with("late", 20, &[("LST", array![[300.0]]), ("QA_PIXEL", array![[0.0]])]);
        let early = scene_with("early", 2, &[("LST", array![[301.0]]), ("QA_PIXEL", array![[0.0]])]);
        let merged =
            SceneCollection::merge(vec![SceneCollection::from(vec![late]), SceneCollection::from(vec![early])])
                .unwrap();
        let ids: Vec<&str> = merged.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        let no_qa = scene_with("x", 3, &[("LST", array![[300.0]])]);
        assert_eq!(SceneCollection::merge(vec![SceneCollection::from(vec![no_qa])]).unwrap().len(), 1);

        let no_lst = scene_with("y", 3, &[("QA_PIXEL", array![[0.0]])]);
        assert!(matches!(
            SceneCollection::merge(vec![SceneCollection::from(vec![no_lst])]),
            Err(LstError::MissingBand { .. })
        ));
    }

    #[test]
    fn test_filters_and_path_rows() {
        let mut a = scene_with("a", 1, &[("B", array![[1.0]])]);
        a.metadata.cloud_cover = 80.0;
        let mut b = scene_with("b", 5, &[("B", array![[1.0]])]);
        b.metadata.wrs_row = 31;
        let c = scene_with("c", 9, &[("B", array![[1.0]])]);
        let period = TimePeriod::new(
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 9).unwrap(),
        );
        let filtered = SceneCollection::from(vec![a, b, c])
            .filter_date(&period)
            .filter_cloud_cover(&CloudCoverRange::new(0.0, 50.0));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.path_rows()[&SensorId::L8], vec![(123, 31)]);
    }
}
