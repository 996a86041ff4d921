//! Robust temporal compositing of per-scene LST.
//!
//! For one period: convert to Celsius and quantise, drop physically impossible values, build
//! the temporal mean, derive region statistics from it, reject per-scene pixels whose z-score
//! against those statistics is too large, order the series (by time or by clear-sky score)
//! and reduce it pixel-wise.

use crate::core::quality_mask::scene_flags;
use crate::core::scene::{Scene, SceneCollection, LST_BAND};
use crate::raster::{reduce_region, MaskedRaster, RasterExpr, Region, RegionReduction};
use crate::types::{LstError, LstResult, Pixel, SensorId, TimePeriod};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const KELVIN_OFFSET: f64 = 273.15;

/// Pixel-wise reducer applied across the ordered scene series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    Mean,
    Max,
    Min,
    /// First valid pixel in descending clear-sky score order
    ScoreFirst,
}

impl StatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatType::Mean => "mean",
            StatType::Max => "max",
            StatType::Min => "min",
            StatType::ScoreFirst => "score_first",
        }
    }

    /// Whether scenes must be ranked by clear-sky score
    pub fn needs_score(&self) -> bool {
        matches!(self, StatType::ScoreFirst)
    }

    fn reduce<I: Iterator<Item = Pixel>>(&self, mut samples: I) -> Option<Pixel> {
        match self {
            StatType::Mean => {
                let (sum, count) = samples.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (count > 0).then(|| sum / count as f64)
            }
            StatType::Max => samples.reduce(f64::max),
            StatType::Min => samples.reduce(f64::min),
            StatType::ScoreFirst => samples.next(),
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatType {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(StatType::Mean),
            "max" => Ok(StatType::Max),
            "min" => Ok(StatType::Min),
            "score_first" => Ok(StatType::ScoreFirst),
            _ => Err(LstError::InvalidStatType(s.to_string())),
        }
    }
}

/// Compositing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeParams {
    pub stat_type: StatType,
    /// Analysis scale for region statistics, grid units per pixel
    pub analysis_scale: f64,
    /// Maximum absolute z-score kept by outlier rejection
    pub z_threshold: f64,
    /// Exclusive lower bound of plausible LST in Celsius
    pub min_valid_celsius: f64,
    /// Exclusive upper bound of plausible LST in Celsius
    pub max_valid_celsius: f64,
    /// Decimal places kept after unit conversion and reduction
    pub decimals: i32,
    /// Analysis scale for the clear-sky score
    pub score_scale: f64,
    /// Score given to scenes without a quality band
    pub default_score: f64,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            stat_type: StatType::Mean,
            analysis_scale: 900.0,
            z_threshold: 4.0,
            min_valid_celsius: -1000.0,
            max_valid_celsius: 1000.0,
            decimals: 4,
            score_scale: 30.0,
            default_score: 50.0,
        }
    }
}

/// Region mean and standard deviation of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl RegionStats {
    /// Statistics usable for z-scores; zero or undefined spread is `DegenerateStats`
    pub fn from_reduction(reduction: &RegionReduction) -> LstResult<Self> {
        let mean = reduction.mean.unwrap_or(f64::NAN);
        let std_dev = reduction.std_dev.unwrap_or(f64::NAN);
        if !mean.is_finite() || !std_dev.is_finite() || std_dev <= 0.0 {
            return Err(LstError::DegenerateStats { mean, std_dev });
        }
        Ok(Self { mean, std_dev })
    }

    pub fn z_score(&self, value: Pixel) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// One scene's filtered LST field in Celsius
#[derive(Debug, Clone)]
pub struct Observation {
    pub scene_id: String,
    pub sensor: SensorId,
    pub acquired: DateTime<Utc>,
    pub cloud_score: Option<f64>,
    pub lst: MaskedRaster,
}

/// Scene that took part in a composite, in reduction order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub scene_id: String,
    pub sensor: SensorId,
    pub acquired: DateTime<Utc>,
    pub cloud_score: Option<f64>,
}

/// Reduced LST field for one period
#[derive(Debug, Clone)]
pub struct Composite {
    pub raster: MaskedRaster,
    pub stat_type: StatType,
    pub contributors: Vec<Contributor>,
    /// Region statistics used for outlier rejection; `None` when they were degenerate
    pub stats: Option<RegionStats>,
}

impl Composite {
    pub fn scene_ids(&self) -> Vec<&str> {
        self.contributors.iter().map(|c| c.scene_id.as_str()).collect()
    }
}

/// Kelvin to Celsius, quantised
pub fn to_celsius(lst: RasterExpr, decimals: i32) -> RasterExpr {
    lst.sub(KELVIN_OFFSET).round_to(decimals)
}

/// Invalidate pixels outside the open interval (min, max)
pub fn physical_range_filter(lst: RasterExpr, min: f64, max: f64) -> RasterExpr {
    let keep = lst.clone().gt(min).and(lst.clone().lt(max));
    lst.update_mask(keep)
}

/// Invalidate pixels whose |z| exceeds `threshold`. Applying it twice changes nothing.
pub fn reject_outliers(raster: &MaskedRaster, stats: &RegionStats, threshold: f64) -> MaskedRaster {
    let mut out = raster.clone();
    Zip::from(&mut out.valid)
        .and(&raster.values)
        .for_each(|ok, &v| *ok = *ok && stats.z_score(v).abs() <= threshold);
    out
}

fn check_grid(observations: &[Observation]) -> LstResult<()> {
    if let Some(first) = observations.first() {
        for obs in &observations[1..] {
            if !obs.lst.same_grid(&first.lst) {
                return Err(LstError::GridMismatch(format!(
                    "scene {} is not on the grid of scene {}",
                    obs.scene_id, first.scene_id
                )));
            }
        }
    }
    Ok(())
}

/// Pixel-wise reduction over a series; pixels with no valid sample are invalid
pub fn reduce_series(rasters: &[&MaskedRaster], stat: StatType) -> LstResult<MaskedRaster> {
    let first = rasters
        .first()
        .ok_or_else(|| LstError::Processing("cannot reduce an empty series".to_string()))?;
    let shape = first.dim();
    let mut values = Array2::<Pixel>::from_elem(shape, Pixel::NAN);
    let mut valid = Array2::<bool>::from_elem(shape, false);

    let reduce_at = |(row, col): (usize, usize), out: &mut Pixel, ok: &mut bool| {
        let samples = rasters.iter().filter_map(|r| r.get(row, col));
        if let Some(v) = stat.reduce(samples) {
            *out = v;
            *ok = v.is_finite();
        }
    };

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut values)
        .and(&mut valid)
        .par_for_each(|idx, out, ok| reduce_at(idx, out, ok));

    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut values)
        .and(&mut valid)
        .for_each(|idx, out, ok| reduce_at(idx, out, ok));

    MaskedRaster::new(values, valid, first.geo_transform)
}

/// Temporal compositing engine
#[derive(Debug, Clone)]
pub struct TemporalCompositor {
    params: CompositeParams,
}

impl TemporalCompositor {
    pub fn new(params: CompositeParams) -> Self {
        Self { params }
    }

    /// Compositor with default parameters and the given reducer
    pub fn with_stat(stat_type: StatType) -> Self {
        Self::new(CompositeParams { stat_type, ..CompositeParams::default() })
    }

    pub fn params(&self) -> &CompositeParams {
        &self.params
    }

    /// Celsius conversion and physical range filter of a Kelvin LST expression
    pub fn prepare(&self, lst_kelvin: RasterExpr) -> RasterExpr {
        physical_range_filter(
            to_celsius(lst_kelvin, self.params.decimals),
            self.params.min_valid_celsius,
            self.params.max_valid_celsius,
        )
    }

    /// Percentage of clear-sky pixels in the region, rounded to 2 decimals.
    ///
    /// Uses the unmasked quality band. Scenes without one get the default score; a region the
    /// scene does not cover counts as half clear.
    pub fn cloud_score(&self, scene: &Scene, region: &Region) -> LstResult<f64> {
        let flags = match scene_flags(scene) {
            Ok(flags) => flags,
            Err(LstError::MissingQualityBand { .. }) => {
                log::debug!("Scene {} has no quality band, default score", scene.id());
                return Ok(self.params.default_score);
            }
            Err(err) => return Err(err),
        };
        let clear = flags.clear_sky().materialize()?;
        let ratio = reduce_region(&clear, region, self.params.score_scale)?.mean.unwrap_or(0.5);
        Ok((ratio * 100.0 * 100.0).round() / 100.0)
    }

    /// Materialise the filtered Celsius LST of every scene, with scores when the reducer needs them
    pub fn observations(&self, collection: &SceneCollection, region: &Region) -> LstResult<Vec<Observation>> {
        let build = |scene: &Scene| -> LstResult<Observation> {
            let lst = self.prepare(scene.band(LST_BAND)?).materialize()?;
            let cloud_score = if self.params.stat_type.needs_score() {
                Some(self.cloud_score(scene, region)?)
            } else {
                scene.cloud_score
            };
            Ok(Observation {
                scene_id: scene.id().to_string(),
                sensor: scene.sensor(),
                acquired: scene.metadata.acquired,
                cloud_score,
                lst,
            })
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            collection.scenes().par_iter().map(build).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            collection.scenes().iter().map(build).collect()
        }
    }

    /// Region statistics of the temporal mean
    pub fn region_stats(&self, mean: &MaskedRaster, region: &Region) -> LstResult<RegionStats> {
        let reduction = reduce_region(mean, region, self.params.analysis_scale)?;
        RegionStats::from_reduction(&reduction)
    }

    /// Composite a period's scene collection
    pub fn composite(&self, collection: &SceneCollection, region: &Region, period: &TimePeriod) -> LstResult<Composite> {
        if collection.is_empty() {
            return Err(LstError::NoImagesFound { start: period.start, end: period.end });
        }
        log::info!(
            "Compositing {} scenes for {} with reducer {}",
            collection.len(),
            period,
            self.params.stat_type
        );
        let observations = self.observations(collection, region)?;
        self.composite_observations(observations, region)
    }

    /// Composite already prepared observations (Celsius, range filtered)
    pub fn composite_observations(&self, mut observations: Vec<Observation>, region: &Region) -> LstResult<Composite> {
        check_grid(&observations)?;

        let series: Vec<&MaskedRaster> = observations.iter().map(|o| &o.lst).collect();
        let mean = reduce_series(&series, StatType::Mean)?.quantized(self.params.decimals);

        let stats = match self.region_stats(&mean, region) {
            Ok(stats) => {
                log::debug!("Region '{}' mean {:.4} std dev {:.4}", region.name, stats.mean, stats.std_dev);
                Some(stats)
            }
            Err(LstError::DegenerateStats { mean, std_dev }) => {
                log::warn!(
                    "Degenerate statistics over '{}' (mean {}, std dev {}), skipping outlier rejection",
                    region.name,
                    mean,
                    std_dev
                );
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(stats) = &stats {
            for obs in observations.iter_mut() {
                let before = obs.lst.valid_count();
                obs.lst = reject_outliers(&obs.lst, stats, self.params.z_threshold);
                let rejected = before - obs.lst.valid_count();
                if rejected > 0 {
                    log::debug!("Rejected {} outlier pixels in scene {}", rejected, obs.scene_id);
                }
            }
        }

        if self.params.stat_type.needs_score() {
            let default_score = self.params.default_score;
            // stable: equal scores keep acquisition order
            observations.sort_by_key(|o| o.acquired);
            observations.sort_by(|a, b| {
                let sa = a.cloud_score.unwrap_or(default_score);
                let sb = b.cloud_score.unwrap_or(default_score);
                sb.total_cmp(&sa)
            });
        } else {
            observations.sort_by_key(|o| o.acquired);
        }

        let series: Vec<&MaskedRaster> = observations.iter().map(|o| &o.lst).collect();
        let raster = reduce_series(&series, self.params.stat_type)?.quantized(self.params.decimals);
        log::info!(
            "Composite '{}' has {} valid pixels",
            self.params.stat_type,
            raster.valid_count()
        );

        let contributors = observations
            .into_iter()
            .map(|o| Contributor {
                scene_id: o.scene_id,
                sensor: o.sensor,
                acquired: o.acquired,
                cloud_score: o.cloud_score,
            })
            .collect();

        Ok(Composite {
            raster,
            stat_type: self.params.stat_type,
            contributors,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use ndarray::array;

    fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 60.0, 30.0)
    }

    fn obs(id: &str, day: u32, values: Array2<f64>, score: Option<f64>) -> Observation {
        Observation {
            scene_id: id.to_string(),
            sensor: SensorId::L8,
            acquired: Utc.with_ymd_and_hms(2023, 7, day, 3, 0, 0).unwrap(),
            cloud_score: score,
            lst: MaskedRaster::from_values(values, grid()),
        }
    }

    #[test]
    fn test_stat_type_parsing() {
        assert_eq!("score_first".parse::<StatType>().unwrap(), StatType::ScoreFirst);
        assert_eq!(" MAX ".parse::<StatType>().unwrap(), StatType::Max);
        assert!(matches!("median".parse::<StatType>(), Err(LstError::InvalidStatType(_))));
    }

    #[test]
    fn test_prepare_converts_and_filters() {
        let compositor = TemporalCompositor::with_stat(StatType::Mean);
        let kelvin = RasterExpr::source(MaskedRaster::from_values(array![[293.15, 1500.0, -800.0]], grid()));
        let celsius = compositor.prepare(kelvin).materialize().unwrap();
        assert_abs_diff_eq!(celsius.get(0, 0).unwrap(), 20.0, epsilon = 1e-9);
        assert_eq!(celsius.get(0, 1), None);
        assert_eq!(celsius.get(0, 2), None);
    }

    #[test]
    fn test_reject_outliers_is_idempotent() {
        let stats = RegionStats { mean: 20.0, std_dev: 2.0 };
        let raster = MaskedRaster::from_values(array![[20.0, 27.9, 28.1, 11.0]], grid());
        let once = reject_outliers(&raster, &stats, 4.0);
        assert_eq!(once.valid, array![[true, true, false, false]]);
        let twice = reject_outliers(&once, &stats, 4.0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_degenerate_stats() {
        let flat = RegionReduction { mean: Some(5.0), std_dev: Some(0.0), ..Default::default() };
        assert!(matches!(RegionStats::from_reduction(&flat), Err(LstError::DegenerateStats { .. })));
        assert!(RegionStats::from_reduction(&RegionReduction::default()).is_err());
    }

    #[test]
    fn test_reducers() {
        let a = MaskedRaster::new(array![[1.0, 5.0]], array![[true, false]], grid()).unwrap();
        let b = MaskedRaster::new(array![[3.0, 7.0]], array![[true, false]], grid()).unwrap();
        let series = [&a, &b];
        assert_eq!(reduce_series(&series, StatType::Mean).unwrap().get(0, 0), Some(2.0));
        assert_eq!(reduce_series(&series, StatType::Max).unwrap().get(0, 0), Some(3.0));
        assert_eq!(reduce_series(&series, StatType::Min).unwrap().get(0, 0), Some(1.0));
        assert_eq!(reduce_series(&series, StatType::ScoreFirst).unwrap().get(0, 0), Some(1.0));
        assert_eq!(reduce_series(&series, StatType::Mean).unwrap().get(0, 1), None);
    }

    #[test]
    fn test_score_first_prefers_clearest_scene() {
        let compositor = TemporalCompositor::new(CompositeParams {
            stat_type: StatType::ScoreFirst,
            analysis_scale: 30.0,
            z_threshold: 100.0,
            ..CompositeParams::default()
        });
        let observations = vec![
            obs("cloudy", 1, array![[10.0, 11.0]], Some(40.0)),
            obs("clear", 2, array![[20.0, f64::NAN]], Some(90.0)),
            obs("tie", 3, array![[30.0, 31.0]], Some(40.0)),
        ];
        let composite = compositor
            .composite_observations(observations, &Region::unbounded("all"))
            .unwrap();
        assert_eq!(composite.scene_ids(), vec!["clear", "cloudy", "tie"]);
        assert_eq!(composite.raster.get(0, 0), Some(20.0));
        // clear scene has a gap there, next best fills it
        assert_eq!(composite.raster.get(0, 1), Some(11.0));
    }

    #[test]
    fn test_empty_collection_fails_with_no_images() {
        let compositor = TemporalCompositor::with_stat(StatType::Mean);
        let period = TimePeriod::new(
            chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        );
        let err = compositor
            .composite(&SceneCollection::new(), &Region::unbounded("all"), &period)
            .unwrap_err();
        assert!(err.is_skippable());
    }
}
