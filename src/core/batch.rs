//! Batch processing of several time periods.
//!
//! Each period is harmonised, composited, summarised and exported independently; periods
//! with no usable scenes are skipped and reported, any other failure aborts the run.

use crate::core::emissivity::EmissivityMethod;
use crate::core::harmonize::{HarmonizerParams, ModelProviders, SceneHarmonizer, SceneSource};
use crate::core::histogram::{histogram, HistogramBin, HistogramParams};
use crate::core::quality_mask::MaskPolicy;
use crate::core::scene::{SceneCollection, SceneFilter};
use crate::core::temporal_composite::{Composite, CompositeParams, StatType, TemporalCompositor};
use crate::io::export::ExportSink;
use crate::raster::Region;
use crate::types::{CloudCoverRange, LstError, LstResult, SensorId, TimePeriod};
use chrono::FixedOffset;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Fully validated run settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub periods: Vec<TimePeriod>,
    pub region: Region,
    /// Prefix of every export name ("city_guangzhou")
    pub region_label: String,
    pub sensors: Vec<SensorId>,
    pub cloud_cover: CloudCoverRange,
    pub emissivity_method: EmissivityMethod,
    pub mask_policy: MaskPolicy,
    pub composite: CompositeParams,
    pub histogram: HistogramParams,
    /// Offset used for the local scene time column
    pub local_offset: FixedOffset,
}

impl RunSettings {
    pub fn stat_type(&self) -> StatType {
        self.composite.stat_type
    }

    /// `{region}_{start}_{end}_cloud_{min}_{max}_LST_{stat}_{A|N}`
    pub fn output_name(&self, period: &TimePeriod) -> String {
        format!(
            "{}_{}_{}_LST_{}_{}",
            self.region_label,
            period.compact_label(),
            self.cloud_cover.label(),
            self.composite.stat_type,
            self.emissivity_method.tag()
        )
    }
}

/// One row of the per-period scene table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneRecord {
    pub number: usize,
    pub image_id: String,
    pub satellite: String,
    pub cloud_cover: f64,
    pub date_acquired: String,
    pub scene_center_time_utc: String,
    pub scene_center_time_local: String,
    pub wrs_path: u32,
    pub wrs_row: u32,
    pub sun_azimuth: Option<f64>,
    pub sun_elevation: Option<f64>,
    pub cloud_score: Option<f64>,
}

/// Scene table in acquisition order, numbered from 1
pub fn scene_records(collection: &SceneCollection, composite: &Composite, offset: &FixedOffset) -> Vec<SceneRecord> {
    let scores: HashMap<&str, Option<f64>> = composite
        .contributors
        .iter()
        .map(|c| (c.scene_id.as_str(), c.cloud_score))
        .collect();

    collection
        .iter()
        .enumerate()
        .map(|(i, scene)| {
            let md = &scene.metadata;
            SceneRecord {
                number: i + 1,
                image_id: md.scene_id.clone(),
                satellite: md.spacecraft_id.clone(),
                cloud_cover: md.cloud_cover,
                date_acquired: md.date_acquired().format("%Y-%m-%d").to_string(),
                scene_center_time_utc: md.scene_center_time(),
                scene_center_time_local: md.acquired.with_timezone(offset).format("%H:%M:%S").to_string(),
                wrs_path: md.wrs_path,
                wrs_row: md.wrs_row,
                sun_azimuth: md.sun_azimuth,
                sun_elevation: md.sun_elevation,
                cloud_score: scores.get(md.scene_id.as_str()).copied().flatten(),
            }
        })
        .collect()
}

/// Everything produced for one period
#[derive(Debug, Clone)]
pub struct PeriodOutput {
    pub period: TimePeriod,
    pub name: String,
    pub composite: Composite,
    pub records: Vec<SceneRecord>,
    pub histogram: Vec<HistogramBin>,
    pub path_rows: Vec<(SensorId, Vec<(u32, u32)>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedPeriod {
    pub period: TimePeriod,
    pub name: String,
    pub scene_count: usize,
    pub stat_type: StatType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPeriod {
    pub period: TimePeriod,
    pub reason: String,
}

/// Outcome of a batch run, in period order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: Vec<ProcessedPeriod>,
    pub skipped: Vec<SkippedPeriod>,
}

/// Run state shared by all periods
pub struct RunContext {
    settings: RunSettings,
    harmonizer: SceneHarmonizer,
    compositor: TemporalCompositor,
    sink: Arc<dyn ExportSink>,
}

impl RunContext {
    pub fn new(
        settings: RunSettings,
        source: Arc<dyn SceneSource>,
        providers: ModelProviders,
        sink: Arc<dyn ExportSink>,
    ) -> Self {
        let harmonizer = SceneHarmonizer::new(
            source,
            providers,
            HarmonizerParams {
                emissivity_method: settings.emissivity_method,
                mask_policy: settings.mask_policy,
                ..HarmonizerParams::default()
            },
        );
        let compositor = TemporalCompositor::new(settings.composite);
        Self { settings, harmonizer, compositor, sink }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Harmonise, composite and summarise one period without exporting
    pub fn process_period(&self, period: &TimePeriod) -> LstResult<PeriodOutput> {
        let settings = &self.settings;
        let name = settings.output_name(period);
        log::info!("Processing {} -> {}", period, name);

        let filter = SceneFilter::new(*period, settings.region.clone()).with_cloud_cover(settings.cloud_cover);
        let collection = self
            .harmonizer
            .harmonize_all(&settings.sensors, &filter)?
            .filter_cloud_cover(&settings.cloud_cover);

        if collection.is_empty() {
            return Err(LstError::NoImagesFound { start: period.start, end: period.end });
        }

        let path_rows: Vec<(SensorId, Vec<(u32, u32)>)> = collection.path_rows().into_iter().collect();
        for (sensor, pairs) in &path_rows {
            log::info!("{}: {} distinct path/row", sensor, pairs.len());
            for (path, row) in pairs {
                log::debug!("  path={},row={}", path, row);
            }
        }

        let composite = self.compositor.composite(&collection, &settings.region, period)?;
        let histogram = histogram(&composite.raster, &settings.region, &settings.histogram)?;
        let records = scene_records(&collection, &composite, &settings.local_offset);

        Ok(PeriodOutput {
            period: *period,
            name,
            composite,
            records,
            histogram,
            path_rows,
        })
    }

    /// Process and export one period
    pub fn run_period(&self, period: &TimePeriod) -> LstResult<PeriodOutput> {
        let output = self.process_period(period)?;
        self.sink.export_composite(&output.name, &output.composite)?;
        self.sink.export_scene_table(&format!("{}_metadata", output.name), &output.records)?;
        self.sink.export_histogram(&format!("{}_histogram", output.name), &output.histogram)?;
        log::info!("Finished {} -> {}", period, output.name);
        Ok(output)
    }

    /// Process every configured period. Periods without images are skipped.
    pub fn run(&self) -> LstResult<BatchReport> {
        log::info!(
            "Batch of {} periods, emissivity {}, reducer {}",
            self.settings.periods.len(),
            self.settings.emissivity_method,
            self.settings.stat_type()
        );

        #[cfg(feature = "parallel")]
        let results: Vec<LstResult<PeriodOutput>> = {
            use rayon::prelude::*;
            self.settings.periods.par_iter().map(|p| self.run_period(p)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<LstResult<PeriodOutput>> =
            self.settings.periods.iter().map(|p| self.run_period(p)).collect();

        let mut report = BatchReport::default();
        for (period, result) in self.settings.periods.iter().zip(results) {
            match result {
                Ok(output) => report.processed.push(ProcessedPeriod {
                    period: *period,
                    name: output.name,
                    scene_count: output.records.len(),
                    stat_type: output.composite.stat_type,
                }),
                Err(err) if err.is_skippable() => {
                    log::warn!("Skipping {}: {}", period, err);
                    report.skipped.push(SkippedPeriod {
                        period: *period,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        log::info!(
            "Batch finished: {} processed, {} skipped",
            report.processed.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn settings() -> RunSettings {
        RunSettings {
            periods: vec![],
            region: Region::unbounded("guangzhou"),
            region_label: "city_guangzhou".to_string(),
            sensors: vec![SensorId::L8],
            cloud_cover: CloudCoverRange::default(),
            emissivity_method: EmissivityMethod::Ndvi,
            mask_policy: MaskPolicy::Lenient,
            composite: CompositeParams::default(),
            histogram: HistogramParams::default(),
            local_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
        }
    }

    #[test]
    fn test_output_name() {
        let period = TimePeriod::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        );
        assert_eq!(
            settings().output_name(&period),
            "city_guangzhou_20230101_20231231_cloud_0_100_LST_mean_N"
        );

        let mut aster = settings();
        aster.emissivity_method = EmissivityMethod::Aster;
        aster.composite.stat_type = StatType::ScoreFirst;
        assert!(aster.output_name(&period).ends_with("_LST_score_first_A"));
    }
}
