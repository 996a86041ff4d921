//! Export sinks for composites, scene tables and histograms

use crate::core::batch::SceneRecord;
use crate::core::histogram::HistogramBin;
use crate::core::temporal_composite::Composite;
use crate::types::{LstError, LstResult};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Receiver of the products of each processed period
pub trait ExportSink: Send + Sync {
    fn export_composite(&self, name: &str, composite: &Composite) -> LstResult<()>;
    fn export_scene_table(&self, name: &str, records: &[SceneRecord]) -> LstResult<()>;
    fn export_histogram(&self, name: &str, bins: &[HistogramBin]) -> LstResult<()>;
}

/// Keeps every export in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    composites: Mutex<HashMap<String, Composite>>,
    tables: Mutex<HashMap<String, Vec<SceneRecord>>>,
    histograms: Mutex<HashMap<String, Vec<HistogramBin>>>,
}

fn poisoned<T>(_: T) -> LstError {
    LstError::Processing("export sink lock poisoned".to_string())
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composite(&self, name: &str) -> Option<Composite> {
        self.composites.lock().ok()?.get(name).cloned()
    }

    pub fn scene_table(&self, name: &str) -> Option<Vec<SceneRecord>> {
        self.tables.lock().ok()?.get(name).cloned()
    }

    pub fn histogram(&self, name: &str) -> Option<Vec<HistogramBin>> {
        self.histograms.lock().ok()?.get(name).cloned()
    }

    /// Names of exported composites, sorted
    pub fn composite_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .composites
            .lock()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl ExportSink for MemorySink {
    fn export_composite(&self, name: &str, composite: &Composite) -> LstResult<()> {
        self.composites
            .lock()
            .map_err(poisoned)?
            .insert(name.to_string(), composite.clone());
        Ok(())
    }

    fn export_scene_table(&self, name: &str, records: &[SceneRecord]) -> LstResult<()> {
        self.tables.lock().map_err(poisoned)?.insert(name.to_string(), records.to_vec());
        Ok(())
    }

    fn export_histogram(&self, name: &str, bins: &[HistogramBin]) -> LstResult<()> {
        self.histograms.lock().map_err(poisoned)?.insert(name.to_string(), bins.to_vec());
        Ok(())
    }
}

/// Composite grid written when GeoTIFF output is unavailable
#[cfg(not(feature = "gdal"))]
#[derive(Debug, Serialize)]
struct CompositeDocument<'a> {
    stat_type: &'a str,
    geo_transform: [f64; 6],
    rows: usize,
    cols: usize,
    scenes: Vec<&'a str>,
    region_mean: Option<f64>,
    region_std_dev: Option<f64>,
    /// Row-major pixels, `null` where invalid
    values: Vec<Vec<Option<f64>>>,
}

/// Writes exports as files below a directory.
///
/// Tables become CSV. Composites become GeoTIFF with the `gdal` feature and a JSON grid
/// otherwise.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    /// EPSG code assigned to GeoTIFF output
    pub epsg: Option<u32>,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(root: P) -> LstResult<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self { root: root.as_ref().to_path_buf(), epsg: None })
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn path_for(&self, name: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, extension))
    }

    fn write_csv<T: Serialize>(&self, name: &str, rows: &[T]) -> LstResult<PathBuf> {
        let path = self.path_for(name, "csv");
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    #[cfg(feature = "gdal")]
    fn write_composite(&self, name: &str, composite: &Composite) -> LstResult<PathBuf> {
        use gdal::DriverManager;

        let path = self.path_for(name, "tif");
        let raster = &composite.raster;
        let (height, width) = raster.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f64, _>(&path, width as isize, height as isize, 1)?;
        dataset.set_geo_transform(&raster.geo_transform.to_gdal())?;
        if let Some(epsg) = self.epsg {
            dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_epsg(epsg)?)?;
        }

        let mut band = dataset.rasterband(1)?;
        let flat: Vec<f64> = raster
            .values
            .iter()
            .zip(raster.valid.iter())
            .map(|(&v, &ok)| if ok { v } else { f64::NAN })
            .collect();
        let buffer = gdal::raster::Buffer::new((width, height), flat);
        band.write((0, 0), (width, height), &buffer)?;
        band.set_no_data_value(Some(f64::NAN))?;
        Ok(path)
    }

    #[cfg(not(feature = "gdal"))]
    fn write_composite(&self, name: &str, composite: &Composite) -> LstResult<PathBuf> {
        let path = self.path_for(name, "json");
        let raster = &composite.raster;
        let (rows, cols) = raster.dim();
        let values = (0..rows)
            .map(|r| (0..cols).map(|c| raster.get(r, c)).collect())
            .collect();
        let document = CompositeDocument {
            stat_type: composite.stat_type.as_str(),
            geo_transform: raster.geo_transform.to_gdal(),
            rows,
            cols,
            scenes: composite.scene_ids(),
            region_mean: composite.stats.map(|s| s.mean),
            region_std_dev: composite.stats.map(|s| s.std_dev),
            values,
        };
        fs::write(&path, serde_json::to_string(&document)?)?;
        Ok(path)
    }
}

impl ExportSink for DirectorySink {
    fn export_composite(&self, name: &str, composite: &Composite) -> LstResult<()> {
        let path = self.write_composite(name, composite)?;
        log::info!("Composite saved to: {}", path.display());
        Ok(())
    }

    fn export_scene_table(&self, name: &str, records: &[SceneRecord]) -> LstResult<()> {
        let path = self.write_csv(name, records)?;
        log::info!("Scene table ({} rows) saved to: {}", records.len(), path.display());
        Ok(())
    }

    fn export_histogram(&self, name: &str, bins: &[HistogramBin]) -> LstResult<()> {
        let path = self.write_csv(name, bins)?;
        log::debug!("Histogram saved to: {}", path.display());
        Ok(())
    }
}
