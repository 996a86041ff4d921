//! Local archive of Collection 2 products.
//!
//! Products are discovered through their `*_MTL.xml` files; band GeoTIFFs sit next to the
//! MTL as named in its `PRODUCT_CONTENTS`. Level-1 products serve the top-of-atmosphere
//! collections (thermal bands calibrated to brightness temperature) and Level-2 products
//! serve the surface reflectance collections.

use crate::core::scene::SceneFilter;
use crate::core::sensor_catalog::{self, SensorSpec};
use crate::io::mtl::MtlParser;
use crate::io::product_id::ProductId;
use crate::types::{BoundingBox, LstError, LstResult, SceneMetadata};
use std::fs;
use std::path::{Path, PathBuf};

/// One indexed product
#[derive(Debug, Clone)]
pub struct ArchiveProduct {
    pub mtl_path: PathBuf,
    pub product: ProductId,
    pub metadata: SceneMetadata,
    pub footprint: BoundingBox,
}

impl ArchiveProduct {
    pub fn directory(&self) -> &Path {
        self.mtl_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductKind {
    TopOfAtmosphere,
    SurfaceReflectance,
}

/// Resolve a collection reference ("LANDSAT/LC08/C02/T1_TOA") to its sensor and product kind
fn resolve_collection(collection: &str) -> LstResult<(&'static SensorSpec, ProductKind)> {
    sensor_catalog::all()
        .iter()
        .find_map(|spec| {
            if spec.toa_collection == collection {
                Some((spec, ProductKind::TopOfAtmosphere))
            } else if spec.sr_collection == collection {
                Some((spec, ProductKind::SurfaceReflectance))
            } else {
                None
            }
        })
        .ok_or_else(|| LstError::Config(format!("unknown collection {}", collection)))
}

fn find_mtl_files(dir: &Path, found: &mut Vec<PathBuf>) -> LstResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            find_mtl_files(&path, found)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with("_MTL.xml"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Index of the products found below a directory
#[derive(Debug, Clone, Default)]
pub struct LandsatArchive {
    products: Vec<ArchiveProduct>,
}

impl LandsatArchive {
    /// Index every `*_MTL.xml` below `root`. Unreadable MTL files are logged and skipped.
    pub fn scan<P: AsRef<Path>>(root: P) -> LstResult<Self> {
        let mut mtl_files = Vec::new();
        find_mtl_files(root.as_ref(), &mut mtl_files)?;
        mtl_files.sort();

        let mut products = Vec::with_capacity(mtl_files.len());
        for path in mtl_files {
            match Self::index_product(&path) {
                Ok(product) => products.push(product),
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        log::info!("Indexed {} products below {}", products.len(), root.as_ref().display());
        Ok(Self { products })
    }

    fn index_product(path: &Path) -> LstResult<ArchiveProduct> {
        let mtl = MtlParser::load(path)?;
        Ok(ArchiveProduct {
            mtl_path: path.to_path_buf(),
            product: mtl.product_id()?,
            metadata: mtl.to_scene_metadata()?,
            footprint: mtl.footprint()?,
        })
    }

    pub fn products(&self) -> &[ArchiveProduct] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Products of `collection` accepted by `filter`, in acquisition order
    pub fn select(&self, collection: &str, filter: &SceneFilter) -> LstResult<Vec<&ArchiveProduct>> {
        let (spec, kind) = resolve_collection(collection)?;
        let mut selected: Vec<&ArchiveProduct> = self
            .products
            .iter()
            .filter(|p| p.product.sensor == spec.sensor)
            .filter(|p| p.product.level.is_level2() == (kind == ProductKind::SurfaceReflectance))
            .filter(|p| filter.accepts(&p.metadata, &p.footprint))
            .collect();
        selected.sort_by_key(|p| p.metadata.acquired);
        log::debug!("{}: {} of {} products selected", collection, selected.len(), self.products.len());
        Ok(selected)
    }
}

#[cfg(feature = "gdal")]
mod loading {
    use super::*;
    use crate::core::harmonize::SceneSource;
    use crate::core::scene::{Scene, SceneCollection};
    use crate::core::sensor_catalog::QA_PIXEL;
    use crate::io::mtl::MtlDocument;
    use crate::raster::{MaskedRaster, RasterExpr};
    use crate::types::GeoTransform;
    use gdal::Dataset;
    use ndarray::Array2;

    /// Read the first band of a GeoTIFF; the file's no-data value becomes invalid
    pub fn read_band(path: &Path) -> LstResult<MaskedRaster> {
        let dataset = Dataset::open(path)?;
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let no_data = band.no_data_value();
        let buffer = band.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        let values = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| LstError::Processing(format!("Failed to reshape {}: {}", path.display(), e)))?;
        Ok(MaskedRaster::with_no_data(values, geo_transform, no_data))
    }

    fn load_scene(product: &ArchiveProduct, spec: &SensorSpec, kind: ProductKind) -> LstResult<Scene> {
        let mtl: MtlDocument = MtlParser::load(&product.mtl_path)?;
        let files = mtl.band_files();
        let wanted: Vec<&str> = match kind {
            ProductKind::SurfaceReflectance => spec.visible_bands(),
            ProductKind::TopOfAtmosphere => {
                let mut bands = spec.thermal_bands.to_vec();
                bands.push(QA_PIXEL);
                bands
            }
        };

        let mut scene: Option<Scene> = None;
        for band in wanted {
            let Some(file) = files.get(band) else {
                log::debug!("{} has no {} band", product.product, band);
                continue;
            };
            let mut raster = read_band(&product.directory().join(file))?;
            if kind == ProductKind::TopOfAtmosphere && spec.thermal_bands.contains(&band) {
                let constants = mtl.thermal_constants(band)?;
                raster = raster.map_valid(|dn| constants.brightness_temperature(dn).unwrap_or(f64::NAN));
            }
            let target = scene.get_or_insert_with(|| {
                Scene::new(product.metadata.clone(), raster.dim(), raster.geo_transform)
            });
            target.add_band(band, RasterExpr::source(raster))?;
        }

        scene.ok_or_else(|| LstError::Metadata(format!("{} lists none of the required bands", product.product)))
    }

    impl SceneSource for LandsatArchive {
        fn fetch(&self, collection: &str, filter: &SceneFilter) -> LstResult<SceneCollection> {
            let (spec, kind) = resolve_collection(collection)?;
            let products = self.select(collection, filter)?;
            let scenes = products
                .into_iter()
                .map(|p| load_scene(p, spec, kind))
                .collect::<LstResult<Vec<Scene>>>()?;
            Ok(SceneCollection::from(scenes))
        }
    }
}

#[cfg(feature = "gdal")]
pub use loading::read_band;
