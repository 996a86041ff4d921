use super::masked::MaskedRaster;
use super::region::Region;
use crate::types::{GeoTransform, LstError, LstResult, Pixel};
use ndarray::Array2;

/// Scalar summary of a raster over a region.
///
/// `weight` is the area-weighted number of contributing pixels at the analysis scale;
/// `mean`, `std_dev`, `min` and `max` are `None` when nothing valid fell inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionReduction {
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub sum: f64,
    pub weight: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Scalar selected from a [`RegionReduction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialReducer {
    Mean,
    StdDev,
    Sum,
    /// Area-weighted pixel count
    Count,
    Min,
    Max,
}

impl RegionReduction {
    pub fn get(&self, reducer: SpatialReducer) -> Option<f64> {
        match reducer {
            SpatialReducer::Mean => self.mean,
            SpatialReducer::StdDev => self.std_dev,
            SpatialReducer::Sum => Some(self.sum),
            SpatialReducer::Count => Some(self.weight),
            SpatialReducer::Min => self.min,
            SpatialReducer::Max => self.max,
        }
    }
}

/// Number of native pixels per side of one analysis cell
pub fn aggregation_factor(geo_transform: &GeoTransform, scale: f64) -> usize {
    let native = geo_transform.pixel_size();
    if native <= 0.0 || !scale.is_finite() || scale <= native {
        return 1;
    }
    ((scale / native).round() as usize).max(1)
}

/// Aggregate `factor` x `factor` blocks into one (value, area weight) sample each.
///
/// The block value is the mean of valid in-region pixels, the weight is the fraction of the
/// block area lying inside the region. Blocks with no valid in-region pixel are dropped, so
/// partially covered scenes still reduce.
fn block_samples(raster: &MaskedRaster, region_mask: &Array2<bool>, factor: usize) -> Vec<(f64, f64)> {
    let (rows, cols) = raster.dim();
    let block_area = (factor * factor) as f64;
    let mut samples = Vec::new();

    for block_row in (0..rows).step_by(factor) {
        for block_col in (0..cols).step_by(factor) {
            let end_row = (block_row + factor).min(rows);
            let end_col = (block_col + factor).min(cols);

            let mut sum = 0.0f64;
            let mut valid = 0usize;
            let mut inside = 0usize;
            for r in block_row..end_row {
                for c in block_col..end_col {
                    if !region_mask[[r, c]] {
                        continue;
                    }
                    inside += 1;
                    if raster.valid[[r, c]] {
                        sum += raster.values[[r, c]];
                        valid += 1;
                    }
                }
            }

            if valid > 0 {
                samples.push((sum / valid as f64, inside as f64 / block_area));
            }
        }
    }

    samples
}

/// Reduce a raster over a region at the given analysis scale (grid units per pixel).
///
/// At native scale every valid in-region pixel has weight 1, so `sum` and `weight` are plain
/// sums and counts. At a coarser scale the raster is block-averaged first and blocks are
/// area-weighted. The standard deviation is the weighted population standard deviation.
pub fn reduce_region(raster: &MaskedRaster, region: &Region, scale: f64) -> LstResult<RegionReduction> {
    let factor = aggregation_factor(&raster.geo_transform, scale);
    let region_mask = region.pixel_mask(&raster.geo_transform, raster.dim());

    let samples = if factor == 1 {
        raster
            .values
            .iter()
            .zip(raster.valid.iter())
            .zip(region_mask.iter())
            .filter_map(|((&v, &ok), &inside)| if ok && inside { Some((v, 1.0)) } else { None })
            .collect::<Vec<_>>()
    } else {
        block_samples(raster, &region_mask, factor)
    };

    log::debug!(
        "Region '{}' reduction at scale {} (factor {}): {} samples",
        region.name,
        scale,
        factor,
        samples.len()
    );

    let weight: f64 = samples.iter().map(|&(_, w)| w).sum();
    if samples.is_empty() || weight <= 0.0 {
        return Ok(RegionReduction::default());
    }

    let sum: f64 = samples.iter().map(|&(v, w)| v * w).sum();
    let mean = sum / weight;
    let variance = samples.iter().map(|&(v, w)| w * (v - mean).powi(2)).sum::<f64>() / weight;
    let min = samples.iter().map(|&(v, _)| v).fold(f64::INFINITY, f64::min);
    let max = samples.iter().map(|&(v, _)| v).fold(f64::NEG_INFINITY, f64::max);

    if !mean.is_finite() {
        return Err(LstError::Processing(format!(
            "non-finite mean while reducing region '{}'",
            region.name
        )));
    }

    Ok(RegionReduction {
        mean: Some(mean),
        std_dev: Some(variance.max(0.0).sqrt()),
        sum,
        weight,
        min: Some(min),
        max: Some(max),
    })
}

/// Block-average a raster onto a coarser grid, ignoring invalid pixels.
///
/// A coarse cell is valid when at least one of its native pixels is valid.
pub fn block_average(raster: &MaskedRaster, factor: usize) -> LstResult<MaskedRaster> {
    if factor == 0 {
        return Err(LstError::Processing("aggregation factor must be positive".to_string()));
    }
    if factor == 1 {
        return Ok(raster.clone());
    }

    let (rows, cols) = raster.dim();
    let out_rows = (rows + factor - 1) / factor;
    let out_cols = (cols + factor - 1) / factor;

    log::debug!(
        "Block averaging {}x{} raster by {} -> {}x{}",
        rows,
        cols,
        factor,
        out_rows,
        out_cols
    );

    let mut values = Array2::<Pixel>::from_elem((out_rows, out_cols), Pixel::NAN);
    let mut valid = Array2::<bool>::from_elem((out_rows, out_cols), false);

    for out_row in 0..out_rows {
        for out_col in 0..out_cols {
            let start_row = out_row * factor;
            let end_row = ((out_row + 1) * factor).min(rows);
            let start_col = out_col * factor;
            let end_col = ((out_col + 1) * factor).min(cols);

            let mut sum = 0.0f64;
            let mut count = 0usize;
            for in_row in start_row..end_row {
                for in_col in start_col..end_col {
                    if raster.valid[[in_row, in_col]] {
                        sum += raster.values[[in_row, in_col]];
                        count += 1;
                    }
                }
            }

            if count > 0 {
                values[[out_row, out_col]] = sum / count as f64;
                valid[[out_row, out_col]] = true;
            }
        }
    }

    MaskedRaster::new(values, valid, raster.geo_transform.coarsened(factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn grid() -> GeoTransform {
        GeoTransform::north_up(0.0, 120.0, 30.0)
    }

    #[test]
    fn test_native_scale_mean_and_std() {
        let raster = MaskedRaster::from_values(array![[1.0, 2.0], [3.0, 4.0]], grid());
        let stats = reduce_region(&raster, &Region::unbounded("all"), 30.0).unwrap();
        assert_abs_diff_eq!(stats.mean.unwrap(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.std_dev.unwrap(), 1.25f64.sqrt(), epsilon = 1e-12);
        assert_eq!(stats.weight, 4.0);
        assert_eq!(stats.sum, 10.0);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.get(SpatialReducer::Count), Some(4.0));
    }

    #[test]
    fn test_invalid_and_outside_pixels_are_ignored() {
        let raster = MaskedRaster::new(
            array![[1.0, 100.0], [3.0, 5.0]],
            array![[true, false], [true, true]],
            grid(),
        )
        .unwrap();
        // left column only: x in [0, 30)
        let region = Region::rectangle("left", BoundingBox::new(0.0, 0.0, 29.0, 120.0));
        let stats = reduce_region(&raster, &region, 30.0).unwrap();
        assert_eq!(stats.weight, 2.0);
        assert_abs_diff_eq!(stats.mean.unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_region_reduces_to_nothing() {
        let raster = MaskedRaster::invalid((2, 2), grid());
        let stats = reduce_region(&raster, &Region::unbounded("all"), 30.0).unwrap();
        assert_eq!(stats.mean, None);
        assert_eq!(stats.weight, 0.0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_coarse_scale_block_weights() {
        // 4x4 raster, 2x2 blocks -> four blocks with means 1, 2, 3, 4
        let values = Array::from_shape_vec(
            (4, 4),
            vec![
                1.0, 1.0, 2.0, 2.0,
                1.0, 1.0, 2.0, 2.0,
                3.0, 3.0, 4.0, 4.0,
                3.0, 3.0, 4.0, 4.0,
            ],
        )
        .unwrap();
        let raster = MaskedRaster::from_values(values, grid());
        let stats = reduce_region(&raster, &Region::unbounded("all"), 60.0).unwrap();
        assert_eq!(stats.weight, 4.0);
        assert_abs_diff_eq!(stats.mean.unwrap(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_block_average() {
        let raster = MaskedRaster::new(
            array![[1.0, 3.0, 5.0], [f64::NAN, 5.0, 7.0]],
            array![[true, true, true], [false, true, true]],
            grid(),
        )
        .unwrap();
        let coarse = block_average(&raster, 2).unwrap();
        assert_eq!(coarse.dim(), (1, 2));
        assert_abs_diff_eq!(coarse.get(0, 0).unwrap(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(coarse.get(0, 1).unwrap(), 6.0, epsilon = 1e-12);
        assert_eq!(coarse.geo_transform.pixel_width, 60.0);
    }

    #[test]
    fn test_aggregation_factor() {
        let gt = GeoTransform::north_up(0.0, 0.0, 30.0);
        assert_eq!(aggregation_factor(&gt, 900.0), 30);
        assert_eq!(aggregation_factor(&gt, 30.0), 1);
        assert_eq!(aggregation_factor(&gt, 10.0), 1);
    }
}
