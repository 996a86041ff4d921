//! Fixed-axis histogram of a composite

use crate::raster::{aggregation_factor, block_average, MaskedRaster, Region};
use crate::types::{LstError, LstResult, Pixel};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of bins an axis may define
pub const MAX_BINS: usize = 100_000;

/// Temperature axis of the histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramParams {
    pub min: f64,
    pub max: f64,
    pub width: f64,
    /// Block-average to this scale before counting; native pixels when `None`
    pub scale: Option<f64>,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            min: -30.0,
            max: 60.0,
            width: 2.0,
            scale: None,
        }
    }
}

impl HistogramParams {
    pub fn validate(&self) -> LstResult<()> {
        if !(self.width > 0.0) || !self.width.is_finite() {
            return Err(LstError::Config(format!("histogram bin width must be positive, got {}", self.width)));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(LstError::Config(format!(
                "histogram bounds must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if !(self.max > self.min) {
            return Err(LstError::Config(format!(
                "histogram max {} must exceed min {}",
                self.max, self.min
            )));
        }
        let count = self.raw_bin_count();
        if !(count <= MAX_BINS as f64) {
            return Err(LstError::Config(format!(
                "histogram axis [{}, {}) with width {} needs {} bins, limit is {}",
                self.min, self.max, self.width, count, MAX_BINS
            )));
        }
        Ok(())
    }

    fn raw_bin_count(&self) -> f64 {
        ((self.max - self.min) / self.width).floor()
    }

    /// Number of whole bins on the axis, capped at `MAX_BINS`
    pub fn bin_count(&self) -> usize {
        let count = self.raw_bin_count();
        if count.is_nan() || count <= 0.0 {
            0
        } else {
            count.min(MAX_BINS as f64) as usize
        }
    }

    /// Empty bins spanning the axis
    pub fn bins(&self) -> Vec<HistogramBin> {
        (0..self.bin_count())
            .map(|i| {
                let lower = self.min + i as f64 * self.width;
                let upper = (lower + self.width).min(self.max);
                HistogramBin::new(lower, upper, 0)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
    pub label: String,
}

impl HistogramBin {
    pub fn new(lower: f64, upper: f64, count: u64) -> Self {
        Self {
            lower,
            upper,
            count,
            label: format!("{:.1} - {:.1} °C", lower, upper),
        }
    }

    pub fn contains(&self, value: Pixel) -> bool {
        value >= self.lower && value < self.upper
    }
}

/// Locate the bin holding `value`, correcting for rounding at the edges
fn bin_index(bins: &[HistogramBin], params: &HistogramParams, value: Pixel) -> Option<usize> {
    if bins.is_empty() || !value.is_finite() {
        return None;
    }
    let guess = ((value - params.min) / params.width).floor();
    if guess < -1.0 || guess > bins.len() as f64 {
        return None;
    }
    let guess = guess.max(0.0) as usize;
    let lo = guess.saturating_sub(1);
    let hi = (guess + 1).min(bins.len() - 1);
    (lo..=hi).find(|&i| bins[i].contains(value))
}

/// Count valid region pixels of `raster` into the fixed bins. Empty bins are kept.
pub fn histogram(raster: &MaskedRaster, region: &Region, params: &HistogramParams) -> LstResult<Vec<HistogramBin>> {
    params.validate()?;

    let factor = params
        .scale
        .map_or(1, |scale| aggregation_factor(&raster.geo_transform, scale));
    let sampled = block_average(raster, factor)?;
    let inside = region.pixel_mask(&sampled.geo_transform, sampled.dim());

    let mut bins = params.bins();
    let mut outside_axis = 0usize;
    for ((&value, &ok), &in_region) in sampled.values.iter().zip(sampled.valid.iter()).zip(inside.iter()) {
        if !(ok && in_region) {
            continue;
        }
        match bin_index(&bins, params, value) {
            Some(i) => bins[i].count += 1,
            None => outside_axis += 1,
        }
    }

    if outside_axis > 0 {
        log::debug!("{} pixels of '{}' fall outside the histogram axis", outside_axis, region.name);
    }
    Ok(bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use ndarray::array;

    fn raster(values: ndarray::Array2<f64>) -> MaskedRaster {
        MaskedRaster::from_values(values, GeoTransform::north_up(0.0, 60.0, 30.0))
    }

    #[test]
    fn test_default_axis() {
        let bins = HistogramParams::default().bins();
        assert_eq!(bins.len(), 45);
        assert_eq!(bins[0].label, "-30.0 - -28.0 °C");
        assert_eq!(bins[44].upper, 60.0);
    }

    #[test]
    fn test_counts_sum_to_valid_pixels() {
        let r = raster(array![[-30.0, -29.5, 0.0, 21.0], [22.0, 59.99, f64::NAN, 35.5]]);
        let bins = histogram(&r, &Region::unbounded("all"), &HistogramParams::default()).unwrap();
        let total: u64 = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, r.valid_count() as u64);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[15].count, 1); // [0, 2)
        assert_eq!(bins[25].count, 1); // [20, 22)
        assert_eq!(bins[26].count, 1); // [22, 24)
        assert_eq!(bins[44].count, 1);
    }

    #[test]
    fn test_upper_edge_is_exclusive() {
        let r = raster(array![[60.0, -30.1, 2.0]]);
        let bins = histogram(&r, &Region::unbounded("all"), &HistogramParams::default()).unwrap();
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 1);
        assert_eq!(bins[16].count, 1);
    }

    #[test]
    fn test_uneven_axis_truncates_bin_count() {
        let params = HistogramParams { min: 0.0, max: 5.0, width: 2.0, scale: None };
        let bins = params.bins();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[1].upper, 4.0);
    }

    #[test]
    fn test_invalid_axis() {
        let params = HistogramParams { width: 0.0, ..HistogramParams::default() };
        assert!(matches!(params.validate(), Err(LstError::Config(_))));
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        let open_top = HistogramParams { min: 0.0, max: f64::INFINITY, width: 1.0, scale: None };
        assert!(matches!(open_top.validate(), Err(LstError::Config(_))));
        assert!(open_top.bin_count() <= MAX_BINS);

        let r = raster(array![[1.0, 2.0]]);
        assert!(matches!(
            histogram(&r, &Region::unbounded("all"), &open_top),
            Err(LstError::Config(_))
        ));

        let nan_floor = HistogramParams { min: f64::NAN, ..HistogramParams::default() };
        assert!(matches!(nan_floor.validate(), Err(LstError::Config(_))));
        assert_eq!(nan_floor.bin_count(), 0);
    }

    #[test]
    fn test_excessive_bin_count_rejected() {
        let fine = HistogramParams { width: 1e-12, ..HistogramParams::default() };
        assert!(matches!(fine.validate(), Err(LstError::Config(_))));
        assert_eq!(fine.bin_count(), MAX_BINS);

        let at_limit = HistogramParams { min: 0.0, max: MAX_BINS as f64, width: 1.0, scale: None };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.bin_count(), MAX_BINS);
    }
}
