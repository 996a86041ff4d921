use crate::types::{GeoTransform, LstError, LstResult, Pixel};
use ndarray::{Array2, Zip};

/// Round to a fixed number of decimal places, half away from zero
pub fn quantize(value: Pixel, decimals: i32) -> Pixel {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// A materialised raster: values plus a per-pixel validity mask on a georeferenced grid.
///
/// Invalid pixels keep whatever number sits in `values`; every consumer must check `valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRaster {
    pub values: Array2<Pixel>,
    pub valid: Array2<bool>,
    pub geo_transform: GeoTransform,
}

impl MaskedRaster {
    pub fn new(values: Array2<Pixel>, valid: Array2<bool>, geo_transform: GeoTransform) -> LstResult<Self> {
        if values.dim() != valid.dim() {
            return Err(LstError::GridMismatch(format!(
                "value array {:?} and mask {:?} differ in shape",
                values.dim(),
                valid.dim()
            )));
        }
        Ok(Self { values, valid, geo_transform })
    }

    /// Wrap plain values; non-finite pixels are invalid
    pub fn from_values(values: Array2<Pixel>, geo_transform: GeoTransform) -> Self {
        let valid = values.mapv(|v| v.is_finite());
        Self { values, valid, geo_transform }
    }

    /// Wrap values read from a file, treating `no_data` as invalid
    pub fn with_no_data(values: Array2<Pixel>, geo_transform: GeoTransform, no_data: Option<Pixel>) -> Self {
        let valid = values.mapv(|v| v.is_finite() && no_data.map_or(true, |nd| v != nd));
        Self { values, valid, geo_transform }
    }

    pub fn filled(shape: (usize, usize), value: Pixel, geo_transform: GeoTransform) -> Self {
        Self {
            values: Array2::from_elem(shape, value),
            valid: Array2::from_elem(shape, value.is_finite()),
            geo_transform,
        }
    }

    /// Raster with every pixel invalid
    pub fn invalid(shape: (usize, usize), geo_transform: GeoTransform) -> Self {
        Self {
            values: Array2::from_elem(shape, Pixel::NAN),
            valid: Array2::from_elem(shape, false),
            geo_transform,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Value at (row, col) if the pixel is valid
    pub fn get(&self, row: usize, col: usize) -> Option<Pixel> {
        match self.valid.get((row, col)) {
            Some(true) => self.values.get((row, col)).copied(),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn same_grid(&self, other: &MaskedRaster) -> bool {
        self.dim() == other.dim() && self.geo_transform == other.geo_transform
    }

    /// Apply `f` to valid pixels; results that are not finite become invalid
    pub fn map_valid<F>(&self, f: F) -> MaskedRaster
    where
        F: Fn(Pixel) -> Pixel,
    {
        let mut values = Array2::<Pixel>::from_elem(self.dim(), Pixel::NAN);
        let mut valid = Array2::<bool>::from_elem(self.dim(), false);
        Zip::from(&mut values)
            .and(&mut valid)
            .and(&self.values)
            .and(&self.valid)
            .for_each(|out, ok, &x, &x_ok| {
                if x_ok {
                    let y = f(x);
                    *out = y;
                    *ok = y.is_finite();
                }
            });
        MaskedRaster { values, valid, geo_transform: self.geo_transform }
    }

    /// Pixel-wise binary operation; a pixel is valid only if both inputs are
    pub fn zip_with<F>(&self, other: &MaskedRaster, f: F) -> LstResult<MaskedRaster>
    where
        F: Fn(Pixel, Pixel) -> Pixel,
    {
        if self.dim() != other.dim() {
            return Err(LstError::GridMismatch(format!(
                "cannot combine rasters of shape {:?} and {:?}",
                self.dim(),
                other.dim()
            )));
        }
        let mut values = Array2::<Pixel>::from_elem(self.dim(), Pixel::NAN);
        let mut valid = Array2::<bool>::from_elem(self.dim(), false);
        Zip::from(&mut values)
            .and(&mut valid)
            .and(&self.values)
            .and(&self.valid)
            .and(&other.values)
            .and(&other.valid)
            .for_each(|out, ok, &x, &x_ok, &y, &y_ok| {
                if x_ok && y_ok {
                    let z = f(x, y);
                    *out = z;
                    *ok = z.is_finite();
                }
            });
        Ok(MaskedRaster { values, valid, geo_transform: self.geo_transform })
    }

    /// Clear pixels where `keep` is false, leaving values untouched
    pub fn update_mask(&self, keep: &Array2<bool>) -> LstResult<MaskedRaster> {
        if keep.dim() != self.dim() {
            return Err(LstError::GridMismatch(format!(
                "mask shape {:?} does not match raster shape {:?}",
                keep.dim(),
                self.dim()
            )));
        }
        let mut out = self.clone();
        Zip::from(&mut out.valid).and(keep).for_each(|ok, &k| *ok = *ok && k);
        Ok(out)
    }

    /// Round valid pixels to `decimals` places
    pub fn quantized(&self, decimals: i32) -> MaskedRaster {
        self.map_valid(|v| quantize(v, decimals))
    }

    /// Valid pixel values in row-major order
    pub fn valid_values(&self) -> Vec<Pixel> {
        self.values
            .iter()
            .zip(self.valid.iter())
            .filter_map(|(&v, &ok)| if ok { Some(v) } else { None })
            .collect()
    }
}
