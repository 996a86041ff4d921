//! landsat-lst: multi-sensor Landsat land surface temperature
//!
//! Harmonises Landsat 4/5/7/8/9 scenes into a common band vocabulary (cloud masked
//! reflectance, NDVI, emissivity, LST) and reduces them per period into robust temporal
//! composites, with scene tables and temperature histograms for every composite.

pub mod types;
pub mod raster;
pub mod core;
pub mod io;

// Re-export main types
pub use types::{
    BoundingBox, CloudCoverRange, GeoTransform, LstError, LstResult, SceneMetadata, SensorId, TimePeriod,
};
pub use raster::{MaskedRaster, RasterExpr, Region};
pub use core::{
    BatchReport, Composite, CompositeParams, RunContext, Scene, SceneCollection, SceneHarmonizer, StatType,
    TemporalCompositor,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::emissivity::NdviEmissivityModel;
    use crate::core::histogram::{histogram, HistogramParams};
    use crate::core::providers::EmissivityCorrectedBrightness;
    use crate::core::spectral_index::{is_physical_ndvi, ndvi_from_dn};
    use crate::core::temporal_composite::{CompositeParams, Observation, StatType, TemporalCompositor};
    use crate::raster::{MaskedRaster, RasterExpr, Region};
    use crate::types::{GeoTransform, SensorId};
    use chrono::{TimeZone, Utc};
    use numpy::{PyReadonlyArray2, ToPyArray};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    /// Convert PyReadonlyArray2 to ndarray Array2
    fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
    where
        T: Copy + numpy::Element,
    {
        arr.as_array().to_owned()
    }

    fn value_error<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> PyErr + '_ {
        move |e| PyValueError::new_err(format!("{}: {}", context, e))
    }

    fn grid(pixel_size: f64) -> GeoTransform {
        GeoTransform::north_up(0.0, 0.0, pixel_size)
    }

    /// NDVI from Collection 2 surface reflectance digital numbers; NaN outside [-1, 1]
    #[pyfunction]
    fn ndvi(py: Python, nir: PyReadonlyArray2<f64>, red: PyReadonlyArray2<f64>) -> PyResult<PyObject> {
        let nir = numpy_to_array2(nir);
        let red = numpy_to_array2(red);
        if nir.dim() != red.dim() {
            return Err(PyValueError::new_err("nir and red must have the same shape"));
        }
        let mut out = ndarray::Array2::<f64>::from_elem(nir.dim(), f64::NAN);
        ndarray::Zip::from(&mut out).and(&nir).and(&red).for_each(|o, &n, &r| {
            if let Some(v) = ndvi_from_dn(n, r).filter(|v| is_physical_ndvi(*v)) {
                *o = v;
            }
        });
        Ok(out.to_pyarray(py).into())
    }

    /// NDVI threshold emissivity
    #[pyfunction]
    fn ndvi_emissivity(py: Python, ndvi: PyReadonlyArray2<f64>) -> PyResult<PyObject> {
        let model = NdviEmissivityModel::default();
        let em = numpy_to_array2(ndvi).mapv(|v| if v.is_finite() { model.emissivity(v) } else { f64::NAN });
        Ok(em.to_pyarray(py).into())
    }

    /// Emissivity-corrected brightness temperature (Kelvin) for a sensor id ("L8")
    #[pyfunction]
    fn single_channel_lst(
        py: Python,
        brightness_temperature: PyReadonlyArray2<f64>,
        emissivity: PyReadonlyArray2<f64>,
        sensor: &str,
    ) -> PyResult<PyObject> {
        let sensor: SensorId = sensor.parse().map_err(value_error("Invalid sensor"))?;
        let model = EmissivityCorrectedBrightness::for_sensor(sensor);
        let bt = numpy_to_array2(brightness_temperature);
        let em = numpy_to_array2(emissivity);
        if bt.dim() != em.dim() {
            return Err(PyValueError::new_err("brightness temperature and emissivity shapes differ"));
        }
        let mut out = ndarray::Array2::<f64>::zeros(bt.dim());
        ndarray::Zip::from(&mut out)
            .and(&bt)
            .and(&em)
            .for_each(|o, &t, &e| *o = model.lst(t, e));
        Ok(out.to_pyarray(py).into())
    }

    /// Composite a stack of Kelvin LST arrays (NaN = no data) in acquisition order
    #[pyfunction]
    #[pyo3(signature = (stack, stat_type = "mean", pixel_size = 30.0, scores = None, z_threshold = 4.0))]
    fn composite_lst(
        py: Python,
        stack: Vec<PyReadonlyArray2<f64>>,
        stat_type: &str,
        pixel_size: f64,
        scores: Option<Vec<f64>>,
        z_threshold: f64,
    ) -> PyResult<PyObject> {
        let stat: StatType = stat_type.parse().map_err(value_error("Invalid stat type"))?;
        if let Some(scores) = &scores {
            if scores.len() != stack.len() {
                return Err(PyValueError::new_err("one score per layer is required"));
            }
        }
        let compositor = TemporalCompositor::new(CompositeParams {
            stat_type: stat,
            z_threshold,
            ..CompositeParams::default()
        });

        let mut observations = Vec::with_capacity(stack.len());
        for (i, layer) in stack.into_iter().enumerate() {
            let kelvin = MaskedRaster::from_values(numpy_to_array2(layer), grid(pixel_size));
            let lst = compositor
                .prepare(RasterExpr::source(kelvin))
                .materialize()
                .map_err(value_error("Layer preparation failed"))?;
            let acquired = Utc
                .timestamp_opt(i as i64 * 86_400, 0)
                .single()
                .ok_or_else(|| PyValueError::new_err("too many layers"))?;
            observations.push(Observation {
                scene_id: format!("layer_{}", i),
                sensor: SensorId::L8,
                acquired,
                cloud_score: scores.as_ref().map(|s| s[i]),
                lst,
            });
        }

        let composite = compositor
            .composite_observations(observations, &Region::unbounded("stack"))
            .map_err(value_error("Compositing failed"))?;
        let data = composite.raster.values.clone()
            * composite.raster.valid.mapv(|ok| if ok { 1.0 } else { f64::NAN });

        let result = PyDict::new(py);
        result.set_item("data", data.to_pyarray(py))?;
        result.set_item("stat_type", composite.stat_type.as_str())?;
        result.set_item("order", composite.scene_ids())?;
        result.set_item("region_mean", composite.stats.map(|s| s.mean))?;
        result.set_item("region_std_dev", composite.stats.map(|s| s.std_dev))?;
        result.set_item("valid_pixels", composite.raster.valid_count())?;
        Ok(result.into())
    }

    /// Histogram of a Celsius composite as (label, count) pairs
    #[pyfunction]
    #[pyo3(signature = (composite, min = -30.0, max = 60.0, width = 2.0))]
    fn lst_histogram(composite: PyReadonlyArray2<f64>, min: f64, max: f64, width: f64) -> PyResult<Vec<(String, u64)>> {
        let raster = MaskedRaster::from_values(numpy_to_array2(composite), grid(30.0));
        let params = HistogramParams { min, max, width, scale: None };
        let bins = histogram(&raster, &Region::unbounded("composite"), &params)
            .map_err(value_error("Histogram failed"))?;
        Ok(bins.into_iter().map(|b| (b.label, b.count)).collect())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(ndvi, m)?)?;
        m.add_function(wrap_pyfunction!(ndvi_emissivity, m)?)?;
        m.add_function(wrap_pyfunction!(single_channel_lst, m)?)?;
        m.add_function(wrap_pyfunction!(composite_lst, m)?)?;
        m.add_function(wrap_pyfunction!(lst_histogram, m)?)?;
        Ok(())
    }
}
