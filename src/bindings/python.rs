use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use numpy::{PyArray4, PyReadonlyArray4};

use crate::config::AdlConfig;
use crate::error::AdlError;
use crate::layers::AttentionGuidedDropout;
use crate::types::{FeatureShape, Mode};

fn to_py_err(err: AdlError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Python wrapper for AttentionGuidedDropout
#[pyclass(name = "AttentionGuidedDropout")]
pub struct PyAttentionGuidedDropout {
    inner: AttentionGuidedDropout,
}

#[pymethods]
impl PyAttentionGuidedDropout {
    #[new]
    #[pyo3(signature = (
        height,
        width,
        channels,
        adl_threshold = 0.25,
        adl_keep_prob = 0.90,
        droprate = 0.25,
        trainable = true,
        name = None,
        seed = None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        height: usize,
        width: usize,
        channels: usize,
        adl_threshold: f32,
        adl_keep_prob: f32,
        droprate: f32,
        trainable: bool,
        name: Option<String>,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let shape = FeatureShape::new(height, width, channels).map_err(to_py_err)?;
        let mut config = AdlConfig::new(adl_threshold, adl_keep_prob, droprate).map_err(to_py_err)?;
        config.seed = seed;

        let inner = AttentionGuidedDropout::with_metadata(shape, config, name, trainable)
            .map_err(to_py_err)?;
        Ok(PyAttentionGuidedDropout { inner })
    }

    #[pyo3(signature = (inputs, training = false))]
    fn __call__<'py>(
        &mut self,
        py: Python<'py>,
        inputs: PyReadonlyArray4<f32>,
        training: bool,
    ) -> PyResult<&'py PyArray4<f32>> {
        let inputs = inputs.as_array();
        let output = self
            .inner
            .forward(inputs, Mode::from(training))
            .map_err(to_py_err)?;
        Ok(PyArray4::from_array(py, &output))
    }

    fn backward<'py>(
        &self,
        py: Python<'py>,
        grad_output: PyReadonlyArray4<f32>,
    ) -> PyResult<&'py PyArray4<f32>> {
        let grad_output = grad_output.as_array();
        let grad_input = self.inner.backward(grad_output).map_err(to_py_err)?;
        Ok(PyArray4::from_array(py, &grad_input))
    }

    fn reseed(&mut self, seed: u64) {
        self.inner.reseed(seed);
    }

    #[getter]
    fn name(&self) -> Option<String> {
        self.inner.name().map(str::to_string)
    }

    #[getter]
    fn trainable(&self) -> bool {
        self.inner.trainable()
    }

    #[getter]
    fn drop_prob(&self) -> f32 {
        self.inner.drop_prob()
    }

    fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save(path).map_err(to_py_err)
    }

    #[staticmethod]
    fn load(path: &str) -> PyResult<Self> {
        AttentionGuidedDropout::load(path)
            .map(|inner| PyAttentionGuidedDropout { inner })
            .map_err(to_py_err)
    }
}

#[pymodule]
fn adl_dropout(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyAttentionGuidedDropout>()?;
    Ok(())
}
