//! Python bindings for the coherence and flat-earth building blocks

use crate::core::coherence::{self, CoherenceWindow};
use crate::core::flat_earth;
use crate::core::geometry::PixelSpacing;
use crate::core::polynomial::{FitWindow, Polynomial2D};
use crate::types::{SarComplex, SarError};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: SarError) -> PyErr {
    match e {
        SarError::Validation(_) => PyValueError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Convert Array2<T> to numpy array
fn array2_to_numpy<T>(py: Python, arr: &ndarray::Array2<T>) -> PyResult<PyObject>
where
    T: numpy::Element + Copy,
{
    let numpy_array = arr.to_pyarray(py);
    Ok(numpy_array.into())
}

/// Complex coherence with zero-padded borders, same shape as the inputs
#[pyfunction]
fn complex_coherence(
    py: Python,
    master: PyReadonlyArray2<SarComplex>,
    secondary: PyReadonlyArray2<SarComplex>,
    window_azimuth: usize,
    window_range: usize,
) -> PyResult<PyObject> {
    let window = CoherenceWindow::new(window_azimuth, window_range).map_err(to_py_err)?;
    let result = coherence::complex_coherence(master.as_array(), secondary.as_array(), window)
        .map_err(to_py_err)?;
    array2_to_numpy(py, &result)
}

/// Correlation coefficient of two detected images
#[pyfunction]
fn detected_coherence(
    py: Python,
    master: PyReadonlyArray2<f32>,
    secondary: PyReadonlyArray2<f32>,
    window_azimuth: usize,
    window_range: usize,
) -> PyResult<PyObject> {
    let window = CoherenceWindow::new(window_azimuth, window_range).map_err(to_py_err)?;
    let result = coherence::detected_coherence(master.as_array(), secondary.as_array(), window)
        .map_err(to_py_err)?;
    array2_to_numpy(py, &result)
}

#[pyfunction]
fn square_pixel_window(
    range_window: usize,
    range_spacing: f64,
    azimuth_spacing: f64,
    incidence_angle_mid: f64,
    ground_range: bool,
) -> (usize, usize) {
    let spacing = PixelSpacing {
        range_spacing,
        azimuth_spacing,
        incidence_angle_mid,
        ground_range,
    };
    coherence::derive_square_pixel_window(range_window, Some(&spacing))
}

/// Flat-earth sample positions as (line, pixel)
#[pyfunction]
fn distribute_points(
    num_points: usize,
    min_line: i64,
    max_line: i64,
    min_pixel: i64,
    max_pixel: i64,
) -> PyResult<Vec<(i64, i64)>> {
    flat_earth::distribute_points(num_points, min_line, max_line, min_pixel, max_pixel)
        .map_err(to_py_err)
}

/// Least-squares 2-D polynomial through (line, pixel, value) samples
#[pyfunction]
fn fit_polynomial(
    samples: Vec<(f64, f64, f64)>,
    window: (f64, f64, f64, f64),
    degree: usize,
) -> PyResult<Vec<f64>> {
    let window = FitWindow::new(window.0, window.1, window.2, window.3).map_err(to_py_err)?;
    let polynomial = flat_earth::fit_polynomial(&samples, window, degree).map_err(to_py_err)?;
    Ok(polynomial.coefficients().to_vec())
}

/// Evaluate polynomial coefficients over a line x pixel grid
#[pyfunction]
fn evaluate_polynomial(
    py: Python,
    coefficients: Vec<f64>,
    window: (f64, f64, f64, f64),
    lines: Vec<f64>,
    pixels: Vec<f64>,
) -> PyResult<PyObject> {
    let window = FitWindow::new(window.0, window.1, window.2, window.3).map_err(to_py_err)?;
    let polynomial = Polynomial2D::from_coefficients(coefficients, window).map_err(to_py_err)?;
    array2_to_numpy(py, &polynomial.evaluate_grid(&lines, &pixels))
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(complex_coherence, m)?)?;
    m.add_function(wrap_pyfunction!(detected_coherence, m)?)?;
    m.add_function(wrap_pyfunction!(square_pixel_window, m)?)?;
    m.add_function(wrap_pyfunction!(distribute_points, m)?)?;
    m.add_function(wrap_pyfunction!(fit_polynomial, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_polynomial, m)?)?;
    Ok(())
}
