//! Python bindings for PSD estimation

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::filters::windows::{WindowFunction, WindowType};
use crate::spectrum::psd;

fn window_from_name(window_type: &str) -> PyResult<WindowFunction> {
    Ok(WindowFunction::from(window_type.parse::<WindowType>()?))
}

/// One-sided periodogram of a single-channel window
///
/// Args:
///     signal: Window samples as numpy array
///     window_type: Taper name (hann, hamming, blackman, bartlett, rectangular)
///
/// Returns:
///     len(signal) // 2 + 1 power values
#[pyfunction]
#[pyo3(signature = (signal, window_type="hamming"))]
pub fn periodogram<'py>(
    py: Python<'py>,
    signal: PyReadonlyArray1<f64>,
    window_type: &str,
) -> PyResult<&'py PyArray1<f64>> {
    let samples: Vec<f64> = signal.as_array().iter().copied().collect();
    let window = window_from_name(window_type)?;
    let spectrum = psd::periodogram(&samples, &window)?;

    Ok(PyArray1::from_vec(py, spectrum))
}

/// Welch PSD of a single-channel window
///
/// Args:
///     signal: Window samples as numpy array
///     nperseg: Segment length (default len(signal) // 8)
///     noverlap: Segment overlap (default nperseg // 2)
///     window_type: Taper name
///
/// Returns:
///     nperseg // 2 + 1 power values
#[pyfunction]
#[pyo3(signature = (signal, nperseg=None, noverlap=None, window_type="hamming"))]
pub fn welch<'py>(
    py: Python<'py>,
    signal: PyReadonlyArray1<f64>,
    nperseg: Option<usize>,
    noverlap: Option<usize>,
    window_type: &str,
) -> PyResult<&'py PyArray1<f64>> {
    let samples: Vec<f64> = signal.as_array().iter().copied().collect();
    let window = window_from_name(window_type)?;
    let spectrum = psd::welch(&samples, nperseg, noverlap, &window)?;

    Ok(PyArray1::from_vec(py, spectrum))
}
