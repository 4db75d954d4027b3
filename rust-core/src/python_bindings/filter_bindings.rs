//! Python bindings for zero-phase filtering

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

use crate::filters::band::{BandFilter, Cutoff, FilterSpec};

/// Zero-phase Butterworth lowpass of a single-channel window
///
/// Args:
///     signal: Window samples as numpy array
///     sample_rate: Sample rate in Hz
///     sample_period: Cutoff is ceil(sample_rate / sample_period**2) Hz
///     order: Filter order
///
/// Returns:
///     Filtered samples, same length as signal
#[pyfunction]
#[pyo3(signature = (signal, sample_rate, sample_period=5.0, order=2))]
pub fn butter_filtfilt<'py>(
    py: Python<'py>,
    signal: PyReadonlyArray1<f64>,
    sample_rate: f64,
    sample_period: f64,
    order: usize,
) -> PyResult<&'py PyArray1<f64>> {
    let samples: Vec<f64> = signal.as_array().iter().copied().collect();
    let spec = FilterSpec {
        order,
        cutoff: Cutoff::SamplePeriod(sample_period),
        ..FilterSpec::default()
    };
    let filter = BandFilter::design(&spec, sample_rate, samples.len())?;
    let filtered = filter.apply(&samples)?;

    Ok(PyArray1::from_vec(py, filtered))
}
