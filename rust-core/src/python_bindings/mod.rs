//! PyO3 bindings for Python integration

use pyo3::exceptions::{PyLookupError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::error::StreamstaffError;

mod filter_bindings;
mod processor_bindings;
mod spectrum_bindings;

impl From<StreamstaffError> for PyErr {
    fn from(err: StreamstaffError) -> PyErr {
        match err {
            StreamstaffError::Configuration(_) | StreamstaffError::ChannelMismatch { .. } => {
                PyValueError::new_err(err.to_string())
            }
            StreamstaffError::NotFound { .. } => PyLookupError::new_err(err.to_string()),
            StreamstaffError::Transport(_) | StreamstaffError::Fft(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

/// Python module definition
#[pymodule]
fn streamstaff(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(spectrum_bindings::periodogram, m)?)?;
    m.add_function(wrap_pyfunction!(spectrum_bindings::welch, m)?)?;
    m.add_function(wrap_pyfunction!(filter_bindings::butter_filtfilt, m)?)?;
    m.add_class::<processor_bindings::PyManipulator>()?;

    Ok(())
}
