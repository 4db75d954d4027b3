//! Python bindings for a self-contained stream manipulator
//!
//! Input and output streams live on an in-process transport, so Python code
//! can push raw chunks in and pull transformed chunks out.

use std::time::{Duration, Instant};

use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::error::StreamstaffError;
use crate::filters::WindowFunction;
use crate::pipeline::{ManipulatorSupervisor, TransformOptions, WorkerState};
use crate::stream::{
    CancelToken, Chunk, MemoryInlet, MemoryOutlet, MemoryTransport, StreamDescriptor, StreamInlet,
    StreamOutlet, StreamTransport,
};

/// Filter or PSD transform running on its own thread
///
/// Extra keyword arguments are transform options (method, filter_type,
/// window_length, channels, nperseg, ...).
#[pyclass(name = "Manipulator", unsendable)]
pub struct PyManipulator {
    input: MemoryOutlet,
    output: MemoryInlet,
    supervisor: ManipulatorSupervisor,
}

#[pymethods]
impl PyManipulator {
    #[new]
    #[pyo3(signature = (name, stream_type, channel_count, sample_rate, **options))]
    fn new(
        py: Python<'_>,
        name: &str,
        stream_type: &str,
        channel_count: usize,
        sample_rate: f64,
        options: Option<&PyDict>,
    ) -> PyResult<Self> {
        let options = match options {
            Some(dict) => parse_options(py, dict)?,
            None => TransformOptions::default(),
        };

        let transport = MemoryTransport::new();
        let descriptor = StreamDescriptor::new(name, stream_type, channel_count, sample_rate, name);
        let input = transport
            .create_outlet(descriptor.clone())
            .map_err(StreamstaffError::from)?;
        let supervisor = ManipulatorSupervisor::start(&transport, &descriptor, &options)?;

        let mut output = transport
            .open_inlet(supervisor.output_descriptor())
            .map_err(StreamstaffError::from)?;
        output.open_stream().map_err(StreamstaffError::from)?;

        Ok(Self {
            input,
            output,
            supervisor,
        })
    }

    /// Push a (rows, channels) array of input samples
    fn push(&mut self, chunk: PyReadonlyArray2<f64>) -> PyResult<()> {
        let chunk = Chunk::from_array(chunk.as_array().to_owned());
        self.input.push_chunk(&chunk).map_err(StreamstaffError::from)?;
        Ok(())
    }

    /// Wait up to `timeout_ms` for transformed rows
    ///
    /// Returns:
    ///     (rows, channels) array, or None if nothing arrived in time
    #[pyo3(signature = (timeout_ms=100))]
    fn pull<'py>(&mut self, py: Python<'py>, timeout_ms: u64) -> PyResult<Option<&'py PyArray2<f64>>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let cancel = CancelToken::new();

        loop {
            let (chunk, _) = self
                .output
                .pull_chunk(&cancel)
                .map_err(StreamstaffError::from)?;
            if !chunk.is_empty() {
                return Ok(Some(PyArray2::from_owned_array(py, chunk.into_array())));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    #[getter]
    fn output_name(&self) -> String {
        self.supervisor.output_descriptor().name().to_string()
    }

    #[getter]
    fn output_type(&self) -> String {
        self.supervisor.output_descriptor().stream_type().to_string()
    }

    #[getter]
    fn output_channel_count(&self) -> usize {
        self.supervisor.output_descriptor().channel_count()
    }

    /// Output stream annotations as (key, value) pairs
    fn annotations(&self) -> Vec<(String, String)> {
        self.supervisor.output_descriptor().annotations().to_vec()
    }

    /// Worker state: "idle", "running", "stopped" or "faulted: <reason>"
    fn state(&self) -> String {
        match self.supervisor.state() {
            WorkerState::Idle => "idle".to_string(),
            WorkerState::Running => "running".to_string(),
            WorkerState::Stopped => "stopped".to_string(),
            WorkerState::Faulted(reason) => format!("faulted: {}", reason),
        }
    }

    /// Worker counters as a dictionary
    fn stats<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict> {
        let stats = self.supervisor.stats();
        let dict = PyDict::new(py);
        dict.set_item("chunks_pulled", stats.chunks_pulled)?;
        dict.set_item("empty_pulls", stats.empty_pulls)?;
        dict.set_item("rows_received", stats.rows_received)?;
        dict.set_item("windows_emitted", stats.windows_emitted)?;
        dict.set_item("windows_dropped", stats.windows_dropped)?;
        dict.set_item("overflow_events", stats.overflow_events)?;
        dict.set_item("peak_buffered_rows", stats.peak_buffered_rows)?;
        dict.set_item("buffered_rows", stats.buffered_rows)?;
        Ok(dict)
    }

    /// Stop the worker thread
    fn stop(&mut self) {
        self.supervisor.stop();
    }
}

/// Convert keyword options; a callable `window_type` (e.g. `np.hamming`)
/// becomes a custom taper instead of going through JSON
fn parse_options(py: Python<'_>, options: &PyDict) -> PyResult<TransformOptions> {
    let options = options.copy()?;

    let mut window = None;
    if let Some(value) = options.get_item("window_type")? {
        if value.is_callable() {
            window = Some(python_window(value));
            options.del_item("window_type")?;
        }
    }

    let json: String = py
        .import("json")?
        .call_method1("dumps", (options,))?
        .extract()?;
    let parsed = TransformOptions::from_json(&json)?;

    Ok(match window {
        Some(window) => parsed.with_window_function(window),
        None => parsed,
    })
}

/// Wrap a Python `f(n) -> array` taper
///
/// A failing call yields no weights, which the length check reports as a
/// configuration error naming the window.
fn python_window(func: &PyAny) -> WindowFunction {
    let name = func
        .getattr("__name__")
        .and_then(|n| n.extract::<String>())
        .unwrap_or_else(|_| "custom".to_string());
    let func: PyObject = func.to_object(func.py());
    let label = name.clone();

    WindowFunction::custom(name, move |length| {
        Python::with_gil(|py| {
            func.call1(py, (length,))
                .and_then(|weights| weights.extract::<Vec<f64>>(py))
                .unwrap_or_else(|e| {
                    log::error!("Window '{}' failed for length {}: {}", label, length, e);
                    Vec::new()
                })
        })
    })
}
