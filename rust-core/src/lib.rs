//! Streamstaff - real-time transforms for chunked biosignal streams
//!
//! Buffers irregular input chunks into fixed windows and publishes
//! zero-phase filtered signals or power spectral density estimates as new
//! streams, with optional Python bindings.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![allow(non_local_definitions)]

pub mod error;
pub mod filters;
pub mod pipeline;
pub mod spectrum;
pub mod stream;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use error::{Result, StreamstaffError};
pub use filters::{BandFilter, FilterSpec, WindowFunction, WindowType};
pub use pipeline::{ManipulatorSupervisor, TransformConfig, TransformOptions, WorkerState};
pub use spectrum::{PsdMethod, SpectralEstimator};
pub use stream::{resolve_stream, Chunk, MemoryTransport, StreamDescriptor, StreamTransport};
