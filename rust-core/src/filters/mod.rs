//! IIR filter design and zero-phase window filtering

pub mod band;
pub mod butterworth;
pub mod filtfilt;
pub mod windows;

pub use band::{BandFilter, Cutoff, FilterKind, FilterSpec};
pub use butterworth::{butter, FilterResponse, TransferFunction};
pub use filtfilt::{filtfilt, lfilter, lfilter_zi};
pub use windows::{generate_window, window_energy, WindowFunction, WindowType};
