//! Spectral estimation with FFT

pub mod fft;
pub mod psd;

pub use fft::FftEngine;
pub use psd::{periodogram, welch, PsdMethod, PsdSpec, SpectralEstimator};
