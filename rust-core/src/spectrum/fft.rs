//! FFT engine using realfft for real-valued signals
//!
//! One planned transform per window length, reused across windows and channels.

use std::sync::Arc;

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{Result, StreamstaffError};

/// FFT engine for real-valued signals
pub struct FftEngine {
    fft_size: usize,
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Reusable input buffer (realfft overwrites its input)
    input_buffer: Vec<f64>,

    /// Reusable output buffer (one-sided complex spectrum)
    output_buffer: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples, at least 1)
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size == 0 {
            return Err(StreamstaffError::config("FFT size must be at least 1"));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();

        Ok(Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
        })
    }

    /// Compute |X[k]|² for k = 0..=fft_size/2
    ///
    /// # Arguments
    /// * `signal` - Input signal, zero-padded if shorter than `fft_size`
    pub fn power_spectrum(&mut self, signal: &[f64]) -> Result<Vec<f64>> {
        let copy_len = signal.len().min(self.fft_size);
        self.input_buffer[..copy_len].copy_from_slice(&signal[..copy_len]);
        self.input_buffer[copy_len..].fill(0.0);

        self.r2c
            .process(&mut self.input_buffer, &mut self.output_buffer)?;

        Ok(self.output_buffer.iter().map(|c| c.norm_sqr()).collect())
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of one-sided bins (fft_size/2 + 1)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Bin centre frequencies in Hz for a stream sampled at `sample_rate`
    pub fn frequency_axis(&self, sample_rate: f64) -> Vec<f64> {
        (0..self.num_bins())
            .map(|bin| bin as f64 * sample_rate / self.fft_size as f64)
            .collect()
    }
}

impl std::fmt::Debug for FftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftEngine")
            .field("fft_size", &self.fft_size)
            .finish()
    }
}
