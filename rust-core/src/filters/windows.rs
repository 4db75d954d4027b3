//! Window functions applied before spectral estimation
//!
//! All built-in windows are symmetric (denominator `M-1`), matching the
//! numpy definitions, so a length-`M` window peaks at its centre.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, StreamstaffError};

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Hann window: w[n] = 0.5 - 0.5*cos(2πn/(M-1))
    Hann,

    /// Hamming window: w[n] = 0.54 - 0.46*cos(2πn/(M-1))
    Hamming,

    /// Blackman window: w[n] = 0.42 - 0.5*cos(2πn/(M-1)) + 0.08*cos(4πn/(M-1))
    Blackman,

    /// Bartlett (triangular, zero endpoints): w[n] = 1 - |2n/(M-1) - 1|
    Bartlett,

    /// Rectangular window (no tapering)
    Rectangular,
}

impl WindowType {
    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Hann => "hann",
            WindowType::Hamming => "hamming",
            WindowType::Blackman => "blackman",
            WindowType::Bartlett => "bartlett",
            WindowType::Rectangular => "rectangular",
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowType {
    type Err = StreamstaffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(WindowType::Hann),
            "hamming" => Ok(WindowType::Hamming),
            "blackman" => Ok(WindowType::Blackman),
            "bartlett" | "triangular" => Ok(WindowType::Bartlett),
            "rectangular" | "boxcar" | "ones" => Ok(WindowType::Rectangular),
            other => Err(StreamstaffError::config(format!(
                "unsupported window_type '{}' (expected hann, hamming, blackman, bartlett or rectangular)",
                other
            ))),
        }
    }
}

/// Generate window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (M)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..M-1
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    // Degenerate lengths: the cosine formulas divide by M-1
    if length <= 1 {
        return vec![1.0; length];
    }

    let denom = (length - 1) as f64;

    match window_type {
        WindowType::Hann => (0..length)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / denom).cos())
            .collect(),

        WindowType::Hamming => (0..length)
            .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / denom).cos())
            .collect(),

        WindowType::Blackman => (0..length)
            .map(|n| {
                let angle1 = 2.0 * PI * n as f64 / denom;
                let angle2 = 4.0 * PI * n as f64 / denom;
                0.42 - 0.5 * angle1.cos() + 0.08 * angle2.cos()
            })
            .collect(),

        WindowType::Bartlett => (0..length)
            .map(|n| 1.0 - (2.0 * n as f64 / denom - 1.0).abs())
            .collect(),

        WindowType::Rectangular => vec![1.0; length],
    }
}

/// Sum of squared weights, the normaliser for power estimates
pub fn window_energy(window: &[f64]) -> f64 {
    window.iter().map(|&w| w * w).sum()
}

type WindowFn = dyn Fn(usize) -> Vec<f64> + Send + Sync;

/// Tapering function supplied as configuration
///
/// Either one of the built-in windows or a user function mapping a length
/// `n` to `n` weights.
#[derive(Clone)]
pub enum WindowFunction {
    Standard(WindowType),
    Custom { name: String, func: Arc<WindowFn> },
}

impl WindowFunction {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(usize) -> Vec<f64> + Send + Sync + 'static,
    {
        WindowFunction::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            WindowFunction::Standard(window_type) => window_type.name(),
            WindowFunction::Custom { name, .. } => name,
        }
    }

    /// Evaluate the window for `length` samples
    ///
    /// # Returns
    /// `Configuration` error if a custom window returns the wrong number of
    /// weights, non-finite weights, or weights with zero energy
    pub fn weights(&self, length: usize) -> Result<Vec<f64>> {
        let weights = match self {
            WindowFunction::Standard(window_type) => generate_window(*window_type, length),
            WindowFunction::Custom { func, .. } => func(length),
        };

        if weights.len() != length {
            return Err(StreamstaffError::config(format!(
                "window '{}' returned {} weights for length {}",
                self.name(),
                weights.len(),
                length
            )));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(StreamstaffError::config(format!(
                "window '{}' produced non-finite weights",
                self.name()
            )));
        }
        if length > 0 && window_energy(&weights) == 0.0 {
            return Err(StreamstaffError::config(format!(
                "window '{}' has zero energy at length {}",
                self.name(),
                length
            )));
        }

        Ok(weights)
    }
}

impl Default for WindowFunction {
    fn default() -> Self {
        WindowFunction::Standard(WindowType::Hamming)
    }
}

impl From<WindowType> for WindowFunction {
    fn from(window_type: WindowType) -> Self {
        WindowFunction::Standard(window_type)
    }
}

impl fmt::Debug for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunction::Standard(window_type) => {
                f.debug_tuple("Standard").field(window_type).finish()
            }
            WindowFunction::Custom { name, .. } => {
                f.debug_struct("Custom").field("name", name).finish_non_exhaustive()
            }
        }
    }
}
