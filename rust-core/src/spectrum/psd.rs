//! Power spectral density estimation for one channel's window
//!
//! Both methods share the same per-segment estimate: remove the mean, taper,
//! take |rFFT|², divide by the taper's energy. Welch averages that estimate
//! over overlapping segments of the window.

use std::fmt;
use std::str::FromStr;

use super::fft::FftEngine;
use crate::error::{Result, StreamstaffError};
use crate::filters::windows::{window_energy, WindowFunction};

/// Estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsdMethod {
    Periodogram,
    Welch,
}

impl PsdMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PsdMethod::Periodogram => "periodogram",
            PsdMethod::Welch => "welch",
        }
    }
}

impl fmt::Display for PsdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PsdMethod {
    type Err = StreamstaffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "periodogram" => Ok(PsdMethod::Periodogram),
            "welch" => Ok(PsdMethod::Welch),
            other => Err(StreamstaffError::config(format!(
                "unsupported method '{}' (expected periodogram or welch)",
                other
            ))),
        }
    }
}

/// PSD parameters before segment sizes are resolved
#[derive(Debug, Clone)]
pub struct PsdSpec {
    pub method: PsdMethod,
    pub window: WindowFunction,
    pub window_length: usize,
    /// Welch segment length; defaults to `window_length / 8`
    pub nperseg: Option<usize>,
    /// Welch segment overlap; defaults to `nperseg / 2`
    pub noverlap: Option<usize>,
}

impl PsdSpec {
    pub fn new(method: PsdMethod, window_length: usize) -> Self {
        Self {
            method,
            window: WindowFunction::default(),
            window_length,
            nperseg: None,
            noverlap: None,
        }
    }
}

/// Stateless-per-window PSD estimator with preplanned FFT and taper
#[derive(Debug)]
pub struct SpectralEstimator {
    method: PsdMethod,
    window_name: String,
    window_length: usize,
    nperseg: usize,
    noverlap: usize,
    taper: Vec<f64>,
    taper_energy: f64,
    fft: FftEngine,
    // Scratch for the mean-removed, tapered segment
    segment: Vec<f64>,
}

impl SpectralEstimator {
    /// Resolve segment sizes, evaluate the taper and plan the FFT
    ///
    /// # Returns
    /// `Configuration` error for an empty window, a Welch segment that is
    /// empty or longer than the window, or an overlap not below the segment
    /// length
    pub fn new(spec: &PsdSpec) -> Result<Self> {
        let window_length = spec.window_length;
        if window_length == 0 {
            return Err(StreamstaffError::config("window_length must be at least 1"));
        }

        let (nperseg, noverlap) = match spec.method {
            PsdMethod::Periodogram => {
                if spec.nperseg.is_some() || spec.noverlap.is_some() {
                    log::warn!("nperseg/noverlap are ignored by the periodogram method");
                }
                (window_length, 0)
            }
            PsdMethod::Welch => {
                let nperseg = spec.nperseg.unwrap_or(window_length / 8);
                if nperseg == 0 {
                    return Err(StreamstaffError::config(format!(
                        "welch segment length is zero (window_length {} with nperseg {:?})",
                        window_length, spec.nperseg
                    )));
                }
                if nperseg > window_length {
                    return Err(StreamstaffError::config(format!(
                        "nperseg {} exceeds window_length {}",
                        nperseg, window_length
                    )));
                }
                let noverlap = spec.noverlap.unwrap_or(nperseg / 2);
                if noverlap >= nperseg {
                    return Err(StreamstaffError::config(format!(
                        "noverlap {} must be smaller than nperseg {}",
                        noverlap, nperseg
                    )));
                }
                (nperseg, noverlap)
            }
        };

        let taper = spec.window.weights(nperseg)?;
        let taper_energy = window_energy(&taper);

        Ok(Self {
            method: spec.method,
            window_name: spec.window.name().to_string(),
            window_length,
            nperseg,
            noverlap,
            taper,
            taper_energy,
            fft: FftEngine::new(nperseg)?,
            segment: vec![0.0; nperseg],
        })
    }

    /// Estimate the one-sided PSD of one channel's window
    ///
    /// # Arguments
    /// * `window` - Exactly `window_length` samples
    ///
    /// # Returns
    /// `output_len()` spectral values
    pub fn estimate(&mut self, window: &[f64]) -> Result<Vec<f64>> {
        if window.len() != self.window_length {
            return Err(StreamstaffError::config(format!(
                "estimator expects {} samples per window, got {}",
                self.window_length,
                window.len()
            )));
        }

        let starts = segment_starts(self.window_length, self.nperseg, self.noverlap);
        let mut psd = vec![0.0; self.output_len()];
        for &start in &starts {
            let segment_psd = self.segment_periodogram(&window[start..start + self.nperseg])?;
            for (acc, p) in psd.iter_mut().zip(segment_psd) {
                *acc += p;
            }
        }

        let count = starts.len() as f64;
        psd.iter_mut().for_each(|p| *p /= count);
        Ok(psd)
    }

    fn segment_periodogram(&mut self, samples: &[f64]) -> Result<Vec<f64>> {
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        for ((dst, &x), &w) in self.segment.iter_mut().zip(samples).zip(&self.taper) {
            *dst = (x - mean) * w;
        }

        let mut power = self.fft.power_spectrum(&self.segment)?;
        power.iter_mut().for_each(|p| *p /= self.taper_energy);
        Ok(power)
    }

    pub fn method(&self) -> PsdMethod {
        self.method
    }

    pub fn window_name(&self) -> &str {
        &self.window_name
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// Segment length (equals `window_length` for the periodogram)
    pub fn nperseg(&self) -> usize {
        self.nperseg
    }

    pub fn noverlap(&self) -> usize {
        self.noverlap
    }

    /// Spectral rows produced per window
    pub fn output_len(&self) -> usize {
        self.nperseg / 2 + 1
    }

    /// Number of segments averaged per window
    pub fn segment_count(&self) -> usize {
        segment_starts(self.window_length, self.nperseg, self.noverlap).len()
    }

    /// Frequency of each output row in Hz
    pub fn frequencies(&self, sample_rate: f64) -> Vec<f64> {
        self.fft.frequency_axis(sample_rate)
    }
}

/// Start offsets of every full segment; the tail that does not fill a
/// segment is not used
fn segment_starts(len: usize, nperseg: usize, noverlap: usize) -> Vec<usize> {
    let step = nperseg - noverlap;
    (0..)
        .map(|i| i * step)
        .take_while(|&start| start + nperseg <= len)
        .collect()
}

/// Single-window periodogram of `signal`
pub fn periodogram(signal: &[f64], window: &WindowFunction) -> Result<Vec<f64>> {
    let spec = PsdSpec {
        window: window.clone(),
        ..PsdSpec::new(PsdMethod::Periodogram, signal.len())
    };
    SpectralEstimator::new(&spec)?.estimate(signal)
}

/// Welch average over overlapping segments of `signal`
pub fn welch(
    signal: &[f64],
    nperseg: Option<usize>,
    noverlap: Option<usize>,
    window: &WindowFunction,
) -> Result<Vec<f64>> {
    let spec = PsdSpec {
        window: window.clone(),
        nperseg,
        noverlap,
        ..PsdSpec::new(PsdMethod::Welch, signal.len())
    };
    SpectralEstimator::new(&spec)?.estimate(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::windows::WindowType;
    use std::f64::consts::PI;

    fn sine(len: usize, cycles: f64, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * cycles * n as f64 / len as f64).sin())
            .collect()
    }

    #[test]
    fn test_periodogram_length() {
        let hamming = WindowFunction::default();
        assert_eq!(periodogram(&sine(256, 4.0, 1.0), &hamming).unwrap().len(), 129);
        assert_eq!(periodogram(&sine(255, 4.0, 1.0), &hamming).unwrap().len(), 128);
    }

    #[test]
    fn test_periodogram_removes_dc() {
        let psd = periodogram(&[7.0; 64], &WindowFunction::default()).unwrap();
        assert!(psd.iter().all(|&p| p.abs() < 1e-20));
    }

    #[test]
    fn test_periodogram_energy_normalization() {
        let rect = WindowFunction::from(WindowType::Rectangular);
        // |X[10]|² = (N/2)² for a unit sine, divided by N
        let psd = periodogram(&sine(256, 10.0, 1.0), &rect).unwrap();
        assert!((psd[10] - 64.0).abs() < 1e-9);

        // Offset does not change the estimate
        let shifted: Vec<f64> = sine(256, 10.0, 1.0).iter().map(|x| x + 3.0).collect();
        let psd_shifted = periodogram(&shifted, &rect).unwrap();
        for (a, b) in psd.iter().zip(psd_shifted.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_welch_defaults() {
        let spec = PsdSpec::new(PsdMethod::Welch, 256);
        let estimator = SpectralEstimator::new(&spec).unwrap();
        assert_eq!(estimator.nperseg(), 32);
        assert_eq!(estimator.noverlap(), 16);
        assert_eq!(estimator.output_len(), 17);
        assert_eq!(estimator.segment_count(), 15);
    }

    #[test]
    fn test_welch_peak_location() {
        // 32 cycles in 256 samples puts 4 cycles in each 32-sample segment
        let psd = welch(&sine(256, 32.0, 1.0), None, None, &WindowFunction::default()).unwrap();
        assert_eq!(psd.len(), 17);
        let peak = psd
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 4);
    }

    #[test]
    fn test_welch_single_segment_matches_periodogram() {
        let signal = sine(128, 5.0, 2.0);
        let window = WindowFunction::from(WindowType::Hann);
        let a = welch(&signal, Some(128), Some(0), &window).unwrap();
        let b = periodogram(&signal, &window).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_welch_invalid_parameters() {
        let hamming = WindowFunction::default();
        // floor(7 / 8) == 0
        assert!(welch(&[1.0; 7], None, None, &hamming).unwrap_err().is_configuration());
        assert!(welch(&[1.0; 64], Some(128), None, &hamming).is_err());
        assert!(welch(&[1.0; 64], Some(16), Some(16), &hamming).is_err());
    }

    #[test]
    fn test_wrong_window_length_rejected() {
        let mut estimator = SpectralEstimator::new(&PsdSpec::new(PsdMethod::Periodogram, 64)).unwrap();
        assert!(estimator.estimate(&[0.0; 32]).is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("Welch".parse::<PsdMethod>().unwrap(), PsdMethod::Welch);
        assert!("bogus".parse::<PsdMethod>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_segment_starts() {
        assert_eq!(segment_starts(10, 4, 2), vec![0, 2, 4, 6]);
        assert_eq!(segment_starts(10, 4, 0), vec![0, 4]);
        assert_eq!(segment_starts(4, 4, 0), vec![0]);
    }
}
