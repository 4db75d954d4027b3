//! Per-channel zero-phase band filter
//!
//! Coefficients are designed once for the stream's sample rate and window
//! length; each window is then filtered forward and backward independently.

use std::fmt;
use std::str::FromStr;

use super::butterworth::{butter, FilterResponse, TransferFunction};
use super::filtfilt::filtfilt;
use crate::error::{Result, StreamstaffError};

/// Residual transient amplitude tolerated at the window edges
const EDGE_DECAY: f64 = 1e-12;

/// Supported filter families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Butter,
}

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Butter => "butter",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = StreamstaffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "butter" | "butterworth" => Ok(FilterKind::Butter),
            other => Err(StreamstaffError::config(format!(
                "unsupported filter_type '{}' (expected butter)",
                other
            ))),
        }
    }
}

/// Where the cutoff frequency comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Cutoff {
    /// `ceil(sample_rate / sample_period²)` Hz
    SamplePeriod(f64),
    /// Explicit edge frequencies in Hz
    Hz(Vec<f64>),
}

/// Filter specification before it is bound to a sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub response: FilterResponse,
    pub order: usize,
    pub cutoff: Cutoff,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            kind: FilterKind::Butter,
            response: FilterResponse::Lowpass,
            order: 2,
            cutoff: Cutoff::SamplePeriod(5.0),
        }
    }
}

impl FilterSpec {
    /// Cutoff edges in Hz for a stream sampled at `sample_rate`
    pub fn cutoff_hz(&self, sample_rate: f64) -> Result<Vec<f64>> {
        match &self.cutoff {
            Cutoff::SamplePeriod(period) => {
                if !(*period > 0.0 && period.is_finite()) {
                    return Err(StreamstaffError::config(format!(
                        "sample_period must be positive, got {}",
                        period
                    )));
                }
                let cutoff = (sample_rate / (period * period)).ceil();
                // Only single-edge responses can derive their cutoff
                match self.response.cutoff_count() {
                    1 => Ok(vec![cutoff]),
                    _ => Err(StreamstaffError::config(format!(
                        "{} filter needs explicit cutoff_hz edges",
                        self.response
                    ))),
                }
            }
            Cutoff::Hz(edges) => Ok(edges.clone()),
        }
    }
}

/// Zero-phase digital filter bound to one stream's sample rate
#[derive(Debug, Clone)]
pub struct BandFilter {
    spec: FilterSpec,
    coefficients: TransferFunction,
    cutoff_hz: Vec<f64>,
    padlen: usize,
    decay_padlen: usize,
}

impl BandFilter {
    /// Design the filter
    ///
    /// # Arguments
    /// * `spec` - Filter family, response, order and cutoff source
    /// * `sample_rate` - Declared rate of the input stream in Hz (must be > 0)
    /// * `window_length` - Samples per window the filter will see
    ///
    /// # Returns
    /// `Configuration` error for an irregular stream, a cutoff at or above
    /// Nyquist, or a window too short for the filter's edge padding
    pub fn design(spec: &FilterSpec, sample_rate: f64, window_length: usize) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(StreamstaffError::config(format!(
                "filtering needs a regular sample rate, stream declares {} Hz",
                sample_rate
            )));
        }

        let cutoff_hz = spec.cutoff_hz(sample_rate)?;
        let nyquist = sample_rate / 2.0;
        let wn: Vec<f64> = cutoff_hz.iter().map(|c| c / nyquist).collect();

        let coefficients = match spec.kind {
            FilterKind::Butter => butter(spec.order, &wn, spec.response)?,
        };

        let min_padlen = 3 * coefficients.taps();
        if window_length <= min_padlen {
            return Err(StreamstaffError::config(format!(
                "window_length {} is too short for an order-{} {} filter (needs more than {})",
                window_length, spec.order, spec.response, min_padlen
            )));
        }

        let decay_padlen = decay_length(&coefficients);
        let padlen = decay_padlen.min(window_length - 1);
        log::debug!(
            "Designed {} {} filter: order {}, cutoff {:?} Hz, padlen {}",
            spec.kind,
            spec.response,
            spec.order,
            cutoff_hz,
            padlen
        );

        Ok(Self {
            spec: spec.clone(),
            coefficients,
            cutoff_hz,
            padlen,
            decay_padlen,
        })
    }

    /// Filter one channel's window; output has the same length
    ///
    /// Forward-backward filtering is zero-phase in the interior, but once the
    /// padding is capped by a short window the two edges settle differently.
    /// Averaging with the filtered reversal makes the result exactly
    /// symmetric under time reversal for every window length.
    pub fn apply(&self, window: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.padlen.min(window.len().saturating_sub(1));
        let (b, a) = (&self.coefficients.b, &self.coefficients.a);

        let forward = filtfilt(b, a, window, padlen)?;
        if padlen >= self.decay_padlen {
            return Ok(forward);
        }

        let reversed: Vec<f64> = window.iter().rev().copied().collect();
        let backward = filtfilt(b, a, &reversed, padlen)?;
        Ok(forward
            .iter()
            .zip(backward.iter().rev())
            .map(|(f, r)| 0.5 * (f + r))
            .collect())
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn coefficients(&self) -> &TransferFunction {
        &self.coefficients
    }

    pub fn cutoff_hz(&self) -> &[f64] {
        &self.cutoff_hz
    }

    pub fn padlen(&self) -> usize {
        self.padlen
    }
}

/// Odd-extension length needed for the slowest pole's transient to fall
/// below `EDGE_DECAY`, never shorter than three times the tap count
fn decay_length(coefficients: &TransferFunction) -> usize {
    let radius = coefficients.max_pole_radius;
    let decay = if radius <= 0.0 {
        0
    } else if radius < 1.0 {
        (EDGE_DECAY.ln() / radius.ln()).ceil() as usize
    } else {
        usize::MAX
    };
    decay.max(3 * coefficients.taps())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn eeg_like(len: usize, fs: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 4.0 * t).sin() + 0.3 * (2.0 * PI * 50.0 * t).cos() + 0.2 * t
            })
            .collect()
    }

    #[test]
    fn test_cutoff_from_sample_period() {
        let filter = BandFilter::design(&FilterSpec::default(), 256.0, 256).unwrap();
        // ceil(256 / 25) = 11 Hz
        assert_eq!(filter.cutoff_hz(), &[11.0]);
        assert_eq!(filter.coefficients().taps(), 3);
        assert!(filter.padlen() > 9);
        assert!(filter.padlen() < 256);
    }

    #[test]
    fn test_output_matches_input_length() {
        let filter = BandFilter::design(&FilterSpec::default(), 256.0, 256).unwrap();
        let window = eeg_like(256, 256.0);
        assert_eq!(filter.apply(&window).unwrap().len(), 256);
    }

    #[test]
    fn test_zero_phase_under_reversal() {
        let filter = BandFilter::design(&FilterSpec::default(), 256.0, 256).unwrap();
        let window = eeg_like(256, 256.0);

        let forward = filter.apply(&window).unwrap();
        let mut reversed: Vec<f64> = window.iter().rev().copied().collect();
        reversed = filter.apply(&reversed).unwrap();
        reversed.reverse();

        for (a, b) in forward.iter().zip(reversed.iter()) {
            assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
        }
    }

    fn reversal_error(filter: &BandFilter, window: &[f64]) -> f64 {
        let forward = filter.apply(window).unwrap();
        let reversed: Vec<f64> = window.iter().rev().copied().collect();
        let mut backward = filter.apply(&reversed).unwrap();
        backward.reverse();
        forward
            .iter()
            .zip(backward.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_zero_phase_on_short_windows() {
        for &len in &[10, 32, 64] {
            let filter = BandFilter::design(&FilterSpec::default(), 256.0, len).unwrap();
            let window = eeg_like(len, 256.0);
            let err = reversal_error(&filter, &window);
            assert!(err < 1e-10, "n={} error {}", len, err);
        }
    }

    #[test]
    fn test_zero_phase_bandpass() {
        let spec = FilterSpec {
            response: FilterResponse::Bandpass,
            cutoff: Cutoff::Hz(vec![8.0, 12.0]),
            ..FilterSpec::default()
        };
        for &len in &[32, 256] {
            let filter = BandFilter::design(&spec, 256.0, len).unwrap();
            let err = reversal_error(&filter, &eeg_like(len, 256.0));
            assert!(err < 1e-10, "n={} error {}", len, err);
        }
    }

    #[test]
    fn test_zero_phase_slow_highpass() {
        // Poles close to the unit circle: decay is far longer than the window
        let spec = FilterSpec {
            response: FilterResponse::Highpass,
            order: 4,
            cutoff: Cutoff::Hz(vec![1.0]),
            ..FilterSpec::default()
        };
        for &len in &[32, 256] {
            let filter = BandFilter::design(&spec, 256.0, len).unwrap();
            assert_eq!(filter.padlen(), len - 1);
            let err = reversal_error(&filter, &eeg_like(len, 256.0));
            assert!(err < 1e-10, "n={} error {}", len, err);
        }
    }

    #[test]
    fn test_highpass_removes_offset() {
        let spec = FilterSpec {
            response: FilterResponse::Highpass,
            cutoff: Cutoff::Hz(vec![20.0]),
            ..FilterSpec::default()
        };
        let filter = BandFilter::design(&spec, 256.0, 256).unwrap();
        assert_eq!(filter.coefficients().taps(), 3);

        let output = filter.apply(&vec![3.0; 256]).unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_bandstop_design() {
        let spec = FilterSpec {
            response: FilterResponse::Bandstop,
            cutoff: Cutoff::Hz(vec![45.0, 55.0]),
            ..FilterSpec::default()
        };
        let filter = BandFilter::design(&spec, 256.0, 256).unwrap();
        assert_eq!(filter.cutoff_hz(), &[45.0, 55.0]);
        assert_eq!(filter.coefficients().taps(), 5);
        // Unity gain at DC, well away from the notch
        assert!((filter.coefficients().gain_at(0.0) - 1.0).abs() < 1e-9);

        let window = eeg_like(256, 256.0);
        assert_eq!(filter.apply(&window).unwrap().len(), 256);
    }

    #[test]
    fn test_cutoff_at_nyquist_rejected() {
        // ceil(20 / 1) = 20 Hz, above the 10 Hz Nyquist
        let spec = FilterSpec {
            cutoff: Cutoff::SamplePeriod(1.0),
            ..FilterSpec::default()
        };
        assert!(BandFilter::design(&spec, 20.0, 64).unwrap_err().is_configuration());
    }

    #[test]
    fn test_irregular_rate_rejected() {
        assert!(BandFilter::design(&FilterSpec::default(), 0.0, 256).is_err());
    }

    #[test]
    fn test_short_window_rejected() {
        assert!(BandFilter::design(&FilterSpec::default(), 256.0, 9).is_err());
        assert!(BandFilter::design(&FilterSpec::default(), 256.0, 10).is_ok());
    }

    #[test]
    fn test_bandpass_needs_explicit_edges() {
        let derived = FilterSpec {
            response: FilterResponse::Bandpass,
            ..FilterSpec::default()
        };
        assert!(BandFilter::design(&derived, 256.0, 256).is_err());

        let explicit = FilterSpec {
            response: FilterResponse::Bandpass,
            cutoff: Cutoff::Hz(vec![8.0, 12.0]),
            ..FilterSpec::default()
        };
        let filter = BandFilter::design(&explicit, 256.0, 256).unwrap();
        assert_eq!(filter.coefficients().taps(), 5);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("butter".parse::<FilterKind>().unwrap(), FilterKind::Butter);
        assert!("cheby1".parse::<FilterKind>().unwrap_err().is_configuration());
    }
}
