//! Transform configuration: the raw option table and its validated form
//!
//! Options arrive as loosely typed key/value pairs (JSON, Python keywords or
//! builder calls). `TransformConfig::from_options` checks everything that does
//! not depend on the input stream; stream-dependent checks (channel range,
//! cutoff against Nyquist) happen when the supervisor binds the config.

use serde::Deserialize;

use crate::error::{Result, StreamstaffError};
use crate::filters::band::{Cutoff, FilterKind, FilterSpec};
use crate::filters::butterworth::FilterResponse;
use crate::filters::windows::{WindowFunction, WindowType};
use crate::spectrum::psd::{PsdMethod, PsdSpec, SpectralEstimator};

pub const DEFAULT_WINDOW_LENGTH: usize = 256;
pub const DEFAULT_SAMPLE_PERIOD: f64 = 5.0;
pub const DEFAULT_FILTER_ORDER: usize = 2;
pub const PSD_STREAM_TYPE: &str = "psd";
/// `output_stream_name` value asking for the derived `<input>--<type>` name
pub const DERIVED_NAME: &str = "default";
const GENERIC_FILTER_TYPE: &str = "filter";

/// Recognised transform options, all optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformOptions {
    /// 1-based channel numbers; empty or absent selects every channel
    pub channels: Option<Vec<i64>>,
    /// `periodogram` or `welch`
    pub method: Option<String>,
    /// `butter`
    pub filter_type: Option<String>,
    pub window_length: Option<usize>,
    pub sample_period: Option<f64>,
    pub nperseg: Option<usize>,
    pub noverlap: Option<usize>,
    pub window_type: Option<String>,
    pub output_stream_name: Option<String>,
    pub stream_type: Option<String>,
    pub filter_response: Option<String>,
    pub filter_order: Option<usize>,
    pub cutoff_hz: Option<Vec<f64>>,
    pub buffer_soft_cap: Option<usize>,

    /// Taper supplied as code; takes precedence over `window_type`
    #[serde(skip)]
    pub window_function: Option<WindowFunction>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of options
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| StreamstaffError::config(format!("invalid transform options: {}", e)))
    }

    pub fn with_channels(mut self, channels: Vec<i64>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_filter_type(mut self, filter_type: impl Into<String>) -> Self {
        self.filter_type = Some(filter_type.into());
        self
    }

    pub fn with_window_length(mut self, window_length: usize) -> Self {
        self.window_length = Some(window_length);
        self
    }

    pub fn with_sample_period(mut self, sample_period: f64) -> Self {
        self.sample_period = Some(sample_period);
        self
    }

    pub fn with_welch_segments(mut self, nperseg: Option<usize>, noverlap: Option<usize>) -> Self {
        self.nperseg = nperseg;
        self.noverlap = noverlap;
        self
    }

    pub fn with_window_type(mut self, window_type: impl Into<String>) -> Self {
        self.window_type = Some(window_type.into());
        self
    }

    pub fn with_window_function(mut self, window: WindowFunction) -> Self {
        self.window_function = Some(window);
        self
    }

    pub fn with_output_stream_name(mut self, name: impl Into<String>) -> Self {
        self.output_stream_name = Some(name.into());
        self
    }

    pub fn with_stream_type(mut self, stream_type: impl Into<String>) -> Self {
        self.stream_type = Some(stream_type.into());
        self
    }

    pub fn with_buffer_soft_cap(mut self, rows: usize) -> Self {
        self.buffer_soft_cap = Some(rows);
        self
    }

    fn is_filter(&self) -> bool {
        self.filter_type.is_some()
            || self.filter_response.is_some()
            || self.filter_order.is_some()
            || self.cutoff_hz.is_some()
            || self.sample_period.is_some()
    }
}

/// Algorithm-specific part of a validated configuration
#[derive(Debug, Clone)]
pub enum TransformMethod {
    Filter { spec: FilterSpec, window_length: usize },
    Psd(PsdSpec),
}

/// Validated configuration, independent of any particular input stream
#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub method: TransformMethod,
    pub channels: Option<Vec<i64>>,
    pub stream_type: String,
    pub output_stream_name: Option<String>,
    pub buffer_soft_cap: Option<usize>,
}

impl TransformConfig {
    /// Validate raw options
    ///
    /// # Returns
    /// `Configuration` error for unknown method, filter or window names,
    /// options from both the filter and PSD families, or inconsistent
    /// window/segment sizes
    pub fn from_options(options: &TransformOptions) -> Result<Self> {
        let window_length = options.window_length.unwrap_or(DEFAULT_WINDOW_LENGTH);
        if window_length == 0 {
            return Err(StreamstaffError::config("window_length must be at least 1"));
        }

        let (method, default_stream_type) = if options.is_filter() {
            Self::filter_method(options, window_length)?
        } else {
            Self::psd_method(options, window_length)?
        };

        // "filter" names the family rather than a concrete type
        let stream_type = match options.stream_type.as_deref() {
            None => default_stream_type,
            Some(GENERIC_FILTER_TYPE) if options.is_filter() => default_stream_type,
            Some(explicit) => explicit.to_string(),
        };
        let output_stream_name = options
            .output_stream_name
            .clone()
            .filter(|name| name != DERIVED_NAME);

        Ok(Self {
            method,
            channels: options.channels.clone(),
            stream_type,
            output_stream_name,
            buffer_soft_cap: options.buffer_soft_cap,
        })
    }

    fn filter_method(options: &TransformOptions, window_length: usize) -> Result<(TransformMethod, String)> {
        let psd_only = [
            ("method", options.method.is_some()),
            ("nperseg", options.nperseg.is_some()),
            ("noverlap", options.noverlap.is_some()),
            ("window_type", options.window_type.is_some() || options.window_function.is_some()),
        ];
        reject_foreign("filter", &psd_only)?;

        let kind: FilterKind = options.filter_type.as_deref().unwrap_or("butter").parse()?;
        let response: FilterResponse = match options.filter_response.as_deref() {
            Some(name) => name.parse()?,
            None => FilterResponse::Lowpass,
        };
        let order = options.filter_order.unwrap_or(DEFAULT_FILTER_ORDER);
        if order == 0 {
            return Err(StreamstaffError::config("filter_order must be at least 1"));
        }

        let cutoff = match (&options.cutoff_hz, options.sample_period) {
            (Some(_), Some(_)) => {
                return Err(StreamstaffError::config(
                    "give either cutoff_hz or sample_period, not both",
                ))
            }
            (Some(edges), None) => {
                if edges.len() != response.cutoff_count() {
                    return Err(StreamstaffError::config(format!(
                        "{} filter needs {} cutoff_hz values, got {}",
                        response,
                        response.cutoff_count(),
                        edges.len()
                    )));
                }
                if edges.iter().any(|&hz| !(hz > 0.0 && hz.is_finite())) {
                    return Err(StreamstaffError::config("cutoff_hz values must be positive"));
                }
                Cutoff::Hz(edges.clone())
            }
            (None, period) => {
                let period = period.unwrap_or(DEFAULT_SAMPLE_PERIOD);
                if !(period > 0.0 && period.is_finite()) {
                    return Err(StreamstaffError::config(format!(
                        "sample_period must be positive, got {}",
                        period
                    )));
                }
                if response.cutoff_count() != 1 {
                    return Err(StreamstaffError::config(format!(
                        "{} filter needs explicit cutoff_hz edges",
                        response
                    )));
                }
                Cutoff::SamplePeriod(period)
            }
        };

        let spec = FilterSpec {
            kind,
            response,
            order,
            cutoff,
        };
        let stream_type = format!("{}_filter", kind);
        Ok((TransformMethod::Filter { spec, window_length }, stream_type))
    }

    fn psd_method(options: &TransformOptions, window_length: usize) -> Result<(TransformMethod, String)> {
        let method: PsdMethod = options.method.as_deref().unwrap_or("periodogram").parse()?;

        let window = match (&options.window_function, options.window_type.as_deref()) {
            (Some(window), _) => window.clone(),
            (None, Some(name)) => WindowFunction::from(name.parse::<WindowType>()?),
            (None, None) => WindowFunction::default(),
        };

        let spec = PsdSpec {
            method,
            window,
            window_length,
            nperseg: options.nperseg,
            noverlap: options.noverlap,
        };
        // Resolves segment sizes and evaluates the taper once
        SpectralEstimator::new(&spec)?;

        Ok((TransformMethod::Psd(spec), PSD_STREAM_TYPE.to_string()))
    }

    /// Samples per extracted window
    pub fn window_length(&self) -> usize {
        match &self.method {
            TransformMethod::Filter { window_length, .. } => *window_length,
            TransformMethod::Psd(spec) => spec.window_length,
        }
    }
}

fn reject_foreign(family: &str, options: &[(&str, bool)]) -> Result<()> {
    match options.iter().find(|(_, present)| *present) {
        Some((name, _)) => Err(StreamstaffError::config(format!(
            "option '{}' does not apply to a {} transform",
            name, family
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psd_defaults() {
        let config = TransformConfig::from_options(&TransformOptions::new()).unwrap();
        assert_eq!(config.stream_type, "psd");
        assert_eq!(config.window_length(), 256);
        match config.method {
            TransformMethod::Psd(spec) => {
                assert_eq!(spec.method, PsdMethod::Periodogram);
                assert_eq!(spec.window.name(), "hamming");
            }
            other => panic!("expected psd, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_defaults() {
        let options = TransformOptions::new().with_filter_type("butter");
        let config = TransformConfig::from_options(&options).unwrap();
        assert_eq!(config.stream_type, "butter_filter");
        match config.method {
            TransformMethod::Filter { spec, window_length } => {
                assert_eq!(window_length, 256);
                assert_eq!(spec.order, 2);
                assert_eq!(spec.response, FilterResponse::Lowpass);
                assert_eq!(spec.cutoff, Cutoff::SamplePeriod(5.0));
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let options = TransformOptions::new().with_method("bogus");
        let err = TransformConfig::from_options(&options).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let options = TransformOptions::new().with_filter_type("cheby2");
        assert!(TransformConfig::from_options(&options).unwrap_err().is_configuration());
    }

    #[test]
    fn test_mixed_families_rejected() {
        let options = TransformOptions::new()
            .with_filter_type("butter")
            .with_method("welch");
        assert!(TransformConfig::from_options(&options).is_err());
    }

    #[test]
    fn test_inconsistent_welch_rejected() {
        let options = TransformOptions::new()
            .with_method("welch")
            .with_welch_segments(Some(64), Some(64));
        assert!(TransformConfig::from_options(&options).is_err());

        let options = TransformOptions::new().with_method("welch").with_window_length(7);
        assert!(TransformConfig::from_options(&options).is_err());
    }

    #[test]
    fn test_from_json() {
        let options = TransformOptions::from_json(
            r#"{"channels": [1, 3], "method": "welch", "nperseg": 64, "window_type": "hann"}"#,
        )
        .unwrap();
        assert_eq!(options.channels, Some(vec![1, 3]));
        let config = TransformConfig::from_options(&options).unwrap();
        match config.method {
            TransformMethod::Psd(spec) => {
                assert_eq!(spec.method, PsdMethod::Welch);
                assert_eq!(spec.nperseg, Some(64));
                assert_eq!(spec.window.name(), "hann");
            }
            other => panic!("expected psd, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_json_key_rejected() {
        let err = TransformOptions::from_json(r#"{"windowlength": 128}"#).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bandpass_requires_edges() {
        let options = TransformOptions {
            filter_type: Some("butter".into()),
            filter_response: Some("bandpass".into()),
            ..TransformOptions::default()
        };
        assert!(TransformConfig::from_options(&options).is_err());

        let options = TransformOptions {
            cutoff_hz: Some(vec![8.0, 12.0]),
            ..options
        };
        assert!(TransformConfig::from_options(&options).is_ok());
    }

    #[test]
    fn test_naming_sentinels() {
        let options = TransformOptions::new()
            .with_filter_type("butter")
            .with_stream_type("filter")
            .with_output_stream_name("default");
        let config = TransformConfig::from_options(&options).unwrap();
        assert_eq!(config.stream_type, "butter_filter");
        assert_eq!(config.output_stream_name, None);

        let options = TransformOptions::new()
            .with_stream_type("spectra")
            .with_output_stream_name("muse-psd");
        let config = TransformConfig::from_options(&options).unwrap();
        assert_eq!(config.stream_type, "spectra");
        assert_eq!(config.output_stream_name.as_deref(), Some("muse-psd"));
    }

    #[test]
    fn test_custom_taper_reaches_estimator() {
        let options = TransformOptions::new()
            .with_window_length(64)
            .with_window_function(WindowFunction::custom("flat", |n| vec![1.0; n]));
        let config = TransformConfig::from_options(&options).unwrap();
        match &config.method {
            TransformMethod::Psd(spec) => assert_eq!(spec.window.name(), "flat"),
            other => panic!("expected psd, got {:?}", other),
        }

        let mut estimator = match config.method {
            TransformMethod::Psd(spec) => SpectralEstimator::new(&spec).unwrap(),
            other => panic!("expected psd, got {:?}", other),
        };
        assert_eq!(estimator.window_name(), "flat");

        // With a flat taper a pure bin-8 tone lands entirely in bin 8
        let tone: Vec<f64> = (0..64)
            .map(|i| (2.0 * std::f64::consts::PI * 8.0 * i as f64 / 64.0).cos())
            .collect();
        let psd = estimator.estimate(&tone).unwrap();
        let peak = psd
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert_eq!(peak.0, 8);
        assert!(psd[7] < 1e-12 && psd[9] < 1e-12);
    }

    #[test]
    fn test_wrong_length_custom_taper_rejected() {
        let options = TransformOptions::new()
            .with_method("welch")
            .with_window_function(WindowFunction::custom("short", |n| vec![1.0; n / 2]));
        let err = TransformConfig::from_options(&options).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn test_custom_taper_rejected_for_filter() {
        let options = TransformOptions::new()
            .with_filter_type("butter")
            .with_window_function(WindowFunction::custom("flat", |n| vec![1.0; n]));
        assert!(TransformConfig::from_options(&options).unwrap_err().is_configuration());
    }
}
