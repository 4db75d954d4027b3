//! Per-window transform bound to one input stream

use ndarray::{Array2, ArrayView1};

use super::channels::ChannelIndexSet;
use super::config::{TransformConfig, TransformMethod};
use crate::error::{Result, StreamstaffError};
use crate::filters::band::{BandFilter, Cutoff};
use crate::spectrum::psd::{PsdMethod, SpectralEstimator};
use crate::stream::Chunk;

/// Filter or PSD computation applied to each selected channel of a window
#[derive(Debug)]
pub enum Transform {
    Filter {
        filter: BandFilter,
        window_length: usize,
    },
    Psd(SpectralEstimator),
}

impl Transform {
    /// Bind a validated configuration to a stream's sample rate
    pub fn bind(config: &TransformConfig, sample_rate: f64) -> Result<Self> {
        match &config.method {
            TransformMethod::Filter {
                spec,
                window_length,
            } => Ok(Transform::Filter {
                filter: BandFilter::design(spec, sample_rate, *window_length)?,
                window_length: *window_length,
            }),
            TransformMethod::Psd(spec) => Ok(Transform::Psd(SpectralEstimator::new(spec)?)),
        }
    }

    /// Rows consumed per window
    pub fn window_length(&self) -> usize {
        match self {
            Transform::Filter { window_length, .. } => *window_length,
            Transform::Psd(estimator) => estimator.window_length(),
        }
    }

    /// Rows produced per window
    pub fn output_len(&self) -> usize {
        match self {
            Transform::Filter { window_length, .. } => *window_length,
            Transform::Psd(estimator) => estimator.output_len(),
        }
    }

    /// Transform one channel's window
    pub fn apply_window(&mut self, channel_window: &[f64]) -> Result<Vec<f64>> {
        match self {
            Transform::Filter { filter, .. } => filter.apply(channel_window),
            Transform::Psd(estimator) => estimator.estimate(channel_window),
        }
    }

    /// Transform every selected channel of `window` and reassemble the
    /// results as columns in selection order
    ///
    /// Either every channel succeeds or nothing is returned.
    pub fn process(&mut self, window: &Array2<f64>, channels: &ChannelIndexSet) -> Result<Chunk> {
        let rows = self.output_len();
        let mut output = Array2::zeros((rows, channels.len()));

        for (column, channel) in channels.iter().enumerate() {
            let input = window.column(channel).to_vec();
            let transformed = self.apply_window(&input)?;
            if transformed.len() != rows {
                return Err(StreamstaffError::config(format!(
                    "transform produced {} rows for channel {}, expected {}",
                    transformed.len(),
                    channel + 1,
                    rows
                )));
            }
            output
                .column_mut(column)
                .assign(&ArrayView1::from(transformed.as_slice()));
        }

        Ok(Chunk::from_array(output))
    }

    /// Parameters a consumer needs to interpret the output stream
    pub fn annotations(&self) -> Vec<(String, String)> {
        let mut annotations = vec![("window_length".to_string(), self.window_length().to_string())];

        match self {
            Transform::Filter { filter, .. } => {
                let spec = filter.spec();
                let cutoff = filter
                    .cutoff_hz()
                    .iter()
                    .map(|hz| hz.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                annotations.push(("filter_type".into(), spec.kind.to_string()));
                annotations.push(("filter_response".into(), spec.response.to_string()));
                annotations.push(("filter_order".into(), spec.order.to_string()));
                annotations.push(("cutoff_hz".into(), cutoff));
                if let Cutoff::SamplePeriod(period) = &spec.cutoff {
                    annotations.push(("sample_period".into(), period.to_string()));
                }
            }
            Transform::Psd(estimator) => {
                annotations.push(("nperseg".into(), estimator.nperseg().to_string()));
                annotations.push(("method".into(), estimator.method().to_string()));
                annotations.push(("window_type".into(), estimator.window_name().to_string()));
                if estimator.method() == PsdMethod::Welch {
                    annotations.push(("noverlap".into(), estimator.noverlap().to_string()));
                }
            }
        }

        annotations
    }
}
