//! Rectangular sample blocks exchanged with the transport

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{Result, StreamstaffError};

/// Block of samples, `rows x channels`, row-major in arrival order
///
/// A chunk may have zero rows; that is what an empty pull returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    data: Array2<f64>,
}

impl Chunk {
    /// Zero-row chunk with the given column count
    pub fn empty(channels: usize) -> Self {
        Self {
            data: Array2::zeros((0, channels)),
        }
    }

    pub fn from_array(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Build from one `Vec` per row
    ///
    /// # Returns
    /// `ChannelMismatch` if rows are ragged
    pub fn from_rows(rows: Vec<Vec<f64>>, channels: usize) -> Result<Self> {
        let mut flat = Vec::with_capacity(rows.len() * channels);
        for row in &rows {
            if row.len() != channels {
                return Err(StreamstaffError::ChannelMismatch {
                    expected: channels,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        Self::from_interleaved(flat, channels)
    }

    /// Build from interleaved samples (`[r0c0, r0c1, .., r1c0, ..]`)
    pub fn from_interleaved(samples: Vec<f64>, channels: usize) -> Result<Self> {
        if channels == 0 {
            return if samples.is_empty() {
                Ok(Self::empty(0))
            } else {
                Err(StreamstaffError::ChannelMismatch {
                    expected: 0,
                    actual: samples.len(),
                })
            };
        }
        if samples.len() % channels != 0 {
            return Err(StreamstaffError::ChannelMismatch {
                expected: channels,
                actual: samples.len() % channels,
            });
        }
        let rows = samples.len() / channels;
        let data = Array2::from_shape_vec((rows, channels), samples)
            .map_err(|e| StreamstaffError::config(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Samples of one column in row order
    pub fn column(&self, channel: usize) -> Vec<f64> {
        self.data.column(channel).to_vec()
    }

    /// Row-major copy of the samples
    pub fn to_interleaved(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Copy rows out as nested `Vec`s
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.axis_iter(Axis(0)).map(|row| row.to_vec()).collect()
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }
}
