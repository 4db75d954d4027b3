//! FIFO row buffer that turns irregular chunks into fixed windows

use std::collections::VecDeque;

use ndarray::Array2;

use crate::error::{Result, StreamstaffError};
use crate::stream::Chunk;

/// Fill level after an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLevel {
    Normal,
    /// More rows buffered than the soft cap; nothing is discarded
    OverCap { rows: usize, cap: usize },
}

/// Growing sequence of rows, consumed oldest-first in whole windows
///
/// Rows are stored interleaved (row-major), one row per sample instant
/// across every input channel.
#[derive(Debug)]
pub struct ChunkBuffer {
    samples: VecDeque<f64>,
    width: usize,
    soft_cap: Option<usize>,
    over_cap: bool,
    overflow_events: u64,
    peak_rows: usize,
}

impl ChunkBuffer {
    /// # Arguments
    /// * `width` - Input stream channel count
    /// * `soft_cap` - Row count above which appends report `OverCap`
    pub fn new(width: usize, soft_cap: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            width,
            soft_cap,
            over_cap: false,
            overflow_events: 0,
            peak_rows: 0,
        }
    }

    /// Append all rows of `chunk` at the tail
    ///
    /// An empty chunk is a no-op. A chunk whose width differs from the
    /// buffer's is rejected without touching the buffer.
    pub fn append(&mut self, chunk: &Chunk) -> Result<BufferLevel> {
        if chunk.is_empty() {
            return Ok(self.level());
        }
        if chunk.channels() != self.width {
            return Err(StreamstaffError::ChannelMismatch {
                expected: self.width,
                actual: chunk.channels(),
            });
        }

        self.samples.extend(chunk.view().iter().copied());
        self.peak_rows = self.peak_rows.max(self.len());

        let level = self.level();
        match level {
            BufferLevel::OverCap { rows, cap } if !self.over_cap => {
                self.over_cap = true;
                self.overflow_events += 1;
                log::warn!(
                    "Buffered {} rows, above the soft cap of {}; windows are not keeping up",
                    rows,
                    cap
                );
            }
            BufferLevel::Normal => self.over_cap = false,
            _ => {}
        }
        Ok(level)
    }

    /// Remove and return the oldest `n` rows as an `n × width` array
    ///
    /// Returns `None`, leaving the buffer untouched, when fewer than `n`
    /// rows are buffered.
    pub fn take_window(&mut self, n: usize) -> Option<Array2<f64>> {
        if self.len() < n {
            return None;
        }

        let samples: Vec<f64> = self.samples.drain(..n * self.width).collect();
        if self.over_cap && self.level() == BufferLevel::Normal {
            self.over_cap = false;
        }
        Array2::from_shape_vec((n, self.width), samples).ok()
    }

    /// Buffered rows
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.samples.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Times the buffer crossed above its soft cap
    pub fn overflow_events(&self) -> u64 {
        self.overflow_events
    }

    /// Largest number of rows held at once
    pub fn peak_rows(&self) -> usize {
        self.peak_rows
    }

    fn level(&self) -> BufferLevel {
        match self.soft_cap {
            Some(cap) if self.len() > cap => BufferLevel::OverCap {
                rows: self.len(),
                cap,
            },
            _ => BufferLevel::Normal,
        }
    }
}
