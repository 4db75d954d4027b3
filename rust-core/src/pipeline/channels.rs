//! Channel selection: 1-based user numbers to validated 0-based columns

use crate::error::{Result, StreamstaffError};

/// Ordered, unique, in-range input column indices
///
/// Position `i` in the set is output column `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIndexSet {
    indices: Vec<usize>,
}

impl ChannelIndexSet {
    /// Every channel of a `channel_count`-wide stream, ascending
    pub fn all(channel_count: usize) -> Self {
        Self {
            indices: (0..channel_count).collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// The user-facing 1-based channel numbers, in output order
    pub fn one_based(&self) -> Vec<usize> {
        self.indices.iter().map(|i| i + 1).collect()
    }
}

/// Validate a channel request against a stream's channel count
///
/// # Arguments
/// * `requested` - 1-based channel numbers; `None` or empty selects all
/// * `channel_count` - Width of the input stream
///
/// # Returns
/// `Configuration` error for a number below 1, above `channel_count`, or
/// listed twice
pub fn select_channels(requested: Option<&[i64]>, channel_count: usize) -> Result<ChannelIndexSet> {
    let requested = match requested {
        Some(requested) if !requested.is_empty() => requested,
        _ => return Ok(ChannelIndexSet::all(channel_count)),
    };

    let mut indices = Vec::with_capacity(requested.len());
    for &number in requested {
        if number < 1 || number as u64 > channel_count as u64 {
            return Err(StreamstaffError::config(format!(
                "channel {} is out of range for a {}-channel stream (channels are numbered from 1)",
                number, channel_count
            )));
        }
        let index = (number - 1) as usize;
        if indices.contains(&index) {
            return Err(StreamstaffError::config(format!(
                "channel {} is selected more than once",
                number
            )));
        }
        indices.push(index);
    }

    Ok(ChannelIndexSet { indices })
}
