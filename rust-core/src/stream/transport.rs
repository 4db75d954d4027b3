//! Collaborator contract for stream discovery and sample transport
//!
//! The core never talks to a network directly. Anything that can resolve
//! streams, pull chunks from an inlet and push chunks to an outlet can drive
//! a transform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::chunk::Chunk;
use super::descriptor::StreamDescriptor;
use crate::error::{Result, StreamstaffError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The producing side went away and everything it sent has been drained
    #[error("Stream closed by its producer")]
    StreamClosed,

    #[error("Stream disconnected: {0}")]
    Disconnected(String),

    #[error("Outlet queue full: needed {needed} slots, {free} free")]
    Backpressure { needed: usize, free: usize },

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Cooperative stop signal shared between a supervisor and its worker
///
/// Checked at the top of every worker iteration and handed to the blocking
/// pull so shutdown completes within one pull timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receiving end of a stream
pub trait StreamInlet: Send {
    /// Acquire the underlying connection
    fn open_stream(&mut self) -> TransportResult<()>;

    /// Pull whatever rows are available
    ///
    /// Blocks until data arrives, the transport's own timeout elapses, or
    /// `cancel` fires. May return a zero-row chunk. Timestamps are returned
    /// alongside but are not used by the transforms.
    fn pull_chunk(&mut self, cancel: &CancelToken) -> TransportResult<(Chunk, Vec<f64>)>;

    /// Release the underlying connection; must be safe to call twice
    fn close_stream(&mut self);
}

/// Sending end of a stream
pub trait StreamOutlet: Send {
    fn descriptor(&self) -> &StreamDescriptor;

    /// Push rows; column count must equal the declared channel count
    fn push_chunk(&mut self, chunk: &Chunk) -> TransportResult<()>;
}

/// Stream discovery plus inlet/outlet construction
pub trait StreamTransport: Send + Sync {
    type Inlet: StreamInlet + 'static;
    type Outlet: StreamOutlet + 'static;

    /// All streams whose `property` equals `value`, waiting at most `timeout`
    fn resolve(&self, property: &str, value: &str, timeout: Duration) -> Vec<StreamDescriptor>;

    fn open_inlet(&self, stream: &StreamDescriptor) -> TransportResult<Self::Inlet>;

    fn create_outlet(&self, descriptor: StreamDescriptor) -> TransportResult<Self::Outlet>;
}

/// Resolve a single stream by property, failing with `NotFound` if none match
///
/// When several streams match, the first one is used.
pub fn resolve_stream<T: StreamTransport + ?Sized>(
    transport: &T,
    property: &str,
    value: &str,
    timeout: Duration,
) -> Result<StreamDescriptor> {
    let mut streams = transport.resolve(property, value, timeout);
    if streams.is_empty() {
        return Err(StreamstaffError::NotFound {
            property: property.to_string(),
            value: value.to_string(),
        });
    }
    if streams.len() > 1 {
        log::warn!(
            "{} streams match {}='{}', using '{}'",
            streams.len(),
            property,
            value,
            streams[0].name()
        );
    }
    let stream = streams.swap_remove(0);
    log::info!(
        "Resolved stream '{}' (type={}, channels={}, rate={} Hz)",
        stream.name(),
        stream.stream_type(),
        stream.channel_count(),
        stream.nominal_srate()
    );
    Ok(stream)
}

/// Open inlet that is closed when dropped
pub struct InletGuard<I: StreamInlet> {
    inlet: I,
}

impl<I: StreamInlet> InletGuard<I> {
    pub fn open(mut inlet: I) -> TransportResult<Self> {
        inlet.open_stream()?;
        Ok(Self { inlet })
    }

    pub fn pull_chunk(&mut self, cancel: &CancelToken) -> TransportResult<(Chunk, Vec<f64>)> {
        self.inlet.pull_chunk(cancel)
    }
}

impl<I: StreamInlet> Drop for InletGuard<I> {
    fn drop(&mut self) {
        self.inlet.close_stream();
    }
}
