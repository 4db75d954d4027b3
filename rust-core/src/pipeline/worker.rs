//! Per-stream processing loop
//!
//! Pull a chunk, buffer it, and for every full window run the transform on
//! the selected channels and push the result. Windows leave in arrival order.

use std::sync::{Arc, Mutex};

use super::buffer::{BufferLevel, ChunkBuffer};
use super::channels::ChannelIndexSet;
use super::transform::Transform;
use crate::error::{Result, StreamstaffError};
use crate::stream::{CancelToken, Chunk, InletGuard, StreamInlet, StreamOutlet, TransportError};

/// Lifecycle of a worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    /// Constructed, nothing pulled yet
    Idle,
    Running,
    /// Cancelled or the input stream closed
    Stopped,
    /// Transform or transport error; carries the message
    Faulted(String),
}

impl WorkerState {
    pub fn is_finished(&self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Faulted(_))
    }
}

/// Counters maintained by the worker loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub chunks_pulled: u64,
    pub empty_pulls: u64,
    pub rows_received: u64,
    pub windows_emitted: u64,
    /// Windows an outlet refused for lack of queue space
    pub windows_dropped: u64,
    pub overflow_events: u64,
    pub peak_buffered_rows: usize,
    pub buffered_rows: usize,
}

/// State and counters shared with the owning supervisor
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub stats: WorkerStats,
}

pub type SharedStatus = Arc<Mutex<WorkerStatus>>;

/// Owns one stream's buffer, channel selection and transform
pub struct TransformWorker {
    transform: Transform,
    channels: ChannelIndexSet,
    buffer: ChunkBuffer,
    state: WorkerState,
    stats: WorkerStats,
    status: SharedStatus,
}

impl TransformWorker {
    /// # Arguments
    /// * `transform` - Bound transform
    /// * `channels` - Validated selection of input columns
    /// * `input_width` - Input stream channel count
    /// * `soft_cap` - Buffered rows above which overflow is reported
    pub fn new(
        transform: Transform,
        channels: ChannelIndexSet,
        input_width: usize,
        soft_cap: Option<usize>,
    ) -> Self {
        let status = Arc::new(Mutex::new(WorkerStatus {
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
        }));
        Self {
            transform,
            channels,
            buffer: ChunkBuffer::new(input_width, soft_cap),
            state: WorkerState::Idle,
            stats: WorkerStats::default(),
            status,
        }
    }

    /// Handle for observing state and counters from another thread
    pub fn status_handle(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer one input chunk and push every window it completes
    ///
    /// # Returns
    /// Number of output chunks pushed
    pub fn ingest<O: StreamOutlet + ?Sized>(&mut self, chunk: &Chunk, outlet: &mut O) -> Result<usize> {
        if self.state == WorkerState::Idle {
            self.set_state(WorkerState::Running);
        }

        self.stats.chunks_pulled += 1;
        if chunk.is_empty() {
            self.stats.empty_pulls += 1;
            self.publish();
            return Ok(0);
        }

        self.stats.rows_received += chunk.rows() as u64;
        if let BufferLevel::OverCap { .. } = self.buffer.append(chunk)? {
            self.stats.overflow_events = self.buffer.overflow_events();
        }
        self.stats.peak_buffered_rows = self.buffer.peak_rows();

        let window_length = self.transform.window_length();
        let mut pushed = 0;
        while let Some(window) = self.buffer.take_window(window_length) {
            let output = self.transform.process(&window, &self.channels)?;
            match outlet.push_chunk(&output) {
                Ok(()) => {}
                // A lagging consumer loses this window; the stream itself is fine
                Err(TransportError::Backpressure { needed, free }) => {
                    self.stats.windows_dropped += 1;
                    log::warn!(
                        "Output '{}' is backed up ({} free, {} needed), window dropped",
                        outlet.descriptor().name(),
                        free,
                        needed
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            pushed += 1;
            self.stats.windows_emitted += 1;
            log::debug!(
                "Pushed window {} ({} rows x {} channels) to '{}'",
                self.stats.windows_emitted,
                output.rows(),
                output.channels(),
                outlet.descriptor().name()
            );
        }

        self.publish();
        Ok(pushed)
    }

    /// Run until cancelled, the input closes, or an error occurs
    ///
    /// The inlet is closed when this returns, whatever the exit path.
    pub fn run<I, O>(&mut self, inlet: InletGuard<I>, outlet: &mut O, cancel: &CancelToken) -> WorkerState
    where
        I: StreamInlet,
        O: StreamOutlet + ?Sized,
    {
        let result = self.pump(inlet, outlet, cancel);
        let final_state = match result {
            Ok(()) => WorkerState::Stopped,
            Err(StreamstaffError::Transport(TransportError::StreamClosed)) => {
                log::info!("Input stream closed, stopping '{}'", outlet.descriptor().name());
                WorkerState::Stopped
            }
            Err(e) => {
                log::error!("Worker for '{}' faulted: {}", outlet.descriptor().name(), e);
                WorkerState::Faulted(e.to_string())
            }
        };
        self.set_state(final_state.clone());
        final_state
    }

    fn pump<I, O>(&mut self, mut inlet: InletGuard<I>, outlet: &mut O, cancel: &CancelToken) -> Result<()>
    where
        I: StreamInlet,
        O: StreamOutlet + ?Sized,
    {
        self.set_state(WorkerState::Running);

        while !cancel.is_cancelled() {
            let (chunk, _timestamps) = inlet.pull_chunk(cancel)?;
            self.ingest(&chunk, outlet)?;
        }
        Ok(())
    }

    fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.publish();
    }

    fn publish(&mut self) {
        self.stats.buffered_rows = self.buffer.len();
        if let Ok(mut status) = self.status.lock() {
            status.state = self.state.clone();
            status.stats = self.stats.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{TransformConfig, TransformOptions};
    use crate::stream::{StreamDescriptor, TransportResult};

    #[derive(Default)]
    struct CollectingOutlet {
        descriptor: Option<StreamDescriptor>,
        pushed: Vec<Chunk>,
    }

    impl StreamOutlet for CollectingOutlet {
        fn descriptor(&self) -> &StreamDescriptor {
            self.descriptor.as_ref().unwrap()
        }

        fn push_chunk(&mut self, chunk: &Chunk) -> TransportResult<()> {
            self.pushed.push(chunk.clone());
            Ok(())
        }
    }

    struct FullOutlet {
        descriptor: StreamDescriptor,
    }

    impl StreamOutlet for FullOutlet {
        fn descriptor(&self) -> &StreamDescriptor {
            &self.descriptor
        }

        fn push_chunk(&mut self, chunk: &Chunk) -> TransportResult<()> {
            Err(TransportError::Backpressure {
                needed: chunk.rows() * chunk.channels(),
                free: 0,
            })
        }
    }

    struct ScriptedInlet {
        chunks: Vec<TransportResult<Chunk>>,
    }

    fn scripted(chunks: Vec<TransportResult<Chunk>>) -> InletGuard<ScriptedInlet> {
        InletGuard::open(ScriptedInlet { chunks }).unwrap()
    }

    impl StreamInlet for ScriptedInlet {
        fn open_stream(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn pull_chunk(&mut self, _cancel: &CancelToken) -> TransportResult<(Chunk, Vec<f64>)> {
            if self.chunks.is_empty() {
                return Err(TransportError::StreamClosed);
            }
            self.chunks.remove(0).map(|chunk| (chunk, Vec::new()))
        }

        fn close_stream(&mut self) {}
    }

    fn outlet() -> CollectingOutlet {
        CollectingOutlet {
            descriptor: Some(StreamDescriptor::new("test--psd", "psd", 4, 256.0, "src")),
            pushed: Vec::new(),
        }
    }

    fn periodogram_worker(window_length: usize) -> TransformWorker {
        capped_worker(window_length, None)
    }

    fn capped_worker(window_length: usize, soft_cap: Option<usize>) -> TransformWorker {
        let options = TransformOptions::new().with_window_length(window_length);
        let config = TransformConfig::from_options(&options).unwrap();
        let transform = Transform::bind(&config, 256.0).unwrap();
        TransformWorker::new(transform, ChannelIndexSet::all(4), 4, soft_cap)
    }

    fn chunk(rows: usize) -> Chunk {
        let samples = (0..rows * 4).map(|i| (i as f64 * 0.1).sin()).collect();
        Chunk::from_interleaved(samples, 4).unwrap()
    }

    #[test]
    fn test_one_window_after_eight_chunks() {
        let mut worker = periodogram_worker(256);
        let mut out = outlet();

        for i in 0..8 {
            let pushed = worker.ingest(&chunk(32), &mut out).unwrap();
            assert_eq!(pushed, if i == 7 { 1 } else { 0 });
        }
        assert_eq!(out.pushed.len(), 1);
        assert_eq!(out.pushed[0].rows(), 129);
        assert_eq!(out.pushed[0].channels(), 4);
        assert_eq!(worker.buffered_rows(), 0);
        assert_eq!(worker.state(), &WorkerState::Running);
    }

    #[test]
    fn test_empty_chunk_leaves_buffer() {
        let mut worker = periodogram_worker(64);
        let mut out = outlet();
        worker.ingest(&chunk(10), &mut out).unwrap();
        worker.ingest(&Chunk::empty(4), &mut out).unwrap();
        assert_eq!(worker.buffered_rows(), 10);
        assert_eq!(worker.stats().empty_pulls, 1);
        assert!(out.pushed.is_empty());
    }

    #[test]
    fn test_large_chunk_emits_multiple_windows() {
        let mut worker = periodogram_worker(64);
        let mut out = outlet();
        assert_eq!(worker.ingest(&chunk(200), &mut out).unwrap(), 3);
        assert_eq!(worker.buffered_rows(), 8);
        assert_eq!(worker.stats().windows_emitted, 3);
    }

    #[test]
    fn test_soft_cap_counts_crossings_without_dropping() {
        let mut worker = capped_worker(64, Some(32));
        let mut out = outlet();

        worker.ingest(&chunk(40), &mut out).unwrap();
        assert_eq!(worker.stats().overflow_events, 1);

        // Still above the cap: same crossing, one window drained
        assert_eq!(worker.ingest(&chunk(40), &mut out).unwrap(), 1);
        assert_eq!(worker.stats().overflow_events, 1);
        assert_eq!(worker.buffered_rows(), 16);

        worker.ingest(&chunk(10), &mut out).unwrap();
        worker.ingest(&chunk(10), &mut out).unwrap();

        let stats = worker.stats();
        assert_eq!(stats.overflow_events, 2);
        assert_eq!(stats.rows_received, 100);
        assert_eq!(stats.peak_buffered_rows, 80);
        assert_eq!(worker.buffered_rows(), 36);
        assert_eq!(out.pushed.len(), 1);
    }

    #[test]
    fn test_backed_up_output_drops_window_and_keeps_running() {
        let mut worker = periodogram_worker(64);
        let mut out = FullOutlet {
            descriptor: StreamDescriptor::new("test--psd", "psd", 4, 256.0, "src"),
        };

        assert_eq!(worker.ingest(&chunk(128), &mut out).unwrap(), 0);
        assert_eq!(worker.stats().windows_dropped, 2);
        assert_eq!(worker.stats().windows_emitted, 0);
        assert_eq!(worker.buffered_rows(), 0);
        assert_eq!(worker.state(), &WorkerState::Running);
    }

    #[test]
    fn test_stream_close_stops() {
        let mut worker = periodogram_worker(64);
        let status = worker.status_handle();
        let inlet = scripted(vec![Ok(chunk(64)), Ok(Chunk::empty(4))]);
        let mut out = outlet();
        let state = worker.run(inlet, &mut out, &CancelToken::new());

        assert_eq!(state, WorkerState::Stopped);
        assert_eq!(out.pushed.len(), 1);
        let status = status.lock().unwrap();
        assert_eq!(status.state, WorkerState::Stopped);
        assert_eq!(status.stats.chunks_pulled, 2);
    }

    #[test]
    fn test_transport_error_faults() {
        let mut worker = periodogram_worker(64);
        let inlet = scripted(vec![Ok(chunk(16)), Err(TransportError::Disconnected("cable".into()))]);
        let state = worker.run(inlet, &mut outlet(), &CancelToken::new());
        assert!(matches!(state, WorkerState::Faulted(msg) if msg.contains("cable")));
    }

    #[test]
    fn test_wrong_width_faults_without_push() {
        let mut worker = periodogram_worker(64);
        let bad = Chunk::from_interleaved(vec![0.0; 3 * 64], 3).unwrap();
        let inlet = scripted(vec![Ok(bad)]);
        let mut out = outlet();
        let state = worker.run(inlet, &mut out, &CancelToken::new());
        assert!(matches!(state, WorkerState::Faulted(_)));
        assert!(out.pushed.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut worker = periodogram_worker(64);
        let cancel = CancelToken::new();
        cancel.cancel();
        let inlet = scripted(vec![Ok(chunk(64))]);
        let mut out = outlet();
        assert_eq!(worker.run(inlet, &mut out, &cancel), WorkerState::Stopped);
        assert!(out.pushed.is_empty());
    }
}
