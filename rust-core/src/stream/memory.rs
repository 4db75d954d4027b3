//! In-process stream transport backed by lock-free ring buffers
//!
//! Every opened inlet gets its own SPSC ring; the outlet fans each pushed
//! chunk out to all live subscribers. Used by the tests, the benches and the
//! Python bindings, and as a reference for wiring a network transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use super::chunk::Chunk;
use super::descriptor::StreamDescriptor;
use super::transport::{
    CancelToken, StreamInlet, StreamOutlet, StreamTransport, TransportError, TransportResult,
};

/// Default per-subscriber queue size in samples
pub const DEFAULT_QUEUE_CAPACITY: usize = 96_000;

/// Default time a pull waits for data before returning an empty chunk
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_millis(20);

struct Subscriber {
    producer: HeapProducer<f64>,
    open: Arc<AtomicBool>,
}

type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

#[derive(Clone)]
struct StreamEntry {
    descriptor: StreamDescriptor,
    subscribers: Subscribers,
    alive: Arc<AtomicBool>,
}

/// Registry of in-process streams
#[derive(Clone)]
pub struct MemoryTransport {
    streams: Arc<Mutex<Vec<StreamEntry>>>,
    queue_capacity: usize,
    pull_timeout: Duration,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(Vec::new())),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    /// Set the per-subscriber queue size (in samples) for inlets opened later
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Descriptors of every stream whose outlet is still alive
    pub fn streams(&self) -> Vec<StreamDescriptor> {
        match self.streams.lock() {
            Ok(streams) => streams
                .iter()
                .filter(|s| s.alive.load(Ordering::SeqCst))
                .map(|s| s.descriptor.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn find(&self, stream: &StreamDescriptor) -> Option<StreamEntry> {
        let streams = self.streams.lock().ok()?;
        streams
            .iter()
            .find(|s| s.alive.load(Ordering::SeqCst) && s.descriptor == *stream)
            .cloned()
    }
}

impl StreamTransport for MemoryTransport {
    type Inlet = MemoryInlet;
    type Outlet = MemoryOutlet;

    fn resolve(&self, property: &str, value: &str, timeout: Duration) -> Vec<StreamDescriptor> {
        let deadline = Instant::now() + timeout;
        loop {
            let found: Vec<StreamDescriptor> = self
                .streams()
                .into_iter()
                .filter(|d| d.matches(property, value))
                .collect();
            if !found.is_empty() || Instant::now() >= deadline {
                return found;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn open_inlet(&self, stream: &StreamDescriptor) -> TransportResult<MemoryInlet> {
        let entry = self.find(stream).ok_or_else(|| {
            TransportError::Disconnected(format!("stream '{}' is not registered", stream.name()))
        })?;

        Ok(MemoryInlet {
            descriptor: entry.descriptor,
            subscribers: entry.subscribers,
            alive: entry.alive,
            queue_capacity: self.queue_capacity,
            pull_timeout: self.pull_timeout,
            consumer: None,
            open: Arc::new(AtomicBool::new(false)),
            rows_pulled: 0,
        })
    }

    fn create_outlet(&self, descriptor: StreamDescriptor) -> TransportResult<MemoryOutlet> {
        let entry = StreamEntry {
            descriptor: descriptor.clone(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(AtomicBool::new(true)),
        };

        let mut streams = self
            .streams
            .lock()
            .map_err(|_| TransportError::Disconnected("stream registry poisoned".into()))?;
        streams.retain(|s| s.alive.load(Ordering::SeqCst));
        streams.push(entry.clone());

        Ok(MemoryOutlet {
            descriptor,
            subscribers: entry.subscribers,
            alive: entry.alive,
            dropped_chunks: 0,
        })
    }
}

/// Producer side of an in-process stream
///
/// Dropping the outlet closes the stream; subscribers drain what is queued
/// and then see `StreamClosed`.
pub struct MemoryOutlet {
    descriptor: StreamDescriptor,
    subscribers: Subscribers,
    alive: Arc<AtomicBool>,
    dropped_chunks: u64,
}

impl MemoryOutlet {
    /// Number of inlets currently subscribed
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|s| s.open.load(Ordering::SeqCst)).count())
            .unwrap_or(0)
    }

    /// Chunks that did not fit in some subscriber's queue
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks
    }
}

impl StreamOutlet for MemoryOutlet {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> TransportResult<()> {
        if chunk.channels() != self.descriptor.channel_count() {
            return Err(TransportError::InvalidChunk(format!(
                "outlet '{}' declares {} channels, chunk has {}",
                self.descriptor.name(),
                self.descriptor.channel_count(),
                chunk.channels()
            )));
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let samples = chunk.to_interleaved();
        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| TransportError::Disconnected("subscriber list poisoned".into()))?;
        subs.retain(|s| s.open.load(Ordering::SeqCst));

        let mut tightest: Option<usize> = None;
        for sub in subs.iter_mut() {
            // Whole chunks only, so a subscriber never sees a torn row
            let free = sub.producer.free_len();
            if free >= samples.len() {
                sub.producer.push_slice(&samples);
            } else {
                self.dropped_chunks += 1;
                tightest = Some(tightest.map_or(free, |t| t.min(free)));
                log::warn!(
                    "Subscriber queue of '{}' is full ({} free, {} needed), chunk dropped",
                    self.descriptor.name(),
                    free,
                    samples.len()
                );
            }
        }

        match tightest {
            Some(free) => Err(TransportError::Backpressure {
                needed: samples.len(),
                free,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for MemoryOutlet {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Consumer side of an in-process stream
pub struct MemoryInlet {
    descriptor: StreamDescriptor,
    subscribers: Subscribers,
    alive: Arc<AtomicBool>,
    queue_capacity: usize,
    pull_timeout: Duration,
    consumer: Option<HeapConsumer<f64>>,
    open: Arc<AtomicBool>,
    rows_pulled: u64,
}

impl MemoryInlet {
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn is_open(&self) -> bool {
        self.consumer.is_some()
    }

    fn timestamps(&self, rows: usize) -> Vec<f64> {
        let srate = self.descriptor.nominal_srate();
        (0..rows as u64)
            .map(|i| {
                if srate > 0.0 {
                    (self.rows_pulled + i) as f64 / srate
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl StreamInlet for MemoryInlet {
    fn open_stream(&mut self) -> TransportResult<()> {
        if self.consumer.is_some() {
            return Ok(());
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::StreamClosed);
        }

        let (producer, consumer) = HeapRb::<f64>::new(self.queue_capacity).split();
        self.open.store(true, Ordering::SeqCst);
        self.subscribers
            .lock()
            .map_err(|_| TransportError::Disconnected("subscriber list poisoned".into()))?
            .push(Subscriber {
                producer,
                open: Arc::clone(&self.open),
            });
        self.consumer = Some(consumer);
        Ok(())
    }

    fn pull_chunk(&mut self, cancel: &CancelToken) -> TransportResult<(Chunk, Vec<f64>)> {
        if self.consumer.is_none() {
            self.open_stream()?;
        }
        let channels = self.descriptor.channel_count();
        let deadline = Instant::now() + self.pull_timeout;

        loop {
            let consumer = match self.consumer.as_mut() {
                Some(consumer) => consumer,
                None => return Err(TransportError::Disconnected("inlet closed".into())),
            };

            let whole = if channels == 0 { 0 } else { consumer.len() / channels * channels };
            if whole > 0 {
                let mut samples = vec![0.0; whole];
                let read = consumer.pop_slice(&mut samples);
                samples.truncate(read);
                let chunk = Chunk::from_interleaved(samples, channels)
                    .map_err(|e| TransportError::InvalidChunk(e.to_string()))?;
                let timestamps = self.timestamps(chunk.rows());
                self.rows_pulled += chunk.rows() as u64;
                return Ok((chunk, timestamps));
            }

            if !self.alive.load(Ordering::SeqCst) {
                // The outlet may have pushed right before going away
                if channels > 0 && consumer.len() >= channels {
                    continue;
                }
                return Err(TransportError::StreamClosed);
            }

            if cancel.is_cancelled() || Instant::now() >= deadline {
                return Ok((Chunk::empty(channels), Vec::new()));
            }

            std::thread::sleep(Duration::from_micros(100));
        }
    }

    fn close_stream(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        self.consumer = None;
    }
}

impl Drop for MemoryInlet {
    fn drop(&mut self) {
        self.close_stream();
    }
}
