//! Transform setup and background worker ownership
//!
//! Everything that can be checked before data flows is checked here, on the
//! caller's thread, so a bad configuration never reaches the worker loop.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::channels::{select_channels, ChannelIndexSet};
use super::config::{TransformConfig, TransformOptions};
use super::transform::Transform;
use super::worker::{SharedStatus, TransformWorker, WorkerState, WorkerStats};
use crate::error::{Result, StreamstaffError};
use crate::stream::{resolve_stream, CancelToken, InletGuard, StreamDescriptor, StreamTransport};

/// Owns one running transform: its output descriptor and worker thread
pub struct ManipulatorSupervisor {
    input: StreamDescriptor,
    output: StreamDescriptor,
    channels: ChannelIndexSet,
    cancel: CancelToken,
    status: SharedStatus,
    worker_thread: Option<JoinHandle<()>>,
}

impl ManipulatorSupervisor {
    /// Validate `options` against `input`, create the output stream and start
    /// the worker
    ///
    /// # Returns
    /// The running supervisor, or the first configuration/transport error;
    /// on error no inlet stays open and no thread is spawned
    pub fn start<T: StreamTransport>(
        transport: &T,
        input: &StreamDescriptor,
        options: &TransformOptions,
    ) -> Result<Self> {
        let config = TransformConfig::from_options(options)?;
        Self::start_with_config(transport, input, &config)
    }

    /// Resolve the input stream by property, then `start`
    pub fn resolve_and_start<T: StreamTransport>(
        transport: &T,
        property: &str,
        value: &str,
        timeout: Duration,
        options: &TransformOptions,
    ) -> Result<Self> {
        let config = TransformConfig::from_options(options)?;
        let input = resolve_stream(transport, property, value, timeout)?;
        Self::start_with_config(transport, &input, &config)
    }

    pub fn start_with_config<T: StreamTransport>(
        transport: &T,
        input: &StreamDescriptor,
        config: &TransformConfig,
    ) -> Result<Self> {
        if input.channel_count() == 0 {
            return Err(StreamstaffError::config(format!(
                "input stream '{}' declares no channels",
                input.name()
            )));
        }

        let channels = select_channels(config.channels.as_deref(), input.channel_count())?;
        let transform = Transform::bind(config, input.nominal_srate())?;
        let output = output_descriptor(input, config, &channels, &transform);

        let inlet = InletGuard::open(transport.open_inlet(input)?)?;
        let mut outlet = transport.create_outlet(output.clone())?;

        let mut worker = TransformWorker::new(
            transform,
            channels.clone(),
            input.channel_count(),
            config.buffer_soft_cap,
        );
        let status = worker.status_handle();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let worker_thread = std::thread::spawn(move || {
            worker.run(inlet, &mut outlet, &worker_cancel);
        });

        log::info!(
            "Started '{}' ({}) from '{}' on channels {:?}",
            output.name(),
            output.stream_type(),
            input.name(),
            channels.one_based()
        );

        Ok(Self {
            input: input.clone(),
            output,
            channels,
            cancel,
            status,
            worker_thread: Some(worker_thread),
        })
    }

    pub fn input_descriptor(&self) -> &StreamDescriptor {
        &self.input
    }

    pub fn output_descriptor(&self) -> &StreamDescriptor {
        &self.output
    }

    pub fn channels(&self) -> &ChannelIndexSet {
        &self.channels
    }

    pub fn state(&self) -> WorkerState {
        match self.status.lock() {
            Ok(status) => status.state.clone(),
            Err(poisoned) => poisoned.into_inner().state.clone(),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        match self.status.lock() {
            Ok(status) => status.stats.clone(),
            Err(poisoned) => poisoned.into_inner().stats.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_finished()
    }

    /// Block until the worker finishes on its own or `timeout` elapses
    ///
    /// # Returns
    /// The state observed last
    pub fn wait(&self, timeout: Duration) -> WorkerState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.is_finished() || Instant::now() >= deadline {
                return state;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Cancel the worker and join its thread
    pub fn stop(&mut self) {
        self.cancel.cancel();

        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("Worker thread for '{}' panicked", self.output.name());
            }
            log::info!("Stopped '{}' in state {:?}", self.output.name(), self.state());
        }
    }
}

impl Drop for ManipulatorSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output metadata: derived name, selected width, input rate and source,
/// transform parameters as annotations
fn output_descriptor(
    input: &StreamDescriptor,
    config: &TransformConfig,
    channels: &ChannelIndexSet,
    transform: &Transform,
) -> StreamDescriptor {
    let name = config
        .output_stream_name
        .clone()
        .unwrap_or_else(|| format!("{}--{}", input.name(), config.stream_type));

    let channel_numbers = channels
        .one_based()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let descriptor = StreamDescriptor::new(
        name,
        config.stream_type.clone(),
        channels.len(),
        input.nominal_srate(),
        input.source_id(),
    )
    .with_annotation("channels", channel_numbers);

    transform
        .annotations()
        .into_iter()
        .fold(descriptor, |descriptor, (key, value)| descriptor.with_annotation(key, value))
}
