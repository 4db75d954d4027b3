//! Chunk buffering, window extraction and the per-stream transform worker

pub mod buffer;
pub mod channels;
pub mod config;
pub mod supervisor;
pub mod transform;
pub mod worker;

pub use buffer::{BufferLevel, ChunkBuffer};
pub use channels::{select_channels, ChannelIndexSet};
pub use config::{TransformConfig, TransformMethod, TransformOptions};
pub use supervisor::ManipulatorSupervisor;
pub use transform::Transform;
pub use worker::{TransformWorker, WorkerState, WorkerStats, WorkerStatus};
