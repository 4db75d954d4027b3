//! Stream metadata, sample chunks and the transport collaborator contract

pub mod chunk;
pub mod descriptor;
pub mod memory;
pub mod transport;

pub use chunk::Chunk;
pub use descriptor::{SampleFormat, StreamDescriptor};
pub use memory::{MemoryInlet, MemoryOutlet, MemoryTransport};
pub use transport::{
    resolve_stream, CancelToken, InletGuard, StreamInlet, StreamOutlet, StreamTransport,
    TransportError, TransportResult,
};
