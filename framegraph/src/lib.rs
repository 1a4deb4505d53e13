//! # RedLilium Frame Graph
//!
//! Render graph scheduling with automatic barrier insertion and
//! frame-pipelined memory arenas.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Executes [`RenderPass`]es frame after frame
//! - [`DependencyManager`] - Access history driving barrier emission
//! - [`GraphResources`] - Named graph-scoped textures and buffers, recreated
//!   only when their requirements change
//! - [`memory`] - Transient ring arenas, persistent storage and element pools
//! - [`ReadbackFuture`] - GPU results read back once an [`ExecutionPoint`] completes
//! - [`GpuBackend`] - Trait for backend implementations, with a CPU-side
//!   [`DummyBackend`](backend::dummy::DummyBackend) for testing
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_framegraph::{FrameGraphConfig, GraphicsDevice, RenderGraph};
//!
//! let device = GraphicsDevice::with_default_backend()?;
//! let mut graph = RenderGraph::<2>::new(device, FrameGraphConfig::default())?;
//! graph.add_pass(ShadowPass::new());
//! graph.add_pass(LightingPass::new());
//!
//! loop {
//!     let output = graph.execute_frame()?;
//!     // ...
//! }
//! ```

pub mod access;
pub mod backend;
pub mod command;
pub mod config;
pub mod dependency;
pub mod device;
pub mod error;
pub mod frame;
pub mod graph;
pub mod memory;
pub mod profiling;
pub mod readback;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use access::{BufferAccess, BufferState, PipelineStage, TextureAccess, TextureLayout, TextureState};
pub use backend::GpuBackend;
pub use command::{
    BufferBarrier, BufferCopyRegion, Command, CommandEncoder, CommandList, TextureBarrier,
};
pub use config::FrameGraphConfig;
pub use dependency::DependencyManager;
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::{GraphicsError, Result};
pub use frame::{DEFAULT_FRAMES_IN_FLIGHT, FrameIndex, FramePacer};
pub use graph::{
    FrameOutput, GraphResources, InitReport, PassContext, PassHandle, RenderGraph, RenderPass,
};
pub use memory::{
    ArenaKind, ElementPool, FrameArenas, GpuAddress, GpuTable, PersistentAllocation,
    PersistentStorage, TransientAllocation, TransientArena,
};
pub use readback::{ReadbackFuture, ReadbackScheduler};
pub use resources::{Buffer, BufferId, Texture, TextureId};
pub use sync::{Completion, ExecutionPoint, QueueId, QueueTimeline};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, MemoryLocation, TextureDescriptor, TextureFormat,
    TextureUsage,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
