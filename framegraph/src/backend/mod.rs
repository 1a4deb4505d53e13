//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction for GPU backends. The
//! frame graph only needs a narrow surface from a backend: create and destroy
//! resources, access host-visible memory, and execute recorded
//! [`CommandList`]s while advancing the queue's [`QueueTimeline`].
//!
//! # Available Backends
//!
//! - `dummy` (default): in-process backend that keeps resource memory on the
//!   CPU and executes copy commands, used for testing and development
//! - `vulkan-backend`: conversions from frame graph access states to native
//!   Vulkan barriers (ash)

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;

use crate::command::CommandList;
use crate::error::Result;
use crate::resources::{BufferId, TextureId};
use crate::sync::{ExecutionPoint, QueueTimeline};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// GPU backend trait that all backends must implement.
///
/// Resources are addressed by the ids the [`GraphicsDevice`](crate::GraphicsDevice)
/// assigns; the backend owns whatever native objects back them.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create the native object backing a buffer.
    fn create_buffer(&self, id: BufferId, descriptor: &BufferDescriptor) -> Result<()>;

    /// Destroy a buffer. Unknown ids are ignored.
    fn destroy_buffer(&self, id: BufferId);

    /// Create the native object backing a texture.
    fn create_texture(&self, id: TextureId, descriptor: &TextureDescriptor) -> Result<()>;

    /// Destroy a texture. Unknown ids are ignored.
    fn destroy_texture(&self, id: TextureId);

    /// Write bytes into a host-visible buffer through its mapping.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    /// Read bytes from a host-visible buffer through its mapping.
    fn read_buffer(&self, id: BufferId, offset: u64, dst: &mut [u8]) -> Result<()>;

    /// Make CPU writes to a mapped range visible to the GPU.
    fn flush_mapped_range(&self, id: BufferId, offset: u64, size: u64) -> Result<()>;

    /// Make GPU writes to a mapped range visible to the CPU.
    fn invalidate_mapped_range(&self, id: BufferId, offset: u64, size: u64) -> Result<()>;

    /// Submit recorded commands.
    ///
    /// The backend must eventually call `timeline.signal(point.value())` once
    /// the commands finished executing.
    fn submit(
        &self,
        commands: CommandList,
        timeline: &QueueTimeline,
        point: &ExecutionPoint,
    ) -> Result<()>;
}

/// Selects and creates the appropriate backend based on available features.
pub fn create_backend() -> Result<Arc<dyn GpuBackend>> {
    log::info!("Using dummy backend");
    Ok(Arc::new(dummy::DummyBackend::new()))
}
