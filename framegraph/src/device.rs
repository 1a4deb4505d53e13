//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources,
//! accessing mapped memory and submitting recorded commands. It owns the
//! graphics queue's [`QueueTimeline`]; every submission returns the
//! [`ExecutionPoint`] marking its completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::backend::{self, GpuBackend};
use crate::command::CommandList;
use crate::error::{GraphicsError, Result};
use crate::resources::{Buffer, BufferId, Texture, TextureId};
use crate::sync::{ExecutionPoint, QueueId, QueueTimeline};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
        }
    }
}

/// A resource whose destruction waits for in-flight submissions.
enum Retired {
    Buffer(Buffer),
    Texture(Texture),
}

/// A graphics device for creating GPU resources.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
/// Resources hold a weak reference back to it and release their backend
/// objects through it when dropped.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::RENDER_ATTACHMENT,
/// ))?;
/// ```
pub struct GraphicsDevice {
    backend: Arc<dyn GpuBackend>,
    capabilities: DeviceCapabilities,
    timeline: QueueTimeline,
    next_id: AtomicU64,
    buffers: AtomicUsize,
    textures: AtomicUsize,
    retired: Mutex<Vec<(ExecutionPoint, Retired)>>,
}

impl GraphicsDevice {
    /// Create a device on top of a backend.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        log::info!("Creating graphics device on {}", backend.name());
        Arc::new(Self {
            backend,
            capabilities: DeviceCapabilities::default(),
            timeline: QueueTimeline::new(QueueId::GRAPHICS),
            next_id: AtomicU64::new(1),
            buffers: AtomicUsize::new(0),
            textures: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Create a device on the best backend the enabled features provide.
    pub fn with_default_backend() -> Result<Arc<Self>> {
        Ok(Self::new(backend::create_backend()?))
    }

    /// Get the backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// The graphics queue timeline.
    pub fn timeline(&self) -> &QueueTimeline {
        &self.timeline
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size exceeds device limits or allocation fails.
    pub fn create_buffer(self: &Arc<Self>, descriptor: &BufferDescriptor) -> Result<Buffer> {
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.backend.create_buffer(id, descriptor)?;
        self.buffers.fetch_add(1, Ordering::Relaxed);

        log::trace!(
            "GraphicsDevice: created buffer {:?} {:?}, size={}",
            id,
            descriptor.label,
            descriptor.size
        );

        Ok(Buffer::new(id, Arc::downgrade(self), descriptor.clone()))
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the texture dimensions exceed device limits or allocation fails.
    pub fn create_texture(self: &Arc<Self>, descriptor: &TextureDescriptor) -> Result<Texture> {
        let max_dim = self.capabilities.max_texture_dimension;
        let size = descriptor.size;
        if size.width > max_dim || size.height > max_dim || size.depth > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }

        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }

        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.backend.create_texture(id, descriptor)?;
        self.textures.fetch_add(1, Ordering::Relaxed);

        log::trace!(
            "GraphicsDevice: created texture {:?} {:?}, size={}x{}x{}",
            id,
            descriptor.label,
            size.width,
            size.height,
            size.depth
        );

        Ok(Texture::new(id, Arc::downgrade(self), descriptor.clone()))
    }

    pub(crate) fn release_buffer(&self, id: BufferId, label: Option<&str>) {
        log::trace!("GraphicsDevice: releasing buffer {:?} {:?}", id, label);
        self.backend.destroy_buffer(id);
        self.buffers.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn release_texture(&self, id: TextureId, label: Option<&str>) {
        log::trace!("GraphicsDevice: releasing texture {:?} {:?}", id, label);
        self.backend.destroy_texture(id);
        self.textures.fetch_sub(1, Ordering::Relaxed);
    }

    /// Destroy a buffer once everything submitted so far has completed.
    ///
    /// Destroys it right away if the queue is idle.
    pub fn retire_buffer(&self, buffer: Buffer) {
        self.retire(Retired::Buffer(buffer));
    }

    /// Destroy a texture once everything submitted so far has completed.
    pub fn retire_texture(&self, texture: Texture) {
        self.retire(Retired::Texture(texture));
    }

    fn retire(&self, resource: Retired) {
        let point = self.timeline.last_submitted();
        if point.is_complete() {
            drop(resource);
            return;
        }
        log::trace!("GraphicsDevice: retiring resource until point {}", point.value());
        self.retired.lock().push((point, resource));
    }

    /// Destroy retired resources whose submissions have completed.
    ///
    /// Called on every submit and by [`wait_idle`](Self::wait_idle).
    /// Returns how many resources were destroyed.
    pub fn collect_retired(&self) -> usize {
        let done: Vec<(ExecutionPoint, Retired)> = {
            let mut retired = self.retired.lock();
            let (done, pending) = std::mem::take(&mut *retired)
                .into_iter()
                .partition(|(point, _)| point.is_complete());
            *retired = pending;
            done
        };
        // Dropped outside the lock; releasing goes back through the device.
        let count = done.len();
        drop(done);
        count
    }

    /// Number of retired resources still waiting for the GPU.
    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    /// Write bytes into a host-visible buffer and flush the written range.
    pub fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        self.backend.write_buffer(buffer, offset, data)?;
        self.backend
            .flush_mapped_range(buffer, offset, data.len() as u64)
    }

    /// Invalidate a host-visible range and read it into `dst`.
    pub fn read_buffer(&self, buffer: BufferId, offset: u64, dst: &mut [u8]) -> Result<()> {
        self.backend
            .invalidate_mapped_range(buffer, offset, dst.len() as u64)?;
        self.backend.read_buffer(buffer, offset, dst)
    }

    /// Submit recorded commands to the graphics queue.
    ///
    /// Returns the execution point that completes once the commands finished.
    pub fn submit(&self, commands: CommandList) -> Result<ExecutionPoint> {
        self.collect_retired();
        let point = self.timeline.next_point();
        log::trace!(
            "GraphicsDevice: submitting {:?} ({} commands) as point {}",
            commands.label(),
            commands.len(),
            point.value()
        );
        self.backend.submit(commands, &self.timeline, &point)?;
        Ok(point)
    }

    /// Block until every submission so far completed.
    pub fn wait_idle(&self) {
        self.timeline.last_submitted().wait();
        self.collect_retired();
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.load(Ordering::Relaxed)
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("backend", &self.backend.name())
            .field("buffers", &self.buffer_count())
            .field("textures", &self.texture_count())
            .field("retired", &self.retired_count())
            .field("timeline", &self.timeline)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
