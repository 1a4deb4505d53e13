//! GPU buffer resource.

use std::sync::{Arc, Weak};

use super::BufferId;
use crate::device::GraphicsDevice;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and have a single
/// owner. Dropping the buffer destroys the backend allocation, provided the
/// device is still alive.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    id: BufferId,
    device: Weak<GraphicsDevice>,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(
        id: BufferId,
        device: Weak<GraphicsDevice>,
        descriptor: BufferDescriptor,
    ) -> Self {
        Self {
            id,
            device,
            descriptor,
        }
    }

    /// Identity used by commands and the dependency manager.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the memory location.
    pub fn location(&self) -> MemoryLocation {
        self.descriptor.location
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.release_buffer(self.id, self.label());
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
static_assertions::assert_not_impl_any!(Buffer: Clone, Copy);
