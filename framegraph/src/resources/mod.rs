//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image
//!
//! Resources are move-only: exactly one owner holds the native handle, and
//! dropping the owner releases it through the parent device. Commands and the
//! dependency manager refer to resources by their copyable [`BufferId`] /
//! [`TextureId`], never by aliasing the handle.
//!
//! Each resource holds a weak reference back to its parent device.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice

mod buffer;
mod texture;

pub use buffer::Buffer;
pub use texture::Texture;

/// Identity of a texture created by a [`GraphicsDevice`](crate::GraphicsDevice).
///
/// Ids are never reused for the lifetime of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u64);

impl TextureId {
    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identity of a buffer created by a [`GraphicsDevice`](crate::GraphicsDevice).
///
/// Ids are never reused for the lifetime of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

impl BufferId {
    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}
