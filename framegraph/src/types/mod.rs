//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! used by the device, the graph resource registry and the memory arenas.

mod buffer;
mod common;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::Extent3d;
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
