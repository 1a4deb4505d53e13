//! Long-lived GPU storage.
//!
//! [`PersistentStorage`] carves regions out of one device-local buffer with a
//! forward-only bump pointer. Regions are never moved or individually
//! reclaimed; the whole buffer goes away with the storage.
//!
//! Region contents are updated on the GPU timeline: [`PersistentAllocation::update`]
//! stages the bytes in the frame's upload arena and records a copy between
//! the barriers that order it against shader reads.

use std::sync::Arc;

use super::align_up;
use crate::access::{BufferAccess, PipelineStage};
use crate::command::{BufferCopyRegion, CommandEncoder};
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, Result};
use crate::graph::PassContext;
use crate::resources::{Buffer, BufferId};
use crate::types::{BufferDescriptor, BufferUsage};

/// Alignment of staging copies.
const STAGING_ALIGNMENT: u64 = 16;

/// Location of a region as seen by shaders: buffer plus byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuAddress {
    /// The storage buffer.
    pub buffer: BufferId,
    /// Byte offset of the region.
    pub offset: u64,
}

/// A region of a [`PersistentStorage`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersistentAllocation {
    buffer: BufferId,
    offset: u64,
    size: u64,
}

impl PersistentAllocation {
    /// The storage buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Byte offset of the region.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Address for shader-side indexing.
    pub fn gpu_address(&self) -> GpuAddress {
        GpuAddress {
            buffer: self.buffer,
            offset: self.offset,
        }
    }

    /// A sub-range of this region.
    pub fn sub_region(&self, offset: u64, size: u64) -> Result<Self> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Ok(Self {
                buffer: self.buffer,
                offset: self.offset + offset,
                size,
            }),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "sub-region {offset}+{size} exceeds region size {}",
                self.size
            ))),
        }
    }

    /// Overwrite the start of the region with `data`.
    ///
    /// Records, in order: barriers moving the staging region to transfer-read
    /// and the storage to transfer-write, a copy from a staging region of the
    /// frame's upload arena, and a barrier to shader-read in every shader
    /// stage. The storage buffer must be tracked by the graph.
    pub fn update<const N: usize>(&self, ctx: &mut PassContext<'_, N>, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        if len > self.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{len} bytes do not fit a {} byte persistent region",
                self.size
            )));
        }
        if len == 0 {
            return Ok(());
        }

        let staging = ctx.upload(len, STAGING_ALIGNMENT)?;
        staging.write_bytes(data)?;

        ctx.use_imported_buffer(
            staging.buffer(),
            BufferAccess::TransferRead,
            PipelineStage::TRANSFER,
        )?;
        ctx.use_imported_buffer(self.buffer, BufferAccess::TransferWrite, PipelineStage::TRANSFER)?;
        ctx.commands().copy_buffer(
            staging.buffer(),
            self.buffer,
            BufferCopyRegion::new(staging.offset(), self.offset, len),
        );
        ctx.use_imported_buffer(
            self.buffer,
            BufferAccess::StorageRead,
            PipelineStage::ALL_SHADERS,
        )?;

        log::trace!(
            "Persistent region {:?}+{}: staged {} bytes",
            self.buffer,
            self.offset,
            len
        );
        Ok(())
    }
}

/// Forward-only bump allocator over one device-local buffer.
///
/// Create it through [`RenderGraph::create_persistent_storage`] so the
/// buffer is tracked for barriers, or import the buffer manually.
///
/// [`RenderGraph::create_persistent_storage`]: crate::RenderGraph::create_persistent_storage
#[derive(Debug)]
pub struct PersistentStorage {
    buffer: Buffer,
    capacity: u64,
    offset: u64,
}

impl PersistentStorage {
    /// Create storage of `capacity` bytes.
    ///
    /// `COPY_DST` is added to `usage` so regions can be updated.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        capacity: u64,
        usage: BufferUsage,
        label: &str,
    ) -> Result<Self> {
        let descriptor =
            BufferDescriptor::new(capacity, usage | BufferUsage::COPY_DST).with_label(label);
        let buffer = device.create_buffer(&descriptor)?;
        log::debug!("Created persistent storage '{}' ({} bytes)", label, capacity);
        Ok(Self {
            buffer,
            capacity,
            offset: 0,
        })
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> u64 {
        self.offset
    }

    /// Bytes still available, ignoring alignment.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }

    /// Carve a region of `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::StorageExhausted`] if the buffer cannot fit
    /// the request. Nothing is allocated in that case.
    pub fn allocate_region(&mut self, size: u64, alignment: u64) -> Result<PersistentAllocation> {
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        let offset = align_up(self.offset, alignment);
        let fits = offset
            .checked_add(size)
            .is_some_and(|end| end <= self.capacity);
        if !fits {
            return Err(GraphicsError::StorageExhausted {
                requested: (offset - self.offset).saturating_add(size),
                available: self.remaining(),
            });
        }

        self.offset = offset + size;
        log::trace!(
            "Persistent storage {:?}: region of {} bytes at {}",
            self.buffer.label(),
            size,
            offset
        );

        Ok(PersistentAllocation {
            buffer: self.buffer.id(),
            offset,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn create_storage(capacity: u64) -> (Arc<GraphicsDevice>, PersistentStorage) {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let storage = PersistentStorage::new(&device, capacity, BufferUsage::STORAGE, "test")
            .unwrap();
        (device, storage)
    }

    #[test]
    fn test_bump_allocation() {
        let (_device, mut storage) = create_storage(1024);
        let a = storage.allocate_region(100, 64).unwrap();
        let b = storage.allocate_region(100, 64).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 128);
        assert_eq!(storage.used(), 228);
        assert_eq!(storage.remaining(), 796);
        assert_eq!(
            b.gpu_address(),
            GpuAddress {
                buffer: storage.buffer().id(),
                offset: 128,
            }
        );
    }

    #[test]
    fn test_exhaustion() {
        let (_device, mut storage) = create_storage(256);
        storage.allocate_region(200, 16).unwrap();
        let err = storage.allocate_region(100, 16).unwrap_err();
        assert!(matches!(err, GraphicsError::StorageExhausted { .. }));
        assert_eq!(storage.used(), 208);
    }

    #[test]
    fn test_copy_dst_added() {
        let (_device, storage) = create_storage(64);
        assert!(storage.buffer().usage().contains(BufferUsage::COPY_DST));
    }

    #[test]
    fn test_sub_region() {
        let (_device, mut storage) = create_storage(256);
        storage.allocate_region(32, 16).unwrap();
        let region = storage.allocate_region(64, 16).unwrap();
        let sub = region.sub_region(16, 16).unwrap();
        assert_eq!(sub.offset(), 48);
        assert!(region.sub_region(60, 8).is_err());
    }
}
