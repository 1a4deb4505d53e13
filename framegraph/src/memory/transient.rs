//! Per-frame transient memory.
//!
//! A [`TransientArena`] owns one host-visible buffer per ring slot and
//! bump-allocates regions out of the slot selected by the current
//! [`FrameIndex`]. A slot's offset returns to zero the first time a new frame
//! uses it; individual allocations are never freed.
//!
//! The arena trusts the frame index: it is the
//! [`FramePacer`](crate::frame::FramePacer) that guarantees the GPU finished
//! with a slot before a frame index for it is handed out.
//!
//! # Example
//!
//! ```ignore
//! let mut arena = TransientArena::<2>::new(&device, ArenaKind::Upload, 64 * 1024, "upload")?;
//!
//! let frame = pacer.begin_frame();
//! let alloc = arena.allocate(&frame, 256, 16)?;
//! alloc.write(&camera_uniforms)?;
//! commands.copy_buffer(alloc.buffer(), target, BufferCopyRegion::new(alloc.offset(), 0, 256));
//! ```

use std::ops::Range;
use std::sync::{Arc, Weak};

use bytemuck::Pod;

use super::align_up;
use crate::config::FrameGraphConfig;
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, Result};
use crate::frame::FrameIndex;
use crate::resources::{Buffer, BufferId};
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

/// What a transient arena is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaKind {
    /// CPU-written staging data copied into GPU resources.
    Upload,
    /// GPU-written data read back by the CPU.
    Readback,
    /// CPU-written uniform and storage data read directly by shaders.
    Uniform,
}

impl ArenaKind {
    /// Buffer usage flags of the slot buffers.
    pub fn usage(self) -> BufferUsage {
        match self {
            Self::Upload => BufferUsage::COPY_SRC | BufferUsage::MAP_WRITE,
            Self::Readback => BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            Self::Uniform => BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::MAP_WRITE,
        }
    }

    /// Memory location of the slot buffers.
    pub fn location(self) -> MemoryLocation {
        match self {
            Self::Upload | Self::Uniform => MemoryLocation::CpuToGpu,
            Self::Readback => MemoryLocation::GpuToCpu,
        }
    }
}

/// A region carved from one ring slot of a [`TransientArena`].
///
/// Valid until the slot is reused `N` frames later.
#[derive(Debug, Clone)]
pub struct TransientAllocation {
    device: Weak<GraphicsDevice>,
    buffer: BufferId,
    slot: usize,
    frame: u64,
    offset: u64,
    size: u64,
}

impl TransientAllocation {
    /// The slot buffer the region lives in.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Ring slot the region was carved from.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of the frame the region belongs to.
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// Byte offset into the slot buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte range covered in the slot buffer.
    pub fn region(&self) -> Range<u64> {
        self.offset..self.offset + self.size
    }

    /// Write bytes at the start of the region.
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        self.device()?.write_buffer(self.buffer, self.offset, data)
    }

    /// Write a plain value at the start of the region.
    pub fn write<T: Pod>(&self, value: &T) -> Result<()> {
        self.write_bytes(bytemuck::bytes_of(value))
    }

    /// Write a slice of plain values at the start of the region.
    pub fn write_slice<T: Pod>(&self, values: &[T]) -> Result<()> {
        self.write_bytes(bytemuck::cast_slice(values))
    }

    /// Read bytes from the start of the region.
    pub fn read_bytes(&self, dst: &mut [u8]) -> Result<()> {
        self.check_len(dst.len())?;
        self.device()?.read_buffer(self.buffer, self.offset, dst)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len as u64 > self.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{len} bytes do not fit a {} byte transient allocation",
                self.size
            )));
        }
        Ok(())
    }

    fn device(&self) -> Result<Arc<GraphicsDevice>> {
        self.device.upgrade().ok_or(GraphicsError::DeviceLost)
    }
}

#[derive(Debug)]
struct Slot {
    buffer: Buffer,
    offset: u64,
    frame: Option<u64>,
}

impl Slot {
    /// Offset the next allocation for `frame` starts from.
    fn base_offset(&self, frame: u64) -> u64 {
        if self.frame == Some(frame) {
            self.offset
        } else {
            0
        }
    }
}

/// Bump allocator over `N` host-visible ring slots.
///
/// # Thread Safety
///
/// `TransientArena` is NOT thread-safe; it is owned by the thread building
/// frames.
#[derive(Debug)]
pub struct TransientArena<const N: usize> {
    device: Weak<GraphicsDevice>,
    kind: ArenaKind,
    label: String,
    capacity: u64,
    slots: Vec<Slot>,
}

impl<const N: usize> TransientArena<N> {
    /// Create an arena with `capacity` bytes per ring slot.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        kind: ArenaKind,
        capacity: u64,
        label: &str,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "transient arena capacity cannot be zero".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(N);
        for slot in 0..N {
            let descriptor = BufferDescriptor::new(capacity, kind.usage())
                .with_location(kind.location())
                .with_label(format!("{label}[{slot}]"));
            slots.push(Slot {
                buffer: device.create_buffer(&descriptor)?,
                offset: 0,
                frame: None,
            });
        }

        log::debug!(
            "Created {:?} arena '{}': {} slots x {} bytes",
            kind,
            label,
            N,
            capacity
        );

        Ok(Self {
            device: Arc::downgrade(device),
            kind,
            label: label.to_string(),
            capacity,
            slots,
        })
    }

    /// What the arena is used for.
    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    /// Debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Capacity of each slot in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes allocated from the frame's slot.
    pub fn used(&self, frame: &FrameIndex<N>) -> u64 {
        self.slots[frame.slot()].base_offset(frame.number())
    }

    /// Bytes still available in the frame's slot, ignoring alignment.
    pub fn remaining(&self, frame: &FrameIndex<N>) -> u64 {
        self.capacity - self.used(frame)
    }

    /// The buffer backing a ring slot.
    pub fn slot_buffer(&self, slot: usize) -> Option<&Buffer> {
        self.slots.get(slot).map(|s| &s.buffer)
    }

    /// Ids of all slot buffers.
    pub fn buffer_ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.slots.iter().map(|s| s.buffer.id())
    }

    /// Hand the slot buffers to the device for deferred destruction.
    ///
    /// The arena has no slots afterwards and must not be used again.
    pub(crate) fn retire_buffers(&mut self, device: &GraphicsDevice) -> usize {
        let count = self.slots.len();
        for slot in self.slots.drain(..) {
            device.retire_buffer(slot.buffer);
        }
        count
    }

    /// Carve `size` bytes aligned to `alignment` from the frame's slot.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ArenaExhausted`] if the slot cannot fit the
    /// request, or `InvalidParameter` if `alignment` is not a power of two.
    /// The slot is unchanged on error.
    pub fn allocate(
        &mut self,
        frame: &FrameIndex<N>,
        size: u64,
        alignment: u64,
    ) -> Result<TransientAllocation> {
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        let slot = &mut self.slots[frame.slot()];
        let base = slot.base_offset(frame.number());
        let offset = align_up(base, alignment);
        let end = offset.checked_add(size).filter(|end| *end <= self.capacity);
        let Some(end) = end else {
            return Err(GraphicsError::ArenaExhausted {
                label: self.label.clone(),
                requested: (offset - base).saturating_add(size),
                available: self.capacity - base,
            });
        };

        if slot.frame != Some(frame.number()) {
            log::trace!(
                "Arena '{}': slot {} reset for frame {}",
                self.label,
                frame.slot(),
                frame.number()
            );
            slot.frame = Some(frame.number());
        }
        slot.offset = end;

        log::trace!(
            "Arena '{}': slot {} allocated {} bytes at {}",
            self.label,
            frame.slot(),
            size,
            offset
        );

        Ok(TransientAllocation {
            device: self.device.clone(),
            buffer: slot.buffer.id(),
            slot: frame.slot(),
            frame: frame.number(),
            offset,
            size,
        })
    }

    /// Explicitly reset the frame's slot to empty.
    pub fn reset_slot(&mut self, frame: &FrameIndex<N>) {
        let slot = &mut self.slots[frame.slot()];
        slot.offset = 0;
        slot.frame = Some(frame.number());
    }
}

/// The upload, readback and uniform arenas of a render graph.
#[derive(Debug)]
pub struct FrameArenas<const N: usize> {
    /// Staging data for copies into GPU resources.
    pub upload: TransientArena<N>,
    /// Destination of GPU to CPU copies.
    pub readback: TransientArena<N>,
    /// Per-draw uniform data.
    pub uniform: TransientArena<N>,
    uniform_alignment: u64,
}

impl<const N: usize> FrameArenas<N> {
    /// Create the arenas described by `config`.
    pub fn new(device: &Arc<GraphicsDevice>, config: &FrameGraphConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            upload: TransientArena::new(
                device,
                ArenaKind::Upload,
                config.upload_arena_size,
                &format!("{}_upload", config.label),
            )?,
            readback: TransientArena::new(
                device,
                ArenaKind::Readback,
                config.readback_arena_size,
                &format!("{}_readback", config.label),
            )?,
            uniform: TransientArena::new(
                device,
                ArenaKind::Uniform,
                config.uniform_arena_size,
                &format!("{}_uniform", config.label),
            )?,
            uniform_alignment: config.uniform_alignment,
        })
    }

    /// Alignment used for uniform allocations.
    pub fn uniform_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    /// Allocate uniform data with the configured alignment.
    pub fn allocate_uniform(
        &mut self,
        frame: &FrameIndex<N>,
        size: u64,
    ) -> Result<TransientAllocation> {
        self.uniform.allocate(frame, size, self.uniform_alignment)
    }

    /// Ids of every arena buffer.
    pub fn buffer_ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.upload
            .buffer_ids()
            .chain(self.readback.buffer_ids())
            .chain(self.uniform.buffer_ids())
    }

    pub(crate) fn retire_buffers(&mut self, device: &GraphicsDevice) -> usize {
        self.upload.retire_buffers(device)
            + self.readback.retire_buffers(device)
            + self.uniform.retire_buffers(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::frame::FramePacer;
    use crate::sync::{ExecutionPoint, QueueId};

    fn create_test_device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new(Arc::new(DummyBackend::new()))
    }

    fn next_frame<const N: usize>(pacer: &mut FramePacer<N>) -> FrameIndex<N> {
        if let Some(open) = pacer.current_frame() {
            pacer.end_frame(open, ExecutionPoint::completed(QueueId::GRAPHICS));
        }
        pacer.begin_frame()
    }

    #[test]
    fn test_arena_creation() {
        let device = create_test_device();
        let arena = TransientArena::<3>::new(&device, ArenaKind::Upload, 4096, "test").unwrap();
        assert_eq!(arena.capacity(), 4096);
        assert_eq!(arena.buffer_ids().count(), 3);
        assert_eq!(
            arena.slot_buffer(0).unwrap().location(),
            MemoryLocation::CpuToGpu
        );
        assert!(arena.slot_buffer(3).is_none());
    }

    #[test]
    fn test_allocation_alignment() {
        let device = create_test_device();
        let mut pacer = FramePacer::<2>::new();
        let mut arena = TransientArena::<2>::new(&device, ArenaKind::Uniform, 1024, "test").unwrap();
        let frame = next_frame(&mut pacer);

        let a = arena.allocate(&frame, 100, 256).unwrap();
        let b = arena.allocate(&frame, 50, 256).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 256);
        assert_eq!(arena.used(&frame), 306);
    }

    #[test]
    fn test_exhaustion_leaves_slot_unchanged() {
        let device = create_test_device();
        let mut pacer = FramePacer::<2>::new();
        let mut arena = TransientArena::<2>::new(&device, ArenaKind::Upload, 512, "upload").unwrap();
        let frame = next_frame(&mut pacer);

        arena.allocate(&frame, 400, 64).unwrap();
        let err = arena.allocate(&frame, 200, 64).unwrap_err();
        assert_eq!(
            err,
            GraphicsError::ArenaExhausted {
                label: "upload".to_string(),
                requested: 248,
                available: 112,
            }
        );
        assert_eq!(arena.used(&frame), 400);

        // 64 bytes still fit after padding to 448.
        let c = arena.allocate(&frame, 64, 64).unwrap();
        assert_eq!(c.offset(), 448);
    }

    #[test]
    fn test_slot_resets_on_reuse() {
        let device = create_test_device();
        let mut pacer = FramePacer::<2>::new();
        let mut arena = TransientArena::<2>::new(&device, ArenaKind::Upload, 1024, "test").unwrap();

        let f0 = next_frame(&mut pacer);
        let a = arena.allocate(&f0, 128, 16).unwrap();
        let f1 = next_frame(&mut pacer);
        let b = arena.allocate(&f1, 128, 16).unwrap();
        let f2 = next_frame(&mut pacer);
        let c = arena.allocate(&f2, 128, 16).unwrap();

        assert_eq!(a.slot(), c.slot());
        assert_ne!(a.slot(), b.slot());
        assert_eq!(a.buffer(), c.buffer());
        assert_eq!(a.region(), c.region());
    }

    #[test]
    fn test_write_read_through_mapping() {
        let device = create_test_device();
        let mut pacer = FramePacer::<1>::new();
        let mut arena = TransientArena::<1>::new(&device, ArenaKind::Upload, 256, "test").unwrap();
        let frame = next_frame(&mut pacer);

        let alloc = arena.allocate(&frame, 16, 16).unwrap();
        alloc.write_slice(&[1u32, 2, 3, 4]).unwrap();

        let mut out = [0u8; 16];
        alloc.read_bytes(&mut out).unwrap();
        assert_eq!(&out[..], bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4]));

        assert!(alloc.write_bytes(&[0; 17]).is_err());
    }

    #[test]
    fn test_invalid_alignment() {
        let device = create_test_device();
        let mut pacer = FramePacer::<1>::new();
        let mut arena = TransientArena::<1>::new(&device, ArenaKind::Upload, 256, "test").unwrap();
        let frame = next_frame(&mut pacer);
        assert!(matches!(
            arena.allocate(&frame, 16, 3),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_frame_arenas_from_config() {
        let device = create_test_device();
        let config = FrameGraphConfig::default()
            .with_upload_arena_size(1024)
            .with_readback_arena_size(512)
            .with_uniform_arena_size(2048)
            .with_uniform_alignment(128);
        let mut arenas = FrameArenas::<2>::new(&device, &config).unwrap();
        assert_eq!(arenas.buffer_ids().count(), 6);
        assert_eq!(arenas.readback.kind(), ArenaKind::Readback);

        let mut pacer = FramePacer::<2>::new();
        let frame = next_frame(&mut pacer);
        arenas.allocate_uniform(&frame, 10).unwrap();
        let second = arenas.allocate_uniform(&frame, 10).unwrap();
        assert_eq!(second.offset(), 128);
    }
}
