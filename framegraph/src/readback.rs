//! GPU to CPU readback.
//!
//! A [`ReadbackScheduler`] reserves a region of the readback arena for the
//! current frame and records the copy into it. Once the frame is submitted,
//! [`ReadbackScheduler::into_future`] binds the region to the submission's
//! [`ExecutionPoint`], producing a [`ReadbackFuture`].
//!
//! A future must observe completion before its bytes can be read: either
//! [`ReadbackFuture::sync`] (blocking) or a [`ReadbackFuture::is_ready`] poll
//! that returned `true`. Reading earlier is rejected with
//! [`GraphicsError::ReadbackNotSynced`].
//!
//! The region lives in a ring slot, so the bytes must be read before the
//! same slot is reused `N` frames later.

use bytemuck::Pod;

use crate::access::{BufferAccess, PipelineStage, TextureAccess};
use crate::command::{BufferCopyRegion, CommandEncoder};
use crate::dependency::DependencyManager;
use crate::error::{GraphicsError, Result};
use crate::frame::FrameIndex;
use crate::memory::{ArenaKind, TransientAllocation, TransientArena};
use crate::resources::{Buffer, Texture};
use crate::sync::ExecutionPoint;

/// Alignment of readback regions.
const READBACK_ALIGNMENT: u64 = 16;

/// Check that `offset..offset + size` lies inside `src`.
pub(crate) fn check_copy_range(src: &Buffer, offset: u64, size: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= src.size() => Ok(()),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "copy range {offset}+{size} exceeds buffer {:?} of {} bytes",
            src.id(),
            src.size()
        ))),
    }
}

/// A readback region reserved for the frame being recorded.
#[derive(Debug)]
pub struct ReadbackScheduler {
    allocation: TransientAllocation,
}

impl ReadbackScheduler {
    /// Reserve `size` bytes from the frame's slot of a readback arena.
    pub fn new<const N: usize>(
        frame: &FrameIndex<N>,
        arena: &mut TransientArena<N>,
        size: u64,
    ) -> Result<Self> {
        if arena.kind() != ArenaKind::Readback {
            return Err(GraphicsError::InvalidParameter(format!(
                "arena '{}' is a {:?} arena, readbacks need a Readback arena",
                arena.label(),
                arena.kind()
            )));
        }
        let allocation = arena.allocate(frame, size, READBACK_ALIGNMENT)?;
        Ok(Self { allocation })
    }

    /// The reserved region.
    pub fn allocation(&self) -> &TransientAllocation {
        &self.allocation
    }

    /// Record a copy of `size()` bytes of `src` starting at `src_offset`.
    ///
    /// `src` is transitioned to transfer-read and the readback region to
    /// host-read around the copy.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the copied range does not fit in `src`. Nothing
    /// is recorded in that case.
    pub fn record_buffer_copy(
        &self,
        deps: &mut DependencyManager,
        encoder: &mut dyn CommandEncoder,
        src: &Buffer,
        src_offset: u64,
    ) -> Result<()> {
        check_copy_range(src, src_offset, self.allocation.size())?;
        let src = src.id();
        deps.buffer_barrier(encoder, src, BufferAccess::TransferRead, PipelineStage::TRANSFER)?;
        deps.buffer_barrier(
            encoder,
            self.allocation.buffer(),
            BufferAccess::TransferWrite,
            PipelineStage::TRANSFER,
        )?;
        encoder.copy_buffer(
            src,
            self.allocation.buffer(),
            BufferCopyRegion::new(src_offset, self.allocation.offset(), self.allocation.size()),
        );
        self.finish(deps, encoder)
    }

    /// Record a copy of a whole texture, tightly packed.
    ///
    /// The region must be at least the texture's byte size.
    pub fn record_texture_copy(
        &self,
        deps: &mut DependencyManager,
        encoder: &mut dyn CommandEncoder,
        src: &Texture,
    ) -> Result<()> {
        let bytes = src.descriptor().byte_size();
        if bytes > self.allocation.size() {
            return Err(GraphicsError::ReadbackOutOfRange {
                requested: bytes,
                size: self.allocation.size(),
            });
        }

        deps.texture_barrier(
            encoder,
            src.id(),
            TextureAccess::TransferRead,
            PipelineStage::TRANSFER,
        )?;
        deps.buffer_barrier(
            encoder,
            self.allocation.buffer(),
            BufferAccess::TransferWrite,
            PipelineStage::TRANSFER,
        )?;
        encoder.copy_texture_to_buffer(src.id(), self.allocation.buffer(), self.allocation.offset());
        self.finish(deps, encoder)
    }

    fn finish(&self, deps: &mut DependencyManager, encoder: &mut dyn CommandEncoder) -> Result<()> {
        deps.buffer_barrier(
            encoder,
            self.allocation.buffer(),
            BufferAccess::HostRead,
            PipelineStage::HOST,
        )?;
        Ok(())
    }

    /// Bind the region to the execution point of the submission that copies
    /// into it.
    pub fn into_future(self, point: ExecutionPoint) -> ReadbackFuture {
        ReadbackFuture {
            allocation: self.allocation,
            point,
            synced: false,
        }
    }
}

/// GPU-written bytes that become readable once an execution point completes.
///
/// # Example
///
/// ```ignore
/// let mut output = graph.execute_frame()?;
/// if let Some(mut future) = output.take_readback("luminance") {
///     let value: f32 = { future.sync(); future.read_as()? };
/// }
/// ```
#[derive(Debug)]
pub struct ReadbackFuture {
    allocation: TransientAllocation,
    point: ExecutionPoint,
    synced: bool,
}

impl ReadbackFuture {
    /// The execution point the bytes depend on.
    pub fn point(&self) -> &ExecutionPoint {
        &self.point
    }

    /// Size of the readback in bytes.
    pub fn size(&self) -> u64 {
        self.allocation.size()
    }

    /// Check whether completion has been observed.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Poll for completion without blocking.
    ///
    /// A `true` result makes the bytes readable.
    pub fn is_ready(&mut self) -> bool {
        if !self.synced && self.point.is_complete() {
            self.synced = true;
        }
        self.synced
    }

    /// Block until the bytes are available.
    pub fn sync(&mut self) {
        if !self.synced {
            self.point.wait();
            self.synced = true;
        }
    }

    /// Copy the first `dst.len()` bytes of the readback into `dst`.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::ReadbackNotSynced`] if completion was not observed
    /// - [`GraphicsError::ReadbackOutOfRange`] if `dst` is larger than the readback
    pub fn read(&self, dst: &mut [u8]) -> Result<()> {
        if !self.synced {
            return Err(GraphicsError::ReadbackNotSynced);
        }
        if dst.len() as u64 > self.allocation.size() {
            return Err(GraphicsError::ReadbackOutOfRange {
                requested: dst.len() as u64,
                size: self.allocation.size(),
            });
        }
        self.allocation.read_bytes(dst)
    }

    /// [`sync`](Self::sync) then [`read`](Self::read).
    pub fn sync_read(&mut self, dst: &mut [u8]) -> Result<()> {
        self.sync();
        self.read(dst)
    }

    /// Read a plain value from the start of the readback.
    pub fn read_as<T: Pod>(&self) -> Result<T> {
        let mut value = T::zeroed();
        self.read(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Read the whole readback.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.allocation.size()).map_err(|_| {
            GraphicsError::InvalidParameter("readback size not addressable".to_string())
        })?;
        let mut bytes = vec![0; len];
        self.read(&mut bytes)?;
        Ok(bytes)
    }

    /// Wait for completion asynchronously and return the whole readback.
    pub async fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.point.completion().await;
        self.synced = true;
        self.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::command::CommandList;
    use crate::device::GraphicsDevice;
    use crate::frame::FramePacer;
    use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

    struct Fixture {
        backend: Arc<DummyBackend>,
        device: Arc<GraphicsDevice>,
        arena: TransientArena<2>,
        pacer: FramePacer<2>,
        deps: DependencyManager,
    }

    fn fixture(backend: DummyBackend) -> Fixture {
        let backend = Arc::new(backend);
        let device = GraphicsDevice::new(backend.clone());
        let arena = TransientArena::new(&device, ArenaKind::Readback, 1024, "readback").unwrap();
        let mut deps = DependencyManager::new();
        arena.buffer_ids().for_each(|id| deps.track_buffer(id));
        Fixture {
            backend,
            device,
            arena,
            pacer: FramePacer::new(),
            deps,
        }
    }

    /// Schedule a readback of a host-written source buffer holding `data`.
    fn schedule(f: &mut Fixture, data: &[u8]) -> (ReadbackScheduler, CommandList, crate::Buffer) {
        let src = f
            .device
            .create_buffer(
                &BufferDescriptor::new(data.len() as u64, BufferUsage::COPY_SRC)
                    .with_location(MemoryLocation::CpuToGpu),
            )
            .unwrap();
        f.device.write_buffer(src.id(), 0, data).unwrap();
        f.deps.track_buffer(src.id());

        let frame = f.pacer.begin_frame();
        let scheduler = ReadbackScheduler::new(&frame, &mut f.arena, data.len() as u64).unwrap();
        let mut list = CommandList::new();
        scheduler
            .record_buffer_copy(&mut f.deps, &mut list, &src, 0)
            .unwrap();
        (scheduler, list, src)
    }

    #[test]
    fn test_roundtrip() {
        let mut f = fixture(DummyBackend::new());
        let data: Vec<u8> = (0..64).collect();
        let (scheduler, list, _src) = schedule(&mut f, &data);

        let point = f.device.submit(list).unwrap();
        let mut future = scheduler.into_future(point);

        let mut out = vec![0u8; 64];
        future.sync_read(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_source_range_checked() {
        let mut f = fixture(DummyBackend::new());
        let src = f
            .device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_SRC))
            .unwrap();
        f.deps.track_buffer(src.id());

        let frame = f.pacer.begin_frame();
        let scheduler = ReadbackScheduler::new(&frame, &mut f.arena, 16).unwrap();
        let mut list = CommandList::new();
        assert!(matches!(
            scheduler.record_buffer_copy(&mut f.deps, &mut list, &src, 8),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(list.is_empty());
        assert!(scheduler.record_buffer_copy(&mut f.deps, &mut list, &src, 0).is_ok());
    }

    #[test]
    fn test_read_before_sync_rejected() {
        let mut f = fixture(DummyBackend::deferred());
        let (scheduler, list, _src) = schedule(&mut f, &[1, 2, 3, 4]);

        let point = f.device.submit(list).unwrap();
        let mut future = scheduler.into_future(point);

        let mut out = [0u8; 4];
        assert_eq!(future.read(&mut out), Err(GraphicsError::ReadbackNotSynced));
        assert!(!future.is_ready());

        f.backend.complete_submissions().unwrap();
        assert!(future.is_ready());
        future.read(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_out_of_range() {
        let mut f = fixture(DummyBackend::new());
        let (scheduler, list, _src) = schedule(&mut f, &[7; 8]);
        let point = f.device.submit(list).unwrap();
        let mut future = scheduler.into_future(point);
        future.sync();

        let mut out = [0u8; 16];
        assert_eq!(
            future.read(&mut out),
            Err(GraphicsError::ReadbackOutOfRange {
                requested: 16,
                size: 8,
            })
        );

        let mut prefix = [0u8; 4];
        future.read(&mut prefix).unwrap();
        assert_eq!(prefix, [7; 4]);
    }

    #[test]
    fn test_read_as_and_async() {
        let mut f = fixture(DummyBackend::new());
        let value = 0xDEAD_BEEFu32;
        let (scheduler, list, _src) = schedule(&mut f, bytemuck::bytes_of(&value));
        let point = f.device.submit(list).unwrap();

        let mut future = scheduler.into_future(point);
        assert!(future.is_ready());
        assert_eq!(future.read_as::<u32>().unwrap(), value);

        let bytes = pollster::block_on(future.into_bytes()).unwrap();
        assert_eq!(bytes, value.to_ne_bytes());
    }

    #[test]
    fn test_requires_readback_arena() {
        let mut f = fixture(DummyBackend::new());
        let mut upload =
            TransientArena::<2>::new(&f.device, ArenaKind::Upload, 64, "upload").unwrap();
        let frame = f.pacer.begin_frame();
        assert!(ReadbackScheduler::new(&frame, &mut upload, 16).is_err());
    }

    #[test]
    fn test_records_barrier_sequence() {
        let mut f = fixture(DummyBackend::new());
        let (scheduler, list, src) = schedule(&mut f, &[0; 16]);
        let target = scheduler.allocation().buffer();

        let barriers: Vec<_> = list.buffer_barriers().copied().collect();
        assert_eq!(barriers.len(), 3);
        assert_eq!(barriers[0].buffer, src.id());
        assert_eq!(barriers[0].to.access, BufferAccess::TransferRead);
        assert_eq!(barriers[1].buffer, target);
        assert_eq!(barriers[2].from.access, BufferAccess::TransferWrite);
        assert_eq!(barriers[2].to.access, BufferAccess::HostRead);
    }
}
