//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to GPU hardware. Resource memory lives in CPU
//! vectors and copy commands are executed on submission, so uploads,
//! readbacks and barrier sequences behave observably like they would on a
//! device. Draws, dispatches and binds are only logged.
//!
//! In deferred mode submissions are queued and only execute when
//! [`DummyBackend::complete_submissions`] is called, which lets tests observe
//! execution points that are still pending.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::GpuBackend;
use crate::command::{Command, CommandList};
use crate::error::{GraphicsError, Result};
use crate::resources::{BufferId, TextureId};
use crate::sync::{ExecutionPoint, QueueTimeline};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Identity of a resource in a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// A buffer.
    Buffer(BufferId),
    /// A texture.
    Texture(TextureId),
}

/// A resource lifecycle event recorded by the dummy backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A resource was created.
    Created {
        /// The resource.
        key: ResourceKey,
        /// Debug label, if any.
        label: Option<String>,
    },
    /// A resource was destroyed.
    Destroyed {
        /// The resource.
        key: ResourceKey,
    },
}

#[derive(Debug)]
struct BufferMemory {
    bytes: Vec<u8>,
    host_visible: bool,
}

#[derive(Debug)]
struct TextureMemory {
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Memory {
    buffers: HashMap<BufferId, BufferMemory>,
    textures: HashMap<TextureId, TextureMemory>,
}

impl Memory {
    fn buffer(&self, id: BufferId) -> Result<&BufferMemory> {
        self.buffers
            .get(&id)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown buffer {id:?}")))
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut BufferMemory> {
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown buffer {id:?}")))
    }

    fn texture(&self, id: TextureId) -> Result<&TextureMemory> {
        self.textures
            .get(&id)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown texture {id:?}")))
    }

    fn texture_mut(&mut self, id: TextureId) -> Result<&mut TextureMemory> {
        self.textures
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::Backend(format!("unknown texture {id:?}")))
    }

    fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::CopyBuffer { src, dst, region } => {
                let src_range = byte_range(region.src_offset, region.size)?;
                let dst_range = byte_range(region.dst_offset, region.size)?;
                check_range(self.buffer(*src)?.bytes.len(), &src_range, "copy source")?;
                check_range(self.buffer(*dst)?.bytes.len(), &dst_range, "copy destination")?;

                if src == dst {
                    let bytes = &mut self.buffer_mut(*dst)?.bytes;
                    bytes.copy_within(src_range, dst_range.start);
                } else {
                    let data = self.buffer(*src)?.bytes[src_range].to_vec();
                    self.buffer_mut(*dst)?.bytes[dst_range].copy_from_slice(&data);
                }
            }
            Command::CopyTextureToBuffer {
                src,
                dst,
                dst_offset,
            } => {
                let data = self.texture(*src)?.bytes.clone();
                let dst_range = byte_range(*dst_offset, data.len() as u64)?;
                let buffer = self.buffer_mut(*dst)?;
                check_range(buffer.bytes.len(), &dst_range, "copy destination")?;
                buffer.bytes[dst_range].copy_from_slice(&data);
            }
            Command::CopyBufferToTexture {
                src,
                src_offset,
                dst,
            } => {
                let size = self.texture(*dst)?.bytes.len() as u64;
                let src_range = byte_range(*src_offset, size)?;
                let buffer = self.buffer(*src)?;
                check_range(buffer.bytes.len(), &src_range, "copy source")?;
                let data = buffer.bytes[src_range].to_vec();
                self.texture_mut(*dst)?.bytes.copy_from_slice(&data);
            }
            other => {
                log::trace!("DummyBackend: {:?}", other);
            }
        }
        Ok(())
    }
}

fn byte_range(offset: u64, size: u64) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset)
        .map_err(|_| GraphicsError::InvalidParameter(format!("offset {offset} out of range")))?;
    let len = usize::try_from(size)
        .map_err(|_| GraphicsError::InvalidParameter(format!("size {size} out of range")))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| GraphicsError::InvalidParameter("range overflows".to_string()))?;
    Ok(start..end)
}

fn check_range(len: usize, range: &std::ops::Range<usize>, what: &str) -> Result<()> {
    if range.end > len {
        return Err(GraphicsError::InvalidParameter(format!(
            "{what} range {}..{} exceeds resource size {len}",
            range.start, range.end
        )));
    }
    Ok(())
}

struct PendingSubmission {
    commands: CommandList,
    timeline: QueueTimeline,
    value: u64,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    memory: Mutex<Memory>,
    deferred: bool,
    pending: Mutex<Vec<PendingSubmission>>,
    events: Mutex<Vec<ResourceEvent>>,
}

impl DummyBackend {
    /// Create a backend that executes submissions immediately.
    pub fn new() -> Self {
        Self {
            memory: Mutex::new(Memory::default()),
            deferred: false,
            pending: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Create a backend that queues submissions until
    /// [`complete_submissions`](Self::complete_submissions) is called.
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::new()
        }
    }

    /// Check if submissions are deferred.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Number of queued submissions.
    pub fn pending_submissions(&self) -> usize {
        self.pending.lock().len()
    }

    /// Execute every queued submission in order and signal its timeline.
    ///
    /// Returns the first execution error, if any. Every submission is
    /// signalled regardless.
    pub fn complete_submissions(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut first_error = None;
        for submission in pending {
            if let Err(e) = self.execute(&submission.commands) {
                log::error!("DummyBackend: submission failed: {}", e);
                first_error.get_or_insert(e);
            }
            submission.timeline.signal(submission.value);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Recorded resource lifecycle events, oldest first.
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events.lock().clone()
    }

    /// Forget recorded lifecycle events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.memory.lock().buffers.len()
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.memory.lock().textures.len()
    }

    /// Copy of a buffer's current contents.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.memory.lock().buffers.get(&id).map(|b| b.bytes.clone())
    }

    /// Copy of a texture's current contents.
    pub fn texture_contents(&self, id: TextureId) -> Option<Vec<u8>> {
        self.memory.lock().textures.get(&id).map(|t| t.bytes.clone())
    }

    /// Overwrite a texture's contents, simulating GPU rendering into it.
    pub fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<()> {
        let mut memory = self.memory.lock();
        let texture = memory.texture_mut(id)?;
        if data.len() != texture.bytes.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture data is {} bytes, expected {}",
                data.len(),
                texture.bytes.len()
            )));
        }
        texture.bytes.copy_from_slice(data);
        Ok(())
    }

    fn execute(&self, commands: &CommandList) -> Result<()> {
        log::trace!(
            "DummyBackend: executing {:?} ({} commands, {} barriers)",
            commands.label(),
            commands.len(),
            commands.barrier_count()
        );
        let mut memory = self.memory.lock();
        for command in commands.commands() {
            memory.execute(command)?;
        }
        Ok(())
    }

    fn record(&self, event: ResourceEvent) {
        self.events.lock().push(event);
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("deferred", &self.deferred)
            .field("buffers", &self.buffer_count())
            .field("textures", &self.texture_count())
            .field("pending", &self.pending_submissions())
            .finish()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(&self, id: BufferId, descriptor: &BufferDescriptor) -> Result<()> {
        log::trace!(
            "DummyBackend: creating buffer {:?} {:?} (size: {})",
            id,
            descriptor.label,
            descriptor.size
        );
        let len = usize::try_from(descriptor.size).map_err(|_| {
            GraphicsError::ResourceCreationFailed(format!(
                "buffer size {} not addressable",
                descriptor.size
            ))
        })?;
        self.memory.lock().buffers.insert(
            id,
            BufferMemory {
                bytes: vec![0; len],
                host_visible: descriptor.location.is_host_visible(),
            },
        );
        self.record(ResourceEvent::Created {
            key: ResourceKey::Buffer(id),
            label: descriptor.label.clone(),
        });
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) {
        if self.memory.lock().buffers.remove(&id).is_some() {
            log::trace!("DummyBackend: destroyed buffer {:?}", id);
            self.record(ResourceEvent::Destroyed {
                key: ResourceKey::Buffer(id),
            });
        }
    }

    fn create_texture(&self, id: TextureId, descriptor: &TextureDescriptor) -> Result<()> {
        log::trace!(
            "DummyBackend: creating texture {:?} {:?} ({}x{}x{})",
            id,
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        let len = usize::try_from(descriptor.byte_size()).map_err(|_| {
            GraphicsError::ResourceCreationFailed("texture size not addressable".to_string())
        })?;
        self.memory
            .lock()
            .textures
            .insert(id, TextureMemory { bytes: vec![0; len] });
        self.record(ResourceEvent::Created {
            key: ResourceKey::Texture(id),
            label: descriptor.label.clone(),
        });
        Ok(())
    }

    fn destroy_texture(&self, id: TextureId) {
        if self.memory.lock().textures.remove(&id).is_some() {
            log::trace!("DummyBackend: destroyed texture {:?}", id);
            self.record(ResourceEvent::Destroyed {
                key: ResourceKey::Texture(id),
            });
        }
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        log::trace!(
            "DummyBackend: write_buffer {:?} offset={} len={}",
            id,
            offset,
            data.len()
        );
        let mut memory = self.memory.lock();
        let buffer = memory.buffer_mut(id)?;
        if !buffer.host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {id:?} is not host visible"
            )));
        }
        let range = byte_range(offset, data.len() as u64)?;
        check_range(buffer.bytes.len(), &range, "write")?;
        buffer.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, dst: &mut [u8]) -> Result<()> {
        log::trace!(
            "DummyBackend: read_buffer {:?} offset={} size={}",
            id,
            offset,
            dst.len()
        );
        let memory = self.memory.lock();
        let buffer = memory.buffer(id)?;
        if !buffer.host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {id:?} is not host visible"
            )));
        }
        let range = byte_range(offset, dst.len() as u64)?;
        check_range(buffer.bytes.len(), &range, "read")?;
        dst.copy_from_slice(&buffer.bytes[range]);
        Ok(())
    }

    fn flush_mapped_range(&self, id: BufferId, offset: u64, size: u64) -> Result<()> {
        // Host memory is coherent here; only validate the range.
        let memory = self.memory.lock();
        check_range(memory.buffer(id)?.bytes.len(), &byte_range(offset, size)?, "flush")
    }

    fn invalidate_mapped_range(&self, id: BufferId, offset: u64, size: u64) -> Result<()> {
        let memory = self.memory.lock();
        check_range(
            memory.buffer(id)?.bytes.len(),
            &byte_range(offset, size)?,
            "invalidate",
        )
    }

    fn submit(
        &self,
        commands: CommandList,
        timeline: &QueueTimeline,
        point: &ExecutionPoint,
    ) -> Result<()> {
        if self.deferred {
            log::trace!(
                "DummyBackend: queued {:?} for point {}",
                commands.label(),
                point.value()
            );
            self.pending.lock().push(PendingSubmission {
                commands,
                timeline: timeline.clone(),
                value: point.value(),
            });
            return Ok(());
        }

        let result = self.execute(&commands);
        // Signal the point immediately since we don't do real GPU work
        timeline.signal(point.value());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BufferCopyRegion, CommandEncoder};
    use crate::sync::QueueId;
    use crate::types::{BufferUsage, MemoryLocation, TextureFormat, TextureUsage};

    fn host_buffer(size: u64) -> BufferDescriptor {
        BufferDescriptor::new(size, BufferUsage::COPY_SRC | BufferUsage::COPY_DST)
            .with_location(MemoryLocation::CpuToGpu)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let backend = DummyBackend::new();
        backend.create_buffer(BufferId(1), &host_buffer(16)).unwrap();
        backend.write_buffer(BufferId(1), 4, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        backend.read_buffer(BufferId(1), 4, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let backend = DummyBackend::new();
        backend.create_buffer(BufferId(1), &host_buffer(4)).unwrap();
        assert!(backend.write_buffer(BufferId(1), 2, &[0; 4]).is_err());
    }

    #[test]
    fn test_device_local_not_mappable() {
        let backend = DummyBackend::new();
        let desc = BufferDescriptor::new(16, BufferUsage::STORAGE);
        backend.create_buffer(BufferId(1), &desc).unwrap();
        assert!(backend.write_buffer(BufferId(1), 0, &[1]).is_err());
    }

    #[test]
    fn test_copy_executes_on_submit() {
        let backend = DummyBackend::new();
        backend.create_buffer(BufferId(1), &host_buffer(8)).unwrap();
        backend.create_buffer(BufferId(2), &host_buffer(8)).unwrap();
        backend.write_buffer(BufferId(1), 0, &[9; 8]).unwrap();

        let mut list = CommandList::new();
        list.copy_buffer(BufferId(1), BufferId(2), BufferCopyRegion::new(0, 4, 4));

        let timeline = QueueTimeline::new(QueueId::GRAPHICS);
        let point = timeline.next_point();
        backend.submit(list, &timeline, &point).unwrap();

        assert!(point.is_complete());
        assert_eq!(
            backend.buffer_contents(BufferId(2)).unwrap(),
            vec![0, 0, 0, 0, 9, 9, 9, 9]
        );
    }

    #[test]
    fn test_deferred_submission() {
        let backend = DummyBackend::deferred();
        let desc = TextureDescriptor::new_2d(2, 1, TextureFormat::R8Unorm, TextureUsage::COPY_SRC);
        backend.create_texture(TextureId(1), &desc).unwrap();
        backend.create_buffer(BufferId(2), &host_buffer(2)).unwrap();
        backend.write_texture(TextureId(1), &[7, 8]).unwrap();

        let mut list = CommandList::new();
        list.copy_texture_to_buffer(TextureId(1), BufferId(2), 0);

        let timeline = QueueTimeline::new(QueueId::GRAPHICS);
        let point = timeline.next_point();
        backend.submit(list, &timeline, &point).unwrap();

        assert!(!point.is_complete());
        assert_eq!(backend.pending_submissions(), 1);
        assert_eq!(backend.buffer_contents(BufferId(2)).unwrap(), vec![0, 0]);

        backend.complete_submissions().unwrap();
        assert!(point.is_complete());
        assert_eq!(backend.buffer_contents(BufferId(2)).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_lifecycle_events() {
        let backend = DummyBackend::new();
        backend.create_buffer(BufferId(1), &host_buffer(4)).unwrap();
        backend.destroy_buffer(BufferId(1));
        backend.destroy_buffer(BufferId(1));

        assert_eq!(
            backend.events(),
            vec![
                ResourceEvent::Created {
                    key: ResourceKey::Buffer(BufferId(1)),
                    label: None,
                },
                ResourceEvent::Destroyed {
                    key: ResourceKey::Buffer(BufferId(1)),
                },
            ]
        );
        assert_eq!(backend.buffer_count(), 0);
    }
}
