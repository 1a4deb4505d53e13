//! Render pass protocol.

use std::sync::Arc;

use bytemuck::Pod;

use super::resources::GraphResources;
use crate::access::{BufferAccess, PipelineStage, TextureAccess};
use crate::command::CommandList;
use crate::dependency::DependencyManager;
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, Result};
use crate::frame::FrameIndex;
use crate::memory::{FrameArenas, TransientAllocation};
use crate::readback::{ReadbackScheduler, check_copy_range};
use crate::resources::{Buffer, BufferId, Texture, TextureId};

/// A unit of GPU work in a [`RenderGraph`](super::RenderGraph).
///
/// Every frame the graph calls, for every pass in insertion order:
/// 1. [`register_resources`](Self::register_resources) for all passes
/// 2. [`initialize`](Self::initialize) for all passes, once backing resources exist
/// 3. [`render`](Self::render) for all passes, recording into one command list
pub trait RenderPass<const N: usize> {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Declare the named resources this pass reads or writes.
    fn register_resources(&mut self, resources: &mut GraphResources) -> Result<()>;

    /// Prepare for rendering once every resource has its backing storage.
    fn initialize(&mut self, _resources: &GraphResources) -> Result<()> {
        Ok(())
    }

    /// Record commands.
    fn render(&mut self, ctx: &mut PassContext<'_, N>) -> Result<()>;
}

/// Readbacks scheduled while recording a frame, keyed by label.
pub(crate) type ScheduledReadbacks = Vec<(String, ReadbackScheduler)>;

/// Everything a pass can touch while recording.
///
/// Every resource access goes through [`use_texture`](Self::use_texture) /
/// [`use_buffer`](Self::use_buffer) (or their imported variants), which
/// record the barrier from the resource's previous state before returning.
pub struct PassContext<'a, const N: usize> {
    frame: FrameIndex<N>,
    device: &'a Arc<GraphicsDevice>,
    resources: &'a GraphResources,
    dependencies: &'a mut DependencyManager,
    commands: &'a mut CommandList,
    arenas: &'a mut FrameArenas<N>,
    readbacks: &'a mut ScheduledReadbacks,
}

impl<'a, const N: usize> PassContext<'a, N> {
    pub(crate) fn new(
        frame: FrameIndex<N>,
        device: &'a Arc<GraphicsDevice>,
        resources: &'a GraphResources,
        dependencies: &'a mut DependencyManager,
        commands: &'a mut CommandList,
        arenas: &'a mut FrameArenas<N>,
        readbacks: &'a mut ScheduledReadbacks,
    ) -> Self {
        Self {
            frame,
            device,
            resources,
            dependencies,
            commands,
            arenas,
            readbacks,
        }
    }

    /// The frame being recorded.
    pub fn frame(&self) -> FrameIndex<N> {
        self.frame
    }

    /// The device the graph renders with.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.device
    }

    /// The graph's resource registry.
    pub fn resources(&self) -> &GraphResources {
        self.resources
    }

    /// A registered texture, without recording any barrier.
    pub fn texture(&self, name: &str) -> Result<&'a Texture> {
        self.resources.texture(name)
    }

    /// A registered buffer, without recording any barrier.
    pub fn buffer(&self, name: &str) -> Result<&'a Buffer> {
        self.resources.buffer(name)
    }

    /// Transition a registered texture to `access` in `stage`.
    ///
    /// # Errors
    ///
    /// Fails if the name is not registered this build, or if the texture
    /// was not registered with a usage supporting `access`.
    pub fn use_texture(
        &mut self,
        name: &str,
        access: TextureAccess,
        stage: PipelineStage,
    ) -> Result<TextureId> {
        let resources = self.resources;
        let texture = resources.texture(name)?;
        let required = access.required_usage();
        if !texture.usage().contains(required) {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture '{name}' used as {access:?} but registered without {required:?}"
            )));
        }
        self.use_imported_texture(texture.id(), access, stage)?;
        Ok(texture.id())
    }

    /// Transition a registered buffer to `access` in `stage`.
    ///
    /// # Errors
    ///
    /// Same as [`use_texture`](Self::use_texture).
    pub fn use_buffer(
        &mut self,
        name: &str,
        access: BufferAccess,
        stage: PipelineStage,
    ) -> Result<BufferId> {
        let resources = self.resources;
        let buffer = resources.buffer(name)?;
        let required = access.required_usage();
        if !buffer.usage().contains(required) {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{name}' used as {access:?} but registered without {required:?}"
            )));
        }
        self.use_imported_buffer(buffer.id(), access, stage)?;
        Ok(buffer.id())
    }

    /// Transition a texture tracked outside the registry.
    pub fn use_imported_texture(
        &mut self,
        id: TextureId,
        access: TextureAccess,
        stage: PipelineStage,
    ) -> Result<()> {
        self.dependencies
            .texture_barrier(&mut *self.commands, id, access, stage)?;
        Ok(())
    }

    /// Transition a buffer tracked outside the registry.
    pub fn use_imported_buffer(
        &mut self,
        id: BufferId,
        access: BufferAccess,
        stage: PipelineStage,
    ) -> Result<()> {
        self.dependencies
            .buffer_barrier(&mut *self.commands, id, access, stage)?;
        Ok(())
    }

    /// The command list of the frame.
    pub fn commands(&mut self) -> &mut CommandList {
        self.commands
    }

    /// Staging memory from the upload arena.
    pub fn upload(&mut self, size: u64, alignment: u64) -> Result<TransientAllocation> {
        self.arenas.upload.allocate(&self.frame, size, alignment)
    }

    /// Uniform memory aligned for binding.
    pub fn uniform(&mut self, size: u64) -> Result<TransientAllocation> {
        self.arenas.allocate_uniform(&self.frame, size)
    }

    /// Allocate uniform memory and write `value` into it.
    pub fn uniform_value<T: Pod>(&mut self, value: &T) -> Result<TransientAllocation> {
        let allocation = self.uniform(std::mem::size_of::<T>() as u64)?;
        allocation.write(value)?;
        Ok(allocation)
    }

    /// Schedule a copy of `size` bytes of a buffer for CPU readback.
    ///
    /// The resulting future is returned by
    /// [`FrameOutput::take_readback`](super::FrameOutput::take_readback)
    /// under `label`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the label is taken or `offset + size` exceeds
    /// the buffer. Nothing is allocated or recorded in that case.
    pub fn copy_buffer_to_readback(
        &mut self,
        label: &str,
        buffer: &Buffer,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        self.check_readback_label(label)?;
        check_copy_range(buffer, offset, size)?;
        let scheduler = ReadbackScheduler::new(&self.frame, &mut self.arenas.readback, size)?;
        scheduler.record_buffer_copy(self.dependencies, &mut *self.commands, buffer, offset)?;
        self.readbacks.push((label.to_string(), scheduler));
        Ok(())
    }

    /// Schedule a copy of a whole registered texture for CPU readback.
    pub fn copy_texture_to_readback(&mut self, label: &str, name: &str) -> Result<()> {
        self.check_readback_label(label)?;
        let resources = self.resources;
        let texture = resources.texture(name)?;
        let size = texture.descriptor().byte_size();
        let scheduler = ReadbackScheduler::new(&self.frame, &mut self.arenas.readback, size)?;
        scheduler.record_texture_copy(self.dependencies, &mut *self.commands, texture)?;
        self.readbacks.push((label.to_string(), scheduler));
        Ok(())
    }

    fn check_readback_label(&self, label: &str) -> Result<()> {
        if self.readbacks.iter().any(|(existing, _)| existing == label) {
            return Err(GraphicsError::InvalidParameter(format!(
                "readback '{label}' already scheduled this frame"
            )));
        }
        Ok(())
    }
}

impl<const N: usize> std::fmt::Debug for PassContext<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("frame", &self.frame)
            .field("commands", &self.commands.len())
            .field("readbacks", &self.readbacks.len())
            .finish()
    }
}
