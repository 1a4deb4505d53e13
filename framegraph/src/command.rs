//! Command recording.
//!
//! [`CommandEncoder`] is the narrow recording surface passes and the
//! [`DependencyManager`](crate::dependency::DependencyManager) drive. The
//! crate does not interpret the commands itself: [`CommandList`] records them
//! in order and hands them to the backend on submission.

use crate::access::{BufferState, TextureLayout, TextureState};
use crate::resources::{BufferId, TextureId};

/// A transition of one texture between two recorded states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBarrier {
    /// The texture being transitioned.
    pub texture: TextureId,
    /// State before the barrier.
    pub from: TextureState,
    /// State after the barrier.
    pub to: TextureState,
}

impl TextureBarrier {
    /// Layout before the barrier.
    pub fn old_layout(&self) -> TextureLayout {
        self.from.layout()
    }

    /// Layout after the barrier.
    pub fn new_layout(&self) -> TextureLayout {
        self.to.layout()
    }

    /// Check if the barrier changes the layout.
    pub fn is_layout_transition(&self) -> bool {
        self.old_layout() != self.new_layout()
    }
}

/// A transition of one buffer between two recorded states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    /// The buffer being transitioned.
    pub buffer: BufferId,
    /// State before the barrier.
    pub from: BufferState,
    /// State after the barrier.
    pub to: BufferState,
}

/// A region within a buffer for copy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopyRegion {
    /// Offset in bytes from the start of the source buffer.
    pub src_offset: u64,
    /// Offset in bytes from the start of the destination buffer.
    pub dst_offset: u64,
    /// Number of bytes to copy.
    pub size: u64,
}

impl BufferCopyRegion {
    /// Create a new buffer copy region.
    pub fn new(src_offset: u64, dst_offset: u64, size: u64) -> Self {
        Self {
            src_offset,
            dst_offset,
            size,
        }
    }
}

/// A single recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Texture barrier.
    TextureBarrier(TextureBarrier),
    /// Buffer barrier.
    BufferBarrier(BufferBarrier),
    /// Buffer to buffer copy.
    CopyBuffer {
        /// Source buffer.
        src: BufferId,
        /// Destination buffer.
        dst: BufferId,
        /// Copied range.
        region: BufferCopyRegion,
    },
    /// Copy of a whole texture (mip 0) into a buffer, tightly packed.
    CopyTextureToBuffer {
        /// Source texture.
        src: TextureId,
        /// Destination buffer.
        dst: BufferId,
        /// Byte offset in the destination buffer.
        dst_offset: u64,
    },
    /// Copy of tightly packed texel data into a whole texture (mip 0).
    CopyBufferToTexture {
        /// Source buffer.
        src: BufferId,
        /// Byte offset in the source buffer.
        src_offset: u64,
        /// Destination texture.
        dst: TextureId,
    },
    /// Pipeline bind, by name.
    BindPipeline(String),
    /// Buffer range bind.
    BindBuffer {
        /// Binding slot.
        slot: u32,
        /// Bound buffer.
        buffer: BufferId,
        /// Byte offset of the bound range.
        offset: u64,
        /// Size of the bound range.
        size: u64,
    },
    /// Texture bind.
    BindTexture {
        /// Binding slot.
        slot: u32,
        /// Bound texture.
        texture: TextureId,
    },
    /// Compute dispatch.
    Dispatch {
        /// Workgroups in X.
        x: u32,
        /// Workgroups in Y.
        y: u32,
        /// Workgroups in Z.
        z: u32,
    },
    /// Non-indexed draw.
    Draw {
        /// Vertices per instance.
        vertex_count: u32,
        /// Number of instances.
        instance_count: u32,
    },
}

impl Command {
    /// Check if the command is a barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::TextureBarrier(_) | Self::BufferBarrier(_))
    }
}

/// Recording surface for GPU commands.
///
/// Implemented by [`CommandList`]; backends may provide encoders that record
/// straight into native command buffers.
pub trait CommandEncoder {
    /// Record a texture dependency. Always recorded, even if `from == to`.
    fn texture_dependency(&mut self, barrier: TextureBarrier);

    /// Record a buffer dependency. Always recorded, even if `from == to`.
    fn buffer_dependency(&mut self, barrier: BufferBarrier);

    /// Copy bytes between buffers.
    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, region: BufferCopyRegion);

    /// Copy a whole texture into a buffer.
    fn copy_texture_to_buffer(&mut self, src: TextureId, dst: BufferId, dst_offset: u64);

    /// Copy buffer bytes into a whole texture.
    fn copy_buffer_to_texture(&mut self, src: BufferId, src_offset: u64, dst: TextureId);

    /// Bind a pipeline by name.
    fn bind_pipeline(&mut self, name: &str);

    /// Bind a buffer range to a slot.
    fn bind_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64, size: u64);

    /// Bind a texture to a slot.
    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    /// Dispatch compute workgroups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Draw vertices.
    fn draw(&mut self, vertex_count: u32, instance_count: u32);
}

/// An ordered list of recorded commands, submitted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    label: Option<String>,
    commands: Vec<Command>,
}

impl CommandList {
    /// Create an empty command list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The recorded commands in recording order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of recorded barriers.
    pub fn barrier_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_barrier()).count()
    }

    /// Iterate the recorded texture barriers.
    pub fn texture_barriers(&self) -> impl Iterator<Item = &TextureBarrier> {
        self.commands.iter().filter_map(|c| match c {
            Command::TextureBarrier(b) => Some(b),
            _ => None,
        })
    }

    /// Iterate the recorded buffer barriers.
    pub fn buffer_barriers(&self) -> impl Iterator<Item = &BufferBarrier> {
        self.commands.iter().filter_map(|c| match c {
            Command::BufferBarrier(b) => Some(b),
            _ => None,
        })
    }

    /// Consume the list, returning the commands.
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    fn push(&mut self, command: Command) {
        log::trace!("CommandList {:?}: {:?}", self.label, command);
        self.commands.push(command);
    }
}

impl CommandEncoder for CommandList {
    fn texture_dependency(&mut self, barrier: TextureBarrier) {
        self.push(Command::TextureBarrier(barrier));
    }

    fn buffer_dependency(&mut self, barrier: BufferBarrier) {
        self.push(Command::BufferBarrier(barrier));
    }

    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, region: BufferCopyRegion) {
        self.push(Command::CopyBuffer { src, dst, region });
    }

    fn copy_texture_to_buffer(&mut self, src: TextureId, dst: BufferId, dst_offset: u64) {
        self.push(Command::CopyTextureToBuffer {
            src,
            dst,
            dst_offset,
        });
    }

    fn copy_buffer_to_texture(&mut self, src: BufferId, src_offset: u64, dst: TextureId) {
        self.push(Command::CopyBufferToTexture {
            src,
            src_offset,
            dst,
        });
    }

    fn bind_pipeline(&mut self, name: &str) {
        self.push(Command::BindPipeline(name.to_string()));
    }

    fn bind_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64, size: u64) {
        self.push(Command::BindBuffer {
            slot,
            buffer,
            offset,
            size,
        });
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.push(Command::BindTexture { slot, texture });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch { x, y, z });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{BufferAccess, PipelineStage, TextureAccess};

    #[test]
    fn test_records_in_order() {
        let mut list = CommandList::new().with_label("test");
        list.bind_pipeline("blur");
        list.dispatch(8, 8, 1);
        list.draw(3, 1);

        assert_eq!(list.len(), 3);
        assert_eq!(list.commands()[0], Command::BindPipeline("blur".into()));
        assert_eq!(list.commands()[1], Command::Dispatch { x: 8, y: 8, z: 1 });
        assert_eq!(list.barrier_count(), 0);
        assert_eq!(list.label(), Some("test"));
    }

    #[test]
    fn test_barrier_count() {
        let mut list = CommandList::new();
        list.texture_dependency(TextureBarrier {
            texture: TextureId(1),
            from: TextureState::UNDEFINED,
            to: TextureState::new(
                TextureAccess::RenderTargetWrite,
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            ),
        });
        list.buffer_dependency(BufferBarrier {
            buffer: BufferId(2),
            from: BufferState::UNDEFINED,
            to: BufferState::new(BufferAccess::TransferWrite, PipelineStage::TRANSFER),
        });
        list.copy_buffer(BufferId(3), BufferId(2), BufferCopyRegion::new(0, 0, 16));

        assert_eq!(list.barrier_count(), 2);
        assert_eq!(list.texture_barriers().count(), 1);
        assert_eq!(list.buffer_barriers().count(), 1);
    }

    #[test]
    fn test_texture_barrier_layouts() {
        let barrier = TextureBarrier {
            texture: TextureId(1),
            from: TextureState::new(TextureAccess::ShaderRead, PipelineStage::FRAGMENT_SHADER),
            to: TextureState::new(TextureAccess::ShaderRead, PipelineStage::COMPUTE_SHADER),
        };
        assert_eq!(barrier.old_layout(), TextureLayout::ShaderReadOnly);
        assert!(!barrier.is_layout_transition());
    }
}
