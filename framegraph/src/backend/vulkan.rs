//! Vulkan barrier generation.
//!
//! Converts the access states recorded by the
//! [`DependencyManager`](crate::DependencyManager) into native
//! `vkCmdPipelineBarrier` arguments. Barriers for one pass are collected into
//! a [`BarrierBatch`] and recorded with a single call.
//!
//! # Example
//!
//! ```ignore
//! let mut batch = BarrierBatch::new();
//! for command in commands.commands() {
//!     match command {
//!         Command::TextureBarrier(b) => batch.add_texture_barrier(b, images[&b.texture], aspect),
//!         Command::BufferBarrier(b) => batch.add_buffer_barrier(b, buffers[&b.buffer]),
//!         _ => {
//!             batch.record(&device, cmd);
//!             batch.clear();
//!             // ... record the command ...
//!         }
//!     }
//! }
//! ```

use ash::vk;

use crate::access::{BufferAccess, PipelineStage, TextureAccess, TextureLayout};
use crate::command::{BufferBarrier, TextureBarrier};

impl TextureLayout {
    /// Convert to Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::General => vk::ImageLayout::GENERAL,
        }
    }
}

impl TextureAccess {
    /// Memory access mask of this access.
    pub fn to_vk_access(self) -> vk::AccessFlags {
        match self {
            Self::Undefined | Self::Present => vk::AccessFlags::empty(),
            Self::RenderTargetWrite => {
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            Self::DepthStencilWrite => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::DepthStencilReadOnly => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderRead => vk::AccessFlags::SHADER_READ,
            Self::StorageReadWrite => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            Self::TransferRead => vk::AccessFlags::TRANSFER_READ,
            Self::TransferWrite => vk::AccessFlags::TRANSFER_WRITE,
        }
    }
}

impl BufferAccess {
    /// Memory access mask of this access.
    pub fn to_vk_access(self) -> vk::AccessFlags {
        match self {
            Self::Undefined => vk::AccessFlags::empty(),
            Self::HostWrite => vk::AccessFlags::HOST_WRITE,
            Self::HostRead => vk::AccessFlags::HOST_READ,
            Self::VertexBuffer => vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            Self::IndexBuffer => vk::AccessFlags::INDEX_READ,
            Self::UniformRead => vk::AccessFlags::UNIFORM_READ,
            Self::StorageRead => vk::AccessFlags::SHADER_READ,
            Self::StorageWrite => vk::AccessFlags::SHADER_WRITE,
            Self::StorageReadWrite => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            Self::IndirectRead => vk::AccessFlags::INDIRECT_COMMAND_READ,
            Self::TransferRead => vk::AccessFlags::TRANSFER_READ,
            Self::TransferWrite => vk::AccessFlags::TRANSFER_WRITE,
        }
    }
}

impl PipelineStage {
    /// Convert to Vulkan pipeline stage flags.
    ///
    /// An empty set maps to `TOP_OF_PIPE`, which Vulkan accepts as a no-op
    /// source stage.
    pub fn to_vk(self) -> vk::PipelineStageFlags {
        const TABLE: [(PipelineStage, vk::PipelineStageFlags); 12] = [
            (PipelineStage::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
            (PipelineStage::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
            (PipelineStage::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
            (PipelineStage::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
            (PipelineStage::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
            (PipelineStage::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
            (PipelineStage::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
            (
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            (PipelineStage::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
            (PipelineStage::TRANSFER, vk::PipelineStageFlags::TRANSFER),
            (PipelineStage::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
            (PipelineStage::HOST, vk::PipelineStageFlags::HOST),
        ];

        let flags = TABLE
            .iter()
            .filter(|(stage, _)| self.contains(*stage))
            .fold(vk::PipelineStageFlags::empty(), |acc, (_, vk_stage)| acc | *vk_stage);

        if flags.is_empty() {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            flags
        }
    }
}

/// A batch of memory barriers recorded with one `vkCmdPipelineBarrier`.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    image_barriers: Vec<vk::ImageMemoryBarrier<'static>>,
    buffer_barriers: Vec<vk::BufferMemoryBarrier<'static>>,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a texture barrier for `image`.
    ///
    /// Read-to-read barriers without a layout change are dropped here; every
    /// other transition is kept.
    pub fn add_texture_barrier(
        &mut self,
        barrier: &TextureBarrier,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        if Self::is_redundant(
            barrier.from.access.is_write(),
            barrier.to.access.is_write(),
            barrier.is_layout_transition(),
        ) {
            return;
        }

        self.image_barriers.push(
            vk::ImageMemoryBarrier::default()
                .old_layout(barrier.old_layout().to_vk())
                .new_layout(barrier.new_layout().to_vk())
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: vk::REMAINING_ARRAY_LAYERS,
                })
                .src_access_mask(barrier.from.access.to_vk_access())
                .dst_access_mask(barrier.to.access.to_vk_access()),
        );
        self.src_stage_mask |= barrier.from.stage.to_vk();
        self.dst_stage_mask |= barrier.to.stage.to_vk();
    }

    /// Add a buffer barrier covering all of `buffer`.
    pub fn add_buffer_barrier(&mut self, barrier: &BufferBarrier, buffer: vk::Buffer) {
        if Self::is_redundant(barrier.from.access.is_write(), barrier.to.access.is_write(), false)
        {
            return;
        }

        self.buffer_barriers.push(
            vk::BufferMemoryBarrier::default()
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .src_access_mask(barrier.from.access.to_vk_access())
                .dst_access_mask(barrier.to.access.to_vk_access()),
        );
        self.src_stage_mask |= barrier.from.stage.to_vk();
        self.dst_stage_mask |= barrier.to.stage.to_vk();
    }

    fn is_redundant(from_write: bool, to_write: bool, layout_transition: bool) -> bool {
        !from_write && !to_write && !layout_transition
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// Source stage mask (union of all barriers).
    pub fn src_stage_mask(&self) -> vk::PipelineStageFlags {
        self.src_stage_mask
    }

    /// Destination stage mask (union of all barriers).
    pub fn dst_stage_mask(&self) -> vk::PipelineStageFlags {
        self.dst_stage_mask
    }

    /// Record all barriers in a single pipeline barrier command.
    ///
    /// Does nothing if the batch is empty.
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }

        // SAFETY: `cmd` is in the recording state and every handle in the
        // batch belongs to `device`.
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage_mask,
                self.dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffer_barriers,
                &self.image_barriers,
            );
        }
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.buffer_barriers.clear();
        self.src_stage_mask = vk::PipelineStageFlags::empty();
        self.dst_stage_mask = vk::PipelineStageFlags::empty();
    }
}

// SAFETY: the barrier structs only carry a null `p_next`; every other field is
// a plain handle or integer.
unsafe impl Send for BarrierBatch {}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::access::{BufferState, TextureState};
    use crate::resources::{BufferId, TextureId};

    #[test]
    fn test_stage_conversion() {
        assert_eq!(
            (PipelineStage::VERTEX_SHADER | PipelineStage::COMPUTE_SHADER).to_vk(),
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER
        );
        assert_eq!(
            PipelineStage::empty().to_vk(),
            vk::PipelineStageFlags::TOP_OF_PIPE
        );
    }

    #[test]
    fn test_texture_barrier() {
        let mut batch = BarrierBatch::new();
        let barrier = TextureBarrier {
            texture: TextureId(1),
            from: TextureState::UNDEFINED,
            to: TextureState::new(
                TextureAccess::RenderTargetWrite,
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            ),
        };
        batch.add_texture_barrier(&barrier, vk::Image::null(), vk::ImageAspectFlags::COLOR);

        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.image_barriers[0].new_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(batch.src_stage_mask(), vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(
            batch.dst_stage_mask(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn test_read_after_read_dropped() {
        let mut batch = BarrierBatch::new();
        let read = BufferState::new(BufferAccess::UniformRead, PipelineStage::VERTEX_SHADER);
        batch.add_buffer_barrier(
            &BufferBarrier {
                buffer: BufferId(1),
                from: read,
                to: read,
            },
            vk::Buffer::null(),
        );
        assert!(batch.is_empty());

        let write = BufferState::new(BufferAccess::StorageWrite, PipelineStage::COMPUTE_SHADER);
        batch.add_buffer_barrier(
            &BufferBarrier {
                buffer: BufferId(1),
                from: write,
                to: write,
            },
            vk::Buffer::null(),
        );
        assert_eq!(batch.len(), 1);

        batch.clear();
        assert!(batch.is_empty());
    }
}
