//! Resource access declarations for automatic barrier generation.
//!
//! Passes describe *how* they touch a texture or buffer with an access kind
//! plus the pipeline stage doing the touching. The
//! [`DependencyManager`](crate::dependency::DependencyManager) records the last
//! `(access, stage)` pair per resource and turns every new request into a
//! transition from the recorded pair.
//!
//! Textures additionally carry an image layout, which is derived from the
//! access kind via [`TextureAccess::layout`]. Buffers have no layout.

use bitflags::bitflags;

use crate::types::{BufferUsage, TextureUsage};

bitflags! {
    /// Pipeline stages a resource access can happen in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        /// Start of the pipeline; used as the source stage of undefined resources.
        const TOP_OF_PIPE = 1 << 0;
        /// Indirect argument fetch.
        const DRAW_INDIRECT = 1 << 1;
        /// Vertex and index fetch.
        const VERTEX_INPUT = 1 << 2;
        /// Vertex shader.
        const VERTEX_SHADER = 1 << 3;
        /// Fragment shader.
        const FRAGMENT_SHADER = 1 << 4;
        /// Early depth/stencil tests.
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        /// Late depth/stencil tests.
        const LATE_FRAGMENT_TESTS = 1 << 6;
        /// Color attachment output.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        /// Compute shader.
        const COMPUTE_SHADER = 1 << 8;
        /// Copy and blit operations.
        const TRANSFER = 1 << 9;
        /// End of the pipeline.
        const BOTTOM_OF_PIPE = 1 << 10;
        /// CPU reads and writes of mapped memory.
        const HOST = 1 << 11;

        /// Every shader stage.
        const ALL_SHADERS = Self::VERTEX_SHADER.bits()
            | Self::FRAGMENT_SHADER.bits()
            | Self::COMPUTE_SHADER.bits();
    }
}

/// Image layout states a texture can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Initial state, contents undefined.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Optimal for depth read-only (sampling + depth testing).
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Optimal for presentation to a swapchain.
    PresentSrc,
    /// General layout (storage images).
    General,
}

/// How a texture is used by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAccess {
    /// No previous access; contents are undefined.
    #[default]
    Undefined,
    /// Written as color render target.
    RenderTargetWrite,
    /// Written as depth/stencil render target.
    DepthStencilWrite,
    /// Read-only depth/stencil (sampling + depth test).
    DepthStencilReadOnly,
    /// Sampled in a shader.
    ShaderRead,
    /// Read/write as storage texture.
    StorageReadWrite,
    /// Source of a copy.
    TransferRead,
    /// Destination of a copy.
    TransferWrite,
    /// Handed to the presentation engine.
    Present,
}

impl TextureAccess {
    /// The image layout this access requires.
    pub fn layout(self) -> TextureLayout {
        match self {
            Self::Undefined => TextureLayout::Undefined,
            Self::RenderTargetWrite => TextureLayout::ColorAttachment,
            Self::DepthStencilWrite => TextureLayout::DepthStencilAttachment,
            Self::DepthStencilReadOnly => TextureLayout::DepthStencilReadOnly,
            Self::ShaderRead => TextureLayout::ShaderReadOnly,
            Self::StorageReadWrite => TextureLayout::General,
            Self::TransferRead => TextureLayout::TransferSrc,
            Self::TransferWrite => TextureLayout::TransferDst,
            Self::Present => TextureLayout::PresentSrc,
        }
    }

    /// Check if this access writes the texture.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::RenderTargetWrite
                | Self::DepthStencilWrite
                | Self::StorageReadWrite
                | Self::TransferWrite
        )
    }

    /// Check if this access reads the texture.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::DepthStencilReadOnly
                | Self::ShaderRead
                | Self::StorageReadWrite
                | Self::TransferRead
                | Self::Present
        )
    }

    /// Usage flags a texture needs to support this access.
    pub fn required_usage(self) -> TextureUsage {
        match self {
            Self::Undefined | Self::Present => TextureUsage::empty(),
            Self::RenderTargetWrite | Self::DepthStencilWrite | Self::DepthStencilReadOnly => {
                TextureUsage::RENDER_ATTACHMENT
            }
            Self::ShaderRead => TextureUsage::TEXTURE_BINDING,
            Self::StorageReadWrite => TextureUsage::STORAGE_BINDING,
            Self::TransferRead => TextureUsage::COPY_SRC,
            Self::TransferWrite => TextureUsage::COPY_DST,
        }
    }

    /// The stage this access usually happens in.
    pub fn default_stage(self) -> PipelineStage {
        match self {
            Self::Undefined => PipelineStage::TOP_OF_PIPE,
            Self::RenderTargetWrite => PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencilWrite => {
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS
            }
            Self::DepthStencilReadOnly => PipelineStage::EARLY_FRAGMENT_TESTS,
            Self::ShaderRead => PipelineStage::FRAGMENT_SHADER,
            Self::StorageReadWrite => PipelineStage::COMPUTE_SHADER,
            Self::TransferRead | Self::TransferWrite => PipelineStage::TRANSFER,
            Self::Present => PipelineStage::BOTTOM_OF_PIPE,
        }
    }
}

/// How a buffer is used by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferAccess {
    /// No previous access.
    #[default]
    Undefined,
    /// Written by the CPU through a mapping.
    HostWrite,
    /// Read by the CPU through a mapping.
    HostRead,
    /// Read as vertex buffer data.
    VertexBuffer,
    /// Read as index buffer data.
    IndexBuffer,
    /// Read as uniform buffer.
    UniformRead,
    /// Read as storage buffer.
    StorageRead,
    /// Written as storage buffer.
    StorageWrite,
    /// Read and written as storage buffer.
    StorageReadWrite,
    /// Read as indirect draw arguments.
    IndirectRead,
    /// Source of a copy.
    TransferRead,
    /// Destination of a copy.
    TransferWrite,
}

impl BufferAccess {
    /// Check if this access writes the buffer.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::HostWrite | Self::StorageWrite | Self::StorageReadWrite | Self::TransferWrite
        )
    }

    /// Check if this access reads the buffer.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::HostRead
                | Self::VertexBuffer
                | Self::IndexBuffer
                | Self::UniformRead
                | Self::StorageRead
                | Self::StorageReadWrite
                | Self::IndirectRead
                | Self::TransferRead
        )
    }

    /// Usage flags a buffer needs to support this access.
    pub fn required_usage(self) -> BufferUsage {
        match self {
            Self::Undefined => BufferUsage::empty(),
            Self::HostWrite => BufferUsage::MAP_WRITE,
            Self::HostRead => BufferUsage::MAP_READ,
            Self::VertexBuffer => BufferUsage::VERTEX,
            Self::IndexBuffer => BufferUsage::INDEX,
            Self::UniformRead => BufferUsage::UNIFORM,
            Self::StorageRead | Self::StorageWrite | Self::StorageReadWrite => {
                BufferUsage::STORAGE
            }
            Self::IndirectRead => BufferUsage::INDIRECT,
            Self::TransferRead => BufferUsage::COPY_SRC,
            Self::TransferWrite => BufferUsage::COPY_DST,
        }
    }

    /// The stage this access usually happens in.
    pub fn default_stage(self) -> PipelineStage {
        match self {
            Self::Undefined => PipelineStage::TOP_OF_PIPE,
            Self::HostWrite | Self::HostRead => PipelineStage::HOST,
            Self::VertexBuffer | Self::IndexBuffer => PipelineStage::VERTEX_INPUT,
            Self::UniformRead
            | Self::StorageRead
            | Self::StorageWrite
            | Self::StorageReadWrite => PipelineStage::ALL_SHADERS,
            Self::IndirectRead => PipelineStage::DRAW_INDIRECT,
            Self::TransferRead | Self::TransferWrite => PipelineStage::TRANSFER,
        }
    }
}

/// Recorded state of a texture: last access and the stage it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureState {
    /// Last access kind.
    pub access: TextureAccess,
    /// Stage of the last access.
    pub stage: PipelineStage,
}

impl TextureState {
    /// State of a texture nothing has touched yet.
    pub const UNDEFINED: Self = Self {
        access: TextureAccess::Undefined,
        stage: PipelineStage::TOP_OF_PIPE,
    };

    /// Create a new texture state.
    pub fn new(access: TextureAccess, stage: PipelineStage) -> Self {
        Self { access, stage }
    }

    /// The layout implied by the access kind.
    pub fn layout(&self) -> TextureLayout {
        self.access.layout()
    }
}

impl Default for TextureState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Recorded state of a buffer: last access and the stage it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferState {
    /// Last access kind.
    pub access: BufferAccess,
    /// Stage of the last access.
    pub stage: PipelineStage,
}

impl BufferState {
    /// State of a buffer nothing has touched yet.
    pub const UNDEFINED: Self = Self {
        access: BufferAccess::Undefined,
        stage: PipelineStage::TOP_OF_PIPE,
    };

    /// Create a new buffer state.
    pub fn new(access: BufferAccess, stage: PipelineStage) -> Self {
        Self { access, stage }
    }
}

impl Default for BufferState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_access_is_write() {
        assert!(TextureAccess::RenderTargetWrite.is_write());
        assert!(TextureAccess::DepthStencilWrite.is_write());
        assert!(TextureAccess::StorageReadWrite.is_write());
        assert!(TextureAccess::TransferWrite.is_write());

        assert!(!TextureAccess::ShaderRead.is_write());
        assert!(!TextureAccess::TransferRead.is_write());
        assert!(!TextureAccess::Undefined.is_write());
    }

    #[test]
    fn test_texture_access_layouts() {
        assert_eq!(
            TextureAccess::RenderTargetWrite.layout(),
            TextureLayout::ColorAttachment
        );
        assert_eq!(TextureAccess::ShaderRead.layout(), TextureLayout::ShaderReadOnly);
        assert_eq!(TextureAccess::StorageReadWrite.layout(), TextureLayout::General);
        assert_eq!(TextureState::UNDEFINED.layout(), TextureLayout::Undefined);
    }

    #[test]
    fn test_buffer_access_read_write() {
        assert!(BufferAccess::StorageReadWrite.is_read());
        assert!(BufferAccess::StorageReadWrite.is_write());
        assert!(BufferAccess::HostWrite.is_write());
        assert!(BufferAccess::HostRead.is_read());

        assert!(!BufferAccess::VertexBuffer.is_write());
        assert!(!BufferAccess::TransferWrite.is_read());
    }

    #[test]
    fn test_required_usage() {
        assert_eq!(
            TextureAccess::ShaderRead.required_usage(),
            TextureUsage::TEXTURE_BINDING
        );
        assert_eq!(
            BufferAccess::StorageWrite.required_usage(),
            BufferUsage::STORAGE
        );
        assert!(BufferAccess::Undefined.required_usage().is_empty());
    }

    #[test]
    fn test_all_shaders_stage() {
        assert!(PipelineStage::ALL_SHADERS.contains(PipelineStage::COMPUTE_SHADER));
        assert!(!PipelineStage::ALL_SHADERS.contains(PipelineStage::TRANSFER));
        assert_eq!(
            BufferAccess::UniformRead.default_stage(),
            PipelineStage::ALL_SHADERS
        );
    }
}
