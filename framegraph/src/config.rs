//! Render graph configuration.

use crate::error::{GraphicsError, Result};

/// Sizes and alignment of the per-frame memory arenas.
///
/// Every size is per ring slot; a graph with `N` frames in flight allocates
/// `N` blocks of each.
///
/// # Example
///
/// ```ignore
/// let config = FrameGraphConfig::default()
///     .with_label("main")
///     .with_upload_arena_size(8 * 1024 * 1024);
/// let graph = RenderGraph::<2>::new(device, config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameGraphConfig {
    /// Debug label, used to name the arena buffers.
    pub label: String,
    /// Bytes per slot of the CPU to GPU staging arena.
    pub upload_arena_size: u64,
    /// Bytes per slot of the GPU to CPU readback arena.
    pub readback_arena_size: u64,
    /// Bytes per slot of the uniform data arena.
    pub uniform_arena_size: u64,
    /// Alignment of uniform allocations. Must be a power of two.
    pub uniform_alignment: u64,
}

impl FrameGraphConfig {
    /// Default uniform alignment (256 bytes), the minimum dynamic offset
    /// alignment most GPUs require.
    pub const DEFAULT_UNIFORM_ALIGNMENT: u64 = 256;

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the upload arena size per slot.
    pub fn with_upload_arena_size(mut self, size: u64) -> Self {
        self.upload_arena_size = size;
        self
    }

    /// Set the readback arena size per slot.
    pub fn with_readback_arena_size(mut self, size: u64) -> Self {
        self.readback_arena_size = size;
        self
    }

    /// Set the uniform arena size per slot.
    pub fn with_uniform_arena_size(mut self, size: u64) -> Self {
        self.uniform_arena_size = size;
        self
    }

    /// Set the uniform allocation alignment.
    pub fn with_uniform_alignment(mut self, alignment: u64) -> Self {
        self.uniform_alignment = alignment;
        self
    }

    /// Check that all sizes are non-zero and the alignment is a power of two.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("upload_arena_size", self.upload_arena_size),
            ("readback_arena_size", self.readback_arena_size),
            ("uniform_arena_size", self.uniform_arena_size),
        ] {
            if size == 0 {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{name} cannot be zero"
                )));
            }
        }

        if !self.uniform_alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "uniform_alignment must be a power of 2, got {}",
                self.uniform_alignment
            )));
        }

        Ok(())
    }
}

impl Default for FrameGraphConfig {
    fn default() -> Self {
        Self {
            label: "frame_graph".to_string(),
            upload_arena_size: 4 * 1024 * 1024,
            readback_arena_size: 1024 * 1024,
            uniform_arena_size: 1024 * 1024,
            uniform_alignment: Self::DEFAULT_UNIFORM_ALIGNMENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = FrameGraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.uniform_alignment, 256);
    }

    #[test]
    fn test_builder() {
        let config = FrameGraphConfig::default()
            .with_label("offscreen")
            .with_upload_arena_size(1024)
            .with_readback_arena_size(2048)
            .with_uniform_arena_size(4096)
            .with_uniform_alignment(64);
        assert_eq!(config.label, "offscreen");
        assert_eq!(config.upload_arena_size, 1024);
        assert_eq!(config.readback_arena_size, 2048);
        assert_eq!(config.uniform_arena_size, 4096);
        assert_eq!(config.uniform_alignment, 64);
    }

    #[test]
    fn test_rejects_zero_size() {
        let config = FrameGraphConfig::default().with_readback_arena_size(0);
        assert!(matches!(
            config.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let config = FrameGraphConfig::default().with_uniform_alignment(100);
        assert!(config.validate().is_err());
    }
}
