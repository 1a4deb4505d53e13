//! Common types shared across the graphics system.

/// 3D extent for textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Component-wise maximum of two extents.
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
            depth: self.depth.max(other.depth),
        }
    }

    /// Number of texels covered by the extent.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_max() {
        let a = Extent3d::new_2d(256, 512);
        let b = Extent3d::new_3d(512, 128, 4);
        assert_eq!(a.max(b), Extent3d::new_3d(512, 512, 4));
    }

    #[test]
    fn test_texel_count() {
        assert_eq!(Extent3d::new_2d(4, 4).texel_count(), 16);
        assert_eq!(Extent3d::new_3d(2, 2, 2).texel_count(), 8);
    }
}
