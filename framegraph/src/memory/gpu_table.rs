//! Typed GPU tables indexed by stable element ids.

use std::marker::PhantomData;

use bytemuck::Pod;

use super::{ElementPool, GpuAddress, PersistentAllocation, PersistentStorage};
use crate::error::{GraphicsError, Result};
use crate::graph::PassContext;

/// A table of `CAPACITY` elements of `T` in persistent storage.
///
/// Element indices come from an [`ElementPool`]; element `i` lives at
/// `gpu_address().offset + i * size_of::<T>()`, so shaders index the table
/// with the same integer the CPU got back from [`insert`](Self::insert).
///
/// # Example
///
/// ```ignore
/// let mut lights = GpuTable::<PointLight, 256>::new(&mut storage)?;
/// let index = lights.insert(ctx, &PointLight::new(position, color))?;
/// ```
#[derive(Debug)]
pub struct GpuTable<T: Pod, const CAPACITY: usize> {
    pool: ElementPool<CAPACITY>,
    region: PersistentAllocation,
    _marker: PhantomData<T>,
}

impl<T: Pod, const CAPACITY: usize> GpuTable<T, CAPACITY> {
    const STRIDE: u64 = std::mem::size_of::<T>() as u64;

    /// Reserve the table's region in `storage`.
    pub fn new(storage: &mut PersistentStorage) -> Result<Self> {
        let alignment = (std::mem::align_of::<T>() as u64).max(16);
        let region = storage.allocate_region(Self::STRIDE * CAPACITY as u64, alignment)?;
        Ok(Self {
            pool: ElementPool::new(),
            region,
            _marker: PhantomData,
        })
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Check if the table has no live elements.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Maximum number of elements.
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Address of element 0.
    pub fn gpu_address(&self) -> GpuAddress {
        self.region.gpu_address()
    }

    /// Address of element `index`.
    pub fn element_address(&self, index: u32) -> Result<GpuAddress> {
        Ok(self.element(index)?.gpu_address())
    }

    /// Allocate an element and upload its initial value.
    ///
    /// The index is released again if the upload fails.
    pub fn insert<const N: usize>(
        &mut self,
        ctx: &mut PassContext<'_, N>,
        value: &T,
    ) -> Result<u32> {
        let index = self.pool.allocate()?;
        if let Err(e) = self.update(ctx, index, value) {
            self.pool.free(index)?;
            return Err(e);
        }
        Ok(index)
    }

    /// Upload a new value for a live element.
    pub fn update<const N: usize>(
        &self,
        ctx: &mut PassContext<'_, N>,
        index: u32,
        value: &T,
    ) -> Result<()> {
        self.element(index)?.update(ctx, bytemuck::bytes_of(value))
    }

    /// Release an element. Its GPU contents are left as they are.
    pub fn remove(&mut self, index: u32) -> Result<()> {
        self.pool.free(index)
    }

    fn element(&self, index: u32) -> Result<PersistentAllocation> {
        if !self.pool.is_allocated(index) {
            return Err(GraphicsError::InvalidParameter(format!(
                "table element {index} is not allocated"
            )));
        }
        self.region
            .sub_region(u64::from(index) * Self::STRIDE, Self::STRIDE)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::device::GraphicsDevice;
    use crate::types::BufferUsage;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Light {
        position: [f32; 4],
        color: [f32; 4],
    }

    #[test]
    fn test_table_layout() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut storage =
            PersistentStorage::new(&device, 4096, BufferUsage::STORAGE, "lights").unwrap();
        storage.allocate_region(8, 4).unwrap();

        let table = GpuTable::<Light, 8>::new(&mut storage).unwrap();
        assert_eq!(table.gpu_address().offset, 16);
        assert_eq!(table.capacity(), 8);
        assert!(table.is_empty());
        assert!(table.element_address(0).is_err());
        assert_eq!(storage.used(), 16 + 8 * 32);
    }

    #[test]
    fn test_table_too_large() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut storage =
            PersistentStorage::new(&device, 64, BufferUsage::STORAGE, "lights").unwrap();
        assert!(GpuTable::<Light, 8>::new(&mut storage).is_err());
    }
}
