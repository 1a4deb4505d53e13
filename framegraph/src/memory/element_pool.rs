//! Fixed-capacity index allocator.
//!
//! Free slots form a singly linked list threaded through the pool's own
//! storage: the cell of a free slot holds the index of the next free slot,
//! [`ElementPool::INVALID`] terminating the list. Allocation pops the head,
//! freeing pushes onto it, both in O(1). Indices stay stable for as long as
//! they are allocated, so GPU-side tables can be indexed by them directly.

use crate::error::{GraphicsError, Result};

/// Fixed-capacity pool of `CAPACITY` indices.
///
/// # Example
///
/// ```ignore
/// let mut lights = ElementPool::<256>::new();
/// let index = lights.allocate()?;
/// // ... write light `index` into the GPU table ...
/// lights.free(index)?;
/// ```
#[derive(Debug, Clone)]
pub struct ElementPool<const CAPACITY: usize> {
    next: Box<[u32]>,
    allocated: Box<[bool]>,
    head: u32,
    len: usize,
}

impl<const CAPACITY: usize> ElementPool<CAPACITY> {
    /// End-of-list marker.
    pub const INVALID: u32 = u32::MAX;

    const FITS_U32: () = assert!(
        CAPACITY < u32::MAX as usize,
        "element pool capacity must be representable as u32"
    );

    /// Create a pool with every slot free.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FITS_U32;
        let mut pool = Self {
            next: vec![Self::INVALID; CAPACITY].into_boxed_slice(),
            allocated: vec![false; CAPACITY].into_boxed_slice(),
            head: Self::INVALID,
            len: 0,
        };
        pool.reset();
        pool
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Number of allocated slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no slot is allocated.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if every slot is allocated.
    pub fn is_full(&self) -> bool {
        self.head == Self::INVALID
    }

    /// Check if `index` is currently allocated.
    pub fn is_allocated(&self, index: u32) -> bool {
        self.allocated.get(index as usize).copied().unwrap_or(false)
    }

    /// Pop the head of the free list.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::PoolExhausted`] if every slot is allocated.
    pub fn allocate(&mut self) -> Result<u32> {
        if self.head == Self::INVALID {
            return Err(GraphicsError::PoolExhausted { capacity: CAPACITY });
        }

        let index = self.head;
        self.head = self.next[index as usize];
        self.next[index as usize] = Self::INVALID;
        self.allocated[index as usize] = true;
        self.len += 1;
        Ok(index)
    }

    /// Push `index` back onto the free list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `index` is out of range or not
    /// allocated. The pool is unchanged in that case.
    pub fn free(&mut self, index: u32) -> Result<()> {
        if !self.is_allocated(index) {
            return Err(GraphicsError::InvalidParameter(format!(
                "element {index} is not allocated (capacity {CAPACITY})"
            )));
        }

        self.next[index as usize] = self.head;
        self.allocated[index as usize] = false;
        self.head = index;
        self.len -= 1;
        Ok(())
    }

    /// Free every slot, rebuilding the list as `0 -> 1 -> ... -> CAPACITY-1`.
    pub fn reset(&mut self) {
        for (i, cell) in self.next.iter_mut().enumerate() {
            *cell = if i + 1 < CAPACITY {
                (i + 1) as u32
            } else {
                Self::INVALID
            };
        }
        self.allocated.fill(false);
        self.head = if CAPACITY == 0 { Self::INVALID } else { 0 };
        self.len = 0;
    }
}

impl<const CAPACITY: usize> Default for ElementPool<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
