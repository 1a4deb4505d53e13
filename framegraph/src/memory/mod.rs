//! CPU-visible and GPU-resident memory sub-allocation.
//!
//! - [`TransientArena`] - per-frame bump allocator over `N` ring slots
//! - [`PersistentStorage`] - forward-only bump allocator over one long-lived buffer
//! - [`ElementPool`] - fixed-capacity index allocator with an embedded free list
//! - [`GpuTable`] - typed table combining the two previous ones

mod element_pool;
mod gpu_table;
mod persistent;
mod transient;

pub use element_pool::ElementPool;
pub use gpu_table::GpuTable;
pub use persistent::{GpuAddress, PersistentAllocation, PersistentStorage};
pub use transient::{ArenaKind, FrameArenas, TransientAllocation, TransientArena};

/// Align a value up to the given alignment.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
