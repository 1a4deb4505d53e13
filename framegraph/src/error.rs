//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the frame graph.
///
/// Graph-wiring mistakes (unregistered names, exhausted fixed-capacity pools,
/// reading a readback before it completed) are reported through this type
/// instead of aborting. Unless its documentation says otherwise, an operation
/// that returns an error leaves the state it was called on unchanged.
/// [`GraphResources::init_resources`](crate::GraphResources::init_resources)
/// is the exception: it may fail after recreating some names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// A pass referenced a graph resource that was not registered this build.
    #[error("graph resource '{name}' was not registered in the current build")]
    UnregisteredResource {
        /// Name of the resource.
        name: String,
    },
    /// Graph resources were accessed before `init_resources` ran for this build.
    #[error("graph resources accessed before init_resources")]
    ResourcesNotInitialized,
    /// A barrier was requested for a resource the dependency manager does not know.
    #[error("resource {resource} is not tracked by the dependency manager")]
    UntrackedResource {
        /// Debug description of the resource identity.
        resource: String,
    },
    /// Two passes declared incompatible requirements for the same graph resource.
    #[error("conflicting requirements for graph resource '{name}': {detail}")]
    ConflictingRequirements {
        /// Name of the resource.
        name: String,
        /// What did not match.
        detail: String,
    },
    /// A transient arena slot ran out of space.
    #[error("arena '{label}' exhausted: requested {requested} bytes, {available} available")]
    ArenaExhausted {
        /// Arena label.
        label: String,
        /// Requested size including alignment padding.
        requested: u64,
        /// Bytes still available in the slot.
        available: u64,
    },
    /// A fixed-capacity element pool has no free slots left.
    #[error("element pool exhausted (capacity {capacity})")]
    PoolExhausted {
        /// Pool capacity.
        capacity: usize,
    },
    /// The persistent storage buffer has no room for the requested region.
    #[error("persistent storage exhausted: requested {requested} bytes, {available} available")]
    StorageExhausted {
        /// Requested size including alignment padding.
        requested: u64,
        /// Bytes still available.
        available: u64,
    },
    /// A readback was read before its execution point was observed as complete.
    #[error("readback read before its execution point was synced")]
    ReadbackNotSynced,
    /// A readback read asked for more bytes than were scheduled.
    #[error("readback of {requested} bytes exceeds scheduled size {size}")]
    ReadbackOutOfRange {
        /// Requested byte count.
        requested: u64,
        /// Scheduled allocation size.
        size: u64,
    },
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// The device backing a resource no longer exists.
    #[error("GPU device lost")]
    DeviceLost,
    /// The backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphicsError>;
