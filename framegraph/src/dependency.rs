//! Automatic barrier generation.
//!
//! The [`DependencyManager`] keeps the last known `(access, stage)` of every
//! tracked texture and buffer. Each request for a new access emits a barrier
//! from the recorded state to the requested one and overwrites the record.
//!
//! Barriers are emitted unconditionally, including when the recorded and
//! requested states are identical; eliding redundant barriers is left to the
//! command encoder.
//!
//! Histories are keyed by resource identity, not by graph name, so two names
//! only share a history if they resolve to the same physical resource.
//! Resources must be registered with `track_*` before their first barrier.

use std::collections::HashMap;

use crate::access::{BufferAccess, BufferState, PipelineStage, TextureAccess, TextureState};
use crate::command::{BufferBarrier, CommandEncoder, TextureBarrier};
use crate::error::{GraphicsError, Result};
use crate::resources::{BufferId, TextureId};

/// Per-resource access history driving barrier emission.
///
/// Mutated only by the thread building the frame.
#[derive(Debug, Clone, Default)]
pub struct DependencyManager {
    textures: HashMap<TextureId, TextureState>,
    buffers: HashMap<BufferId, BufferState>,
}

impl DependencyManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a texture in the undefined state.
    ///
    /// Tracking an already tracked texture resets it to undefined.
    pub fn track_texture(&mut self, id: TextureId) {
        log::trace!("DependencyManager: tracking texture {:?}", id);
        self.textures.insert(id, TextureState::UNDEFINED);
    }

    /// Start tracking a buffer in the undefined state.
    ///
    /// Tracking an already tracked buffer resets it to undefined.
    pub fn track_buffer(&mut self, id: BufferId) {
        log::trace!("DependencyManager: tracking buffer {:?}", id);
        self.buffers.insert(id, BufferState::UNDEFINED);
    }

    /// Stop tracking a texture, returning its last state.
    pub fn untrack_texture(&mut self, id: TextureId) -> Option<TextureState> {
        self.textures.remove(&id)
    }

    /// Stop tracking a buffer, returning its last state.
    pub fn untrack_buffer(&mut self, id: BufferId) -> Option<BufferState> {
        self.buffers.remove(&id)
    }

    /// Check if a texture is tracked.
    pub fn is_texture_tracked(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    /// Check if a buffer is tracked.
    pub fn is_buffer_tracked(&self, id: BufferId) -> bool {
        self.buffers.contains_key(&id)
    }

    /// Recorded state of a texture.
    pub fn texture_state(&self, id: TextureId) -> Option<TextureState> {
        self.textures.get(&id).copied()
    }

    /// Recorded state of a buffer.
    pub fn buffer_state(&self, id: BufferId) -> Option<BufferState> {
        self.buffers.get(&id).copied()
    }

    /// Transition a texture to `access` in `stage`.
    ///
    /// Emits the barrier through `encoder` and records the new state.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::UntrackedResource`] if the texture was never
    /// tracked. Nothing is emitted in that case.
    pub fn texture_barrier(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        id: TextureId,
        access: TextureAccess,
        stage: PipelineStage,
    ) -> Result<TextureBarrier> {
        let record = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::UntrackedResource {
                resource: format!("{id:?}"),
            })?;

        let to = TextureState::new(access, stage);
        let barrier = TextureBarrier {
            texture: id,
            from: *record,
            to,
        };
        *record = to;

        log::trace!(
            "Texture barrier {:?}: {:?}/{:?} -> {:?}/{:?}",
            id,
            barrier.from.access,
            barrier.from.stage,
            access,
            stage
        );
        encoder.texture_dependency(barrier);
        Ok(barrier)
    }

    /// Transition a buffer to `access` in `stage`.
    ///
    /// Emits the barrier through `encoder` and records the new state.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::UntrackedResource`] if the buffer was never
    /// tracked. Nothing is emitted in that case.
    pub fn buffer_barrier(
        &mut self,
        encoder: &mut dyn CommandEncoder,
        id: BufferId,
        access: BufferAccess,
        stage: PipelineStage,
    ) -> Result<BufferBarrier> {
        let record = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::UntrackedResource {
                resource: format!("{id:?}"),
            })?;

        let to = BufferState::new(access, stage);
        let barrier = BufferBarrier {
            buffer: id,
            from: *record,
            to,
        };
        *record = to;

        log::trace!(
            "Buffer barrier {:?}: {:?}/{:?} -> {:?}/{:?}",
            id,
            barrier.from.access,
            barrier.from.stage,
            access,
            stage
        );
        encoder.buffer_dependency(barrier);
        Ok(barrier)
    }

    /// Return every tracked resource to the undefined state.
    pub fn reset_states(&mut self) {
        self.textures
            .values_mut()
            .for_each(|s| *s = TextureState::UNDEFINED);
        self.buffers
            .values_mut()
            .for_each(|s| *s = BufferState::UNDEFINED);
    }

    /// Number of tracked textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of tracked buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandList};

    const COLOR_OUT: PipelineStage = PipelineStage::COLOR_ATTACHMENT_OUTPUT;
    const FRAGMENT: PipelineStage = PipelineStage::FRAGMENT_SHADER;

    #[test]
    fn test_first_barrier_from_undefined() {
        let mut deps = DependencyManager::new();
        let mut list = CommandList::new();
        deps.track_texture(TextureId(1));

        let barrier = deps
            .texture_barrier(&mut list, TextureId(1), TextureAccess::RenderTargetWrite, COLOR_OUT)
            .unwrap();
        assert_eq!(barrier.from, TextureState::UNDEFINED);
        assert_eq!(list.barrier_count(), 1);
    }

    #[test]
    fn test_from_equals_previous_request() {
        let mut deps = DependencyManager::new();
        let mut list = CommandList::new();
        deps.track_texture(TextureId(1));
        deps.track_texture(TextureId(2));

        deps.texture_barrier(&mut list, TextureId(1), TextureAccess::RenderTargetWrite, COLOR_OUT)
            .unwrap();
        // Touching another texture in between must not disturb the history.
        deps.texture_barrier(&mut list, TextureId(2), TextureAccess::ShaderRead, FRAGMENT)
            .unwrap();
        let barrier = deps
            .texture_barrier(&mut list, TextureId(1), TextureAccess::ShaderRead, FRAGMENT)
            .unwrap();

        assert_eq!(
            barrier.from,
            TextureState::new(TextureAccess::RenderTargetWrite, COLOR_OUT)
        );
        assert_eq!(
            deps.texture_state(TextureId(1)),
            Some(TextureState::new(TextureAccess::ShaderRead, FRAGMENT))
        );
    }

    #[test]
    fn test_identical_states_still_emit() {
        let mut deps = DependencyManager::new();
        let mut list = CommandList::new();
        deps.track_buffer(BufferId(4));

        for _ in 0..3 {
            deps.buffer_barrier(
                &mut list,
                BufferId(4),
                BufferAccess::StorageRead,
                PipelineStage::COMPUTE_SHADER,
            )
            .unwrap();
        }
        assert_eq!(list.barrier_count(), 3);

        let last = list.buffer_barriers().last().copied().unwrap();
        assert_eq!(last.from, last.to);
    }

    #[test]
    fn test_untracked_is_error() {
        let mut deps = DependencyManager::new();
        let mut list = CommandList::new();

        let result = deps.texture_barrier(
            &mut list,
            TextureId(99),
            TextureAccess::ShaderRead,
            FRAGMENT,
        );
        assert!(matches!(result, Err(GraphicsError::UntrackedResource { .. })));
        assert!(list.is_empty());
    }

    #[test]
    fn test_reset_and_untrack() {
        let mut deps = DependencyManager::new();
        let mut list = CommandList::new();
        deps.track_buffer(BufferId(1));
        deps.buffer_barrier(
            &mut list,
            BufferId(1),
            BufferAccess::TransferWrite,
            PipelineStage::TRANSFER,
        )
        .unwrap();

        deps.reset_states();
        assert_eq!(deps.buffer_state(BufferId(1)), Some(BufferState::UNDEFINED));

        assert!(deps.untrack_buffer(BufferId(1)).is_some());
        assert!(!deps.is_buffer_tracked(BufferId(1)));
        assert!(matches!(
            list.commands()[0],
            Command::BufferBarrier(BufferBarrier { buffer: BufferId(1), .. })
        ));
    }
}
