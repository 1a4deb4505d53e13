//! Common utilities for frame graph integration tests.
//!
//! Every test runs against the dummy backend, either executing submissions
//! immediately or queueing them until the test completes them explicitly.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_framegraph::backend::dummy::DummyBackend;
use redlilium_framegraph::{FrameGraphConfig, GraphicsDevice, RenderGraph};

// ============================================================================
// Backend Modes
// ============================================================================

/// How the dummy backend retires submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Submissions execute and complete during `submit`.
    Immediate,
    /// Submissions complete only when the test calls `complete()`.
    Deferred,
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context holding a dummy backend and the device built on it.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: Arc<GraphicsDevice>,
    pub mode: Mode,
}

impl TestContext {
    /// Create a context for the given mode.
    pub fn new(mode: Mode) -> Self {
        init_logger();
        let backend = Arc::new(match mode {
            Mode::Immediate => DummyBackend::new(),
            Mode::Deferred => DummyBackend::deferred(),
        });
        let device = GraphicsDevice::new(backend.clone());
        Self {
            backend,
            device,
            mode,
        }
    }

    /// Small arenas so tests stay cheap.
    pub fn config(&self) -> FrameGraphConfig {
        FrameGraphConfig::default()
            .with_label("test_graph")
            .with_upload_arena_size(64 * 1024)
            .with_readback_arena_size(64 * 1024)
            .with_uniform_arena_size(16 * 1024)
    }

    /// Create a render graph on this context's device.
    pub fn create_graph<const N: usize>(&self) -> RenderGraph<N> {
        RenderGraph::new(self.device.clone(), self.config()).expect("Failed to create graph")
    }

    /// Complete queued submissions in deferred mode.
    pub fn complete(&self) {
        self.backend
            .complete_submissions()
            .expect("Queued submission failed");
    }
}

/// Initialize logging once for the test binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Data Helpers
// ============================================================================

/// Generate a recognizable byte pattern.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 + 3) as u8).collect()
}
