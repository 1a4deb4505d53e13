//! Render graph for organizing rendering passes.
//!
//! The render graph owns the per-frame machinery: frame pacing, the
//! transient arenas, the registry of named resources and the dependency
//! manager. Passes are executed in insertion order; resource hazards
//! between them are resolved by barriers recorded as each pass touches a
//! resource, not by reordering.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::<2>::new(device, FrameGraphConfig::default())?;
//! graph.add_pass(GBufferPass::new());
//! graph.add_pass(LightingPass::new());
//!
//! loop {
//!     let mut output = graph.execute_frame()?;
//!     if let Some(mut picking) = output.take_readback("picking") {
//!         let id: u32 = { picking.sync(); picking.read_as()? };
//!     }
//! }
//! ```

mod pass;
mod resources;

pub use pass::{PassContext, RenderPass};
pub use resources::{GraphResources, InitReport};

use std::collections::HashMap;
use std::sync::Arc;

use pass::ScheduledReadbacks;

use crate::command::CommandList;
use crate::config::FrameGraphConfig;
use crate::dependency::DependencyManager;
use crate::device::GraphicsDevice;
use crate::error::Result;
use crate::frame::{FrameIndex, FramePacer};
use crate::memory::{FrameArenas, PersistentStorage};
use crate::readback::ReadbackFuture;
use crate::resources::{Buffer, BufferId, Texture, TextureId};
use crate::sync::ExecutionPoint;
use crate::types::BufferUsage;
use crate::{frame_mark, profile_plot, profile_scope};

/// Handle to a pass in the render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the pass in execution order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Results of one executed frame.
#[derive(Debug)]
pub struct FrameOutput<const N: usize> {
    frame: FrameIndex<N>,
    point: ExecutionPoint,
    init: InitReport,
    readbacks: HashMap<String, ReadbackFuture>,
}

impl<const N: usize> FrameOutput<N> {
    /// The frame that was executed.
    pub fn frame(&self) -> FrameIndex<N> {
        self.frame
    }

    /// Execution point of the frame's submission.
    pub fn point(&self) -> &ExecutionPoint {
        &self.point
    }

    /// What the registry created, recreated and reused this frame.
    pub fn init_report(&self) -> InitReport {
        self.init
    }

    /// A readback scheduled under `label`.
    pub fn readback(&mut self, label: &str) -> Option<&mut ReadbackFuture> {
        self.readbacks.get_mut(label)
    }

    /// Take ownership of a readback scheduled under `label`.
    pub fn take_readback(&mut self, label: &str) -> Option<ReadbackFuture> {
        self.readbacks.remove(label)
    }

    /// Labels of the readbacks still held by this output.
    pub fn readback_labels(&self) -> impl Iterator<Item = &str> {
        self.readbacks.keys().map(String::as_str)
    }
}

/// A render graph executing `N` frames in flight.
pub struct RenderGraph<const N: usize> {
    device: Arc<GraphicsDevice>,
    config: FrameGraphConfig,
    passes: Vec<Box<dyn RenderPass<N>>>,
    resources: GraphResources,
    dependencies: DependencyManager,
    arenas: FrameArenas<N>,
    pacer: FramePacer<N>,
}

impl<const N: usize> RenderGraph<N> {
    /// Create a render graph and its transient arenas.
    pub fn new(device: Arc<GraphicsDevice>, config: FrameGraphConfig) -> Result<Self> {
        config.validate()?;
        let arenas = FrameArenas::new(&device, &config)?;

        let mut dependencies = DependencyManager::new();
        for id in arenas.buffer_ids() {
            dependencies.track_buffer(id);
        }

        log::info!(
            "RenderGraph '{}' created: {} frames in flight, backend {}",
            config.label,
            N,
            device.backend_name()
        );

        Ok(Self {
            device,
            config,
            passes: Vec::new(),
            resources: GraphResources::new(),
            dependencies,
            arenas,
            pacer: FramePacer::new(),
        })
    }

    /// Append a pass. Passes execute in the order they were added.
    pub fn add_pass<P: RenderPass<N> + 'static>(&mut self, pass: P) -> PassHandle {
        let handle = PassHandle::new(self.passes.len() as u32);
        log::debug!("RenderGraph: added pass '{}' as {:?}", pass.name(), handle);
        self.passes.push(Box::new(pass));
        handle
    }

    /// Name of a pass.
    pub fn pass_name(&self, handle: PassHandle) -> Option<&str> {
        self.passes.get(handle.index()).map(|pass| pass.name())
    }

    /// Number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Track an externally owned buffer so passes can use it.
    ///
    /// The buffer starts in the undefined state.
    pub fn import_buffer(&mut self, buffer: &Buffer) -> BufferId {
        self.dependencies.track_buffer(buffer.id());
        buffer.id()
    }

    /// Track an externally owned texture so passes can use it.
    pub fn import_texture(&mut self, texture: &Texture) -> TextureId {
        self.dependencies.track_texture(texture.id());
        texture.id()
    }

    /// Stop tracking an imported buffer.
    pub fn release_buffer(&mut self, id: BufferId) -> bool {
        self.dependencies.untrack_buffer(id).is_some()
    }

    /// Stop tracking an imported texture.
    pub fn release_texture(&mut self, id: TextureId) -> bool {
        self.dependencies.untrack_texture(id).is_some()
    }

    /// Create persistent storage whose buffer is tracked by this graph.
    pub fn create_persistent_storage(
        &mut self,
        capacity: u64,
        usage: BufferUsage,
        label: &str,
    ) -> Result<PersistentStorage> {
        let storage = PersistentStorage::new(&self.device, capacity, usage, label)?;
        self.dependencies.track_buffer(storage.buffer().id());
        Ok(storage)
    }

    /// The device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// The configuration the graph was created with.
    pub fn config(&self) -> &FrameGraphConfig {
        &self.config
    }

    /// The registry of named resources.
    pub fn resources(&self) -> &GraphResources {
        &self.resources
    }

    /// The dependency manager.
    pub fn dependencies(&self) -> &DependencyManager {
        &self.dependencies
    }

    /// The transient arenas.
    pub fn arenas(&self) -> &FrameArenas<N> {
        &self.arenas
    }

    /// Number of frames started.
    pub fn frame_count(&self) -> u64 {
        self.pacer.frame_count()
    }

    /// Build, record and submit one frame.
    ///
    /// Waits until the ring slot of the frame is free, then runs every
    /// pass through registration, initialization and rendering, and
    /// submits the recorded commands.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a pass, the registry or the
    /// device. Nothing is submitted in that case and the access history is
    /// restored to what it was before the passes rendered.
    pub fn execute_frame(&mut self) -> Result<FrameOutput<N>> {
        profile_scope!("RenderGraph::execute_frame");

        let frame = self.pacer.begin_frame();
        let (init, point, scheduled) = match self.record_and_submit(frame) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Frame {} aborted: {}", frame.number(), e);
                self.pacer
                    .end_frame(frame, self.device.timeline().last_submitted());
                return Err(e);
            }
        };
        self.pacer.end_frame(frame, point.clone());

        let readbacks = scheduled
            .into_iter()
            .map(|(label, scheduler)| (label, scheduler.into_future(point.clone())))
            .collect();

        log::trace!(
            "Frame {} submitted as point {} ({:?})",
            frame.number(),
            point.value(),
            init
        );
        profile_plot!("upload_arena_used", self.arenas.upload.used(&frame));
        profile_plot!("uniform_arena_used", self.arenas.uniform.used(&frame));
        frame_mark!();

        Ok(FrameOutput {
            frame,
            point,
            init,
            readbacks,
        })
    }

    fn record_and_submit(
        &mut self,
        frame: FrameIndex<N>,
    ) -> Result<(InitReport, ExecutionPoint, ScheduledReadbacks)> {
        let init = self.build_resources()?;

        let snapshot = self.dependencies.clone();
        let mut commands =
            CommandList::new().with_label(format!("{} #{}", self.config.label, frame.number()));
        let mut scheduled = ScheduledReadbacks::new();

        let submitted = self
            .render_passes(frame, &mut commands, &mut scheduled)
            .and_then(|()| {
                profile_scope!("submit");
                self.device.submit(commands)
            });

        match submitted {
            Ok(point) => Ok((init, point, scheduled)),
            Err(e) => {
                self.dependencies = snapshot;
                Err(e)
            }
        }
    }

    fn build_resources(&mut self) -> Result<InitReport> {
        self.resources.begin_build();
        {
            profile_scope!("register_resources");
            for pass in &mut self.passes {
                pass.register_resources(&mut self.resources)
                    .inspect_err(|e| log::error!("Pass '{}' registration failed: {}", pass.name(), e))?;
            }
        }

        let init = {
            profile_scope!("init_resources");
            self.resources
                .init_resources(&self.device, &mut self.dependencies)?
        };

        for pass in &mut self.passes {
            pass.initialize(&self.resources)
                .inspect_err(|e| log::error!("Pass '{}' initialization failed: {}", pass.name(), e))?;
        }
        Ok(init)
    }

    fn render_passes(
        &mut self,
        frame: FrameIndex<N>,
        commands: &mut CommandList,
        scheduled: &mut ScheduledReadbacks,
    ) -> Result<()> {
        for pass in &mut self.passes {
            profile_scope!("render_pass");
            log::trace!("Rendering pass '{}'", pass.name());
            let mut ctx = PassContext::new(
                frame,
                &self.device,
                &self.resources,
                &mut self.dependencies,
                commands,
                &mut self.arenas,
                scheduled,
            );
            pass.render(&mut ctx)
                .inspect_err(|e| log::error!("Pass '{}' render failed: {}", pass.name(), e))?;
        }
        Ok(())
    }

    /// Block until every submitted frame completed.
    pub fn wait_idle(&self) {
        self.pacer.wait_idle();
        self.device.collect_retired();
    }

    /// Wait for the GPU and destroy every registry resource.
    pub fn shutdown(&mut self) {
        self.wait_idle();
        self.resources.destroy_resources(&mut self.dependencies);
        log::info!(
            "RenderGraph '{}' shut down after {} frames",
            self.config.label,
            self.pacer.frame_count()
        );
    }
}

impl<const N: usize> Drop for RenderGraph<N> {
    /// Frames still in flight may reference registry and arena buffers, so
    /// they go to the device's retire list instead of being destroyed here.
    fn drop(&mut self) {
        let retired = self
            .resources
            .retire_resources(&self.device, &mut self.dependencies)
            + self.arenas.retire_buffers(&self.device);
        log::debug!(
            "RenderGraph '{}' dropped, {} resources retired ({} awaiting the GPU)",
            self.config.label,
            retired,
            self.device.retired_count()
        );
    }
}

impl<const N: usize> std::fmt::Debug for RenderGraph<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("label", &self.config.label)
            .field("frames_in_flight", &N)
            .field("passes", &self.passes.len())
            .field("frame_count", &self.pacer.frame_count())
            .finish()
    }
}
