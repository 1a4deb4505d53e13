//! Named graph-scoped resources.
//!
//! Every frame, passes declare the textures and buffers they need by name
//! through [`GraphResources::register_texture`] / [`GraphResources::register_buffer`].
//! Declarations of the same name are merged: usage flags are unioned and
//! extents take the maximum. [`GraphResources::init_resources`] then compares
//! the merged requirements with those of the existing backing resource and
//! only recreates on a mismatch. A recreation destroys the old resource before
//! the new one is created.
//!
//! Names nobody registered in the current build keep their backing resource,
//! so a pass skipped for a few frames does not cause churn, but they cannot be
//! looked up until registered again.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::{BufferAccess, TextureAccess};
use crate::dependency::DependencyManager;
use crate::device::GraphicsDevice;
use crate::error::{GraphicsError, Result};
use crate::resources::{Buffer, BufferId, Texture, TextureId};
use crate::types::{BufferDescriptor, BufferUsage, Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// Merged requirements of one named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    Texture {
        format: TextureFormat,
        size: Extent3d,
        usage: TextureUsage,
    },
    Buffer {
        size: u64,
        usage: BufferUsage,
    },
}

impl Requirement {
    fn kind(&self) -> &'static str {
        match self {
            Self::Texture { .. } => "texture",
            Self::Buffer { .. } => "buffer",
        }
    }

    /// Merge another declaration into this one.
    fn merge(self, name: &str, other: Self) -> Result<Self> {
        match (self, other) {
            (
                Self::Texture {
                    format,
                    size,
                    usage,
                },
                Self::Texture {
                    format: other_format,
                    size: other_size,
                    usage: other_usage,
                },
            ) => {
                if format != other_format {
                    return Err(GraphicsError::ConflictingRequirements {
                        name: name.to_string(),
                        detail: format!("format {format:?} vs {other_format:?}"),
                    });
                }
                Ok(Self::Texture {
                    format,
                    size: size.max(other_size),
                    usage: usage | other_usage,
                })
            }
            (
                Self::Buffer { size, usage },
                Self::Buffer {
                    size: other_size,
                    usage: other_usage,
                },
            ) => Ok(Self::Buffer {
                size: size.max(other_size),
                usage: usage | other_usage,
            }),
            (a, b) => Err(GraphicsError::ConflictingRequirements {
                name: name.to_string(),
                detail: format!("registered as {} and {}", a.kind(), b.kind()),
            }),
        }
    }
}

#[derive(Debug)]
enum Backing {
    Texture(Texture),
    Buffer(Buffer),
}

#[derive(Debug)]
struct Entry {
    /// Merged declarations of the current build.
    requested: Option<Requirement>,
    /// Requirements the backing resource was created with.
    created_with: Option<Requirement>,
    backing: Option<Backing>,
    generation: u64,
}

/// Outcome of one [`GraphResources::init_resources`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Resources created for names without a backing resource.
    pub created: usize,
    /// Resources destroyed and recreated because requirements changed.
    pub recreated: usize,
    /// Resources kept from the previous build.
    pub reused: usize,
}

/// Registry of named graph-scoped resources.
#[derive(Debug, Default)]
pub struct GraphResources {
    entries: HashMap<String, Entry>,
    builds: u64,
    initialized: bool,
    recreations: u64,
}

impl GraphResources {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new build, forgetting every declaration of the previous one.
    pub fn begin_build(&mut self) {
        self.builds += 1;
        self.initialized = false;
        for entry in self.entries.values_mut() {
            entry.requested = None;
        }
    }

    /// Number of builds started.
    pub fn build_count(&self) -> u64 {
        self.builds
    }

    /// Declare a 2D texture.
    pub fn register_texture(
        &mut self,
        name: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
        access: TextureAccess,
    ) -> Result<()> {
        self.register_texture_3d(name, format, width, height, 1, access)
    }

    /// Declare a 3D texture.
    pub fn register_texture_3d(
        &mut self,
        name: &str,
        format: TextureFormat,
        width: u32,
        height: u32,
        depth: u32,
        access: TextureAccess,
    ) -> Result<()> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture '{name}' has a zero dimension ({width}x{height}x{depth})"
            )));
        }
        self.register(
            name,
            Requirement::Texture {
                format,
                size: Extent3d::new_3d(width, height, depth),
                usage: access.required_usage(),
            },
        )
    }

    /// Declare a buffer.
    pub fn register_buffer(&mut self, name: &str, size: u64, access: BufferAccess) -> Result<()> {
        if size == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{name}' has zero size"
            )));
        }
        self.register(
            name,
            Requirement::Buffer {
                size,
                usage: access.required_usage(),
            },
        )
    }

    fn register(&mut self, name: &str, requirement: Requirement) -> Result<()> {
        let entry = self.entries.entry(name.to_string()).or_insert_with(|| Entry {
            requested: None,
            created_with: None,
            backing: None,
            generation: 0,
        });

        let merged = match entry.requested {
            Some(existing) => existing.merge(name, requirement)?,
            None => requirement,
        };
        entry.requested = Some(merged);
        self.initialized = false;

        log::trace!("GraphResources: '{}' now requires {:?}", name, merged);
        Ok(())
    }

    /// Create or recreate backing resources for every name registered this build.
    ///
    /// New backing resources are tracked in `deps`; destroyed ones are untracked.
    /// Before the first resource is destroyed, this blocks until every
    /// submission on the device's timeline has completed, since any of them
    /// may still reference it.
    ///
    /// # Errors
    ///
    /// Returns the device error if a resource cannot be created. This call is
    /// not atomic: names handled before the failing one keep their new
    /// backing, and the failing name is left without backing. Lookups report
    /// [`GraphicsError::ResourcesNotInitialized`] until a later call succeeds,
    /// which creates whatever is still missing.
    pub fn init_resources(
        &mut self,
        device: &Arc<GraphicsDevice>,
        deps: &mut DependencyManager,
    ) -> Result<InitReport> {
        let mut report = InitReport::default();
        let mut drained = false;

        for (name, entry) in &mut self.entries {
            let Some(requirement) = entry.requested else {
                continue;
            };

            if entry.backing.is_some() && entry.created_with == Some(requirement) {
                report.reused += 1;
                continue;
            }

            if let Some(old) = entry.backing.take() {
                if !drained {
                    let in_flight = device.timeline().last_submitted();
                    if !in_flight.is_complete() {
                        log::debug!(
                            "GraphResources: waiting for point {} before recreating '{}'",
                            in_flight.value(),
                            name
                        );
                        in_flight.wait();
                    }
                    drained = true;
                }
                log::debug!(
                    "GraphResources: recreating '{}': {:?} -> {:?}",
                    name,
                    entry.created_with,
                    requirement
                );
                match &old {
                    Backing::Texture(texture) => {
                        deps.untrack_texture(texture.id());
                    }
                    Backing::Buffer(buffer) => {
                        deps.untrack_buffer(buffer.id());
                    }
                }
                drop(old);
                entry.created_with = None;
                report.recreated += 1;
                self.recreations += 1;
            } else {
                log::debug!("GraphResources: creating '{}': {:?}", name, requirement);
                report.created += 1;
            }

            let backing = match requirement {
                Requirement::Texture {
                    format,
                    size,
                    usage,
                } => {
                    let descriptor =
                        TextureDescriptor::new_3d(size.width, size.height, size.depth, format, usage)
                            .with_label(name.as_str());
                    let texture = device.create_texture(&descriptor)?;
                    deps.track_texture(texture.id());
                    Backing::Texture(texture)
                }
                Requirement::Buffer { size, usage } => {
                    let descriptor = BufferDescriptor::new(size, usage).with_label(name.as_str());
                    let buffer = device.create_buffer(&descriptor)?;
                    deps.track_buffer(buffer.id());
                    Backing::Buffer(buffer)
                }
            };

            entry.backing = Some(backing);
            entry.created_with = Some(requirement);
            entry.generation += 1;
        }

        self.initialized = true;
        log::trace!("GraphResources: build {} initialized: {:?}", self.builds, report);
        Ok(report)
    }

    /// Destroy every backing resource and forget every name.
    pub fn destroy_resources(&mut self, deps: &mut DependencyManager) {
        for (name, entry) in self.entries.drain() {
            match entry.backing {
                Some(Backing::Texture(texture)) => {
                    deps.untrack_texture(texture.id());
                }
                Some(Backing::Buffer(buffer)) => {
                    deps.untrack_buffer(buffer.id());
                }
                None => {}
            }
            log::trace!("GraphResources: destroyed '{}'", name);
        }
        self.initialized = false;
    }

    /// Hand every backing resource to the device for deferred destruction
    /// and forget every name.
    ///
    /// Unlike [`destroy_resources`](Self::destroy_resources) this does not
    /// require the GPU to be idle. Returns how many resources were handed over.
    pub fn retire_resources(&mut self, device: &GraphicsDevice, deps: &mut DependencyManager) -> usize {
        let mut retired = 0;
        for (_, entry) in self.entries.drain() {
            match entry.backing {
                Some(Backing::Texture(texture)) => {
                    deps.untrack_texture(texture.id());
                    device.retire_texture(texture);
                    retired += 1;
                }
                Some(Backing::Buffer(buffer)) => {
                    deps.untrack_buffer(buffer.id());
                    device.retire_buffer(buffer);
                    retired += 1;
                }
                None => {}
            }
        }
        self.initialized = false;
        retired
    }

    fn lookup(&self, name: &str) -> Result<&Backing> {
        if !self.initialized {
            return Err(GraphicsError::ResourcesNotInitialized);
        }
        self.entries
            .get(name)
            .filter(|entry| entry.requested.is_some())
            .and_then(|entry| entry.backing.as_ref())
            .ok_or_else(|| GraphicsError::UnregisteredResource {
                name: name.to_string(),
            })
    }

    /// The backing texture of a name registered this build.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::ResourcesNotInitialized`] before `init_resources`
    /// - [`GraphicsError::UnregisteredResource`] if the name was not registered
    ///   as a texture this build
    pub fn texture(&self, name: &str) -> Result<&Texture> {
        match self.lookup(name)? {
            Backing::Texture(texture) => Ok(texture),
            Backing::Buffer(_) => Err(GraphicsError::UnregisteredResource {
                name: name.to_string(),
            }),
        }
    }

    /// The backing buffer of a name registered this build.
    ///
    /// # Errors
    ///
    /// Same as [`texture`](Self::texture).
    pub fn buffer(&self, name: &str) -> Result<&Buffer> {
        match self.lookup(name)? {
            Backing::Buffer(buffer) => Ok(buffer),
            Backing::Texture(_) => Err(GraphicsError::UnregisteredResource {
                name: name.to_string(),
            }),
        }
    }

    /// Shorthand for `texture(name)?.id()`.
    pub fn texture_id(&self, name: &str) -> Result<TextureId> {
        Ok(self.texture(name)?.id())
    }

    /// Shorthand for `buffer(name)?.id()`.
    pub fn buffer_id(&self, name: &str) -> Result<BufferId> {
        Ok(self.buffer(name)?.id())
    }

    /// Check if a name was registered this build.
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.requested.is_some())
    }

    /// Number of (re)creations of a name's backing resource.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|entry| entry.generation)
    }

    /// Total recreations caused by changed requirements.
    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    /// Number of names with a backing resource.
    pub fn resident_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.backing.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, ResourceEvent, ResourceKey};

    fn setup() -> (Arc<DummyBackend>, Arc<GraphicsDevice>, GraphResources, DependencyManager) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(backend.clone());
        (backend, device, GraphResources::new(), DependencyManager::new())
    }

    #[test]
    fn test_unchanged_requirements_reuse() {
        let (_backend, device, mut res, mut deps) = setup();

        for build in 0..3 {
            res.begin_build();
            res.register_texture(
                "A",
                TextureFormat::Rgba8Unorm,
                256,
                256,
                TextureAccess::RenderTargetWrite,
            )
            .unwrap();
            let report = res.init_resources(&device, &mut deps).unwrap();
            if build == 0 {
                assert_eq!(report.created, 1);
            } else {
                assert_eq!(report.reused, 1);
            }
        }

        assert_eq!(res.recreation_count(), 0);
        assert_eq!(res.generation("A"), Some(1));
    }

    #[test]
    fn test_merge_takes_union() {
        let (_backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_texture("hdr", TextureFormat::Rgba16Float, 128, 64, TextureAccess::RenderTargetWrite)
            .unwrap();
        res.register_texture("hdr", TextureFormat::Rgba16Float, 64, 128, TextureAccess::ShaderRead)
            .unwrap();
        res.init_resources(&device, &mut deps).unwrap();

        let texture = res.texture("hdr").unwrap();
        assert_eq!((texture.width(), texture.height()), (128, 128));
        assert!(texture.usage().contains(
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
        ));
        assert!(deps.is_texture_tracked(texture.id()));
    }

    #[test]
    fn test_format_conflict() {
        let (_backend, _device, mut res, _deps) = setup();
        res.begin_build();
        res.register_texture("A", TextureFormat::Rgba8Unorm, 4, 4, TextureAccess::ShaderRead)
            .unwrap();
        let err = res
            .register_texture("A", TextureFormat::R32Float, 4, 4, TextureAccess::ShaderRead)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ConflictingRequirements { .. }));

        let err = res
            .register_buffer("A", 16, BufferAccess::StorageRead)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ConflictingRequirements { .. }));
    }

    #[test]
    fn test_usage_change_recreates() {
        let (_backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_buffer("particles", 1024, BufferAccess::StorageWrite)
            .unwrap();
        res.init_resources(&device, &mut deps).unwrap();

        res.begin_build();
        res.register_buffer("particles", 1024, BufferAccess::StorageWrite)
            .unwrap();
        res.register_buffer("particles", 512, BufferAccess::VertexBuffer)
            .unwrap();
        let report = res.init_resources(&device, &mut deps).unwrap();
        assert_eq!(report.recreated, 1);
        assert_eq!(res.buffer("particles").unwrap().size(), 1024);
        assert_eq!(res.generation("particles"), Some(2));
    }

    #[test]
    fn test_recreation_destroys_first() {
        let (backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_texture("A", TextureFormat::Rgba8Unorm, 4, 4, TextureAccess::ShaderRead)
            .unwrap();
        res.init_resources(&device, &mut deps).unwrap();
        let old = res.texture_id("A").unwrap();

        backend.clear_events();
        res.begin_build();
        res.register_texture("A", TextureFormat::Rgba8Unorm, 8, 4, TextureAccess::ShaderRead)
            .unwrap();
        res.init_resources(&device, &mut deps).unwrap();
        let new = res.texture_id("A").unwrap();

        let events = backend.events();
        assert_eq!(
            events[0],
            ResourceEvent::Destroyed {
                key: ResourceKey::Texture(old),
            }
        );
        assert!(matches!(
            events[1],
            ResourceEvent::Created { key: ResourceKey::Texture(id), .. } if id == new
        ));
        assert!(!deps.is_texture_tracked(old));
        assert!(deps.is_texture_tracked(new));
    }

    #[test]
    fn test_lookup_errors() {
        let (_backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_buffer("b", 64, BufferAccess::UniformRead).unwrap();
        assert_eq!(
            res.buffer("b").unwrap_err(),
            GraphicsError::ResourcesNotInitialized
        );

        res.init_resources(&device, &mut deps).unwrap();
        assert!(res.buffer("b").is_ok());
        assert!(matches!(
            res.texture("b"),
            Err(GraphicsError::UnregisteredResource { .. })
        ));
        assert!(matches!(
            res.buffer("missing"),
            Err(GraphicsError::UnregisteredResource { .. })
        ));
    }

    #[test]
    fn test_omitted_name_keeps_backing() {
        let (backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_buffer("b", 64, BufferAccess::UniformRead).unwrap();
        res.init_resources(&device, &mut deps).unwrap();

        res.begin_build();
        res.init_resources(&device, &mut deps).unwrap();
        assert!(!res.is_registered("b"));
        assert!(res.buffer("b").is_err());
        assert_eq!(res.resident_count(), 1);

        res.begin_build();
        res.register_buffer("b", 64, BufferAccess::UniformRead).unwrap();
        let report = res.init_resources(&device, &mut deps).unwrap();
        assert_eq!(report.reused, 1);
        assert_eq!(backend.buffer_count(), 1);
    }

    #[test]
    fn test_failed_init_completes_on_retry() {
        let (backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_texture("a", TextureFormat::Rgba8Unorm, 16, 16, TextureAccess::ShaderRead)
            .unwrap();
        res.register_texture("huge", TextureFormat::Rgba8Unorm, 20000, 1, TextureAccess::ShaderRead)
            .unwrap();
        assert!(matches!(
            res.init_resources(&device, &mut deps),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(
            res.texture("a").unwrap_err(),
            GraphicsError::ResourcesNotInitialized
        );
        assert_eq!(res.generation("huge"), Some(0));

        res.begin_build();
        res.register_texture("a", TextureFormat::Rgba8Unorm, 16, 16, TextureAccess::ShaderRead)
            .unwrap();
        res.register_texture("huge", TextureFormat::Rgba8Unorm, 16, 1, TextureAccess::ShaderRead)
            .unwrap();
        let report = res.init_resources(&device, &mut deps).unwrap();
        assert_eq!(report.created + report.reused, 2);
        assert_eq!(report.recreated, 0);
        assert_eq!(res.resident_count(), 2);
        assert_eq!(backend.texture_count(), 2);
    }

    #[test]
    fn test_destroy_resources() {
        let (backend, device, mut res, mut deps) = setup();
        res.begin_build();
        res.register_buffer("b", 64, BufferAccess::UniformRead).unwrap();
        res.register_texture("t", TextureFormat::R8Unorm, 2, 2, TextureAccess::ShaderRead)
            .unwrap();
        res.init_resources(&device, &mut deps).unwrap();
        assert_eq!(deps.buffer_count() + deps.texture_count(), 2);

        res.destroy_resources(&mut deps);
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(backend.texture_count(), 0);
        assert_eq!(deps.buffer_count() + deps.texture_count(), 0);
        assert_eq!(res.resident_count(), 0);
    }
}
