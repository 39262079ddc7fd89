//! WGSL compute pipeline infrastructure
//!
//! Pipelines are keyed by [`KernelKey`] and built at most once per key, no
//! matter how many sessions ask for them concurrently. Bind group layouts
//! are cached next to them.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, ComputePipeline,
    ComputePipelineDescriptor, Device, PipelineLayoutDescriptor, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

use super::linker::{KernelKey, LinkedModule};
use crate::error::Result;

// ============================================================================
// Build-once map
// ============================================================================

/// Map whose values are built at most once per key.
///
/// A caller that finds a build in flight for its key blocks until it
/// finishes. A failed build leaves the slot empty for the next caller.
pub(crate) struct BuildOnceMap<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
    builds: AtomicU64,
}

impl<K: Clone + Eq + Hash, V> BuildOnceMap<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            builds: AtomicU64::new(0),
        }
    }

    /// Return the value for `key`, running `build` if there is none yet
    pub(crate) fn get_or_try_build<F>(&self, key: &K, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        // Only the slot lookup holds the map lock; builds run outside it
        let slot = self
            .slots
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let value = slot.get_or_try_init(|| {
            let value = build()?;
            self.builds.fetch_add(1, Ordering::Relaxed);
            Ok::<_, crate::error::Error>(Arc::new(value))
        })?;
        Ok(value.clone())
    }

    /// Cached value for `key`, if built
    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        self.slots.lock().get(key).and_then(|s| s.get().cloned())
    }

    /// Drop the entry for `key`; returns whether a built value was removed
    pub(crate) fn remove(&self, key: &K) -> bool {
        self.slots
            .lock()
            .remove(key)
            .is_some_and(|slot| slot.get().is_some())
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub(crate) fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Pipeline Cache
// ============================================================================

/// Key for bind group layout cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    /// Number of read-only storage buffers, bound first
    pub num_read_only_storage: u32,
    /// Number of uniform buffers, bound after the read-only storage
    pub num_uniform_buffers: u32,
    /// Number of read-write storage buffers, bound last
    pub num_storage_buffers: u32,
}

impl LayoutKey {
    /// Layout of the reduce-buffer module: input, params, output
    pub const REDUCE_BUFFER: Self = Self {
        num_read_only_storage: 1,
        num_uniform_buffers: 1,
        num_storage_buffers: 1,
    };
}

/// Cache for compute pipelines and bind group layouts on one device
pub struct PipelineCache {
    device: Arc<Device>,
    /// Built pipelines by kernel key
    pipelines: BuildOnceMap<KernelKey, ComputePipeline>,
    /// Cached bind group layouts by layout key
    layouts: Mutex<HashMap<LayoutKey, Arc<BindGroupLayout>>>,
}

impl PipelineCache {
    /// Create an empty cache for `device`
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            pipelines: BuildOnceMap::new(),
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Return the pipeline for `module`, compiling it on first use.
    ///
    /// `validate` runs only when the pipeline is actually built, so a
    /// cached key costs neither validation nor compilation.
    pub fn get_or_build<F>(
        &self,
        module: &LinkedModule,
        layout: &BindGroupLayout,
        validate: F,
    ) -> Result<Arc<ComputePipeline>>
    where
        F: FnOnce(&LinkedModule) -> Result<()>,
    {
        self.pipelines.get_or_try_build(module.key(), || {
            validate(module)?;
            tracing::info!(key = %module.key(), "building reduction pipeline");
            Ok(self.build_pipeline(module, layout))
        })
    }

    fn build_pipeline(&self, module: &LinkedModule, layout: &BindGroupLayout) -> ComputePipeline {
        let label = module.key().to_string();
        let shader = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(&label),
            source: ShaderSource::Wgsl(module.source().into()),
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(&format!("{label}_layout")),
                bind_group_layouts: &[layout],
                immediate_size: 0, // Not using push constants
            });

        self.device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(module.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            })
    }

    /// Cached pipeline for `key`, if built
    pub fn get(&self, key: &KernelKey) -> Option<Arc<ComputePipeline>> {
        self.pipelines.get(key)
    }

    /// Remove the pipeline for `key`.
    ///
    /// Sessions already holding it keep a valid handle; the device object is
    /// released when the last one drops it.
    pub fn evict(&self, key: &KernelKey) -> bool {
        let removed = self.pipelines.remove(key);
        if removed {
            tracing::info!(%key, "evicted reduction pipeline");
        }
        removed
    }

    /// Remove every cached pipeline
    pub fn clear(&self) {
        self.pipelines.clear();
    }

    /// Number of cached pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// True when no pipeline is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pipelines compiled since the cache was created
    pub fn build_count(&self) -> u64 {
        self.pipelines.build_count()
    }

    /// Get or create a bind group layout
    pub fn get_or_create_layout(&self, key: LayoutKey) -> Arc<BindGroupLayout> {
        let mut layouts = self.layouts.lock();

        if let Some(layout) = layouts.get(&key) {
            return layout.clone();
        }

        let buffer_entry = |binding: u32, ty: BufferBindingType| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let mut entries = Vec::new();
        for _ in 0..key.num_read_only_storage {
            entries.push(buffer_entry(
                entries.len() as u32,
                BufferBindingType::Storage { read_only: true },
            ));
        }
        for _ in 0..key.num_uniform_buffers {
            entries.push(buffer_entry(entries.len() as u32, BufferBindingType::Uniform));
        }
        for _ in 0..key.num_storage_buffers {
            entries.push(buffer_entry(
                entries.len() as u32,
                BufferBindingType::Storage { read_only: false },
            ));
        }

        let layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("reduce_buffer_layout"),
                entries: &entries,
            });

        let layout = Arc::new(layout);
        layouts.insert(key, layout.clone());
        layout
    }

    /// Create a bind group from buffers, bound in order from binding 0
    pub fn create_bind_group(&self, layout: &BindGroupLayout, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("reduce_buffer_bind_group"),
            layout,
            entries: &entries,
        })
    }

    /// Get device reference
    pub fn device(&self) -> &Device {
        &self.device
    }
}
