//! WebGPU device identification.
//!
//! `WgpuDevice` names an adapter by index and carries the adapter
//! properties the reduction needs (subgroup support and sizes, f16 support,
//! limits) once the adapter has been queried.
//!
//! # Thread Safety
//!
//! `WgpuDevice` is `Clone` and `Send + Sync`. The underlying adapter info
//! is cached on construction.

use std::fmt;
use std::sync::Arc;
use wgpu::{Adapter, Backend, Limits};

use crate::error::{Error, Result};

/// Subgroup size range assumed when subgroups are supported.
///
/// wgpu 28 does not report the adapter's subgroup sizes, so the reduction
/// sizes its temp array for the smallest size seen across vendors (NVIDIA
/// 32, AMD 32-64, Intel 8-32, Apple 32, software rasterizers 4+).
const ASSUMED_SUBGROUP_RANGE: (u32, u32) = (4, 64);

/// Cached adapter information for a WebGPU device.
#[derive(Clone, Debug)]
pub(crate) struct AdapterInfo {
    /// Adapter name (e.g., "NVIDIA GeForce RTX 4090")
    name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.)
    backend: Backend,
    /// Adapter limits until the client replaces them with the device's
    limits: Limits,
    /// Whether subgroup operations are supported
    subgroups_supported: bool,
    /// Whether `f16` in shaders is supported
    shader_f16_supported: bool,
    /// Minimum subgroup size (0 if not supported)
    min_subgroup_size: u32,
    /// Maximum subgroup size (0 if not supported)
    max_subgroup_size: u32,
}

impl AdapterInfo {
    /// Same adapter, with the limits the device was actually created with
    pub(crate) fn with_device_limits(&self, limits: Limits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            ..self.clone()
        })
    }
}

/// WebGPU device identifier.
///
/// The device index maps to the order of adapters returned by WebGPU
/// enumeration.
///
/// # Example
///
/// ```ignore
/// let device = WgpuDevice::new(0);  // First GPU
/// let client = WgpuClient::new(device)?;
/// println!("Device: {}", client.device().adapter_name());
/// ```
#[derive(Clone)]
pub struct WgpuDevice {
    /// Device index (adapter order)
    pub(crate) index: usize,
    /// Cached adapter info (populated by the client)
    info: Option<Arc<AdapterInfo>>,
}

impl WgpuDevice {
    /// Create a device identifier for the specified adapter index.
    ///
    /// This does not initialize the GPU - that happens when `WgpuClient::new`
    /// is called.
    pub fn new(index: usize) -> Self {
        Self { index, info: None }
    }

    pub(crate) fn with_info(index: usize, info: Arc<AdapterInfo>) -> Self {
        Self {
            index,
            info: Some(info),
        }
    }

    /// Adapter index
    pub fn id(&self) -> usize {
        self.index
    }

    /// Short device name, e.g. `wgpu:0`
    pub fn name(&self) -> String {
        format!("wgpu:{}", self.index)
    }

    /// Get the adapter name.
    ///
    /// Returns "unknown" if the device hasn't been initialized yet.
    pub fn adapter_name(&self) -> String {
        self.info
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the backend type (Vulkan, Metal, DX12, etc.).
    pub fn backend(&self) -> Option<Backend> {
        self.info.as_ref().map(|i| i.backend)
    }

    /// Get device limits.
    ///
    /// Returns default limits if the device hasn't been initialized yet.
    pub fn limits(&self) -> Limits {
        self.info
            .as_ref()
            .map(|i| i.limits.clone())
            .unwrap_or_default()
    }

    /// Check if subgroup operations are supported.
    pub fn subgroups_supported(&self) -> bool {
        self.info.as_ref().is_some_and(|i| i.subgroups_supported)
    }

    /// Check if `f16` can be used in shaders.
    pub fn shader_f16_supported(&self) -> bool {
        self.info.as_ref().is_some_and(|i| i.shader_f16_supported)
    }

    /// Get subgroup size range.
    ///
    /// Returns `(min, max)` or `(0, 0)` if subgroups are not supported.
    pub fn subgroup_size(&self) -> (u32, u32) {
        self.info
            .as_ref()
            .map(|i| (i.min_subgroup_size, i.max_subgroup_size))
            .unwrap_or((0, 0))
    }

    /// Get maximum workgroup size along x.
    pub fn max_workgroup_size(&self) -> u32 {
        self.limits().max_compute_workgroup_size_x
    }

    /// Get maximum workgroups per dispatch dimension.
    pub fn max_workgroups_per_dimension(&self) -> u32 {
        self.limits().max_compute_workgroups_per_dimension
    }

    /// Fail with [`Error::BackendLimitation`] unless a 1D workgroup of
    /// `workgroup_size` lanes using `workgroup_bytes` of workgroup memory
    /// fits this device.
    pub fn check_workgroup(&self, workgroup_size: u32, workgroup_bytes: u64) -> Result<()> {
        check_workgroup_limits(&self.limits(), workgroup_size, workgroup_bytes)
    }
}

fn check_workgroup_limits(
    limits: &Limits,
    workgroup_size: u32,
    workgroup_bytes: u64,
) -> Result<()> {
    let max_lanes = limits
        .max_compute_invocations_per_workgroup
        .min(limits.max_compute_workgroup_size_x);
    if workgroup_size > max_lanes {
        return Err(Error::backend_limitation(
            "wgpu",
            "reduce_buffer",
            format!("workgroup size {workgroup_size} exceeds the device limit of {max_lanes}"),
        ));
    }
    let max_bytes = limits.max_compute_workgroup_storage_size as u64;
    if workgroup_bytes > max_bytes {
        return Err(Error::backend_limitation(
            "wgpu",
            "reduce_buffer",
            format!(
                "{workgroup_bytes} bytes of workgroup memory exceed the device limit of {max_bytes}"
            ),
        ));
    }
    Ok(())
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("index", &self.index)
            .field("adapter", &self.adapter_name())
            .field("backend", &self.backend())
            .field("subgroups", &self.subgroup_size())
            .finish()
    }
}

// ============================================================================
// Adapter Discovery
// ============================================================================

/// Query adapter information for a device index.
pub(crate) async fn query_adapter_info(index: usize) -> Result<(Adapter, Arc<AdapterInfo>)> {
    let instance = wgpu::Instance::default();

    let mut adapters: Vec<_> = instance.enumerate_adapters(wgpu::Backends::all()).await;

    if adapters.is_empty() {
        return Err(Error::NoAdapter);
    }

    // Out-of-range indices fall back to the high-performance adapter
    let adapter = if index < adapters.len() {
        adapters.swap_remove(index)
    } else {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| Error::NoAdapter)?
    };

    let wgpu_info = adapter.get_info();
    let limits = adapter.limits();
    let features = adapter.features();

    let subgroups_supported = features.contains(wgpu::Features::SUBGROUP);
    let (min_subgroup_size, max_subgroup_size) = if subgroups_supported {
        ASSUMED_SUBGROUP_RANGE
    } else {
        (0, 0)
    };

    let info = Arc::new(AdapterInfo {
        name: wgpu_info.name,
        backend: wgpu_info.backend,
        limits,
        subgroups_supported,
        shader_f16_supported: features.contains(wgpu::Features::SHADER_F16),
        min_subgroup_size,
        max_subgroup_size,
    });

    Ok((adapter, info))
}

/// Query adapter information synchronously using pollster.
pub(crate) fn query_adapter_info_blocking(index: usize) -> Result<(Adapter, Arc<AdapterInfo>)> {
    pollster::block_on(query_adapter_info(index))
}
