//! WebGPU Client implementation.
//!
//! `WgpuClient` owns the WebGPU device, its queue and the pipeline cache
//! shared by every reduction session on that device.
//!
//! # Thread Safety
//!
//! `WgpuClient` is `Clone`; clones share the device, queue, cache and the
//! device-lost flag.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

use super::cache::get_or_create_client;
use super::device::{WgpuDevice, query_adapter_info_blocking};
use super::shaders::PipelineCache;
use crate::error::{Error, Result};

const WAIT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// WgpuClient
// ============================================================================

/// WebGPU client.
///
/// All reductions are submitted through this client's queue. Buffers it
/// creates belong to its device and cannot be bound on another one.
#[derive(Clone)]
pub struct WgpuClient {
    /// GPU device identifier
    pub(crate) device_id: WgpuDevice,

    /// WebGPU device handle
    pub(crate) wgpu_device: Arc<Device>,

    /// WebGPU queue for command submission
    pub(crate) queue: Arc<Queue>,

    /// Pipeline cache for compute shaders
    pub(crate) pipeline_cache: Arc<PipelineCache>,

    /// Set by the device-lost callback
    lost: Arc<DeviceLostFlag>,
}

#[derive(Default)]
struct DeviceLostFlag {
    lost: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl std::fmt::Debug for WgpuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuClient")
            .field("device", &self.device_id)
            .field("lost", &self.is_lost())
            .finish_non_exhaustive()
    }
}

impl WgpuClient {
    /// Get the shared client for a device.
    ///
    /// The first call per adapter index creates the WebGPU device; later
    /// calls return a clone sharing device, queue and pipeline cache.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No suitable GPU adapter is found
    /// - Device creation fails
    pub fn new(device: WgpuDevice) -> Result<Self> {
        get_or_create_client(&device)
    }

    /// Create a client with its own WebGPU device, bypassing the cache.
    pub fn new_uncached(device: WgpuDevice) -> Result<Self> {
        let (adapter, info) = query_adapter_info_blocking(device.index)?;

        let (wgpu_device, queue) = pollster::block_on(async {
            let features = adapter.features();
            let mut required_features = wgpu::Features::empty();
            for optional in [wgpu::Features::SUBGROUP, wgpu::Features::SHADER_F16] {
                if features.contains(optional) {
                    required_features |= optional;
                }
            }

            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("wgreduce WebGPU Device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                    experimental_features: wgpu::ExperimentalFeatures::default(),
                })
                .await
        })
        .map_err(|e| Error::Device(format!("{:?}", e)))?;

        let lost = Arc::new(DeviceLostFlag::default());
        let flag = lost.clone();
        let index = device.index;
        wgpu_device.set_device_lost_callback(move |reason, message| {
            tracing::warn!(device = index, ?reason, %message, "WebGPU device lost");
            *flag.reason.lock() = Some(format!("{reason:?}: {message}"));
            flag.lost.store(true, Ordering::Release);
        });

        let wgpu_device = Arc::new(wgpu_device);
        let queue = Arc::new(queue);
        let pipeline_cache = Arc::new(PipelineCache::new(wgpu_device.clone()));
        let device_with_info =
            WgpuDevice::with_info(device.index, info.with_device_limits(wgpu_device.limits()));

        tracing::debug!(device = ?device_with_info, "created WebGPU client");

        Ok(Self {
            device_id: device_with_info,
            wgpu_device,
            queue,
            pipeline_cache,
            lost,
        })
    }

    /// Device identifier with adapter info
    #[inline]
    pub fn device(&self) -> &WgpuDevice {
        &self.device_id
    }

    /// Get reference to the WebGPU device.
    #[inline]
    pub fn wgpu_device(&self) -> &Device {
        &self.wgpu_device
    }

    /// Get reference to the WebGPU queue.
    #[inline]
    pub fn wgpu_queue(&self) -> &Queue {
        &self.queue
    }

    /// Get reference to the pipeline cache.
    #[inline]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Whether the device-lost callback has fired
    pub fn is_lost(&self) -> bool {
        self.lost.lost.load(Ordering::Acquire)
    }

    /// Fail with [`Error::DeviceLost`] once the device is gone
    pub fn check_alive(&self) -> Result<()> {
        if self.is_lost() {
            let reason = self
                .lost
                .reason
                .lock()
                .clone()
                .unwrap_or_else(|| "unknown reason".to_string());
            return Err(Error::DeviceLost(reason));
        }
        Ok(())
    }

    /// Create a storage buffer.
    ///
    /// Storage buffers can be read/written by compute shaders and are valid
    /// copy sources and destinations.
    pub fn create_storage_buffer(&self, label: &str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Create a staging buffer for CPU readback.
    pub fn create_staging_buffer(&self, label: &str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer for shader parameters.
    pub fn create_uniform_buffer(&self, label: &str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a storage buffer holding `data`.
    ///
    /// The size is rounded up to 4 bytes as WebGPU requires.
    pub fn create_storage_buffer_with<T: bytemuck::Pod>(&self, label: &str, data: &[T]) -> Buffer {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = (bytes.len() as u64).div_ceil(4) * 4;
        let buffer = self.create_storage_buffer(label, size.max(4));
        if bytes.len() % 4 == 0 {
            self.queue.write_buffer(&buffer, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(size as usize, 0);
            self.queue.write_buffer(&buffer, 0, &padded);
        }
        buffer
    }

    /// Write data to the start of a buffer.
    pub fn write_buffer<T: bytemuck::Pod>(&self, buffer: &Buffer, data: &[T]) {
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(data));
    }

    /// Submit commands and wait for completion.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.check_alive()?;
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(WAIT_TIMEOUT),
            })
            .map_err(|e| Error::Backend(format!("GPU poll failed after submit: {e}")))?;
        self.check_alive()
    }

    /// Read buffer data back to CPU (blocking).
    ///
    /// `staging` must be a `MAP_READ` buffer at least as large as `output`.
    pub fn read_buffer<T: bytemuck::Pod>(&self, staging: &Buffer, output: &mut [T]) -> Result<()> {
        self.check_alive()?;
        let slice = staging.slice(..);

        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(WAIT_TIMEOUT),
            })
            .map_err(|e| Error::Backend(format!("GPU poll failed during buffer read: {e}")))?;

        let map_result = receiver.recv().map_err(|_| {
            Error::Backend("map_async callback was not invoked during buffer read".into())
        })?;
        map_result.map_err(|e| Error::Backend(format!("map_async failed during buffer read: {e}")))?;

        let copied = {
            let data = slice.get_mapped_range();
            copy_mapped(&data, output)
        };
        staging.unmap();
        copied
    }

    /// Copy `len` bytes of `source` at `offset` to the CPU.
    ///
    /// `offset` and `len` must be multiples of 4.
    pub fn read_bytes(&self, source: &Buffer, offset: u64, len: u64) -> Result<Vec<u8>> {
        let staging = self.create_staging_buffer("wgreduce_readback", len);
        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wgreduce_readback"),
            });
        encoder.copy_buffer_to_buffer(source, offset, &staging, 0, len);
        self.submit_and_wait(encoder)?;

        let mut bytes = vec![0u8; len as usize];
        self.read_buffer(&staging, &mut bytes)?;
        Ok(bytes)
    }
}

/// Copy the start of a mapped range into `output`
fn copy_mapped<T: bytemuck::Pod>(data: &[u8], output: &mut [T]) -> Result<()> {
    let src: &[T] = bytemuck::try_cast_slice(data)
        .map_err(|e| Error::Backend(format!("mapped range has wrong layout: {e}")))?;
    if src.len() < output.len() {
        return Err(Error::Backend(format!(
            "staging buffer holds {} elements, {} requested",
            src.len(),
            output.len()
        )));
    }
    output.copy_from_slice(&src[..output.len()]);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
