//! Global client cache for the WebGPU runtime

use super::client::WgpuClient;
use super::device::WgpuDevice;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Global client cache: device index -> cached WgpuClient
static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, WgpuClient>>> = OnceLock::new();

/// Get or create a cached WgpuClient for a device.
///
/// This ensures only one live `wgpu::Device` exists per device index, so
/// every session on an adapter shares one pipeline cache and buffers can be
/// bound across sessions. A client whose device was lost is replaced.
pub(super) fn get_or_create_client(device: &WgpuDevice) -> Result<WgpuClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache_guard = cache.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(client) = cache_guard.get(&device.index) {
        if !client.is_lost() {
            return Ok(client.clone());
        }
        tracing::info!(device = device.index, "replacing client of lost device");
    }

    let client = WgpuClient::new_uncached(device.clone())?;
    cache_guard.insert(device.index, client.clone());

    Ok(client)
}
