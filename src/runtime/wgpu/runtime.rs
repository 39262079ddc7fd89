//! Runtime availability probes

use super::client::WgpuClient;
use super::device::{WgpuDevice, query_adapter_info_blocking};

/// Whether any WebGPU adapter can be opened.
///
/// Tests and benchmarks use this to skip when no GPU is present.
pub fn is_wgpu_available() -> bool {
    query_adapter_info_blocking(0).is_ok()
}

/// Shared client for the first adapter, if it supports subgroup operations.
///
/// Buffer reductions need subgroups; this is the client they should run on.
pub fn subgroup_client() -> Option<WgpuClient> {
    let client = WgpuClient::new(WgpuDevice::new(0)).ok()?;
    if client.device().subgroups_supported() {
        Some(client)
    } else {
        tracing::debug!(device = ?client.device(), "adapter lacks subgroup support");
        None
    }
}
