//! WebGPU runtime
//!
//! Device discovery, the shared per-adapter client, and the shader
//! generation and pipeline infrastructure for buffer reductions.

mod cache;
mod client;
mod device;
mod runtime;
pub mod shaders;

pub use client::WgpuClient;
pub use device::WgpuDevice;
pub use runtime::{is_wgpu_available, subgroup_client};
