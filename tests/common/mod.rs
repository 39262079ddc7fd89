//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use rand::Rng;
use wgpu::Buffer;
use wgreduce::runtime::wgpu::{WgpuClient, subgroup_client};

/// Shared client on a subgroup-capable adapter, or `None` to skip the test
pub fn setup() -> Option<WgpuClient> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let client = subgroup_client();
    if client.is_none() {
        println!("No subgroup-capable WebGPU adapter, skipping test");
    }
    client
}

/// Upload `data` into a fresh storage buffer
pub fn upload<T: bytemuck::Pod>(client: &WgpuClient, label: &str, data: &[T]) -> Arc<Buffer> {
    Arc::new(client.create_storage_buffer_with(label, data))
}

/// Read `count` values of `T` from the start of `buffer`
pub fn download<T: bytemuck::Pod>(client: &WgpuClient, buffer: &Buffer, count: usize) -> Vec<T> {
    let len = (count * std::mem::size_of::<T>()) as u64;
    let bytes = client
        .read_bytes(buffer, 0, len.div_ceil(4) * 4)
        .expect("readback");
    bytemuck::pod_collect_to_vec(&bytes[..count * std::mem::size_of::<T>()])
}

/// Uniform random u32 values below `bound`
pub fn random_u32(n: usize, bound: u32) -> Vec<u32> {
    let mut rng = rand::rng();
    (0..n).map(|_| rng.random_range(0..bound)).collect()
}

/// Uniform random i32 values in `[-bound, bound)`
pub fn random_i32(n: usize, bound: i32) -> Vec<i32> {
    let mut rng = rand::rng();
    (0..n).map(|_| rng.random_range(-bound..bound)).collect()
}

/// Small integers stored as f32, so sums stay exact
pub fn random_small_f32(n: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..n).map(|_| rng.random_range(0..8) as f32).collect()
}
