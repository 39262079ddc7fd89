#![allow(dead_code)]

use fluxbench::{Bencher, flux};
use std::hint::black_box;
use std::sync::Arc;

use wgreduce::ops::plan;
use wgreduce::prelude::*;
use wgreduce::runtime::wgpu::subgroup_client;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rand_vec_f32(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| ((i * 17 + 3) % 1000) as f32 / 1000.0)
        .collect()
}

fn rand_vec_u32(n: usize) -> Vec<u32> {
    (0..n).map(|i| ((i * 31 + 7) % 100) as u32).collect()
}

/// Session reducing `data`, or `None` without a subgroup-capable GPU
fn gpu_reducer<T: Element>(data: &[T], binop: BinOp) -> Option<ReduceBuffer<T>> {
    let client = subgroup_client()?;
    let input = Arc::new(client.create_storage_buffer_with("bench_input", data));
    let mut reducer = ReduceBuffer::<T>::new(ReduceBufferParams::new(client, input, binop)).ok()?;
    // Build outside the timed loop
    reducer.reduce().ok()?;
    Some(reducer)
}

fn bench_gpu_sum_f32(b: &mut Bencher, n: usize) {
    let Some(mut reducer) = gpu_reducer(&rand_vec_f32(n), BinOp::sum(ScalarType::F32)) else {
        return;
    };
    b.iter(|| black_box(reducer.reduce().unwrap()));
}

fn bench_cpu_sum_f32(b: &mut Bencher, n: usize) {
    let data = rand_vec_f32(n);
    b.iter(|| black_box(data.iter().sum::<f32>()));
}

// ---------------------------------------------------------------------------
// wgreduce: f32 sum, encode + submit + readback
// ---------------------------------------------------------------------------

#[flux::bench(group = "sum_f32")]
fn gpu_sum_1k(b: &mut Bencher) {
    bench_gpu_sum_f32(b, 1000);
}

#[flux::bench(group = "sum_f32")]
fn gpu_sum_100k(b: &mut Bencher) {
    bench_gpu_sum_f32(b, 100_000);
}

#[flux::bench(group = "sum_f32")]
fn gpu_sum_1m(b: &mut Bencher) {
    bench_gpu_sum_f32(b, 1_000_000);
}

#[flux::bench(group = "sum_f32")]
fn gpu_sum_10m(b: &mut Bencher) {
    bench_gpu_sum_f32(b, 10_000_000);
}

// ---------------------------------------------------------------------------
// Host baseline
// ---------------------------------------------------------------------------

#[flux::bench(group = "sum_f32")]
fn cpu_sum_1m(b: &mut Bencher) {
    bench_cpu_sum_f32(b, 1_000_000);
}

#[flux::bench(group = "sum_f32")]
fn cpu_sum_10m(b: &mut Bencher) {
    bench_cpu_sum_f32(b, 10_000_000);
}

// ---------------------------------------------------------------------------
// wgreduce: other operators
// ---------------------------------------------------------------------------

#[flux::bench(group = "max_u32")]
fn gpu_max_u32_1m(b: &mut Bencher) {
    let Some(mut reducer) = gpu_reducer(&rand_vec_u32(1_000_000), BinOp::max(ScalarType::U32))
    else {
        return;
    };
    b.iter(|| black_box(reducer.reduce().unwrap()));
}

#[flux::bench(group = "max_u32")]
fn gpu_sum_squares_u32_1m(b: &mut Bencher) {
    let Some(client) = subgroup_client() else {
        return;
    };
    let input = Arc::new(client.create_storage_buffer_with("bench_input", &rand_vec_u32(1_000_000)));
    let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::U32))
        .map_fn(MapFn::new("value * value").unwrap());
    let mut reducer = ReduceBuffer::<u32>::new(params).unwrap();
    reducer.reduce().unwrap();
    b.iter(|| black_box(reducer.reduce().unwrap()));
}

// ---------------------------------------------------------------------------
// Planning (host only)
// ---------------------------------------------------------------------------

#[flux::bench(group = "plan")]
fn plan_10m(b: &mut Bencher) {
    b.iter(|| black_box(plan(black_box(10_000_000), 1024, 256).unwrap()));
}

#[flux::bench(group = "plan")]
fn plan_max_u32(b: &mut Bencher) {
    b.iter(|| black_box(plan(black_box(u32::MAX as u64), 1024, 256).unwrap()));
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

#[flux::compare(
    id = "sum_1m",
    title = "Sum 1M f32 (GPU vs host)",
    benchmarks = ["gpu_sum_1m", "cpu_sum_1m"],
    baseline = "cpu_sum_1m",
    metric = "mean"
)]
struct Sum1M;

#[flux::compare(
    id = "sum_10m",
    title = "Sum 10M f32 (GPU vs host)",
    benchmarks = ["gpu_sum_10m", "cpu_sum_10m"],
    baseline = "cpu_sum_10m",
    metric = "mean"
)]
struct Sum10M;

// ---------------------------------------------------------------------------
// Scaling series
// ---------------------------------------------------------------------------

#[flux::compare(id = "rscale_1k", title = "Reduce Scaling", benchmarks = ["gpu_sum_1k"], group = "reduce_scaling", x = "1000")]
struct RScale1K;

#[flux::compare(id = "rscale_100k", title = "Reduce Scaling", benchmarks = ["gpu_sum_100k"], group = "reduce_scaling", x = "100000")]
struct RScale100K;

#[flux::compare(id = "rscale_1m", title = "Reduce Scaling", benchmarks = ["gpu_sum_1m"], group = "reduce_scaling", x = "1000000")]
struct RScale1M;

#[flux::compare(id = "rscale_10m", title = "Reduce Scaling", benchmarks = ["gpu_sum_10m"], group = "reduce_scaling", x = "10000000")]
struct RScale10M;

fn main() {
    fluxbench_cli::run().unwrap();
}
