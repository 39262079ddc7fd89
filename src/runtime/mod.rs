//! Compute backends
//!
//! Buffer reductions run on WebGPU through [`wgpu`].

pub mod wgpu;
