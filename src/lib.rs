//! # wgreduce
//!
//! **Multi-pass GPU buffer reductions on WebGPU, with generated WGSL.**
//!
//! wgreduce reduces a GPU buffer of scalars to one value (sum, product, min,
//! max, or any associative operator with a matching subgroup builtin). Each
//! workgroup reduces its tile with subgroup operations and a shared-memory
//! tree; further passes reduce the per-workgroup results until one value is
//! left.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wgreduce::prelude::*;
//!
//! let client = WgpuClient::new(WgpuDevice::new(0))?;
//! let values: Vec<f32> = (0..1_000_000).map(|i| i as f32).collect();
//! let input = Arc::new(client.create_storage_buffer_with("values", &values));
//!
//! let params = ReduceBufferParams::new(client, input, BinOp::max(ScalarType::F32));
//! let mut reducer = ReduceBuffer::<f32>::new(params)?;
//! assert_eq!(reducer.reduce()?, 999_999.0);
//! ```
//!
//! ## Layers
//!
//! - [`runtime::wgpu::shaders::generator`]: WGSL text generation, pure
//! - [`ops::plan`]: pass planning, pure
//! - [`runtime::wgpu::shaders::pipeline`]: build-once pipeline cache per device
//! - [`ops::reduce_buffer`]: the orchestrator tying them together
//!
//! ## Feature Flags
//!
//! - `f16`: `half::f16` elements (requires `SHADER_F16` on the device)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod runtime;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{Element, ScalarType};
    pub use crate::error::{Error, Result};
    pub use crate::ops::{
        BinOp, HostedShader, MapFn, PassPlan, ReduceBuffer, ReduceBufferParams, ReduceState,
        ReduceTuning,
    };
    pub use crate::runtime::wgpu::{WgpuClient, WgpuDevice, is_wgpu_available};
}
