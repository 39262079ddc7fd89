//! WGSL shader generation for buffer reductions
//!
//! WGSL has no templates, so every (operator, type, workgroup size, subgroup
//! size) combination is generated as text.
//!
//! # Architecture
//!
//! ```text
//! ReductionConfig ──generate_workgroup_reduce──▶ GeneratedKernel (one fn)
//!        │
//!        └──generate_reduce_buffer_shader──▶ complete module with
//!                                            bindings and entry point
//! ```
//!
//! Generated modules are cached by fingerprint in the pipeline cache.

pub mod common;
pub mod reduce;
pub mod reduce_buffer;

pub use common::{module_header, wgsl_type};
pub use reduce::{
    DEFAULT_BASE_NAME, GeneratedKernel, Naming, ReductionConfig, ReductionConfigBuilder,
    TempStorage, builtin_structs, generate_workgroup_reduce,
};
pub use reduce_buffer::{REDUCE_BUFFER_ENTRY_POINT, ReduceParams, generate_reduce_buffer_shader};
