//! WGSL compute shader infrastructure for buffer reductions
//!
//! # Module Structure
//!
//! - `generator` - WGSL source generation (workgroup reduction, module template)
//! - `linker` - module assembly, cache keys and naga validation
//! - `pipeline` - build-once pipeline cache and bind group helpers
//! - `reduce` - per-pass dispatch encoding

pub mod generator;
pub mod linker;
pub mod pipeline;
pub mod reduce;

pub use linker::{KernelKey, LinkRequest, LinkedModule, Linker, WgslLinker};
pub use pipeline::{LayoutKey, PipelineCache};
