//! Buffer reduction operations
//!
//! - [`binop`] - operators and element mapping functions
//! - [`plan`] - multi-pass planning, pure arithmetic over counts
//! - [`hosted`] - the hosted shader interface
//! - [`reduce_buffer`] - the [`ReduceBuffer`] orchestrator

pub mod binop;
pub mod hosted;
pub mod plan;
pub mod reduce_buffer;

pub use binop::{BinOp, MapFn};
pub use hosted::HostedShader;
pub use plan::{PassDescriptor, PassPlan, plan};
pub use reduce_buffer::{ReduceBuffer, ReduceBufferParams, ReduceState, ReduceTuning};
