//! Element trait for mapping Rust types to ScalarType

use super::ScalarType;
use bytemuck::{Pod, Zeroable};

/// Trait for Rust types that can be read back from a reduction
///
/// This trait connects Rust's type system to the runtime `ScalarType` used
/// by the kernel generator.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - Basic trait requirements
/// - `Pod + Zeroable` - Safe memory transmutation of mapped buffers (bytemuck)
/// - `PartialOrd + Debug` - Comparison and diagnostics in tests
pub trait Element:
    Copy + Send + Sync + Pod + Zeroable + PartialOrd + std::fmt::Debug + 'static
{
    /// The corresponding ScalarType for this Rust type
    const SCALAR: ScalarType;
}

impl Element for f32 {
    const SCALAR: ScalarType = ScalarType::F32;
}

impl Element for i32 {
    const SCALAR: ScalarType = ScalarType::I32;
}

impl Element for u32 {
    const SCALAR: ScalarType = ScalarType::U32;
}

#[cfg(feature = "f16")]
impl Element for half::f16 {
    const SCALAR: ScalarType = ScalarType::F16;
}
