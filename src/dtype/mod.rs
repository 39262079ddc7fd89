//! Scalar type system for reduction kernels
//!
//! `ScalarType` names the element type of the buffers being reduced. Each
//! variant maps to one WGSL scalar type; the literals needed by the operator
//! presets (zero, one, lowest, highest) are spelled here so every generator
//! writes them the same way.

mod element;

pub use element::Element;

use std::fmt;

// ============================================================================
// ScalarType Enum
// ============================================================================

/// Element types a reduction kernel can be generated for
///
/// | ScalarType | WGSL Type | Notes |
/// |------------|-----------|-------|
/// | F32        | f32       | Always available |
/// | I32        | i32       | Always available |
/// | U32        | u32       | Always available |
/// | F16        | f16       | Requires `wgpu::Features::SHADER_F16` |
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum ScalarType {
    /// 32-bit floating point (most common)
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 32-bit signed integer
    I32 = 11,
    /// 32-bit unsigned integer
    U32 = 21,
}

impl ScalarType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F16 => 2,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// Returns true if this is an integer type
    #[inline]
    pub const fn is_int(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }

    /// WGSL type name; also used as the fingerprint component
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I32 => "i32",
            Self::U32 => "u32",
        }
    }

    /// WGSL literal for zero
    pub const fn zero_literal(self) -> &'static str {
        match self {
            Self::F32 => "0.0",
            Self::F16 => "0.0h",
            Self::I32 => "0i",
            Self::U32 => "0u",
        }
    }

    /// WGSL literal for one
    pub const fn one_literal(self) -> &'static str {
        match self {
            Self::F32 => "1.0",
            Self::F16 => "1.0h",
            Self::I32 => "1i",
            Self::U32 => "1u",
        }
    }

    /// WGSL literal for the largest finite value
    pub const fn max_literal(self) -> &'static str {
        match self {
            Self::F32 => "3.40282347e+38",
            Self::F16 => "65504.0h",
            Self::I32 => "2147483647i",
            Self::U32 => "4294967295u",
        }
    }

    /// WGSL literal for the lowest finite value
    ///
    /// `-2147483648i` is not a valid literal (the magnitude overflows before
    /// negation), so the i32 minimum goes through an abstract-int conversion.
    pub const fn min_literal(self) -> &'static str {
        match self {
            Self::F32 => "-3.40282347e+38",
            Self::F16 => "-65504.0h",
            Self::I32 => "i32(-2147483648)",
            Self::U32 => "0u",
        }
    }

    /// WGSL enable directive the type needs, if any
    pub const fn enable_directive(self) -> Option<&'static str> {
        match self {
            Self::F16 => Some("enable f16;"),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}
