//! Reduction operators and element mapping functions
//!
//! A [`BinOp`] is the operator "struct" spliced into the reduce-buffer
//! module: its identity literal, the WGSL expression combining two values,
//! and the subgroup builtin that combines a whole subgroup at once. The two
//! must agree; the subgroup builtin is what the workgroup phase uses, the
//! combine expression is what each lane uses to fold its own elements.

use crate::dtype::ScalarType;
use crate::error::{Error, Result};
use crate::runtime::wgpu::shaders::generator::common::check_identifier;
use crate::runtime::wgpu::shaders::generator::{ReductionConfig, ReductionConfigBuilder};

/// An associative binary operator over one scalar type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BinOp {
    name: String,
    ty: ScalarType,
    identity: String,
    combine: String,
    subgroup_op: String,
}

impl BinOp {
    /// Create a custom operator.
    ///
    /// - `name`: identifier used in fingerprints and function names
    /// - `identity`: WGSL literal of the neutral element
    /// - `combine`: WGSL expression over `a` and `b`, e.g. `a + b`
    /// - `subgroup_op`: WGSL subgroup builtin with the same semantics
    pub fn new(
        name: impl Into<String>,
        ty: ScalarType,
        identity: impl Into<String>,
        combine: impl Into<String>,
        subgroup_op: impl Into<String>,
    ) -> Result<Self> {
        let op = Self {
            name: name.into(),
            ty,
            identity: identity.into(),
            combine: combine.into(),
            subgroup_op: subgroup_op.into(),
        };
        check_identifier("binop.name", &op.name)?;
        check_identifier("binop.subgroup_op", &op.subgroup_op)?;
        if op.identity.trim().is_empty() {
            return Err(Error::configuration("binop.identity", "identity is empty"));
        }
        if op.combine.trim().is_empty() {
            return Err(Error::configuration(
                "binop.combine",
                "combine expression is empty",
            ));
        }
        Ok(op)
    }

    /// Sum (`a + b`, identity 0)
    pub fn sum(ty: ScalarType) -> Self {
        Self::preset("add", ty, ty.zero_literal(), "a + b", "subgroupAdd")
    }

    /// Product (`a * b`, identity 1)
    pub fn product(ty: ScalarType) -> Self {
        Self::preset("mul", ty, ty.one_literal(), "a * b", "subgroupMul")
    }

    /// Minimum (identity is the largest finite value)
    pub fn min(ty: ScalarType) -> Self {
        Self::preset("min", ty, ty.max_literal(), "min(a, b)", "subgroupMin")
    }

    /// Maximum (identity is the lowest finite value)
    pub fn max(ty: ScalarType) -> Self {
        Self::preset("max", ty, ty.min_literal(), "max(a, b)", "subgroupMax")
    }

    fn preset(name: &str, ty: ScalarType, identity: &str, combine: &str, subgroup: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            identity: identity.to_string(),
            combine: combine.to_string(),
            subgroup_op: subgroup.to_string(),
        }
    }

    /// Operator name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scalar type the operator works on
    pub fn scalar_type(&self) -> ScalarType {
        self.ty
    }

    /// Identity WGSL literal
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// WGSL combine expression over `a` and `b`
    pub fn combine(&self) -> &str {
        &self.combine
    }

    /// WGSL subgroup builtin
    pub fn subgroup_op(&self) -> &str {
        &self.subgroup_op
    }

    /// Generator config for this operator with the given sizes.
    ///
    /// Storage and naming modes keep their defaults; adjust them on the
    /// returned builder.
    pub fn reduction_config(
        &self,
        workgroup_size: u32,
        subgroup_min_size: u32,
    ) -> ReductionConfigBuilder {
        ReductionConfig::builder()
            .identity_literal(&self.identity)
            .combine_op_name(&self.name)
            .subgroup_combine_op_name(&self.subgroup_op)
            .element_type(self.ty)
            .workgroup_size(workgroup_size)
            .subgroup_min_size(subgroup_min_size)
    }
}

/// Transform applied to each input element before it is combined.
///
/// The body is a WGSL expression over `value`, e.g. `value * value` or
/// `abs(value)`; its type must be the element type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MapFn {
    expr: String,
}

impl MapFn {
    /// Wrap a WGSL expression over `value`
    pub fn new(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        if expr.trim().is_empty() {
            return Err(Error::configuration("map_fn", "expression is empty"));
        }
        Ok(Self { expr })
    }

    /// WGSL expression
    pub fn expr(&self) -> &str {
        &self.expr
    }
}
