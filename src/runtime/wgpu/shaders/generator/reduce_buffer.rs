//! WGSL generation for the reduce-buffer compute module
//!
//! Every pass of a buffer reduction runs the same entry point; what differs
//! between passes lives in the `ReduceParams` uniform.
//!
//! ```text
//! @binding(0)  reduce_input   storage, read
//! @binding(1)  params         uniform ReduceParams
//! @binding(2)  reduce_output  storage, read_write
//! ```

use super::common::{check_identifier, module_header, wgsl_type};
use super::reduce::{
    GeneratedKernel, ReductionConfig, TempStorage, builtin_structs, generate_workgroup_reduce,
};
use crate::error::{Error, Result};

/// Entry point of the reduce-buffer module
pub const REDUCE_BUFFER_ENTRY_POINT: &str = "reduce_buffer_main";

/// Per-pass parameters, laid out like the WGSL `ReduceParams` struct.
///
/// All offsets and strides are in elements.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReduceParams {
    /// Elements this pass reads
    pub element_count: u32,
    /// First element read from the input binding
    pub input_offset: u32,
    /// Distance between consecutive elements in the input binding
    pub input_stride: u32,
    /// First element written in the output binding
    pub output_offset: u32,
    /// Elements each lane folds before the workgroup phase
    pub elements_per_thread: u32,
    /// Non-zero when `map_element` is applied on load
    pub apply_map: u32,
    /// Workgroups that write a result; extra grid cells write nothing
    pub workgroup_count: u32,
    _pad: u32,
}

impl ReduceParams {
    /// Params for one pass
    pub fn new(
        element_count: u32,
        input_offset: u32,
        input_stride: u32,
        output_offset: u32,
        elements_per_thread: u32,
        apply_map: bool,
        workgroup_count: u32,
    ) -> Self {
        Self {
            element_count,
            input_offset,
            input_stride,
            output_offset,
            elements_per_thread,
            apply_map: apply_map as u32,
            workgroup_count,
            _pad: 0,
        }
    }
}

/// Generate the complete reduce-buffer module.
///
/// `combine_expr` is a WGSL expression over `a` and `b`; `map_expr`, when
/// present, is a WGSL expression over `value`.
pub fn generate_reduce_buffer_shader(
    config: &ReductionConfig,
    combine_expr: &str,
    map_expr: Option<&str>,
) -> Result<String> {
    if combine_expr.trim().is_empty() {
        return Err(Error::configuration(
            "combine_expr",
            "combine expression is empty",
        ));
    }
    let kernel = generate_workgroup_reduce(config);
    check_identifier("entry_point", kernel.entry_point())?;
    Ok(assemble(config, &kernel, combine_expr, map_expr))
}

fn assemble(
    config: &ReductionConfig,
    kernel: &GeneratedKernel,
    combine_expr: &str,
    map_expr: Option<&str>,
) -> String {
    let t = wgsl_type(config.element_type());
    let header = module_header(config.element_type());
    let identity = config.identity_literal();
    let workgroup_size = config.workgroup_size();
    let reduce_fn = kernel.entry_point();
    let map_body = map_expr.unwrap_or("value");
    let builtins = builtin_structs();
    let kernel_source = kernel.source();

    let (temp_decl, temp_arg) = match config.temp_storage() {
        TempStorage::Local => (String::new(), ""),
        TempStorage::PassedIn => (
            format!(
                "var<workgroup> reduce_temp: array<{t}, {}>;\n\n",
                config.temp_array_len()
            ),
            " &reduce_temp,",
        ),
    };

    format!(
        r#"{header}// Auto-generated buffer reduction {fingerprint}

struct ReduceParams {{
    element_count: u32,
    input_offset: u32,
    input_stride: u32,
    output_offset: u32,
    elements_per_thread: u32,
    apply_map: u32,
    workgroup_count: u32,
    _pad: u32,
}}

@group(0) @binding(0) var<storage, read> reduce_input: array<{t}>;
@group(0) @binding(1) var<uniform> params: ReduceParams;
@group(0) @binding(2) var<storage, read_write> reduce_output: array<{t}>;

fn binop_combine(a: {t}, b: {t}) -> {t} {{
    return {combine_expr};
}}

fn map_element(value: {t}) -> {t} {{
    return {map_body};
}}

{builtins}
{temp_decl}{kernel_source}
@compute @workgroup_size({workgroup_size})
fn {entry}(builtins_uniform: BuiltinsUniform, builtins_nonuniform: BuiltinsNonuniform) {{
    let wg_index = builtins_uniform.wgid.x + builtins_uniform.wgid.y * builtins_uniform.nwg.x;
    let lidx = builtins_nonuniform.lidx;
    let in_range = wg_index < params.workgroup_count;

    var acc: {t} = {identity};
    if (in_range) {{
        let base = wg_index * {workgroup_size}u * params.elements_per_thread + lidx;
        for (var k = 0u; k < params.elements_per_thread; k += 1u) {{
            let idx = base + k * {workgroup_size}u;
            if (idx < params.element_count) {{
                var value = reduce_input[params.input_offset + idx * params.input_stride];
                if (params.apply_map != 0u) {{
                    value = map_element(value);
                }}
                acc = binop_combine(acc, value);
            }}
        }}
    }}

    let result = {reduce_fn}(acc,{temp_arg} builtins_uniform, builtins_nonuniform);
    if (in_range && lidx == 0u) {{
        reduce_output[params.output_offset + wg_index] = result;
    }}
}}
"#,
        fingerprint = kernel.fingerprint(),
        entry = REDUCE_BUFFER_ENTRY_POINT,
    )
}
