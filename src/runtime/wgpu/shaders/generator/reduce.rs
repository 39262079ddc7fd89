//! WGSL generation for the workgroup reduction step
//!
//! The generated function reduces one value per lane to one value per
//! workgroup in two levels:
//!
//! ```text
//! lanes ──subgroup op──▶ one partial per subgroup ──▶ temp[sid]
//!                                                      │ workgroupBarrier
//! temp ──tree of subgroup ops, lane_log bits per step──▶ result (subgroup 0)
//! ```
//!
//! Everything that changes the text is a generation-time switch on
//! [`ReductionConfig`]; the emitted code has no runtime configuration.

use super::common::{check_identifier, check_power_of_two, wgsl_type};
use crate::dtype::ScalarType;
use crate::error::{Error, Result};

/// Default name of the generated reduction function
pub const DEFAULT_BASE_NAME: &str = "wgReduce";

/// Where the workgroup temporary array lives
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TempStorage {
    /// The generator declares a `var<workgroup>` array next to the function
    #[default]
    Local,
    /// The caller owns the array and passes a pointer to it
    PassedIn,
}

/// How the generated function is named
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Naming {
    /// Always the base name; one reduction routine per module
    #[default]
    Short,
    /// Base name plus the configuration fingerprint
    LongUnique,
}

// ============================================================================
// ReductionConfig
// ============================================================================

/// Complete, immutable description of one generated reduction function.
///
/// Build with [`ReductionConfig::builder`]. Two equal configs always
/// generate byte-identical text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReductionConfig {
    identity_literal: String,
    combine_op_name: String,
    subgroup_combine_op_name: String,
    element_type: ScalarType,
    workgroup_size: u32,
    subgroup_min_size: u32,
    temp_storage: TempStorage,
    naming: Naming,
    base_name: String,
}

impl ReductionConfig {
    /// Start building a config; all fields without a default are required
    pub fn builder() -> ReductionConfigBuilder {
        ReductionConfigBuilder::default()
    }

    /// WGSL literal of the operator's identity
    pub fn identity_literal(&self) -> &str {
        &self.identity_literal
    }

    /// Operator name used in the fingerprint
    pub fn combine_op_name(&self) -> &str {
        &self.combine_op_name
    }

    /// WGSL subgroup builtin (e.g. `subgroupAdd`)
    pub fn subgroup_combine_op_name(&self) -> &str {
        &self.subgroup_combine_op_name
    }

    /// Element type
    pub fn element_type(&self) -> ScalarType {
        self.element_type
    }

    /// Lanes per workgroup
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Smallest subgroup size the temp array is sized for
    pub fn subgroup_min_size(&self) -> u32 {
        self.subgroup_min_size
    }

    /// Temp array storage mode
    pub fn temp_storage(&self) -> TempStorage {
        self.temp_storage
    }

    /// Naming mode
    pub fn naming(&self) -> Naming {
        self.naming
    }

    /// Base function name
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Slots the temp array needs: `2 * workgroup_size / subgroup_min_size`.
    ///
    /// One slot per subgroup partial plus the slots the tree writes on top
    /// of them, which never exceed the number of partials.
    pub fn temp_array_len(&self) -> u32 {
        2 * self.workgroup_size / self.subgroup_min_size
    }

    /// Tree levels the workgroup phase runs for the smallest subgroup.
    ///
    /// Each level divides the live partials by the subgroup size; wider
    /// subgroups finish in fewer levels and idle through the rest.
    pub fn max_tree_levels(&self) -> u32 {
        let mut sgsz = self.subgroup_min_size;
        let mut levels = 0;
        while sgsz <= self.workgroup_size {
            levels = levels.max(tree_levels(self.workgroup_size, sgsz));
            sgsz <<= 1;
        }
        levels
    }

    /// Canonical configuration string, e.g. `add_f32_256_16`
    pub fn fingerprint(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.combine_op_name,
            wgsl_type(self.element_type),
            self.workgroup_size,
            self.subgroup_min_size
        )
    }

    /// Name of the generated function under the configured naming mode
    pub fn entry_point(&self) -> String {
        match self.naming {
            Naming::Short => self.base_name.clone(),
            Naming::LongUnique => self.long_name(),
        }
    }

    fn long_name(&self) -> String {
        format!("{}_{}", self.base_name, self.fingerprint())
    }
}

/// Levels the tree runs for one hardware subgroup size; mirrors the
/// `aligned_size` computation in the emitted code.
fn tree_levels(workgroup_size: u32, sgsz: u32) -> u32 {
    let lane_log = sgsz.trailing_zeros();
    let local_spine = workgroup_size >> lane_log;
    if local_spine == 0 {
        return 0;
    }
    let base_log = (local_spine.trailing_zeros() + lane_log - 1) / lane_log * lane_log;
    let aligned_log = if base_log == 0 {
        workgroup_size.trailing_zeros()
    } else {
        base_log
    };
    if sgsz > 1 << aligned_log {
        return 0;
    }
    aligned_log / lane_log
}

/// Builder for [`ReductionConfig`]
///
/// `build` reports the first missing or invalid field rather than filling
/// in a default for it.
#[derive(Clone, Debug, Default)]
pub struct ReductionConfigBuilder {
    identity_literal: Option<String>,
    combine_op_name: Option<String>,
    subgroup_combine_op_name: Option<String>,
    element_type: Option<ScalarType>,
    workgroup_size: Option<u32>,
    subgroup_min_size: Option<u32>,
    temp_storage: TempStorage,
    naming: Naming,
    base_name: Option<String>,
}

impl ReductionConfigBuilder {
    /// Identity value as a WGSL literal (e.g. `0.0`, `0u`)
    pub fn identity_literal(mut self, literal: impl Into<String>) -> Self {
        self.identity_literal = Some(literal.into());
        self
    }

    /// Operator name for the fingerprint (e.g. `add`)
    pub fn combine_op_name(mut self, name: impl Into<String>) -> Self {
        self.combine_op_name = Some(name.into());
        self
    }

    /// WGSL subgroup builtin (e.g. `subgroupAdd`)
    pub fn subgroup_combine_op_name(mut self, name: impl Into<String>) -> Self {
        self.subgroup_combine_op_name = Some(name.into());
        self
    }

    /// Element type
    pub fn element_type(mut self, ty: ScalarType) -> Self {
        self.element_type = Some(ty);
        self
    }

    /// Lanes per workgroup (power of two)
    pub fn workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = Some(size);
        self
    }

    /// Smallest hardware subgroup size to size the temp array for (power of two)
    pub fn subgroup_min_size(mut self, size: u32) -> Self {
        self.subgroup_min_size = Some(size);
        self
    }

    /// Temp array storage mode (default `Local`)
    pub fn temp_storage(mut self, mode: TempStorage) -> Self {
        self.temp_storage = mode;
        self
    }

    /// Naming mode (default `Short`)
    pub fn naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    /// Base function name (default `wgReduce`)
    pub fn base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = Some(name.into());
        self
    }

    /// Validate and freeze the config
    pub fn build(self) -> Result<ReductionConfig> {
        let identity_literal = self
            .identity_literal
            .ok_or_else(|| Error::missing_field("identity_literal"))?;
        let combine_op_name = self
            .combine_op_name
            .ok_or_else(|| Error::missing_field("combine_op_name"))?;
        let subgroup_combine_op_name = self
            .subgroup_combine_op_name
            .ok_or_else(|| Error::missing_field("subgroup_combine_op_name"))?;
        let element_type = self
            .element_type
            .ok_or_else(|| Error::missing_field("element_type"))?;
        let workgroup_size = self
            .workgroup_size
            .ok_or_else(|| Error::missing_field("workgroup_size"))?;
        let subgroup_min_size = self
            .subgroup_min_size
            .ok_or_else(|| Error::missing_field("subgroup_min_size"))?;
        let base_name = self
            .base_name
            .unwrap_or_else(|| DEFAULT_BASE_NAME.to_string());

        if identity_literal.trim().is_empty() {
            return Err(Error::configuration(
                "identity_literal",
                "identity literal is empty",
            ));
        }
        check_identifier("combine_op_name", &combine_op_name)?;
        check_identifier("subgroup_combine_op_name", &subgroup_combine_op_name)?;
        check_identifier("base_name", &base_name)?;
        check_power_of_two("workgroup_size", workgroup_size)?;
        check_power_of_two("subgroup_min_size", subgroup_min_size)?;
        if subgroup_min_size < 2 {
            return Err(Error::configuration(
                "subgroup_min_size",
                "subgroup operations need at least two lanes",
            ));
        }
        if subgroup_min_size > workgroup_size {
            return Err(Error::configuration(
                "subgroup_min_size",
                format!(
                    "subgroup minimum {subgroup_min_size} exceeds workgroup size {workgroup_size}"
                ),
            ));
        }

        Ok(ReductionConfig {
            identity_literal,
            combine_op_name,
            subgroup_combine_op_name,
            element_type,
            workgroup_size,
            subgroup_min_size,
            temp_storage: self.temp_storage,
            naming: self.naming,
            base_name,
        })
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generated WGSL for one workgroup reduction function
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedKernel {
    source: String,
    entry_point: String,
    temp_capacity: Option<u32>,
    fingerprint: String,
}

impl GeneratedKernel {
    /// WGSL text (declarations plus the function)
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name of the generated function
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Temp array length, only when the generator declared the array itself
    pub fn temp_capacity(&self) -> Option<u32> {
        self.temp_capacity
    }

    /// Configuration fingerprint the kernel was generated from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// WGSL structs carrying the builtins the reduction function reads.
///
/// Entry points take these as parameters and forward them unchanged.
pub fn builtin_structs() -> &'static str {
    r#"struct BuiltinsNonuniform {
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_index) lidx: u32,
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(subgroup_invocation_id) sgid: u32,
}

struct BuiltinsUniform {
    @builtin(num_workgroups) nwg: vec3<u32>,
    @builtin(workgroup_id) wgid: vec3<u32>,
    @builtin(subgroup_size) sgsz: u32,
}
"#
}

/// Generate the workgroup reduction function for `config`.
///
/// The returned value is only meaningful in subgroup 0; entry points must
/// consume it from lane 0 (`local_invocation_index == 0`).
pub fn generate_workgroup_reduce(config: &ReductionConfig) -> GeneratedKernel {
    let t = wgsl_type(config.element_type);
    let fingerprint = config.fingerprint();
    let long_name = config.long_name();
    let fn_name = config.entry_point();
    let identity = &config.identity_literal;
    let subgroup_op = &config.subgroup_combine_op_name;
    let workgroup_size = config.workgroup_size;
    let temp_len = config.temp_array_len();
    let max_levels = config.max_tree_levels();

    let (declarations, temp_param, temp, temp_capacity) = match config.temp_storage {
        TempStorage::Local => {
            let temp_name = format!("wg_temp_{fingerprint}");
            let declarations = format!(
                "const TEMP_{long_name}_MEM_SIZE: u32 = {temp_len}u;\n\
                 var<workgroup> {temp_name}: array<{t}, TEMP_{long_name}_MEM_SIZE>;\n\n"
            );
            (declarations, String::new(), temp_name, Some(temp_len))
        }
        TempStorage::PassedIn => (
            String::new(),
            format!("\n    wg_temp: ptr<workgroup, array<{t}, {temp_len}>>,"),
            "(*wg_temp)".to_string(),
            None,
        ),
    };

    let source = format!(
        r#"// Workgroup reduction {fingerprint}
{declarations}fn {fn_name}(
    in_val: {t},{temp_param}
    builtins_uniform: BuiltinsUniform,
    builtins_nonuniform: BuiltinsNonuniform,
) -> {t} {{
    let lidx = builtins_nonuniform.lidx;
    let sgid = builtins_nonuniform.sgid;
    let sgsz = builtins_uniform.sgsz;
    let block_dim = {workgroup_size}u;
    let sid = lidx / sgsz;
    let lane_log = countTrailingZeros(sgsz);
    // subgroup partials in this workgroup
    let local_spine = block_dim >> lane_log;
    let aligned_size_base = 1u << ((countTrailingZeros(local_spine) + lane_log - 1u) / lane_log * lane_log);
    // a single subgroup spans the workgroup
    let aligned_size = select(aligned_size_base, block_dim, aligned_size_base == 1u);

    let s_red = {subgroup_op}(in_val);
    if (sgid == 0u) {{
        {temp}[sid] = s_red;
    }}
    workgroupBarrier();

    // a subgroup wider than the aligned tree reads its slot directly
    let direct = sgsz > aligned_size;
    let levels = select(countTrailingZeros(aligned_size) / lane_log, 0u, direct);
    var f_red: {t} = {identity};
    if (direct) {{
        f_red = {temp}[lidx];
    }}
    var offset = 0u;
    var top_offset = 0u;
    let lane_pred = sgid == sgsz - 1u;
    for (var level = 0u; level < {max_levels}u; level += 1u) {{
        let live = level < levels;
        let spine_step = local_spine >> offset;
        let pred = live && lidx < spine_step;
        let t_red = {subgroup_op}(select({identity}, {temp}[lidx + top_offset], pred));
        if (pred && lane_pred) {{
            {temp}[sid + spine_step + top_offset] = t_red;
        }}
        workgroupBarrier();
        if (live) {{
            f_red = t_red;
            top_offset += spine_step;
            offset += lane_log;
        }}
    }}
    return f_red;
}}
"#
    );

    GeneratedKernel {
        source,
        entry_point: fn_name,
        temp_capacity,
        fingerprint,
    }
}
