//! Module assembly and validation
//!
//! A [`Linker`] turns a reduction request into the complete WGSL module the
//! device compiles, and rejects modules the device would refuse. The
//! default [`WgslLinker`] splices the generated workgroup reduction into the
//! reduce-buffer template and checks the result with naga.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use wgpu::naga;

use super::generator::{REDUCE_BUFFER_ENTRY_POINT, ReductionConfig, generate_reduce_buffer_shader};
use crate::error::{Error, Result};

/// Pipeline cache key.
///
/// The fingerprint identifies the generated reduction; the key also holds
/// the whole module text, so two keys are equal only when the modules match
/// byte for byte. Operators or mapping functions that share a fingerprint
/// still get their own pipeline.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    fingerprint: String,
    source: Arc<str>,
}

impl KernelKey {
    /// Key for a module with the given fingerprint and full source
    pub fn new(fingerprint: impl Into<String>, source: &str) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            source: Arc::from(source),
        }
    }

    /// Fingerprint of the generated reduction
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Short digest of the module text, for logs
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.source.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.fingerprint, self.digest())
    }
}

impl fmt::Debug for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelKey({self})")
    }
}

/// Everything needed to assemble one reduce-buffer module
#[derive(Clone, Copy, Debug)]
pub struct LinkRequest<'a> {
    /// Generator configuration
    pub config: &'a ReductionConfig,
    /// WGSL expression over `a` and `b`
    pub combine_expr: &'a str,
    /// WGSL expression over `value`, applied on first-pass loads
    pub map_expr: Option<&'a str>,
}

/// Assembled module, ready to validate and compile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedModule {
    source: String,
    entry_point: String,
    key: KernelKey,
}

impl LinkedModule {
    /// Complete WGSL text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compute entry point
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Cache key
    pub fn key(&self) -> &KernelKey {
        &self.key
    }
}

/// Assembles and validates reduce-buffer modules
pub trait Linker: Send + Sync {
    /// Assemble the module text for `request`; no device work
    fn link(&self, request: &LinkRequest<'_>) -> Result<LinkedModule>;

    /// Reject the module with [`Error::Compilation`] if it would not compile
    fn validate(&self, module: &LinkedModule) -> Result<()>;
}

/// Default linker: reduce-buffer template plus naga validation
#[derive(Clone, Debug)]
pub struct WgslLinker {
    capabilities: naga::valid::Capabilities,
}

impl Default for WgslLinker {
    fn default() -> Self {
        Self {
            capabilities: naga::valid::Capabilities::SUBGROUP
                | naga::valid::Capabilities::SHADER_FLOAT16,
        }
    }
}

impl WgslLinker {
    /// Linker validating against the given naga capabilities
    pub fn with_capabilities(capabilities: naga::valid::Capabilities) -> Self {
        Self { capabilities }
    }
}

impl Linker for WgslLinker {
    fn link(&self, request: &LinkRequest<'_>) -> Result<LinkedModule> {
        let source =
            generate_reduce_buffer_shader(request.config, request.combine_expr, request.map_expr)?;
        let key = KernelKey::new(request.config.fingerprint(), &source);
        Ok(LinkedModule {
            source,
            entry_point: REDUCE_BUFFER_ENTRY_POINT.to_string(),
            key,
        })
    }

    fn validate(&self, module: &LinkedModule) -> Result<()> {
        let source = module.source();
        let parsed = naga::front::wgsl::parse_str(source)
            .map_err(|e| Error::Compilation(e.emit_to_string(source)))?;

        let mut validator =
            naga::valid::Validator::new(naga::valid::ValidationFlags::all(), self.capabilities);
        validator
            .subgroup_stages(naga::valid::ShaderStages::COMPUTE)
            .subgroup_operations(naga::valid::SubgroupOperationSet::all());
        validator
            .validate(&parsed)
            .map_err(|e| Error::Compilation(e.emit_to_string(source)))?;
        Ok(())
    }
}
