//! Hosted shader interface

use wgpu::CommandEncoder;

use crate::error::Result;

/// A self-contained GPU computation that records into caller-owned encoders.
///
/// `encode` appends work without submitting, so it can be batched with
/// unrelated commands; the caller submits the encoder. Resources the shader
/// allocated live until `destroy` or drop.
pub trait HostedShader {
    /// Record all dispatches into `encoder`, building lazily on first use
    fn encode(&mut self, encoder: &mut CommandEncoder) -> Result<()>;

    /// Release every resource the shader allocated itself
    fn destroy(&mut self);

    /// Label used for encoders and passes
    fn name(&self) -> &str;
}
