//! Reduce-buffer kernel launcher
//!
//! Encodes one compute pass per reduction pass. Passes are not merged into
//! one compute pass: the pass boundary is what orders the write of pass `i`
//! before the read of pass `i + 1`.

use wgpu::{BindGroup, CommandEncoder, ComputePipeline};

use crate::error::{Error, Result};

/// Split `workgroups` over a 2D grid that fits `max_per_dim` per dimension.
///
/// The kernel linearizes `wgid.x + wgid.y * nwg.x` and ignores grid cells at
/// or beyond `workgroups`.
pub fn dispatch_dims(workgroups: u32, max_per_dim: u32) -> Result<(u32, u32)> {
    if max_per_dim == 0 {
        return Err(Error::configuration(
            "max_compute_workgroups_per_dimension",
            "device reports zero",
        ));
    }
    if workgroups <= max_per_dim {
        return Ok((workgroups, 1));
    }
    let y = workgroups.div_ceil(max_per_dim);
    if y > max_per_dim {
        return Err(Error::backend_limitation(
            "wgpu",
            "reduce_buffer",
            format!("{workgroups} workgroups exceed a {max_per_dim}x{max_per_dim} grid"),
        ));
    }
    Ok((workgroups.div_ceil(y), y))
}

/// Encode a single reduction pass
pub fn encode_reduce_pass(
    encoder: &mut CommandEncoder,
    pipeline: &ComputePipeline,
    bind_group: &BindGroup,
    (x, y): (u32, u32),
    label: &str,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, Some(bind_group), &[]);
    pass.dispatch_workgroups(x, y, 1);
}
