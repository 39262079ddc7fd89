//! Multi-pass reduction planning
//!
//! A reduction of `n` elements runs as a chain of passes. The first pass
//! gives each workgroup a tile of `workgroup_size * elements_per_thread`
//! elements; every later pass reduces the previous pass's per-workgroup
//! results with one element per lane, until one value remains.
//!
//! ```text
//! 1_048_576 ──tile 1024──▶ 1024 ──wg 256──▶ 4 ──wg 256──▶ 1
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// One pass of a reduction
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PassDescriptor {
    /// Workgroups dispatched; equals the number of values the pass outputs
    pub workgroup_count: u32,
    /// Values the pass reads
    pub input_element_count: u64,
    /// Values each lane folds before the workgroup phase
    pub elements_per_thread: u32,
}

/// Ordered passes reducing `total` values to one
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassPlan {
    passes: Vec<PassDescriptor>,
}

impl PassPlan {
    /// Passes in execution order
    pub fn passes(&self) -> &[PassDescriptor] {
        &self.passes
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// True when no pass is needed (a single input element)
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Values pass `index` writes, if the pass exists
    pub fn output_element_count(&self, index: usize) -> Option<u32> {
        self.passes.get(index).map(|p| p.workgroup_count)
    }

    /// Iterate over the passes
    pub fn iter(&self) -> std::slice::Iter<'_, PassDescriptor> {
        self.passes.iter()
    }
}

impl<'a> IntoIterator for &'a PassPlan {
    type Item = &'a PassDescriptor;
    type IntoIter = std::slice::Iter<'a, PassDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.passes.iter()
    }
}

impl fmt::Display for PassPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passes.is_empty() {
            return f.write_str("[no passes]");
        }
        for (i, pass) in self.passes.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(
                f,
                "{}/{}x{}",
                pass.input_element_count, pass.workgroup_count, pass.elements_per_thread
            )?;
        }
        Ok(())
    }
}

/// Plan the passes reducing `total` elements.
///
/// `tile_capacity` is the number of elements one first-pass workgroup
/// covers (`workgroup_size * elements_per_thread`).
pub fn plan(total: u64, tile_capacity: u32, workgroup_size: u32) -> Result<PassPlan> {
    if total == 0 {
        return Err(Error::configuration(
            "element_count",
            "cannot reduce an empty buffer",
        ));
    }
    // One lane per workgroup never shrinks the input after the first pass
    if workgroup_size < 2 {
        return Err(Error::configuration(
            "workgroup_size",
            format!("{workgroup_size} lanes cannot reduce, need at least 2"),
        ));
    }
    if tile_capacity == 0 {
        return Err(Error::configuration("tile_capacity", "must be non-zero"));
    }
    if tile_capacity % workgroup_size != 0 {
        return Err(Error::configuration(
            "tile_capacity",
            format!("{tile_capacity} is not a multiple of workgroup size {workgroup_size}"),
        ));
    }

    let mut passes = Vec::new();
    let mut remaining = total;
    let mut capacity = tile_capacity;
    while remaining > 1 {
        let count = remaining.div_ceil(capacity as u64);
        let workgroup_count = u32::try_from(count).map_err(|_| {
            Error::configuration(
                "element_count",
                format!("{remaining} elements need {count} workgroups in one pass"),
            )
        })?;
        passes.push(PassDescriptor {
            workgroup_count,
            input_element_count: remaining,
            elements_per_thread: capacity / workgroup_size,
        });
        remaining = count;
        capacity = workgroup_size;
    }
    Ok(PassPlan { passes })
}
