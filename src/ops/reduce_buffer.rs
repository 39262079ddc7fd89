//! Buffer reduction orchestrator
//!
//! [`ReduceBuffer`] reduces a GPU buffer to one value with the multi-pass
//! plan from [`plan`](super::plan::plan). Pass `i` reads the values pass
//! `i - 1` wrote and writes one value per workgroup; the last pass writes
//! straight into the output buffer at the destination offset.
//!
//! ```text
//! input ──pass 0──▶ partials[0] ──pass 1──▶ partials[1] ── … ──▶ output[dst]
//! ```
//!
//! # State
//!
//! ```text
//! Uninitialized ──encode──▶ Building ──▶ Ready
//!       ▲                                  │
//!       └──── rebind / set_binop / destroy ┘
//! ```
//!
//! Building resolves the pipeline (shared through the device's pipeline
//! cache), the plan, the pass buffers and the bind groups; each is kept
//! until something it depends on changes.

use std::marker::PhantomData;
use std::sync::Arc;

use wgpu::{BindGroup, Buffer, BufferUsages, CommandEncoder, ComputePipeline};

use super::binop::{BinOp, MapFn};
use super::hosted::HostedShader;
use super::plan::{PassDescriptor, PassPlan, plan};
use crate::dtype::{Element, ScalarType};
use crate::error::{Error, Result};
use crate::runtime::wgpu::shaders::generator::common::check_power_of_two;
use crate::runtime::wgpu::shaders::generator::{ReduceParams, ReductionConfig};
use crate::runtime::wgpu::{WgpuClient, WgpuDevice};
use crate::runtime::wgpu::shaders::reduce::{dispatch_dims, encode_reduce_pass};
use crate::runtime::wgpu::shaders::{KernelKey, LayoutKey, LinkRequest, Linker, WgslLinker};

const NAME: &str = "ReduceBuffer";

/// wgpu requires copy offsets and sizes to be multiples of this
const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Lifecycle of a [`ReduceBuffer`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceState {
    /// Nothing built, or invalidated by a rebind
    Uninitialized,
    /// Pipeline, plan or pass resources are being resolved
    Building,
    /// Every pass is ready to encode
    Ready,
}

/// Kernel sizing for a reduction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReduceTuning {
    /// Lanes per workgroup (power of two)
    pub workgroup_size: u32,
    /// Values each lane folds in the first pass
    pub elements_per_thread: u32,
    /// Smallest subgroup the kernel must handle; `None` uses the adapter's
    pub subgroup_min_size: Option<u32>,
}

impl Default for ReduceTuning {
    fn default() -> Self {
        Self {
            workgroup_size: 256,
            elements_per_thread: 4,
            subgroup_min_size: None,
        }
    }
}

impl ReduceTuning {
    /// Elements one first-pass workgroup covers
    pub fn tile_capacity(&self) -> Result<u32> {
        self.workgroup_size
            .checked_mul(self.elements_per_thread)
            .filter(|&tile| tile > 0)
            .ok_or_else(|| {
                Error::configuration(
                    "elements_per_thread",
                    format!(
                        "{} x {} is not a valid tile",
                        self.workgroup_size, self.elements_per_thread
                    ),
                )
            })
    }

    /// Check the sizes that do not depend on the device
    pub fn validate(&self) -> Result<()> {
        self.tile_capacity()?;
        check_power_of_two("workgroup_size", self.workgroup_size)?;
        if self.workgroup_size < 2 {
            return Err(Error::configuration(
                "workgroup_size",
                "a reduction needs at least two lanes per workgroup",
            ));
        }
        if let Some(subgroup_min_size) = self.subgroup_min_size {
            check_power_of_two("subgroup_min_size", subgroup_min_size)?;
            if subgroup_min_size < 2 || subgroup_min_size > self.workgroup_size {
                return Err(Error::configuration(
                    "subgroup_min_size",
                    format!(
                        "{subgroup_min_size} is outside 2..={}",
                        self.workgroup_size
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Caller options for [`ReduceBuffer::new`]
#[derive(Clone)]
pub struct ReduceBufferParams {
    /// Client of the device owning the buffers
    pub client: WgpuClient,
    /// Buffer to reduce; needs `STORAGE` usage
    pub input_buffer: Arc<Buffer>,
    /// Reduction operator
    pub binop: BinOp,
    /// Where the result is stored; created by the session if absent
    pub output_buffer: Option<Arc<Buffer>>,
    /// Byte offset of the result in the output buffer
    pub destination_offset: u64,
    /// Transform applied to each input element before combining
    pub map_fn: Option<MapFn>,
    /// Byte offset of the first input element
    pub input_offset: u64,
    /// Bytes between input elements; `None` for tightly packed input
    pub input_stride: Option<u64>,
    /// Elements to reduce; `None` reads to the end of the input buffer
    pub element_count: Option<u64>,
    /// Kernel sizing
    pub tuning: ReduceTuning,
    /// Module assembly and validation; `None` uses [`WgslLinker`]
    pub linker: Option<Arc<dyn Linker>>,
}

impl ReduceBufferParams {
    /// Required options; everything else takes its default
    pub fn new(client: WgpuClient, input_buffer: Arc<Buffer>, binop: BinOp) -> Self {
        Self {
            client,
            input_buffer,
            binop,
            output_buffer: None,
            destination_offset: 0,
            map_fn: None,
            input_offset: 0,
            input_stride: None,
            element_count: None,
            tuning: ReduceTuning::default(),
            linker: None,
        }
    }

    /// Store the result in `buffer` at `destination_offset` bytes
    pub fn output_buffer(mut self, buffer: Arc<Buffer>, destination_offset: u64) -> Self {
        self.output_buffer = Some(buffer);
        self.destination_offset = destination_offset;
        self
    }

    /// Map each element before combining
    pub fn map_fn(mut self, map_fn: MapFn) -> Self {
        self.map_fn = Some(map_fn);
        self
    }

    /// Read elements starting at `offset` bytes, `stride` bytes apart
    pub fn input_layout(mut self, offset: u64, stride: Option<u64>) -> Self {
        self.input_offset = offset;
        self.input_stride = stride;
        self
    }

    /// Reduce exactly `count` elements
    pub fn element_count(mut self, count: u64) -> Self {
        self.element_count = Some(count);
        self
    }

    /// Kernel sizing
    pub fn tuning(mut self, tuning: ReduceTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Custom linker
    pub fn linker(mut self, linker: Arc<dyn Linker>) -> Self {
        self.linker = Some(linker);
        self
    }
}

/// Where the result goes
enum OutputTarget {
    Caller(Arc<Buffer>),
    /// Created by the session; `None` after `destroy` until the next build
    Owned(Option<Arc<Buffer>>),
}

/// Buffers derived from the plan; independent of which input and output
/// buffers are bound
struct PassBuffers {
    passes: Vec<PassDescriptor>,
    partials: Vec<Buffer>,
    params: Vec<Buffer>,
    dims: Vec<(u32, u32)>,
}

/// How the current plan executes
enum Execution {
    /// Single element: copy it into place
    Copy,
    /// One compute pass per descriptor
    Passes(PassBuffers),
}

/// Resolved input layout, in elements
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct InputLayout {
    offset: u32,
    stride: u32,
    count: u64,
}

/// Reduces a GPU buffer to a single value of type `T`.
///
/// # Example
///
/// ```ignore
/// let client = WgpuClient::new(WgpuDevice::new(0))?;
/// let input = Arc::new(client.create_storage_buffer_with("values", &values));
/// let params = ReduceBufferParams::new(client, input, BinOp::sum(ScalarType::F32));
/// let mut sum = ReduceBuffer::<f32>::new(params)?;
/// let total = sum.reduce()?;
/// ```
pub struct ReduceBuffer<T: Element> {
    client: WgpuClient,
    binop: BinOp,
    config: ReductionConfig,
    map_fn: Option<MapFn>,
    linker: Arc<dyn Linker>,
    tuning: ReduceTuning,

    input: Arc<Buffer>,
    input_offset: u64,
    input_stride: Option<u64>,
    element_count: Option<u64>,
    output: OutputTarget,
    destination_offset: u64,

    state: ReduceState,
    pipeline: Option<(KernelKey, Arc<ComputePipeline>)>,
    plan: Option<PassPlan>,
    execution: Option<Execution>,
    bind_groups: Option<Vec<BindGroup>>,

    _marker: PhantomData<T>,
}

impl<T: Element> ReduceBuffer<T> {
    /// Create a session. Nothing is compiled until the first `encode`.
    ///
    /// Operator, tuning and device limits are checked here, before any
    /// buffer is allocated.
    pub fn new(params: ReduceBufferParams) -> Result<Self> {
        check_type::<T>(&params.binop)?;
        params.tuning.validate()?;
        let config = reduction_config::<T>(&params.binop, &params.tuning, params.client.device())?;

        let size = T::SCALAR.size_in_bytes() as u64;
        let output = match params.output_buffer {
            Some(buffer) => OutputTarget::Caller(buffer),
            None => OutputTarget::Owned(Some(Arc::new(create_owned_output(
                &params.client,
                params.destination_offset,
                size,
            )?))),
        };

        Ok(Self {
            linker: params
                .linker
                .unwrap_or_else(|| Arc::new(WgslLinker::default()) as Arc<dyn Linker>),
            client: params.client,
            binop: params.binop,
            config,
            map_fn: params.map_fn,
            tuning: params.tuning,
            input: params.input_buffer,
            input_offset: params.input_offset,
            input_stride: params.input_stride,
            element_count: params.element_count,
            output,
            destination_offset: params.destination_offset,
            state: ReduceState::Uninitialized,
            pipeline: None,
            plan: None,
            execution: None,
            bind_groups: None,
            _marker: PhantomData,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReduceState {
        self.state
    }

    /// Pass plan, once built
    pub fn plan(&self) -> Option<&PassPlan> {
        self.plan.as_ref()
    }

    /// Cache key of the pipeline in use, once built
    pub fn kernel_key(&self) -> Option<&KernelKey> {
        self.pipeline.as_ref().map(|(key, _)| key)
    }

    /// Reduction operator
    pub fn binop(&self) -> &BinOp {
        &self.binop
    }

    /// Replace the operator; the next `encode` resolves a new pipeline
    pub fn set_binop(&mut self, binop: BinOp) -> Result<&mut Self> {
        check_type::<T>(&binop)?;
        self.config = reduction_config::<T>(&binop, &self.tuning, self.client.device())?;
        self.binop = binop;
        self.pipeline = None;
        self.state = ReduceState::Uninitialized;
        Ok(self)
    }

    /// Buffer being reduced
    pub fn input_buffer(&self) -> &Arc<Buffer> {
        &self.input
    }

    /// Bind a new input buffer.
    ///
    /// The plan and pass buffers survive when the element count is
    /// unchanged; only the bind groups are rebuilt.
    pub fn set_input_buffer(&mut self, buffer: Arc<Buffer>) -> &mut Self {
        let previous = self.resolve_input().ok();
        self.input = buffer;
        let current = self.resolve_input().ok();

        self.bind_groups = None;
        if matches!(self.execution, Some(Execution::Copy)) {
            self.execution = None;
        }
        if previous.is_none() || previous != current {
            tracing::debug!(?previous, ?current, "input layout changed, replanning");
            self.plan = None;
            self.release_execution();
        }
        self.state = ReduceState::Uninitialized;
        self
    }

    /// Chaining form of [`set_input_buffer`](Self::set_input_buffer)
    pub fn with_input_buffer(mut self, buffer: Arc<Buffer>) -> Self {
        self.set_input_buffer(buffer);
        self
    }

    /// Buffer receiving the result; `None` after `destroy` when the session
    /// owns it
    pub fn output_buffer(&self) -> Option<&Arc<Buffer>> {
        match &self.output {
            OutputTarget::Caller(buffer) => Some(buffer),
            OutputTarget::Owned(buffer) => buffer.as_ref(),
        }
    }

    /// Store results in `buffer` from now on; a session-owned output is
    /// released
    pub fn set_output_buffer(&mut self, buffer: Arc<Buffer>) -> &mut Self {
        if let OutputTarget::Owned(Some(owned)) = &self.output {
            owned.destroy();
        }
        self.output = OutputTarget::Caller(buffer);
        self.bind_groups = None;
        if matches!(self.execution, Some(Execution::Copy)) {
            self.execution = None;
        }
        self.state = ReduceState::Uninitialized;
        self
    }

    /// Chaining form of [`set_output_buffer`](Self::set_output_buffer)
    pub fn with_output_buffer(mut self, buffer: Arc<Buffer>) -> Self {
        self.set_output_buffer(buffer);
        self
    }

    /// Byte offset of the result in the output buffer
    pub fn destination_offset(&self) -> u64 {
        self.destination_offset
    }

    /// Record the reduction into `encoder` without submitting it.
    pub fn encode(&mut self, encoder: &mut CommandEncoder) -> Result<()> {
        self.ensure_ready()?;
        let output = self.current_output()?;

        match &self.execution {
            Some(Execution::Copy) => {
                let size = T::SCALAR.size_in_bytes() as u64;
                encoder.copy_buffer_to_buffer(
                    &self.input,
                    self.input_offset,
                    output,
                    self.destination_offset,
                    size,
                );
            }
            Some(Execution::Passes(buffers)) => {
                let (Some((_, pipeline)), Some(bind_groups)) = (&self.pipeline, &self.bind_groups)
                else {
                    return Err(Error::Backend("reduction pipeline missing after build".into()));
                };
                for (i, (bind_group, dims)) in bind_groups.iter().zip(&buffers.dims).enumerate() {
                    encode_reduce_pass(
                        encoder,
                        pipeline,
                        bind_group,
                        *dims,
                        &format!("{NAME} pass {i}"),
                    );
                }
            }
            None => {
                return Err(Error::Backend("reduction resources missing after build".into()));
            }
        }
        Ok(())
    }

    /// Encode, submit, wait, and read the result back.
    ///
    /// The output buffer needs `COPY_SRC` usage.
    pub fn reduce(&mut self) -> Result<T> {
        let mut encoder =
            self.client
                .wgpu_device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(NAME),
                });
        self.encode(&mut encoder)?;
        self.client.submit_and_wait(encoder)?;

        let output = self.current_output()?;
        if !output.usage().contains(BufferUsages::COPY_SRC) {
            return Err(Error::configuration(
                "output_buffer",
                "reading the result back needs COPY_SRC usage",
            ));
        }

        let size = T::SCALAR.size_in_bytes() as u64;
        let start = self.destination_offset / COPY_ALIGNMENT * COPY_ALIGNMENT;
        let end =
            result_end(self.destination_offset, size)?.div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT;
        let bytes = self.client.read_bytes(output, start, end - start)?;

        let skip = (self.destination_offset - start) as usize;
        Ok(bytemuck::pod_read_unaligned(
            &bytes[skip..skip + size as usize],
        ))
    }

    /// Release intermediate buffers, params, bind groups and a
    /// session-owned output. Caller buffers are left alone; the pipeline
    /// stays in the device cache.
    pub fn destroy(&mut self) {
        self.bind_groups = None;
        self.release_execution();
        self.plan = None;
        self.pipeline = None;
        if let OutputTarget::Owned(owned) = &mut self.output {
            if let Some(buffer) = owned.take() {
                buffer.destroy();
            }
        }
        self.state = ReduceState::Uninitialized;
    }

    // ------------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------------

    fn ensure_ready(&mut self) -> Result<()> {
        if let Err(e) = self.client.check_alive() {
            self.invalidate_lost();
            return Err(e);
        }
        if self.state == ReduceState::Ready {
            return Ok(());
        }

        self.state = ReduceState::Building;
        match self.build() {
            Ok(()) => {
                self.state = ReduceState::Ready;
                Ok(())
            }
            Err(e) => {
                if e.is_device_lost() {
                    self.invalidate_lost();
                }
                self.state = ReduceState::Uninitialized;
                Err(e)
            }
        }
    }

    fn build(&mut self) -> Result<()> {
        let input = self.resolve_input()?;

        if self.plan.is_none() {
            let tile = self.tuning.tile_capacity()?;
            let plan = plan(input.count, tile, self.tuning.workgroup_size)?;
            tracing::debug!(%plan, elements = input.count, "planned reduction");
            self.plan = Some(plan);
            self.release_execution();
        }

        self.ensure_output()?;
        let output = self.current_output()?.clone();
        self.check_output(&output)?;

        // Compile before allocating pass buffers
        let needs_passes = match &self.execution {
            Some(Execution::Passes(_)) => true,
            Some(Execution::Copy) => false,
            None => !self.can_copy(&output)?,
        };
        if needs_passes && self.pipeline.is_none() {
            self.pipeline = Some(self.resolve_pipeline()?);
        }

        if self.execution.is_none() {
            let execution = self.create_execution(input, &output)?;
            self.execution = Some(execution);
            self.bind_groups = None;
        }

        if self.bind_groups.is_none() {
            self.bind_groups = Some(self.create_bind_groups(&output)?);
        }
        Ok(())
    }

    fn resolve_pipeline(&self) -> Result<(KernelKey, Arc<ComputePipeline>)> {
        let linked = self.linker.link(&LinkRequest {
            config: &self.config,
            combine_expr: self.binop.combine(),
            map_expr: self.map_fn.as_ref().map(MapFn::expr),
        })?;

        let cache = self.client.pipeline_cache();
        let layout = cache.get_or_create_layout(LayoutKey::REDUCE_BUFFER);
        let pipeline = cache.get_or_build(&linked, &layout, |module| {
            self.linker.validate(module)
        })?;
        Ok((linked.key().clone(), pipeline))
    }

    /// Resolve offset, stride and count in elements and check they fit the
    /// input buffer
    fn resolve_input(&self) -> Result<InputLayout> {
        let size = T::SCALAR.size_in_bytes() as u64;
        let stride = self.input_stride.unwrap_or(size);
        if self.input_offset % size != 0 {
            return Err(Error::configuration(
                "input_offset",
                format!("{} is not a multiple of the element size {size}", self.input_offset),
            ));
        }
        if stride == 0 || stride % size != 0 {
            return Err(Error::configuration(
                "input_stride",
                format!("{stride} is not a non-zero multiple of the element size {size}"),
            ));
        }

        let buffer_size = self.input.size();
        let available = match self.input_offset.checked_add(size) {
            Some(end) if end <= buffer_size => (buffer_size - end) / stride + 1,
            _ => 0,
        };
        let count = match self.element_count {
            Some(count) if count > available => {
                return Err(Error::configuration(
                    "element_count",
                    format!("{count} elements requested, input buffer holds {available}"),
                ));
            }
            Some(count) => count,
            None => available,
        };
        if count == 0 {
            return Err(Error::configuration(
                "element_count",
                "cannot reduce an empty buffer",
            ));
        }
        if count > u32::MAX as u64 {
            return Err(Error::configuration(
                "element_count",
                format!("{count} elements exceed the u32 index range"),
            ));
        }

        let offset = self.input_offset / size;
        let stride = stride / size;
        let last = offset + (count - 1) * stride;
        if last > u32::MAX as u64 {
            return Err(Error::configuration(
                "element_count",
                format!("last element index {last} does not fit in u32"),
            ));
        }
        Ok(InputLayout {
            offset: offset as u32,
            stride: stride as u32,
            count,
        })
    }

    fn ensure_output(&mut self) -> Result<()> {
        if let OutputTarget::Owned(owned) = &mut self.output {
            if owned.is_none() {
                let size = T::SCALAR.size_in_bytes() as u64;
                *owned = Some(Arc::new(create_owned_output(
                    &self.client,
                    self.destination_offset,
                    size,
                )?));
            }
        }
        Ok(())
    }

    fn current_output(&self) -> Result<&Arc<Buffer>> {
        self.output_buffer()
            .ok_or_else(|| Error::missing_field("output_buffer"))
    }

    fn check_output(&self, output: &Buffer) -> Result<()> {
        let size = T::SCALAR.size_in_bytes() as u64;
        if self.destination_offset % size != 0 {
            return Err(Error::configuration(
                "destination_offset",
                format!(
                    "{} is not a multiple of the element size {size}",
                    self.destination_offset
                ),
            ));
        }
        let end = result_end(self.destination_offset, size)?;
        if end > output.size() {
            return Err(Error::configuration(
                "destination_offset",
                format!(
                    "result at {} does not fit an output buffer of {} bytes",
                    self.destination_offset,
                    output.size()
                ),
            ));
        }
        Ok(())
    }

    fn current_plan(&self) -> Result<&PassPlan> {
        self.plan
            .as_ref()
            .ok_or_else(|| Error::Backend("reduction plan missing".into()))
    }

    /// Whether the single element can be copied into place without a pass
    fn can_copy(&self, output: &Buffer) -> Result<bool> {
        let size = T::SCALAR.size_in_bytes() as u64;
        Ok(self.current_plan()?.is_empty()
            && self.map_fn.is_none()
            && size % COPY_ALIGNMENT == 0
            && self.input_offset % COPY_ALIGNMENT == 0
            && self.destination_offset % COPY_ALIGNMENT == 0
            && self.input.usage().contains(BufferUsages::COPY_SRC)
            && output.usage().contains(BufferUsages::COPY_DST))
    }

    /// Pick copy or passes and allocate what the passes need
    fn create_execution(&self, input: InputLayout, output: &Buffer) -> Result<Execution> {
        if self.can_copy(output)? {
            return Ok(Execution::Copy);
        }
        let plan = self.current_plan()?;
        let size = T::SCALAR.size_in_bytes() as u64;

        let passes: Vec<PassDescriptor> = if plan.is_empty() {
            // One workgroup maps or moves the single element into place
            vec![PassDescriptor {
                workgroup_count: 1,
                input_element_count: 1,
                elements_per_thread: 1,
            }]
        } else {
            plan.passes().to_vec()
        };

        let max_binding = self
            .client
            .device()
            .limits()
            .max_storage_buffer_binding_size as u64;
        if self.input.size() > max_binding {
            return Err(Error::backend_limitation(
                "wgpu",
                "reduce_buffer",
                format!(
                    "input of {} bytes exceeds the {max_binding} byte storage binding limit",
                    self.input.size()
                ),
            ));
        }

        let max_per_dim = self.client.device().max_workgroups_per_dimension();
        let last = passes.len() - 1;
        let mut partials = Vec::with_capacity(last);
        let mut params = Vec::with_capacity(passes.len());
        let mut dims = Vec::with_capacity(passes.len());

        for (i, pass) in passes.iter().enumerate() {
            let pass_params = ReduceParams::new(
                pass.input_element_count as u32,
                if i == 0 { input.offset } else { 0 },
                if i == 0 { input.stride } else { 1 },
                if i == last {
                    (self.destination_offset / size) as u32
                } else {
                    0
                },
                pass.elements_per_thread,
                i == 0 && self.map_fn.is_some(),
                pass.workgroup_count,
            );
            let uniform = self.client.create_uniform_buffer(
                &format!("{NAME} params {i}"),
                std::mem::size_of::<ReduceParams>() as u64,
            );
            self.client.write_buffer(&uniform, &[pass_params]);
            params.push(uniform);

            if i < last {
                let bytes = (pass.workgroup_count as u64 * size).div_ceil(COPY_ALIGNMENT)
                    * COPY_ALIGNMENT;
                partials.push(
                    self.client
                        .create_storage_buffer(&format!("{NAME} partials {i}"), bytes),
                );
            }
            dims.push(dispatch_dims(pass.workgroup_count, max_per_dim)?);
        }

        Ok(Execution::Passes(PassBuffers {
            passes,
            partials,
            params,
            dims,
        }))
    }

    fn create_bind_groups(&self, output: &Buffer) -> Result<Vec<BindGroup>> {
        let Some(Execution::Passes(buffers)) = &self.execution else {
            return Ok(Vec::new());
        };
        if !self.input.usage().contains(BufferUsages::STORAGE) {
            return Err(Error::configuration(
                "input_buffer",
                "reduction passes need STORAGE usage",
            ));
        }
        if !output.usage().contains(BufferUsages::STORAGE) {
            return Err(Error::configuration(
                "output_buffer",
                "reduction passes need STORAGE usage",
            ));
        }

        let cache = self.client.pipeline_cache();
        let layout = cache.get_or_create_layout(LayoutKey::REDUCE_BUFFER);
        let last = buffers.passes.len() - 1;

        let bind_groups = (0..buffers.passes.len())
            .map(|i| {
                let source: &Buffer = if i == 0 {
                    &self.input
                } else {
                    &buffers.partials[i - 1]
                };
                let target: &Buffer = if i == last {
                    output
                } else {
                    &buffers.partials[i]
                };
                cache.create_bind_group(&layout, &[source, &buffers.params[i], target])
            })
            .collect();
        tracing::debug!(passes = buffers.passes.len(), "rebuilt reduction bind groups");
        Ok(bind_groups)
    }

    fn release_execution(&mut self) {
        if let Some(Execution::Passes(buffers)) = self.execution.take() {
            for buffer in buffers.partials.iter().chain(&buffers.params) {
                buffer.destroy();
            }
        }
        self.bind_groups = None;
    }

    /// Drop everything tied to a lost device
    fn invalidate_lost(&mut self) {
        self.bind_groups = None;
        self.execution = None;
        self.pipeline = None;
        self.state = ReduceState::Uninitialized;
    }
}

impl<T: Element> HostedShader for ReduceBuffer<T> {
    fn encode(&mut self, encoder: &mut CommandEncoder) -> Result<()> {
        ReduceBuffer::encode(self, encoder)
    }

    fn destroy(&mut self) {
        ReduceBuffer::destroy(self)
    }

    fn name(&self) -> &str {
        NAME
    }
}

impl<T: Element> Drop for ReduceBuffer<T> {
    fn drop(&mut self) {
        self.release_execution();
    }
}

fn check_type<T: Element>(binop: &BinOp) -> Result<()> {
    if binop.scalar_type() != T::SCALAR {
        return Err(Error::TypeMismatch {
            expected: T::SCALAR,
            got: binop.scalar_type(),
        });
    }
    Ok(())
}

/// Generator config for `binop` at `tuning`, checked against `device`
fn reduction_config<T: Element>(
    binop: &BinOp,
    tuning: &ReduceTuning,
    device: &WgpuDevice,
) -> Result<ReductionConfig> {
    if !device.subgroups_supported() {
        return Err(Error::backend_limitation(
            "wgpu",
            "reduce_buffer",
            format!("adapter '{}' lacks subgroup operations", device.adapter_name()),
        ));
    }
    if T::SCALAR == ScalarType::F16 && !device.shader_f16_supported() {
        return Err(Error::unsupported_type(T::SCALAR, "reduce_buffer"));
    }

    let subgroup_min_size = tuning
        .subgroup_min_size
        .unwrap_or(device.subgroup_size().0);
    let config = binop
        .reduction_config(tuning.workgroup_size, subgroup_min_size)
        .build()?;
    let temp_bytes = config.temp_array_len() as u64 * T::SCALAR.size_in_bytes() as u64;
    device.check_workgroup(config.workgroup_size(), temp_bytes)?;
    Ok(config)
}

/// Byte just past the result at `destination_offset`
fn result_end(destination_offset: u64, size: u64) -> Result<u64> {
    destination_offset.checked_add(size).ok_or_else(|| {
        Error::configuration(
            "destination_offset",
            format!("{destination_offset} overflows the buffer address range"),
        )
    })
}

fn create_owned_output(client: &WgpuClient, destination_offset: u64, size: u64) -> Result<Buffer> {
    let bytes = result_end(destination_offset, size)?
        .checked_next_multiple_of(COPY_ALIGNMENT)
        .ok_or_else(|| Error::configuration("destination_offset", "output size overflows"))?;
    Ok(client.create_storage_buffer(&format!("{NAME} output"), bytes))
}
