use bytemuck::{Pod, Zeroable};
use wgpu::{
    Adapter, BindGroup, BindGroupLayout, Buffer, BufferDescriptor, BufferUsages, CommandEncoder,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    Device, Instance, Queue, ShaderStages,
    util::{BufferInitDescriptor, DeviceExt},
};

use crate::{
    binding::{self, BindingSets},
    error::SetupError,
    schedule::StepCounter,
    sim::{Grid, GridParameters, SeedPolicy},
};

/// Edge length of the square compute workgroup
pub const WORKGROUP_SIZE: u32 = 8;

const CELL_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Uniform block holding the grid dimensions, read by every stage
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GridUniform {
    pub size: [u32; 2],
    _padding: [u32; 2],
}

impl GridUniform {
    /// WGSL mirror of this struct
    pub const WGSL: &'static str = "struct GridParams {
    size: vec2<u32>,
    _padding: vec2<u32>,
}
";

    pub fn new(params: GridParameters) -> Self {
        Self {
            size: [params.width, params.height],
            _padding: [0; 2],
        }
    }
}

/// Ask `adapter` for a device, failing early when it cannot run the
/// simulation at all.
pub async fn request_device(
    adapter: &Adapter,
    label: &'static str,
) -> Result<(Device, Queue), SetupError> {
    let downlevel_caps = adapter.get_downlevel_capabilities();
    if !downlevel_caps
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        return Err(SetupError::MissingCapability("compute shaders"));
    }
    if !downlevel_caps
        .flags
        .contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
    {
        return Err(SetupError::MissingCapability(
            "storage buffers in vertex shaders",
        ));
    }

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        })
        .await?;
    Ok((device, queue))
}

/// The two cell snapshots plus the uniform block describing them.
pub struct GridStore {
    params: GridParameters,
    cells: [Buffer; 2],
    params_buf: Buffer,
}

impl GridStore {
    /// Allocate both cell buffers and upload their seeds, one bulk write each.
    /// The two seeds do not have to match.
    pub fn create(
        device: &Device,
        queue: &Queue,
        params: GridParameters,
        seed_a: &[u32],
        seed_b: &[u32],
    ) -> Result<Self, SetupError> {
        let cell_count = params.cell_count();
        if cell_count == 0 {
            return Err(SetupError::EmptyGrid(params));
        }
        let bytes = cell_count as u64 * CELL_SIZE;
        let limits = device.limits();
        let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > limit {
            return Err(SetupError::GridTooLarge {
                cells: cell_count,
                bytes,
                limit,
            });
        }

        let make = |label| {
            device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: bytes,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let cells = [make("cell state A"), make("cell state B")];
        upload_seed(queue, &cells[0], seed_a)?;
        upload_seed(queue, &cells[1], seed_b)?;

        let params_buf = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("grid parameters buffer"),
            contents: bytemuck::bytes_of(&GridUniform::new(params)),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        log::debug!("allocated two {bytes} byte cell buffers for a {params} grid");
        Ok(Self {
            params,
            cells,
            params_buf,
        })
    }

    pub fn params(&self) -> GridParameters {
        self.params
    }

    pub fn cells(&self) -> &[Buffer; 2] {
        &self.cells
    }

    pub fn params_buf(&self) -> &Buffer {
        &self.params_buf
    }
}

/// Checked bulk write of a seed into a cell buffer
pub fn upload_seed(queue: &Queue, buffer: &Buffer, seed: &[u32]) -> Result<(), SetupError> {
    check_seed_fits(seed.len(), buffer.size())?;
    queue.write_buffer(buffer, 0, bytemuck::cast_slice(seed));
    Ok(())
}

fn check_seed_fits(cells: usize, capacity: u64) -> Result<(), SetupError> {
    if cells as u64 * CELL_SIZE > capacity {
        return Err(SetupError::SeedOverflow { cells, capacity });
    }
    Ok(())
}

/// Compute program applying one generation from the read slot into the write
/// slot.
pub struct SimulationPipeline {
    pipeline: ComputePipeline,
}

impl SimulationPipeline {
    pub async fn create(device: &Device, layout: &BindGroupLayout) -> Result<Self, SetupError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("simulation compute shader"),
            source: wgpu::ShaderSource::Wgsl(
                binding::shader_source(ShaderStages::COMPUTE, include_str!("./shader.wgsl"))
                    .into(),
            ),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("simulation pipeline layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("simulation compute pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(SetupError::PipelineLayout {
                stage: "simulation",
                message: error.to_string(),
            });
        }
        Ok(Self { pipeline })
    }

    /// Record one compute pass over the whole grid.
    pub fn record(&self, encoder: &mut CommandEncoder, bindings: &BindGroup, workgroups: (u32, u32)) {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("simulation step compute pass"),
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bindings, &[]);
        pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
    }
}

/// Surface-less simulation context. Runs the same buffers, bindings and
/// compute program as the windowed renderer, and can read the current
/// snapshot back to the host.
pub struct ComputeContext {
    device: Device,
    queue: Queue,
    store: GridStore,
    bindings: BindingSets,
    pipeline: SimulationPipeline,
    counter: StepCounter,
}

impl ComputeContext {
    pub async fn create(
        params: GridParameters,
        seed_a: &SeedPolicy,
        seed_b: &SeedPolicy,
        counter: StepCounter,
    ) -> Result<Self, SetupError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        log::info!("Using adapter: {:?}", adapter.get_info());
        let (device, queue) = request_device(&adapter, "gridlife headless device").await?;

        let store = GridStore::create(
            &device,
            &queue,
            params,
            &seed_a.seed(params),
            &seed_b.seed(params),
        )?;
        let layout = binding::create_layout(&device);
        let pipeline = SimulationPipeline::create(&device, &layout).await?;
        let bindings = BindingSets::new(&device, &layout, store.params_buf(), store.cells());

        Ok(Self {
            device,
            queue,
            store,
            bindings,
            pipeline,
            counter,
        })
    }

    /// Advance the simulation by one generation.
    pub fn step(&mut self) {
        let plan = self.counter.plan(self.store.params());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("compute encoder"),
            });
        self.pipeline.record(
            &mut encoder,
            self.bindings.set(plan.compute_set),
            plan.workgroups,
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        self.counter.advance();
    }

    pub fn steps(&self) -> u64 {
        self.counter.steps()
    }

    /// Copy the current snapshot (the one the next step reads) back to the
    /// host.
    pub async fn read_current(&self) -> Result<Grid, SetupError> {
        let (read, _) = binding::set_buffers(self.counter.parity());
        let src_buf = &self.store.cells()[read];
        let tmpbuf = self.device.create_buffer(&BufferDescriptor {
            label: Some("cell readback buffer"),
            size: src_buf.size(),
            mapped_at_creation: false,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(src_buf, 0, &tmpbuf, 0, None);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = tmpbuf.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        #[cfg(not(target_arch = "wasm32"))]
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        rx.receive().await.ok_or(SetupError::ReadbackIncomplete)??;

        let cells: Vec<u32> = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice(&view).to_vec()
        };
        tmpbuf.unmap();
        Grid::from_cells(self.store.params(), cells).ok_or(SetupError::ReadbackIncomplete)
    }
}
