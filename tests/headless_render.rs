//! Draws ticks into an offscreen texture and checks which cells come out lit.
//!
//! Machines without a usable adapter skip these tests instead of failing.

use gridlife::{
    binding::{self, BindingSets, CELL_BINDINGS, PARAMS_SLOT},
    error::SetupError,
    rendering::{self, BACKGROUND, CellRenderer},
    schedule::StepCounter,
    sim::{
        Grid, GridParameters, SeedPolicy,
        gpucompute::{self, GridStore, SimulationPipeline},
    },
};
use wgpu::{Device, Queue, TextureFormat};

/// Pixels per cell edge in the offscreen target
const CELL_PX: u32 = 16;

fn device() -> Option<(Device, Queue)> {
    let _ = env_logger::builder().is_test(true).try_init();
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
        {
            Ok(adapter) => adapter,
            Err(e) => {
                eprintln!("skipping: {e}");
                return None;
            }
        };
        match gpucompute::request_device(&adapter, "render test device").await {
            Ok(pair) => Some(pair),
            Err(e @ SetupError::MissingCapability(_)) => {
                eprintln!("skipping: {e}");
                None
            }
            Err(e) => panic!("failed to request device: {e}"),
        }
    })
}

/// Run one full tick from `counter` into a fresh texture and return the set
/// of cells whose center pixel was drawn, in row-major order.
fn render_tick(
    device: &Device,
    queue: &Queue,
    params: GridParameters,
    seed_a: &SeedPolicy,
    seed_b: &SeedPolicy,
    counter: StepCounter,
) -> Vec<(u32, u32)> {
    let format = TextureFormat::Rgba8Unorm;
    let store = GridStore::create(
        device,
        queue,
        params,
        &seed_a.seed(params),
        &seed_b.seed(params),
    )
    .unwrap();
    let layout = binding::create_layout(device);
    let simulation = pollster::block_on(SimulationPipeline::create(device, &layout)).unwrap();
    let renderer = pollster::block_on(CellRenderer::create(device, &layout, format)).unwrap();
    let bindings = BindingSets::new(device, &layout, store.params_buf(), store.cells());

    let (width, height) = (params.width * CELL_PX, params.height * CELL_PX);
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    // Rows must be 256 byte aligned for the copy
    let bytes_per_row = (width * 4).div_ceil(256) * 256;
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("offscreen readback"),
        size: (bytes_per_row * height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let plan = counter.plan(params);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("offscreen tick encoder"),
    });
    simulation.record(
        &mut encoder,
        bindings.set(plan.compute_set),
        plan.workgroups,
    );
    renderer.record(
        &mut encoder,
        &view,
        bindings.set(plan.render_set),
        plan.instances,
        BACKGROUND,
    );
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    let _ = device.poll(wgpu::PollType::wait_indefinitely());
    pollster::block_on(rx.receive()).unwrap().unwrap();

    let pixels = slice.get_mapped_range();
    let mut lit = Vec::new();
    for y in 0..params.height {
        for x in 0..params.width {
            // Clip space y points up, texture rows go down
            let px = x * CELL_PX + CELL_PX / 2;
            let py = (params.height - 1 - y) * CELL_PX + CELL_PX / 2;
            let offset = (py * bytes_per_row + px * 4) as usize;
            // The background has no blue, every drawn cell does
            if pixels[offset + 2] > 32 {
                lit.push((x, y));
            }
        }
    }
    lit
}

#[test]
fn tick_draws_the_generation_it_just_computed() {
    let Some((device, queue)) = device() else {
        return;
    };
    let params = GridParameters::square(4);
    let vertical = SeedPolicy::Pattern(vec![(1, 0), (1, 1), (1, 2)]);

    let lit = render_tick(
        &device,
        &queue,
        params,
        &vertical,
        &SeedPolicy::Empty,
        StepCounter::new(),
    );
    assert_eq!(lit, vec![(0, 1), (1, 1), (2, 1)]);
    assert_eq!(lit, Grid::seeded(params, &vertical).step().live_cells());
}

#[test]
fn odd_tick_draws_into_buffer_a() {
    let Some((device, queue)) = device() else {
        return;
    };
    let params = GridParameters::new(5, 4);
    let glider = SeedPolicy::glider(0, 0);

    // At odd parity buffer B is read and buffer A is drawn
    let lit = render_tick(
        &device,
        &queue,
        params,
        &SeedPolicy::Alternating,
        &glider,
        StepCounter::starting_at(1),
    );
    assert_eq!(lit, Grid::seeded(params, &glider).step().live_cells());
}

#[test]
fn empty_grid_draws_only_background() {
    let Some((device, queue)) = device() else {
        return;
    };
    let lit = render_tick(
        &device,
        &queue,
        GridParameters::square(6),
        &SeedPolicy::Empty,
        &SeedPolicy::Empty,
        StepCounter::new(),
    );
    assert!(lit.is_empty());
}

#[test]
fn pipelines_reject_a_layout_missing_their_slots() {
    let Some((device, _queue)) = device() else {
        return;
    };
    let params_only = &CELL_BINDINGS[PARAMS_SLOT as usize];
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("params only layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: params_only.slot,
            visibility: params_only.visibility,
            ty: wgpu::BindingType::Buffer {
                ty: params_only.ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });

    let simulation = pollster::block_on(SimulationPipeline::create(&device, &layout));
    assert!(matches!(
        simulation,
        Err(SetupError::PipelineLayout {
            stage: "simulation",
            ..
        })
    ));

    let render = pollster::block_on(rendering::create_render_pipeline(
        &device,
        &layout,
        TextureFormat::Rgba8Unorm,
    ));
    assert!(matches!(
        render,
        Err(SetupError::PipelineLayout { stage: "render", .. })
    ));
}
