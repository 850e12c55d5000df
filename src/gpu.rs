//! Integrated GPU context that drives the simulation and renders it
//!
//! `GpuLife` owns every device resource of a run: the two cell buffers, the
//! prebuilt binding sets, both pipelines and the presentation surface. Each
//! [`GpuLife::tick`] records one compute pass followed by one render pass into
//! a single submission.

use std::{sync::Arc, time::Duration};

use wgpu::{
    CommandEncoderDescriptor, Device, Instance, Queue, Surface, SurfaceConfiguration,
    TextureUsages, TextureViewDescriptor,
};
use winit::window::Window;

use crate::{
    binding::{self, BindingSets},
    config::LifeConfig,
    error::SetupError,
    rendering::CellRenderer,
    schedule::{StepCounter, TickRate},
    sim::{
        GridParameters,
        gpucompute::{self, GridStore, SimulationPipeline},
    },
    util::{self, Color},
};

pub struct GpuLife {
    _instance: Instance,
    device: Arc<Device>,
    queue: Arc<Queue>,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    store: GridStore,
    bindings: BindingSets,
    simulation: SimulationPipeline,
    renderer: CellRenderer,
    background: Color,
    counter: StepCounter,
    window: Arc<Window>,
    tick_rate: TickRate,
}

impl GpuLife {
    /// Build every resource of a run for `window`.
    ///
    /// Fails without side effects when the adapter lacks a capability, the
    /// grid does not fit the device, or a shader disagrees with the binding
    /// layout.
    pub async fn new(window: Arc<Window>, config: &LifeConfig) -> Result<Self, SetupError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());

        // Create surface first to find compatible adapter
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = gpucompute::request_device(&adapter, "gridlife device").await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(SetupError::MissingCapability("a surface format for this window"))?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let params = config.grid;
        let store = GridStore::create(
            &device,
            &queue,
            params,
            &config.seed_a.seed(params),
            &config.seed_b.seed(params),
        )?;

        let layout = binding::create_layout(&device);
        let simulation = SimulationPipeline::create(&device, &layout).await?;
        let renderer = CellRenderer::create(&device, &layout, surface_format).await?;
        let bindings = BindingSets::new(&device, &layout, store.params_buf(), store.cells());

        log::info!(
            "grid {params} ready: {} cells, {:?} workgroups per step",
            params.cell_count(),
            params.workgroups(gpucompute::WORKGROUP_SIZE)
        );

        Ok(Self {
            _instance: instance,
            device,
            queue,
            surface,
            surface_config,
            store,
            bindings,
            simulation,
            renderer,
            background: config.background,
            counter: StepCounter::new(),
            window,
            tick_rate: TickRate::new(Duration::from_secs(5)),
        })
    }

    /// Request a redraw of the window
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Advance the simulation one step and draw the result.
    ///
    /// The surface texture is acquired before anything is recorded, so a
    /// surface error leaves the step counter untouched.
    pub fn tick(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        let plan = self.counter.plan(self.store.params());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("tick encoder"),
            });

        self.simulation.record(
            &mut encoder,
            self.bindings.set(plan.compute_set),
            plan.workgroups,
        );
        // The render set reads the buffer the compute pass just wrote
        self.renderer.record(
            &mut encoder,
            &view,
            self.bindings.set(plan.render_set),
            plan.instances,
            self.background,
        );

        // Submitting consumes the command buffer
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.counter.advance();

        if let Some(rate) = self.tick_rate.record(util::now_ms()) {
            log::debug!(
                "Actual tick rate: {rate:.1} ticks/sec, {} steps total",
                self.counter.steps()
            );
        }
        Ok(())
    }

    /// Resize the render surface
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_config.width = width;
            self.surface_config.height = height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    /// Reconfigure the surface at its current size after it was lost
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn grid(&self) -> GridParameters {
        self.store.params()
    }

    /// Number of completed ticks
    pub fn steps(&self) -> u64 {
        self.counter.steps()
    }
}
