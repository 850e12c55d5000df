use std::sync::Arc;

use crate::{
    config::LifeConfig,
    gpu::GpuLife,
    schedule::{TickBacklog, TickTimer},
};
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;
use winit::{
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{WindowAttributes, WindowId},
};

#[cfg(target_arch = "wasm32")]
use winit::platform::web::WindowAttributesExtWebSys;

pub mod binding;
pub mod config;
pub mod error;
pub mod gpu;
pub mod rendering;
pub mod schedule;
pub mod sim;
pub mod util;

/// Events delivered to the application through the event loop
pub enum LifeMessage {
    Initialized(GpuLife),
    Error(String),
    /// The tick timer fired
    Tick,
}

struct Application {
    /// Taken once the renderer is being built
    init_proxy: Option<EventLoopProxy<LifeMessage>>,
    timer_proxy: EventLoopProxy<LifeMessage>,
    renderer: Option<GpuLife>,
    config: LifeConfig,
    timer: Option<TickTimer>,
    backlog: TickBacklog,
}

impl Application {
    fn new(event_loop: &EventLoop<LifeMessage>, config: LifeConfig) -> Self {
        Self {
            init_proxy: Some(event_loop.create_proxy()),
            timer_proxy: event_loop.create_proxy(),
            renderer: None,
            config,
            timer: None,
            backlog: TickBacklog::default(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn window_attributes(&self) -> Option<WindowAttributes> {
        let canvas: HtmlCanvasElement = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(&self.config.canvas_id))
            .and_then(|e| e.dyn_into().ok())?;
        Some(WindowAttributes::default().with_canvas(Some(canvas)))
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn window_attributes(&self) -> Option<WindowAttributes> {
        Some(
            WindowAttributes::default()
                .with_title(format!("gridlife {}", self.config.grid))
                .with_inner_size(winit::dpi::LogicalSize::new(768.0, 768.0)),
        )
    }

    fn start_timer(&mut self) {
        let proxy = self.timer_proxy.clone();
        self.timer = Some(TickTimer::start(self.config.tick_interval, move || {
            proxy.send_event(LifeMessage::Tick).is_ok()
        }));
        log::info!("ticking every {:?}", self.config.tick_interval);
    }

    /// Stop submitting before the device resources go away.
    fn teardown(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        self.backlog.clear();
        if let Some(renderer) = self.renderer.take() {
            log::info!(
                "releasing GPU resources of the {} grid after {} steps",
                renderer.grid(),
                renderer.steps()
            );
        }
    }
}

impl winit::application::ApplicationHandler<LifeMessage> for Application {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() || self.init_proxy.is_none() {
            return;
        }

        let Some(window_attrs) = self.window_attributes() else {
            log::error!(
                "could not find a canvas with id `{}` to render into",
                self.config.canvas_id
            );
            return;
        };
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                return;
            }
        };
        let Some(proxy) = self.init_proxy.take() else {
            return;
        };
        let config = self.config.clone();

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let message = match GpuLife::new(window, &config).await {
                Ok(renderer) => LifeMessage::Initialized(renderer),
                Err(e) => LifeMessage::Error(e.to_string()),
            };
            let _ = proxy.send_event(message);
        });

        #[cfg(not(target_arch = "wasm32"))]
        {
            // On native, use pollster to block on the future
            let message = match pollster::block_on(GpuLife::new(window, &config)) {
                Ok(renderer) => LifeMessage::Initialized(renderer),
                Err(e) => LifeMessage::Error(e.to_string()),
            };
            let _ = proxy.send_event(message);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(ref mut renderer) = self.renderer else {
                    return;
                };
                if !self.backlog.take() {
                    return;
                }
                let mut fatal = false;
                match renderer.tick() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        // The tick did not run; retry it on the reconfigured surface
                        renderer.reconfigure();
                        self.backlog.push();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of memory!");
                        fatal = true;
                    }
                    Err(e) => log::warn!("Surface error: {e:?}"),
                }
                if fatal {
                    self.teardown();
                    event_loop.exit();
                } else if self.backlog.pending() > 0 {
                    renderer.request_redraw();
                }
            }
            _ => (),
        };
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: LifeMessage) {
        match event {
            LifeMessage::Initialized(renderer) => {
                log::info!("GPU renderer initialized successfully");
                self.renderer = Some(renderer);
                self.start_timer();
            }
            LifeMessage::Error(e) => {
                log::error!("GPU initialization error: {e}");
                event_loop.exit();
            }
            LifeMessage::Tick => {
                if let Some(ref renderer) = self.renderer
                    && self.backlog.push()
                {
                    renderer.request_redraw();
                }
            }
        }
    }
}

/// Build the event loop and run the simulation until the window closes.
///
/// On the web this returns immediately and the browser drives the loop.
pub fn run(config: LifeConfig) -> anyhow::Result<()> {
    log::info!(
        "Starting gridlife on a {} grid (seed A: {:?}, seed B: {:?})",
        config.grid,
        config.seed_a,
        config.seed_b
    );

    let event_loop = EventLoop::<LifeMessage>::with_user_event().build()?;

    #[allow(unused_mut)]
    let mut app = Application::new(&event_loop, config);

    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;
        event_loop.spawn_app(app);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        event_loop.run_app(&mut app)?;
    }
    Ok(())
}

#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();
    util::setup_logging(log::LevelFilter::Debug);
}

/// Start the simulation in the page's `life-surface` canvas
#[wasm_bindgen]
pub fn start() -> Result<(), JsValue> {
    run(LifeConfig::default()).map_err(|e| JsValue::from_str(&e.to_string()))
}
