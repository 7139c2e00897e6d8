// =============================================================================
// VK-QUAD - Rotating textured quad on raw Vulkan
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, resize tracking, FPS title)             │
// │    └── Renderer (frame loop, swapchain recreation)              │
// │          └── SwapchainBundle (pipeline, framebuffers, UBOs)     │
// │                └── VulkanDevice (instance, surface, queues)     │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for this slot's fence
// 2. Acquire swapchain image (recreate if out of date)
// 3. Wait for whichever frame last rendered into that image
// 4. Update the image's uniform buffer
// 5. Submit the pre-recorded command buffer
// 6. Present and advance the slot
//
// =============================================================================

mod backend;
mod config;
mod renderer;
mod resize;
mod scene;

use anyhow::{Context, Result};
use backend::VulkanDevice;
use config::Config;
use renderer::{FrameStatus, Renderer, RendererSettings};
use resize::ResizeTracker;
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_error) = Config::load();

    init_logging(&config)?;
    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting vk-quad");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize env_logger from the config; RUST_LOG takes precedence
fn init_logging(config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();

    if let Some(ref path) = config.debug.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Window plus renderer.
///
/// Field order matters for Drop: the renderer (and with it the last handle
/// on the device) goes before the window the surface was created from.
struct App {
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    config: Config,
    resize: ResizeTracker,
    is_fullscreen: bool,

    /// First fatal error; returned from main once the loop exits
    error: Option<anyhow::Error>,

    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let resize = ResizeTracker::new(config.window.width, config.window.height);
        let now = Instant::now();
        Self {
            renderer: None,
            window: None,
            config,
            resize,
            is_fullscreen,
            error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(
            &self.config.window.title,
            enable_validation,
            self.config.debug.dump_device_info,
            window,
        )?;

        let size = window.inner_size();
        self.resize = ResizeTracker::new(size.width, size.height);

        let settings = RendererSettings {
            clear_color: self.config.graphics.clear_color,
            present_mode: self.config.preferred_present_mode(),
            frames_in_flight: self.config.frames_in_flight(),
            dump_info: self.config.debug.dump_device_info,
        };

        let renderer = Renderer::new(device, settings, self.resize.extent())?;

        self.renderer = Some(renderer);
        Ok(())
    }

    /// Recreate if due, then draw unless the window has no area
    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if let Some(extent) = self.resize.take_pending() {
            renderer.recreate(extent)?;
        }

        if self.resize.is_minimized() {
            return Ok(());
        }

        match renderer.draw_frame()? {
            FrameStatus::Presented => self.update_fps(),
            FrameStatus::Stale => self.resize.mark_stale(),
        }

        Ok(())
    }

    /// Record the error and stop the event loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:?}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.resize.mark_stale();
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        // Stored first so it outlives anything created from it
        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resize.on_resized(size.width, size.height);

                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("Frame failed"));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // No redraw requests while minimized: the loop sleeps until the
        // next Resized event restores the window
        if self.resize.is_minimized() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer Drop waits for the device to go idle
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}
