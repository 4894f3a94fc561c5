// =============================================================================
// LAUNCHPAD DEMO - a model seen through an orbit or fly camera
// =============================================================================
//
// FRAME FLOW:
// 1. Update the camera from the collected input
// 2. Wait for the previous frame and acquire a swapchain image
// 3. Project the model on the CPU into a host-coherent vertex buffer
// 4. Record: basic pipeline, vertex buffer, draw
// 5. Submit and present
//
// Controls: left drag rotates (orbit) or the cursor steers (fly), right drag
// strafes, the wheel zooms, W/A/S/D/Space/Ctrl/Shift fly, ESC quits.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use glam::{Mat4, Vec3};
use raw_window_handle::HasDisplayHandle;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use vk_launchpad::assets::{load_model_geometry, parse_model_geometry};
use vk_launchpad::backend::{Surface, Swapchain, VulkanDevice};
use vk_launchpad::camera::{Camera, FlyCamera, InputState, OrbitCamera};
use vk_launchpad::config::{CameraKind, Config};
use vk_launchpad::math::create_perspective_projection_matrix;
use vk_launchpad::{Launchpad, LaunchpadError};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

/// Shown when no model is configured
const CUBE_OBJ: &str = "\
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
f 1 3 2
f 1 4 3
f 5 6 7
f 5 7 8
f 1 2 6
f 1 6 5
f 4 7 3
f 4 8 7
f 1 5 8
f 1 8 4
f 2 3 7
f 2 7 6
";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting launchpad demo");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, into the log file instead of stderr when file
/// output is enabled
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);

    let mut file_error = None;
    if config.debug.log_to_file {
        match open_log_file(&config.debug.log_file) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }
    builder.init();

    if let Some(e) = file_error {
        log::warn!("Cannot log to {:?}, using stderr: {}", config.debug.log_file, e);
    }
}

/// Truncate the log file and start it with a header
fn open_log_file(path: impl AsRef<Path>) -> std::io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "=== Launchpad Log ===")?;
    writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
    writeln!(file)?;
    Ok(file)
}

/// Project triangles into normalized device coordinates.
///
/// The basic vertex shader negates y, so y is stored flipped. Triangles
/// with a corner behind the camera collapse to a point.
fn project_triangles(positions: &[Vec3], view_projection: Mat4) -> Vec<[f32; 3]> {
    let mut projected = Vec::with_capacity(positions.len());

    for triangle in positions.chunks_exact(3) {
        let clip: Vec<_> = triangle
            .iter()
            .map(|p| view_projection * p.extend(1.0))
            .collect();

        if clip.iter().any(|c| c.w <= f32::EPSILON) {
            projected.extend([[0.0; 3]; 3]);
            continue;
        }

        for c in clip {
            let ndc = c.truncate() / c.w;
            projected.push([ndc.x, -ndc.y, ndc.z]);
        }
    }

    projected
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Everything tied to the Vulkan device.
///
/// IMPORTANT: Field order matters for Drop! The framework goes before the
/// swapchain it renders into, which goes before the surface and device.
struct Gpu {
    launchpad: Launchpad,
    swapchain: Swapchain,
    _surface: Surface,
    _device: Arc<VulkanDevice>,

    vertex_buffer: vk::Buffer,
    positions: Vec<Vec3>,
}

impl Drop for Gpu {
    fn drop(&mut self) {
        let _ = self.launchpad.device().wait_idle();
        self.launchpad.destroy_host_coherent_buffer(self.vertex_buffer);
    }
}

struct App {
    config: Config,

    // GPU state drops before the window it presents to
    gpu: Option<Gpu>,
    window: Option<Arc<Window>>,

    camera: Option<Box<dyn Camera>>,
    input: InputState,

    // FPS tracking
    frame_count: u32,
    wait_seconds: f64,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            gpu: None,
            window: None,
            camera: None,
            input: InputState::new(),
            frame_count: 0,
            wait_seconds: 0.0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_vulkan(&self, window: &Window) -> Result<Gpu> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let device = VulkanDevice::new(&self.config.window.title, enable_validation, display)?;

        let surface = Surface::new(device.clone(), window)?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            &surface,
            size.width,
            size.height,
            self.config.present_mode(),
            self.config.graphics.clear_color,
            self.config.graphics.depth_buffer,
        )?;

        let mut launchpad = Launchpad::new(device.clone(), &surface, swapchain.config())?;
        if launchpad.basic_pipeline().is_none() {
            log::warn!("No basic pipeline, only the clear color will be visible");
        }

        let geometry = match &self.config.graphics.model {
            Some(path) => load_model_geometry(path)?,
            None => parse_model_geometry(CUBE_OBJ)?,
        };
        if geometry.positions.is_empty() {
            anyhow::bail!("Model has no triangles");
        }

        let vertex_buffer = launchpad.create_host_coherent_buffer(
            std::mem::size_of_val(geometry.positions.as_slice()) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        log::info!("Vulkan initialized successfully!");

        Ok(Gpu {
            launchpad,
            swapchain,
            _surface: surface,
            _device: device,
            vertex_buffer,
            positions: geometry.positions,
        })
    }

    fn create_camera(&self, extent: vk::Extent2D) -> Box<dyn Camera> {
        let camera = &self.config.camera;
        let projection = create_perspective_projection_matrix(
            camera.field_of_view_degrees.to_radians(),
            extent.width as f32 / extent.height.max(1) as f32,
            camera.near_plane,
            camera.far_plane,
        );

        match camera.kind {
            CameraKind::Orbit => {
                let mut orbit = OrbitCamera::new(projection);
                orbit.set_zoom(camera.orbit_distance);
                Box::new(orbit)
            }
            CameraKind::Fly => {
                // Start where the orbit camera would, looking at the origin
                let mut fly = FlyCamera::new(projection);
                fly.set_position(Vec3::new(-camera.orbit_distance, 0.0, 0.0));
                Box::new(fly)
            }
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    fn render_frame(&mut self) -> Result<()> {
        let (Some(gpu), Some(camera)) = (self.gpu.as_mut(), self.camera.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        camera.update_from_input(&self.input, dt);
        self.input.end_frame();

        self.wait_seconds += gpu.launchpad.wait_for_next_swapchain_image()?;

        let vertices = project_triangles(&gpu.positions, camera.view_projection_matrix());
        gpu.launchpad
            .copy_data_into_host_coherent_buffer(gpu.vertex_buffer, &vertices)?;

        let command_buffer = gpu.launchpad.start_recording_commands()?;
        if let Some(pipeline) = gpu.launchpad.basic_pipeline() {
            let device = &gpu.launchpad.device().device;
            unsafe {
                device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_bind_vertex_buffers(command_buffer, 0, &[gpu.vertex_buffer], &[0]);
                device.cmd_draw(command_buffer, vertices.len() as u32, 1, 0, 0);
            }
        }
        gpu.launchpad.end_recording_commands()?;
        gpu.launchpad.present_current_swapchain_image()?;

        Ok(())
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed < 1.0 {
            return;
        }

        let fps = self.frame_count as f64 / elapsed;
        let wait_ms = self.wait_seconds * 1000.0 / self.frame_count as f64;

        if let Some(ref window) = self.window {
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms waiting)",
                self.config.window.title, fps, wait_ms
            ));
        }

        self.frame_count = 0;
        self.wait_seconds = 0.0;
        self.last_fps_update = now;
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

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match self.init_vulkan(&window) {
            Ok(gpu) => {
                self.camera = Some(self.create_camera(gpu.swapchain.extent));
                self.gpu = Some(gpu);
            }
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(()) => self.update_fps(),
                Err(e) => {
                    if let Some(LaunchpadError::SwapchainOutOfDate) = e.downcast_ref::<LaunchpadError>() {
                        log::error!("Window surface changed, the swapchain cannot be recreated. Exiting.");
                    } else {
                        log::error!("Render error: {:?}. Exiting.", e);
                    }
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_file_starts_with_a_header_and_takes_records() {
        let path = std::env::temp_dir().join(format!("launchpad-demo-log-{}.log", std::process::id()));
        std::fs::write(&path, "left over from the last run\n").unwrap();

        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "[INFO] frame 1").unwrap();
        drop(file);

        let contents = std::fs::read_to_string(&path);
        let _ = std::fs::remove_file(&path);
        let contents = contents.unwrap();
        assert!(contents.starts_with("=== Launchpad Log ==="));
        assert!(contents.ends_with("[INFO] frame 1\n"));
        assert!(!contents.contains("left over"));
    }

    #[test]
    fn cube_source_parses() {
        let cube = parse_model_geometry(CUBE_OBJ).unwrap();
        assert_eq!(cube.positions.len(), 36);
    }

    #[test]
    fn identity_projection_only_flips_y() {
        let positions = [
            Vec3::new(0.5, 0.25, 0.1),
            Vec3::new(-0.5, 0.5, 0.2),
            Vec3::new(0.0, -0.75, 0.3),
        ];
        let projected = project_triangles(&positions, Mat4::IDENTITY);

        assert_eq!(projected.len(), 3);
        assert_relative_eq!(projected[0][0], 0.5);
        assert_relative_eq!(projected[0][1], -0.25);
        assert_relative_eq!(projected[2][1], 0.75);
        assert_relative_eq!(projected[1][2], 0.2);
    }

    #[test]
    fn triangles_behind_the_camera_collapse() {
        let projection = create_perspective_projection_matrix(1.0, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let behind = [
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(1.0, 0.0, 5.0),
            Vec3::new(0.0, 1.0, 5.0),
        ];

        let projected = project_triangles(&behind, projection * view);
        assert!(projected.iter().all(|v| *v == [0.0; 3]));
    }

    #[test]
    fn trailing_partial_triangle_is_dropped() {
        let positions = [Vec3::ZERO; 4];
        assert_eq!(project_triangles(&positions, Mat4::IDENTITY).len(), 3);
    }
}
