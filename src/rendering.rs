mod render_pass;
mod render_pipeline;

use std::sync::Arc;
use winit::window::Window;

use render_pass::begin_fullscreen_pass;
use render_pipeline::{PresentPipelines, TRAIL_FORMAT};

use crate::compute::{HostImage, ImageLayout};
use crate::error::AppError;
use crate::frame::{PresentOutcome, Presenter};

pub(crate) const WINDOW_TITLE: &str = "N-Body Viewer";

/// Presents the computed image in the window.
///
/// Each frame the host image is uploaded to `frame_texture`, blended into
/// `trail_texture` with a constant weight, and the trail texture is scaled onto
/// the surface. The overlay goes to the window title.
pub(crate) struct Renderer {
    frame_bind_group: wgpu::BindGroup,
    trail_bind_group: wgpu::BindGroup,
    frame_texture: wgpu::Texture,
    trail_view: wgpu::TextureView,
    pipelines: PresentPipelines,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    queue: wgpu::Queue,
    device: wgpu::Device,
    window: Arc<Window>,

    layout: ImageLayout,
    trail_alpha: f64,
    // The trail starts from the first frame instead of blending with black
    trail_started: bool,
    overlay: Vec<String>,
}

impl Renderer {
    pub(crate) async fn new(window: Arc<Window>, layout: ImageLayout, trail_alpha: f64) -> Result<Self, AppError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| AppError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| AppError::Surface(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Presentation Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| AppError::Surface(e.to_string()))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // The image holds linear values meant to be shown as-is
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| AppError::Surface("surface reports no supported formats".into()))?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let pipelines = PresentPipelines::new(&device, surface_format);

        let extent = wgpu::Extent3d {
            width: layout.width,
            height: layout.height,
            depth_or_array_layers: 1,
        };
        let frame_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let trail_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Trail Texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TRAIL_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let frame_view = frame_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let trail_view = trail_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Trail Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &pipelines.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&frame_view),
            }],
        });
        let trail_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Bind Group"),
            layout: &pipelines.trail_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&trail_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        log::info!(
            "Presenting on {} with {:?} ({}x{})",
            adapter.get_info().name,
            surface_format,
            surface_config.width,
            surface_config.height
        );

        Ok(Self {
            frame_bind_group,
            trail_bind_group,
            frame_texture,
            trail_view,
            pipelines,
            surface,
            surface_config,
            queue,
            device,
            window,
            layout,
            trail_alpha,
            trail_started: false,
            overlay: Vec::new(),
        })
    }

    pub(crate) fn window(&self) -> &Window {
        &self.window
    }

    pub(crate) fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.surface_config.width = new_size.width;
            self.surface_config.height = new_size.height;
            self.surface.configure(&self.device, &self.surface_config);
        }
    }

    fn upload(&self, image: &HostImage) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.frame_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                // Rows keep the compute image's pitch
                bytes_per_row: Some(self.layout.bytes_per_row()),
                rows_per_image: Some(self.layout.height),
            },
            wgpu::Extent3d {
                width: self.layout.width,
                height: self.layout.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn update_overlay(&mut self, overlay: &[String]) {
        if self.overlay.as_slice() == overlay {
            return;
        }
        let text = overlay.join(" | ");
        log::info!("{text}");
        self.window.set_title(&format!("{WINDOW_TITLE} | {text}"));
        self.overlay = overlay.to_vec();
    }
}

impl Presenter for Renderer {
    fn present(&mut self, image: &HostImage, overlay: &[String]) -> Result<PresentOutcome, AppError> {
        if image.layout() != self.layout {
            return Err(AppError::Surface(format!(
                "image is {}x{}, presenter expects {}x{}",
                image.layout().width,
                image.layout().height,
                self.layout.width,
                self.layout.height
            )));
        }
        self.update_overlay(overlay);

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(PresentOutcome::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timed out acquiring surface texture, skipping frame");
                return Ok(PresentOutcome::Skipped);
            }
            Err(e) => return Err(AppError::Surface(e.to_string())),
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.upload(image);

        let alpha = if self.trail_started { self.trail_alpha } else { 1.0 };
        self.trail_started = true;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });

        {
            let mut pass = begin_fullscreen_pass(&mut encoder, &self.trail_view, "Accumulate Pass", wgpu::LoadOp::Load);
            pass.set_pipeline(&self.pipelines.accumulate);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            pass.set_blend_constant(wgpu::Color {
                r: alpha,
                g: alpha,
                b: alpha,
                a: alpha,
            });
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = begin_fullscreen_pass(
                &mut encoder,
                &surface_view,
                "Present Pass",
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            pass.set_pipeline(&self.pipelines.present);
            pass.set_bind_group(0, &self.trail_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        surface_texture.present();
        Ok(PresentOutcome::Shown)
    }
}
