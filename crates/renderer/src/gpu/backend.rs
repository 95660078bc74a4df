use std::sync::Arc;

use anyhow::{anyhow, Result};
use winit::window::Window;

use crate::backend::RenderBackend;
use crate::compile::PreparedProgram;
use crate::error::{DrawError, ShaderError};
use crate::types::{AdapterProfile, EngineConfig, Frame, Readback, Viewport};
use crate::uniforms::EffectUniforms;

use super::context::GpuContext;
use super::pipeline::{build_pipeline, EffectPipeline, PipelineLayouts, QUAD_VERTEX_COUNT};
use super::readback::read_texture;
use super::texture::FrameTexture;

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum RenderTarget {
    Offscreen {
        texture: wgpu::Texture,
    },
    Surface {
        // Field order is drop order: texture, surface, then the window.
        current: Option<wgpu::SurfaceTexture>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        _window: Arc<Window>,
    },
}

impl RenderTarget {
    fn format(&self) -> wgpu::TextureFormat {
        match self {
            RenderTarget::Offscreen { texture } => texture.format(),
            RenderTarget::Surface { config, .. } => config.format,
        }
    }
}

/// [`RenderBackend`] over wgpu, rendering either into an offscreen texture or
/// a window surface.
pub struct WgpuBackend {
    context: GpuContext,
    target: RenderTarget,
    layouts: PipelineLayouts,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    frame_texture: FrameTexture,
    viewport: Viewport,
}

impl WgpuBackend {
    pub fn headless(config: &EngineConfig) -> Result<Self> {
        if config.viewport.is_empty() {
            anyhow::bail!("offscreen target must be at least 1x1, got {}", config.viewport);
        }
        let context = GpuContext::new(GpuContext::instance(), None, config.power, config.viewport)?;
        let texture = create_offscreen_texture(&context.device, config.viewport);
        Self::with_target(context, RenderTarget::Offscreen { texture }, config.viewport)
    }

    pub(crate) fn windowed(window: Arc<Window>, config: &EngineConfig) -> Result<Self> {
        let size = window.inner_size();
        let viewport = Viewport::new(size.width.max(1), size.height.max(1));
        let instance = GpuContext::instance();
        let surface = GpuContext::create_surface(&instance, window.as_ref())?;
        let context = GpuContext::new(instance, Some(&surface), config.power, viewport)?;

        let caps = surface.get_capabilities(&context.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if format.is_srgb() {
            tracing::warn!(?format, "no linear (non-sRGB) surface format available");
        }

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if caps.usages.contains(wgpu::TextureUsages::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        } else {
            tracing::warn!("surface does not advertise COPY_SRC; captures will fail");
        }

        let present_mode = if config.vsync {
            wgpu::PresentMode::Fifo
        } else {
            [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
                .into_iter()
                .find(|mode| caps.present_modes.contains(mode))
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        tracing::debug!(?present_mode, ?format, "configuring surface");

        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: viewport.width,
            height: viewport.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &surface_config);

        let target = RenderTarget::Surface {
            current: None,
            surface,
            config: surface_config,
            _window: window,
        };
        Self::with_target(context, target, viewport)
    }

    fn with_target(context: GpuContext, target: RenderTarget, viewport: Viewport) -> Result<Self> {
        let device = &context.device;
        let layouts = PipelineLayouts::new(device)
            .map_err(|err| anyhow!("failed to build vertex stage: {err}"))?;

        let uniforms = EffectUniforms::new(viewport);
        let uniform_buffer = wgpu::util::DeviceExt::create_buffer_init(
            device,
            &wgpu::util::BufferInitDescriptor {
                label: Some("effect uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
        );
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let frame_texture = FrameTexture::placeholder(
            device,
            &context.queue,
            &layouts.texture_layout,
            &sampler,
        );

        Ok(Self {
            context,
            target,
            layouts,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            frame_texture,
            viewport,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    /// Acquires the view to draw into this tick.
    fn acquire_view(&mut self) -> Result<wgpu::TextureView, DrawError> {
        let device = &self.context.device;
        match &mut self.target {
            RenderTarget::Offscreen { texture } => {
                Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
            RenderTarget::Surface {
                surface,
                config,
                current,
                ..
            } => {
                // An unpresented texture from a failed tick is discarded.
                current.take();
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(device, config);
                        return Err(DrawError::SurfaceLost);
                    }
                    Err(wgpu::SurfaceError::Timeout) => return Err(DrawError::SurfaceTimeout),
                    Err(wgpu::SurfaceError::OutOfMemory) => return Err(DrawError::OutOfMemory),
                    Err(other) => return Err(DrawError::Device(format!("{other:?}"))),
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                *current = Some(frame);
                Ok(view)
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Program = EffectPipeline;

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn max_texture_dimension(&self) -> u32 {
        self.context.device.limits().max_texture_dimension_2d
    }

    fn build_program(&mut self, program: &PreparedProgram) -> Result<EffectPipeline, ShaderError> {
        build_pipeline(
            &self.context.device,
            &self.layouts,
            self.target.format(),
            program,
        )
    }

    fn upload_frame(&mut self, frame: &Frame) {
        self.frame_texture.upload(
            &self.context.device,
            &self.context.queue,
            &self.layouts.texture_layout,
            &self.sampler,
            frame,
        );
    }

    fn reset_texture(&mut self) {
        self.frame_texture = FrameTexture::placeholder(
            &self.context.device,
            &self.context.queue,
            &self.layouts.texture_layout,
            &self.sampler,
        );
    }

    fn resize(&mut self, viewport: Viewport) {
        if viewport.is_empty() {
            return;
        }
        self.viewport = viewport;
        let device = &self.context.device;
        match &mut self.target {
            RenderTarget::Offscreen { texture } => {
                *texture = create_offscreen_texture(device, viewport);
            }
            RenderTarget::Surface {
                surface,
                config,
                current,
                ..
            } => {
                current.take();
                config.width = viewport.width;
                config.height = viewport.height;
                surface.configure(device, config);
            }
        }
    }

    fn draw(&mut self, program: &EffectPipeline, uniforms: &EffectUniforms) -> Result<(), DrawError> {
        let view = self.acquire_view()?;
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("render encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("effect pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &self.frame_texture.bind_group, &[]);
            pass.set_vertex_buffer(0, self.layouts.quad.slice(..));
            pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_back(&mut self) -> Result<Readback, DrawError> {
        let texture = match &self.target {
            RenderTarget::Offscreen { texture } => texture,
            RenderTarget::Surface { current, .. } => match current {
                Some(frame) => &frame.texture,
                None => return Err(DrawError::NotDrawn),
            },
        };
        read_texture(&self.context.device, &self.context.queue, texture)
    }

    fn present(&mut self) {
        if let RenderTarget::Surface { current, .. } = &mut self.target {
            if let Some(frame) = current.take() {
                frame.present();
            }
        }
    }
}

fn create_offscreen_texture(device: &wgpu::Device, viewport: Viewport) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: viewport.width,
            height: viewport.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
