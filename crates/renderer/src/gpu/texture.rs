use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::types::{Frame, PixelLayout};

const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];

/// The camera texture bound at set 1, plus the bind group pointing at it.
pub(crate) struct FrameTexture {
    texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    layout: PixelLayout,
}

impl FrameTexture {
    /// Opaque black 1x1 texture shown until the first frame arrives.
    pub fn placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bind_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        Self::create(
            device,
            queue,
            bind_layout,
            sampler,
            1,
            1,
            PixelLayout::Rgba8,
            &PLACEHOLDER_PIXEL,
        )
    }

    /// Writes `frame` into the texture, recreating it when the size or pixel
    /// layout changed.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bind_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        frame: &Frame,
    ) {
        let same_shape = self.texture.width() == frame.width
            && self.texture.height() == frame.height
            && self.layout == frame.layout;
        if !same_shape {
            tracing::debug!(
                width = frame.width,
                height = frame.height,
                layout = ?frame.layout,
                "recreating frame texture"
            );
            *self = Self::create(
                device,
                queue,
                bind_layout,
                sampler,
                frame.width,
                frame.height,
                frame.layout,
                &frame.pixels,
            );
            return;
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * PixelLayout::BYTES_PER_PIXEL as u32),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bind_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: &[u8],
    ) -> Self {
        let format = match layout {
            PixelLayout::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            PixelLayout::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        };
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("frame texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame texture bind group"),
            layout: bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            texture,
            bind_group,
            layout,
        }
    }
}
