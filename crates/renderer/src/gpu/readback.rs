use crossbeam_channel::bounded;

use crate::error::DrawError;
use crate::types::{PixelLayout, Readback, RowOrder};

/// Pixel layout of a color target, if readback supports it.
pub(crate) fn layout_for(format: wgpu::TextureFormat) -> Option<PixelLayout> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            Some(PixelLayout::Rgba8)
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            Some(PixelLayout::Bgra8)
        }
        _ => None,
    }
}

/// Copies `texture` into a mappable buffer and blocks until the bytes are on
/// the CPU. Rows keep their 256-byte aligned stride.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Readback, DrawError> {
    let format = texture.format();
    let layout = layout_for(format)
        .ok_or_else(|| DrawError::Device(format!("cannot read back {format:?} targets")))?;
    let width = texture.width();
    let height = texture.height();
    let unpadded_bytes_per_row = width * PixelLayout::BYTES_PER_PIXEL as u32;
    let bytes_per_row = align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("capture staging"),
        size: (bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("capture encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
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
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| DrawError::Device(format!("device poll failed: {err}")))?;
    rx.recv()
        .map_err(|_| DrawError::Device("map callback never ran".into()))?
        .map_err(|err| DrawError::Device(format!("failed to map capture buffer: {err}")))?;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(Readback {
        width,
        height,
        bytes_per_row,
        layout,
        row_order: RowOrder::TopDown,
        bytes,
    })
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_align_to_copy_granularity() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1280 * 4, 256), 5120);
        assert_eq!(align_to(257, 256), 512);
    }

    #[test]
    fn only_8bit_color_targets_are_readable() {
        assert_eq!(
            layout_for(wgpu::TextureFormat::Bgra8UnormSrgb),
            Some(PixelLayout::Bgra8)
        );
        assert_eq!(
            layout_for(wgpu::TextureFormat::Rgba8Unorm),
            Some(PixelLayout::Rgba8)
        );
        assert_eq!(layout_for(wgpu::TextureFormat::Rgba16Float), None);
    }
}
