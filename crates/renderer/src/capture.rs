use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use image::RgbaImage;

use crate::error::CaptureError;
use crate::types::{CapturedImage, PixelLayout, Readback, RowOrder};

/// Marks one capture as outstanding. Released when the render thread finishes
/// or drops the task carrying it.
#[derive(Debug)]
pub(crate) struct CaptureTicket {
    in_flight: Arc<AtomicBool>,
}

impl CaptureTicket {
    pub(crate) fn acquire(in_flight: &Arc<AtomicBool>) -> Option<Self> {
        in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                in_flight: Arc::clone(in_flight),
            })
    }
}

impl Drop for CaptureTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Capture request queued to the render thread.
#[derive(Debug)]
pub(crate) struct CaptureTask {
    reply: Sender<Result<Readback, CaptureError>>,
    _ticket: CaptureTicket,
}

impl CaptureTask {
    pub(crate) fn new(reply: Sender<Result<Readback, CaptureError>>, ticket: CaptureTicket) -> Self {
        Self {
            reply,
            _ticket: ticket,
        }
    }

    /// Delivers the result. A caller that already gave up is ignored.
    pub(crate) fn complete(self, result: Result<Readback, CaptureError>) {
        let _ = self.reply.send(result);
    }
}

/// Converts a raw readback into a tightly packed, top-down RGBA image.
pub fn convert(readback: Readback) -> Result<CapturedImage, CaptureError> {
    let Readback {
        width,
        height,
        bytes_per_row,
        layout,
        row_order,
        bytes,
    } = readback;

    if width == 0 || height == 0 {
        return Err(CaptureError::ReadbackFailed(format!(
            "empty readback ({width}x{height})"
        )));
    }
    let row_len = width as usize * PixelLayout::BYTES_PER_PIXEL;
    let stride = bytes_per_row as usize;
    if stride < row_len {
        return Err(CaptureError::ReadbackFailed(format!(
            "row stride {stride} is shorter than a {width}-pixel row"
        )));
    }
    let required = stride * (height as usize - 1) + row_len;
    if bytes.len() < required {
        return Err(CaptureError::ReadbackFailed(format!(
            "readback holds {} bytes, expected at least {required}",
            bytes.len()
        )));
    }

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let source_row = match row_order {
            RowOrder::TopDown => row,
            RowOrder::BottomUp => height as usize - 1 - row,
        };
        let start = source_row * stride;
        pixels.extend_from_slice(&bytes[start..start + row_len]);
    }
    if layout == PixelLayout::Bgra8 {
        for pixel in pixels.chunks_exact_mut(PixelLayout::BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
    }

    RgbaImage::from_raw(width, height, pixels)
        .map(CapturedImage::new)
        .ok_or_else(|| CaptureError::ReadbackFailed("pixel buffer size mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readback(layout: PixelLayout, row_order: RowOrder) -> Readback {
        // 2x2 image, rows padded to 12 bytes. Top row red/green, bottom blue/white.
        let mut bytes = Vec::new();
        let rows: [[[u8; 4]; 2]; 2] = [
            [[255, 0, 0, 255], [0, 255, 0, 255]],
            [[0, 0, 255, 255], [255, 255, 255, 255]],
        ];
        let ordered: Vec<_> = match row_order {
            RowOrder::TopDown => rows.iter().collect(),
            RowOrder::BottomUp => rows.iter().rev().collect(),
        };
        for row in ordered {
            for pixel in row {
                let mut pixel = *pixel;
                if layout == PixelLayout::Bgra8 {
                    pixel.swap(0, 2);
                }
                bytes.extend_from_slice(&pixel);
            }
            bytes.extend_from_slice(&[0xAA; 4]);
        }
        Readback {
            width: 2,
            height: 2,
            bytes_per_row: 12,
            layout,
            row_order,
            bytes,
        }
    }

    fn assert_expected(image: &CapturedImage) {
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(image.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(image.pixel(1, 0), [0, 255, 0, 255]);
        assert_eq!(image.pixel(0, 1), [0, 0, 255, 255]);
        assert_eq!(image.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(image.as_raw().len(), 16);
    }

    #[test]
    fn strips_padding() {
        let image = convert(readback(PixelLayout::Rgba8, RowOrder::TopDown)).unwrap();
        assert_expected(&image);
    }

    #[test]
    fn swizzles_bgra() {
        let image = convert(readback(PixelLayout::Bgra8, RowOrder::TopDown)).unwrap();
        assert_expected(&image);
    }

    #[test]
    fn flips_bottom_up_rows() {
        let image = convert(readback(PixelLayout::Bgra8, RowOrder::BottomUp)).unwrap();
        assert_expected(&image);
    }

    #[test]
    fn truncated_readback_fails_without_partial_image() {
        let mut short = readback(PixelLayout::Rgba8, RowOrder::TopDown);
        short.bytes.truncate(10);
        assert!(matches!(convert(short), Err(CaptureError::ReadbackFailed(_))));

        let mut narrow = readback(PixelLayout::Rgba8, RowOrder::TopDown);
        narrow.bytes_per_row = 4;
        assert!(matches!(convert(narrow), Err(CaptureError::ReadbackFailed(_))));
    }

    #[test]
    fn ticket_is_exclusive_until_dropped() {
        let flag = Arc::new(AtomicBool::new(false));
        let ticket = CaptureTicket::acquire(&flag).expect("first ticket");
        assert!(CaptureTicket::acquire(&flag).is_none());
        drop(ticket);
        assert!(CaptureTicket::acquire(&flag).is_some());
    }
}
