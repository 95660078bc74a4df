use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use image::RgbaImage;

use crate::error::{FrameError, ShaderError};

/// Interleaved 8-bit channel orders accepted from frame sources and produced
/// by GPU readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    #[default]
    Rgba8,
    Bgra8,
}

impl PixelLayout {
    pub const BYTES_PER_PIXEL: usize = 4;
}

/// One camera frame. Rows are top-first and tightly packed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub pixels: Vec<u8>,
    /// Capture time relative to the producer's epoch.
    pub timestamp: Duration,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
        timestamp: Duration,
    ) -> Self {
        Self {
            width,
            height,
            layout,
            pixels,
            timestamp,
        }
    }

    pub fn from_rgba_image(image: &RgbaImage, timestamp: Duration) -> Self {
        Self::new(
            image.width(),
            image.height(),
            PixelLayout::Rgba8,
            image.as_raw().clone(),
            timestamp,
        )
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * PixelLayout::BYTES_PER_PIXEL
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.expected_len();
        if self.pixels.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("bytes", &self.pixels.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Still image returned by a capture. RGBA8, straight alpha, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    image: RgbaImage,
}

impl CapturedImage {
    pub(crate) fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Size of the composited output in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

/// Raw CPU copy of the composited target, possibly row-padded.
#[derive(Clone, PartialEq, Eq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub layout: PixelLayout,
    pub row_order: RowOrder,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Readback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readback")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_row", &self.bytes_per_row)
            .field("layout", &self.layout)
            .field("row_order", &self.row_order)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstalledProgram {
    #[default]
    Passthrough,
    Effect(String),
}

impl fmt::Display for InstalledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstalledProgram::Passthrough => f.write_str("passthrough"),
            InstalledProgram::Effect(id) => f.write_str(id),
        }
    }
}

/// Snapshot of the render thread, refreshed once per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStatus {
    pub viewport: Viewport,
    pub frames_rendered: u64,
    pub fps: f32,
    pub frames_uploaded: u64,
    pub frames_superseded: u64,
    pub has_content: bool,
    pub installed: InstalledProgram,
    pub last_shader_error: Option<ShaderError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    #[default]
    Low,
    High,
}

/// Identity of the GPU adapter a backend runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Start-up configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Offscreen target size, or the initial window size.
    pub viewport: Viewport,
    /// Tick interval of the headless driver. The windowed driver is paced by
    /// the surface instead.
    pub refresh_interval: Duration,
    pub capture_timeout: Duration,
    pub power: PowerPreference,
    /// Fifo presentation when true; lowest-latency mode otherwise.
    pub vsync: bool,
    /// Freezes `uTime` for deterministic renders.
    pub fixed_time: Option<f32>,
    pub initial_effect: Option<String>,
    /// Normalized values applied on top of descriptor defaults whenever the
    /// named effect becomes active.
    pub parameter_presets: HashMap<String, BTreeMap<String, f32>>,
    pub window_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(1280, 720),
            refresh_interval: Duration::from_millis(16),
            capture_timeout: Duration::from_secs(1),
            power: PowerPreference::default(),
            vsync: true,
            fixed_time: None,
            initial_effect: None,
            parameter_presets: HashMap::new(),
            window_title: "funhouse".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_validation_checks_dimensions_and_length() {
        let ok = Frame::new(2, 2, PixelLayout::Rgba8, vec![0; 16], Duration::ZERO);
        assert!(ok.validate().is_ok());

        let empty = Frame::new(0, 2, PixelLayout::Rgba8, Vec::new(), Duration::ZERO);
        assert_eq!(
            empty.validate(),
            Err(FrameError::InvalidDimensions {
                width: 0,
                height: 2
            })
        );

        let short = Frame::new(2, 2, PixelLayout::Bgra8, vec![0; 15], Duration::ZERO);
        assert_eq!(
            short.validate(),
            Err(FrameError::BufferSize {
                expected: 16,
                actual: 15
            })
        );
    }

    #[test]
    fn viewport_aspect_handles_empty_sizes() {
        assert_eq!(Viewport::new(1920, 1080).aspect(), 1920.0 / 1080.0);
        assert_eq!(Viewport::new(0, 1080).aspect(), 1.0);
        assert!(Viewport::default().is_empty());
    }
}
