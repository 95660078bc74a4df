use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::backend::RenderBackend;
use crate::compile::{validate_glsl, PreparedProgram};
use crate::error::{DrawError, ShaderError, ShaderStage};
use crate::types::{Frame, PixelLayout, Readback, RowOrder, Viewport};
use crate::uniforms::EffectUniforms;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Build(String),
    Upload(Duration),
    Reset,
    Resize(Viewport),
    Draw(String),
    ReadBack,
    Present,
}

#[derive(Debug, Default)]
pub(crate) struct Log {
    pub ops: Vec<Op>,
    pub last_uniforms: Option<EffectUniforms>,
}

/// Backend double that validates programs with naga and records every call.
/// Readbacks echo the last uploaded frame when it matches the viewport.
pub(crate) struct RecordingBackend {
    viewport: Viewport,
    log: Arc<Mutex<Log>>,
    texture: Option<Frame>,
    fail_build: Option<String>,
    fail_draws: bool,
    max_dimension: u32,
}

impl RecordingBackend {
    pub(crate) fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            log: Arc::default(),
            texture: None,
            fail_build: None,
            fail_draws: false,
            max_dimension: 8192,
        }
    }

    pub(crate) fn log(&self) -> Arc<Mutex<Log>> {
        Arc::clone(&self.log)
    }

    pub(crate) fn fail_next_build(&mut self, message: &str) {
        self.fail_build = Some(message.to_string());
    }

    pub(crate) fn fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    pub(crate) fn set_max_texture_dimension(&mut self, max: u32) {
        self.max_dimension = max;
    }

    fn record(&self, op: Op) {
        lock(&self.log).ops.push(op);
    }
}

pub(crate) fn lock(log: &Arc<Mutex<Log>>) -> MutexGuard<'_, Log> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn uploads(log: &Arc<Mutex<Log>>) -> Vec<Duration> {
    lock(log)
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::Upload(timestamp) => Some(*timestamp),
            _ => None,
        })
        .collect()
}

impl RenderBackend for RecordingBackend {
    type Program = String;

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn build_program(&mut self, program: &PreparedProgram) -> Result<String, ShaderError> {
        if let Some(message) = self.fail_build.take() {
            return Err(ShaderError::Link { message });
        }
        validate_glsl(&program.fragment, ShaderStage::Fragment)?;
        self.record(Op::Build(program.effect_id.clone()));
        Ok(program.effect_id.clone())
    }

    fn upload_frame(&mut self, frame: &Frame) {
        self.record(Op::Upload(frame.timestamp));
        self.texture = Some(frame.clone());
    }

    fn reset_texture(&mut self) {
        self.record(Op::Reset);
        self.texture = None;
    }

    fn resize(&mut self, viewport: Viewport) {
        self.record(Op::Resize(viewport));
        self.viewport = viewport;
    }

    fn draw(&mut self, program: &String, uniforms: &EffectUniforms) -> Result<(), DrawError> {
        if self.fail_draws {
            return Err(DrawError::SurfaceTimeout);
        }
        let mut log = lock(&self.log);
        log.ops.push(Op::Draw(program.clone()));
        log.last_uniforms = Some(*uniforms);
        Ok(())
    }

    fn read_back(&mut self) -> Result<Readback, DrawError> {
        self.record(Op::ReadBack);
        let Viewport { width, height } = self.viewport;
        let readback = match &self.texture {
            Some(frame) if frame.width == width && frame.height == height => Readback {
                width,
                height,
                bytes_per_row: width * PixelLayout::BYTES_PER_PIXEL as u32,
                layout: frame.layout,
                row_order: RowOrder::TopDown,
                bytes: frame.pixels.clone(),
            },
            _ => Readback {
                width,
                height,
                bytes_per_row: width * PixelLayout::BYTES_PER_PIXEL as u32,
                layout: PixelLayout::Rgba8,
                row_order: RowOrder::TopDown,
                bytes: vec![0; (width * height) as usize * PixelLayout::BYTES_PER_PIXEL],
            },
        };
        Ok(readback)
    }

    fn present(&mut self) {
        self.record(Op::Present);
    }
}
