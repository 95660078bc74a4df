use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Program build failures. The render loop recovers from both by installing
/// the pass-through program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile: {message}")]
    Compile { stage: ShaderStage, message: String },

    #[error("program failed to link: {message}")]
    Link { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("nothing has been rendered yet")]
    NoContent,

    #[error("capture did not complete in time")]
    Timeout,

    #[error("another capture is already in progress")]
    Busy,

    #[error("render thread has stopped")]
    Stopped,

    #[error("readback failed: {0}")]
    ReadbackFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame dimensions {width}x{height} are invalid")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("frame {width}x{height} exceeds the {max}px texture limit")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("frame timestamp {received:?} precedes previous frame at {previous:?}")]
    OutOfOrder { previous: Duration, received: Duration },
}

/// Rejected control updates from callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no effect is active")]
    NoActiveEffect,

    #[error("effect '{effect}' has no parameter '{name}'")]
    UnknownParameter { effect: String, name: String },
}

/// Per-tick backend failures. Logged by the render loop, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("surface lost or outdated")]
    SurfaceLost,

    #[error("timed out acquiring the next surface texture")]
    SurfaceTimeout,

    #[error("GPU out of memory")]
    OutOfMemory,

    #[error("nothing was drawn this tick")]
    NotDrawn,

    #[error("{0}")]
    Device(String),
}
