//! Real-time effect renderer for funhouse.
//!
//! Camera frames go in through a latest-wins slot, one render thread draws
//! them through the active effect program, and captures come back as RGBA
//! images. The overall flow is:
//!
//! ```text
//!   frame producer ──▶ FrameSink ──▶ FrameSlot (depth 1)
//!                                          │
//!   Engine::set_effect ──▶ Controls ──┐    ▼
//!                                     └─▶ RenderLoop::tick ──▶ RenderBackend
//!   Engine::capture ──▶ Command queue ──▶      │ draw, read back, present
//!          ▲                                   │
//!          └──────── bounded reply ◀───────────┘
//! ```
//!
//! `RenderLoop` is independent of wgpu and winit: [`WgpuBackend`] renders
//! either offscreen (headless driver) or into a preview window (winit
//! driver), while tests run the same loop over a recording backend.

mod backend;
mod capture;
mod clock;
mod compile;
mod engine;
mod error;
mod gpu;
mod ingest;
mod program;
mod render;
mod types;
mod uniforms;
mod window;

#[cfg(test)]
mod testing;

pub use backend::RenderBackend;
pub use capture::convert;
pub use clock::{time_source, FixedTimeSource, SystemTimeSource, TimeSample, TimeSource};
pub use compile::{prepare, validate_glsl, wrap_fragment, PreparedProgram};
pub use engine::Engine;
pub use error::{CaptureError, ControlError, DrawError, FrameError, ShaderError, ShaderStage};
pub use gpu::{EffectPipeline, WgpuBackend};
pub use ingest::FrameSink;
pub use program::{CompiledProgram, ProgramCache, ProgramState};
pub use render::EngineSignal;
pub use types::{
    AdapterProfile, CapturedImage, EngineConfig, EngineStatus, Frame, InstalledProgram,
    PixelLayout, PowerPreference, Readback, RowOrder, Viewport,
};
pub use uniforms::{EffectUniforms, UniformLayout};
