//! wgpu implementation of [`RenderBackend`](crate::RenderBackend):
//! - `context` owns instance/adapter/device wiring and surface creation.
//! - `pipeline` builds one render pipeline per wrapped effect program and
//!   holds the layouts and quad every pipeline shares.
//! - `texture` keeps the camera frame texture and its bind group current.
//! - `readback` copies a color target back to the CPU for captures.
//! - `backend` drives all of the above through the render-loop trait.

mod backend;
mod context;
mod pipeline;
mod readback;
mod texture;

pub use backend::WgpuBackend;
pub use pipeline::EffectPipeline;
