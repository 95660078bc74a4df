use crate::compile::PreparedProgram;
use crate::error::{DrawError, ShaderError};
use crate::types::{Frame, Readback, Viewport};
use crate::uniforms::EffectUniforms;

/// GPU operations the render loop drives once per tick. Implementations own
/// every GPU object and are only touched from the render thread.
pub trait RenderBackend {
    /// Backend handle for one built program. Dropping it releases the GPU
    /// objects behind it.
    type Program;

    fn viewport(&self) -> Viewport;

    /// Largest width or height accepted for the input texture and the
    /// render target.
    fn max_texture_dimension(&self) -> u32;

    fn build_program(&mut self, program: &PreparedProgram) -> Result<Self::Program, ShaderError>;

    /// Copies `frame` into the input texture, recreating it when the size or
    /// layout changed.
    fn upload_frame(&mut self, frame: &Frame);

    /// Replaces the input texture with the 1x1 placeholder.
    fn reset_texture(&mut self);

    fn resize(&mut self, viewport: Viewport);

    /// Draws the full-screen quad with `program` into the current target.
    fn draw(&mut self, program: &Self::Program, uniforms: &EffectUniforms)
        -> Result<(), DrawError>;

    /// Reads back what the last `draw` produced. Only valid before `present`.
    fn read_back(&mut self) -> Result<Readback, DrawError>;

    fn present(&mut self);
}
