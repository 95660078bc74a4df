use effects::{passthrough, EffectDescriptor};
use tracing::{debug, warn};

use crate::backend::RenderBackend;
use crate::compile::prepare;
use crate::error::ShaderError;
use crate::types::InstalledProgram;
use crate::uniforms::UniformLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Uninitialized,
    Ready,
}

/// A program the backend built, with the slot layout its uniforms follow.
pub struct CompiledProgram<P> {
    pub effect_id: String,
    pub layout: UniformLayout,
    pub handle: P,
}

/// Owns the pass-through program and at most one effect program. Selecting the
/// same effect again is free; selecting a different one builds it right away
/// and falls back to pass-through when that fails.
pub struct ProgramCache<P> {
    passthrough: Option<CompiledProgram<P>>,
    active: Option<CompiledProgram<P>>,
    requested: Option<String>,
    compilations: u64,
    last_error: Option<ShaderError>,
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self {
            passthrough: None,
            active: None,
            requested: None,
            compilations: 0,
            last_error: None,
        }
    }
}

impl<P> ProgramCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProgramState {
        if self.passthrough.is_some() {
            ProgramState::Ready
        } else {
            ProgramState::Uninitialized
        }
    }

    /// Builds the pass-through program. Called once a render target exists.
    pub fn initialize<B>(&mut self, backend: &mut B) -> Result<(), ShaderError>
    where
        B: RenderBackend<Program = P>,
    {
        if self.passthrough.is_some() {
            return Ok(());
        }
        let compiled = self.compile(backend, &passthrough())?;
        self.passthrough = Some(compiled);
        debug!("pass-through program ready");
        Ok(())
    }

    /// Requests `descriptor` (or pass-through for `None`). Returns `None` when
    /// the request matches what was last requested and nothing was done.
    pub fn set_effect<B>(
        &mut self,
        backend: &mut B,
        descriptor: Option<&EffectDescriptor>,
    ) -> Option<Result<(), ShaderError>>
    where
        B: RenderBackend<Program = P>,
    {
        let requested = descriptor.map(|descriptor| descriptor.id().to_string());
        if requested == self.requested {
            return None;
        }
        self.requested = requested;

        let Some(descriptor) = descriptor else {
            self.active = None;
            self.last_error = None;
            debug!("installed pass-through program");
            return Some(Ok(()));
        };

        match self.compile(backend, descriptor) {
            Ok(compiled) => {
                // Old GPU objects go as soon as the replacement is in place.
                self.active = Some(compiled);
                self.last_error = None;
                debug!(effect = descriptor.id(), "installed effect program");
                Some(Ok(()))
            }
            Err(err) => {
                self.active = None;
                warn!(
                    effect = descriptor.id(),
                    error = %err,
                    "effect program failed; falling back to pass-through"
                );
                self.last_error = Some(err.clone());
                Some(Err(err))
            }
        }
    }

    /// Program to draw with: the active effect, else pass-through.
    pub fn current(&self) -> Option<&CompiledProgram<P>> {
        self.active.as_ref().or(self.passthrough.as_ref())
    }

    pub fn installed(&self) -> InstalledProgram {
        match &self.active {
            Some(active) => InstalledProgram::Effect(active.effect_id.clone()),
            None => InstalledProgram::Passthrough,
        }
    }

    pub fn requested(&self) -> Option<&str> {
        self.requested.as_deref()
    }

    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    pub fn last_error(&self) -> Option<&ShaderError> {
        self.last_error.as_ref()
    }

    fn compile<B>(
        &mut self,
        backend: &mut B,
        descriptor: &EffectDescriptor,
    ) -> Result<CompiledProgram<P>, ShaderError>
    where
        B: RenderBackend<Program = P>,
    {
        self.compilations += 1;
        let prepared = prepare(descriptor)?;
        let handle = backend.build_program(&prepared)?;
        Ok(CompiledProgram {
            effect_id: prepared.effect_id,
            layout: prepared.layout,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use crate::types::Viewport;

    const BROKEN: &str = "void main() { gl_FragColor = vec4(1.0) }";

    fn ready_cache(backend: &mut RecordingBackend) -> ProgramCache<String> {
        let mut cache = ProgramCache::new();
        assert_eq!(cache.state(), ProgramState::Uninitialized);
        cache.initialize(backend).expect("pass-through builds");
        assert_eq!(cache.state(), ProgramState::Ready);
        cache
    }

    #[test]
    fn selecting_the_same_effect_twice_compiles_once() {
        let mut backend = RecordingBackend::new(Viewport::new(4, 4));
        let mut cache = ready_cache(&mut backend);
        let catalog = effects::EffectCatalog::builtin();
        let mirror = catalog.get("mirror").expect("mirror").as_ref();

        let before = cache.compilations();
        assert!(matches!(cache.set_effect(&mut backend, Some(mirror)), Some(Ok(()))));
        assert!(cache.set_effect(&mut backend, Some(mirror)).is_none());
        assert_eq!(cache.compilations(), before + 1);
        assert_eq!(cache.installed(), InstalledProgram::Effect("mirror".into()));
    }

    #[test]
    fn failed_effect_installs_passthrough_and_is_not_retried() {
        let mut backend = RecordingBackend::new(Viewport::new(4, 4));
        let mut cache = ready_cache(&mut backend);
        let broken = EffectDescriptor::new("broken", "Broken", BROKEN);

        let result = cache.set_effect(&mut backend, Some(&broken));
        assert!(matches!(result, Some(Err(ShaderError::Compile { .. }))));
        assert_eq!(cache.installed(), InstalledProgram::Passthrough);
        assert_eq!(cache.current().map(|p| p.effect_id.as_str()), Some("passthrough"));
        assert!(cache.last_error().is_some());

        let compilations = cache.compilations();
        assert!(cache.set_effect(&mut backend, Some(&broken)).is_none());
        assert_eq!(cache.compilations(), compilations);
    }

    #[test]
    fn link_failures_also_fall_back() {
        let mut backend = RecordingBackend::new(Viewport::new(4, 4));
        let mut cache = ready_cache(&mut backend);
        backend.fail_next_build("pipeline layout mismatch");
        let catalog = effects::EffectCatalog::builtin();
        let wave = catalog.get("wave").expect("wave").as_ref();

        let result = cache.set_effect(&mut backend, Some(wave));
        assert!(matches!(result, Some(Err(ShaderError::Link { .. }))));
        assert_eq!(cache.installed(), InstalledProgram::Passthrough);
    }

    #[test]
    fn clearing_the_effect_returns_to_passthrough() {
        let mut backend = RecordingBackend::new(Viewport::new(4, 4));
        let mut cache = ready_cache(&mut backend);
        let catalog = effects::EffectCatalog::builtin();
        let twist = catalog.get("twist").expect("twist").as_ref();

        cache.set_effect(&mut backend, Some(twist));
        assert!(matches!(cache.set_effect(&mut backend, None), Some(Ok(()))));
        assert_eq!(cache.installed(), InstalledProgram::Passthrough);
        assert!(cache.set_effect(&mut backend, None).is_none());
    }
}
