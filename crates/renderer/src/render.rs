//! Backend-agnostic render loop. Drivers (headless or windowed) call
//! [`RenderLoop::handle`] for queued commands and [`RenderLoop::tick`] once per
//! frame; everything GPU-facing goes through [`RenderBackend`].
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use effects::EffectDescriptor;
use tracing::{debug, error, warn};

use crate::backend::RenderBackend;
use crate::capture::CaptureTask;
use crate::clock::BoxedTimeSource;
use crate::error::{CaptureError, DrawError, ShaderError};
use crate::ingest::{FrameSlot, Pending};
use crate::program::ProgramCache;
use crate::types::{EngineStatus, InstalledProgram, Viewport};
use crate::uniforms::EffectUniforms;

/// Requests delivered to the render thread in order.
#[derive(Debug)]
pub(crate) enum Command {
    Capture(CaptureTask),
    Sync(Sender<()>),
    Resize(Viewport),
    Shutdown,
}

/// Notifications from the render thread to the engine owner.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    /// An effect failed to build; pass-through is installed instead.
    ShaderFailed { effect: String, error: ShaderError },
    ProgramInstalled(InstalledProgram),
    /// Keyboard requests from the preview window.
    NextEffect,
    PreviousEffect,
    CaptureRequested,
    CloseRequested,
}

/// Effect selection and parameter values requested by callers. The render
/// thread picks them up at the start of a tick when `dirty` is set.
#[derive(Debug, Clone)]
pub(crate) struct Controls {
    pub effect: Option<Arc<EffectDescriptor>>,
    pub parameters: BTreeMap<String, f32>,
    pub center: [f32; 2],
    pub dirty: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            effect: None,
            parameters: BTreeMap::new(),
            center: [0.5, 0.5],
            dirty: false,
        }
    }
}

impl Controls {
    /// Activates `effect` with its defaults, overlaid by `preset` values for
    /// parameters the effect declares.
    pub fn select(
        &mut self,
        effect: Option<Arc<EffectDescriptor>>,
        preset: Option<&BTreeMap<String, f32>>,
    ) {
        self.parameters = effect
            .as_ref()
            .map(|effect| effect.parameters().clone())
            .unwrap_or_default();
        if let Some(preset) = preset {
            for (name, value) in preset {
                if let Some(slot) = self.parameters.get_mut(name) {
                    *slot = value.clamp(0.0, 1.0);
                }
            }
        }
        self.effect = effect;
        self.dirty = true;
    }
}

/// State shared between the engine handle and the render thread.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub frames: Arc<FrameSlot>,
    pub controls: Mutex<Controls>,
    pub status: Mutex<EngineStatus>,
    pub capture_in_flight: Arc<AtomicBool>,
}

impl SharedState {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            frames: Arc::default(),
            controls: Mutex::default(),
            status: Mutex::new(EngineStatus {
                viewport,
                ..EngineStatus::default()
            }),
            capture_in_flight: Arc::default(),
        }
    }

    pub fn controls(&self) -> MutexGuard<'_, Controls> {
        self.controls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> MutexGuard<'_, EngineStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
struct RenderStats {
    frames_rendered: u64,
    frames_uploaded: u64,
    frames_since_last_update: u32,
    frames_per_second: f32,
    last_fps_update: Instant,
}

impl RenderStats {
    fn new() -> Self {
        Self {
            frames_rendered: 0,
            frames_uploaded: 0,
            frames_since_last_update: 0,
            frames_per_second: 0.0,
            last_fps_update: Instant::now(),
        }
    }

    /// Counts a rendered frame; returns true when the rate was recomputed.
    fn record_frame(&mut self, now: Instant) -> bool {
        self.frames_rendered += 1;
        self.frames_since_last_update += 1;
        let elapsed = now.saturating_duration_since(self.last_fps_update);
        if elapsed < Duration::from_secs(1) {
            return false;
        }
        self.frames_per_second = self.frames_since_last_update as f32 / elapsed.as_secs_f32();
        self.frames_since_last_update = 0;
        self.last_fps_update = now;
        true
    }
}

pub(crate) struct RenderLoop<B: RenderBackend> {
    backend: B,
    programs: ProgramCache<B::Program>,
    shared: Arc<SharedState>,
    signals: Sender<EngineSignal>,
    clock: BoxedTimeSource,
    uniforms: EffectUniforms,
    parameters: BTreeMap<String, f32>,
    has_content: bool,
    captures: Vec<CaptureTask>,
    syncs: Vec<Sender<()>>,
    stats: RenderStats,
}

impl<B: RenderBackend> RenderLoop<B> {
    /// Builds the pass-through program; the loop is unusable without it.
    pub fn new(
        mut backend: B,
        shared: Arc<SharedState>,
        signals: Sender<EngineSignal>,
        clock: BoxedTimeSource,
    ) -> Result<Self, ShaderError> {
        let mut programs = ProgramCache::new();
        programs.initialize(&mut backend)?;
        shared
            .frames
            .set_max_dimension(backend.max_texture_dimension());
        let uniforms = EffectUniforms::new(backend.viewport());
        Ok(Self {
            backend,
            programs,
            shared,
            signals,
            clock,
            uniforms,
            parameters: BTreeMap::new(),
            has_content: false,
            captures: Vec::new(),
            syncs: Vec::new(),
            stats: RenderStats::new(),
        })
    }

    /// Applies one command. Returns false once the loop should stop.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Capture(task) => self.captures.push(task),
            Command::Sync(reply) => self.syncs.push(reply),
            Command::Resize(viewport) => self.resize(viewport),
            Command::Shutdown => return false,
        }
        true
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport.is_empty() || viewport == self.backend.viewport() {
            return;
        }
        let max = self.backend.max_texture_dimension();
        if viewport.width > max || viewport.height > max {
            warn!(%viewport, max, "ignoring resize beyond the texture limit");
            return;
        }
        debug!(%viewport, "resizing render target");
        self.backend.resize(viewport);
    }

    pub fn tick(&mut self) {
        self.apply_controls();
        self.ingest();

        let sample = self.clock.sample();
        self.uniforms.set_time(sample.seconds);
        self.uniforms.set_viewport(self.backend.viewport());

        let drawn = match self.programs.current() {
            Some(program) => {
                program
                    .layout
                    .apply(&program.effect_id, &self.parameters, &mut self.uniforms);
                self.backend.draw(&program.handle, &self.uniforms)
            }
            None => Err(DrawError::NotDrawn),
        };

        match drawn {
            Ok(()) => {
                self.serve_captures();
                self.backend.present();
                if self.stats.record_frame(Instant::now()) {
                    debug!(
                        fps = self.stats.frames_per_second.round(),
                        frame_count = self.stats.frames_rendered,
                        uploads = self.stats.frames_uploaded,
                        superseded = self.shared.frames.superseded(),
                        program = %self.programs.installed(),
                        time = sample.seconds,
                        clock_frame = sample.frame_index,
                        "render stats"
                    );
                }
            }
            Err(err) => {
                match err {
                    DrawError::OutOfMemory => error!(error = %err, "draw failed"),
                    _ => warn!(error = %err, "draw failed; retrying next tick"),
                }
                for task in self.captures.drain(..) {
                    task.complete(Err(CaptureError::ReadbackFailed(err.to_string())));
                }
            }
        }

        self.publish_status();
        for reply in self.syncs.drain(..) {
            let _ = reply.send(());
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn apply_controls(&mut self) {
        let requested = {
            let mut controls = self.shared.controls();
            if !controls.dirty {
                return;
            }
            controls.dirty = false;
            controls.clone()
        };

        self.parameters = requested.parameters;
        self.uniforms.set_center(requested.center);

        let Some(result) = self
            .programs
            .set_effect(&mut self.backend, requested.effect.as_deref())
        else {
            return;
        };
        let signal = match result {
            Ok(()) => EngineSignal::ProgramInstalled(self.programs.installed()),
            Err(error) => EngineSignal::ShaderFailed {
                effect: requested
                    .effect
                    .as_ref()
                    .map(|effect| effect.id().to_string())
                    .unwrap_or_default(),
                error,
            },
        };
        let _ = self.signals.send(signal);
    }

    fn ingest(&mut self) {
        match self.shared.frames.take() {
            Some(Pending::Frame(frame)) => {
                self.backend.upload_frame(&frame);
                self.has_content = true;
                self.stats.frames_uploaded += 1;
            }
            Some(Pending::Clear) => {
                self.backend.reset_texture();
                self.has_content = false;
            }
            None => {}
        }
    }

    fn serve_captures(&mut self) {
        for task in std::mem::take(&mut self.captures) {
            let result = if self.has_content {
                self.backend
                    .read_back()
                    .map_err(|err| CaptureError::ReadbackFailed(err.to_string()))
            } else {
                Err(CaptureError::NoContent)
            };
            task.complete(result);
        }
    }

    fn publish_status(&self) {
        let mut status = self.shared.status();
        status.viewport = self.backend.viewport();
        status.frames_rendered = self.stats.frames_rendered;
        status.fps = self.stats.frames_per_second;
        status.frames_uploaded = self.stats.frames_uploaded;
        status.frames_superseded = self.shared.frames.superseded();
        status.has_content = self.has_content;
        status.installed = self.programs.installed();
        status.last_shader_error = self.programs.last_error().cloned();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::{bounded, unbounded, Receiver};
    use effects::EffectCatalog;

    use super::*;
    use crate::capture::CaptureTicket;
    use crate::clock::time_source;
    use crate::testing::{lock, uploads, Op, RecordingBackend};
    use crate::types::{Frame, PixelLayout};

    fn render_loop() -> (
        RenderLoop<RecordingBackend>,
        Arc<SharedState>,
        Receiver<EngineSignal>,
    ) {
        let viewport = Viewport::new(2, 1);
        let shared = Arc::new(SharedState::new(viewport));
        let (signal_tx, signal_rx) = unbounded();
        let render = RenderLoop::new(
            RecordingBackend::new(viewport),
            Arc::clone(&shared),
            signal_tx,
            time_source(Some(1.0)),
        )
        .expect("pass-through builds");
        (render, shared, signal_rx)
    }

    fn frame(millis: u64) -> Frame {
        Frame::new(
            2,
            1,
            PixelLayout::Rgba8,
            vec![10, 20, 30, 255, 40, 50, 60, 255],
            Duration::from_millis(millis),
        )
    }

    fn select(shared: &SharedState, effect: Arc<EffectDescriptor>) {
        shared.controls().select(Some(effect), None);
    }

    #[test]
    fn only_the_latest_frame_is_uploaded() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        shared.frames.submit(Some(frame(2))).unwrap();
        render.tick();

        let log = render.backend().log();
        assert_eq!(uploads(&log), vec![Duration::from_millis(2)]);
        let status = shared.status().clone();
        assert_eq!(status.frames_uploaded, 1);
        assert_eq!(status.frames_superseded, 1);
        assert!(status.has_content);
    }

    #[test]
    fn ticks_without_new_frames_redraw_without_uploading() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        render.tick();
        render.tick();

        let log = render.backend().log();
        assert_eq!(uploads(&log).len(), 1);
        let draws = lock(&log)
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Draw(_)))
            .count();
        assert_eq!(draws, 2);
        assert_eq!(shared.status().frames_rendered, 2);
    }

    #[test]
    fn clearing_resets_texture_and_content() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        render.tick();
        shared.frames.submit(None).unwrap();
        render.tick();

        assert!(lock(&render.backend().log()).ops.contains(&Op::Reset));
        assert!(!shared.status().has_content);
    }

    #[test]
    fn parameters_reach_uniforms_through_the_mapper() {
        let (mut render, shared, signals) = render_loop();
        let wave = Arc::clone(EffectCatalog::builtin().get("wave").unwrap());
        select(&shared, wave);
        shared.controls().parameters.insert("frequency".into(), 1.0);
        render.tick();

        assert_eq!(
            signals.try_recv().unwrap(),
            EngineSignal::ProgramInstalled(InstalledProgram::Effect("wave".into()))
        );
        let log = render.backend().log();
        let uniforms = lock(&log).last_uniforms.expect("drawn");
        let expected = effects::map_parameter("wave", "frequency", 1.0);
        let slot = crate::uniforms::UniformLayout::from_descriptor(
            EffectCatalog::builtin().get("wave").unwrap(),
        )
        .slot("frequency")
        .unwrap();
        assert_eq!(uniforms.params[slot], expected);
        assert_eq!(uniforms.time(), 1.0);
        assert_eq!([uniforms.frame[2], uniforms.frame[3]], [2.0, 1.0]);
    }

    #[test]
    fn invalid_custom_shader_falls_back_and_keeps_rendering() {
        let (mut render, shared, signals) = render_loop();
        let broken = Arc::new(EffectDescriptor::new(
            "broken",
            "Broken",
            "void main() { gl_FragColor = vec4(1.0) }",
        ));
        select(&shared, broken);
        render.tick();
        render.tick();

        match signals.try_recv().unwrap() {
            EngineSignal::ShaderFailed { effect, error } => {
                assert_eq!(effect, "broken");
                assert!(matches!(error, ShaderError::Compile { .. }));
            }
            other => panic!("unexpected signal {other:?}"),
        }
        let status = shared.status().clone();
        assert_eq!(status.installed, InstalledProgram::Passthrough);
        assert!(status.last_shader_error.is_some());
        assert_eq!(status.frames_rendered, 2);
        let log = render.backend().log();
        assert_eq!(
            lock(&log).ops.last(),
            Some(&Op::Present),
            "loop keeps presenting after a failed build"
        );
    }

    #[test]
    fn captures_are_read_between_draw_and_present() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        let (reply_tx, reply_rx) = bounded(1);
        let ticket = CaptureTicket::acquire(&shared.capture_in_flight).unwrap();
        assert!(render.handle(Command::Capture(CaptureTask::new(reply_tx, ticket))));
        render.tick();

        let readback = reply_rx.try_recv().unwrap().expect("readback");
        assert_eq!(readback.bytes, frame(1).pixels);
        let log = render.backend().log();
        let ops: Vec<_> = lock(&log)
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Draw(_) | Op::ReadBack | Op::Present))
            .cloned()
            .collect();
        assert_eq!(
            ops,
            vec![Op::Draw("passthrough".into()), Op::ReadBack, Op::Present]
        );
        assert!(CaptureTicket::acquire(&shared.capture_in_flight).is_some());
    }

    #[test]
    fn draw_failures_fail_pending_captures() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        render.backend.fail_draws(true);
        let (reply_tx, reply_rx) = bounded(1);
        let ticket = CaptureTicket::acquire(&shared.capture_in_flight).unwrap();
        render.handle(Command::Capture(CaptureTask::new(reply_tx, ticket)));
        render.tick();

        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            Err(CaptureError::ReadbackFailed(_))
        ));
        assert_eq!(shared.status().frames_rendered, 0);
    }

    #[test]
    fn syncs_are_answered_after_the_tick() {
        let (mut render, _shared, _signals) = render_loop();
        let (reply_tx, reply_rx) = bounded(1);
        render.handle(Command::Sync(reply_tx));
        assert!(reply_rx.try_recv().is_err());
        render.tick();
        assert!(reply_rx.try_recv().is_ok());
        assert!(!render.handle(Command::Shutdown));
    }

    #[test]
    fn status_is_published_before_syncs_are_answered() {
        let (mut render, shared, _signals) = render_loop();
        shared.frames.submit(Some(frame(1))).unwrap();
        let (reply_tx, reply_rx) = bounded(1);
        render.handle(Command::Sync(reply_tx));

        // Peek at the status the moment the reply is sent.
        let observer = Arc::clone(&shared);
        let watcher = std::thread::spawn(move || {
            reply_rx.recv().unwrap();
            observer.status().clone()
        });
        render.tick();

        let status = watcher.join().unwrap();
        assert!(status.has_content);
        assert_eq!(status.frames_rendered, 1);
    }

    #[test]
    fn loop_reports_the_backend_texture_limit_to_producers() {
        let viewport = Viewport::new(2, 1);
        let shared = Arc::new(SharedState::new(viewport));
        let mut backend = RecordingBackend::new(viewport);
        backend.set_max_texture_dimension(3);
        let (signal_tx, _signal_rx) = unbounded();
        let mut render =
            RenderLoop::new(backend, Arc::clone(&shared), signal_tx, time_source(None))
                .expect("pass-through builds");

        let big = Frame::new(4, 1, PixelLayout::Rgba8, vec![0; 16], Duration::ZERO);
        assert!(matches!(
            shared.frames.submit(Some(big)),
            Err(crate::error::FrameError::TooLarge { max: 3, .. })
        ));
        render.resize(Viewport::new(2, 4));
        render.resize(Viewport::new(3, 3));
        assert_eq!(
            lock(&render.backend().log()).ops.last(),
            Some(&Op::Resize(Viewport::new(3, 3)))
        );
        assert_eq!(render.backend().viewport(), Viewport::new(3, 3));
    }

    #[test]
    fn presets_override_defaults_for_known_parameters() {
        let wave = Arc::clone(EffectCatalog::builtin().get("wave").unwrap());
        let preset = BTreeMap::from([
            ("frequency".to_string(), 2.0),
            ("unknown".to_string(), 0.5),
        ]);
        let mut controls = Controls::default();
        controls.select(Some(Arc::clone(&wave)), Some(&preset));

        assert_eq!(controls.parameters.get("frequency"), Some(&1.0));
        assert!(!controls.parameters.contains_key("unknown"));
        assert_eq!(controls.parameters.len(), wave.parameters().len());
        assert!(controls.dirty);
    }
}
