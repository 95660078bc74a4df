use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use effects::{CatalogError, EffectCatalog, EffectDescriptor, ValidationError};
use tracing::{debug, info, warn};

use crate::backend::RenderBackend;
use crate::capture::{convert, CaptureTask, CaptureTicket};
use crate::clock::time_source;
use crate::error::{CaptureError, ControlError, FrameError, ShaderError};
use crate::gpu::WgpuBackend;
use crate::ingest::FrameSink;
use crate::render::{Command, EngineSignal, RenderLoop, SharedState};
use crate::types::{CapturedImage, EngineConfig, EngineStatus, Frame, Viewport};
use crate::window;

const RENDER_THREAD_NAME: &str = "funhouse-render";

/// Wakes a driver that sleeps between events so it notices new commands.
pub(crate) type Waker = Box<dyn Fn() + Send>;

/// Render-thread side of an engine: everything a driver needs to run a
/// [`RenderLoop`] and report start-up.
pub(crate) struct RenderThread {
    pub shared: Arc<SharedState>,
    pub commands: Receiver<Command>,
    pub signals: Sender<EngineSignal>,
    ready: Sender<Result<Option<Waker>>>,
}

impl RenderThread {
    pub fn start_loop<B: RenderBackend>(
        &self,
        backend: B,
        config: &EngineConfig,
    ) -> Result<RenderLoop<B>> {
        RenderLoop::new(
            backend,
            Arc::clone(&self.shared),
            self.signals.clone(),
            time_source(config.fixed_time),
        )
        .map_err(|err: ShaderError| self.fail(anyhow!("failed to build pass-through program: {err}")))
    }

    pub fn ready(&self, waker: Option<Waker>) {
        let _ = self.ready.send(Ok(waker));
    }

    /// Reports a start-up failure to the spawning thread and hands the error
    /// back for the thread's own result.
    pub fn fail(&self, err: anyhow::Error) -> anyhow::Error {
        let message = format!("{err:#}");
        let _ = self.ready.send(Err(anyhow!(message)));
        err
    }
}

/// Handle to a running effect engine. All methods take `&self` and may be
/// called from any thread; GPU work happens on the engine's render thread.
pub struct Engine {
    catalog: Mutex<EffectCatalog>,
    shared: Arc<SharedState>,
    commands: Sender<Command>,
    signals: Receiver<EngineSignal>,
    waker: Mutex<Option<Waker>>,
    presets: HashMap<String, BTreeMap<String, f32>>,
    capture_timeout: Duration,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl Engine {
    /// Renders offscreen at `config.viewport`, ticking every
    /// `config.refresh_interval`.
    pub fn spawn_headless(config: EngineConfig, catalog: EffectCatalog) -> Result<Self> {
        Self::spawn_with(config, catalog, WgpuBackend::headless)
    }

    /// Opens a preview window and renders into it, paced by the surface.
    pub fn spawn_windowed(config: EngineConfig, catalog: EffectCatalog) -> Result<Self> {
        Self::launch(config, catalog, window::run_window_thread)
    }

    /// Runs the headless driver over a backend built on the render thread.
    pub fn spawn_with<B, F>(config: EngineConfig, catalog: EffectCatalog, factory: F) -> Result<Self>
    where
        B: RenderBackend + 'static,
        F: FnOnce(&EngineConfig) -> Result<B> + Send + 'static,
    {
        Self::launch(config, catalog, move |config, thread| {
            run_headless(config, thread, factory)
        })
    }

    fn launch<F>(config: EngineConfig, catalog: EffectCatalog, driver: F) -> Result<Self>
    where
        F: FnOnce(EngineConfig, RenderThread) -> Result<()> + Send + 'static,
    {
        let shared = Arc::new(SharedState::new(config.viewport));
        let (command_tx, command_rx) = unbounded();
        let (signal_tx, signal_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let thread = RenderThread {
            shared: Arc::clone(&shared),
            commands: command_rx,
            signals: signal_tx,
            ready: ready_tx,
        };

        let thread_config = config.clone();
        let handle = thread::Builder::new()
            .name(RENDER_THREAD_NAME.into())
            .spawn(move || driver(thread_config, thread))
            .context("failed to spawn render thread")?;

        let waker = match ready_rx.recv() {
            Ok(ready) => ready?,
            Err(_) => {
                return Err(match handle.join() {
                    Ok(Err(err)) => err,
                    Ok(Ok(())) => anyhow!("render thread exited during start-up"),
                    Err(_) => anyhow!("render thread panicked during start-up"),
                })
            }
        };

        let engine = Self {
            catalog: Mutex::new(catalog),
            shared,
            commands: command_tx,
            signals: signal_rx,
            waker: Mutex::new(waker),
            presets: config.parameter_presets.clone(),
            capture_timeout: config.capture_timeout,
            join_handle: Some(handle),
        };
        if let Some(id) = &config.initial_effect {
            engine
                .set_effect(id)
                .with_context(|| format!("initial effect '{id}'"))?;
        }
        info!(viewport = %config.viewport, "engine started");
        Ok(engine)
    }

    /// Producer handle for [`Engine::submit_frame`] that can move to another
    /// thread.
    pub fn frame_sink(&self) -> FrameSink {
        FrameSink::new(Arc::clone(&self.shared.frames))
    }

    /// Offers the newest camera frame, or `None` to clear the picture. Never
    /// blocks on the render thread.
    pub fn submit_frame(&self, frame: Option<Frame>) -> Result<(), FrameError> {
        self.shared.frames.submit(frame)
    }

    /// Activates a catalog effect with its default parameters (plus any
    /// configured preset).
    pub fn set_effect(&self, id: &str) -> Result<(), CatalogError> {
        let descriptor = Arc::clone(self.catalog().get(id)?);
        self.select(Some(descriptor));
        Ok(())
    }

    /// Returns to the pass-through program.
    pub fn clear_effect(&self) {
        self.select(None);
    }

    pub fn active_effect(&self) -> Option<Arc<EffectDescriptor>> {
        self.shared.controls().effect.clone()
    }

    /// Sets a normalized value for a parameter of the active effect. Values
    /// are clamped to `[0, 1]`.
    pub fn set_parameter(&self, name: &str, value: f32) -> Result<(), ControlError> {
        let mut controls = self.shared.controls();
        let effect = controls
            .effect
            .clone()
            .ok_or(ControlError::NoActiveEffect)?;
        if !effect.parameters().contains_key(name) {
            return Err(ControlError::UnknownParameter {
                effect: effect.id().to_string(),
                name: name.to_string(),
            });
        }
        controls
            .parameters
            .insert(name.to_string(), value.clamp(0.0, 1.0));
        controls.dirty = true;
        Ok(())
    }

    /// Normalized values the next tick will use.
    pub fn parameters(&self) -> BTreeMap<String, f32> {
        self.shared.controls().parameters.clone()
    }

    /// Origin of the radial effects in texture coordinates; `(0.5, 0.5)` is
    /// the middle. Components are clamped to `[0, 1]`.
    pub fn set_center(&self, center: [f32; 2]) {
        let mut controls = self.shared.controls();
        controls.center = center.map(|value| value.clamp(0.0, 1.0));
        controls.dirty = true;
    }

    pub fn effects(&self) -> Vec<Arc<EffectDescriptor>> {
        self.catalog().list().to_vec()
    }

    pub fn add_effect(&self, descriptor: EffectDescriptor) -> Result<(), ValidationError> {
        self.catalog().add_custom(descriptor)
    }

    pub fn create_effect<I, K>(
        &self,
        name: &str,
        shader_source: &str,
        parameters: I,
    ) -> Result<Arc<EffectDescriptor>, ValidationError>
    where
        I: IntoIterator<Item = (K, f32)>,
        K: Into<String>,
    {
        self.catalog()
            .create_custom(name, shader_source, parameters)
    }

    /// Removes an effect. When it was active, the first remaining effect (or
    /// pass-through for an empty catalog) takes over.
    pub fn remove_effect(&self, id: &str) -> Result<Arc<EffectDescriptor>, CatalogError> {
        let mut catalog = self.catalog();
        let removed = catalog.remove(id)?;
        let was_active = self
            .shared
            .controls()
            .effect
            .as_ref()
            .is_some_and(|effect| effect.id() == id);
        if was_active {
            self.select(catalog.first().cloned());
        }
        info!(effect = id, was_active, "effect removed");
        Ok(removed)
    }

    /// Cycles forward through the catalog, wrapping at the end.
    pub fn next_effect(&self) -> Option<Arc<EffectDescriptor>> {
        let catalog = self.catalog();
        let current = self.active_id();
        let next = Arc::clone(catalog.next_after(&current)?);
        self.select(Some(Arc::clone(&next)));
        Some(next)
    }

    pub fn previous_effect(&self) -> Option<Arc<EffectDescriptor>> {
        let catalog = self.catalog();
        let current = self.active_id();
        let previous = Arc::clone(catalog.previous_before(&current)?);
        self.select(Some(Arc::clone(&previous)));
        Some(previous)
    }

    /// Changes the offscreen target size. Windowed engines follow the window.
    pub fn resize(&self, viewport: Viewport) {
        self.send(Command::Resize(viewport));
    }

    /// Reads back the next composited frame using the configured timeout.
    pub fn capture_current_frame(&self) -> Result<CapturedImage, CaptureError> {
        self.capture_with_timeout(self.capture_timeout)
    }

    pub fn capture_with_timeout(&self, timeout: Duration) -> Result<CapturedImage, CaptureError> {
        if self.shared.status().viewport.is_empty() || !self.shared.frames.has_content() {
            return Err(CaptureError::NoContent);
        }

        let ticket =
            CaptureTicket::acquire(&self.shared.capture_in_flight).ok_or(CaptureError::Busy)?;
        let (reply_tx, reply_rx) = bounded(1);
        if !self.send(Command::Capture(CaptureTask::new(reply_tx, ticket))) {
            return Err(CaptureError::Stopped);
        }

        let started = Instant::now();
        let readback = match reply_rx.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "capture timed out");
                return Err(CaptureError::Timeout);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Stopped),
        };
        let image = convert(readback)?;
        debug!(
            width = image.width(),
            height = image.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "frame captured"
        );
        Ok(image)
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.status().clone()
    }

    pub fn last_shader_error(&self) -> Option<ShaderError> {
        self.shared.status().last_shader_error.clone()
    }

    /// Blocks until the render thread has completed one more tick. Returns
    /// false on timeout or when the engine has stopped.
    pub fn sync(&self, timeout: Duration) -> bool {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Command::Sync(reply_tx)) && reply_rx.recv_timeout(timeout).is_ok()
    }

    /// Drains signals raised since the last call.
    pub fn take_signals(&self) -> Vec<EngineSignal> {
        self.signals.try_iter().collect()
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the render thread and waits for it to release the GPU.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            self.send(Command::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("render thread panicked: {err:?}"))??;
            info!("engine stopped");
        }
        Ok(())
    }

    fn select(&self, effect: Option<Arc<EffectDescriptor>>) {
        let preset = effect
            .as_ref()
            .and_then(|effect| self.presets.get(effect.id()));
        match &effect {
            Some(effect) => debug!(effect = effect.id(), "effect selected"),
            None => debug!("pass-through selected"),
        }
        self.shared.controls().select(effect, preset);
    }

    fn active_id(&self) -> String {
        self.shared
            .controls()
            .effect
            .as_ref()
            .map(|effect| effect.id().to_string())
            .unwrap_or_default()
    }

    fn send(&self, command: Command) -> bool {
        let sent = self.commands.send(command).is_ok();
        if let Some(wake) = self.lock_waker().as_ref() {
            wake();
        }
        sent
    }

    fn catalog(&self) -> MutexGuard<'_, EffectCatalog> {
        self.catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_waker(&self) -> MutexGuard<'_, Option<Waker>> {
        self.waker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            self.send(Command::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_headless<B, F>(config: EngineConfig, thread: RenderThread, factory: F) -> Result<()>
where
    B: RenderBackend,
    F: FnOnce(&EngineConfig) -> Result<B>,
{
    let backend = factory(&config)
        .map_err(|err| thread.fail(err.context("failed to initialise headless renderer")))?;
    let mut render = thread.start_loop(backend, &config)?;
    thread.ready(None);
    info!(
        interval_ms = config.refresh_interval.as_millis() as u64,
        "headless render loop running"
    );

    let mut next_tick = Instant::now() + config.refresh_interval;
    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        match thread.commands.recv_timeout(timeout) {
            Ok(command) => {
                if !render.handle(command) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        render.tick();
        next_tick = Instant::now() + config.refresh_interval;
    }

    info!("headless render loop stopped");
    Ok(())
}
