use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use effects::{load_effect_dir, load_effect_dirs, range_for, EffectCatalog, EffectDescriptor};
use renderer::{prepare, Engine, EngineConfig, EngineSignal, PowerPreference, Viewport};
use settings::{PowerSetting, Settings};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, PreviewArgs, RenderArgs};
use crate::output::{capture_path, format_for_path, save_image};
use crate::paths::{expand_home, AppPaths};
use crate::source::{load_image, pattern_frame, SyntheticCamera};

const SIGNAL_POLL: Duration = Duration::from_millis(20);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything the subcommands share: resolved paths, settings, and the
/// catalog including custom effects.
pub struct AppContext {
    pub paths: AppPaths,
    pub settings: Settings,
    pub catalog: EffectCatalog,
}

impl AppContext {
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let paths = AppPaths::discover()?;
        let settings = load_settings(config, &paths)?;
        let catalog = build_catalog(&paths, &settings);
        tracing::debug!(
            config = %paths.config_dir().display(),
            data = %paths.data_dir().display(),
            effects = catalog.len(),
            "resolved funhouse paths"
        );
        Ok(Self {
            paths,
            settings,
            catalog,
        })
    }

    fn engine_config(&self, viewport: Viewport) -> EngineConfig {
        let renderer = &self.settings.renderer;
        EngineConfig {
            viewport,
            refresh_interval: renderer.refresh_interval,
            capture_timeout: renderer.capture_timeout,
            power: match renderer.power {
                PowerSetting::Low => PowerPreference::Low,
                PowerSetting::High => PowerPreference::High,
            },
            vsync: renderer.vsync,
            parameter_presets: self
                .settings
                .parameters
                .iter()
                .map(|(effect, values)| (effect.clone(), values.clone()))
                .collect::<HashMap<_, _>>(),
            ..EngineConfig::default()
        }
    }

    /// Requested effect, else `effects.initial`, else the first catalog entry.
    fn initial_effect(&self, requested: Option<&str>) -> Result<String> {
        let id = requested
            .map(str::to_string)
            .or_else(|| self.settings.effects.initial.clone())
            .or_else(|| self.catalog.first().map(|effect| effect.id().to_string()))
            .ok_or_else(|| anyhow!("effect catalog is empty"))?;
        if !self.catalog.contains(&id) {
            bail!("unknown effect '{id}'; run `funhouse effects` to list them");
        }
        Ok(id)
    }
}

fn load_settings(explicit: Option<&Path>, paths: &AppPaths) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }
    let path = paths.config_file();
    if path.exists() {
        Settings::load(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))
    } else {
        tracing::debug!(path = %path.display(), "no settings file; using defaults");
        Ok(Settings::default())
    }
}

fn build_catalog(paths: &AppPaths, settings: &Settings) -> EffectCatalog {
    let mut catalog = EffectCatalog::builtin();
    let roots: Vec<PathBuf> = paths
        .effect_user_dirs()
        .into_iter()
        .chain(settings.effects.custom_dirs.iter().map(|dir| expand_home(dir)))
        .collect();

    for root in roots.iter().filter(|root| root.is_dir()) {
        let loaded = match load_effect_dirs(root) {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "failed to scan effect directory");
                continue;
            }
        };
        for (dir, result) in loaded {
            match result.map_err(anyhow::Error::from).and_then(|descriptor| {
                let id = descriptor.id().to_string();
                catalog.add_custom(descriptor)?;
                Ok(id)
            }) {
                Ok(id) => tracing::debug!(effect = %id, dir = %dir.display(), "custom effect loaded"),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "skipping custom effect")
                }
            }
        }
    }
    catalog
}

pub fn run_effects(context: &AppContext) -> Result<()> {
    for effect in context.catalog.list() {
        println!("{:<20} {}", effect.id(), effect.name());
        for (name, default) in effect.parameters() {
            let range = range_for(effect.id(), name);
            println!(
                "  {name:<16} default={default:<5.2} range=[{}, {}]",
                range.min, range.max
            );
        }
    }
    Ok(())
}

pub fn run_check(args: &CheckArgs) -> Result<()> {
    let descriptor = load_checked_effect(&args.path)?;
    descriptor
        .validate()
        .with_context(|| format!("effect '{}' is invalid", descriptor.id()))?;
    let prepared = prepare(&descriptor)
        .with_context(|| format!("effect '{}' failed to build", descriptor.id()))?;
    println!(
        "{}: ok ({} parameter{})",
        prepared.effect_id,
        descriptor.parameters().len(),
        if descriptor.parameters().len() == 1 { "" } else { "s" }
    );
    Ok(())
}

fn load_checked_effect(path: &Path) -> Result<EffectDescriptor> {
    if path.is_dir() {
        return load_effect_dir(path)
            .with_context(|| format!("failed to load effect from {}", path.display()));
    }
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("cannot derive an effect id from {}", path.display()))?;
    Ok(EffectDescriptor::new(id, id, source))
}

pub fn run_render(context: AppContext, args: &RenderArgs) -> Result<()> {
    let format = format_for_path(&args.output)?;
    let effect = context.initial_effect(args.effect.as_deref())?;

    let camera = &context.settings.camera;
    let source = match &args.input {
        Some(path) => load_image(path)?,
        None => {
            let pattern = args.pattern.map(Into::into).unwrap_or(camera.pattern);
            pattern_frame(
                pattern,
                args.width.unwrap_or(camera.width),
                args.height.unwrap_or(camera.height),
                args.time,
                Duration::ZERO,
            )
        }
    };
    let viewport = Viewport::new(
        args.width.unwrap_or(source.width),
        args.height.unwrap_or(source.height),
    );
    if viewport.is_empty() {
        bail!("output size must be at least 1x1, got {viewport}");
    }

    let config = EngineConfig {
        fixed_time: Some(args.time),
        initial_effect: Some(effect.clone()),
        ..context.engine_config(viewport)
    };
    let engine = Engine::spawn_headless(config, context.catalog)
        .context("failed to start offscreen renderer")?;
    for (name, value) in &args.params {
        engine
            .set_parameter(name, *value)
            .with_context(|| format!("invalid --param {name}"))?;
    }
    engine.submit_frame(Some(source))?;

    let timeout = context.settings.renderer.capture_timeout;
    if !engine.sync(timeout) {
        bail!("renderer did not settle within {timeout:?}");
    }
    if let Some(err) = engine.last_shader_error() {
        bail!("effect '{effect}' failed to build: {err}");
    }
    let image = engine.capture_current_frame().context("capture failed")?;
    save_image(
        image.into_image(),
        &args.output,
        format,
        context.settings.capture.jpeg_quality,
    )?;
    engine.shutdown()?;
    tracing::info!(effect = %effect, output = %args.output.display(), "render written");
    Ok(())
}

pub fn run_preview(context: AppContext, args: &PreviewArgs) -> Result<()> {
    let effect = context.initial_effect(args.effect.as_deref())?;
    let renderer = &context.settings.renderer;
    let (width, height) = args.size.unwrap_or((renderer.width, renderer.height));
    let config = EngineConfig {
        initial_effect: Some(effect),
        ..context.engine_config(Viewport::new(width, height))
    };
    let capture_dir = args
        .capture_dir
        .clone()
        .or_else(|| context.settings.capture.directory.as_deref().map(expand_home))
        .unwrap_or_else(|| context.paths.capture_dir());
    let capture = context.settings.capture.clone();
    let camera_settings = context.settings.camera.clone();

    let engine = Engine::spawn_windowed(config, context.catalog)
        .context("failed to open preview window")?;

    let camera = match &args.input {
        Some(path) => {
            engine.submit_frame(Some(load_image(path)?))?;
            None
        }
        None => Some(SyntheticCamera::start(
            engine.frame_sink(),
            args.pattern.map(Into::into).unwrap_or(camera_settings.pattern),
            camera_settings.width,
            camera_settings.height,
            args.fps.unwrap_or(camera_settings.fps),
        )?),
    };

    'preview: while engine.is_running() {
        for signal in engine.take_signals() {
            match signal {
                EngineSignal::NextEffect => log_switch(engine.next_effect()),
                EngineSignal::PreviousEffect => log_switch(engine.previous_effect()),
                EngineSignal::CaptureRequested => {
                    let effect = engine
                        .active_effect()
                        .map(|effect| effect.id().to_string())
                        .unwrap_or_else(|| "passthrough".to_string());
                    let path = capture_path(&capture_dir, &effect, capture.format);
                    match engine.capture_current_frame() {
                        Ok(image) => match save_image(
                            image.into_image(),
                            &path,
                            capture.format,
                            capture.jpeg_quality,
                        ) {
                            Ok(()) => tracing::info!(path = %path.display(), "capture saved"),
                            Err(err) => tracing::warn!(error = %format!("{err:#}"), "capture not saved"),
                        },
                        Err(err) => tracing::warn!(error = %err, "capture failed"),
                    }
                }
                EngineSignal::ShaderFailed { effect, error } => {
                    tracing::warn!(%effect, %error, "effect fell back to passthrough");
                }
                EngineSignal::ProgramInstalled(program) => {
                    tracing::debug!(?program, "program installed");
                }
                EngineSignal::CloseRequested => break 'preview,
            }
        }
        std::thread::sleep(SIGNAL_POLL);
    }

    if let Some(camera) = camera {
        camera.stop();
    }
    engine.shutdown()
}

fn log_switch(effect: Option<std::sync::Arc<EffectDescriptor>>) {
    match effect {
        Some(effect) => tracing::info!(effect = %effect.id(), name = %effect.name(), "effect selected"),
        None => tracing::warn!("no effects to cycle through"),
    }
}
