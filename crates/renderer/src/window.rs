use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use tracing::{error, info, warn};

use crate::engine::RenderThread;
use crate::gpu::WgpuBackend;
use crate::render::EngineSignal;
use crate::types::{EngineConfig, Viewport};

/// Maps a key press in the preview window onto an owner-facing request.
fn signal_for_key(event: &KeyEvent) -> Option<EngineSignal> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::ArrowRight) => Some(EngineSignal::NextEffect),
        Key::Named(NamedKey::ArrowLeft) => Some(EngineSignal::PreviousEffect),
        Key::Named(NamedKey::Space) => Some(EngineSignal::CaptureRequested),
        Key::Named(NamedKey::Escape) => Some(EngineSignal::CloseRequested),
        Key::Character(value) if value.eq_ignore_ascii_case("c") => {
            Some(EngineSignal::CaptureRequested)
        }
        Key::Character(value) if value.as_str() == " " => Some(EngineSignal::CaptureRequested),
        _ => None,
    }
}

/// Windowed driver: owns the event loop, the window, and the render loop, all
/// on the render thread.
pub(crate) fn run_window_thread(config: EngineConfig, thread: RenderThread) -> Result<()> {
    let mut builder = EventLoopBuilder::<()>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = builder
        .build()
        .map_err(|err| thread.fail(anyhow!("failed to create event loop: {err}")))?;
    let proxy = event_loop.create_proxy();

    let window = WindowBuilder::new()
        .with_title(config.window_title.as_str())
        .with_inner_size(PhysicalSize::new(
            config.viewport.width.max(1),
            config.viewport.height.max(1),
        ))
        .build(&event_loop)
        .map_err(|err| thread.fail(anyhow!("failed to create preview window: {err}")))?;
    let window = Arc::new(window);

    let backend = WgpuBackend::windowed(Arc::clone(&window), &config)
        .map_err(|err| thread.fail(err.context("failed to initialise window renderer")))?;
    let profile = backend.adapter_profile().clone();
    if profile.is_software() {
        warn!(
            adapter = %profile.name,
            backend = ?profile.backend,
            "software rasterizer detected; preview may be slow"
        );
    }
    let mut render = thread.start_loop(backend, &config)?;

    thread.ready(Some(Box::new(move || {
        let _ = proxy.send_event(());
    })));
    info!(title = %config.window_title, "preview window open");

    let signals = thread.signals.clone();
    let refresh_interval = config.refresh_interval;
    let run_result = event_loop.run(move |event, elwt| {
        match event {
            Event::UserEvent(()) | Event::AboutToWait => {
                for command in thread.commands.try_iter() {
                    if !render.handle(command) {
                        elwt.exit();
                        return;
                    }
                }
                if matches!(event, Event::AboutToWait) {
                    window.request_redraw();
                    elwt.set_control_flow(ControlFlow::WaitUntil(
                        Instant::now() + refresh_interval,
                    ));
                }
            }
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    let _ = signals.send(EngineSignal::CloseRequested);
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if let Some(signal) = signal_for_key(&event) {
                        let close = signal == EngineSignal::CloseRequested;
                        let _ = signals.send(signal);
                        if close {
                            elwt.exit();
                        }
                    }
                }
                WindowEvent::Resized(size) => {
                    render.resize(Viewport::new(size.width, size.height));
                }
                WindowEvent::RedrawRequested => render.tick(),
                _ => {}
            },
            _ => {}
        }
    });

    if let Err(err) = run_result {
        error!(error = %err, "window event loop error");
        return Err(anyhow!("window event loop error: {err}"));
    }
    info!("preview window closed");
    Ok(())
}
