use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::types::{AdapterProfile, PowerPreference, Viewport};

/// Instance, adapter, device and queue shared by both render targets.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub(crate) fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        })
    }

    /// Creates a surface for `target`. The caller keeps `target` alive for as
    /// long as the surface exists.
    pub(crate) fn create_surface<T>(
        instance: &wgpu::Instance,
        target: &T,
    ) -> Result<wgpu::Surface<'static>>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")
    }

    pub(crate) fn new(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'static>>,
        power: PowerPreference,
        viewport: Viewport,
    ) -> Result<Self> {
        let power_preference = match power {
            PowerPreference::Low => wgpu::PowerPreference::LowPower,
            PowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info());
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        if viewport.width > max_dimension || viewport.height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested target is {viewport}"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("funhouse device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            adapter_profile,
        })
    }
}
