//! Headless wgpu device shared by the buffer manager and the synthesizer

use std::sync::Arc;

use thiserror::Error;

/// Error type for GPU context creation
#[derive(Error, Debug)]
pub enum GpuContextError {
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    #[error("failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

pub(crate) fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
}

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

pub(crate) fn env_f32(name: &str) -> Option<f32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
}

/// Device, queue and the limits they were created with
#[derive(Clone, Debug)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    limits: wgpu::Limits,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a context without a surface
    pub async fn headless() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: Self::preferred_backends(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuContextError::AdapterNotFound)?;

        let supported = adapter.limits();
        let limits = wgpu::Limits {
            max_texture_dimension_2d: wgpu::Limits::default()
                .max_texture_dimension_2d
                .min(supported.max_texture_dimension_2d),
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Quill GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            "gpu context: adapter={} backend={:?} max_texture_dimension_2d={} max_buffer_size={} MiB",
            adapter_info.name,
            adapter_info.backend,
            limits.max_texture_dimension_2d,
            limits.max_buffer_size / (1024 * 1024)
        );

        Ok(Self::from_parts(
            Arc::new(device),
            Arc::new(queue),
            limits,
            adapter_info,
        ))
    }

    /// Blocking variant of [`GpuContext::headless`]
    pub fn headless_blocking() -> Result<Self, GpuContextError> {
        pollster::block_on(Self::headless())
    }

    /// Wrap a device the host application already owns
    pub fn from_parts(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        limits: wgpu::Limits,
        adapter_info: wgpu::AdapterInfo,
    ) -> Self {
        Self {
            device,
            queue,
            limits,
            adapter_info,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Block until all submitted work has completed
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn preferred_backends() -> wgpu::Backends {
        #[cfg(target_os = "macos")]
        {
            wgpu::Backends::METAL
        }
        #[cfg(target_os = "windows")]
        {
            wgpu::Backends::DX12
        }
        #[cfg(target_os = "linux")]
        {
            wgpu::Backends::VULKAN | wgpu::Backends::GL
        }
        #[cfg(target_arch = "wasm32")]
        {
            wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL
        }
        #[cfg(not(any(
            target_os = "macos",
            target_os = "windows",
            target_os = "linux",
            target_arch = "wasm32"
        )))]
        {
            wgpu::Backends::PRIMARY
        }
    }
}
