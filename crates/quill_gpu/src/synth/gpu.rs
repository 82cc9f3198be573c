//! wgpu implementation of the synthesis passes
//!
//! Every pass of a run is recorded into one command encoder, in dependency
//! order, and submitted once from the encode pass.

use wgpu::util::DeviceExt;

use super::{FieldJob, FieldPasses, Result, SynthesisError};
use crate::context::GpuContext;
use crate::shaders::{encode_shader, propagate_shader, seed_shader, WORKGROUP_SIZE};
use crate::texture::{DeviceField, DistanceField, FieldExtent, PingPong};

/// Uniform block shared by all passes
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FieldParams {
    origin: [f32; 2],
    texel_size: f32,
    seed_radius: f32,
    width: u32,
    height: u32,
    step: u32,
    edge_count: u32,
    tie_epsilon: f32,
    _pad: [f32; 3],
}

impl FieldParams {
    fn new(job: &FieldJob, step: u32) -> Self {
        Self {
            origin: job.extent.bounds.origin.to_array(),
            texel_size: job.extent.texel_size,
            seed_radius: job.seed_radius,
            width: job.extent.width,
            height: job.extent.height,
            step,
            edge_count: job.edges.len() as u32,
            tie_epsilon: job.tie_epsilon,
            _pad: [0.0; 3],
        }
    }
}

struct FieldPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Compiled seed, propagate and encode pipelines
pub struct FieldPipelines {
    seed: FieldPipeline,
    propagate: FieldPipeline,
    encode: FieldPipeline,
}

impl std::fmt::Debug for FieldPipelines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldPipelines").finish_non_exhaustive()
    }
}

impl FieldPipelines {
    pub fn new(context: &GpuContext) -> Result<Self> {
        let device = context.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = Self {
            seed: create_pipeline(device, "Quill Field Seed", &seed_shader(), false),
            propagate: create_pipeline(device, "Quill Field Propagate", &propagate_shader(), true),
            encode: create_pipeline(device, "Quill Field Encode", &encode_shader(), true),
        };
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SynthesisError::Pass {
                pass: "compile",
                message: error.to_string(),
            });
        }
        tracing::debug!("compiled distance field pipelines");
        Ok(pipelines)
    }
}

fn layout_entries(reads_texture: bool) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ];
    if reads_texture {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: entries.len() as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba32Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    });
    entries
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    wgsl: &str,
    reads_texture: bool,
) -> FieldPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(wgsl.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &layout_entries(reads_texture),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });
    FieldPipeline { pipeline, layout }
}

struct FieldTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl FieldTexture {
    fn new(device: &wgpu::Device, label: &str, extent: &FieldExtent, copy_src: bool) -> Self {
        let mut usage = wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING;
        if copy_src {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

enum EdgeSource<'a> {
    Owned(wgpu::Buffer),
    Shared(&'a wgpu::Buffer),
}

impl EdgeSource<'_> {
    fn buffer(&self) -> &wgpu::Buffer {
        match self {
            EdgeSource::Owned(buffer) => buffer,
            EdgeSource::Shared(buffer) => buffer,
        }
    }
}

/// Device textures and the open command encoder of one run
pub struct WgpuPasses<'a> {
    context: GpuContext,
    pipelines: &'a FieldPipelines,
    edges: EdgeSource<'a>,
    textures: PingPong<FieldTexture>,
    encoder: Option<wgpu::CommandEncoder>,
}

impl<'a> WgpuPasses<'a> {
    pub fn new(
        context: GpuContext,
        pipelines: &'a FieldPipelines,
        job: &FieldJob,
        device_edges: Option<&'a wgpu::Buffer>,
    ) -> Result<Self> {
        let device = context.device();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let edges = match device_edges {
            Some(buffer) => EdgeSource::Shared(buffer),
            None => EdgeSource::Owned(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quill Field Edges"),
                contents: bytemuck::cast_slice(job.edges),
                usage: wgpu::BufferUsages::STORAGE,
            })),
        };
        let textures = PingPong::new(
            FieldTexture::new(device, "Quill Field Ping", &job.extent, false),
            FieldTexture::new(device, "Quill Field Pong", &job.extent, false),
        );

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        check_scopes("allocate", validation, oom)?;

        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Quill Field Encoder"),
        });

        Ok(Self {
            context,
            pipelines,
            edges,
            textures,
            encoder: Some(encoder),
        })
    }

    fn params_buffer(&self, job: &FieldJob, step: u32) -> wgpu::Buffer {
        self.context
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quill Field Params"),
                contents: bytemuck::bytes_of(&FieldParams::new(job, step)),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }
}

/// Bind and dispatch one pass over the whole field
#[allow(clippy::too_many_arguments)]
fn record(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    pass: &'static str,
    pipeline: &FieldPipeline,
    params: &wgpu::Buffer,
    edges: &wgpu::Buffer,
    src: Option<&wgpu::TextureView>,
    dst: &wgpu::TextureView,
    extent: &FieldExtent,
) {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: edges.as_entire_binding(),
        },
    ];
    if let Some(src) = src {
        entries.push(wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::TextureView(src),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: entries.len() as u32,
        resource: wgpu::BindingResource::TextureView(dst),
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(pass),
        layout: &pipeline.layout,
        entries: &entries,
    });

    let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(pass),
        timestamp_writes: None,
    });
    cpass.set_pipeline(&pipeline.pipeline);
    cpass.set_bind_group(0, &bind_group, &[]);
    cpass.dispatch_workgroups(
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    );
    tracing::trace!("recorded {} pass", pass);
}

impl FieldPasses for WgpuPasses<'_> {
    fn seed(&mut self, job: &FieldJob) -> Result<()> {
        let params = self.params_buffer(job, 0);
        let context = self.context.clone();
        let encoder = self.encoder.as_mut().ok_or(SynthesisError::Pass {
            pass: "seed",
            message: "encoder already submitted".into(),
        })?;
        record(
            context.device(),
            encoder,
            "seed",
            &self.pipelines.seed,
            &params,
            self.edges.buffer(),
            None,
            &self.textures.next().view,
            &job.extent,
        );
        self.textures.swap();
        Ok(())
    }

    fn propagate(&mut self, job: &FieldJob, step: u32) -> Result<()> {
        let params = self.params_buffer(job, step);
        let context = self.context.clone();
        let encoder = self.encoder.as_mut().ok_or(SynthesisError::Pass {
            pass: "propagate",
            message: "encoder already submitted".into(),
        })?;
        record(
            context.device(),
            encoder,
            "propagate",
            &self.pipelines.propagate,
            &params,
            self.edges.buffer(),
            Some(&self.textures.current().view),
            &self.textures.next().view,
            &job.extent,
        );
        self.textures.swap();
        Ok(())
    }

    fn encode(&mut self, job: &FieldJob) -> Result<DistanceField> {
        let mut encoder = self.encoder.take().ok_or(SynthesisError::Pass {
            pass: "encode",
            message: "encoder already submitted".into(),
        })?;
        let context = self.context.clone();
        let device = context.device();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let output = FieldTexture::new(device, "Quill Distance Field", &job.extent, true);
        let params = self.params_buffer(job, 0);
        record(
            device,
            &mut encoder,
            "encode",
            &self.pipelines.encode,
            &params,
            self.edges.buffer(),
            Some(&self.textures.current().view),
            &output.view,
            &job.extent,
        );
        context.queue().submit(std::iter::once(encoder.finish()));

        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        check_scopes("encode", validation, oom)?;

        Ok(DistanceField::Device(DeviceField::new(
            context.clone(),
            output.texture,
            job.extent,
        )))
    }
}

/// Fold the popped validation and out-of-memory scopes of one pass
fn check_scopes(
    pass: &'static str,
    validation: Option<wgpu::Error>,
    oom: Option<wgpu::Error>,
) -> Result<()> {
    match oom.or(validation) {
        Some(error) => Err(SynthesisError::Pass {
            pass,
            message: error.to_string(),
        }),
        None => Ok(()),
    }
}
