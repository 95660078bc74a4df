use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::compile::{PreparedProgram, VERTEX_SHADER_GLSL};
use crate::error::{ShaderError, ShaderStage};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    tex_coord: [f32; 2],
}

/// Triangle strip covering clip space. Texture row 0 is the top of the image.
const QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

pub(crate) const QUAD_VERTEX_COUNT: u32 = QUAD.len() as u32;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

/// Objects every effect pipeline shares.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub vertex_module: wgpu::ShaderModule,
    pub quad: wgpu::Buffer,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Result<Self, ShaderError> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let vertex_module = create_module(device, VERTEX_SHADER_GLSL, ShaderStage::Vertex)?;

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            uniform_layout,
            texture_layout,
            vertex_module,
            quad,
        })
    }
}

/// A built effect program.
pub struct EffectPipeline {
    pub(crate) pipeline: wgpu::RenderPipeline,
    effect_id: String,
}

impl EffectPipeline {
    pub fn effect_id(&self) -> &str {
        &self.effect_id
    }
}

pub(crate) fn build_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    target_format: wgpu::TextureFormat,
    program: &PreparedProgram,
) -> Result<EffectPipeline, ShaderError> {
    let fragment_module = create_module(device, &program.fragment, ShaderStage::Fragment)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("effect pipeline layout"),
        bind_group_layouts: &[&layouts.uniform_layout, &layouts.texture_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(program.effect_id.as_str()),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &layouts.vertex_module,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(ShaderError::Link {
            message: err.to_string(),
        });
    }

    Ok(EffectPipeline {
        pipeline,
        effect_id: program.effect_id.clone(),
    })
}

fn create_module(
    device: &wgpu::Device,
    source: &str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => wgpu::naga::ShaderStage::Vertex,
        ShaderStage::Fragment => wgpu::naga::ShaderStage::Fragment,
    };
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match stage {
            ShaderStage::Vertex => "funhouse vertex shader",
            ShaderStage::Fragment => "funhouse fragment shader",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage: naga_stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(ShaderError::Compile {
            stage,
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}
