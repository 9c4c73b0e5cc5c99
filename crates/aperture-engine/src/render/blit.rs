use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::{WgpuCanvas, WgpuDriver};

use super::{CompositePass, Compositor};

/// Draws the camera texture as a single textured quad.
///
/// Honors the pass transform (resize mode, mirroring); the area the frame
/// does not cover is cleared to `clear`. Pipeline objects are created lazily
/// and rebuilt when the target format changes.
pub struct BlitCompositor {
    clear: wgpu::Color,

    pipeline_format: Option<wgpu::TextureFormat>,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    uniform: Option<wgpu::Buffer>,

    quad_vbo: Option<wgpu::Buffer>,
    quad_ibo: Option<wgpu::Buffer>,
}

impl BlitCompositor {
    pub fn new(clear: wgpu::Color) -> Self {
        Self {
            clear,
            pipeline_format: None,
            pipeline: None,
            bind_group_layout: None,
            sampler: None,
            uniform: None,
            quad_vbo: None,
            quad_ibo: None,
        }
    }

    fn ensure_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        if self.pipeline_format == Some(format) && self.pipeline.is_some() {
            return;
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("aperture blit shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("aperture blit bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<BlitUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("aperture blit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("aperture blit pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("blit pipeline built for {format:?}");
        self.pipeline_format = Some(format);
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);
    }

    fn ensure_static(&mut self, device: &wgpu::Device) {
        if self.sampler.is_none() {
            self.sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("aperture blit sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            }));
        }
        if self.uniform.is_none() {
            self.uniform = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("aperture blit ubo"),
                size: std::mem::size_of::<BlitUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if self.quad_vbo.is_none() {
            self.quad_vbo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("aperture blit quad vbo"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            }));
        }
        if self.quad_ibo.is_none() {
            self.quad_ibo = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("aperture blit quad ibo"),
                contents: bytemuck::cast_slice(&QUAD_INDICES),
                usage: wgpu::BufferUsages::INDEX,
            }));
        }
    }
}

impl Default for BlitCompositor {
    fn default() -> Self {
        Self::new(wgpu::Color::BLACK)
    }
}

impl Compositor<WgpuDriver> for BlitCompositor {
    fn composite(
        &mut self,
        canvas: &mut WgpuCanvas<'_>,
        pass: &CompositePass,
    ) -> anyhow::Result<()> {
        self.ensure_pipeline(canvas.device, canvas.target_format);
        self.ensure_static(canvas.device);

        // Without a frame there is nothing to sample; the clear alone is drawn.
        let bind_group = match canvas.source {
            Some(source) => {
                let ubo = self.uniform.as_ref().context("blit uniform buffer missing")?;
                let (scale, offset) = pass.transform.ndc_scale_offset();
                let u = BlitUniform {
                    scale,
                    offset,
                    mirror: [if pass.transform.is_mirrored() { 1.0 } else { 0.0 }, 0.0],
                    _pad: [0.0; 2],
                };
                canvas.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&u));

                let bgl = self
                    .bind_group_layout
                    .as_ref()
                    .context("blit bind group layout missing")?;
                let sampler = self.sampler.as_ref().context("blit sampler missing")?;
                Some(canvas.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("aperture blit bind group"),
                    layout: bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: ubo.as_entire_binding() },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                }))
            }
            None => None,
        };

        let mut rpass = canvas.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("aperture blit pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: canvas.target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let Some(bind_group) = bind_group else {
            return Ok(());
        };
        let pipeline = self.pipeline.as_ref().context("blit pipeline missing")?;
        let quad_vbo = self.quad_vbo.as_ref().context("blit vertex buffer missing")?;
        let quad_ibo = self.quad_ibo.as_ref().context("blit index buffer missing")?;

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, quad_vbo.slice(..));
        rpass.set_index_buffer(quad_ibo.slice(..), wgpu::IndexFormat::Uint16);
        rpass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        Ok(())
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct BlitUniform {
    scale: [f32; 2],
    offset: [f32; 2],
    mirror: [f32; 2],
    _pad: [f32; 2], // 16-byte alignment
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    pos: [f32; 2], // 0..1
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0] },
    QuadVertex { pos: [0.0, 1.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];
