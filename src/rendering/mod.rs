//! Instanced drawing of the cell grid.
//!
//! Every cell is one instance of the same unit quad. The vertex stage looks up
//! the cell's state in the read slot and scales the quad by it, so dead cells
//! collapse to nothing.

use bytemuck::{Pod, Zeroable};
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, CommandEncoder, Device, FragmentState,
    LoadOp, MultisampleState, Operations, PipelineLayoutDescriptor, PrimitiveState, RenderPass,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderStages, StoreOp, TextureFormat, TextureView, VertexState,
    util::{BufferInitDescriptor, DeviceExt},
};

use crate::{binding, error::SetupError, util::Color};

/// Clear color behind the cells
pub const BACKGROUND: Color = Color::rgb(0, 77, 0);

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

const fn v(x: f32, y: f32) -> QuadVertex {
    QuadVertex { position: [x, y] }
}

/// Two triangles covering most of one cell, in cell-local units
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    v(-0.8, -0.8),
    v(0.8, -0.8),
    v(0.8, 0.8),
    v(-0.8, -0.8),
    v(0.8, 0.8),
    v(-0.8, 0.8),
];

/// Grid coordinates of the cell drawn by instance `index`. Host mirror of
/// [`INSTANCE_CELL_WGSL`].
pub fn instance_cell(index: u32, width: u32) -> (u32, u32) {
    (index % width, index / width)
}

/// Instance to cell mapping used by the vertex stage, emitted into the
/// prelude of every shader that sees [`ShaderStages::VERTEX`].
pub const INSTANCE_CELL_WGSL: &str = "fn instance_cell(i: u32) -> vec2<u32> {
    return vec2<u32>(i % grid.size.x, i / grid.size.x);
}
";

/// The quad every instance draws, uploaded once.
pub struct VertexTemplate {
    buffer: Buffer,
}

impl VertexTemplate {
    pub fn new(device: &Device) -> Self {
        let buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("cell quad vertex buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        });
        Self { buffer }
    }

    pub fn vertex_count(&self) -> u32 {
        QUAD_VERTICES.len() as u32
    }

    pub fn bind(&self, pass: &mut RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.buffer.slice(..));
    }
}

/// Render pipeline plus the quad it instances.
pub struct CellRenderer {
    pipeline: RenderPipeline,
    quad: VertexTemplate,
}

impl CellRenderer {
    pub async fn create(
        device: &Device,
        layout: &BindGroupLayout,
        format: TextureFormat,
    ) -> Result<Self, SetupError> {
        Ok(Self {
            pipeline: create_render_pipeline(device, layout, format).await?,
            quad: VertexTemplate::new(device),
        })
    }

    /// Record one render pass clearing `view` to `background` and drawing
    /// `instances` cells from the read slot of `cells`.
    pub fn record(
        &self,
        encoder: &mut CommandEncoder,
        view: &TextureView,
        cells: &BindGroup,
        instances: u32,
        background: Color,
    ) {
        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("cell render pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(background.to_wgpu()),
                    store: StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        self.quad.bind(&mut render_pass);
        render_pass.set_bind_group(0, cells, &[]);
        render_pass.draw(0..self.quad.vertex_count(), 0..instances);
    }
}

pub async fn create_render_pipeline(
    device: &Device,
    layout: &BindGroupLayout,
    surface_format: TextureFormat,
) -> Result<RenderPipeline, SetupError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("cell render shader"),
        source: wgpu::ShaderSource::Wgsl(
            binding::shader_source(ShaderStages::VERTEX_FRAGMENT, include_str!("./render.wgsl"))
                .into(),
        ),
    });

    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("render pipeline layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("cell render pipeline"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[QuadVertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    });

    if let Some(error) = device.pop_error_scope().await {
        return Err(SetupError::PipelineLayout {
            stage: "render",
            message: error.to_string(),
        });
    }
    Ok(render_pipeline)
}
