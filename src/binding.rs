//! The single bind group layout shared by the simulation and render pipelines.
//!
//! Both the `wgpu` layout and the WGSL declarations every shader is compiled
//! with are generated from [`CELL_BINDINGS`], so the host and device sides of
//! the contract come from one place.

use std::fmt::Write;

use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, Buffer, BufferBindingType, Device, ShaderStages,
};

use crate::{
    rendering::INSTANCE_CELL_WGSL,
    sim::gpucompute::{GridUniform, WORKGROUP_SIZE},
};

/// One shader-visible slot of group 0
pub struct CellBinding {
    pub slot: u32,
    pub name: &'static str,
    pub address_space: &'static str,
    pub wgsl_type: &'static str,
    pub visibility: ShaderStages,
    pub ty: BufferBindingType,
}

pub const PARAMS_SLOT: u32 = 0;
pub const READ_SLOT: u32 = 1;
pub const WRITE_SLOT: u32 = 2;

pub const CELL_BINDINGS: [CellBinding; 3] = [
    CellBinding {
        slot: PARAMS_SLOT,
        name: "grid",
        address_space: "uniform",
        wgsl_type: "GridParams",
        visibility: ShaderStages::VERTEX_FRAGMENT.union(ShaderStages::COMPUTE),
        ty: BufferBindingType::Uniform,
    },
    CellBinding {
        slot: READ_SLOT,
        name: "cells_in",
        address_space: "storage, read",
        wgsl_type: "array<u32>",
        visibility: ShaderStages::VERTEX.union(ShaderStages::COMPUTE),
        ty: BufferBindingType::Storage { read_only: true },
    },
    CellBinding {
        slot: WRITE_SLOT,
        name: "cells_out",
        address_space: "storage, read_write",
        wgsl_type: "array<u32>",
        visibility: ShaderStages::COMPUTE,
        ty: BufferBindingType::Storage { read_only: false },
    },
];

pub fn create_layout(device: &Device) -> BindGroupLayout {
    let entries: Vec<_> = CELL_BINDINGS
        .iter()
        .map(|binding| BindGroupLayoutEntry {
            binding: binding.slot,
            visibility: binding.visibility,
            ty: wgpu::BindingType::Buffer {
                ty: binding.ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("cell bind group layout"),
        entries: &entries,
    })
}

/// WGSL text every shader module is prefixed with: the workgroup size, the
/// uniform struct, the declarations of the slots visible to `stages` and,
/// for vertex shaders, the instance mapping.
pub fn wgsl_prelude(stages: ShaderStages) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "const WORKGROUP_SIZE: u32 = {WORKGROUP_SIZE}u;");
    out.push_str(GridUniform::WGSL);
    for binding in CELL_BINDINGS
        .iter()
        .filter(|b| b.visibility.intersects(stages))
    {
        let _ = writeln!(
            out,
            "@group(0) @binding({}) var<{}> {}: {};",
            binding.slot, binding.address_space, binding.name, binding.wgsl_type
        );
    }
    if stages.contains(ShaderStages::VERTEX) {
        out.push_str(INSTANCE_CELL_WGSL);
    }
    out
}

pub fn shader_source(stages: ShaderStages, body: &str) -> String {
    let mut source = wgsl_prelude(stages);
    source.push('\n');
    source.push_str(body);
    source
}

/// Indices of the (read, write) cell buffers bound by the set for `parity`
pub fn set_buffers(parity: usize) -> (usize, usize) {
    let read = parity % 2;
    (read, 1 - read)
}

/// The two prebuilt binding sets, one per step parity.
///
/// Set 0 reads buffer A and writes buffer B, set 1 the reverse. They are
/// never rebuilt; a tick only selects one.
pub struct BindingSets {
    sets: [BindGroup; 2],
}

impl BindingSets {
    pub fn new(
        device: &Device,
        layout: &BindGroupLayout,
        params_buf: &Buffer,
        cells: &[Buffer; 2],
    ) -> Self {
        let make = |parity: usize| {
            let (read, write) = set_buffers(parity);
            device.create_bind_group(&BindGroupDescriptor {
                label: Some(if parity == 0 {
                    "cell binding set (A -> B)"
                } else {
                    "cell binding set (B -> A)"
                }),
                layout,
                entries: &[
                    BindGroupEntry {
                        binding: PARAMS_SLOT,
                        resource: params_buf.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: READ_SLOT,
                        resource: cells[read].as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: WRITE_SLOT,
                        resource: cells[write].as_entire_binding(),
                    },
                ],
            })
        };
        Self {
            sets: [make(0), make(1)],
        }
    }

    pub fn set(&self, parity: usize) -> &BindGroup {
        &self.sets[parity % 2]
    }
}
