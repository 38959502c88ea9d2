//! GPU-compatible data types for the mesh pipeline
//!
//! These types match the layouts in `shaders/mesh.wgsl`.

use bytemuck::{Pod, Zeroable};
use trellis_math::mat4;

/// A world-space vertex with flat material color
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// RGBA color
    pub color: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            color: [1.0; 4],
        }
    }
}

/// Per-frame uniforms
/// Layout: 112 bytes (must match mesh.wgsl Uniforms)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshUniforms {
    /// Projection * view (64 bytes)
    pub view_projection: [[f32; 4]; 4],
    /// Direction the light travels, normalized (16 bytes)
    pub light_dir: [f32; 3],
    pub _padding: f32,
    /// Directional light color, premultiplied by intensity (16 bytes)
    pub light_color: [f32; 3],
    pub _padding2: f32,
    /// Ambient light color, premultiplied by intensity (16 bytes)
    pub ambient: [f32; 3],
    pub _padding3: f32,
}

impl Default for MeshUniforms {
    fn default() -> Self {
        Self {
            view_projection: mat4::IDENTITY,
            light_dir: [0.0, -1.0, 0.0],
            _padding: 0.0,
            light_color: [0.0; 3],
            _padding2: 0.0,
            ambient: [1.0; 3],
            _padding3: 0.0,
        }
    }
}
