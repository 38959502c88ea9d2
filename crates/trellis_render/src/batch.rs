//! Scene batching - bridges the scene graph to GPU buffers
//!
//! Visible meshes under a scene root are tessellated, transformed to world
//! space and colored from their material, producing one vertex list that the
//! mesh pipeline draws in a single call. Lights are folded into the frame
//! uniforms.

use trellis_core::{Color, LightKind, NodeKey, NodeKind, SceneGraph, Value};
use trellis_math::{mat4, Vec3};
use crate::geometry;
use crate::types::{MeshUniforms, Vertex};

/// Everything the pipeline needs for one frame
#[derive(Clone, Debug, Default)]
pub struct SceneBatch {
    pub vertices: Vec<Vertex>,
    pub uniforms: MeshUniforms,
    /// Background color of the scene, if any
    pub background: Option<Color>,
    /// Number of meshes that contributed geometry
    pub mesh_count: usize,
}

impl SceneBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the batch for `scene` as seen from `camera`
    ///
    /// The vertex buffer is reused between frames.
    pub fn collect(&mut self, graph: &SceneGraph, scene: NodeKey, camera: NodeKey) {
        self.vertices.clear();
        self.mesh_count = 0;
        self.background = background(graph, scene);

        let mut lights = Lights::default();
        self.visit(graph, scene, &mut lights);

        self.uniforms = MeshUniforms {
            view_projection: crate::camera::view_projection(graph, camera).unwrap_or(mat4::IDENTITY),
            light_dir: lights.direction.to_array(),
            light_color: lights.directional,
            ambient: lights.ambient,
            ..Default::default()
        };
        // An unlit scene renders at full material color
        if lights.count == 0 {
            self.uniforms.ambient = [1.0; 3];
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    fn visit(&mut self, graph: &SceneGraph, key: NodeKey, lights: &mut Lights) {
        let Some(node) = graph.get(key) else {
            return;
        };
        if !node.visible {
            return;
        }

        match &node.kind {
            NodeKind::Mesh => self.push_mesh(graph, key),
            NodeKind::Light(kind) => lights.add(graph, key, *kind),
            _ => {}
        }

        for child in node.children() {
            self.visit(graph, *child, lights);
        }
    }

    fn push_mesh(&mut self, graph: &SceneGraph, key: NodeKey) {
        let Some(shape) = graph.mesh_shape(key) else {
            return;
        };
        let color = graph
            .get_prop(key, "material.color")
            .and_then(|v| v.as_color())
            .unwrap_or(Color::WHITE);
        let opacity = graph
            .get_prop(key, "material.opacity")
            .and_then(|v| v.as_f32())
            .unwrap_or(1.0);
        let rgba = [color.r, color.g, color.b, opacity];

        let world = graph.world_matrix(key);
        self.vertices.extend(geometry::tessellate(&shape).into_iter().map(|v| Vertex {
            position: mat4::transform_point(&world, v.position).to_array(),
            normal: mat4::transform_vector(&world, v.normal).normalized().to_array(),
            color: rgba,
        }));
        self.mesh_count += 1;
    }
}

#[derive(Default)]
struct Lights {
    count: usize,
    direction: Vec3,
    directional: [f32; 3],
    ambient: [f32; 3],
}

impl Lights {
    fn add(&mut self, graph: &SceneGraph, key: NodeKey, kind: LightKind) {
        let color = graph.get_prop(key, "color").and_then(|v| v.as_color()).unwrap_or(Color::WHITE);
        let intensity = graph.get_prop(key, "intensity").and_then(|v| v.as_f32()).unwrap_or(1.0);
        let scaled = [color.r * intensity, color.g * intensity, color.b * intensity];
        self.count += 1;

        match kind {
            LightKind::Ambient | LightKind::Hemisphere => {
                for (a, c) in self.ambient.iter_mut().zip(scaled) {
                    *a += c;
                }
            }
            // Only the first directional-style light is shaded; the rest
            // contribute to the ambient term
            _ if self.directional == [0.0; 3] => {
                let position = graph.world_position(key);
                self.direction = if position.length_squared() > 0.0 {
                    (-position).normalized()
                } else {
                    -Vec3::Y
                };
                self.directional = scaled;
            }
            _ => {
                for (a, c) in self.ambient.iter_mut().zip(scaled) {
                    *a += c * 0.25;
                }
            }
        }
    }
}

/// Scene background: a color value or an attached `color` element
fn background(graph: &SceneGraph, scene: NodeKey) -> Option<Color> {
    match graph.get_prop(scene, "background")? {
        Value::Node(_) => graph.get_prop(scene, "background.value")?.as_color(),
        other => other.as_color(),
    }
}
