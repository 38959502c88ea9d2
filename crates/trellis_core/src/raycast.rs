//! Ray picking against the scene graph

use trellis_math::{mat4, Ray, Vec2, Vec3};
use crate::error::CoreError;
use crate::graph::{NodeKey, SceneGraph};
use crate::node::Shape;

/// Result of a ray/object test
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersection {
    /// The node whose geometry was hit
    pub object: NodeKey,
    /// The node an event is dispatched to; `object` or one of its ancestors
    pub event_object: NodeKey,
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// World-space normal of the face that was hit
    pub face_normal: Option<Vec3>,
    pub index: Option<u32>,
    pub instance_id: Option<u32>,
}

impl Intersection {
    pub fn new(object: NodeKey, distance: f32, point: Vec3) -> Self {
        Self {
            object,
            event_object: object,
            distance,
            point,
            face_normal: None,
            index: None,
            instance_id: None,
        }
    }

    /// Key identifying the intersected geometry element
    pub fn hit_key(&self) -> HitKey {
        HitKey {
            object: self.object,
            index: self.index,
            instance_id: self.instance_id,
        }
    }

    /// Key identifying this intersection as delivered to its event object
    pub fn event_key(&self) -> HitKey {
        HitKey {
            object: self.event_object,
            index: self.index,
            instance_id: self.instance_id,
        }
    }
}

/// Deduplication key `(object, index, instance id)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HitKey {
    pub object: NodeKey,
    pub index: Option<u32>,
    pub instance_id: Option<u32>,
}

/// Casts rays from a camera through the pointer
#[derive(Clone, Debug, PartialEq)]
pub struct Raycaster {
    pub ray: Ray,
    pub near: f32,
    pub far: f32,
    /// Camera the current ray was cast from
    pub camera: Option<NodeKey>,
    /// Layer mask; a node is tested when its layers intersect this mask
    pub layers: u32,
    pub enabled: bool,
}

impl Default for Raycaster {
    fn default() -> Self {
        Self {
            ray: Ray::default(),
            near: 0.0,
            far: f32::INFINITY,
            camera: None,
            layers: 1,
            enabled: true,
        }
    }
}

impl Raycaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the ray from `camera` through normalized device coordinates
    pub fn set_from_camera(&mut self, graph: &SceneGraph, ndc: Vec2, camera: NodeKey) -> Result<(), CoreError> {
        let node = graph
            .get(camera)
            .ok_or_else(|| CoreError::Camera("camera node no longer exists".to_string()))?;
        let cam = node
            .camera_data()
            .ok_or_else(|| CoreError::Camera(format!("node '{}' is not a camera", node.name)))?;
        let inverse_projection = mat4::inverse(&cam.projection_matrix())
            .ok_or_else(|| CoreError::Camera("projection is not invertible".to_string()))?;
        let world = graph.world_matrix(camera);

        self.ray = if cam.is_orthographic() {
            let near_point = mat4::project_point(&inverse_projection, Vec3::new(ndc.x, ndc.y, -1.0));
            let origin = mat4::transform_point(&world, near_point);
            let direction = mat4::transform_vector(&world, Vec3::new(0.0, 0.0, -1.0));
            Ray::new(origin, direction)
        } else {
            let origin = mat4::translation(&world);
            let through = mat4::project_point(&inverse_projection, Vec3::new(ndc.x, ndc.y, 0.5));
            Ray::between(origin, mat4::transform_point(&world, through))
        };
        self.camera = Some(camera);
        Ok(())
    }

    /// Point on the camera's near plane under the pointer
    pub fn unproject(graph: &SceneGraph, ndc: Vec2, camera: NodeKey) -> Option<Vec3> {
        let cam = graph.get(camera)?.camera_data()?;
        let inverse_projection = mat4::inverse(&cam.projection_matrix())?;
        let local = mat4::project_point(&inverse_projection, Vec3::new(ndc.x, ndc.y, -1.0));
        Some(mat4::transform_point(&graph.world_matrix(camera), local))
    }

    /// Test `node` (and its descendants when `recursive`) against the ray
    ///
    /// Results are sorted nearest first.
    pub fn intersect_object(&self, graph: &SceneGraph, node: NodeKey, recursive: bool) -> Vec<Intersection> {
        let mut hits = Vec::new();
        if self.enabled {
            self.intersect_node(graph, node, recursive, &mut hits);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn intersect_node(&self, graph: &SceneGraph, key: NodeKey, recursive: bool, out: &mut Vec<Intersection>) {
        let Some(node) = graph.get(key) else {
            return;
        };
        if !node.visible {
            return;
        }
        if node.layers & self.layers != 0 {
            if let Some(shape) = graph.mesh_shape(key) {
                if let Some(hit) = self.intersect_shape(graph, key, shape) {
                    out.push(hit);
                }
            }
        }
        if recursive {
            for child in node.children() {
                self.intersect_node(graph, *child, true, out);
            }
        }
    }

    fn intersect_shape(&self, graph: &SceneGraph, key: NodeKey, shape: Shape) -> Option<Intersection> {
        let world = graph.world_matrix(key);
        let inverse = mat4::inverse(&world)?;
        let local_ray = self.ray.transformed(&inverse);

        let (t, normal) = match shape {
            Shape::Box { size } => {
                let half = size * 0.5;
                let hit = local_ray.intersect_box(-half, half)?;
                (hit.t, hit.normal)
            }
            Shape::Sphere { radius } => {
                let t = local_ray.intersect_sphere(Vec3::ZERO, radius)?;
                (t, local_ray.at(t).normalized())
            }
            Shape::Plane { width, height } => {
                let t = local_ray.intersect_plane(Vec3::Z, 0.0)?;
                let p = local_ray.at(t);
                if p.x.abs() > width / 2.0 || p.y.abs() > height / 2.0 {
                    return None;
                }
                (t, Vec3::Z)
            }
        };

        let point = mat4::transform_point(&world, local_ray.at(t));
        let distance = self.ray.origin.distance(point);
        if distance < self.near || distance > self.far {
            return None;
        }
        let mut hit = Intersection::new(key, distance, point);
        hit.face_normal = Some(mat4::transform_vector(&world, normal).normalized());
        Some(hit)
    }
}
