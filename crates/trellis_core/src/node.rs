//! Scene nodes
//!
//! A [`SceneNode`] is one object in the retained-mode scene graph: a mesh,
//! light, camera or group, or a non-parentable resource such as a geometry
//! or material that gets attached to a slot on its parent.

use serde::{Deserialize, Serialize};
use trellis_math::{mat4, Mat4, Quat, Vec3};
use crate::error::CoreError;
use crate::graph::NodeKey;
use crate::id;
use crate::path;
use crate::value::Value;

/// Kind of light source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
    Hemisphere,
}

/// Camera projection parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// `fov` is the vertical field of view in degrees
    Perspective { fov: f32, aspect: f32, near: f32, far: f32 },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
        zoom: f32,
    },
}

/// Camera payload of a camera node
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    /// A manual camera is never resized by the store
    pub manual: bool,
}

impl Camera {
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective { fov, aspect, near, far },
            manual: false,
        }
    }

    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { left, right, top, bottom, near, far, zoom: 1.0 },
            manual: false,
        }
    }

    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }

    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    /// Projection matrix (view space to clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov, aspect, near, far } => {
                mat4::perspective(fov.to_radians(), aspect, near, far)
            }
            Projection::Orthographic { left, right, top, bottom, near, far, zoom } => {
                let zoom = if zoom > 0.0 { zoom } else { 1.0 };
                let cx = (left + right) * 0.5;
                let cy = (top + bottom) * 0.5;
                let hw = (right - left) * 0.5 / zoom;
                let hh = (top - bottom) * 0.5 / zoom;
                mat4::orthographic(cx - hw, cx + hw, cy - hh, cy + hh, near, far)
            }
        }
    }

    /// Fit the frustum to a canvas of the given CSS pixel size
    ///
    /// Perspective cameras take the new aspect ratio; orthographic cameras
    /// map one world unit to one pixel, centred on the origin.
    pub fn fit_to_size(&mut self, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        match &mut self.projection {
            Projection::Perspective { aspect, .. } => *aspect = width / height,
            Projection::Orthographic { left, right, top, bottom, .. } => {
                *left = -width / 2.0;
                *right = width / 2.0;
                *top = height / 2.0;
                *bottom = -height / 2.0;
            }
        }
    }

    fn param(&self, key: &str) -> Option<f32> {
        match (&self.projection, key) {
            (Projection::Perspective { fov, .. }, "fov") => Some(*fov),
            (Projection::Perspective { aspect, .. }, "aspect") => Some(*aspect),
            (Projection::Orthographic { zoom, .. }, "zoom") => Some(*zoom),
            (Projection::Orthographic { left, .. }, "left") => Some(*left),
            (Projection::Orthographic { right, .. }, "right") => Some(*right),
            (Projection::Orthographic { top, .. }, "top") => Some(*top),
            (Projection::Orthographic { bottom, .. }, "bottom") => Some(*bottom),
            (_, "near") => Some(self.near()),
            (_, "far") => Some(self.far()),
            _ => None,
        }
    }

    fn param_mut(&mut self, key: &str) -> Option<&mut f32> {
        match (&mut self.projection, key) {
            (Projection::Perspective { fov, .. }, "fov") => Some(fov),
            (Projection::Perspective { aspect, .. }, "aspect") => Some(aspect),
            (Projection::Perspective { near, .. }, "near") => Some(near),
            (Projection::Perspective { far, .. }, "far") => Some(far),
            (Projection::Orthographic { zoom, .. }, "zoom") => Some(zoom),
            (Projection::Orthographic { left, .. }, "left") => Some(left),
            (Projection::Orthographic { right, .. }, "right") => Some(right),
            (Projection::Orthographic { top, .. }, "top") => Some(top),
            (Projection::Orthographic { bottom, .. }, "bottom") => Some(bottom),
            (Projection::Orthographic { near, .. }, "near") => Some(near),
            (Projection::Orthographic { far, .. }, "far") => Some(far),
            _ => None,
        }
    }
}

/// Geometric bounds used for picking
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned box centred on the origin
    Box { size: Vec3 },
    Sphere { radius: f32 },
    /// Finite plane in the local XY plane, facing +Z
    Plane { width: f32, height: f32 },
}

/// What a node is
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Scene,
    Group,
    Mesh,
    Light(LightKind),
    Camera(Camera),
    Geometry,
    Material,
    /// Any other non-parentable resource, tagged with its type name
    Resource(String),
}

impl NodeKind {
    /// Objects can be parented in the scene graph; everything else attaches
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            NodeKind::Scene | NodeKind::Group | NodeKind::Mesh | NodeKind::Light(_) | NodeKind::Camera(_)
        )
    }

    /// Slot name a non-object attaches to by default
    pub fn default_attach(&self) -> Option<&'static str> {
        match self {
            NodeKind::Geometry => Some("geometry"),
            NodeKind::Material => Some("material"),
            _ => None,
        }
    }
}

/// A node in the scene graph
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub uuid: String,
    pub name: String,
    pub kind: NodeKind,
    pub position: Vec3,
    /// Euler angles (XYZ order, radians); writing it updates `quaternion`
    pub rotation: Vec3,
    pub quaternion: Quat,
    pub scale: Vec3,
    pub visible: bool,
    /// Layer bitmask tested against the raycaster's layers
    pub layers: u32,
    /// Dynamic properties (materials, colors, user data, attached slots)
    pub props: Value,
    pub shape: Option<Shape>,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub disposed: bool,
}

/// Property names that map onto node fields instead of `props`
const BUILTINS: &[&str] = &["name", "position", "rotation", "quaternion", "scale", "visible", "layers"];

impl SceneNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            uuid: id::make_id(),
            name: String::new(),
            kind,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
            scale: Vec3::ONE,
            visible: true,
            layers: 1,
            props: Value::Map(Default::default()),
            shape: None,
            parent: None,
            children: Vec::new(),
            disposed: false,
        }
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    pub fn mesh() -> Self {
        Self::new(NodeKind::Mesh)
    }

    pub fn geometry(shape: Shape) -> Self {
        Self::new(NodeKind::Geometry).with_shape(shape)
    }

    pub fn camera(camera: Camera) -> Self {
        Self::new(NodeKind::Camera(camera))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        // Writes into a fresh map cannot fail for plain keys
        let _ = path::set(&mut self.props, &path::split(key), value.into());
        self
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn is_object(&self) -> bool {
        self.kind.is_object()
    }

    pub fn camera_data(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn camera_data_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Local transform matrix
    pub fn local_matrix(&self) -> Mat4 {
        mat4::from_trs(self.position, self.quaternion, self.scale)
    }

    /// Read a node-local property (builtins or `props`)
    ///
    /// Does not follow node references; see `SceneGraph::get_prop`.
    pub fn get_local(&self, segments: &[&str]) -> Option<Value> {
        let (head, rest) = segments.split_first()?;
        if let Some(value) = self.builtin(head) {
            return match rest {
                [] => Some(value),
                [component] => path::component(&value, component).map(Value::Number),
                _ => None,
            };
        }
        path::get(&self.props, segments).cloned()
    }

    fn builtin(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::Text(self.name.clone())),
            "position" => Some(Value::Vec3(self.position)),
            "rotation" => Some(Value::Vec3(self.rotation)),
            "scale" => Some(Value::Vec3(self.scale)),
            "quaternion" => Some(Value::List(
                self.quaternion.to_array().iter().map(|c| Value::Number(*c as f64)).collect(),
            )),
            "visible" => Some(Value::Bool(self.visible)),
            "layers" => Some(Value::Number(self.layers as f64)),
            _ => self.camera_data().and_then(|c| c.param(key)).map(|v| Value::Number(v as f64)),
        }
    }

    fn is_builtin(&self, key: &str) -> bool {
        BUILTINS.contains(&key) || self.camera_data().is_some_and(|c| c.param(key).is_some())
    }

    /// Write a node-local property. Returns whether the node changed.
    pub(crate) fn set_local(&mut self, segments: &[&str], value: Value) -> Result<bool, CoreError> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(CoreError::InvalidPath {
                path: String::new(),
                reason: "empty property path".to_string(),
            });
        };
        if !self.is_builtin(head) {
            return path::set(&mut self.props, segments, value);
        }

        // Builtins are written through their `Value` form so nested
        // component paths ("position.x") reuse the shared path setter.
        let mut current = self.builtin(head).unwrap_or_default();
        if !path::set(&mut current, rest, value)? {
            return Ok(false);
        }
        self.write_builtin(segments, current)?;
        Ok(true)
    }

    fn write_builtin(&mut self, segments: &[&str], value: Value) -> Result<(), CoreError> {
        let bad = |expected: &str| CoreError::InvalidPath {
            path: segments.join("."),
            reason: format!("expected {}", expected),
        };
        match segments[0] {
            "name" => self.name = value.as_str().ok_or_else(|| bad("text"))?.to_string(),
            "position" => self.position = value.as_vec3().ok_or_else(|| bad("a vector"))?,
            "scale" => self.scale = value.as_vec3().ok_or_else(|| bad("a vector"))?,
            "rotation" => {
                let euler = value.as_vec3().ok_or_else(|| bad("a vector"))?;
                self.rotation = euler;
                self.quaternion = Quat::from_euler_xyz(euler.x, euler.y, euler.z);
            }
            "quaternion" => {
                let items = value.as_list().ok_or_else(|| bad("four numbers"))?;
                let parts: Option<Vec<f32>> = items.iter().map(Value::as_f32).collect();
                match parts.as_deref() {
                    Some([x, y, z, w]) => self.quaternion = Quat::new(*x, *y, *z, *w).normalize(),
                    _ => return Err(bad("four numbers")),
                }
            }
            "visible" => self.visible = value.as_bool().ok_or_else(|| bad("a boolean"))?,
            "layers" => self.layers = value.as_f64().ok_or_else(|| bad("a number"))? as u32,
            key => {
                let n = value.as_f32().ok_or_else(|| bad("a number"))?;
                let slot = self
                    .camera_data_mut()
                    .and_then(|c| c.param_mut(key))
                    .ok_or_else(|| bad("a camera parameter"))?;
                *slot = n;
            }
        }
        Ok(())
    }

    /// Remove a `props` entry. Builtins cannot be removed.
    pub(crate) fn remove_local(&mut self, segments: &[&str]) -> bool {
        match segments.first() {
            Some(head) if !self.is_builtin(head) => path::remove(&mut self.props, segments),
            _ => false,
        }
    }
}
