//! Element catalogue
//!
//! Maps element type names used in declarative trees (`"mesh"`,
//! `"boxGeometry"`, `"perspectiveCamera"`, ...) to node constructors that
//! take the element's `args` list.

use std::collections::HashMap;
use std::rc::Rc;
use crate::error::CoreError;
use crate::node::{Camera, LightKind, NodeKind, SceneNode, Shape};
use crate::value::{Color, Value};
use trellis_math::Vec3;

/// Builds a node from constructor arguments
pub type Constructor = Rc<dyn Fn(&[Value]) -> Result<SceneNode, CoreError>>;

/// Registry of constructible element types
#[derive(Clone)]
pub struct Catalogue {
    constructors: HashMap<String, Constructor>,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_arg(element: &str, reason: String) -> CoreError {
    CoreError::InvalidArgs {
        element: element.to_string(),
        reason,
    }
}

/// Numeric argument at `index`, or `default` when absent
fn number(element: &str, args: &[Value], index: usize, default: f32) -> Result<f32, CoreError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f32()
            .ok_or_else(|| bad_arg(element, format!("argument {} must be a number", index))),
    }
}

fn color(element: &str, args: &[Value], index: usize, default: Color) -> Result<Color, CoreError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_color()
            .ok_or_else(|| bad_arg(element, format!("argument {} must be a color", index))),
    }
}

fn positive(element: &str, name: &str, value: f32) -> Result<f32, CoreError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(bad_arg(element, format!("{} must be positive", name)))
    }
}

fn light(kind: LightKind, color: Color, intensity: f32) -> SceneNode {
    SceneNode::new(NodeKind::Light(kind))
        .with_prop("color", color)
        .with_prop("intensity", intensity)
}

/// Materials take an optional parameter map as their first argument
fn material(element: &str, args: &[Value], default_color: Option<Color>) -> Result<SceneNode, CoreError> {
    let mut node = SceneNode::new(NodeKind::Material).with_prop("type", element);
    if let Some(c) = default_color {
        node = node.with_prop("color", c);
    }
    match args.first() {
        None | Some(Value::Null) => {}
        Some(Value::Map(params)) => {
            for (key, value) in params {
                let value = match (key.as_str(), value.as_color()) {
                    ("color" | "emissive" | "specular", Some(c)) => Value::Color(c),
                    _ => value.clone(),
                };
                node = node.with_prop(key, value);
            }
        }
        Some(_) => return Err(bad_arg(element, "parameters must be a map".to_string())),
    }
    Ok(node)
}

impl Catalogue {
    /// Catalogue without any element types
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Catalogue with the built-in element types
    pub fn new() -> Self {
        let mut catalogue = Self::empty();

        catalogue.extend("scene", |_| Ok(SceneNode::new(NodeKind::Scene)));
        catalogue.extend("group", |_| Ok(SceneNode::group()));
        catalogue.extend("mesh", |args| {
            let mut node = SceneNode::mesh();
            if let Some(Value::Node(geometry)) = args.first() {
                node = node.with_prop("geometry", *geometry);
            }
            if let Some(Value::Node(material)) = args.get(1) {
                node = node.with_prop("material", *material);
            }
            Ok(node)
        });

        // Lights
        catalogue.extend("ambientLight", |args| {
            let e = "ambientLight";
            Ok(light(LightKind::Ambient, color(e, args, 0, Color::WHITE)?, number(e, args, 1, 1.0)?))
        });
        catalogue.extend("directionalLight", |args| {
            let e = "directionalLight";
            Ok(light(LightKind::Directional, color(e, args, 0, Color::WHITE)?, number(e, args, 1, 1.0)?))
        });
        catalogue.extend("pointLight", |args| {
            let e = "pointLight";
            Ok(light(LightKind::Point, color(e, args, 0, Color::WHITE)?, number(e, args, 1, 1.0)?)
                .with_prop("distance", number(e, args, 2, 0.0)?)
                .with_prop("decay", number(e, args, 3, 2.0)?))
        });
        catalogue.extend("spotLight", |args| {
            let e = "spotLight";
            Ok(light(LightKind::Spot, color(e, args, 0, Color::WHITE)?, number(e, args, 1, 1.0)?)
                .with_prop("distance", number(e, args, 2, 0.0)?)
                .with_prop("angle", number(e, args, 3, std::f32::consts::FRAC_PI_3)?)
                .with_prop("penumbra", number(e, args, 4, 0.0)?)
                .with_prop("decay", number(e, args, 5, 2.0)?))
        });
        catalogue.extend("hemisphereLight", |args| {
            let e = "hemisphereLight";
            Ok(light(LightKind::Hemisphere, color(e, args, 0, Color::WHITE)?, number(e, args, 2, 1.0)?)
                .with_prop("groundColor", color(e, args, 1, Color::WHITE)?))
        });

        // Cameras
        catalogue.extend("perspectiveCamera", |args| {
            let e = "perspectiveCamera";
            let near = positive(e, "near", number(e, args, 2, 0.1)?)?;
            let far = number(e, args, 3, 2000.0)?;
            if far <= near {
                return Err(bad_arg(e, "far must be greater than near".to_string()));
            }
            Ok(SceneNode::camera(Camera::perspective(
                number(e, args, 0, 50.0)?,
                number(e, args, 1, 1.0)?,
                near,
                far,
            )))
        });
        catalogue.extend("orthographicCamera", |args| {
            let e = "orthographicCamera";
            Ok(SceneNode::camera(Camera::orthographic(
                number(e, args, 0, -1.0)?,
                number(e, args, 1, 1.0)?,
                number(e, args, 2, 1.0)?,
                number(e, args, 3, -1.0)?,
                number(e, args, 4, 0.1)?,
                number(e, args, 5, 2000.0)?,
            )))
        });

        // Geometries
        catalogue.extend("boxGeometry", |args| {
            let e = "boxGeometry";
            let size = Vec3::new(
                positive(e, "width", number(e, args, 0, 1.0)?)?,
                positive(e, "height", number(e, args, 1, 1.0)?)?,
                positive(e, "depth", number(e, args, 2, 1.0)?)?,
            );
            Ok(SceneNode::geometry(Shape::Box { size }))
        });
        catalogue.extend("sphereGeometry", |args| {
            let e = "sphereGeometry";
            let radius = positive(e, "radius", number(e, args, 0, 1.0)?)?;
            Ok(SceneNode::geometry(Shape::Sphere { radius }))
        });
        catalogue.extend("planeGeometry", |args| {
            let e = "planeGeometry";
            Ok(SceneNode::geometry(Shape::Plane {
                width: positive(e, "width", number(e, args, 0, 1.0)?)?,
                height: positive(e, "height", number(e, args, 1, 1.0)?)?,
            }))
        });

        // Materials
        for name in ["meshBasicMaterial", "meshStandardMaterial", "meshPhongMaterial", "meshLambertMaterial", "lineBasicMaterial"] {
            catalogue.extend(name, move |args| material(name, args, Some(Color::WHITE)));
        }
        catalogue.extend("meshNormalMaterial", |args| material("meshNormalMaterial", args, None));

        // Scene resources
        catalogue.extend("color", |args| {
            let c = color("color", args, 0, Color::WHITE)?;
            Ok(SceneNode::new(NodeKind::Resource("color".into())).with_prop("value", c))
        });
        catalogue.extend("fog", |args| {
            let e = "fog";
            Ok(SceneNode::new(NodeKind::Resource("fog".into()))
                .with_prop("color", color(e, args, 0, Color::WHITE)?)
                .with_prop("near", number(e, args, 1, 1.0)?)
                .with_prop("far", number(e, args, 2, 1000.0)?))
        });

        catalogue
    }

    /// Register (or replace) an element type
    pub fn extend(
        &mut self,
        name: impl Into<String>,
        constructor: impl Fn(&[Value]) -> Result<SceneNode, CoreError> + 'static,
    ) {
        self.constructors.insert(name.into(), Rc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build a node of type `name`
    pub fn construct(&self, name: &str, args: &[Value]) -> Result<SceneNode, CoreError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| CoreError::UnknownElement(name.to_string()))?;
        let mut node = constructor(args)?;
        if node.name.is_empty() {
            node.name = name.to_string();
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Projection;

    #[test]
    fn test_unknown_element() {
        let catalogue = Catalogue::new();
        assert!(matches!(
            catalogue.construct("teapot", &[]),
            Err(CoreError::UnknownElement(name)) if name == "teapot"
        ));
    }

    #[test]
    fn test_box_geometry_args() {
        let catalogue = Catalogue::new();
        let node = catalogue
            .construct("boxGeometry", &[2.0.into(), 3.0.into(), 4.0.into()])
            .unwrap();
        assert_eq!(node.shape, Some(Shape::Box { size: Vec3::new(2.0, 3.0, 4.0) }));
        assert!(matches!(node.kind, NodeKind::Geometry));
    }

    #[test]
    fn test_geometry_rejects_bad_args() {
        let catalogue = Catalogue::new();
        assert!(matches!(
            catalogue.construct("sphereGeometry", &["big".into()]),
            Err(CoreError::InvalidArgs { .. })
        ));
        assert!(catalogue.construct("sphereGeometry", &[(-1.0).into()]).is_err());
    }

    #[test]
    fn test_camera_defaults() {
        let catalogue = Catalogue::new();
        let node = catalogue.construct("perspectiveCamera", &[]).unwrap();
        let camera = node.camera_data().unwrap();
        assert!(matches!(camera.projection, Projection::Perspective { fov, .. } if fov == 50.0));
        assert!(catalogue
            .construct("perspectiveCamera", &[75.0.into(), 1.0.into(), 10.0.into(), 1.0.into()])
            .is_err());
    }

    #[test]
    fn test_material_parameters() {
        let catalogue = Catalogue::new();
        let mut params = std::collections::BTreeMap::new();
        params.insert("color".to_string(), Value::from("#ff0000"));
        params.insert("roughness".to_string(), Value::from(0.25));
        let node = catalogue
            .construct("meshStandardMaterial", &[Value::Map(params)])
            .unwrap();
        assert_eq!(node.get_local(&["color"]), Some(Value::Color(Color::new(1.0, 0.0, 0.0))));
        assert_eq!(node.get_local(&["roughness"]), Some(Value::Number(0.25)));
    }

    #[test]
    fn test_extend() {
        let mut catalogue = Catalogue::new();
        catalogue.extend("torus", |_| Ok(SceneNode::new(NodeKind::Resource("torus".into()))));
        assert!(catalogue.contains("torus"));
        assert_eq!(catalogue.construct("torus", &[]).unwrap().name, "torus");
    }
}
