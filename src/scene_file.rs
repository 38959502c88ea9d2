//! Scene files
//!
//! A scene file is a [`SceneTemplate`] plus the rigid bodies that drive
//! some of its elements. Bodies find their element by the `name` prop.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use trellis_core::{SceneTemplate, TemplateError};
use trellis_physics::BodyProps;

/// A rigid body bound to a named element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyBinding {
    /// Value of the element's `name` prop
    pub node: String,
    #[serde(default)]
    pub props: BodyProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub scene: SceneTemplate,
    #[serde(default)]
    pub bodies: Vec<BodyBinding>,
}

impl SceneFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    pub fn from_ron(text: &str) -> Result<Self, TemplateError> {
        Ok(ron::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_physics::{BodyShape, BodyType};

    #[test]
    fn test_parse_scene_with_bodies() {
        let file = SceneFile::from_ron(
            r#"SceneFile(
                scene: SceneTemplate(
                    name: "drop",
                    children: [
                        ElementTemplate(type: "mesh", props: { "name": Text("ball") }),
                    ],
                ),
                bodies: [
                    BodyBinding(node: "ball", props: (shape: Sphere(radius: 0.5))),
                    BodyBinding(node: "floor", props: (shape: Plane, body_type: Static, mass: 0.0)),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(file.scene.name, "drop");
        assert_eq!(file.bodies.len(), 2);
        assert_eq!(file.bodies[0].props.shape, BodyShape::Sphere { radius: 0.5 });
        assert_eq!(file.bodies[1].props.body_type, BodyType::Static);
    }

    #[test]
    fn test_bodies_are_optional() {
        let file = SceneFile::from_ron(r#"SceneFile(scene: SceneTemplate(name: "empty"))"#).unwrap();
        assert!(file.bodies.is_empty());
    }

    #[test]
    fn test_bad_ron_is_a_parse_error() {
        assert!(matches!(SceneFile::from_ron("SceneFile("), Err(TemplateError::Parse(_))));
    }
}
