//! Declarative scene files
//!
//! A [`SceneTemplate`] is a serializable element tree. Templates are loaded
//! from RON files and mounted through the same reconciler as hand-built
//! [`Element`] trees.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::attach::Attach;
use crate::error::CoreError;
use crate::graph::NodeKey;
use crate::reconciler::{Element, Reconciler};
use crate::store::{Frameloop, Store};
use crate::value::{Props, Value};

/// Serializable description of one element and its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTemplate {
    /// Catalogue type name
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub props: Props,
    /// Dotted slot on the parent to attach to
    #[serde(default)]
    pub attach: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementTemplate>,
}

impl ElementTemplate {
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            args: Vec::new(),
            props: Props::new(),
            attach: None,
            children: Vec::new(),
        }
    }

    pub fn with_prop(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(path.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ElementTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Convert into an [`Element`] tree (without handlers)
    pub fn to_element(&self) -> Element {
        let mut element = Element::new(self.element_type.clone()).args(self.args.clone());
        element.props = self.props.clone();
        if let Some(path) = &self.attach {
            element = element.attach(Attach::path(path.clone()));
        }
        element.children(self.children.iter().map(ElementTemplate::to_element))
    }
}

/// A loadable/saveable scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTemplate {
    /// Scene name (for display/debugging)
    pub name: String,
    /// Overrides the root's frameloop when set
    #[serde(default)]
    pub frameloop: Option<Frameloop>,
    #[serde(default)]
    pub children: Vec<ElementTemplate>,
}

impl SceneTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frameloop: None,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ElementTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Load a scene from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    pub fn from_ron(text: &str) -> Result<Self, TemplateError> {
        Ok(ron::from_str(text)?)
    }

    /// Save a scene to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TemplateError> {
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn to_ron(&self) -> Result<String, TemplateError> {
        let pretty = ron::ser::PrettyConfig::new()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Mount every top-level element into the store's scene
    pub fn mount(&self, reconciler: &Reconciler, store: &Store) -> Result<Vec<NodeKey>, CoreError> {
        if let Some(frameloop) = self.frameloop {
            store.set_frameloop(frameloop);
        }
        let scene = store.scene();
        let mut mounted = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match reconciler.mount(store, &child.to_element(), Some(scene)) {
                Ok(key) => mounted.push(key),
                Err(e) => {
                    for key in mounted {
                        reconciler.destroy(key);
                    }
                    return Err(e);
                }
            }
        }
        log::info!("Mounted scene '{}' ({} top-level elements)", self.name, mounted.len());
        Ok(mounted)
    }
}

/// Error loading or saving a scene template
#[derive(Debug)]
pub enum TemplateError {
    /// IO error (file not found, permission denied, etc.)
    Io(io::Error),
    /// Parse error (invalid RON syntax)
    Parse(ron::error::SpannedError),
    /// Serialization error
    Serialize(ron::Error),
}

impl From<io::Error> for TemplateError {
    fn from(e: io::Error) -> Self {
        TemplateError::Io(e)
    }
}

impl From<ron::error::SpannedError> for TemplateError {
    fn from(e: ron::error::SpannedError) -> Self {
        TemplateError::Parse(e)
    }
}

impl From<ron::Error> for TemplateError {
    fn from(e: ron::Error) -> Self {
        TemplateError::Serialize(e)
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::Io(e) => write!(f, "IO error: {}", e),
            TemplateError::Parse(e) => write!(f, "Parse error: {}", e),
            TemplateError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for TemplateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ElementType;

    const SCENE: &str = r#"
SceneTemplate(
    name: "test",
    frameloop: Some(demand),
    children: [
        ElementTemplate(
            type: "mesh",
            props: { "position": Vec3((x: 0.0, y: 1.0, z: 0.0)) },
            children: [
                ElementTemplate(type: "sphereGeometry", args: [Number(0.5)]),
                ElementTemplate(type: "meshBasicMaterial", attach: Some("material")),
            ],
        ),
    ],
)
"#;

    #[test]
    fn test_parse_scene() {
        let scene = SceneTemplate::from_ron(SCENE).unwrap();
        assert_eq!(scene.name, "test");
        assert_eq!(scene.frameloop, Some(Frameloop::Demand));
        let mesh = &scene.children[0];
        assert_eq!(mesh.element_type, "mesh");
        assert_eq!(mesh.children.len(), 2);
        assert_eq!(mesh.children[0].args, vec![Value::Number(0.5)]);
    }

    #[test]
    fn test_to_element_keeps_structure() {
        let scene = SceneTemplate::from_ron(SCENE).unwrap();
        let element = scene.children[0].to_element();
        assert_eq!(element.ty, ElementType::Named("mesh".into()));
        assert_eq!(element.children.len(), 2);
        assert!(matches!(&element.children[1].attach, Some(Attach::Path(p)) if p == "material"));
    }

    #[test]
    fn test_ron_roundtrip() {
        let scene = SceneTemplate::new("roundtrip")
            .with_child(ElementTemplate::new("group").with_child(ElementTemplate::new("mesh").with_prop("visible", false)));
        let text = scene.to_ron().unwrap();
        assert_eq!(SceneTemplate::from_ron(&text).unwrap(), scene);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(SceneTemplate::from_ron("not ron"), Err(TemplateError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            SceneTemplate::load("/nonexistent/scene.ron"),
            Err(TemplateError::Io(_))
        ));
    }
}
