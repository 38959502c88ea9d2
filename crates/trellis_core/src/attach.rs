//! Attaching non-object children to slots on their parent

use std::fmt;
use std::rc::Rc;
use crate::error::CoreError;
use crate::graph::{NodeKey, SceneGraph};
use crate::value::Value;

/// Undo step returned by a custom attach function
pub type DetachFn = Box<dyn FnOnce(&mut SceneGraph)>;

/// Custom attach: `(graph, parent, child)` returning its own undo step
pub type AttachFn = Rc<dyn Fn(&mut SceneGraph, NodeKey, NodeKey) -> Result<DetachFn, CoreError>>;

/// How a declared child binds to its parent
#[derive(Clone, Default)]
pub enum Attach {
    /// Geometries go to `geometry`, materials to `material`, objects are parented
    #[default]
    Default,
    /// Store the child in the dotted property path on the parent
    Path(String),
    Function(AttachFn),
}

impl Attach {
    pub fn path(path: impl Into<String>) -> Self {
        Attach::Path(path.into())
    }

    pub fn function(
        f: impl Fn(&mut SceneGraph, NodeKey, NodeKey) -> Result<DetachFn, CoreError> + 'static,
    ) -> Self {
        Attach::Function(Rc::new(f))
    }
}

impl fmt::Debug for Attach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attach::Default => f.write_str("Default"),
            Attach::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Attach::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A live attachment, remembered so it can be undone
pub enum Attached {
    Path {
        parent: NodeKey,
        path: String,
        /// Slot value before the attach; restored on detach
        previous: Option<Value>,
    },
    Custom { parent: NodeKey, detach: DetachFn },
}

impl Attached {
    pub fn parent(&self) -> NodeKey {
        match self {
            Attached::Path { parent, .. } | Attached::Custom { parent, .. } => *parent,
        }
    }
}

impl fmt::Debug for Attached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attached::Path { parent, path, previous } => f
                .debug_struct("Path")
                .field("parent", parent)
                .field("path", path)
                .field("previous", previous)
                .finish(),
            Attached::Custom { parent, .. } => f.debug_struct("Custom").field("parent", parent).finish(),
        }
    }
}

/// Bind `child` into `path` on `parent`, remembering the previous value
pub fn attach_path(graph: &mut SceneGraph, parent: NodeKey, child: NodeKey, path: &str) -> Result<Attached, CoreError> {
    let previous = graph.get_prop(parent, path);
    graph.set_prop(parent, path, Value::Node(child))?;
    Ok(Attached::Path {
        parent,
        path: path.to_string(),
        previous,
    })
}

/// Undo an attachment
pub fn detach(graph: &mut SceneGraph, attached: Attached) -> Result<(), CoreError> {
    match attached {
        Attached::Path { parent, path, previous } => {
            if !graph.contains(parent) {
                return Ok(());
            }
            match previous {
                Some(value) => {
                    graph.set_prop(parent, &path, value)?;
                }
                None => {
                    graph.remove_prop(parent, &path);
                }
            }
            Ok(())
        }
        Attached::Custom { detach, .. } => {
            detach(graph);
            Ok(())
        }
    }
}
