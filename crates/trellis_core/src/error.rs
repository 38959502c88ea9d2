//! Error types for the scene core
//!
//! Configuration and reconciliation failures are reported through
//! [`CoreError`]; per-frame failures through [`FrameError`].

use std::fmt;

/// Error type for scene-graph, store and reconciler operations
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Invalid option combination detected when creating a root
    Config(String),
    /// Element type name not present in the catalogue
    UnknownElement(String),
    /// Constructor arguments could not be interpreted
    InvalidArgs { element: String, reason: String },
    /// Property path could not be resolved against its target
    InvalidPath { path: String, reason: String },
    /// The node key no longer refers to a live node
    StaleNode,
    /// Parenting would create a cycle or parent a non-object
    InvalidHierarchy(String),
    /// A camera reference could not be resolved
    Camera(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CoreError::UnknownElement(name) => write!(f, "Unknown element type: {}", name),
            CoreError::InvalidArgs { element, reason } => {
                write!(f, "Invalid arguments for {}: {}", element, reason)
            }
            CoreError::InvalidPath { path, reason } => {
                write!(f, "Invalid property path '{}': {}", path, reason)
            }
            CoreError::StaleNode => write!(f, "Node no longer exists"),
            CoreError::InvalidHierarchy(msg) => write!(f, "Invalid hierarchy: {}", msg),
            CoreError::Camera(msg) => write!(f, "Camera error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

/// Error produced by a renderer backend
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Surface was lost (window resized, minimized, etc.)
    SurfaceLost,
    /// GPU out of memory
    OutOfMemory,
    /// Other backend error
    Other(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::SurfaceLost => write!(f, "Surface lost"),
            RenderError::OutOfMemory => write!(f, "Out of memory"),
            RenderError::Other(msg) => write!(f, "Render error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// Failure while advancing a single root by one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    /// The renderer failed
    Render(RenderError),
    /// A frame callback reported an error
    Callback(String),
    /// `advance` was re-entered for a store that is already advancing
    Reentrant,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Render(e) => write!(f, "{}", e),
            FrameError::Callback(msg) => write!(f, "Frame callback failed: {}", msg),
            FrameError::Reentrant => write!(f, "Store is already advancing"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Render(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderError> for FrameError {
    fn from(e: RenderError) -> Self {
        FrameError::Render(e)
    }
}

impl From<String> for FrameError {
    fn from(msg: String) -> Self {
        FrameError::Callback(msg)
    }
}

impl From<&str> for FrameError {
    fn from(msg: &str) -> Self {
        FrameError::Callback(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::UnknownElement("teapot".to_string());
        assert!(format!("{}", err).contains("teapot"));

        let err = CoreError::InvalidPath {
            path: "material.color".to_string(),
            reason: "not traversable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("material.color"));
        assert!(msg.contains("not traversable"));
    }

    #[test]
    fn test_render_error_display() {
        assert_eq!(format!("{}", RenderError::SurfaceLost), "Surface lost");
        assert_eq!(format!("{}", RenderError::OutOfMemory), "Out of memory");
        assert_eq!(
            format!("{}", RenderError::Other("test".to_string())),
            "Render error: test"
        );
    }

    #[test]
    fn test_frame_error_source() {
        let err: FrameError = RenderError::SurfaceLost.into();
        assert!(err.source().is_some());

        let err: FrameError = "boom".into();
        assert!(err.source().is_none());
        assert!(format!("{}", err).contains("boom"));
    }
}
