//! Root creation
//!
//! A [`Root`] is one mount: a scene graph, its instance registry and the
//! store describing how it is rendered and picked.

use std::cell::RefCell;
use std::rc::Rc;
use trellis_math::Vec3;
use crate::error::CoreError;
use crate::graph::SceneGraph;
use crate::node::{Camera, NodeKind, SceneNode};
use crate::reconciler::Shared;
use crate::registry::InstanceRegistry;
use crate::renderer::RendererHandle;
use crate::store::{DprRange, EventSettings, Frameloop, Size, Store, StoreState};

/// Default camera settings
#[derive(Clone, Debug, PartialEq)]
pub struct CameraOptions {
    /// `"perspective"` or `"orthographic"`
    pub kind: String,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub position: Vec3,
    /// Keep the camera's frustum when the canvas resizes
    pub manual: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            kind: "perspective".to_string(),
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            zoom: 1.0,
            position: Vec3::new(0.0, 0.0, 5.0),
            manual: false,
        }
    }
}

/// Options for creating a root
#[derive(Clone, Debug, Default)]
pub struct RootConfig {
    pub frameloop: Frameloop,
    pub dpr: f32,
    pub dpr_range: DprRange,
    pub size: Size,
    pub camera: CameraOptions,
    pub events: EventSettings,
    pub flat: bool,
    pub legacy: bool,
}

impl RootConfig {
    /// Reject option combinations that cannot produce a working root
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.dpr_range.min <= 0.0 || self.dpr_range.min > self.dpr_range.max {
            return Err(CoreError::Config(format!(
                "invalid dpr range [{}, {}]",
                self.dpr_range.min, self.dpr_range.max
            )));
        }
        if !matches!(self.camera.kind.as_str(), "perspective" | "orthographic") {
            return Err(CoreError::Config(format!("unknown camera type '{}'", self.camera.kind)));
        }
        if self.camera.near <= 0.0 && self.camera.kind == "perspective" {
            return Err(CoreError::Config("perspective camera near plane must be positive".to_string()));
        }
        if self.camera.far <= self.camera.near {
            return Err(CoreError::Config("camera far plane must be beyond the near plane".to_string()));
        }
        if self.events.click_threshold < 0.0 {
            return Err(CoreError::Config("click threshold cannot be negative".to_string()));
        }
        Ok(())
    }

    fn build_camera(&self) -> Camera {
        let opts = &self.camera;
        let mut camera = if opts.kind == "orthographic" {
            let mut camera = Camera::orthographic(-1.0, 1.0, 1.0, -1.0, opts.near, opts.far);
            if let crate::node::Projection::Orthographic { zoom, .. } = &mut camera.projection {
                *zoom = opts.zoom;
            }
            camera
        } else {
            Camera::perspective(opts.fov, 1.0, opts.near, opts.far)
        };
        camera.manual = opts.manual;
        camera
    }
}

/// One mounted scene
pub struct Root {
    pub store: Store,
    pub graph: Shared<SceneGraph>,
    pub registry: Shared<InstanceRegistry>,
}

impl Root {
    /// Create a root with a fresh scene and default camera
    ///
    /// Configuration errors are reported here rather than on first frame.
    pub fn create(config: &RootConfig, renderer: RendererHandle) -> Result<Self, CoreError> {
        config.validate()?;

        let mut graph = SceneGraph::new();
        let scene = graph.insert(SceneNode::new(NodeKind::Scene).with_name("scene"));
        let camera = graph.insert(
            SceneNode::camera(config.build_camera())
                .with_name("camera")
                .with_position(config.camera.position),
        );

        let mut state = StoreState::new(renderer, scene, camera);
        state.frameloop = config.frameloop;
        state.dpr_range = config.dpr_range;
        state.events = config.events;
        state.flat = config.flat;
        state.legacy = config.legacy;
        let store = Store::new(state);

        let dpr = if config.dpr > 0.0 { config.dpr } else { config.dpr_range.min };
        store.set_dpr(dpr);
        if config.size.width > 0.0 && config.size.height > 0.0 {
            store.set_size(&mut graph, config.size);
        }

        log::debug!(
            "Created root ({} camera, frameloop {:?})",
            config.camera.kind,
            config.frameloop
        );
        Ok(Self {
            store,
            graph: Rc::new(RefCell::new(graph)),
            registry: Rc::new(RefCell::new(InstanceRegistry::new())),
        })
    }

    /// Stop participating in the frame loop and release the renderer
    pub fn unmount(&self) {
        self.store.set_active(false);
        self.store.set_waker(None);
        self.store.internal_mut().frames = 0;
        self.store.renderer().dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::HeadlessRenderer;

    fn renderer() -> RendererHandle {
        RendererHandle::new(HeadlessRenderer::new())
    }

    #[test]
    fn test_create_default_root() {
        let root = Root::create(&RootConfig::default(), renderer()).unwrap();
        let graph = root.graph.borrow();
        let camera = graph.get(root.store.camera()).unwrap();
        assert!(camera.camera_data().is_some());
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert!(matches!(graph.get(root.store.scene()).unwrap().kind, NodeKind::Scene));
        assert_eq!(root.store.state().dpr, 1.0);
    }

    #[test]
    fn test_unknown_camera_type_fails_fast() {
        let mut config = RootConfig::default();
        config.camera.kind = "fisheye".to_string();
        assert!(matches!(Root::create(&config, renderer()), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_invalid_dpr_range_fails_fast() {
        let mut config = RootConfig::default();
        config.dpr_range = DprRange { min: 2.0, max: 1.0 };
        assert!(Root::create(&config, renderer()).is_err());
    }

    #[test]
    fn test_orthographic_root_fits_size() {
        let mut config = RootConfig::default();
        config.camera.kind = "orthographic".to_string();
        config.camera.zoom = 50.0;
        config.size = Size::new(800.0, 600.0);
        let root = Root::create(&config, renderer()).unwrap();
        let graph = root.graph.borrow();
        let camera = graph.get(root.store.camera()).unwrap().camera_data().unwrap();
        assert!(matches!(
            camera.projection,
            crate::node::Projection::Orthographic { right, zoom, .. } if right == 400.0 && zoom == 50.0
        ));
    }

    #[test]
    fn test_unmount_deactivates() {
        let root = Root::create(&RootConfig::default(), renderer()).unwrap();
        root.unmount();
        assert!(!root.store.is_active());
        root.store.invalidate();
        assert_eq!(root.store.internal().frames, 0);
    }
}
