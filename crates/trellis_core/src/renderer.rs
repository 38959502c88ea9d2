//! Renderer abstraction
//!
//! The store holds a [`RendererHandle`]; the scheduler renders through it
//! without knowing the backend. GPU backends live in `trellis_render`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use crate::error::RenderError;
use crate::graph::{NodeKey, SceneGraph};

/// A backend that draws a scene from a camera
pub trait Renderer {
    fn render(&mut self, graph: &SceneGraph, scene: NodeKey, camera: NodeKey) -> Result<(), RenderError>;

    /// Resize the drawing buffer (physical pixels)
    fn set_size(&mut self, _width: u32, _height: u32) {}

    fn set_pixel_ratio(&mut self, _dpr: f32) {}

    /// Release backend resources
    fn dispose(&mut self) {}
}

/// Shared, identity-compared handle to a renderer
#[derive(Clone)]
pub struct RendererHandle(Rc<RefCell<dyn Renderer>>);

impl RendererHandle {
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self(Rc::new(RefCell::new(renderer)))
    }

    pub fn render(&self, graph: &SceneGraph, scene: NodeKey, camera: NodeKey) -> Result<(), RenderError> {
        self.0.borrow_mut().render(graph, scene, camera)
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.0.borrow_mut().set_size(width, height);
    }

    pub fn set_pixel_ratio(&self, dpr: f32) {
        self.0.borrow_mut().set_pixel_ratio(dpr);
    }

    pub fn dispose(&self) {
        self.0.borrow_mut().dispose();
    }

    fn addr(&self) -> *const u8 {
        Rc::as_ptr(&self.0) as *const u8
    }
}

impl PartialEq for RendererHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RendererHandle({:p})", self.addr())
    }
}

/// Renderer without output; counts frames
///
/// Used for headless roots and in tests.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: Rc<Cell<u64>>,
    fail_with: Option<RenderError>,
    pub size: (u32, u32),
    pub pixel_ratio: f32,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose every render fails with `error`
    pub fn failing(error: RenderError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    /// Shared frame counter, readable after the renderer is moved into a handle
    pub fn frame_counter(&self) -> Rc<Cell<u64>> {
        self.frames.clone()
    }
}

impl Renderer for HeadlessRenderer {
    fn render(&mut self, graph: &SceneGraph, scene: NodeKey, camera: NodeKey) -> Result<(), RenderError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        if !graph.contains(scene) || !graph.contains(camera) {
            return Err(RenderError::Other("scene or camera node missing".to_string()));
        }
        self.frames.set(self.frames.get() + 1);
        Ok(())
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn set_pixel_ratio(&mut self, dpr: f32) {
        self.pixel_ratio = dpr;
    }
}
