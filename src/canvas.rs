//! Canvas
//!
//! A [`Canvas`] owns one [`Root`] together with the pieces that make it
//! usable from an application: the lifecycle host, the reconciler that
//! mounts elements into it, the pointer event manager and optionally a
//! physics bridge whose transforms are written back before each frame.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use trellis_core::{
    CoreError, Element, FrameError, FrameHost, HostAdapter, NativePointerEvent, NodeKey, PointerTarget, Reconciler,
    RendererHandle, Root, RootConfig, Shared, Size, TemplateError,
};
use trellis_input::EventManager;
use trellis_physics::{BodyHandle, BodyProps, PhysicsBridge, PhysicsError};
use trellis_render::{EffectId, Phase, RootId, Scheduler};

use crate::scene_file::SceneFile;

/// Errors raised while building or mounting a canvas
#[derive(Debug)]
pub enum CanvasError {
    Core(CoreError),
    Physics(PhysicsError),
    Template(TemplateError),
    /// A body was bound to an element name that is not in the scene
    UnknownNode(String),
    /// A body was requested on a canvas without physics
    PhysicsDisabled,
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasError::Core(e) => write!(f, "{}", e),
            CanvasError::Physics(e) => write!(f, "Physics error: {}", e),
            CanvasError::Template(e) => write!(f, "{}", e),
            CanvasError::UnknownNode(name) => write!(f, "No node named '{}' in the scene", name),
            CanvasError::PhysicsDisabled => write!(f, "Physics is disabled for this canvas"),
        }
    }
}

impl std::error::Error for CanvasError {}

impl From<CoreError> for CanvasError {
    fn from(e: CoreError) -> Self {
        CanvasError::Core(e)
    }
}

impl From<PhysicsError> for CanvasError {
    fn from(e: PhysicsError) -> Self {
        CanvasError::Physics(e)
    }
}

impl From<TemplateError> for CanvasError {
    fn from(e: TemplateError) -> Self {
        CanvasError::Template(e)
    }
}

/// One root plus its host, reconciler and event routing
pub struct Canvas {
    root: Root,
    host: Rc<FrameHost>,
    reconciler: Reconciler,
    events: EventManager,
    physics: Option<Shared<PhysicsBridge>>,
    mounted: Vec<NodeKey>,
    /// Bodies created from scene files, by element name
    named: HashMap<String, BodyHandle>,
    registration: Option<(RootId, Option<EffectId>)>,
}

impl Canvas {
    pub fn new(config: &RootConfig, renderer: RendererHandle, target: Rc<dyn PointerTarget>) -> Result<Self, CanvasError> {
        let root = Root::create(config, renderer)?;
        let host = Rc::new(FrameHost::new());
        let adapter: Rc<dyn HostAdapter> = host.clone();
        let reconciler = Reconciler::new(root.graph.clone(), root.registry.clone(), adapter.clone());
        let events = EventManager::new(&root, adapter, target);
        host.mount();

        Ok(Self {
            root,
            host,
            reconciler,
            events,
            physics: None,
            mounted: Vec::new(),
            named: HashMap::new(),
            registration: None,
        })
    }

    /// Drive bodies through `bridge`
    pub fn with_physics(mut self, bridge: PhysicsBridge) -> Self {
        self.physics = Some(Rc::new(RefCell::new(bridge)));
        self
    }

    // --- Accessors ---

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn host(&self) -> &Rc<FrameHost> {
        &self.host
    }

    pub fn physics(&self) -> Option<&Shared<PhysicsBridge>> {
        self.physics.as_ref()
    }

    /// Body bound to the element named `name` by a scene file
    pub fn body(&self, name: &str) -> Option<BodyHandle> {
        self.named.get(name).copied()
    }

    /// Top-level nodes mounted through this canvas
    pub fn mounted(&self) -> &[NodeKey] {
        &self.mounted
    }

    // --- Mounting ---

    /// Mount `element` under the scene
    pub fn render(&mut self, element: &Element) -> Result<NodeKey, CanvasError> {
        let scene = self.root.store.scene();
        let node = self.reconciler.mount(&self.root.store, element, Some(scene))?;
        self.mounted.push(node);
        Ok(node)
    }

    /// Mount a scene file and create the bodies it declares
    ///
    /// Every binding is resolved before any body is created, so an unknown
    /// name leaves the physics world untouched.
    pub fn mount_scene(&mut self, file: &SceneFile) -> Result<Vec<NodeKey>, CanvasError> {
        let nodes = file.scene.mount(&self.reconciler, &self.root.store)?;
        self.mounted.extend(nodes.iter().copied());

        let bindings = {
            let graph = self.root.graph.borrow();
            file.bodies
                .iter()
                .map(|binding| {
                    graph
                        .find_by_name(&binding.node)
                        .map(|node| (binding.node.clone(), node, binding.props.clone()))
                        .ok_or_else(|| CanvasError::UnknownNode(binding.node.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        if !bindings.is_empty() && self.physics.is_none() {
            log::warn!("Scene '{}' declares {} bodies but physics is disabled", file.scene.name, bindings.len());
            return Ok(nodes);
        }
        for (name, node, props) in bindings {
            let handle = self.add_body(node, props)?;
            self.named.insert(name, handle);
        }
        log::info!("Mounted scene '{}' ({} nodes, {} bodies)", file.scene.name, nodes.len(), file.bodies.len());
        Ok(nodes)
    }

    // --- Physics ---

    /// Create a body driving `node`
    ///
    /// The body is removed when the node is destroyed.
    pub fn add_body(&mut self, node: NodeKey, props: BodyProps) -> Result<BodyHandle, CanvasError> {
        let Some(bridge) = self.physics.clone() else {
            return Err(CanvasError::PhysicsDisabled);
        };
        let handle = bridge.borrow_mut().add_body(node, props)?;

        let id = handle.id;
        self.reconciler.on_destroy(node, move || match bridge.try_borrow_mut() {
            Ok(mut bridge) => {
                if let Err(e) = bridge.remove_body(id) {
                    log::warn!("Failed to remove body {}: {}", id, e);
                }
            }
            Err(_) => log::warn!("Physics bridge busy, body {} outlives its node", id),
        });
        Ok(handle)
    }

    /// Apply the newest worker transforms to the scene
    ///
    /// Returns the number of nodes moved; the root is invalidated if any did.
    pub fn sync_physics(&self) -> usize {
        let Some(bridge) = &self.physics else {
            return 0;
        };
        sync_bridge(bridge, &self.root)
    }

    // --- Input and size ---

    /// Route one native pointer event; returns the number of handlers run
    pub fn handle_pointer(&mut self, event: &NativePointerEvent) -> usize {
        self.events.handle(event)
    }

    /// Re-run hover tests against the last pointer position
    pub fn update_pointer(&mut self) -> usize {
        self.events.update()
    }

    /// Resize the drawing area (logical pixels)
    pub fn resize(&self, width: f32, height: f32) {
        let mut graph = self.root.graph.borrow_mut();
        self.root.store.set_size(&mut graph, Size::new(width, height));
    }

    pub fn set_dpr(&self, dpr: f32) {
        self.root.store.set_dpr(dpr);
    }

    // --- Frame loop ---

    /// Join the frame loop
    ///
    /// Physics transforms are synced before every tick.
    pub fn register(&mut self, scheduler: &mut Scheduler) -> RootId {
        let id = scheduler.register(&self.root, Some(self.host.clone()));
        let effect = self.physics.clone().map(|bridge| {
            let root = Root {
                store: self.root.store.clone(),
                graph: self.root.graph.clone(),
                registry: self.root.registry.clone(),
            };
            scheduler.add_effect(Phase::Before, move |_| {
                if bridge.try_borrow().is_err() {
                    return Err(FrameError::from("physics bridge already borrowed"));
                }
                sync_bridge(&bridge, &root);
                Ok(())
            })
        });
        self.registration = Some((id, effect));
        id
    }

    /// Tear everything down and leave the frame loop
    pub fn unmount(&mut self, scheduler: &mut Scheduler) {
        for node in std::mem::take(&mut self.mounted) {
            self.reconciler.destroy(node);
        }
        self.named.clear();
        self.host.unmount();
        self.root.unmount();
        if let Some((id, effect)) = self.registration.take() {
            if let Some(effect) = effect {
                scheduler.remove_effect(effect);
            }
            scheduler.unregister(id);
        }
        log::debug!("Canvas unmounted");
    }
}

fn sync_bridge(bridge: &Shared<PhysicsBridge>, root: &Root) -> usize {
    let applied = {
        let mut graph = root.graph.borrow_mut();
        bridge.borrow_mut().sync(&mut graph)
    };
    if applied > 0 {
        root.store.invalidate();
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Frameloop, HeadlessRenderer, NullPointerTarget, Vec3};
    use trellis_physics::ManualTransport;

    const STEP: f32 = 1.0 / 60.0;

    fn canvas() -> Canvas {
        Canvas::new(
            &RootConfig::default(),
            RendererHandle::new(HeadlessRenderer::new()),
            Rc::new(NullPointerTarget),
        )
        .unwrap()
    }

    fn physics_canvas() -> (Canvas, ManualTransport) {
        let transport = ManualTransport::new(Default::default());
        let canvas = canvas().with_physics(PhysicsBridge::new(Box::new(transport.clone())));
        (canvas, transport)
    }

    #[test]
    fn test_render_mounts_under_scene() {
        let mut canvas = canvas();
        let node = canvas.render(&Element::new("mesh").prop("name", "box")).unwrap();
        let graph = canvas.root().graph.borrow();
        assert_eq!(graph.find_by_name("box"), Some(node));
        assert_eq!(graph.parent_of(node), Some(canvas.root().store.scene()));
        assert_eq!(canvas.mounted(), &[node]);
    }

    #[test]
    fn test_unknown_element_is_an_error() {
        let mut canvas = canvas();
        assert!(matches!(
            canvas.render(&Element::new("teapotGeometry")),
            Err(CanvasError::Core(CoreError::UnknownElement(_)))
        ));
    }

    #[test]
    fn test_synced_body_moves_node() {
        let (mut canvas, transport) = physics_canvas();
        let node = canvas.render(&Element::new("mesh")).unwrap();
        canvas
            .add_body(node, BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 10.0, 0.0)))
            .unwrap();

        transport.step(STEP * 10.0);
        assert_eq!(canvas.sync_physics(), 1);
        let y = canvas.root().graph.borrow().get(node).unwrap().position.y;
        assert!(y < 10.0);
    }

    #[test]
    fn test_destroying_node_removes_body() {
        let (mut canvas, _transport) = physics_canvas();
        let node = canvas.render(&Element::new("mesh")).unwrap();
        let handle = canvas.add_body(node, BodyProps::sphere(0.5)).unwrap();
        let bridge = canvas.physics().unwrap().clone();
        assert!(bridge.borrow().contains_body(handle.id));

        canvas.reconciler().destroy(node);
        assert!(!bridge.borrow().contains_body(handle.id));
    }

    #[test]
    fn test_body_without_physics_is_rejected() {
        let mut canvas = canvas();
        let node = canvas.render(&Element::new("mesh")).unwrap();
        assert!(matches!(canvas.add_body(node, BodyProps::sphere(0.5)), Err(CanvasError::PhysicsDisabled)));
    }

    #[test]
    fn test_mount_scene_binds_bodies() {
        let (mut canvas, _transport) = physics_canvas();
        let file = SceneFile::from_ron(
            r#"SceneFile(
                scene: SceneTemplate(
                    name: "drop",
                    children: [
                        ElementTemplate(type: "mesh", props: { "name": Text("ball") }),
                        ElementTemplate(type: "mesh", props: { "name": Text("floor") }),
                    ],
                ),
                bodies: [
                    BodyBinding(node: "ball", props: (shape: Sphere(radius: 0.5))),
                    BodyBinding(node: "floor", props: (shape: Plane, body_type: Static, mass: 0.0)),
                ],
            )"#,
        )
        .unwrap();

        let nodes = canvas.mount_scene(&file).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(canvas.physics().unwrap().borrow().body_count(), 2);
        let ball = canvas.body("ball").unwrap();
        assert_eq!(canvas.root().graph.borrow().find_by_name("ball"), Some(ball.node));
        assert!(canvas.body("ghost").is_none());
    }

    #[test]
    fn test_mount_scene_rejects_unknown_binding() {
        let (mut canvas, transport) = physics_canvas();
        let file = SceneFile::from_ron(
            r#"SceneFile(
                scene: SceneTemplate(name: "empty"),
                bodies: [BodyBinding(node: "ghost", props: (shape: Sphere(radius: 1.0)))],
            )"#,
        )
        .unwrap();

        assert!(matches!(canvas.mount_scene(&file), Err(CanvasError::UnknownNode(name)) if name == "ghost"));
        assert_eq!(transport.sent(), 0);
    }

    #[test]
    fn test_registered_canvas_syncs_before_render() {
        let (mut canvas, transport) = physics_canvas();
        let node = canvas.render(&Element::new("mesh")).unwrap();
        canvas
            .add_body(node, BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 10.0, 0.0)))
            .unwrap();

        let mut scheduler = Scheduler::new();
        canvas.register(&mut scheduler);
        transport.step(STEP * 10.0);
        scheduler.tick(0.0);
        assert!(canvas.root().graph.borrow().get(node).unwrap().position.y < 10.0);

        canvas.unmount(&mut scheduler);
        assert_eq!(scheduler.root_count(), 0);
        assert_eq!(canvas.physics().unwrap().borrow().body_count(), 0);
    }

    #[test]
    fn test_demand_canvas_renders_physics_steps() {
        let renderer = HeadlessRenderer::new();
        let frames = renderer.frame_counter();
        let config = RootConfig {
            frameloop: Frameloop::Demand,
            ..Default::default()
        };
        let transport = ManualTransport::new(Default::default());
        let mut canvas = Canvas::new(&config, RendererHandle::new(renderer), Rc::new(NullPointerTarget))
            .unwrap()
            .with_physics(PhysicsBridge::new(Box::new(transport.clone())));
        let node = canvas.render(&Element::new("mesh")).unwrap();
        canvas
            .add_body(node, BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 10.0, 0.0)))
            .unwrap();

        let mut scheduler = Scheduler::new();
        canvas.register(&mut scheduler);
        while scheduler.tick(0.0) {}
        let base = frames.get();

        transport.step(STEP * 10.0);
        scheduler.tick(16.0);
        assert_eq!(frames.get(), base + 1);
        assert!(canvas.root().graph.borrow().get(node).unwrap().position.y < 10.0);
    }

    #[test]
    fn test_resize_updates_store() {
        let canvas = canvas();
        canvas.resize(800.0, 600.0);
        let size = canvas.root().store.size();
        assert_eq!((size.width, size.height), (800.0, 600.0));
    }
}
