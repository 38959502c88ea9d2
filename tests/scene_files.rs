//! Mounting the shipped scene files on a headless canvas

use std::rc::Rc;

use trellis::{Canvas, SceneFile};
use trellis_core::{HeadlessRenderer, NullPointerTarget, RendererHandle, RootConfig};
use trellis_physics::{ManualTransport, PhysicsBridge};

fn headless_canvas() -> (Canvas, ManualTransport) {
    let transport = ManualTransport::new(Default::default());
    let canvas = Canvas::new(
        &RootConfig::default(),
        RendererHandle::new(HeadlessRenderer::new()),
        Rc::new(NullPointerTarget),
    )
    .unwrap()
    .with_physics(PhysicsBridge::new(Box::new(transport.clone())));
    (canvas, transport)
}

#[test]
fn test_playground_mounts_with_bodies() {
    let file = SceneFile::load("scenes/playground.ron").unwrap();
    let (mut canvas, transport) = headless_canvas();

    canvas.mount_scene(&file).unwrap();
    assert_eq!(canvas.physics().unwrap().borrow().body_count(), file.bodies.len());
    for binding in &file.bodies {
        assert!(canvas.body(&binding.node).is_some(), "no body for {}", binding.node);
    }

    // The ball falls once the worker has run
    let ball = canvas.body("ball").unwrap();
    let start = canvas.root().graph.borrow().get(ball.node).unwrap().position.y;
    transport.step(0.1);
    assert!(canvas.sync_physics() > 0);
    let after = canvas.root().graph.borrow().get(ball.node).unwrap().position.y;
    assert!(after < start);
}

#[test]
fn test_playground_without_physics_still_mounts() {
    let file = SceneFile::load("scenes/playground.ron").unwrap();
    let mut canvas = Canvas::new(
        &RootConfig::default(),
        RendererHandle::new(HeadlessRenderer::new()),
        Rc::new(NullPointerTarget),
    )
    .unwrap();

    let nodes = canvas.mount_scene(&file).unwrap();
    assert_eq!(nodes.len(), file.scene.children.len());
    assert!(canvas.body("ball").is_none());
}
