//! Mounting, updating and unmounting a scene through the public API

use std::cell::RefCell;
use std::rc::Rc;
use trellis_core::{
    Element, EventKind, FrameHost, Frameloop, HeadlessRenderer, Props, Reconciler, RendererHandle,
    Root, RootConfig, SceneTemplate, Value, Vec3,
};

fn headless_root(frameloop: Frameloop) -> (Root, Rc<std::cell::Cell<u64>>) {
    let renderer = HeadlessRenderer::new();
    let frames = renderer.frame_counter();
    let config = RootConfig {
        frameloop,
        ..Default::default()
    };
    let root = Root::create(&config, RendererHandle::new(renderer)).unwrap();
    (root, frames)
}

fn reconciler_for(root: &Root) -> Reconciler {
    Reconciler::new(root.graph.clone(), root.registry.clone(), Rc::new(FrameHost::new()))
}

#[test]
fn test_template_mount_and_render_on_demand() {
    let (root, frames) = headless_root(Frameloop::Demand);
    let reconciler = reconciler_for(&root);
    let template = SceneTemplate::from_ron(
        r#"SceneTemplate(
            name: "demo",
            children: [
                ElementTemplate(
                    type: "group",
                    children: [
                        ElementTemplate(type: "mesh", children: [ElementTemplate(type: "boxGeometry")]),
                        ElementTemplate(type: "pointLight", props: { "intensity": Number(2.0) }),
                    ],
                ),
            ],
        )"#,
    )
    .unwrap();

    let mounted = template.mount(&reconciler, &root.store).unwrap();
    assert_eq!(mounted.len(), 1);
    assert_eq!(root.graph.borrow().get(mounted[0]).unwrap().children().len(), 2);

    // Mounting invalidated the root; one advance renders once and clears it
    assert!(root.store.needs_frame());
    root.store.advance(0.0, &mut root.graph.borrow_mut()).unwrap();
    assert_eq!(frames.get(), 1);
    assert!(!root.store.needs_frame());
}

#[test]
fn test_update_cycle_is_idempotent() {
    let (root, _) = headless_root(Frameloop::Demand);
    let reconciler = reconciler_for(&root);
    let scene = root.store.scene();
    let mesh = reconciler
        .mount(&root.store, &Element::new("mesh").prop("position", Vec3::new(0.0, 1.0, 0.0)), Some(scene))
        .unwrap();

    let mut props = Props::new();
    props.insert("position".into(), Value::Vec3(Vec3::new(0.0, 2.0, 0.0)));
    props.insert("userData.label".into(), "box".into());
    assert_eq!(reconciler.update(mesh, &props).unwrap(), 2);

    let writes = root.graph.borrow().stats().property_writes;
    assert_eq!(reconciler.update(mesh, &props).unwrap(), 0);
    assert_eq!(root.graph.borrow().stats().property_writes, writes);
}

#[test]
fn test_unmount_strips_interaction() {
    let (root, _) = headless_root(Frameloop::Always);
    let reconciler = reconciler_for(&root);
    let clicks = Rc::new(RefCell::new(0));
    let c = clicks.clone();
    let scene = root.store.scene();
    let mesh = reconciler
        .mount(
            &root.store,
            &Element::new("mesh").on(EventKind::Click, move |_| *c.borrow_mut() += 1),
            Some(scene),
        )
        .unwrap();
    assert_eq!(root.store.internal().interaction, vec![mesh]);

    reconciler.remove_child(scene, mesh).unwrap();
    assert!(root.store.internal().interaction.is_empty());
    assert!(root.graph.borrow().get(mesh).is_none());
    assert!(root.registry.borrow().get(mesh).is_none());
}
