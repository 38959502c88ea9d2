//! Pointer event manager
//!
//! Every native pointer event is raycast against the interactive objects of
//! a root and its portals, then dispatched:
//!
//! - Hits are deduplicated per geometry element and sorted by event-layer
//!   priority, then distance
//! - Each hit bubbles up the parent chain to every ancestor with handlers;
//!   an ancestor receives the event once, after all of its hit descendants
//! - Objects holding pointer capture always take part, even off-target
//! - Pointer moves drive hover over/enter/out/leave transitions
//! - Clicks only reach objects hit on pointer down, are dropped after a drag,
//!   and notify the other interactive objects through their missed handler.
//!   A drag is measured as the straight-line distance between the pointer
//!   down and click positions, so a pointer that wanders off and returns
//!   still clicks
//!
//! Handlers run with no borrow of the graph, registry or store held, so they
//! are free to mutate the scene.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use trellis_core::{
    CaptureRecord, EventKind, EventRequest, Handlers, HitKey, HostAdapter, InstanceRegistry, Intersection,
    NativePointerEvent, NodeKey, PointerTarget, Raycaster, Root, SceneGraph, Shared, Store, ThreeEvent,
};
use trellis_math::{Vec2, Vec3};

/// Handlers that make an object a candidate for pointer moves
const MOVE_KINDS: [EventKind; 5] = [
    EventKind::PointerMove,
    EventKind::PointerOver,
    EventKind::PointerEnter,
    EventKind::PointerOut,
    EventKind::PointerLeave,
];

const HOVER_KINDS: [EventKind; 4] = [
    EventKind::PointerOver,
    EventKind::PointerEnter,
    EventKind::PointerOut,
    EventKind::PointerLeave,
];

/// Picking state of one event layer (a root or portal store) for one event
#[derive(Clone)]
struct Layer {
    store: Store,
    priority: i32,
    pointer: Vec2,
    raycaster: Raycaster,
    camera: NodeKey,
    unprojected: Vec3,
}

impl Layer {
    /// Cast the layer's ray through the event position
    ///
    /// `None` when the layer is disabled, has no size yet, or its camera
    /// cannot produce a ray.
    fn compute(store: &Store, graph: &SceneGraph, native: &NativePointerEvent) -> Option<Layer> {
        let (events, size, camera, mut raycaster) = {
            let state = store.state();
            (state.events, state.size, state.camera, state.raycaster.clone())
        };
        if !events.enabled || !raycaster.enabled || size.width <= 0.0 || size.height <= 0.0 {
            return None;
        }

        let coords = native.coords(events.prefix);
        let pointer = Vec2::new(
            (coords.x / size.width) * 2.0 - 1.0,
            -(coords.y / size.height) * 2.0 + 1.0,
        );
        if let Err(e) = raycaster.set_from_camera(graph, pointer, camera) {
            log::debug!("Skipping event layer: {}", e);
            return None;
        }
        let unprojected = Raycaster::unproject(graph, pointer, camera).unwrap_or(raycaster.ray.origin);

        Some(Layer {
            store: store.clone(),
            priority: events.priority,
            pointer,
            raycaster,
            camera,
            unprojected,
        })
    }

    /// The layer as of its last computed pointer
    fn from_state(store: &Store) -> Layer {
        let state = store.state();
        Layer {
            store: store.clone(),
            priority: state.events.priority,
            pointer: state.pointer,
            raycaster: state.raycaster.clone(),
            camera: state.camera,
            unprojected: state.raycaster.ray.origin,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn event<'a>(
        &self,
        kind: EventKind,
        hit: Intersection,
        intersections: &'a [Intersection],
        native: &'a NativePointerEvent,
        delta: f32,
        stopped: bool,
        captured: bool,
    ) -> ThreeEvent<'a> {
        ThreeEvent::new(
            kind,
            hit,
            intersections,
            native,
            self.pointer,
            delta,
            self.raycaster.ray,
            self.unprojected,
            Some(self.camera),
            stopped,
            captured,
        )
    }
}

/// Routes native pointer events of one root to scene objects
pub struct EventManager {
    store: Store,
    graph: Shared<SceneGraph>,
    registry: Shared<InstanceRegistry>,
    host: Rc<dyn HostAdapter>,
    target: Rc<dyn PointerTarget>,
    /// Layers computed for the event being handled
    layers: Vec<Layer>,
    /// Hovered entries whose handler stopped propagation
    stopped_hovers: HashSet<HitKey>,
}

impl EventManager {
    pub fn new(root: &Root, host: Rc<dyn HostAdapter>, target: Rc<dyn PointerTarget>) -> Self {
        Self {
            store: root.store.clone(),
            graph: root.graph.clone(),
            registry: root.registry.clone(),
            host,
            target,
            layers: Vec::new(),
            stopped_hovers: HashSet::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Handle one native event, returning the number of handlers invoked
    pub fn handle(&mut self, native: &NativePointerEvent) -> usize {
        if !self.store.events().enabled {
            return 0;
        }
        self.store.internal_mut().last_event = Some(native.clone());

        let kind = native.kind;
        match kind {
            EventKind::PointerLeave | EventKind::PointerCancel => return self.cancel_hover(&[], native),
            EventKind::LostPointerCapture => {
                self.schedule_capture_loss(native);
                return 0;
            }
            // Synthesized per object, never received from the platform
            EventKind::PointerOver | EventKind::PointerOut | EventKind::PointerEnter => return 0,
            _ => {}
        }

        let is_move = kind == EventKind::PointerMove;
        let is_click = kind.is_click();
        let hits = self.intersect(native, is_move);

        let events = self.store.events();
        let position = native.coords(events.prefix);
        // Straight-line distance from pointer down, not path length
        let delta = if is_click {
            self.store.internal().initial_click.distance(position)
        } else {
            0.0
        };

        if kind == EventKind::PointerDown {
            let mut initial_hits: Vec<NodeKey> = Vec::new();
            for hit in &hits {
                if !initial_hits.contains(&hit.event_object) {
                    initial_hits.push(hit.event_object);
                }
            }
            let mut internal = self.store.internal_mut();
            internal.initial_click = position;
            internal.initial_hits = initial_hits;
        }

        if is_click && delta > events.click_threshold {
            log::trace!("{} dropped after {:.1}px drag", kind.name(), delta);
            return 0;
        }

        if is_click && hits.is_empty() {
            let interaction = self.store.internal().interaction.clone();
            let mut delivered = self.notify_missed(&interaction, native);
            let on_missed = self.store.internal().on_pointer_missed.clone();
            if let Some(handler) = on_missed {
                handler(native);
                delivered += 1;
            }
            return delivered;
        }

        let mut delivered = 0;
        if is_move {
            delivered += self.cancel_hover(&hits, native);
        }
        delivered + self.dispatch(kind, &hits, native, delta)
    }

    /// Replay the last event as a pointer move
    ///
    /// Hover state follows objects and cameras that moved under a still
    /// pointer.
    pub fn update(&mut self) -> usize {
        let last = self.store.internal().last_event.clone();
        match last {
            Some(mut event) => {
                event.kind = EventKind::PointerMove;
                self.handle(&event)
            }
            None => 0,
        }
    }

    // --- Picking ---

    fn intersect(&mut self, native: &NativePointerEvent, move_only: bool) -> Vec<Intersection> {
        self.layers.clear();
        let interaction = self.store.internal().interaction.clone();

        let mut intersections = {
            let (Ok(graph), Ok(registry)) = (self.graph.try_borrow(), self.registry.try_borrow()) else {
                log::warn!("Scene busy, dropping {} event", native.kind.name());
                return Vec::new();
            };

            let mut skipped: Vec<Store> = Vec::new();
            match Layer::compute(&self.store, &graph, native) {
                Some(layer) => self.layers.push(layer),
                None => skipped.push(self.store.clone()),
            }

            let mut hits: Vec<(i32, Intersection)> = Vec::new();
            for object in interaction {
                let Some(state) = registry.get(object) else {
                    continue;
                };
                if move_only && !MOVE_KINDS.iter().any(|k| state.handlers.has(*k)) {
                    continue;
                }
                if skipped.iter().any(|s| Store::ptr_eq(s, &state.store)) {
                    continue;
                }
                let index = match self.layers.iter().position(|l| Store::ptr_eq(&l.store, &state.store)) {
                    Some(index) => index,
                    None => match Layer::compute(&state.store, &graph, native) {
                        Some(layer) => {
                            self.layers.push(layer);
                            self.layers.len() - 1
                        }
                        None => {
                            skipped.push(state.store.clone());
                            continue;
                        }
                    },
                };
                let layer = &self.layers[index];
                hits.extend(
                    layer
                        .raycaster
                        .intersect_object(&graph, object, true)
                        .into_iter()
                        .map(|hit| (layer.priority, hit)),
                );
            }

            hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.distance.total_cmp(&b.1.distance)));
            let mut seen = HashSet::new();
            hits.retain(|(_, hit)| seen.insert(hit.hit_key()));

            let mut bubbled: Vec<Intersection> = Vec::new();
            for (_, hit) in hits {
                let mut current = Some(hit.object);
                while let Some(node) = current {
                    if registry.event_count(node) > 0 {
                        bubbled.push(Intersection { event_object: node, ..hit });
                    }
                    current = graph.parent_of(node);
                }
            }

            // An ancestor hears the event once, after its hit descendants
            let last: HashMap<NodeKey, usize> =
                bubbled.iter().enumerate().map(|(i, hit)| (hit.event_object, i)).collect();
            bubbled
                .iter()
                .enumerate()
                .filter(|(i, hit)| last.get(&hit.event_object) == Some(i))
                .map(|(_, hit)| *hit)
                .collect::<Vec<_>>()
        };

        if let Some(pointer_id) = native.pointer_id {
            let internal = self.store.internal();
            if let Some(captures) = internal.captured.get(&pointer_id) {
                for (node, record) in captures {
                    if !intersections.iter().any(|hit| hit.event_object == *node) {
                        intersections.push(record.intersection);
                    }
                }
            }
        }

        for layer in &self.layers {
            let pointer = layer.pointer;
            layer.store.update(|s| s.pointer = pointer);
        }
        intersections
    }

    // --- Dispatch ---

    fn dispatch(&mut self, kind: EventKind, hits: &[Intersection], native: &NativePointerEvent, delta: f32) -> usize {
        let is_move = kind == EventKind::PointerMove;
        let is_click = kind.is_click();
        let initial_hits = if is_click {
            self.store.internal().initial_hits.clone()
        } else {
            Vec::new()
        };

        let mut stopped = false;
        let mut missed_sent = false;
        let mut delivered = 0;

        for (index, hit) in hits.iter().enumerate() {
            let captured = native
                .pointer_id
                .is_some_and(|id| self.store.internal().is_capturing(id, hit.event_object));
            // Capturing objects hear the event even after propagation stopped
            if stopped && !captured {
                continue;
            }
            let Some(handlers) = handlers_of(&self.registry, hit.event_object) else {
                continue;
            };
            let layer = layer_for(&self.layers, &self.store, &self.registry, hit);
            let mut event = layer.event(kind, *hit, hits, native, delta, stopped, captured);

            if is_move {
                if HOVER_KINDS.iter().any(|k| handlers.has(*k)) {
                    let key = hit.event_key();
                    let known = self.store.internal().hovered.contains_key(&key);
                    if !known {
                        self.store.internal_mut().hovered.insert(key, *hit);
                        self.stopped_hovers.remove(&key);
                        delivered += call(&handlers, EventKind::PointerOver, &mut event);
                        delivered += call(&handlers, EventKind::PointerEnter, &mut event);
                    } else if self.stopped_hovers.contains(&key) {
                        event.stop_propagation();
                    }
                }
                delivered += call(&handlers, EventKind::PointerMove, &mut event);
            } else if !is_click || initial_hits.contains(&hit.event_object) {
                if is_click && !missed_sent {
                    missed_sent = true;
                    let others: Vec<NodeKey> = self
                        .store
                        .internal()
                        .interaction
                        .iter()
                        .copied()
                        .filter(|k| !initial_hits.contains(k))
                        .collect();
                    delivered += self.notify_missed(&others, native);
                }
                delivered += call(&handlers, kind, &mut event);
            }

            if self.apply_requests(&mut event, hits, index) {
                stopped = true;
            }
        }
        delivered
    }

    /// Carry out what a handler asked for; returns whether propagation stopped
    fn apply_requests(&mut self, event: &mut ThreeEvent<'_>, hits: &[Intersection], index: usize) -> bool {
        let hit = hits[index];
        let native = event.native;
        let mut stopped = false;

        for request in event.take_requests() {
            match request {
                EventRequest::StopPropagation => {
                    // While a pointer is captured only a capturer may stop it
                    let allowed = native.pointer_id.map_or(true, |id| {
                        self.store
                            .internal()
                            .captured
                            .get(&id)
                            .map_or(true, |captures| captures.contains_key(&hit.event_object))
                    });
                    if !allowed {
                        log::trace!("Ignoring stopPropagation from a non-capturing object");
                        continue;
                    }
                    stopped = true;

                    let key = hit.event_key();
                    let hovered = self
                        .store
                        .internal()
                        .hovered
                        .values()
                        .any(|h| h.event_object == hit.event_object);
                    if hovered {
                        if self.store.internal().hovered.contains_key(&key) {
                            self.stopped_hovers.insert(key);
                        }
                        // Objects behind the stopping one are no longer hovered
                        self.cancel_hover(&hits[..=index], native);
                    }
                }
                EventRequest::SetPointerCapture(id) => {
                    let record = CaptureRecord {
                        intersection: hit,
                        target: self.target.clone(),
                    };
                    self.store
                        .internal_mut()
                        .captured
                        .entry(id)
                        .or_default()
                        .insert(hit.event_object, record);
                    self.target.set_pointer_capture(id);
                }
                EventRequest::ReleasePointerCapture(id) => {
                    self.store.release_pointer_capture(id, hit.event_object);
                }
            }
        }
        stopped
    }

    /// Send out/leave to hovered entries not among `hits`
    fn cancel_hover(&mut self, hits: &[Intersection], native: &NativePointerEvent) -> usize {
        let (delivered, removed) = exit_hovers(&self.store, &self.registry, &self.layers, hits, native);
        for key in removed {
            self.stopped_hovers.remove(&key);
        }
        delivered
    }

    fn notify_missed(&self, objects: &[NodeKey], native: &NativePointerEvent) -> usize {
        let handlers: Vec<_> = {
            let registry = self.registry.borrow();
            objects
                .iter()
                .filter_map(|k| registry.get(*k).and_then(|s| s.handlers.missed()))
                .collect()
        };
        for handler in &handlers {
            handler(native);
        }
        handlers.len()
    }

    /// Platform capture loss takes effect after the next paint
    ///
    /// Events already queued for the frame, such as the click following a
    /// pointer up, still reach the capturing objects.
    fn schedule_capture_loss(&self, native: &NativePointerEvent) {
        let Some(pointer_id) = native.pointer_id else {
            return;
        };
        if !self.store.internal().captured.contains_key(&pointer_id) {
            return;
        }

        let store = self.store.clone();
        let registry = self.registry.clone();
        let native = native.clone();
        self.host.schedule_after_paint(Box::new(move || {
            let lost = store.internal_mut().captured.remove(&pointer_id);
            let Some(captures) = lost else {
                return;
            };
            log::trace!("Pointer {} lost capture of {} objects", pointer_id, captures.len());
            if let Some((_, record)) = captures.first() {
                record.target.release_pointer_capture(pointer_id);
            }
            exit_hovers(&store, &registry, &[], &[], &native);
        }));
    }
}

fn call(handlers: &Handlers, kind: EventKind, event: &mut ThreeEvent<'_>) -> usize {
    match handlers.get(kind) {
        Some(handler) => {
            event.kind = kind;
            handler(event);
            1
        }
        None => 0,
    }
}

/// Handlers of `node`, if it has any
fn handlers_of(registry: &Shared<InstanceRegistry>, node: NodeKey) -> Option<Handlers> {
    let registry = registry.borrow();
    let state = registry.get(node)?;
    (state.event_count > 0).then(|| state.handlers.clone())
}

/// Layer owning the intersected object
fn layer_for(layers: &[Layer], root: &Store, registry: &Shared<InstanceRegistry>, hit: &Intersection) -> Layer {
    let store = {
        let registry = registry.borrow();
        registry
            .get(hit.object)
            .or_else(|| registry.get(hit.event_object))
            .map(|s| s.store.clone())
    };
    let store = store.unwrap_or_else(|| root.clone());
    layers
        .iter()
        .find(|l| Store::ptr_eq(&l.store, &store))
        .cloned()
        .unwrap_or_else(|| Layer::from_state(&store))
}

/// Unhover every entry whose geometry is not among `hits`
///
/// Returns the number of handlers invoked and the removed hover keys.
fn exit_hovers(
    store: &Store,
    registry: &Shared<InstanceRegistry>,
    layers: &[Layer],
    hits: &[Intersection],
    native: &NativePointerEvent,
) -> (usize, Vec<HitKey>) {
    let removed: Vec<(HitKey, Intersection)> = {
        let mut internal = store.internal_mut();
        let stale: Vec<HitKey> = internal
            .hovered
            .iter()
            .filter(|(_, hovered)| !hits.iter().any(|hit| hit.hit_key() == hovered.hit_key()))
            .map(|(key, _)| *key)
            .collect();
        stale
            .into_iter()
            .filter_map(|key| internal.hovered.shift_remove(&key).map(|hit| (key, hit)))
            .collect()
    };

    let mut delivered = 0;
    for (_, hovered) in &removed {
        let Some(handlers) = handlers_of(registry, hovered.event_object) else {
            continue;
        };
        let layer = layer_for(layers, store, registry, hovered);
        let mut event = layer.event(EventKind::PointerOut, *hovered, hits, native, 0.0, false, false);
        delivered += call(&handlers, EventKind::PointerOut, &mut event);
        delivered += call(&handlers, EventKind::PointerLeave, &mut event);
    }
    (delivered, removed.into_iter().map(|(key, _)| key).collect())
}
