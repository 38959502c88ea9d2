//! Per-root reactive store
//!
//! Observable fields live in [`StoreState`]; every [`Store::update`] diffs the
//! state and notifies only subscribers whose [`StoreFields`] mask intersects
//! what changed. High-frequency bookkeeping (hover, capture, frame counter,
//! frame subscribers) lives in [`Internal`], which is mutated in place and
//! never notifies.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use trellis_math::Vec2;
use crate::error::FrameError;
use crate::event::{MissedHandler, NativePointerEvent, PointerPrefix, PointerTarget};
use crate::graph::{NodeKey, SceneGraph};
use crate::raycast::{HitKey, Intersection, Raycaster};
use crate::reactive::ReactiveCell;
use crate::renderer::RendererHandle;

bitflags! {
    /// Observable store fields, used as subscription interest masks
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StoreFields: u32 {
        const RENDERER = 1 << 0;
        const SCENE = 1 << 1;
        const CAMERA = 1 << 2;
        const RAYCASTER = 1 << 3;
        const POINTER = 1 << 4;
        const SIZE = 1 << 5;
        const VIEWPORT = 1 << 6;
        const DPR = 1 << 7;
        const PERFORMANCE = 1 << 8;
        const FRAMELOOP = 1 << 9;
        const EVENTS = 1 << 10;
        const CONTROLS = 1 << 11;
        const FLAT = 1 << 12;
        const LEGACY = 1 << 13;
        const ALL = (1 << 14) - 1;
    }
}

/// When a root renders
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frameloop {
    /// Every tick
    #[default]
    Always,
    /// Only after `invalidate`
    Demand,
    /// Only when advanced manually
    Never,
}

impl FromStr for Frameloop {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Frameloop::Always),
            "demand" => Ok(Frameloop::Demand),
            "never" => Ok(Frameloop::Never),
            other => Err(format!("unknown frameloop '{}'", other)),
        }
    }
}

/// Canvas size in CSS pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
    pub top: f32,
    pub left: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height, top: 0.0, left: 0.0 }
    }
}

/// Drawing buffer size in physical pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub dpr: f32,
    pub aspect: f32,
}

impl Viewport {
    pub fn from_size(size: Size, dpr: f32) -> Self {
        Self {
            width: size.width * dpr,
            height: size.height * dpr,
            dpr,
            aspect: if size.height > 0.0 { size.width / size.height } else { 1.0 },
        }
    }
}

/// Allowed device pixel ratio range
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DprRange {
    pub min: f32,
    pub max: f32,
}

impl Default for DprRange {
    fn default() -> Self {
        Self { min: 1.0, max: 2.0 }
    }
}

impl DprRange {
    pub fn clamp(&self, dpr: f32) -> f32 {
        dpr.clamp(self.min, self.max)
    }
}

/// Adaptive performance level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Performance {
    pub current: f32,
    pub min: f32,
    pub max: f32,
    /// Milliseconds to stay regressed after the last `regress` call
    pub debounce_ms: f64,
    pub regressing: bool,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            current: 1.0,
            min: 0.5,
            max: 1.0,
            debounce_ms: 200.0,
            regressing: false,
        }
    }
}

/// Pixels of pointer travel tolerated between pointer down and click
pub const DEFAULT_CLICK_THRESHOLD: f32 = 2.0;

/// Event-layer settings of a root or portal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventSettings {
    pub enabled: bool,
    /// Higher layers sort before lower ones when picking
    pub priority: i32,
    pub prefix: PointerPrefix,
    /// Pixels of travel after which a click counts as a drag
    pub click_threshold: f32,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 1,
            prefix: PointerPrefix::default(),
            click_threshold: DEFAULT_CLICK_THRESHOLD,
        }
    }
}

/// Observable fields of a root
#[derive(Clone, Debug, PartialEq)]
pub struct StoreState {
    pub renderer: RendererHandle,
    pub scene: NodeKey,
    pub camera: NodeKey,
    pub raycaster: Raycaster,
    /// Pointer in normalized device coordinates
    pub pointer: Vec2,
    pub size: Size,
    pub viewport: Viewport,
    pub dpr: f32,
    pub dpr_range: DprRange,
    pub performance: Performance,
    pub frameloop: Frameloop,
    pub events: EventSettings,
    /// Camera controls node, if any; controls own the camera while set
    pub controls: Option<NodeKey>,
    /// Disable tone mapping
    pub flat: bool,
    /// Disable color management
    pub legacy: bool,
}

impl StoreState {
    pub fn new(renderer: RendererHandle, scene: NodeKey, camera: NodeKey) -> Self {
        Self {
            renderer,
            scene,
            camera,
            raycaster: Raycaster::new(),
            pointer: Vec2::ZERO,
            size: Size::default(),
            viewport: Viewport::from_size(Size::default(), 1.0),
            dpr: 1.0,
            dpr_range: DprRange::default(),
            performance: Performance::default(),
            frameloop: Frameloop::default(),
            events: EventSettings::default(),
            controls: None,
            flat: false,
            legacy: false,
        }
    }

    /// Fields that differ between two states
    pub fn diff(&self, other: &StoreState) -> StoreFields {
        let mut changed = StoreFields::empty();
        changed.set(StoreFields::RENDERER, self.renderer != other.renderer);
        changed.set(StoreFields::SCENE, self.scene != other.scene);
        changed.set(StoreFields::CAMERA, self.camera != other.camera);
        changed.set(StoreFields::RAYCASTER, self.raycaster != other.raycaster);
        changed.set(StoreFields::POINTER, self.pointer != other.pointer);
        changed.set(StoreFields::SIZE, self.size != other.size);
        changed.set(StoreFields::VIEWPORT, self.viewport != other.viewport);
        changed.set(StoreFields::DPR, self.dpr != other.dpr || self.dpr_range != other.dpr_range);
        changed.set(StoreFields::PERFORMANCE, self.performance != other.performance);
        changed.set(StoreFields::FRAMELOOP, self.frameloop != other.frameloop);
        changed.set(StoreFields::EVENTS, self.events != other.events);
        changed.set(StoreFields::CONTROLS, self.controls != other.controls);
        changed.set(StoreFields::FLAT, self.flat != other.flat);
        changed.set(StoreFields::LEGACY, self.legacy != other.legacy);
        changed
    }
}

/// An object holding pointer capture
#[derive(Clone)]
pub struct CaptureRecord {
    /// Intersection at the time capture was taken
    pub intersection: Intersection,
    pub target: Rc<dyn PointerTarget>,
}

impl fmt::Debug for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRecord").field("intersection", &self.intersection).finish()
    }
}

/// Identifies a store or frame subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Context handed to frame callbacks
pub struct FrameContext<'a> {
    pub store: &'a Store,
    pub graph: &'a mut SceneGraph,
    /// Seconds since the previous frame of this root
    pub delta: f32,
    /// Seconds since the first frame of this root
    pub elapsed: f64,
    /// Timestamp of this tick in milliseconds
    pub timestamp: f64,
}

pub type FrameCallback = Box<dyn FnMut(&mut FrameContext<'_>) -> Result<(), FrameError>>;

struct FrameSubscriber {
    id: SubscriptionId,
    priority: i32,
    callback: FrameCallback,
}

/// Frame clock of a root
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Clock {
    pub elapsed: f64,
    pub last: Option<f64>,
}

impl Clock {
    /// Advance to `timestamp` (ms), returning the delta in seconds
    pub fn tick(&mut self, timestamp: f64) -> f32 {
        let delta = match self.last {
            Some(last) if timestamp > last => (timestamp - last) / 1000.0,
            _ => 0.0,
        };
        self.last = Some(timestamp);
        self.elapsed += delta;
        delta as f32
    }
}

/// Non-observable bookkeeping, shared between a root and its portals
#[derive(Default)]
pub struct Internal {
    /// Whether the root participates in the frame loop
    pub active: bool,
    /// Pending invalidations; any value above zero means "render next tick"
    pub frames: u32,
    /// Number of frame subscribers that take over rendering
    pub priority: u32,
    /// Nodes with event handlers, in registration order
    pub interaction: Vec<NodeKey>,
    pub hovered: IndexMap<HitKey, Intersection>,
    /// Pointer id to capturing event objects
    pub captured: HashMap<i32, IndexMap<NodeKey, CaptureRecord>>,
    pub initial_click: Vec2,
    pub initial_hits: Vec<NodeKey>,
    pub last_event: Option<NativePointerEvent>,
    /// Root-level handler for clicks that hit nothing
    pub on_pointer_missed: Option<MissedHandler>,
    pub clock: Clock,
    waker: Option<Rc<dyn Fn()>>,
    subscribers: Vec<FrameSubscriber>,
    removed_while_running: Vec<SubscriptionId>,
    regress_until: Option<f64>,
}

impl Internal {
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether `node` holds capture on `pointer_id`
    pub fn is_capturing(&self, pointer_id: i32, node: NodeKey) -> bool {
        self.captured.get(&pointer_id).is_some_and(|c| c.contains_key(&node))
    }
}

impl fmt::Debug for Internal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Internal")
            .field("active", &self.active)
            .field("frames", &self.frames)
            .field("priority", &self.priority)
            .field("interaction", &self.interaction.len())
            .field("hovered", &self.hovered.len())
            .field("captured", &self.captured.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

type Listener = Rc<dyn Fn(&StoreState, StoreFields)>;

struct StoreInner {
    state: RefCell<StoreState>,
    internal: Rc<RefCell<Internal>>,
    listeners: RefCell<Vec<(SubscriptionId, StoreFields, Listener)>>,
    next_id: Rc<Cell<u64>>,
    advancing: Cell<bool>,
    previous: Option<Store>,
    /// Subscription on `previous` that mirrors its canvas fields into a portal
    mirror: Cell<Option<SubscriptionId>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let (Some(previous), Some(id)) = (&self.previous, self.mirror.get()) {
            previous.unsubscribe(id);
        }
    }
}

/// Handle to a root's store; clones share the same store
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Non-owning store handle
#[derive(Clone)]
pub struct WeakStore(Weak<StoreInner>);

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("ptr", &Rc::as_ptr(&self.inner))
            .field("portal", &self.is_portal())
            .finish()
    }
}

impl Store {
    pub fn new(state: StoreState) -> Self {
        let internal = Internal { active: true, ..Default::default() };
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(state),
                internal: Rc::new(RefCell::new(internal)),
                listeners: RefCell::new(Vec::new()),
                next_id: Rc::new(Cell::new(0)),
                advancing: Cell::new(false),
                previous: None,
                mirror: Cell::new(None),
            }),
        }
    }

    pub fn ptr_eq(a: &Store, b: &Store) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore(Rc::downgrade(&self.inner))
    }

    fn next_id(&self) -> SubscriptionId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        SubscriptionId(id)
    }

    // --- Observable state ---

    /// Borrow the observable state
    ///
    /// The borrow must be released before calling `update`.
    pub fn state(&self) -> Ref<'_, StoreState> {
        self.inner.state.borrow()
    }

    pub fn snapshot(&self) -> StoreState {
        self.inner.state.borrow().clone()
    }

    pub fn scene(&self) -> NodeKey {
        self.inner.state.borrow().scene
    }

    pub fn camera(&self) -> NodeKey {
        self.inner.state.borrow().camera
    }

    pub fn frameloop(&self) -> Frameloop {
        self.inner.state.borrow().frameloop
    }

    pub fn events(&self) -> EventSettings {
        self.inner.state.borrow().events
    }

    pub fn size(&self) -> Size {
        self.inner.state.borrow().size
    }

    pub fn renderer(&self) -> RendererHandle {
        self.inner.state.borrow().renderer.clone()
    }

    /// Mutate the state and notify subscribers of the fields that changed
    pub fn update(&self, f: impl FnOnce(&mut StoreState)) -> StoreFields {
        let (changed, snapshot) = {
            let mut state = self.inner.state.borrow_mut();
            let before = state.clone();
            f(&mut state);
            let changed = before.diff(&state);
            (changed, (!changed.is_empty()).then(|| state.clone()))
        };
        let Some(snapshot) = snapshot else {
            return changed;
        };

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|(_, mask, _)| mask.intersects(changed))
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot, changed);
        }
        changed
    }

    /// Call `f` after every update that touches a field in `mask`
    pub fn subscribe(&self, mask: StoreFields, f: impl Fn(&StoreState, StoreFields) + 'static) -> SubscriptionId {
        let id = self.next_id();
        self.inner.listeners.borrow_mut().push((id, mask, Rc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Live view of a projection of the state
    ///
    /// The selection is recomputed only when a field in `mask` changes and
    /// notifies its own subscribers only when the projected value differs.
    pub fn select<T, F>(&self, mask: StoreFields, project: F) -> Selection<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(&StoreState) -> T + 'static,
    {
        let cell = ReactiveCell::new(project(&self.state()));
        let sink = cell.clone();
        let id = self.subscribe(mask, move |state, _| {
            sink.set(project(state));
        });
        Selection {
            cell,
            store: self.downgrade(),
            id,
        }
    }

    pub fn set_camera(&self, camera: NodeKey) {
        self.update(|s| s.camera = camera);
        self.invalidate();
    }

    /// Resize the canvas; the camera follows unless it is manual
    pub fn set_size(&self, graph: &mut SceneGraph, size: Size) {
        self.update(|s| {
            s.size = size;
            s.viewport = Viewport::from_size(size, s.dpr);
        });
        let (renderer, camera, viewport) = {
            let state = self.state();
            (state.renderer.clone(), state.camera, state.viewport)
        };
        renderer.set_size(viewport.width as u32, viewport.height as u32);
        if let Some(cam) = graph.get_mut(camera).and_then(|n| n.camera_data_mut()) {
            if !cam.manual {
                cam.fit_to_size(size.width, size.height);
            }
        }
        self.invalidate();
    }

    /// Set the pixel ratio, clamped to the configured range
    pub fn set_dpr(&self, dpr: f32) {
        self.update(|s| {
            s.dpr = s.dpr_range.clamp(dpr);
            s.viewport = Viewport::from_size(s.size, s.dpr);
        });
        let (renderer, dpr) = {
            let state = self.state();
            (state.renderer.clone(), state.dpr)
        };
        renderer.set_pixel_ratio(dpr);
        self.invalidate();
    }

    pub fn set_frameloop(&self, frameloop: Frameloop) {
        let changed = self.update(|s| s.frameloop = frameloop);
        if changed.contains(StoreFields::FRAMELOOP) {
            self.internal_mut().clock = Clock::default();
            self.invalidate();
        }
    }

    pub fn set_events(&self, f: impl FnOnce(&mut EventSettings)) {
        self.update(|s| f(&mut s.events));
    }

    /// Drop to minimum performance for `debounce_ms`
    pub fn regress(&self) {
        let now = self.internal().clock.last.unwrap_or(0.0);
        let debounce = self.state().performance.debounce_ms;
        self.internal_mut().regress_until = Some(now + debounce);
        self.update(|s| {
            s.performance.current = s.performance.min;
            s.performance.regressing = true;
        });
    }

    fn restore_performance(&self, timestamp: f64) {
        let due = {
            let mut internal = self.internal_mut();
            match internal.regress_until {
                Some(until) if timestamp >= until => {
                    internal.regress_until = None;
                    true
                }
                _ => false,
            }
        };
        if due {
            self.update(|s| {
                s.performance.current = s.performance.max;
                s.performance.regressing = false;
            });
        }
    }

    // --- Internal state ---

    pub fn internal(&self) -> Ref<'_, Internal> {
        self.inner.internal.borrow()
    }

    pub fn internal_mut(&self) -> RefMut<'_, Internal> {
        self.inner.internal.borrow_mut()
    }

    /// Callback run when an invalidation needs the frame loop awake
    pub fn set_waker(&self, waker: Option<Rc<dyn Fn()>>) {
        self.internal_mut().waker = waker;
    }

    pub fn set_on_pointer_missed(&self, handler: Option<MissedHandler>) {
        self.internal_mut().on_pointer_missed = handler;
    }

    /// Request a render on the next tick
    ///
    /// Any number of calls between two ticks yields a single render.
    pub fn invalidate(&self) {
        if self.frameloop() == Frameloop::Never {
            return;
        }
        let waker = {
            let mut internal = self.internal_mut();
            if !internal.active {
                return;
            }
            internal.frames = internal.frames.saturating_add(1).min(60);
            internal.waker.clone()
        };
        if let Some(wake) = waker {
            wake();
        }
    }

    /// Whether the next tick should advance this root
    pub fn needs_frame(&self) -> bool {
        let frameloop = self.frameloop();
        let internal = self.internal();
        internal.active
            && match frameloop {
                Frameloop::Always => true,
                Frameloop::Demand => internal.frames > 0,
                Frameloop::Never => false,
            }
    }

    pub fn set_active(&self, active: bool) {
        self.internal_mut().active = active;
    }

    pub fn is_active(&self) -> bool {
        self.internal().active
    }

    // --- Frame subscribers ---

    /// Run `callback` every frame, ordered by ascending `priority`
    ///
    /// While any subscriber with a positive priority exists the root does not
    /// render by itself; such subscribers are expected to render.
    pub fn subscribe_frame(
        &self,
        priority: i32,
        callback: impl FnMut(&mut FrameContext<'_>) -> Result<(), FrameError> + 'static,
    ) -> SubscriptionId {
        let id = self.next_id();
        let mut internal = self.internal_mut();
        if priority > 0 {
            internal.priority += 1;
        }
        internal.subscribers.push(FrameSubscriber {
            id,
            priority,
            callback: Box::new(callback),
        });
        internal.subscribers.sort_by_key(|s| s.priority);
        id
    }

    pub fn unsubscribe_frame(&self, id: SubscriptionId) -> bool {
        let mut internal = self.internal_mut();
        let Some(pos) = internal.subscribers.iter().position(|s| s.id == id) else {
            // Callbacks are taken out of `internal` while they run
            internal.removed_while_running.push(id);
            return false;
        };
        let subscriber = internal.subscribers.remove(pos);
        if subscriber.priority > 0 {
            internal.priority = internal.priority.saturating_sub(1);
        }
        true
    }

    /// Advance this root by one frame: run frame subscribers, then render
    ///
    /// Returns whether the renderer ran. Re-entrant calls fail with
    /// [`FrameError::Reentrant`].
    pub fn advance(&self, timestamp: f64, graph: &mut SceneGraph) -> Result<bool, FrameError> {
        if self.inner.advancing.replace(true) {
            return Err(FrameError::Reentrant);
        }
        let result = self.advance_frame(timestamp, graph);
        self.inner.advancing.set(false);
        result
    }

    fn advance_frame(&self, timestamp: f64, graph: &mut SceneGraph) -> Result<bool, FrameError> {
        let (delta, elapsed) = {
            let mut internal = self.internal_mut();
            let delta = internal.clock.tick(timestamp);
            (delta, internal.clock.elapsed)
        };
        self.restore_performance(timestamp);
        // Invalidations raised by subscribers during this pass carry over
        let pending = self.internal().frames;

        let mut running = std::mem::take(&mut self.internal_mut().subscribers);
        let mut outcome = Ok(());
        {
            let mut ctx = FrameContext {
                store: self,
                graph: &mut *graph,
                delta,
                elapsed,
                timestamp,
            };
            for subscriber in running.iter_mut() {
                if let Err(e) = (subscriber.callback)(&mut ctx) {
                    outcome = Err(e);
                    break;
                }
            }
        }
        {
            let mut internal = self.internal_mut();
            let removed = std::mem::take(&mut internal.removed_while_running);
            let added = std::mem::take(&mut internal.subscribers);
            running.extend(added);
            for id in removed {
                if let Some(pos) = running.iter().position(|s| s.id == id) {
                    if running.remove(pos).priority > 0 {
                        internal.priority = internal.priority.saturating_sub(1);
                    }
                }
            }
            running.sort_by_key(|s| s.priority);
            internal.subscribers = running;
        }
        outcome?;

        let takeover = self.internal().priority > 0;
        let (renderer, scene, camera) = {
            let state = self.state();
            (state.renderer.clone(), state.scene, state.camera)
        };
        {
            let mut internal = self.internal_mut();
            internal.frames = internal.frames.saturating_sub(pending);
        }
        if takeover {
            return Ok(false);
        }
        renderer.render(graph, scene, camera)?;
        Ok(true)
    }

    // --- Portals ---

    /// Store for a portal rendering into `container`
    ///
    /// The portal adopts this store's renderer, raycaster, camera and size,
    /// and keeps following the latter four as they change. It picks with
    /// priority one above this store and shares its bookkeeping so it is
    /// advanced together with its host root.
    pub fn portal(&self, container: NodeKey) -> Store {
        let mut state = self.snapshot();
        state.scene = container;
        state.events.priority = self.events().priority + 1;
        let portal = Store {
            inner: Rc::new(StoreInner {
                state: RefCell::new(state),
                internal: self.inner.internal.clone(),
                listeners: RefCell::new(Vec::new()),
                next_id: self.inner.next_id.clone(),
                advancing: Cell::new(false),
                previous: Some(self.clone()),
                mirror: Cell::new(None),
            }),
        };

        let weak = portal.downgrade();
        let id = self.subscribe(Self::MIRRORED, move |state, _| {
            if let Some(portal) = weak.upgrade() {
                portal.update(|s| {
                    s.camera = state.camera;
                    s.raycaster = state.raycaster.clone();
                    s.size = state.size;
                    s.viewport = state.viewport;
                    s.dpr = state.dpr;
                });
            }
        });
        portal.inner.mirror.set(Some(id));
        portal
    }

    /// Fields a portal keeps in step with the store it was created from
    const MIRRORED: StoreFields = StoreFields::CAMERA
        .union(StoreFields::RAYCASTER)
        .union(StoreFields::SIZE)
        .union(StoreFields::VIEWPORT)
        .union(StoreFields::DPR);

    pub fn is_portal(&self) -> bool {
        self.inner.previous.is_some()
    }

    /// Store this portal was created from
    pub fn previous_root(&self) -> Option<Store> {
        self.inner.previous.clone()
    }

    /// Outermost root store
    pub fn root(&self) -> Store {
        let mut store = self.clone();
        while let Some(previous) = store.previous_root() {
            store = previous;
        }
        store
    }

    // --- Interactivity ---

    /// Make `node` pickable
    pub fn add_interactivity(&self, node: NodeKey) {
        let mut internal = self.internal_mut();
        if !internal.interaction.contains(&node) {
            internal.interaction.push(node);
        }
    }

    /// Forget every picking, hover and capture record of `node`
    pub fn remove_interactivity(&self, node: NodeKey) {
        let released = {
            let mut internal = self.internal_mut();
            internal.interaction.retain(|k| *k != node);
            internal.initial_hits.retain(|k| *k != node);
            internal
                .hovered
                .retain(|_, hit| hit.event_object != node && hit.object != node);
            let mut released = Vec::new();
            for (pointer_id, captures) in internal.captured.iter_mut() {
                if let Some(record) = captures.shift_remove(&node) {
                    if captures.is_empty() {
                        released.push((*pointer_id, record.target));
                    }
                }
            }
            internal.captured.retain(|_, captures| !captures.is_empty());
            released
        };
        for (pointer_id, target) in released {
            target.release_pointer_capture(pointer_id);
        }
    }

    /// Drop `node`'s capture of `pointer_id`
    ///
    /// The platform capture is released once no object captures the pointer.
    pub fn release_pointer_capture(&self, pointer_id: i32, node: NodeKey) -> bool {
        let released = {
            let mut internal = self.internal_mut();
            let Some(captures) = internal.captured.get_mut(&pointer_id) else {
                return false;
            };
            let Some(record) = captures.shift_remove(&node) else {
                return false;
            };
            if captures.is_empty() {
                internal.captured.remove(&pointer_id);
                Some(record.target)
            } else {
                None
            }
        };
        if let Some(target) = released {
            target.release_pointer_capture(pointer_id);
        }
        true
    }
}

/// A live, projected view of store state
///
/// Dropping the selection unsubscribes it from the store.
pub struct Selection<T: Clone + PartialEq + 'static> {
    cell: ReactiveCell<T>,
    store: WeakStore,
    id: SubscriptionId,
}

impl<T: Clone + PartialEq + 'static> Selection<T> {
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn cell(&self) -> &ReactiveCell<T> {
        &self.cell
    }
}

impl<T: Clone + PartialEq + 'static> Drop for Selection<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::NullPointerTarget;
    use crate::node::{Camera, NodeKind, SceneNode};
    use crate::renderer::HeadlessRenderer;
    use std::cell::Cell;

    pub(crate) fn test_store() -> (Store, SceneGraph) {
        let mut graph = SceneGraph::new();
        let scene = graph.insert(SceneNode::new(NodeKind::Scene));
        let camera = graph.insert(SceneNode::camera(Camera::perspective(75.0, 1.0, 0.1, 1000.0)));
        let store = Store::new(StoreState::new(RendererHandle::new(HeadlessRenderer::new()), scene, camera));
        (store, graph)
    }

    fn counting_store(frameloop: Frameloop) -> (Store, SceneGraph, Rc<Cell<u64>>) {
        let (store, graph) = test_store();
        let renderer = HeadlessRenderer::new();
        let frames = renderer.frame_counter();
        store.update(|s| {
            s.renderer = RendererHandle::new(renderer);
            s.frameloop = frameloop;
        });
        (store, graph, frames)
    }

    #[test]
    fn test_update_notifies_only_changed_fields() {
        let (store, _graph) = test_store();
        let size_calls = Rc::new(Cell::new(0));
        let pointer_calls = Rc::new(Cell::new(0));
        let s = size_calls.clone();
        store.subscribe(StoreFields::SIZE, move |_, _| s.set(s.get() + 1));
        let p = pointer_calls.clone();
        store.subscribe(StoreFields::POINTER, move |_, _| p.set(p.get() + 1));

        let changed = store.update(|s| s.pointer = Vec2::new(0.5, 0.5));
        assert_eq!(changed, StoreFields::POINTER);
        assert_eq!(pointer_calls.get(), 1);
        assert_eq!(size_calls.get(), 0);

        let changed = store.update(|s| s.pointer = Vec2::new(0.5, 0.5));
        assert!(changed.is_empty());
        assert_eq!(pointer_calls.get(), 1);
    }

    #[test]
    fn test_listener_may_update_store() {
        let (store, _graph) = test_store();
        let inner = store.clone();
        store.subscribe(StoreFields::POINTER, move |state, _| {
            let flat = state.pointer.x > 0.0;
            inner.update(|s| s.flat = flat);
        });
        store.update(|s| s.pointer = Vec2::new(1.0, 0.0));
        assert!(store.state().flat);
    }

    #[test]
    fn test_selection_tracks_and_unsubscribes() {
        let (store, mut graph) = test_store();
        let width = store.select(StoreFields::SIZE, |s| s.size.width);
        assert_eq!(width.get(), 0.0);
        assert_eq!(store.listener_count(), 1);

        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        width.cell().subscribe(move |_| s.set(s.get() + 1));

        store.set_size(&mut graph, Size::new(800.0, 600.0));
        assert_eq!(width.get(), 800.0);
        store.update(|s| s.size.top = 10.0);
        assert_eq!(seen.get(), 1);

        drop(width);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_set_size_updates_camera_unless_manual() {
        let (store, mut graph) = test_store();
        let camera = store.camera();
        store.set_size(&mut graph, Size::new(400.0, 200.0));
        let aspect = |graph: &SceneGraph| match graph.get(camera).unwrap().camera_data().unwrap().projection {
            crate::node::Projection::Perspective { aspect, .. } => aspect,
            _ => unreachable!(),
        };
        assert_eq!(aspect(&graph), 2.0);

        graph.get_mut(camera).unwrap().camera_data_mut().unwrap().manual = true;
        store.set_size(&mut graph, Size::new(100.0, 100.0));
        assert_eq!(aspect(&graph), 2.0);
    }

    #[test]
    fn test_set_dpr_clamps() {
        let (store, _graph) = test_store();
        store.set_dpr(3.0);
        assert_eq!(store.state().dpr, 2.0);
        store.set_dpr(0.25);
        assert_eq!(store.state().dpr, 1.0);
    }

    #[test]
    fn test_invalidate_coalesces() {
        let (store, mut graph, frames) = counting_store(Frameloop::Demand);
        assert!(!store.needs_frame());
        store.invalidate();
        store.invalidate();
        store.invalidate();
        assert!(store.needs_frame());
        assert!(store.advance(16.0, &mut graph).unwrap());
        assert_eq!(frames.get(), 1);
        assert!(!store.needs_frame());
    }

    #[test]
    fn test_invalidate_ignored_for_never() {
        let (store, mut graph, frames) = counting_store(Frameloop::Never);
        store.invalidate();
        assert!(!store.needs_frame());
        assert_eq!(store.internal().frames, 0);
        store.advance(0.0, &mut graph).unwrap();
        assert_eq!(frames.get(), 1);
    }

    #[test]
    fn test_waker_called_on_invalidate() {
        let (store, _graph, _) = counting_store(Frameloop::Demand);
        let woken = Rc::new(Cell::new(0));
        let w = woken.clone();
        store.set_waker(Some(Rc::new(move || w.set(w.get() + 1))));
        store.invalidate();
        assert_eq!(woken.get(), 1);
    }

    #[test]
    fn test_frame_subscribers_run_in_priority_order() {
        let (store, mut graph, frames) = counting_store(Frameloop::Always);
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = order.clone();
        store.subscribe_frame(0, move |_| {
            o.borrow_mut().push("default");
            Ok(())
        });
        let o = order.clone();
        store.subscribe_frame(-1, move |_| {
            o.borrow_mut().push("early");
            Ok(())
        });
        assert!(store.advance(0.0, &mut graph).unwrap());
        assert_eq!(*order.borrow(), vec!["early", "default"]);
        assert_eq!(frames.get(), 1);
    }

    #[test]
    fn test_positive_priority_takes_over_rendering() {
        let (store, mut graph, frames) = counting_store(Frameloop::Always);
        let id = store.subscribe_frame(1, |ctx| {
            let (scene, camera) = (ctx.store.scene(), ctx.store.camera());
            ctx.store.renderer().render(ctx.graph, scene, camera)?;
            Ok(())
        });
        assert!(!store.advance(0.0, &mut graph).unwrap());
        assert_eq!(frames.get(), 1);

        store.unsubscribe_frame(id);
        assert_eq!(store.internal().priority, 0);
        assert!(store.advance(16.0, &mut graph).unwrap());
        assert_eq!(frames.get(), 2);
    }

    #[test]
    fn test_frame_callback_receives_delta() {
        let (store, mut graph, _) = counting_store(Frameloop::Always);
        let deltas = Rc::new(RefCell::new(Vec::new()));
        let d = deltas.clone();
        store.subscribe_frame(0, move |ctx| {
            d.borrow_mut().push(ctx.delta);
            Ok(())
        });
        store.advance(1000.0, &mut graph).unwrap();
        store.advance(1500.0, &mut graph).unwrap();
        assert_eq!(*deltas.borrow(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_callback_error_skips_render() {
        let (store, mut graph, frames) = counting_store(Frameloop::Always);
        store.subscribe_frame(0, |_| Err("broken".into()));
        let err = store.advance(0.0, &mut graph).unwrap_err();
        assert_eq!(err, FrameError::Callback("broken".to_string()));
        assert_eq!(frames.get(), 0);
        assert_eq!(store.internal().subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let (store, mut graph, _) = counting_store(Frameloop::Always);
        let calls = Rc::new(Cell::new(0));
        let id_cell: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let (c, idc) = (calls.clone(), id_cell.clone());
        let id = store.subscribe_frame(0, move |ctx| {
            c.set(c.get() + 1);
            if let Some(id) = idc.get() {
                ctx.store.unsubscribe_frame(id);
            }
            Ok(())
        });
        id_cell.set(Some(id));
        store.advance(0.0, &mut graph).unwrap();
        store.advance(16.0, &mut graph).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(store.internal().subscriber_count(), 0);
    }

    #[test]
    fn test_regress_restores_after_debounce() {
        let (store, mut graph, _) = counting_store(Frameloop::Always);
        store.advance(1000.0, &mut graph).unwrap();
        store.regress();
        assert!(store.state().performance.regressing);
        assert_eq!(store.state().performance.current, 0.5);

        store.advance(1100.0, &mut graph).unwrap();
        assert!(store.state().performance.regressing);
        store.advance(1250.0, &mut graph).unwrap();
        assert!(!store.state().performance.regressing);
        assert_eq!(store.state().performance.current, 1.0);
    }

    #[test]
    fn test_portal_shares_internal_and_bumps_priority() {
        let (store, mut graph) = test_store();
        let container = graph.insert(SceneNode::group());
        let portal = store.portal(container);
        assert!(portal.is_portal());
        assert!(Store::ptr_eq(&portal.root(), &store));
        assert_eq!(portal.events().priority, store.events().priority + 1);
        assert_eq!(portal.scene(), container);
        assert_eq!(portal.renderer(), store.renderer());

        portal.add_interactivity(container);
        assert_eq!(store.internal().interaction, vec![container]);
    }

    #[test]
    fn test_portal_follows_resize_and_camera() {
        let (store, mut graph) = test_store();
        let container = graph.insert(SceneNode::group());
        let portal = store.portal(container);

        store.set_size(&mut graph, Size::new(800.0, 600.0));
        assert_eq!(portal.state().size, Size::new(800.0, 600.0));
        assert_eq!(portal.state().viewport, store.state().viewport);

        let other = graph.insert(SceneNode::camera(Camera::perspective(50.0, 1.0, 0.1, 100.0)));
        store.set_camera(other);
        assert_eq!(portal.state().camera, other);
        assert_eq!(portal.scene(), container);
    }

    #[test]
    fn test_dropped_portal_stops_listening() {
        let (store, mut graph) = test_store();
        let container = graph.insert(SceneNode::group());
        let before = store.listener_count();
        let portal = store.portal(container);
        assert_eq!(store.listener_count(), before + 1);
        drop(portal);
        assert_eq!(store.listener_count(), before);
        store.set_size(&mut graph, Size::new(10.0, 10.0));
    }

    #[test]
    fn test_remove_interactivity_releases_capture() {
        struct Recording(Rc<RefCell<Vec<i32>>>);
        impl PointerTarget for Recording {
            fn set_pointer_capture(&self, _: i32) {}
            fn release_pointer_capture(&self, id: i32) {
                self.0.borrow_mut().push(id);
            }
        }

        let (store, mut graph) = test_store();
        let node = graph.insert(SceneNode::mesh());
        let released = Rc::new(RefCell::new(Vec::new()));
        let target: Rc<dyn PointerTarget> = Rc::new(Recording(released.clone()));
        let hit = Intersection::new(node, 1.0, trellis_math::Vec3::ZERO);
        {
            let mut internal = store.internal_mut();
            internal.interaction.push(node);
            internal.initial_hits.push(node);
            internal.hovered.insert(hit.event_key(), hit);
            internal
                .captured
                .entry(7)
                .or_default()
                .insert(node, CaptureRecord { intersection: hit, target });
        }
        store.remove_interactivity(node);
        let internal = store.internal();
        assert!(internal.interaction.is_empty());
        assert!(internal.initial_hits.is_empty());
        assert!(internal.hovered.is_empty());
        assert!(internal.captured.is_empty());
        assert_eq!(*released.borrow(), vec![7]);
    }

    #[test]
    fn test_release_pointer_capture_keeps_other_capturers() {
        let (store, mut graph) = test_store();
        let a = graph.insert(SceneNode::mesh());
        let b = graph.insert(SceneNode::mesh());
        let target: Rc<dyn PointerTarget> = Rc::new(NullPointerTarget);
        for node in [a, b] {
            let record = CaptureRecord {
                intersection: Intersection::new(node, 1.0, trellis_math::Vec3::ZERO),
                target: target.clone(),
            };
            store.internal_mut().captured.entry(1).or_default().insert(node, record);
        }
        assert!(store.release_pointer_capture(1, a));
        assert!(store.internal().is_capturing(1, b));
        assert!(!store.release_pointer_capture(1, a));
        assert!(store.release_pointer_capture(1, b));
        assert!(store.internal().captured.is_empty());
    }

    #[test]
    fn test_frameloop_parse() {
        assert_eq!("demand".parse::<Frameloop>().unwrap(), Frameloop::Demand);
        assert!("sometimes".parse::<Frameloop>().is_err());
    }
}
