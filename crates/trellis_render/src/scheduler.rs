//! Global frame loop
//!
//! A single [`Scheduler`] drives every mounted root from one platform frame
//! callback. Each tick runs the global "before" effects, then every root in
//! registration order (its own effects around `Store::advance`), then the
//! global "after" effects, and finally flushes after-paint callbacks.
//!
//! A failure inside one root is logged, pushed onto the error channel and
//! does not stop the remaining roots from ticking.
//!
//! When nothing needs a frame the loop goes idle. Stores registered here get
//! a waker, so the first `invalidate()` after the loop stopped requests a new
//! platform frame.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use crossbeam_channel::{Receiver, Sender};
use trellis_core::{FrameError, FrameHost, Frameloop, Root, SceneGraph, Shared, Store};

/// Asks the platform for another frame callback
pub trait FrameRequester {
    fn request_frame(&self);
}

impl FrameRequester for winit::window::Window {
    fn request_frame(&self) {
        self.request_redraw();
    }
}

impl<T: FrameRequester + ?Sized> FrameRequester for Arc<T> {
    fn request_frame(&self) {
        (**self).request_frame();
    }
}

/// Identifies a root registered with a scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// Identifies an effect added with [`Scheduler::add_effect`] or
/// [`Scheduler::add_root_effect`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

/// When an effect runs within a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Before any root renders
    Before,
    /// After every root rendered
    After,
    /// Once, when the loop goes idle
    Tail,
}

/// Effect applied once per tick, independent of roots
pub type GlobalEffect = Box<dyn FnMut(f64) -> Result<(), FrameError>>;

/// Effect scoped to one root
pub type RootEffect = Box<dyn FnMut(&Store, f64) -> Result<(), FrameError>>;

/// A failure surfaced by a tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickError {
    /// Root that failed, `None` for global effects
    pub root: Option<RootId>,
    pub error: FrameError,
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => write!(f, "{} failed: {}", root, self.error),
            None => write!(f, "Frame effect failed: {}", self.error),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Running flag and platform hook, shared with store wakers
#[derive(Default)]
struct LoopState {
    running: Cell<bool>,
    requester: RefCell<Option<Rc<dyn FrameRequester>>>,
}

impl LoopState {
    fn wake(&self) {
        if self.running.replace(true) {
            return;
        }
        log::trace!("Frame loop restarted");
        self.request();
    }

    fn request(&self) {
        let requester = self.requester.borrow().clone();
        if let Some(requester) = requester {
            requester.request_frame();
        }
    }
}

struct RootEntry {
    id: RootId,
    store: Store,
    graph: Shared<SceneGraph>,
    host: Option<Rc<FrameHost>>,
    before: Vec<(EffectId, RootEffect)>,
    after: Vec<(EffectId, RootEffect)>,
}

impl RootEntry {
    /// Root effects run for active roots that are not paused and whose
    /// camera is driven by the store
    fn runs_effects(&self) -> bool {
        if !self.store.is_active() || self.store.frameloop() == Frameloop::Never {
            return false;
        }
        let Ok(graph) = self.graph.try_borrow() else {
            return false;
        };
        graph
            .get(self.store.camera())
            .and_then(|node| node.camera_data())
            .map_or(true, |camera| !camera.manual)
    }
}

/// The global render loop
pub struct Scheduler {
    roots: Vec<RootEntry>,
    before: Vec<(EffectId, GlobalEffect)>,
    after: Vec<(EffectId, GlobalEffect)>,
    tails: Vec<(EffectId, GlobalEffect)>,
    state: Rc<LoopState>,
    errors_tx: Sender<TickError>,
    errors_rx: Receiver<TickError>,
    next_id: u64,
    ticks: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (errors_tx, errors_rx) = crossbeam_channel::unbounded();
        Self {
            roots: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            tails: Vec::new(),
            state: Rc::new(LoopState::default()),
            errors_tx,
            errors_rx,
            next_id: 0,
            ticks: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Install the platform hook used to request frames
    ///
    /// If a wake-up arrived before the hook existed, a frame is requested now.
    pub fn set_requester(&mut self, requester: Option<Rc<dyn FrameRequester>>) {
        *self.state.requester.borrow_mut() = requester;
        if self.state.running.get() {
            self.state.request();
        }
    }

    /// Whether the loop expects another platform frame
    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    /// Number of ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Receiver for per-root and effect failures
    pub fn errors(&self) -> Receiver<TickError> {
        self.errors_rx.clone()
    }

    // --- Roots ---

    /// Add a root to the loop
    ///
    /// `host` is the lifecycle host whose after-paint queue is flushed at
    /// the end of each tick.
    pub fn register(&mut self, root: &Root, host: Option<Rc<FrameHost>>) -> RootId {
        let id = RootId(self.next_id());
        let state: Weak<LoopState> = Rc::downgrade(&self.state);
        root.store.set_waker(Some(Rc::new(move || {
            if let Some(state) = state.upgrade() {
                state.wake();
            }
        })));

        self.roots.push(RootEntry {
            id,
            store: root.store.clone(),
            graph: root.graph.clone(),
            host,
            before: Vec::new(),
            after: Vec::new(),
        });
        log::debug!("Registered {} ({} roots mounted)", id, self.roots.len());

        if root.store.needs_frame() {
            self.state.wake();
        }
        id
    }

    /// Remove a root; it stops participating from the next tick
    pub fn unregister(&mut self, id: RootId) -> bool {
        let Some(pos) = self.roots.iter().position(|r| r.id == id) else {
            return false;
        };
        let entry = self.roots.remove(pos);
        entry.store.set_waker(None);
        log::debug!("Unregistered {} ({} roots mounted)", id, self.roots.len());
        true
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn store(&self, id: RootId) -> Option<&Store> {
        self.roots.iter().find(|r| r.id == id).map(|r| &r.store)
    }

    /// Request a frame for every registered root
    pub fn invalidate_all(&self) {
        for entry in &self.roots {
            entry.store.invalidate();
        }
    }

    // --- Effects ---

    /// Add an effect that runs once per tick for all roots
    pub fn add_effect(
        &mut self,
        phase: Phase,
        effect: impl FnMut(f64) -> Result<(), FrameError> + 'static,
    ) -> EffectId {
        let id = EffectId(self.next_id());
        let list = match phase {
            Phase::Before => &mut self.before,
            Phase::After => &mut self.after,
            Phase::Tail => &mut self.tails,
        };
        list.push((id, Box::new(effect)));
        id
    }

    /// Add an effect that runs around one root's frame
    ///
    /// Returns `None` if the root is unknown or `phase` is [`Phase::Tail`].
    pub fn add_root_effect(
        &mut self,
        root: RootId,
        phase: Phase,
        effect: impl FnMut(&Store, f64) -> Result<(), FrameError> + 'static,
    ) -> Option<EffectId> {
        let id = EffectId(self.next_id());
        let entry = self.roots.iter_mut().find(|r| r.id == root)?;
        match phase {
            Phase::Before => entry.before.push((id, Box::new(effect))),
            Phase::After => entry.after.push((id, Box::new(effect))),
            Phase::Tail => return None,
        }
        Some(id)
    }

    pub fn remove_effect(&mut self, id: EffectId) -> bool {
        fn remove<T>(list: &mut Vec<(EffectId, T)>, id: EffectId) -> bool {
            let before = list.len();
            list.retain(|(e, _)| *e != id);
            list.len() != before
        }

        remove(&mut self.before, id)
            || remove(&mut self.after, id)
            || remove(&mut self.tails, id)
            || self
                .roots
                .iter_mut()
                .any(|r| remove(&mut r.before, id) || remove(&mut r.after, id))
    }

    // --- Ticking ---

    /// Run one frame at `timestamp` (milliseconds)
    ///
    /// Returns whether another frame is wanted. When it is not, the loop goes
    /// idle and tail effects run.
    pub fn tick(&mut self, timestamp: f64) -> bool {
        self.run_frame(timestamp, false, true);

        let repeat = self.roots.iter().any(|r| r.store.needs_frame());
        if repeat {
            self.state.running.set(true);
            self.state.request();
        } else if self.state.running.replace(false) {
            log::trace!("Frame loop idle after {} ticks", self.ticks);
            Self::run_effects(&mut self.tails, timestamp, &self.errors_tx);
        }
        repeat
    }

    /// Advance every active root regardless of its frameloop
    ///
    /// Used to step roots whose frameloop is `Never` by hand.
    pub fn advance(&mut self, timestamp: f64, run_global_effects: bool) {
        self.run_frame(timestamp, true, run_global_effects);
    }

    fn run_frame(&mut self, timestamp: f64, force: bool, run_global_effects: bool) {
        self.ticks += 1;
        if run_global_effects {
            Self::run_effects(&mut self.before, timestamp, &self.errors_tx);
        }

        for entry in self.roots.iter_mut() {
            if let Err(error) = Self::tick_root(entry, timestamp, force) {
                log::error!("{} failed to render: {}", entry.id, error);
                let _ = self.errors_tx.send(TickError { root: Some(entry.id), error });
            }
        }

        if run_global_effects {
            Self::run_effects(&mut self.after, timestamp, &self.errors_tx);
        }

        for entry in &self.roots {
            if let Some(host) = &entry.host {
                host.flush_after_paint();
            }
        }
    }

    fn tick_root(entry: &mut RootEntry, timestamp: f64, force: bool) -> Result<(), FrameError> {
        let effects = entry.runs_effects();
        if effects {
            for (_, effect) in entry.before.iter_mut() {
                effect(&entry.store, timestamp)?;
            }
        }

        let wants_frame = if force { entry.store.is_active() } else { entry.store.needs_frame() };
        if wants_frame {
            let mut graph = entry.graph.try_borrow_mut().map_err(|_| FrameError::Reentrant)?;
            entry.store.advance(timestamp, &mut graph)?;
        }

        if effects {
            for (_, effect) in entry.after.iter_mut() {
                effect(&entry.store, timestamp)?;
            }
        }
        Ok(())
    }

    fn run_effects(effects: &mut [(EffectId, GlobalEffect)], timestamp: f64, errors: &Sender<TickError>) {
        for (_, effect) in effects.iter_mut() {
            if let Err(error) = effect(timestamp) {
                log::error!("Frame effect failed: {}", error);
                let _ = errors.send(TickError { root: None, error });
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for entry in &self.roots {
            entry.store.set_waker(None);
        }
    }
}
