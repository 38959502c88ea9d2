//! The simulation side of the bridge
//!
//! [`Worker`] owns a [`PhysicsWorld`] and the registered ray queries. It is
//! driven by requests and wall-clock time and answers with [`WorkerEvent`]s.
//! A [`Transport`] carries the messages: [`ThreadTransport`] runs the worker
//! on its own thread, [`ManualTransport`] runs it inline when told to.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use indexmap::IndexMap;
use trellis_math::Vec3;

use crate::error::PhysicsError;
use crate::protocol::{RayId, WorkerEvent, WorkerRequest};
use crate::world::{PhysicsConfig, PhysicsWorld, RayOptions};

/// Simulation state plus active ray queries
pub struct Worker {
    world: PhysicsWorld,
    rays: IndexMap<RayId, RayOptions>,
}

impl Worker {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            world: PhysicsWorld::with_config(config),
            rays: IndexMap::new(),
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn ray_count(&self) -> usize {
        self.rays.len()
    }

    /// Apply one request
    ///
    /// Requests naming a body that no longer exists are dropped; they are
    /// the normal result of a removal racing a mutation.
    pub fn handle(&mut self, request: WorkerRequest) -> Result<(), PhysicsError> {
        log::trace!("Worker request {}", request.op());
        match request {
            WorkerRequest::AddBody { id, props } => {
                self.world.add_body(id, &props)?;
            }
            WorkerRequest::RemoveBody { id } => {
                if self.world.remove_body(id).is_none() {
                    log::debug!("Remove for unknown body {}", id);
                }
            }
            WorkerRequest::SetPosition { id, position } => {
                if let Some(body) = self.world.body_mut(id) {
                    body.position = position;
                }
            }
            WorkerRequest::SetQuaternion { id, quaternion } => {
                if let Some(body) = self.world.body_mut(id) {
                    body.quaternion = quaternion.normalize();
                }
            }
            WorkerRequest::SetVelocity { id, velocity } => {
                if let Some(body) = self.world.body_mut(id).filter(|b| !b.is_static()) {
                    body.velocity = velocity;
                }
            }
            WorkerRequest::SetAngularVelocity { id, angular_velocity } => {
                if let Some(body) = self.world.body_mut(id).filter(|b| !b.is_static()) {
                    body.angular_velocity = angular_velocity;
                }
            }
            WorkerRequest::ApplyImpulse { id, impulse, world_point } => {
                if let Some(body) = self.world.body_mut(id) {
                    body.apply_impulse(impulse, world_point);
                }
            }
            WorkerRequest::ApplyForce { id, force, world_point } => {
                if let Some(body) = self.world.body_mut(id) {
                    body.apply_force(force, world_point);
                }
            }
            WorkerRequest::SetGravity { gravity } => {
                self.world.config.gravity = gravity;
            }
            WorkerRequest::AddConstraint { id, constraint } => {
                self.world.add_constraint(id, constraint)?;
            }
            WorkerRequest::RemoveConstraint { id } => {
                self.world.remove_constraint(id);
            }
            WorkerRequest::AddRay { id, options } => {
                self.rays.insert(id, options);
            }
            WorkerRequest::RemoveRay { id } => {
                self.rays.shift_remove(&id);
            }
            WorkerRequest::Shutdown => {}
        }
        Ok(())
    }

    /// Apply a request, turning a failure into an error event
    pub fn handle_or_report(&mut self, request: WorkerRequest) -> Option<WorkerEvent> {
        self.handle(request).err().map(|e| {
            log::warn!("Physics request failed: {}", e);
            WorkerEvent::Error { message: e.to_string() }
        })
    }

    /// Advance the simulation and report what happened
    ///
    /// Nothing is reported when no fixed step elapsed. Otherwise the events
    /// are one positions frame, the collide events of those steps, then one
    /// hit report per ray that struck something.
    pub fn advance(&mut self, elapsed: f32) -> Vec<WorkerEvent> {
        if self.world.advance(elapsed) == 0 {
            return Vec::new();
        }
        let mut events = vec![WorkerEvent::positions(self.world.bodies())];
        events.extend(self.world.drain_collisions().into_iter().map(WorkerEvent::Collide));
        for (&ray, options) in &self.rays {
            let hits = self.world.raycast(options);
            if !hits.is_empty() {
                events.push(WorkerEvent::RayHit { ray, hits });
            }
        }
        events
    }
}

/// Message channel between the bridge and a worker
pub trait Transport {
    fn send(&self, request: WorkerRequest) -> Result<(), PhysicsError>;

    /// Next pending event, if any; never blocks
    fn try_recv(&self) -> Option<WorkerEvent>;
}

// --- Thread transport ---

/// Events the worker may queue before the bridge drains them
pub const EVENT_CAPACITY: usize = 64;

/// Called from the worker thread after it queues a batch of events
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Runs a [`Worker`] on a background thread
///
/// The thread steps the world in real time, waking at least once per fixed
/// step. Its event queue holds at most [`EVENT_CAPACITY`] events; while the
/// bridge is not draining, further events are dropped and the worker keeps
/// stepping. Dropping the transport stops and joins the thread.
pub struct ThreadTransport {
    requests: Sender<WorkerRequest>,
    events: Receiver<WorkerEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadTransport {
    pub fn spawn(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        Self::spawn_inner(config, None)
    }

    /// Spawn a worker that calls `waker` whenever it has queued events
    ///
    /// Hosts that only draw on demand use this to schedule the frame that
    /// picks the events up.
    pub fn spawn_with_waker(config: PhysicsConfig, waker: Waker) -> Result<Self, PhysicsError> {
        Self::spawn_inner(config, Some(waker))
    }

    fn spawn_inner(config: PhysicsConfig, waker: Option<Waker>) -> Result<Self, PhysicsError> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        let tick = Duration::from_secs_f32(config.fixed_step.max(0.001));
        let worker = Worker::new(config);

        let handle = thread::Builder::new()
            .name("trellis-physics".to_string())
            .spawn(move || run_worker(worker, tick, request_rx, event_tx, waker))
            .map_err(|e| PhysicsError::Spawn(e.to_string()))?;

        Ok(Self {
            requests: request_tx,
            events: event_rx,
            handle: Some(handle),
        })
    }

    /// Stop the worker thread and wait for it
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.requests.send(WorkerRequest::Shutdown);
            if handle.join().is_err() {
                log::error!("Physics worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Transport for ThreadTransport {
    fn send(&self, request: WorkerRequest) -> Result<(), PhysicsError> {
        self.requests.send(request).map_err(|_| PhysicsError::TransportClosed)
    }

    fn try_recv(&self) -> Option<WorkerEvent> {
        self.events.try_recv().ok()
    }
}

fn run_worker(
    mut worker: Worker,
    tick: Duration,
    requests: Receiver<WorkerRequest>,
    events: Sender<WorkerEvent>,
    waker: Option<Waker>,
) {
    log::info!("Physics worker started");
    let mut last = Instant::now();
    let mut dropped: u64 = 0;
    loop {
        let first = match requests.recv_timeout(tick) {
            Ok(request) => Some(request),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let mut outbox = Vec::new();
        let mut shutdown = false;
        let mut pending = first;
        while let Some(request) = pending.take() {
            if request == WorkerRequest::Shutdown {
                shutdown = true;
                break;
            }
            outbox.extend(worker.handle_or_report(request));
            pending = match requests.try_recv() {
                Ok(next) => Some(next),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    shutdown = true;
                    None
                }
            };
        }
        if shutdown {
            break;
        }

        let now = Instant::now();
        outbox.extend(worker.advance((now - last).as_secs_f32()));
        last = now;

        let mut queued = 0;
        for event in outbox {
            match events.try_send(event) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Bridge gone, stopping physics worker");
                    return;
                }
            }
        }
        if queued > 0 {
            if let Some(wake) = &waker {
                wake();
            }
        }
    }
    if dropped > 0 {
        log::debug!("Physics worker dropped {} events while the bridge was behind", dropped);
    }
    log::info!("Physics worker stopped");
}

// --- Manual transport ---

#[derive(Default)]
struct ManualState {
    requests: VecDeque<WorkerRequest>,
    events: VecDeque<WorkerEvent>,
    sent: usize,
}

/// Runs a [`Worker`] on the calling thread, only when stepped
///
/// Requests queue until [`ManualTransport::step`], so replies arrive as
/// late as they would from a real worker. Clones share the same worker.
#[derive(Clone)]
pub struct ManualTransport {
    worker: Rc<RefCell<Worker>>,
    state: Rc<RefCell<ManualState>>,
}

impl ManualTransport {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            worker: Rc::new(RefCell::new(Worker::new(config))),
            state: Rc::new(RefCell::new(ManualState::default())),
        }
    }

    /// Zero gravity, handy for tests that place bodies by hand
    pub fn weightless() -> Self {
        Self::new(PhysicsConfig::default().with_gravity(Vec3::ZERO))
    }

    /// Deliver queued requests, then advance by `elapsed` seconds
    ///
    /// Returns the number of events produced.
    pub fn step(&self, elapsed: f32) -> usize {
        let requests: Vec<WorkerRequest> = self.state.borrow_mut().requests.drain(..).collect();
        let mut worker = self.worker.borrow_mut();
        let mut produced: Vec<WorkerEvent> = requests
            .into_iter()
            .filter_map(|request| worker.handle_or_report(request))
            .collect();
        produced.extend(worker.advance(elapsed));
        let count = produced.len();
        self.state.borrow_mut().events.extend(produced);
        count
    }

    /// Queue an event as if the worker had sent it
    pub fn inject(&self, event: WorkerEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Requests sent so far, delivered or not
    pub fn sent(&self) -> usize {
        self.state.borrow().sent
    }

    /// Requests waiting for the next step
    pub fn pending(&self) -> Vec<WorkerRequest> {
        self.state.borrow().requests.iter().cloned().collect()
    }

    pub fn worker(&self) -> std::cell::Ref<'_, Worker> {
        self.worker.borrow()
    }
}

impl Transport for ManualTransport {
    fn send(&self, request: WorkerRequest) -> Result<(), PhysicsError> {
        let mut state = self.state.borrow_mut();
        state.sent += 1;
        state.requests.push_back(request);
        Ok(())
    }

    fn try_recv(&self) -> Option<WorkerEvent> {
        self.state.borrow_mut().events.pop_front()
    }
}
