//! Core types for trellis
//!
//! This crate binds declarative element trees to a retained-mode scene graph:
//!
//! - [`SceneGraph`] - Generational arena of [`SceneNode`]s
//! - [`InstanceRegistry`] - Per-node metadata ([`LocalState`])
//! - [`Store`] - Per-root observable state plus non-observable bookkeeping
//! - [`Reconciler`] - Applies [`Element`] trees to the graph
//! - [`Raycaster`] - Camera ray picking
//! - [`HostAdapter`] - Lifecycle hooks supplied by the UI host
//! - [`SceneTemplate`] - RON-loadable element trees
//! - [`Root`] - One mount: graph, registry and store

mod attach;
mod catalogue;
mod error;
mod graph;
mod host;
pub mod id;
mod node;
pub mod path;
pub mod reactive;
mod raycast;
mod reconciler;
mod registry;
mod renderer;
mod root;
mod store;
mod template;
mod value;
pub mod event;

pub use attach::{Attach, AttachFn, Attached, DetachFn};
pub use catalogue::{Catalogue, Constructor};
pub use error::{CoreError, FrameError, RenderError};
pub use event::{
    EventHandler, EventKind, EventRequest, Handlers, MissedHandler, Modifiers, NativePointerEvent,
    NullPointerTarget, PointerPrefix, PointerTarget, ThreeEvent,
};
pub use graph::{GraphStats, NodeKey, SceneGraph};
pub use host::{FrameHost, HostAdapter};
pub use node::{Camera, LightKind, NodeKind, Projection, SceneNode, Shape};
pub use raycast::{HitKey, Intersection, Raycaster};
pub use reactive::{batch, ReactiveCell};
pub use reconciler::{Element, ElementType, Reconciler, Shared};
pub use registry::{InstanceRegistry, LocalState};
pub use renderer::{HeadlessRenderer, Renderer, RendererHandle};
pub use root::{CameraOptions, Root, RootConfig};
pub use store::{
    CaptureRecord, Clock, DprRange, EventSettings, FrameCallback, FrameContext, Frameloop, Internal,
    Performance, Selection, Size, Store, StoreFields, StoreState, SubscriptionId, Viewport, WeakStore,
    DEFAULT_CLICK_THRESHOLD,
};
pub use template::{ElementTemplate, SceneTemplate, TemplateError};
pub use value::{Color, Props, Value};

// Re-export commonly used math types for convenience
pub use trellis_math::{Quat, Ray, Vec2, Vec3};
