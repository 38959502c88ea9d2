//! Frame loop and rendering for trellis
//!
//! ## Key Components
//!
//! - [`scheduler::Scheduler`] - Single global loop ticking every mounted root
//! - [`context::RenderContext`] - WGPU device, queue, and surface management
//! - [`surface::SurfaceRenderer`] - [`trellis_core::Renderer`] drawing into a window
//! - [`batch::SceneBatch`] - Converts a scene graph into one vertex list
//! - [`camera`] - View/projection helpers for camera nodes

pub mod batch;
pub mod camera;
pub mod context;
pub mod geometry;
pub mod pipeline;
pub mod scheduler;
pub mod surface;
pub mod types;

pub use batch::SceneBatch;
pub use context::RenderContext;
pub use pipeline::MeshPipeline;
pub use scheduler::{EffectId, FrameRequester, Phase, RootId, Scheduler, TickError};
pub use surface::SurfaceRenderer;
pub use types::{MeshUniforms, Vertex};
