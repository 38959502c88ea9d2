//! trellis - declarative scenes on a retained-mode graph
//!
//! The workspace crates do the heavy lifting; this crate wires them into an
//! application:
//!
//! - [`canvas::Canvas`] - A root with its host, reconciler, pointer events and physics
//! - [`scene_file::SceneFile`] - RON scenes with rigid body bindings
//! - [`config::AppConfig`] - Layered TOML and environment configuration

pub mod canvas;
pub mod config;
pub mod scene_file;

pub use canvas::{Canvas, CanvasError};
pub use config::{AppConfig, ConfigError};
pub use scene_file::{BodyBinding, SceneFile};
