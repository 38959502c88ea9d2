//! Pointer input for trellis
//!
//! - [`EventManager`] - Raycasts native pointer events and dispatches them to
//!   scene objects with bubbling, hover tracking and pointer capture
//! - [`PointerTranslator`] - Turns winit window events into native pointer events
//! - [`WindowPointerTarget`] - Capture bookkeeping for a window

mod manager;
mod pointer;

pub use manager::EventManager;
pub use pointer::{PointerTranslator, WindowPointerTarget, MOUSE_POINTER_ID};
