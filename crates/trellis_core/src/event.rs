//! Pointer event types
//!
//! Native input arrives as a [`NativePointerEvent`] with an explicit,
//! allow-listed field set. Handlers receive a [`ThreeEvent`]: the native
//! fields plus the intersection being dispatched and the picking context.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use trellis_math::{Ray, Vec2, Vec3};
use crate::graph::NodeKey;
use crate::raycast::Intersection;

/// Pointer event kinds understood by the event manager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    ContextMenu,
    DoubleClick,
    PointerDown,
    PointerUp,
    #[default]
    PointerMove,
    PointerOver,
    PointerOut,
    PointerEnter,
    PointerLeave,
    PointerCancel,
    LostPointerCapture,
    Wheel,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::Click,
        EventKind::ContextMenu,
        EventKind::DoubleClick,
        EventKind::PointerDown,
        EventKind::PointerUp,
        EventKind::PointerMove,
        EventKind::PointerOver,
        EventKind::PointerOut,
        EventKind::PointerEnter,
        EventKind::PointerLeave,
        EventKind::PointerCancel,
        EventKind::LostPointerCapture,
        EventKind::Wheel,
    ];

    /// DOM event name
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::ContextMenu => "contextmenu",
            EventKind::DoubleClick => "dblclick",
            EventKind::PointerDown => "pointerdown",
            EventKind::PointerUp => "pointerup",
            EventKind::PointerMove => "pointermove",
            EventKind::PointerOver => "pointerover",
            EventKind::PointerOut => "pointerout",
            EventKind::PointerEnter => "pointerenter",
            EventKind::PointerLeave => "pointerleave",
            EventKind::PointerCancel => "pointercancel",
            EventKind::LostPointerCapture => "lostpointercapture",
            EventKind::Wheel => "wheel",
        }
    }

    /// Click-like events dispatch only to objects hit on pointer down
    pub fn is_click(&self) -> bool {
        matches!(self, EventKind::Click | EventKind::ContextMenu | EventKind::DoubleClick)
    }

    /// Hover transitions synthesized from pointer moves
    pub fn is_hover(&self) -> bool {
        matches!(
            self,
            EventKind::PointerOver | EventKind::PointerOut | EventKind::PointerEnter | EventKind::PointerLeave
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .find(|k| k.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown event '{}'", s))
    }
}

/// Which coordinate pair of the native event is used for picking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPrefix {
    #[default]
    Offset,
    Client,
    Page,
    Layer,
    Screen,
}

impl FromStr for PointerPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offset" => Ok(PointerPrefix::Offset),
            "client" => Ok(PointerPrefix::Client),
            "page" => Ok(PointerPrefix::Page),
            "layer" => Ok(PointerPrefix::Layer),
            "screen" => Ok(PointerPrefix::Screen),
            other => Err(format!("unknown pointer prefix '{}'", other)),
        }
    }
}

/// Keyboard modifier state at the time of the event
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

/// A platform pointer event reduced to the fields the event manager reads
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NativePointerEvent {
    pub kind: EventKind,
    /// `None` for events without a pointer id (click, wheel)
    pub pointer_id: Option<i32>,
    pub offset: Vec2,
    pub client: Vec2,
    pub page: Vec2,
    pub layer: Vec2,
    pub screen: Vec2,
    pub button: i16,
    pub buttons: u16,
    pub wheel_delta: Vec2,
    pub modifiers: Modifiers,
    /// Milliseconds since an arbitrary epoch
    pub timestamp: f64,
}

impl NativePointerEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, ..Default::default() }
    }

    /// Set every coordinate pair to the same position
    pub fn at(mut self, x: f32, y: f32) -> Self {
        let p = Vec2::new(x, y);
        self.offset = p;
        self.client = p;
        self.page = p;
        self.layer = p;
        self.screen = p;
        self
    }

    pub fn with_pointer_id(mut self, id: i32) -> Self {
        self.pointer_id = Some(id);
        self
    }

    pub fn with_button(mut self, button: i16) -> Self {
        self.button = button;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Coordinates selected by `prefix`
    pub fn coords(&self, prefix: PointerPrefix) -> Vec2 {
        match prefix {
            PointerPrefix::Offset => self.offset,
            PointerPrefix::Client => self.client,
            PointerPrefix::Page => self.page,
            PointerPrefix::Layer => self.layer,
            PointerPrefix::Screen => self.screen,
        }
    }
}

/// The platform element that owns pointer capture
pub trait PointerTarget {
    fn set_pointer_capture(&self, pointer_id: i32);
    fn release_pointer_capture(&self, pointer_id: i32);
}

/// Target for headless use; capture requests are only logged
#[derive(Debug, Default)]
pub struct NullPointerTarget;

impl PointerTarget for NullPointerTarget {
    fn set_pointer_capture(&self, pointer_id: i32) {
        log::trace!("Pointer {} captured", pointer_id);
    }

    fn release_pointer_capture(&self, pointer_id: i32) {
        log::trace!("Pointer {} released", pointer_id);
    }
}

/// Requests a handler made while processing an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventRequest {
    StopPropagation,
    SetPointerCapture(i32),
    ReleasePointerCapture(i32),
}

/// Event delivered to a handler
pub struct ThreeEvent<'a> {
    pub kind: EventKind,
    /// The intersection being dispatched; `hit.event_object` is the handler owner
    pub hit: Intersection,
    /// Every intersection found for this native event
    pub intersections: &'a [Intersection],
    pub native: &'a NativePointerEvent,
    /// Normalized device coordinates of the pointer
    pub pointer: Vec2,
    /// Pixel distance travelled since pointer down
    pub delta: f32,
    pub ray: Ray,
    /// Pointer position unprojected onto the camera near plane
    pub unprojected_point: Vec3,
    pub camera: Option<NodeKey>,
    /// Whether propagation had been stopped before this handler ran
    pub stopped: bool,
    captured: bool,
    requests: Vec<EventRequest>,
}

impl<'a> ThreeEvent<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: EventKind,
        hit: Intersection,
        intersections: &'a [Intersection],
        native: &'a NativePointerEvent,
        pointer: Vec2,
        delta: f32,
        ray: Ray,
        unprojected_point: Vec3,
        camera: Option<NodeKey>,
        stopped: bool,
        captured: bool,
    ) -> Self {
        Self {
            kind,
            hit,
            intersections,
            native,
            pointer,
            delta,
            ray,
            unprojected_point,
            camera,
            stopped,
            captured,
            requests: Vec::new(),
        }
    }

    /// The object that was actually intersected
    pub fn object(&self) -> NodeKey {
        self.hit.object
    }

    /// The object whose handler is running
    pub fn event_object(&self) -> NodeKey {
        self.hit.event_object
    }

    pub fn distance(&self) -> f32 {
        self.hit.distance
    }

    pub fn point(&self) -> Vec3 {
        self.hit.point
    }

    pub fn pointer_id(&self) -> Option<i32> {
        self.native.pointer_id
    }

    /// Stop the event from reaching ancestors and farther hits
    ///
    /// Rejected while another object holds capture on this pointer.
    pub fn stop_propagation(&mut self) {
        self.requests.push(EventRequest::StopPropagation);
    }

    /// Route every later event for this pointer to the event object
    pub fn set_pointer_capture(&mut self) {
        if let Some(id) = self.native.pointer_id {
            self.requests.push(EventRequest::SetPointerCapture(id));
            self.captured = true;
        }
    }

    pub fn release_pointer_capture(&mut self) {
        if let Some(id) = self.native.pointer_id {
            self.requests.push(EventRequest::ReleasePointerCapture(id));
            self.captured = false;
        }
    }

    /// Whether the event object holds capture for this pointer
    pub fn has_pointer_capture(&self) -> bool {
        self.captured
    }

    /// Take the requests made by the handler, in call order
    pub fn take_requests(&mut self) -> Vec<EventRequest> {
        std::mem::take(&mut self.requests)
    }
}

/// Handler for a dispatched pointer event
pub type EventHandler = Rc<dyn Fn(&mut ThreeEvent<'_>)>;

/// Handler for clicks that hit nothing owned by the object
pub type MissedHandler = Rc<dyn Fn(&NativePointerEvent)>;

/// Event handlers registered on one node
#[derive(Clone, Default)]
pub struct Handlers {
    events: HashMap<EventKind, EventHandler>,
    missed: Option<MissedHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`, replacing any previous one
    pub fn on(mut self, kind: EventKind, handler: impl Fn(&mut ThreeEvent<'_>) + 'static) -> Self {
        self.events.insert(kind, Rc::new(handler));
        self
    }

    pub fn on_missed(mut self, handler: impl Fn(&NativePointerEvent) + 'static) -> Self {
        self.missed = Some(Rc::new(handler));
        self
    }

    pub fn get(&self, kind: EventKind) -> Option<EventHandler> {
        self.events.get(&kind).cloned()
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.events.contains_key(&kind)
    }

    pub fn missed(&self) -> Option<MissedHandler> {
        self.missed.clone()
    }

    /// Number of registered handlers, the missed handler included
    pub fn len(&self) -> usize {
        self.events.len() + usize::from(self.missed.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both sets hold the same handler instances
    pub fn same_as(&self, other: &Handlers) -> bool {
        let missed_same = match (&self.missed, &other.missed) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        missed_same
            && self.events.len() == other.events.len()
            && self
                .events
                .iter()
                .all(|(k, a)| other.events.get(k).is_some_and(|b| Rc::ptr_eq(a, b)))
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.events.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("Handlers")
            .field("events", &kinds)
            .field("missed", &self.missed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_roundtrip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.name().parse::<EventKind>().unwrap(), kind);
        }
        assert!("pointerwobble".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_click_and_hover_classes() {
        assert!(EventKind::DoubleClick.is_click());
        assert!(!EventKind::PointerUp.is_click());
        assert!(EventKind::PointerEnter.is_hover());
        assert!(!EventKind::PointerMove.is_hover());
    }

    #[test]
    fn test_pointer_prefix_selects_coords() {
        let mut native = NativePointerEvent::new(EventKind::PointerMove);
        native.offset = Vec2::new(1.0, 2.0);
        native.client = Vec2::new(3.0, 4.0);
        assert_eq!(native.coords(PointerPrefix::Offset), Vec2::new(1.0, 2.0));
        assert_eq!(native.coords(PointerPrefix::Client), Vec2::new(3.0, 4.0));
        assert_eq!("screen".parse::<PointerPrefix>().unwrap(), PointerPrefix::Screen);
        assert!("window".parse::<PointerPrefix>().is_err());
    }

    #[test]
    fn test_handlers_count_and_identity() {
        let handlers = Handlers::new()
            .on(EventKind::Click, |_| {})
            .on(EventKind::PointerOver, |_| {})
            .on_missed(|_| {});
        assert_eq!(handlers.len(), 3);
        assert!(handlers.has(EventKind::Click));
        assert!(handlers.same_as(&handlers.clone()));

        let other = Handlers::new().on(EventKind::Click, |_| {});
        assert!(!handlers.same_as(&other));
    }

    #[test]
    fn test_capture_requests_need_pointer_id() {
        let native = NativePointerEvent::new(EventKind::PointerDown);
        let hit = Intersection::new(NodeKey::default(), 1.0, Vec3::ZERO);
        let mut event = ThreeEvent::new(
            EventKind::PointerDown, hit, &[], &native, Vec2::ZERO, 0.0,
            Ray::default(), Vec3::ZERO, None, false, false,
        );
        event.set_pointer_capture();
        assert!(!event.has_pointer_capture());
        assert!(event.take_requests().is_empty());

        let native = NativePointerEvent::new(EventKind::PointerDown).with_pointer_id(1);
        let mut event = ThreeEvent::new(
            EventKind::PointerDown, hit, &[], &native, Vec2::ZERO, 0.0,
            Ray::default(), Vec3::ZERO, None, false, false,
        );
        event.set_pointer_capture();
        event.stop_propagation();
        assert!(event.has_pointer_capture());
        assert_eq!(
            event.take_requests(),
            vec![EventRequest::SetPointerCapture(1), EventRequest::StopPropagation]
        );
    }
}
