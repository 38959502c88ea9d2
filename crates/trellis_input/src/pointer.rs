//! Window pointer translation
//!
//! winit reports raw cursor motion and button state. The event manager wants
//! DOM-style pointer events, so [`PointerTranslator`] tracks buttons and
//! modifiers and synthesizes click, double click and context menu events on
//! release. Coordinates are logical pixels relative to the window.

use std::cell::RefCell;
use std::collections::HashSet;
use std::time::Instant;

use trellis_core::{EventKind, Modifiers, NativePointerEvent, PointerTarget};
use trellis_math::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Pointer id reported for the system mouse
pub const MOUSE_POINTER_ID: i32 = 1;

/// Two clicks closer than this (ms) form a double click
const DOUBLE_CLICK_INTERVAL: f64 = 500.0;
/// ...and no farther apart than this (px)
const DOUBLE_CLICK_DISTANCE: f32 = 4.0;
/// Pixels scrolled per wheel line
const LINE_HEIGHT: f32 = 40.0;

/// Converts window events into [`NativePointerEvent`]s
pub struct PointerTranslator {
    position: Vec2,
    scale_factor: f32,
    buttons: u16,
    modifiers: Modifiers,
    last_click: Option<(f64, Vec2)>,
    start: Instant,
}

impl Default for PointerTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerTranslator {
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            scale_factor: 1.0,
            buttons: 0,
            modifiers: Modifiers::default(),
            last_click: None,
            start: Instant::now(),
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Last cursor position in logical pixels
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Currently pressed buttons as a DOM `buttons` mask
    pub fn buttons(&self) -> u16 {
        self.buttons
    }

    /// Translate one window event; most events produce nothing
    pub fn translate(&mut self, event: &WindowEvent) -> Vec<NativePointerEvent> {
        let now = self.start.elapsed().as_secs_f64() * 1000.0;
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let x = position.x as f32 / self.scale_factor;
                let y = position.y as f32 / self.scale_factor;
                vec![self.cursor_moved(x, y, now)]
            }
            WindowEvent::CursorLeft { .. } => vec![self.cursor_left(now)],
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_input(*state == ElementState::Pressed, button_index(*button), now)
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(-x * LINE_HEIGHT, -y * LINE_HEIGHT),
                    MouseScrollDelta::PixelDelta(p) => Vec2::new(-p.x as f32, -p.y as f32),
                };
                vec![self.wheel(delta, now)]
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                let state = modifiers.state();
                self.modifiers = Modifiers {
                    alt: state.alt_key(),
                    ctrl: state.control_key(),
                    meta: state.super_key(),
                    shift: state.shift_key(),
                };
                Vec::new()
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = *scale_factor as f32;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    // --- Platform-neutral entry points ---

    pub fn cursor_moved(&mut self, x: f32, y: f32, timestamp: f64) -> NativePointerEvent {
        self.position = Vec2::new(x, y);
        self.event(EventKind::PointerMove, timestamp)
    }

    pub fn cursor_left(&mut self, timestamp: f64) -> NativePointerEvent {
        self.event(EventKind::PointerLeave, timestamp)
    }

    pub fn wheel(&mut self, delta: Vec2, timestamp: f64) -> NativePointerEvent {
        let mut event = self.event(EventKind::Wheel, timestamp);
        event.wheel_delta = delta;
        event
    }

    /// Press or release `button` (DOM numbering: 0 left, 1 middle, 2 right)
    ///
    /// A release also reports the implicit loss of pointer capture, followed
    /// by the click events the release completes.
    pub fn mouse_input(&mut self, pressed: bool, button: i16, timestamp: f64) -> Vec<NativePointerEvent> {
        let mask = button_mask(button);
        if pressed {
            self.buttons |= mask;
            return vec![self.event(EventKind::PointerDown, timestamp).with_button(button)];
        }

        self.buttons &= !mask;
        let mut events = vec![
            self.event(EventKind::PointerUp, timestamp).with_button(button),
            self.event(EventKind::LostPointerCapture, timestamp).with_button(button),
        ];
        match button {
            0 => {
                events.push(self.event(EventKind::Click, timestamp).with_button(button));
                let is_double = self.last_click.is_some_and(|(at, pos)| {
                    timestamp - at <= DOUBLE_CLICK_INTERVAL && pos.distance(self.position) <= DOUBLE_CLICK_DISTANCE
                });
                if is_double {
                    events.push(self.event(EventKind::DoubleClick, timestamp).with_button(button));
                    self.last_click = None;
                } else {
                    self.last_click = Some((timestamp, self.position));
                }
            }
            2 => events.push(self.event(EventKind::ContextMenu, timestamp).with_button(button)),
            _ => {}
        }
        events
    }

    fn event(&self, kind: EventKind, timestamp: f64) -> NativePointerEvent {
        let mut event = NativePointerEvent::new(kind)
            .at(self.position.x, self.position.y)
            .with_timestamp(timestamp);
        event.buttons = self.buttons;
        event.modifiers = self.modifiers;
        // Click-family and wheel events carry no pointer id
        if !kind.is_click() && kind != EventKind::Wheel {
            event = event.with_pointer_id(MOUSE_POINTER_ID);
        }
        event
    }
}

fn button_index(button: MouseButton) -> i16 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::Back => 3,
        MouseButton::Forward => 4,
        MouseButton::Other(n) => n.min(i16::MAX as u16) as i16,
    }
}

/// DOM `buttons` bit for a `button` index
fn button_mask(button: i16) -> u16 {
    match button {
        0 => 1,
        1 => 4,
        2 => 2,
        3 => 8,
        4 => 16,
        _ => 0,
    }
}

/// Pointer capture state of a window
///
/// winit has no capture concept; the window keeps receiving cursor events
/// outside its bounds while a button is held, so capture is bookkeeping only.
#[derive(Debug, Default)]
pub struct WindowPointerTarget {
    captured: RefCell<HashSet<i32>>,
}

impl WindowPointerTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_captured(&self, pointer_id: i32) -> bool {
        self.captured.borrow().contains(&pointer_id)
    }
}

impl PointerTarget for WindowPointerTarget {
    fn set_pointer_capture(&self, pointer_id: i32) {
        log::trace!("Pointer {} captured", pointer_id);
        self.captured.borrow_mut().insert(pointer_id);
    }

    fn release_pointer_capture(&self, pointer_id: i32) {
        log::trace!("Pointer {} released", pointer_id);
        self.captured.borrow_mut().remove(&pointer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(events: &[NativePointerEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_move_carries_position_and_pointer_id() {
        let mut translator = PointerTranslator::new();
        let event = translator.cursor_moved(12.0, 34.0, 5.0);
        assert_eq!(event.kind, EventKind::PointerMove);
        assert_eq!(event.offset, Vec2::new(12.0, 34.0));
        assert_eq!(event.pointer_id, Some(MOUSE_POINTER_ID));
        assert_eq!(event.timestamp, 5.0);
    }

    #[test]
    fn test_release_synthesizes_click() {
        let mut translator = PointerTranslator::new();
        translator.cursor_moved(10.0, 10.0, 0.0);
        let down = translator.mouse_input(true, 0, 1.0);
        assert_eq!(kinds(&down), vec![EventKind::PointerDown]);
        assert_eq!(down[0].buttons, 1);

        let up = translator.mouse_input(false, 0, 2.0);
        assert_eq!(
            kinds(&up),
            vec![EventKind::PointerUp, EventKind::LostPointerCapture, EventKind::Click]
        );
        assert_eq!(translator.buttons(), 0);
        assert_eq!(up[2].pointer_id, None);
    }

    #[test]
    fn test_double_click_needs_quick_nearby_clicks() {
        let mut translator = PointerTranslator::new();
        translator.mouse_input(true, 0, 0.0);
        translator.mouse_input(false, 0, 10.0);
        translator.mouse_input(true, 0, 100.0);
        let second = translator.mouse_input(false, 0, 120.0);
        assert_eq!(second.last().map(|e| e.kind), Some(EventKind::DoubleClick));

        // A third click starts a new pair
        translator.mouse_input(true, 0, 200.0);
        let third = translator.mouse_input(false, 0, 210.0);
        assert_eq!(third.last().map(|e| e.kind), Some(EventKind::Click));

        // Too slow
        translator.mouse_input(true, 0, 2000.0);
        let late = translator.mouse_input(false, 0, 2010.0);
        assert_eq!(late.last().map(|e| e.kind), Some(EventKind::Click));
    }

    #[test]
    fn test_right_button_opens_context_menu() {
        let mut translator = PointerTranslator::new();
        translator.mouse_input(true, 2, 0.0);
        assert_eq!(translator.buttons(), 2);
        let up = translator.mouse_input(false, 2, 1.0);
        assert_eq!(up.last().map(|e| e.kind), Some(EventKind::ContextMenu));
        assert!(!kinds(&up).contains(&EventKind::Click));
    }

    #[test]
    fn test_wheel_and_leave() {
        let mut translator = PointerTranslator::new();
        let wheel = translator.wheel(Vec2::new(0.0, 40.0), 0.0);
        assert_eq!(wheel.kind, EventKind::Wheel);
        assert_eq!(wheel.wheel_delta.y, 40.0);
        assert_eq!(translator.cursor_left(1.0).kind, EventKind::PointerLeave);
    }

    #[test]
    fn test_window_target_tracks_capture() {
        let target = WindowPointerTarget::new();
        target.set_pointer_capture(1);
        assert!(target.is_captured(1));
        target.release_pointer_capture(1);
        assert!(!target.is_captured(1));
    }
}
