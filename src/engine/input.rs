//! User input forwarded from the UI thread to an engine instance.
//!
//! Input is captured on the UI thread, admitted into a surface's [`InputQueue`](queue::InputQueue)
//! and dispatched to the engine on the pump thread.

pub mod queue;

use std::fmt::Display;
use std::time::{Duration, Instant};

use crate::engine::events::{Modifiers, MouseButton};

/// Admission class of an input event.
///
/// Only [`EventClass::PointerMotion`] is subject to the soft cap of the input queue, every other
/// class is only bounded by the hard cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    PointerMotion,
    PointerButton,
    Wheel,
    Key,
}

/// The payload of an input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
    /// Mouse button is pressed
    MousePress { x: i32, y: i32, button: MouseButton },
    /// Mouse button is depressed
    MouseRelease { x: i32, y: i32, button: MouseButton },
    /// Mouse moved to new position
    MouseMove { x: i32, y: i32 },
    /// Mouse wheel scrolled by delta
    MouseWheel { x: i32, y: i32, delta: f64 },
    /// Key has been pressed
    KeyPress { code: u32, ch: char, modifiers: Modifiers },
    /// Key has been depressed
    KeyRelease { code: u32, ch: char, modifiers: Modifiers },
}

impl InputKind {
    pub fn class(&self) -> EventClass {
        match self {
            InputKind::MouseMove { .. } => EventClass::PointerMotion,
            InputKind::MousePress { .. } | InputKind::MouseRelease { .. } => EventClass::PointerButton,
            InputKind::MouseWheel { .. } => EventClass::Wheel,
            InputKind::KeyPress { .. } | InputKind::KeyRelease { .. } => EventClass::Key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputKind::MousePress { .. } => "MousePress",
            InputKind::MouseRelease { .. } => "MouseRelease",
            InputKind::MouseMove { .. } => "MouseMove",
            InputKind::MouseWheel { .. } => "MouseWheel",
            InputKind::KeyPress { .. } => "KeyPress",
            InputKind::KeyRelease { .. } => "KeyRelease",
        }
    }
}

impl Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::MousePress { x, y, button } | InputKind::MouseRelease { x, y, button } => {
                write!(f, "{}({}, {}, {})", self.name(), x, y, button)
            }
            InputKind::MouseMove { x, y } => write!(f, "MouseMove({x}, {y})"),
            InputKind::MouseWheel { x, y, delta } => write!(f, "MouseWheel({x}, {y}, {delta})"),
            InputKind::KeyPress { code, modifiers, .. } | InputKind::KeyRelease { code, modifiers, .. } => {
                write!(f, "{}({}, {})", self.name(), code, modifiers)
            }
        }
    }
}

/// A single input event together with its modifier state and timing information.
///
/// Mouse events do not carry modifiers of their own. Unless set explicitly with
/// [`InputEvent::with_modifiers`], they pick up the surface's modifier state at the moment they
/// are enqueued, so a later change of the modifier state never leaks into events that are
/// already waiting in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    kind: InputKind,
    modifiers: Option<Modifiers>,
    captured_at: Option<Instant>,
    enqueued_at: Option<Instant>,
}

impl InputEvent {
    pub fn new(kind: InputKind) -> Self {
        let modifiers = match kind {
            InputKind::KeyPress { modifiers, .. } | InputKind::KeyRelease { modifiers, .. } => Some(modifiers),
            _ => None,
        };

        Self {
            kind,
            modifiers,
            captured_at: None,
            enqueued_at: None,
        }
    }

    pub fn mouse_press(x: i32, y: i32, button: MouseButton) -> Self {
        Self::new(InputKind::MousePress { x, y, button })
    }

    pub fn mouse_release(x: i32, y: i32, button: MouseButton) -> Self {
        Self::new(InputKind::MouseRelease { x, y, button })
    }

    pub fn mouse_move(x: i32, y: i32) -> Self {
        Self::new(InputKind::MouseMove { x, y })
    }

    pub fn mouse_wheel(x: i32, y: i32, delta: f64) -> Self {
        Self::new(InputKind::MouseWheel { x, y, delta })
    }

    pub fn key_press(code: u32, ch: char, modifiers: Modifiers) -> Self {
        Self::new(InputKind::KeyPress { code, ch, modifiers })
    }

    pub fn key_release(code: u32, ch: char, modifiers: Modifiers) -> Self {
        Self::new(InputKind::KeyRelease { code, ch, modifiers })
    }

    /// Overrides the modifier state sent along with this event.
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = Some(modifiers);
        self
    }

    /// Stamps the capture time. Only the first call has an effect.
    pub fn captured(mut self) -> Self {
        self.mark_captured(Instant::now());
        self
    }

    pub fn kind(&self) -> &InputKind {
        &self.kind
    }

    pub fn class(&self) -> EventClass {
        self.kind.class()
    }

    pub fn is_motion(&self) -> bool {
        self.class() == EventClass::PointerMotion
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Modifier state delivered to the engine with this event.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers.unwrap_or_default()
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }

    pub fn enqueued_at(&self) -> Option<Instant> {
        self.enqueued_at
    }

    /// Time spent waiting in the queue, measured up to `now`.
    pub fn queue_latency(&self, now: Instant) -> Option<Duration> {
        self.enqueued_at.map(|t| now.saturating_duration_since(t))
    }

    pub(crate) fn mark_captured(&mut self, at: Instant) {
        self.captured_at.get_or_insert(at);
    }

    pub(crate) fn mark_enqueued(&mut self, at: Instant) {
        self.mark_captured(at);
        self.enqueued_at.get_or_insert(at);
    }

    pub(crate) fn inherit_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers.get_or_insert(modifiers);
    }
}

impl From<InputKind> for InputEvent {
    fn from(kind: InputKind) -> Self {
        InputEvent::new(kind)
    }
}
