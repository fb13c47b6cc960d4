//! Bridge event types.
//!
//! This module defines the small input vocabulary shared by the UI and the engine adapters, and
//! the events the bridge broadcasts to observers of the surface lifecycle.
//!
//! # Main Types
//!
//! - [`MouseButton`]: Represents mouse buttons (left, middle, right).
//! - [`Modifiers`]: Keyboard modifiers (Shift, Control, Alt, Meta).
//! - [`MediaState`]: Playback state of the media element a page is playing.
//! - [`SurfaceEvent`]: Events emitted by the registry and its surfaces, such as lifecycle
//!   changes, load progress and navigation failures.

use crate::engine::surface::SurfaceId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Represents a mouse button that can be pressed or released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Left mouse button pressed (or depressed)
    Left,
    /// Middle mouse button pressed (or depressed)
    Middle,
    /// Right mouse button pressed (or depressed)
    Right,
}

impl MouseButton {
    /// Maps the conventional 1-based toolkit button number (1 = left, 2 = middle, 3 = right).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(MouseButton::Left),
            2 => Some(MouseButton::Middle),
            3 => Some(MouseButton::Right),
            _ => None,
        }
    }
}

impl Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "Left"),
            MouseButton::Middle => write!(f, "Middle"),
            MouseButton::Right => write!(f, "Right"),
        }
    }
}

bitflags! {
    #[derive(Default, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT   = 0b0001;
        const CONTROL = 0b0010;
        const ALT     = 0b0100;
        const META    = 0b1000;
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(Modifiers, &str); 4] = [
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::CONTROL, "Control"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::META, "Meta"),
        ];

        let parts: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if parts.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// Playback state of the media a page is playing, as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    pub playing: bool,
    pub title: String,
    pub artist: String,
    /// Length in seconds, zero when unknown
    pub duration: f64,
    /// Playback position in seconds
    pub current_time: f64,
}

/// Events broadcast by a [`SurfaceRegistry`](crate::SurfaceRegistry).
///
/// Observers subscribe through [`SurfaceRegistry::subscribe_events`](crate::SurfaceRegistry::subscribe_events).
/// A slow observer may miss events (the bus is a bounded broadcast channel), but it can never
/// stall the pump thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    // ****************************************
    // ** Surface lifecycle
    /// New surface created and registered
    SurfaceCreated { surface_id: SurfaceId, url: String },
    /// Surface has been closed and disposed
    SurfaceClosed { surface_id: SurfaceId },
    /// The active surface has changed (None when the last surface is closed)
    ActiveChanged { surface_id: Option<SurfaceId> },
    /// Surface dimensions have been confirmed by the engine
    Resized { surface_id: SurfaceId, width: u32, height: u32 },

    // ****************************************
    // ** Navigation
    /// Navigation to a URL has failed before reaching the engine (incorrect URL etc.)
    NavigationFailed { surface_id: SurfaceId, url: String, error: String },
    /// Loading of a document started
    LoadStarted { surface_id: SurfaceId, url: String },
    /// Loading of a document has finished
    LoadFinished { surface_id: SurfaceId, url: String, title: String, http_status: i32 },
    /// Loading has failed
    LoadFailed { surface_id: SurfaceId, url: String, error: String },

    // ****************************************
    // ** Surface state
    /// Title of the document has changed
    TitleChanged { surface_id: SurfaceId, title: String },
    /// Address of the document has changed
    AddressChanged { surface_id: SurfaceId, url: String },
    /// An editable element gained or lost focus
    TextFocusChanged { surface_id: SurfaceId, focused: bool },
    /// The selected text of the document has changed (empty when nothing is selected)
    SelectionChanged { surface_id: SurfaceId, text: String },
    /// Media playback started, stopped or changed track
    MediaChanged { surface_id: SurfaceId, media: MediaState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mousebutton_display() {
        assert_eq!(MouseButton::Left.to_string(), "Left");
        assert_eq!(MouseButton::Middle.to_string(), "Middle");
        assert_eq!(MouseButton::Right.to_string(), "Right");
    }

    #[test]
    fn mousebutton_from_toolkit_code() {
        assert_eq!(MouseButton::from_code(1), Some(MouseButton::Left));
        assert_eq!(MouseButton::from_code(2), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_code(3), Some(MouseButton::Right));
        assert_eq!(MouseButton::from_code(0), None);
        assert_eq!(MouseButton::from_code(8), None);
    }

    #[test]
    fn modifiers_default_is_empty() {
        let m = Modifiers::default();
        assert!(m.is_empty());
        assert_eq!(m.to_string(), "None");
    }

    #[test]
    fn modifiers_display_combo_in_order() {
        let all = Modifiers::all();
        assert_eq!(all.to_string(), "Shift+Control+Alt+Meta");

        let some = Modifiers::META | Modifiers::SHIFT;
        assert_eq!(some.to_string(), "Shift+Meta");
        assert_eq!(Modifiers::CONTROL.to_string(), "Control");
    }

    #[test]
    fn surface_events_compare_by_value() {
        let id = SurfaceId::new();
        let a = SurfaceEvent::LoadStarted { surface_id: id, url: "https://example.org/".into() };
        assert_eq!(a.clone(), a);
        assert_ne!(a, SurfaceEvent::SurfaceClosed { surface_id: id });
        assert!(format!("{a:?}").contains("LoadStarted"));
    }
}
