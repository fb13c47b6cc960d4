//! Embedded-engine bridge.
//!
//! The bridge lets a foreground UI drive a third-party rendering engine without blocking its own
//! draw loop. Every engine instance is wrapped in a [`Surface`], which pairs it with an
//! [`InputQueue`] and a [`FrameBuffer`]. Surfaces are owned by a [`SurfaceRegistry`], which in
//! turn owns the single pump thread that drives the engine's message loop and forwards queued
//! input.
//!
//! ```no_run
//! use std::sync::Arc;
//! use surface_bridge::{InputEvent, NullAdapter, SurfaceRegistry};
//!
//! let registry = SurfaceRegistry::start(Arc::new(NullAdapter::new()), None).unwrap();
//! let surface = registry.create_surface(400, 600, "about:blank").unwrap();
//!
//! surface.enqueue(InputEvent::mouse_move(10, 20));
//!
//! // On every UI tick
//! if surface.needs_update() {
//!     let frame = surface.acquire_frame();
//!     assert_eq!((frame.width(), frame.height()), (400, 600));
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod errors;
pub mod events;
pub mod frame;
pub mod input;
pub mod pump;
pub mod registry;
pub mod surface;

pub use adapter::null::NullAdapter;
pub use adapter::{AdapterCapabilities, EngineAdapter, EngineClient, InstanceHandle, RawPixelFormat};
pub use config::{BridgeConfig, BridgeConfigError, QueuePolicy};
pub use errors::BridgeError;
pub use events::{MediaState, Modifiers, MouseButton, SurfaceEvent};
pub use frame::{Frame, FrameBuffer, PaintOutcome};
pub use input::queue::{Admission, InputQueue};
pub use input::{EventClass, InputEvent, InputKind};
pub use registry::SurfaceRegistry;
pub use surface::{Surface, SurfaceId, SurfaceState};

/// Default capacity of the surface event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;
