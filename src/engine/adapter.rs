//! Engine adapter seam.
//!
//! An [`EngineAdapter`] is the only thing the bridge knows about the embedded engine. Every call
//! into it happens on the pump thread, so implementations may rely on thread affinity even though
//! the trait itself requires `Send + Sync` to be shareable with the registry.
//!
//! Engine callbacks travel the opposite way through [`EngineClient`], which the bridge hands to
//! the adapter for each instance it creates.

pub mod null;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt::Display;
use std::sync::Arc;

use bitflags::bitflags;
use url::Url;

use crate::engine::events::{MediaState, Modifiers, MouseButton};

/// Opaque reference to an engine-side instance, issued by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte order of the raw 32-bit pixels an engine paints with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawPixelFormat {
    /// Blue, green, red, alpha
    #[default]
    Bgra8,
    /// Red, green, blue, alpha
    Rgba8,
}

bitflags! {
    /// Optional operations an adapter actually implements.
    ///
    /// Resolved once when the pump thread starts, so surfaces never have to query the adapter.
    #[derive(Default)]
    pub struct AdapterCapabilities: u8 {
        const HISTORY      = 0b0000_0001;
        const RELOAD       = 0b0000_0010;
        const FRAME_RATE   = 0b0000_0100;
        const SCRIPTING    = 0b0000_1000;
        const LOAD_CONTENT = 0b0001_0000;
    }
}

/// Callbacks from an engine instance into the bridge.
///
/// Invoked by the adapter on the pump thread, typically from within
/// [`EngineAdapter::pump_message_loop`].
pub trait EngineClient: Send + Sync {
    /// New pixels are available. `buffer` holds `width * height` pixels of 4 bytes each, in the
    /// adapter's [`RawPixelFormat`], tightly packed.
    fn on_paint(&self, buffer: &[u8], width: u32, height: u32, popup: bool);
    fn on_load_start(&self, url: &str);
    fn on_load_end(&self, url: &str, http_status: i32);
    fn on_load_error(&self, url: &str, error: &str);
    fn on_title_changed(&self, title: &str);
    fn on_address_changed(&self, url: &str);
    fn on_text_focus_changed(&self, focused: bool);

    /// The selected text changed. Engines that cannot report selections never call this.
    fn on_selection_changed(&self, _text: &str) {}

    /// A media element started, stopped or advanced playback.
    fn on_media_state_changed(&self, _media: &MediaState) {}
}

/// Core engine interface. Calls occur on the pump thread.
pub trait EngineAdapter: Send + Sync {
    /// Human readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Brings up the engine. Called once on the pump thread before anything else. An error marks
    /// the adapter unavailable for the lifetime of the registry.
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Tears the engine down. Called once on the pump thread after the last instance is gone.
    fn shutdown(&self) {}

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities::empty()
    }

    fn pixel_format(&self) -> RawPixelFormat {
        RawPixelFormat::Bgra8
    }

    /// Creates a new engine instance that starts loading `url`.
    fn create_instance(
        &self,
        url: &Url,
        width: u32,
        height: u32,
        client: Arc<dyn EngineClient>,
    ) -> anyhow::Result<InstanceHandle>;

    fn resize(&self, handle: InstanceHandle, width: u32, height: u32) -> anyhow::Result<()>;

    fn navigate(&self, handle: InstanceHandle, url: &Url) -> anyhow::Result<()>;

    fn dispatch_mouse_press(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        button: MouseButton,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    fn dispatch_mouse_release(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        button: MouseButton,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    fn dispatch_mouse_move(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    fn dispatch_mouse_wheel(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        delta: f64,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    fn dispatch_key_press(
        &self,
        handle: InstanceHandle,
        code: u32,
        ch: char,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    fn dispatch_key_release(
        &self,
        handle: InstanceHandle,
        code: u32,
        ch: char,
        modifiers: Modifiers,
    ) -> anyhow::Result<()>;

    /// Performs one slice of the engine's message loop work. Paint and load callbacks are
    /// expected to fire from in here.
    fn pump_message_loop(&self) -> anyhow::Result<()>;

    /// Releases an engine instance. The handle is never used again afterwards.
    fn dispose(&self, handle: InstanceHandle) -> anyhow::Result<()>;

    // ****************************************
    // ** Optional operations, see [`AdapterCapabilities`]

    fn reload(&self, _handle: InstanceHandle, _ignore_cache: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_loading(&self, _handle: InstanceHandle) -> anyhow::Result<()> {
        Ok(())
    }

    fn can_go_back(&self, _handle: InstanceHandle) -> bool {
        false
    }

    fn can_go_forward(&self, _handle: InstanceHandle) -> bool {
        false
    }

    fn go_back(&self, _handle: InstanceHandle) -> anyhow::Result<()> {
        Ok(())
    }

    fn go_forward(&self, _handle: InstanceHandle) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_frame_rate(&self, _handle: InstanceHandle, _fps: u32) -> anyhow::Result<()> {
        Ok(())
    }

    fn execute_script(&self, _handle: InstanceHandle, _script: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn load_content(&self, _handle: InstanceHandle, _html: &str, _base_url: &Url) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("{} cannot load inline content", self.name()))
    }
}

/// Everything the bridge caches about an adapter after initializing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdapterProfile {
    pub name: String,
    pub available: bool,
    pub capabilities: AdapterCapabilities,
    pub pixel_format: RawPixelFormat,
}
