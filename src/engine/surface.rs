//! Surfaces: one engine instance, its input queue and its frame buffer.
//!
//! A [`Surface`] is a cheap, cloneable handle. The registry keeps the authoritative copy; the
//! handle stays usable after the surface is closed, but every operation turns into a no-op.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use crate::engine::adapter::{AdapterCapabilities, EngineClient, InstanceHandle, RawPixelFormat};
use crate::engine::config::BridgeConfig;
use crate::engine::errors::BridgeError;
use crate::engine::events::{MediaState, Modifiers, SurfaceEvent};
use crate::engine::frame::{Frame, FrameBuffer, PaintOutcome};
use crate::engine::input::queue::{Admission, InputQueue};
use crate::engine::input::InputEvent;
use crate::engine::pump::{InstanceOp, PumpCommand};
use crate::engine::registry::RegistryShared;

/// Unique surface identifier
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SurfaceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for SurfaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a surface.
///
/// `Created -> Loading -> Ready` on the first completed load, `Ready <-> Loading` afterwards and
/// any state to `Disposed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurfaceState {
    #[default]
    Created,
    Loading,
    Ready,
    Disposed,
}

/// Keyboard modifier state of a surface, written by the UI thread.
///
/// Every flag is independent, so concurrent updates of different modifiers never lose each
/// other.
#[derive(Debug, Default)]
pub struct ModifierState {
    shift: AtomicBool,
    control: AtomicBool,
    alt: AtomicBool,
    meta: AtomicBool,
}

impl ModifierState {
    fn flags(&self) -> [(Modifiers, &AtomicBool); 4] {
        [
            (Modifiers::SHIFT, &self.shift),
            (Modifiers::CONTROL, &self.control),
            (Modifiers::ALT, &self.alt),
            (Modifiers::META, &self.meta),
        ]
    }

    /// Sets or clears the given modifiers, leaving the others alone.
    pub fn set(&self, modifiers: Modifiers, pressed: bool) {
        for (flag, cell) in self.flags() {
            if modifiers.contains(flag) {
                cell.store(pressed, Ordering::Release);
            }
        }
    }

    /// Replaces the whole modifier state.
    pub fn replace(&self, modifiers: Modifiers) {
        for (flag, cell) in self.flags() {
            cell.store(modifiers.contains(flag), Ordering::Release);
        }
    }

    pub fn snapshot(&self) -> Modifiers {
        self.flags()
            .into_iter()
            .filter(|(_, cell)| cell.load(Ordering::Acquire))
            .fold(Modifiers::empty(), |acc, (flag, _)| acc | flag)
    }
}

#[derive(Debug, Default)]
struct Navigation {
    url: String,
    title: String,
    state: SurfaceState,
    /// State to return to when the current load fails
    before_load: SurfaceState,
}

/// Shared state of a surface. Also the [`EngineClient`] of its engine instance.
pub(crate) struct SurfaceInner {
    id: SurfaceId,
    instance: OnceLock<InstanceHandle>,
    queue: InputQueue,
    frame: FrameBuffer,
    modifiers: ModifierState,
    nav: Mutex<Navigation>,
    text_focus: AtomicBool,
    selection: Mutex<String>,
    media: Mutex<MediaState>,
    disposed: AtomicBool,
    capabilities: AdapterCapabilities,
    resize_lock: Mutex<()>,
    events: broadcast::Sender<SurfaceEvent>,
}

impl SurfaceInner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SurfaceId,
        width: u32,
        height: u32,
        url: &Url,
        config: &BridgeConfig,
        format: RawPixelFormat,
        capabilities: AdapterCapabilities,
        events: broadcast::Sender<SurfaceEvent>,
    ) -> Self {
        Self {
            id,
            instance: OnceLock::new(),
            queue: InputQueue::new(id, config.queue_policy),
            frame: FrameBuffer::new(id, width, height, format, config.min_paint_interval, config.background_color),
            modifiers: ModifierState::default(),
            nav: Mutex::new(Navigation {
                url: url.to_string(),
                ..Default::default()
            }),
            text_focus: AtomicBool::new(false),
            selection: Mutex::new(String::new()),
            media: Mutex::new(MediaState::default()),
            disposed: AtomicBool::new(false),
            capabilities,
            resize_lock: Mutex::new(()),
            events,
        }
    }

    pub(crate) fn id(&self) -> SurfaceId {
        self.id
    }

    pub(crate) fn bind(&self, handle: InstanceHandle) {
        if self.instance.set(handle).is_err() {
            log::warn!("Surface[{}]: already bound to an engine instance", self.id);
        }
    }

    pub(crate) fn instance(&self) -> Option<InstanceHandle> {
        self.instance.get().copied()
    }

    pub(crate) fn queue(&self) -> &InputQueue {
        &self.queue
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Marks the surface disposed. Returns false if it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let discarded = self.queue.close();
        if discarded > 0 {
            log::debug!("Surface[{}]: discarded {} pending input events", self.id, discarded);
        }
        self.nav().state = SurfaceState::Disposed;
        true
    }

    /// Swaps in a blank frame of the confirmed size. Runs on the pump thread right after the
    /// engine accepted the resize, before it gets a chance to paint at the new size.
    pub(crate) fn apply_resize(&self, width: u32, height: u32) {
        if self.is_disposed() {
            return;
        }
        self.frame.resize(width, height);
        log::debug!("Surface[{}]: resized to {}x{}", self.id, width, height);
        self.emit(SurfaceEvent::Resized {
            surface_id: self.id,
            width,
            height,
        });
    }

    fn nav(&self) -> MutexGuard<'_, Navigation> {
        self.nav.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn selection(&self) -> MutexGuard<'_, String> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn media(&self) -> MutexGuard<'_, MediaState> {
        self.media.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_selection(&self, text: &str) {
        {
            let mut selection = self.selection();
            if *selection == text {
                return;
            }
            *selection = text.to_string();
        }
        self.emit(SurfaceEvent::SelectionChanged {
            surface_id: self.id,
            text: text.to_string(),
        });
    }

    fn set_media(&self, media: MediaState) {
        {
            let mut current = self.media();
            if *current == media {
                return;
            }
            *current = media.clone();
        }
        self.emit(SurfaceEvent::MediaChanged {
            surface_id: self.id,
            media,
        });
    }

    fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }
}

impl EngineClient for SurfaceInner {
    fn on_paint(&self, buffer: &[u8], width: u32, height: u32, popup: bool) {
        if self.is_disposed() {
            return;
        }
        if self.frame.paint(buffer, width, height, popup) == PaintOutcome::Throttled {
            log::trace!("Surface[{}]: paint throttled", self.id);
        }
    }

    fn on_load_start(&self, url: &str) {
        if self.is_disposed() {
            return;
        }
        {
            let mut nav = self.nav();
            if nav.state != SurfaceState::Loading {
                nav.before_load = nav.state;
            }
            nav.state = SurfaceState::Loading;
            nav.url = url.to_string();
        }
        log::debug!("Surface[{}]: load started for {}", self.id, url);
        self.emit(SurfaceEvent::LoadStarted {
            surface_id: self.id,
            url: url.to_string(),
        });
        // A new document has neither a selection nor playing media yet
        self.set_selection("");
        self.set_media(MediaState::default());
    }

    fn on_load_end(&self, url: &str, http_status: i32) {
        if self.is_disposed() {
            return;
        }
        let title = {
            let mut nav = self.nav();
            nav.state = SurfaceState::Ready;
            nav.url = url.to_string();
            nav.title.clone()
        };
        log::info!("Surface[{}]: loaded {} (status {})", self.id, url, http_status);
        self.emit(SurfaceEvent::LoadFinished {
            surface_id: self.id,
            url: url.to_string(),
            title,
            http_status,
        });
    }

    fn on_load_error(&self, url: &str, error: &str) {
        if self.is_disposed() {
            return;
        }
        {
            let mut nav = self.nav();
            if nav.state == SurfaceState::Loading {
                nav.state = nav.before_load;
            }
        }
        log::error!("Surface[{}]: failed to load {}: {}", self.id, url, error);
        self.emit(SurfaceEvent::LoadFailed {
            surface_id: self.id,
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    fn on_title_changed(&self, title: &str) {
        if self.is_disposed() {
            return;
        }
        self.nav().title = title.to_string();
        self.emit(SurfaceEvent::TitleChanged {
            surface_id: self.id,
            title: title.to_string(),
        });
    }

    fn on_address_changed(&self, url: &str) {
        if self.is_disposed() {
            return;
        }
        self.nav().url = url.to_string();
        self.emit(SurfaceEvent::AddressChanged {
            surface_id: self.id,
            url: url.to_string(),
        });
    }

    fn on_text_focus_changed(&self, focused: bool) {
        if self.is_disposed() {
            return;
        }
        if self.text_focus.swap(focused, Ordering::AcqRel) != focused {
            self.emit(SurfaceEvent::TextFocusChanged {
                surface_id: self.id,
                focused,
            });
        }
    }

    fn on_selection_changed(&self, text: &str) {
        if self.is_disposed() {
            return;
        }
        self.set_selection(text);
    }

    fn on_media_state_changed(&self, media: &MediaState) {
        if self.is_disposed() {
            return;
        }
        self.set_media(media.clone());
    }
}

/// Handle to a surface owned by a [`SurfaceRegistry`](crate::SurfaceRegistry).
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
    registry: Arc<RegistryShared>,
}

impl Surface {
    pub(crate) fn new(inner: Arc<SurfaceInner>, registry: Arc<RegistryShared>) -> Self {
        Self { inner, registry }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn width(&self) -> u32 {
        self.inner.frame.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.inner.frame.dimensions().1
    }

    /// Last dimensions confirmed by the engine.
    pub fn size(&self) -> (u32, u32) {
        self.inner.frame.dimensions()
    }

    pub fn url(&self) -> String {
        self.inner.nav().url.clone()
    }

    pub fn title(&self) -> String {
        self.inner.nav().title.clone()
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.nav().state
    }

    pub fn is_loading(&self) -> bool {
        self.state() == SurfaceState::Loading
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// True once the engine delivered its first paint.
    pub fn is_ready_to_render(&self) -> bool {
        self.inner.frame.has_painted()
    }

    /// True while an editable element of the page has keyboard focus.
    pub fn has_text_focus(&self) -> bool {
        self.inner.text_focus.load(Ordering::Acquire)
    }

    /// Last selection the engine reported, empty when nothing is selected.
    pub fn selected_text(&self) -> String {
        self.inner.selection().clone()
    }

    pub fn media(&self) -> MediaState {
        self.inner.media().clone()
    }

    pub fn is_media_playing(&self) -> bool {
        self.inner.media().playing
    }

    /// Forgets the media state, e.g. before the host navigates away.
    pub fn reset_media(&self) {
        if !self.is_disposed() {
            self.inner.set_media(MediaState::default());
        }
    }

    pub fn capabilities(&self) -> AdapterCapabilities {
        self.inner.capabilities
    }

    /// Adapter handle of the engine instance behind this surface.
    pub fn instance_handle(&self) -> Option<InstanceHandle> {
        self.inner.instance()
    }

    // ****************************************
    // ** Input

    /// Offers an input event. Never blocks on the engine; the event may be rejected.
    pub fn enqueue(&self, event: impl Into<InputEvent>) -> Admission {
        if self.is_disposed() {
            return Admission::Closed;
        }
        let mut event = event.into();
        event.inherit_modifiers(self.inner.modifiers.snapshot());
        self.inner.queue.enqueue(event)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Sets or clears individual modifiers.
    pub fn set_modifier(&self, modifiers: Modifiers, pressed: bool) {
        self.inner.modifiers.set(modifiers, pressed);
    }

    /// Replaces the whole modifier state.
    pub fn set_modifiers(&self, modifiers: Modifiers) {
        self.inner.modifiers.replace(modifiers);
    }

    pub fn modifiers(&self) -> Modifiers {
        self.inner.modifiers.snapshot()
    }

    // ****************************************
    // ** Frames

    /// Returns true when a new frame is available, and clears the flag.
    pub fn needs_update(&self) -> bool {
        self.inner.frame.needs_update()
    }

    /// Copy of the current frame.
    pub fn acquire_frame(&self) -> Frame {
        self.inner.frame.acquire_frame()
    }

    /// Runs `f` against the current frame without copying it.
    pub fn with_frame<T>(&self, f: impl FnOnce(&Frame) -> T) -> T {
        self.inner.frame.with_frame(f)
    }

    // ****************************************
    // ** Control

    /// Resizes the engine instance and, once the engine accepted it, the frame.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), BridgeError> {
        let Some(handle) = self.live_instance() else {
            return Ok(());
        };
        if width == 0 || height == 0 {
            return Err(BridgeError::InvalidDimensions { width, height });
        }

        let _serial = self.inner.resize_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.frame.dimensions() == (width, height) {
            return Ok(());
        }

        self.registry
            .request(|reply| PumpCommand::Resize {
                surface: self.inner.clone(),
                handle,
                width,
                height,
                reply,
            })?
            .map_err(BridgeError::ResizeFailed)
    }

    /// Navigates to a new URL.
    ///
    /// An unparsable URL never reaches the engine; it is reported as
    /// [`SurfaceEvent::NavigationFailed`] and returned as an error.
    pub fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        if self.is_disposed() {
            return Ok(());
        }
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Surface[{}]: invalid URL '{}': {}", self.id(), url, e);
                self.inner.emit(SurfaceEvent::NavigationFailed {
                    surface_id: self.id(),
                    url: url.to_string(),
                    error: e.to_string(),
                });
                return Err(BridgeError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.inner.set_media(MediaState::default());
        self.instance_op(InstanceOp::Navigate(url));
        Ok(())
    }

    /// Loads an HTML document directly, resolving relative references against `base_url`.
    pub fn load_content(&self, html: &str, base_url: &str) -> Result<(), BridgeError> {
        if self.is_disposed() {
            return Ok(());
        }
        let base_url = Url::parse(base_url).map_err(|e| BridgeError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if self.supports(AdapterCapabilities::LOAD_CONTENT, "load_content") {
            self.instance_op(InstanceOp::LoadContent {
                html: html.to_string(),
                base_url,
            });
        }
        Ok(())
    }

    pub fn reload(&self, ignore_cache: bool) {
        if self.supports(AdapterCapabilities::RELOAD, "reload") {
            self.instance_op(InstanceOp::Reload { ignore_cache });
        }
    }

    pub fn stop_loading(&self) {
        if self.supports(AdapterCapabilities::RELOAD, "stop_loading") {
            self.instance_op(InstanceOp::StopLoading);
        }
    }

    pub fn go_back(&self) {
        if self.supports(AdapterCapabilities::HISTORY, "go_back") {
            self.instance_op(InstanceOp::GoBack);
        }
    }

    pub fn go_forward(&self) {
        if self.supports(AdapterCapabilities::HISTORY, "go_forward") {
            self.instance_op(InstanceOp::GoForward);
        }
    }

    /// Asks the engine whether it can go back. False when unknown.
    pub fn can_go_back(&self) -> bool {
        self.history().0
    }

    /// Asks the engine whether it can go forward. False when unknown.
    pub fn can_go_forward(&self) -> bool {
        self.history().1
    }

    pub fn set_frame_rate(&self, fps: u32) {
        if self.supports(AdapterCapabilities::FRAME_RATE, "set_frame_rate") {
            self.instance_op(InstanceOp::SetFrameRate(fps));
        }
    }

    pub fn execute_script(&self, script: &str) {
        if self.supports(AdapterCapabilities::SCRIPTING, "execute_script") {
            self.instance_op(InstanceOp::ExecuteScript(script.to_string()));
        }
    }

    /// Closes this surface. Same as [`SurfaceRegistry::close_surface`](crate::SurfaceRegistry::close_surface).
    pub fn dispose(&self) {
        self.registry.close(self.id());
    }

    fn live_instance(&self) -> Option<InstanceHandle> {
        if self.is_disposed() {
            return None;
        }
        self.inner.instance()
    }

    fn supports(&self, capability: AdapterCapabilities, op: &str) -> bool {
        if self.inner.capabilities.contains(capability) {
            return true;
        }
        log::debug!("Surface[{}]: adapter does not support {}", self.id(), op);
        false
    }

    fn instance_op(&self, op: InstanceOp) {
        let Some(handle) = self.live_instance() else {
            return;
        };
        self.registry.submit(PumpCommand::Instance {
            surface_id: self.id(),
            handle,
            op,
        });
    }

    fn history(&self) -> (bool, bool) {
        if !self.inner.capabilities.contains(AdapterCapabilities::HISTORY) {
            return (false, false);
        }
        let Some(handle) = self.live_instance() else {
            return (false, false);
        };
        match self.registry.request(|reply| PumpCommand::History { handle, reply }) {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Surface[{}]: history query failed: {}", self.id(), e);
                (false, false)
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id())
            .field("size", &self.size())
            .field("state", &self.state())
            .finish()
    }
}
