//! Test doubles for the adapter seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use anyhow::{anyhow, bail, Result};
use url::Url;

use crate::engine::adapter::{
    AdapterCapabilities, EngineAdapter, EngineClient, InstanceHandle, RawPixelFormat,
};
use crate::engine::events::{Modifiers, MouseButton};
use crate::engine::input::InputKind;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a [`RecordingAdapter`] has been asked to do.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Create { url: String, width: u32, height: u32 },
    Resize { handle: InstanceHandle, width: u32, height: u32 },
    Navigate { handle: InstanceHandle, url: String },
    LoadContent { handle: InstanceHandle, html: String },
    Input { handle: InstanceHandle, kind: InputKind, modifiers: Modifiers },
    Reload { handle: InstanceHandle, ignore_cache: bool },
    GoBack { handle: InstanceHandle },
    SetFrameRate { handle: InstanceHandle, fps: u32 },
    ExecuteScript { handle: InstanceHandle, script: String },
    Dispose { handle: InstanceHandle },
}

/// Adapter that records every call and can be told to fail.
pub(crate) struct RecordingAdapter {
    calls: Mutex<Vec<Call>>,
    clients: Mutex<HashMap<InstanceHandle, Arc<dyn EngineClient>>>,
    threads: Mutex<Vec<ThreadId>>,
    next_handle: AtomicU64,
    pumps: AtomicUsize,
    moves_since_pump: AtomicUsize,
    max_moves_per_pump: AtomicUsize,
    capabilities: AdapterCapabilities,
    pub create_delay_ms: AtomicU64,
    pub fail_init: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_resize: AtomicBool,
    pub fail_pump: AtomicBool,
    pub can_go_back: AtomicBool,
    /// Name of an input kind whose dispatch returns an error
    pub fail_input: Mutex<Option<&'static str>>,
    /// Name of an input kind whose dispatch panics
    pub panic_input: Mutex<Option<&'static str>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::with_capabilities(AdapterCapabilities::all())
    }

    pub fn with_capabilities(capabilities: AdapterCapabilities) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            clients: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            pumps: AtomicUsize::new(0),
            moves_since_pump: AtomicUsize::new(0),
            max_moves_per_pump: AtomicUsize::new(0),
            capabilities,
            create_delay_ms: AtomicU64::new(0),
            fail_init: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_resize: AtomicBool::new(false),
            fail_pump: AtomicBool::new(false),
            can_go_back: AtomicBool::new(false),
            fail_input: Mutex::new(None),
            panic_input: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Input kinds delivered to `handle`, in delivery order.
    pub fn inputs(&self, handle: InstanceHandle) -> Vec<InputKind> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                Call::Input { handle: h, kind, .. } if *h == handle => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn disposed(&self) -> Vec<InstanceHandle> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                Call::Dispose { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn client(&self, handle: InstanceHandle) -> Option<Arc<dyn EngineClient>> {
        lock(&self.clients).get(&handle).cloned()
    }

    pub fn pump_count(&self) -> usize {
        self.pumps.load(Ordering::SeqCst)
    }

    /// Largest number of pointer-motion events seen between two message loop slices.
    pub fn max_moves_per_pump(&self) -> usize {
        self.max_moves_per_pump.load(Ordering::SeqCst)
    }

    /// Distinct threads that called into the adapter.
    pub fn threads(&self) -> Vec<ThreadId> {
        lock(&self.threads).clone()
    }

    fn touch(&self) {
        let current = std::thread::current().id();
        let mut threads = lock(&self.threads);
        if !threads.contains(&current) {
            threads.push(current);
        }
    }

    fn record(&self, call: Call) {
        self.touch();
        lock(&self.calls).push(call);
    }

    fn input(&self, handle: InstanceHandle, kind: InputKind, modifiers: Modifiers) -> Result<()> {
        self.touch();
        let name = kind.name();
        if *lock(&self.panic_input) == Some(name) {
            panic!("RecordingAdapter: {name} exploded");
        }
        if *lock(&self.fail_input) == Some(name) {
            bail!("RecordingAdapter: {name} rejected");
        }
        if matches!(kind, InputKind::MouseMove { .. }) {
            let moves = self.moves_since_pump.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_moves_per_pump.fetch_max(moves, Ordering::SeqCst);
        }
        self.record(Call::Input { handle, kind, modifiers });
        Ok(())
    }
}

impl EngineAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "RecordingAdapter"
    }

    fn initialize(&self) -> Result<()> {
        self.touch();
        if self.fail_init.load(Ordering::SeqCst) {
            bail!("RecordingAdapter: engine missing");
        }
        Ok(())
    }

    fn capabilities(&self) -> AdapterCapabilities {
        self.capabilities
    }

    fn pixel_format(&self) -> RawPixelFormat {
        RawPixelFormat::Bgra8
    }

    fn create_instance(
        &self,
        url: &Url,
        width: u32,
        height: u32,
        client: Arc<dyn EngineClient>,
    ) -> Result<InstanceHandle> {
        self.record(Call::Create { url: url.to_string(), width, height });
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay));
        }
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("RecordingAdapter: refusing to create {url}");
        }
        let handle = InstanceHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock(&self.clients).insert(handle, client);
        Ok(handle)
    }

    fn resize(&self, handle: InstanceHandle, width: u32, height: u32) -> Result<()> {
        self.record(Call::Resize { handle, width, height });
        if self.fail_resize.load(Ordering::SeqCst) {
            bail!("RecordingAdapter: resize to {width}x{height} rejected");
        }
        Ok(())
    }

    fn navigate(&self, handle: InstanceHandle, url: &Url) -> Result<()> {
        self.record(Call::Navigate { handle, url: url.to_string() });
        Ok(())
    }

    fn dispatch_mouse_press(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        button: MouseButton,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::MousePress { x, y, button }, modifiers)
    }

    fn dispatch_mouse_release(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        button: MouseButton,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::MouseRelease { x, y, button }, modifiers)
    }

    fn dispatch_mouse_move(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::MouseMove { x, y }, modifiers)
    }

    fn dispatch_mouse_wheel(
        &self,
        handle: InstanceHandle,
        x: i32,
        y: i32,
        delta: f64,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::MouseWheel { x, y, delta }, modifiers)
    }

    fn dispatch_key_press(
        &self,
        handle: InstanceHandle,
        code: u32,
        ch: char,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::KeyPress { code, ch, modifiers }, modifiers)
    }

    fn dispatch_key_release(
        &self,
        handle: InstanceHandle,
        code: u32,
        ch: char,
        modifiers: Modifiers,
    ) -> Result<()> {
        self.input(handle, InputKind::KeyRelease { code, ch, modifiers }, modifiers)
    }

    fn pump_message_loop(&self) -> Result<()> {
        self.touch();
        self.pumps.fetch_add(1, Ordering::SeqCst);
        self.moves_since_pump.store(0, Ordering::SeqCst);
        if self.fail_pump.load(Ordering::SeqCst) {
            return Err(anyhow!("RecordingAdapter: message loop hiccup"));
        }
        Ok(())
    }

    fn dispose(&self, handle: InstanceHandle) -> Result<()> {
        self.record(Call::Dispose { handle });
        lock(&self.clients).remove(&handle);
        Ok(())
    }

    fn reload(&self, handle: InstanceHandle, ignore_cache: bool) -> Result<()> {
        self.record(Call::Reload { handle, ignore_cache });
        Ok(())
    }

    fn can_go_back(&self, _handle: InstanceHandle) -> bool {
        self.touch();
        self.can_go_back.load(Ordering::SeqCst)
    }

    fn go_back(&self, handle: InstanceHandle) -> Result<()> {
        self.record(Call::GoBack { handle });
        Ok(())
    }

    fn set_frame_rate(&self, handle: InstanceHandle, fps: u32) -> Result<()> {
        self.record(Call::SetFrameRate { handle, fps });
        Ok(())
    }

    fn execute_script(&self, handle: InstanceHandle, script: &str) -> Result<()> {
        self.record(Call::ExecuteScript { handle, script: script.to_string() });
        Ok(())
    }

    fn load_content(&self, handle: InstanceHandle, html: &str, _base_url: &Url) -> Result<()> {
        self.record(Call::LoadContent { handle, html: html.to_string() });
        Ok(())
    }
}

/// Client that records the callbacks it receives.
#[derive(Default)]
pub(crate) struct RecordingClient {
    paints: Mutex<Vec<(Vec<u8>, u32, u32)>>,
    loads_ended: Mutex<Vec<(String, i32)>>,
}

impl RecordingClient {
    pub fn paints(&self) -> Vec<(Vec<u8>, u32, u32)> {
        lock(&self.paints).clone()
    }

    pub fn loads_ended(&self) -> Vec<(String, i32)> {
        lock(&self.loads_ended).clone()
    }
}

impl EngineClient for RecordingClient {
    fn on_paint(&self, buffer: &[u8], width: u32, height: u32, _popup: bool) {
        lock(&self.paints).push((buffer.to_vec(), width, height));
    }

    fn on_load_start(&self, _url: &str) {}

    fn on_load_end(&self, url: &str, http_status: i32) {
        lock(&self.loads_ended).push((url.to_string(), http_status));
    }

    fn on_load_error(&self, _url: &str, _error: &str) {}
    fn on_title_changed(&self, _title: &str) {}
    fn on_address_changed(&self, _url: &str) {}
    fn on_text_focus_changed(&self, _focused: bool) {}
}
