use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use url::Url;

use crate::engine::adapter::{
    AdapterCapabilities, EngineAdapter, EngineClient, InstanceHandle, RawPixelFormat,
};
use crate::engine::events::{Modifiers, MouseButton};

/// Null adapter that does not embed any engine.
///
/// Every instance "loads" its URL instantly on the next message loop slice and paints a solid
/// color whenever its size or content changes. Useful for headless runs and for exercising a UI
/// without a real engine.
pub struct NullAdapter {
    fill: u32,
    available: bool,
    next_handle: AtomicU64,
    instances: Mutex<HashMap<InstanceHandle, NullInstance>>,
}

struct NullInstance {
    client: Arc<dyn EngineClient>,
    url: Url,
    width: u32,
    height: u32,
    pending_load: bool,
    needs_paint: bool,
    input_count: u64,
}

/// Work collected under the lock and performed after releasing it.
struct PendingCallbacks {
    client: Arc<dyn EngineClient>,
    load: Option<Url>,
    paint: Option<(u32, u32)>,
}

impl NullAdapter {
    /// Creates a null adapter painting opaque mid grey.
    pub fn new() -> Self {
        Self::with_fill(0xFF80_8080)
    }

    /// Creates a null adapter painting the given packed ARGB color.
    pub fn with_fill(argb: u32) -> Self {
        Self {
            fill: argb,
            available: true,
            next_handle: AtomicU64::new(1),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a null adapter that refuses to initialize.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances().len()
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<InstanceHandle, NullInstance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_instance<T>(&self, handle: InstanceHandle, f: impl FnOnce(&mut NullInstance) -> T) -> Result<T> {
        let mut instances = self.instances();
        let instance = instances
            .get_mut(&handle)
            .ok_or_else(|| anyhow!("NullAdapter: unknown instance {handle}"))?;
        Ok(f(instance))
    }

    fn record_input(&self, handle: InstanceHandle, repaint: bool) -> Result<()> {
        self.with_instance(handle, |i| {
            i.input_count = i.input_count.wrapping_add(1);
            i.needs_paint |= repaint;
        })
    }

    /// Solid frame in BGRA byte order.
    fn solid_frame(&self, width: u32, height: u32) -> Vec<u8> {
        let [a, r, g, b] = self.fill.to_be_bytes();
        [b, g, r, a].repeat(width as usize * height as usize)
    }
}

impl Default for NullAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineAdapter for NullAdapter {
    fn name(&self) -> &str {
        "NullAdapter"
    }

    fn initialize(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(anyhow!("NullAdapter configured as unavailable"))
        }
    }

    fn shutdown(&self) {
        let leaked = self.instances().drain().count();
        if leaked > 0 {
            log::warn!("NullAdapter: {} instance(s) still alive at shutdown", leaked);
        }
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities::RELOAD | AdapterCapabilities::FRAME_RATE
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
        let handle = InstanceHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.instances().insert(
            handle,
            NullInstance {
                client,
                url: url.clone(),
                width,
                height,
                pending_load: true,
                needs_paint: true,
                input_count: 0,
            },
        );
        log::debug!("NullAdapter: created instance {} for {}", handle, url);
        Ok(handle)
    }

    fn resize(&self, handle: InstanceHandle, width: u32, height: u32) -> Result<()> {
        self.with_instance(handle, |i| {
            i.width = width;
            i.height = height;
            i.needs_paint = true;
        })
    }

    fn navigate(&self, handle: InstanceHandle, url: &Url) -> Result<()> {
        self.with_instance(handle, |i| {
            i.url = url.clone();
            i.pending_load = true;
            i.needs_paint = true;
        })
    }

    fn dispatch_mouse_press(
        &self,
        handle: InstanceHandle,
        _x: i32,
        _y: i32,
        _button: MouseButton,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, true)
    }

    fn dispatch_mouse_release(
        &self,
        handle: InstanceHandle,
        _x: i32,
        _y: i32,
        _button: MouseButton,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, false)
    }

    fn dispatch_mouse_move(
        &self,
        handle: InstanceHandle,
        _x: i32,
        _y: i32,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, false)
    }

    fn dispatch_mouse_wheel(
        &self,
        handle: InstanceHandle,
        _x: i32,
        _y: i32,
        _delta: f64,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, true)
    }

    fn dispatch_key_press(
        &self,
        handle: InstanceHandle,
        _code: u32,
        _ch: char,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, true)
    }

    fn dispatch_key_release(
        &self,
        handle: InstanceHandle,
        _code: u32,
        _ch: char,
        _modifiers: Modifiers,
    ) -> Result<()> {
        self.record_input(handle, false)
    }

    fn pump_message_loop(&self) -> Result<()> {
        let pending: Vec<PendingCallbacks> = {
            let mut instances = self.instances();
            instances
                .values_mut()
                .filter(|i| i.pending_load || i.needs_paint)
                .map(|i| {
                    let load = std::mem::take(&mut i.pending_load).then(|| i.url.clone());
                    let paint = std::mem::take(&mut i.needs_paint).then_some((i.width, i.height));
                    PendingCallbacks {
                        client: i.client.clone(),
                        load,
                        paint,
                    }
                })
                .collect()
        };

        for work in pending {
            if let Some(url) = &work.load {
                work.client.on_load_start(url.as_str());
                work.client.on_address_changed(url.as_str());
                work.client.on_title_changed(url.as_str());
                work.client.on_load_end(url.as_str(), 200);
            }
            if let Some((width, height)) = work.paint {
                let pixels = self.solid_frame(width, height);
                work.client.on_paint(&pixels, width, height, false);
            }
        }
        Ok(())
    }

    fn dispose(&self, handle: InstanceHandle) -> Result<()> {
        match self.instances().remove(&handle) {
            Some(instance) => {
                log::debug!("NullAdapter: disposed instance {} after {} input events", handle, instance.input_count);
                Ok(())
            }
            None => Err(anyhow!("NullAdapter: unknown instance {handle}")),
        }
    }

    fn reload(&self, handle: InstanceHandle, _ignore_cache: bool) -> Result<()> {
        self.with_instance(handle, |i| {
            i.pending_load = true;
            i.needs_paint = true;
        })
    }

    fn stop_loading(&self, handle: InstanceHandle) -> Result<()> {
        self.with_instance(handle, |i| i.pending_load = false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::testing::RecordingClient;

    fn url() -> Url {
        Url::parse("https://example.org/").unwrap()
    }

    #[test]
    fn loads_and_paints_on_first_pump() {
        let adapter = NullAdapter::with_fill(0xFF11_2233);
        let client = Arc::new(RecordingClient::default());
        let handle = adapter.create_instance(&url(), 2, 1, client.clone()).unwrap();
        assert_eq!(adapter.instance_count(), 1);

        adapter.pump_message_loop().unwrap();
        assert_eq!(client.loads_ended(), vec![("https://example.org/".to_string(), 200)]);
        let paints = client.paints();
        assert_eq!(paints.len(), 1);
        assert_eq!(paints[0], (vec![0x33, 0x22, 0x11, 0xFF, 0x33, 0x22, 0x11, 0xFF], 2, 1));

        // Nothing changed, nothing happens
        adapter.pump_message_loop().unwrap();
        assert_eq!(client.paints().len(), 1);

        adapter.resize(handle, 1, 1).unwrap();
        adapter.pump_message_loop().unwrap();
        assert_eq!(client.paints().len(), 2);
    }

    #[test]
    fn unknown_handles_are_errors() {
        let adapter = NullAdapter::new();
        let ghost = InstanceHandle::new(42);
        assert!(adapter.resize(ghost, 1, 1).is_err());
        assert!(adapter.dispatch_mouse_move(ghost, 0, 0, Modifiers::empty()).is_err());
        assert!(adapter.dispose(ghost).is_err());
    }

    #[test]
    fn dispose_removes_instance() {
        let adapter = NullAdapter::new();
        let handle = adapter.create_instance(&url(), 4, 4, Arc::new(RecordingClient::default())).unwrap();
        adapter.dispose(handle).unwrap();
        assert_eq!(adapter.instance_count(), 0);
        assert!(adapter.dispose(handle).is_err());
    }

    #[test]
    fn unavailable_adapter_fails_to_initialize() {
        assert!(NullAdapter::new().initialize().is_ok());
        assert!(NullAdapter::unavailable().initialize().is_err());
    }
}
