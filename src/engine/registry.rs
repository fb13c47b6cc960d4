//! Surface registry: owns all surfaces and the pump thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use tokio::sync::{broadcast, mpsc, oneshot};
use url::Url;

use crate::engine::adapter::{AdapterProfile, EngineAdapter, EngineClient};
use crate::engine::config::BridgeConfig;
use crate::engine::errors::BridgeError;
use crate::engine::events::SurfaceEvent;
use crate::engine::pump::{self, PumpCommand, PumpThread};
use crate::engine::surface::{Surface, SurfaceId, SurfaceInner};

#[derive(Default)]
struct RegistryState {
    surfaces: HashMap<SurfaceId, Arc<SurfaceInner>>,
    active: Option<SurfaceId>,
}

/// State shared between the registry, its surface handles and the pump thread.
pub(crate) struct RegistryShared {
    pub(crate) adapter: Arc<dyn EngineAdapter>,
    pub(crate) config: BridgeConfig,
    state: Mutex<RegistryState>,
    events: broadcast::Sender<SurfaceEvent>,
    commands: mpsc::UnboundedSender<PumpCommand>,
    pump_thread: OnceLock<ThreadId>,
    profile: OnceLock<AdapterProfile>,
    running: AtomicBool,
}

impl RegistryShared {
    fn new(
        adapter: Arc<dyn EngineAdapter>,
        config: BridgeConfig,
        commands: mpsc::UnboundedSender<PumpCommand>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            adapter,
            config,
            state: Mutex::new(RegistryState::default()),
            events,
            commands,
            pump_thread: OnceLock::new(),
            profile: OnceLock::new(),
            running: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn bind_pump_thread(&self) {
        if self.pump_thread.set(thread::current().id()).is_err() {
            log::warn!("Pump thread already bound");
        }
    }

    pub(crate) fn on_pump_thread(&self) -> bool {
        self.pump_thread.get() == Some(&thread::current().id())
    }

    pub(crate) fn set_profile(&self, profile: AdapterProfile) {
        let _ = self.profile.set(profile);
    }

    pub(crate) fn is_available(&self) -> bool {
        self.profile.get().is_some_and(|p| p.available)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn live_surfaces(&self) -> Vec<Arc<SurfaceInner>> {
        self.lock().surfaces.values().cloned().collect()
    }

    fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    /// Runs a command on the pump thread and waits for its reply.
    ///
    /// Called from the pump thread itself, the command runs inline.
    pub(crate) fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PumpCommand,
    ) -> Result<T, BridgeError> {
        let (reply, mut response) = oneshot::channel();
        let command = build(reply);

        if self.on_pump_thread() {
            pump::execute(self.adapter.as_ref(), command);
            return response.try_recv().map_err(|_| BridgeError::PumpStopped);
        }

        if !self.is_running() {
            return Err(BridgeError::PumpStopped);
        }
        self.commands.send(command).map_err(|_| BridgeError::PumpStopped)?;

        pump::wait_reply(response, Some(self.config.request_timeout))
    }

    /// Hands a command to the pump thread without waiting for it.
    pub(crate) fn submit(&self, command: PumpCommand) {
        if self.on_pump_thread() {
            pump::execute(self.adapter.as_ref(), command);
            return;
        }
        if self.commands.send(command).is_err() {
            log::debug!("Pump thread gone, dropping command");
        }
    }

    /// Removes, disposes and releases a surface. Returns false when it was not registered.
    pub(crate) fn close(&self, id: SurfaceId) -> bool {
        let (inner, promoted) = {
            let mut state = self.lock();
            let Some(inner) = state.surfaces.remove(&id) else {
                return false;
            };
            let promoted = if state.active == Some(id) {
                state.active = state.surfaces.keys().next().copied();
                Some(state.active)
            } else {
                None
            };
            (inner, promoted)
        };

        if inner.mark_disposed() {
            if let Some(handle) = inner.instance() {
                self.submit(PumpCommand::Dispose { surface_id: id, handle });
            }
        }

        log::info!("Surface[{}]: closed", id);
        self.emit(SurfaceEvent::SurfaceClosed { surface_id: id });
        if let Some(active) = promoted {
            self.emit(SurfaceEvent::ActiveChanged { surface_id: active });
        }
        true
    }
}

/// Owner of all surfaces and of the pump thread driving their engine.
///
/// Dropping the registry closes every surface, then stops and joins the pump thread.
pub struct SurfaceRegistry {
    shared: Arc<RegistryShared>,
    pump: Option<PumpThread>,
}

impl SurfaceRegistry {
    /// Starts the pump thread and initializes the adapter on it.
    ///
    /// An adapter failing to initialize does not fail the registry. It reports itself as
    /// unavailable and [`create_surface`](Self::create_surface) returns
    /// [`BridgeError::AdapterUnavailable`].
    pub fn start(adapter: Arc<dyn EngineAdapter>, config: Option<BridgeConfig>) -> Result<Self, BridgeError> {
        let config = config.unwrap_or_default();
        config.validate()?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(RegistryShared::new(adapter, config, commands));

        let (pump, profile) = match PumpThread::spawn(shared.clone(), command_rx) {
            Ok(started) => started,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        if profile.available {
            log::info!("Surface registry started with adapter '{}'", profile.name);
        } else {
            log::warn!("Surface registry started without a usable adapter ('{}')", profile.name);
        }

        Ok(Self {
            shared,
            pump: Some(pump),
        })
    }

    /// Creates a new surface showing `initial_url`. The new surface becomes active.
    pub fn create_surface(&self, width: u32, height: u32, initial_url: &str) -> Result<Surface, BridgeError> {
        let profile = self.shared.profile.get().cloned().ok_or(BridgeError::PumpStopped)?;
        if !profile.available {
            return Err(BridgeError::AdapterUnavailable(profile.name));
        }
        if width == 0 || height == 0 {
            return Err(BridgeError::InvalidDimensions { width, height });
        }
        let url = Url::parse(initial_url).map_err(|e| BridgeError::InvalidUrl {
            url: initial_url.to_string(),
            reason: e.to_string(),
        })?;

        let max_surfaces = self.shared.config.max_surfaces;
        if self.len() >= max_surfaces {
            return Err(BridgeError::SurfaceLimitExceeded);
        }

        let id = SurfaceId::new();
        let inner = Arc::new(SurfaceInner::new(
            id,
            width,
            height,
            &url,
            &self.shared.config,
            profile.pixel_format,
            profile.capabilities,
            self.shared.events.clone(),
        ));

        let client: Arc<dyn EngineClient> = inner.clone();
        let handle = self
            .shared
            .request(|reply| PumpCommand::CreateInstance {
                surface_id: id,
                url: url.clone(),
                width,
                height,
                client,
                reply,
            })?
            .map_err(BridgeError::InstanceCreation)?;
        inner.bind(handle);

        {
            let mut state = self.shared.lock();
            if state.surfaces.len() >= max_surfaces {
                drop(state);
                inner.mark_disposed();
                self.shared.submit(PumpCommand::Dispose { surface_id: id, handle });
                return Err(BridgeError::SurfaceLimitExceeded);
            }
            state.surfaces.insert(id, inner.clone());
            state.active = Some(id);
        }

        log::info!("Surface[{}]: created {}x{} for {}", id, width, height, url);
        self.shared.emit(SurfaceEvent::SurfaceCreated {
            surface_id: id,
            url: url.to_string(),
        });
        self.shared.emit(SurfaceEvent::ActiveChanged { surface_id: Some(id) });

        Ok(Surface::new(inner, self.shared.clone()))
    }

    /// Closes a surface and releases its engine instance.
    ///
    /// If it was active, another surface is promoted. Returns false when the surface was already
    /// closed or never existed.
    pub fn close_surface(&self, id: SurfaceId) -> bool {
        self.shared.close(id)
    }

    /// Makes `id` the active surface. Unknown ids are ignored.
    pub fn set_active(&self, id: SurfaceId) -> bool {
        {
            let mut state = self.shared.lock();
            if !state.surfaces.contains_key(&id) {
                log::debug!("Surface[{}]: cannot activate unknown surface", id);
                return false;
            }
            if state.active == Some(id) {
                return true;
            }
            state.active = Some(id);
        }
        self.shared.emit(SurfaceEvent::ActiveChanged { surface_id: Some(id) });
        true
    }

    pub fn active_id(&self) -> Option<SurfaceId> {
        self.shared.lock().active
    }

    pub fn active(&self) -> Option<Surface> {
        let state = self.shared.lock();
        let inner = state.active.and_then(|id| state.surfaces.get(&id)).cloned()?;
        Some(Surface::new(inner, self.shared.clone()))
    }

    pub fn find_surface(&self, id: SurfaceId) -> Option<Surface> {
        let inner = self.shared.lock().surfaces.get(&id).cloned()?;
        Some(Surface::new(inner, self.shared.clone()))
    }

    /// All live surfaces, in no particular order.
    pub fn surfaces(&self) -> Vec<Surface> {
        self.shared
            .live_surfaces()
            .into_iter()
            .map(|inner| Surface::new(inner, self.shared.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to surface lifecycle and load events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_available(&self) -> bool {
        self.shared.is_available()
    }

    pub fn adapter_name(&self) -> String {
        self.shared.profile.get().map(|p| p.name.clone()).unwrap_or_default()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Closes every surface, then stops and joins the pump thread. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let ids: Vec<SurfaceId> = self.shared.lock().surfaces.keys().copied().collect();
        for id in ids {
            self.shared.close(id);
        }

        if self.shared.running.swap(false, Ordering::AcqRel) {
            log::info!("Surface registry shutting down");
        }
        if let Some(mut pump) = self.pump.take() {
            pump.join();
        }
    }

    /// Registry whose pump is driven by hand on the calling thread.
    #[cfg(test)]
    pub(crate) fn detached(
        adapter: Arc<dyn EngineAdapter>,
        config: BridgeConfig,
    ) -> (Self, pump::PumpWorker) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(RegistryShared::new(adapter, config, commands));
        let mut worker = pump::PumpWorker::new(shared.clone(), command_rx);
        worker.startup();
        (Self { shared, pump: None }, worker)
    }
}

impl Drop for SurfaceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
