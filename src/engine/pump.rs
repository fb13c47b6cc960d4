//! The pump thread.
//!
//! Exactly one pump thread exists per [`SurfaceRegistry`](crate::SurfaceRegistry). It is the only
//! thread that ever calls into the [`EngineAdapter`]. Each tick it:
//!
//! 1. executes pending control commands (create, resize, navigate, dispose...),
//! 2. drives one slice of the engine's message loop,
//! 3. drains every live surface's input queue and dispatches the events.
//!
//! Failures of a single adapter call, including panics, are logged and never stop the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::engine::adapter::{AdapterProfile, EngineAdapter, EngineClient, InstanceHandle};
use crate::engine::errors::BridgeError;
use crate::engine::input::{InputEvent, InputKind};
use crate::engine::registry::RegistryShared;
use crate::engine::surface::{SurfaceId, SurfaceInner};

pub const PUMP_THREAD_NAME: &str = "engine-pump";

/// Niceness requested for the pump thread when elevated priority is enabled.
const PUMP_NICENESS: i32 = -10;

/// How long a blocked caller sleeps between checks for a pump reply.
const REPLY_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Fire-and-forget operations on a single engine instance.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InstanceOp {
    Navigate(Url),
    LoadContent { html: String, base_url: Url },
    Reload { ignore_cache: bool },
    StopLoading,
    GoBack,
    GoForward,
    SetFrameRate(u32),
    ExecuteScript(String),
}

impl InstanceOp {
    fn name(&self) -> &'static str {
        match self {
            InstanceOp::Navigate(_) => "navigate",
            InstanceOp::LoadContent { .. } => "load_content",
            InstanceOp::Reload { .. } => "reload",
            InstanceOp::StopLoading => "stop_loading",
            InstanceOp::GoBack => "go_back",
            InstanceOp::GoForward => "go_forward",
            InstanceOp::SetFrameRate(_) => "set_frame_rate",
            InstanceOp::ExecuteScript(_) => "execute_script",
        }
    }
}

/// Commands executed on the pump thread
pub(crate) enum PumpCommand {
    CreateInstance {
        surface_id: SurfaceId,
        url: Url,
        width: u32,
        height: u32,
        client: Arc<dyn EngineClient>,
        reply: oneshot::Sender<anyhow::Result<InstanceHandle>>,
    },
    /// Resizes the engine instance, then swaps in the surface's new frame
    Resize {
        surface: Arc<SurfaceInner>,
        handle: InstanceHandle,
        width: u32,
        height: u32,
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
    /// Can go back / can go forward
    History {
        handle: InstanceHandle,
        reply: oneshot::Sender<(bool, bool)>,
    },
    Instance {
        surface_id: SurfaceId,
        handle: InstanceHandle,
        op: InstanceOp,
    },
    Dispose {
        surface_id: SurfaceId,
        handle: InstanceHandle,
    },
}

/// Blocks the calling thread until the pump replies.
///
/// Gives up with [`BridgeError::Timeout`] once `timeout` elapses, dropping the receiver so the
/// pump sees that nobody is waiting anymore. Never parks on a runtime, so it is safe to call from
/// inside one.
pub(crate) fn wait_reply<T>(
    mut reply: oneshot::Receiver<T>,
    timeout: Option<Duration>,
) -> Result<T, BridgeError> {
    let started = Instant::now();
    loop {
        match reply.try_recv() {
            Ok(value) => return Ok(value),
            Err(TryRecvError::Closed) => return Err(BridgeError::PumpStopped),
            Err(TryRecvError::Empty) => {
                if let Some(timeout) = timeout {
                    if started.elapsed() >= timeout {
                        return Err(BridgeError::Timeout(timeout));
                    }
                }
                thread::sleep(REPLY_POLL_INTERVAL);
            }
        }
    }
}

/// Runs a single adapter call, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("adapter panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Executes a command against the adapter. Must run on the pump thread.
pub(crate) fn execute(adapter: &dyn EngineAdapter, command: PumpCommand) {
    match command {
        PumpCommand::CreateInstance {
            surface_id,
            url,
            width,
            height,
            client,
            reply,
        } => {
            let result = guarded(|| adapter.create_instance(&url, width, height, client));
            match &result {
                Ok(handle) => log::debug!("Surface[{}]: engine instance {} created", surface_id, handle),
                Err(e) => log::error!("Surface[{}]: engine instance creation failed: {:#}", surface_id, e),
            }
            // Caller gave up waiting; nobody will ever own this instance
            if let Err(Ok(handle)) = reply.send(result) {
                log::warn!("Surface[{}]: creation reply not received, releasing instance {}", surface_id, handle);
                if let Err(e) = guarded(|| adapter.dispose(handle)) {
                    log::error!("Surface[{}]: releasing instance {} failed: {:#}", surface_id, handle, e);
                }
            }
        }
        PumpCommand::Resize {
            surface,
            handle,
            width,
            height,
            reply,
        } => {
            let result = guarded(|| adapter.resize(handle, width, height));
            match &result {
                // Swapped before the next message loop slice, so the first paint at the new size
                // lands in the new frame
                Ok(()) => surface.apply_resize(width, height),
                Err(e) => log::error!("Surface[{}]: resize to {}x{} failed: {:#}", surface.id(), width, height, e),
            }
            let _ = reply.send(result);
        }
        PumpCommand::History { handle, reply } => {
            let history = guarded(|| Ok((adapter.can_go_back(handle), adapter.can_go_forward(handle))))
                .unwrap_or_else(|e| {
                    log::error!("Instance {}: history query failed: {:#}", handle, e);
                    (false, false)
                });
            let _ = reply.send(history);
        }
        PumpCommand::Instance { surface_id, handle, op } => {
            let name = op.name();
            if let Err(e) = guarded(|| run_op(adapter, handle, op)) {
                log::error!("Surface[{}]: {} failed: {:#}", surface_id, name, e);
            }
        }
        PumpCommand::Dispose { surface_id, handle } => match guarded(|| adapter.dispose(handle)) {
            Ok(()) => log::debug!("Surface[{}]: engine instance {} released", surface_id, handle),
            Err(e) => log::error!("Surface[{}]: releasing instance {} failed: {:#}", surface_id, handle, e),
        },
    }
}

fn run_op(adapter: &dyn EngineAdapter, handle: InstanceHandle, op: InstanceOp) -> anyhow::Result<()> {
    match op {
        InstanceOp::Navigate(url) => adapter.navigate(handle, &url),
        InstanceOp::LoadContent { html, base_url } => adapter.load_content(handle, &html, &base_url),
        InstanceOp::Reload { ignore_cache } => adapter.reload(handle, ignore_cache),
        InstanceOp::StopLoading => adapter.stop_loading(handle),
        InstanceOp::GoBack => adapter.go_back(handle),
        InstanceOp::GoForward => adapter.go_forward(handle),
        InstanceOp::SetFrameRate(fps) => adapter.set_frame_rate(handle, fps),
        InstanceOp::ExecuteScript(script) => adapter.execute_script(handle, &script),
    }
}

fn dispatch(adapter: &dyn EngineAdapter, handle: InstanceHandle, event: &InputEvent) -> anyhow::Result<()> {
    let modifiers = event.modifiers();
    match *event.kind() {
        InputKind::MousePress { x, y, button } => adapter.dispatch_mouse_press(handle, x, y, button, modifiers),
        InputKind::MouseRelease { x, y, button } => adapter.dispatch_mouse_release(handle, x, y, button, modifiers),
        InputKind::MouseMove { x, y } => adapter.dispatch_mouse_move(handle, x, y, modifiers),
        InputKind::MouseWheel { x, y, delta } => adapter.dispatch_mouse_wheel(handle, x, y, delta, modifiers),
        InputKind::KeyPress { code, ch, .. } => adapter.dispatch_key_press(handle, code, ch, modifiers),
        InputKind::KeyRelease { code, ch, .. } => adapter.dispatch_key_release(handle, code, ch, modifiers),
    }
}

#[cfg(target_os = "linux")]
fn elevate_priority() -> std::io::Result<()> {
    // SAFETY: gettid and setpriority have no memory safety requirements
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, PUMP_NICENESS)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn elevate_priority() -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("thread niceness {PUMP_NICENESS} not supported on this platform"),
    ))
}

/// Summary of a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TickReport {
    pub commands: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// The body of the pump thread.
pub(crate) struct PumpWorker {
    shared: Arc<RegistryShared>,
    commands: mpsc::UnboundedReceiver<PumpCommand>,
    ticks: u64,
}

impl PumpWorker {
    pub(crate) fn new(shared: Arc<RegistryShared>, commands: mpsc::UnboundedReceiver<PumpCommand>) -> Self {
        Self {
            shared,
            commands,
            ticks: 0,
        }
    }

    /// Claims the current thread as pump thread and initializes the adapter.
    pub(crate) fn startup(&mut self) -> AdapterProfile {
        self.shared.bind_pump_thread();

        if self.shared.config.elevated_priority {
            match elevate_priority() {
                Ok(()) => log::debug!("Pump thread running at niceness {}", PUMP_NICENESS),
                Err(e) => log::debug!("Pump thread keeps default priority: {}", e),
            }
        }

        let adapter = self.shared.adapter.as_ref();
        let available = match guarded(|| adapter.initialize()) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Engine adapter '{}' is unavailable: {:#}", adapter.name(), e);
                false
            }
        };

        let profile = AdapterProfile {
            name: adapter.name().to_string(),
            available,
            capabilities: adapter.capabilities(),
            pixel_format: adapter.pixel_format(),
        };
        self.shared.set_profile(profile.clone());
        profile
    }

    /// Ticks until the registry stops, then finishes pending commands and shuts the adapter down.
    pub(crate) fn run(mut self) {
        let interval = self.shared.config.tick_interval;
        let slow = self.shared.config.slow_tick_threshold;
        log::info!("Pump thread started");

        while self.shared.is_running() {
            let started = Instant::now();
            let report = self.tick();
            let elapsed = started.elapsed();
            if elapsed > slow {
                log::warn!(
                    "Pump tick {} took {:?} ({} commands, {} events, {} failed)",
                    self.ticks,
                    elapsed,
                    report.commands,
                    report.dispatched,
                    report.failed
                );
            }
            thread::sleep(interval);
        }

        let pending = self.process_commands();
        if pending > 0 {
            log::debug!("Pump thread finished {} pending commands", pending);
        }

        let adapter = self.shared.adapter.as_ref();
        if self.shared.is_available() {
            if let Err(e) = guarded(|| {
                adapter.shutdown();
                Ok(())
            }) {
                log::error!("Engine adapter '{}' failed to shut down: {:#}", adapter.name(), e);
            }
        }
        log::info!("Pump thread stopped after {} ticks", self.ticks);
    }

    /// One iteration of the pump loop.
    pub(crate) fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport {
            commands: self.process_commands(),
            ..Default::default()
        };

        let adapter = self.shared.adapter.as_ref();
        if self.shared.is_available() {
            if let Err(e) = guarded(|| adapter.pump_message_loop()) {
                log::error!("Engine message loop failed: {:#}", e);
            }
        }

        for surface in self.shared.live_surfaces() {
            let Some(handle) = surface.instance() else {
                continue;
            };
            let events = surface.queue().drain();
            if events.is_empty() {
                continue;
            }

            let now = Instant::now();
            for event in events {
                if surface.is_disposed() {
                    break;
                }
                if let Some(latency) = event.queue_latency(now) {
                    log::trace!("Surface[{}]: {} waited {:?} in queue", surface.id(), event.name(), latency);
                }
                match guarded(|| dispatch(adapter, handle, &event)) {
                    Ok(()) => report.dispatched += 1,
                    Err(e) => {
                        report.failed += 1;
                        log::error!("Surface[{}]: dispatching {} failed: {:#}", surface.id(), event.name(), e);
                    }
                }
            }
        }

        report
    }

    fn process_commands(&mut self) -> usize {
        let adapter = self.shared.adapter.clone();
        let mut processed = 0;
        while let Ok(command) = self.commands.try_recv() {
            execute(adapter.as_ref(), command);
            processed += 1;
        }
        processed
    }
}

/// Owned handle of the pump thread.
pub(crate) struct PumpThread {
    handle: Option<JoinHandle<()>>,
}

impl PumpThread {
    /// Spawns the pump thread and waits until the adapter has been initialized on it.
    pub(crate) fn spawn(
        shared: Arc<RegistryShared>,
        commands: mpsc::UnboundedReceiver<PumpCommand>,
    ) -> Result<(Self, AdapterProfile), BridgeError> {
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || {
                let mut worker = PumpWorker::new(shared, commands);
                let profile = worker.startup();
                let _ = ready_tx.send(profile);
                worker.run();
            })
            .map_err(BridgeError::PumpSpawn)?;

        let mut pump = Self { handle: Some(handle) };
        match wait_reply(ready_rx, None) {
            Ok(profile) => Ok((pump, profile)),
            Err(e) => {
                pump.join();
                Err(e)
            }
        }
    }

    /// Waits for the pump thread to exit. The registry must have stopped it first.
    pub(crate) fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            log::warn!("Pump thread cannot join itself, detaching");
            return;
        }
        if handle.join().is_err() {
            log::error!("Pump thread panicked");
        }
    }
}
