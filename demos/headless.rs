use std::sync::Arc;
use std::thread;
use std::time::Duration;

use surface_bridge::{
    BridgeConfig, BridgeError, InputEvent, Modifiers, MouseButton, NullAdapter, SurfaceEvent, SurfaceRegistry,
};

fn main() -> Result<(), BridgeError> {
    env_logger::init();

    // Configure the bridge through the config builder. Everything has sensible defaults, we only
    // lower the surface limit here.
    let config = BridgeConfig::builder()
        .max_surfaces(4)
        .build()
        .expect("Configuration is not valid");

    // The null adapter does not embed a real engine. It "loads" every URL instantly and paints a
    // solid color, which is enough to see the whole pipeline working.
    let adapter = Arc::new(NullAdapter::with_fill(0xFF33_6699));

    // Starting the registry spawns the pump thread and initializes the adapter on it.
    let mut registry = SurfaceRegistry::start(adapter, Some(config))?;

    // Events are broadcast. You only receive events sent after subscribing.
    let mut event_rx = registry.subscribe_events();
    let listener = thread::spawn(move || {
        while let Ok(event) = event_rx.blocking_recv() {
            match event {
                SurfaceEvent::LoadFinished { surface_id, url, http_status, .. } => {
                    println!("[{surface_id}] loaded {url} ({http_status})");
                }
                SurfaceEvent::SurfaceClosed { surface_id } => {
                    println!("[{surface_id}] closed");
                }
                other => println!("{other:?}"),
            }
        }
    });

    let surface = registry.create_surface(400, 600, "about:blank")?;

    // Feed some input the way a UI would: lots of motion, then a click.
    for i in 0..300 {
        surface.enqueue(InputEvent::mouse_move(i, i * 2));
    }
    surface.set_modifier(Modifiers::SHIFT, true);
    let admission = surface.enqueue(InputEvent::mouse_press(100, 200, MouseButton::Left));
    println!("click admission: {admission:?}, backlog: {}", surface.queue_len());

    // A UI would poll this once per frame.
    for _ in 0..20 {
        if surface.needs_update() {
            let frame = surface.acquire_frame();
            println!(
                "new frame {}x{}, top-left pixel {:#010x}",
                frame.width(),
                frame.height(),
                frame.pixel(0, 0).unwrap_or_default()
            );
        }
        thread::sleep(Duration::from_millis(16));
    }

    surface.navigate("https://example.org/")?;
    surface.resize(800, 600)?;
    thread::sleep(Duration::from_millis(50));
    println!("surface {} is {:?} at {}", surface.id(), surface.state(), surface.url());

    // The listener stops once every handle holding the event bus is gone.
    registry.shutdown();
    drop(surface);
    drop(registry);
    let _ = listener.join();

    Ok(())
}
