use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use backbeat::engine::Engine;
use backbeat::output::CpalOutput;

#[cfg(debug_assertions)]
#[global_allocator]
static ALLOC: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

// Plays a couple of bars on the stock kit, standing in for the UI layer
// until one is wired up.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut engine = Engine::with_default_kit();
    let mut audio = CpalOutput::start(engine.allocator())?;
    engine.attach_output(audio.link());

    let ids = engine.voice_ids();
    let (kick, snare, closed_hat) = (ids[0], ids[2], ids[5]);
    engine.set_tempo(120.0);
    engine.set_swing(12.0);
    for step in [0, 4, 8, 12] {
        engine.toggle_step(kick, step)?;
    }
    for step in [4, 12] {
        engine.toggle_step(snare, step)?;
    }
    for step in (0..16).step_by(2) {
        engine.toggle_step(closed_hat, step)?;
        engine.set_velocity(closed_hat, step, if step % 4 == 0 { 0.9 } else { 0.5 })?;
    }

    engine.play()?;
    for _ in 0..8 {
        thread::sleep(Duration::from_millis(500));
        engine.maintain();
        let meter = audio.meter();
        info!(
            step = engine.current_step(),
            left = meter.channel(0),
            right = meter.channel(1),
            "playing"
        );
    }
    engine.stop();

    Ok(())
}
