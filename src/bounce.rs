use std::sync::Arc;

use anyhow::Result;
use basedrop::Collector;
use camino::Utf8Path;
use hound::{SampleFormat, WavSpec, WavWriter};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::audio::Buffer;
use crate::mixer::Mixer;
use crate::output::OfflineOutput;
use crate::pattern::Pattern;
use crate::sched::{Scheduler, POLL_INTERVAL};
use crate::state::Store;
use crate::SAMPLE_RATE;

/// Renders a pattern offline for the given duration. The pattern record's
/// own tempo and swing drive the bounce, so a saved pattern sounds the way
/// it was saved. Deterministic for a fixed seed up to the noise voices'
/// statistical character.
pub fn render_pattern(pattern: Pattern, mixer: Mixer, seconds: f64, seed: u64) -> Buffer {
    let collector = Collector::new();
    let store = Arc::new(Store::with_state(pattern, mixer, &collector.handle()));
    let output = Arc::new(OfflineOutput::new());
    let mut scheduler = Scheduler::with_rng(
        store.clone(),
        output.clone(),
        0,
        SmallRng::seed_from_u64(seed),
    );

    let tick = POLL_INTERVAL.as_secs_f64();
    let mut now = 0.0;
    while now < seconds {
        output.set_now(now);
        scheduler.poll();
        now += tick;
    }
    output.mix(seconds)
}

pub fn write_wav(path: &Utf8Path, frames: &[crate::audio::Stereo]) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut wav = WavWriter::create(path, spec)?;
    for frame in frames {
        wav.write_sample(frame.channel(0))?;
        wav.write_sample(frame.channel(1))?;
    }
    wav.finalize()?;
    Ok(())
}
