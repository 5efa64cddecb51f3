use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use assert_no_alloc::assert_no_alloc;
use atomic_float::AtomicF64;
use basedrop::{Handle, Shared};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{Consumer, Producer, RingBuffer};
use tracing::warn;
use triple_buffer::TripleBuffer;

use crate::audio::{pan_gains, Buffer, Rms, Stereo};
use crate::error::EngineError;
use crate::SAMPLE_RATE;

/// Upper bound on sounds in flight between scheduler and callback. The
/// callback's playback pool is sized to this so it never allocates.
pub const MAX_SCHEDULED: usize = 64;

const CHANNELS: usize = 2;
const METER_WINDOW: usize = SAMPLE_RATE as usize / 10 * 3;

/// A rendered hit queued for playback at an absolute position on the output
/// clock. Send levels ride along for the effects bus; this stage only
/// applies gain and pan.
pub struct ScheduledSound {
    pub frames: Vec<f32>,
    pub start: f64,
    pub gain: f32,
    pub pan: f32,
    pub reverb_send: f32,
    pub delay_send: f32,
}

/// The platform audio boundary. The engine never touches hardware; it hands
/// sounds to an implementation of this trait together with the clock time
/// they must start at.
pub trait AudioOutput: Send + Sync {
    /// Seconds of audio played since the output started.
    fn now(&self) -> f64;

    fn submit(&self, sound: ScheduledSound) -> Result<(), EngineError>;

    /// Discards queued sounds that have not started playing yet.
    fn flush(&self);
}

struct QueuedSound {
    frames: Shared<Vec<f32>>,
    start_frame: u64,
    gain: f32,
    pan_left: f32,
    pan_right: f32,
}

struct SubmitSide {
    producer: Producer<QueuedSound>,
    handle: Handle,
}

/// Shared half of the cpal output: the sample clock and the trigger queue.
/// Lives behind an `Arc` so the scheduler thread can reach it while the
/// stream itself stays with its owner.
pub struct CpalLink {
    clock_frames: AtomicU64,
    flush_pending: AtomicBool,
    dropped: AtomicU64,
    submit: Mutex<SubmitSide>,
}

impl AudioOutput for CpalLink {
    fn now(&self) -> f64 {
        self.clock_frames.load(Ordering::Relaxed) as f64 / SAMPLE_RATE
    }

    fn submit(&self, sound: ScheduledSound) -> Result<(), EngineError> {
        let mut side = self
            .submit
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (pan_left, pan_right) = pan_gains(sound.pan);
        let queued = QueuedSound {
            start_frame: (sound.start * SAMPLE_RATE).round() as u64,
            frames: Shared::new(&side.handle, sound.frames),
            gain: sound.gain,
            pan_left,
            pan_right,
        };
        side.producer.push(queued).map_err(|_| EngineError::QueueFull)
    }

    fn flush(&self) {
        self.flush_pending.store(true, Ordering::Release);
    }
}

/// Callback-side state. Everything is allocated up front; the callback only
/// pops, mixes and publishes.
struct Mixdown {
    consumer: Consumer<QueuedSound>,
    active: Vec<QueuedSound>,
    rms: Rms,
    meter: triple_buffer::Input<Stereo>,
}

impl Mixdown {
    fn render(&mut self, link: &CpalLink, data: &mut [f32]) {
        let num_frames = data.len() / CHANNELS;
        let block_start = link.clock_frames.load(Ordering::Relaxed);
        let block_end = block_start + num_frames as u64;

        if link.flush_pending.swap(false, Ordering::Acquire) {
            while self.consumer.pop().is_some() {}
            self.active.clear();
        }
        while let Some(sound) = self.consumer.pop() {
            if self.active.len() < MAX_SCHEDULED {
                self.active.push(sound);
            } else {
                link.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        data.fill(0.0);
        for sound in &self.active {
            if sound.start_frame >= block_end {
                continue;
            }
            let first = sound.start_frame.saturating_sub(block_start) as usize;
            for frame in first..num_frames {
                let src = block_start + frame as u64 - sound.start_frame;
                if src >= sound.frames.len() as u64 {
                    break;
                }
                let sample = sound.frames[src as usize] * sound.gain;
                data[frame * CHANNELS] += sample * sound.pan_left;
                data[frame * CHANNELS + 1] += sample * sound.pan_right;
            }
        }
        self.active
            .retain(|sound| sound.start_frame + sound.frames.len() as u64 > block_end);

        for frame in 0..num_frames {
            let left = data[frame * CHANNELS].clamp(-1.0, 1.0);
            let right = data[frame * CHANNELS + 1].clamp(-1.0, 1.0);
            data[frame * CHANNELS] = left;
            data[frame * CHANNELS + 1] = right;
            self.rms.add_frame(Stereo::new([left, right]));
        }
        self.meter.write(self.rms.value());

        link.clock_frames.store(block_end, Ordering::Relaxed);
    }
}

fn wire(handle: Handle) -> (Arc<CpalLink>, Mixdown, triple_buffer::Output<Stereo>) {
    let (producer, consumer) = RingBuffer::new(MAX_SCHEDULED).split();
    let link = Arc::new(CpalLink {
        clock_frames: AtomicU64::new(0),
        flush_pending: AtomicBool::new(false),
        dropped: AtomicU64::new(0),
        submit: Mutex::new(SubmitSide { producer, handle }),
    });
    let (meter_in, meter_out) = TripleBuffer::new(&Stereo::ZERO).split();
    let mixdown = Mixdown {
        consumer,
        active: Vec::with_capacity(MAX_SCHEDULED),
        rms: Rms::new(METER_WINDOW),
        meter: meter_in,
    };
    (link, mixdown, meter_out)
}

/// Hardware output. Owns the cpal stream; the engine talks to it through
/// the `Arc<CpalLink>` returned by [`CpalOutput::link`].
pub struct CpalOutput {
    _stream: cpal::Stream,
    link: Arc<CpalLink>,
    meter: triple_buffer::Output<Stereo>,
}

impl CpalOutput {
    pub fn start(handle: Handle) -> Result<CpalOutput> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        let supported = device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            bail!("only f32 output is supported");
        }
        let config = cpal::StreamConfig {
            channels: CHANNELS as u16,
            sample_rate: cpal::SampleRate(SAMPLE_RATE as u32),
            buffer_size: cpal::BufferSize::Default,
        };

        let (link, mut mixdown, meter) = wire(handle);
        let callback_link = link.clone();
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                assert_no_alloc(|| mixdown.render(&callback_link, data));
            },
            |err| warn!("audio output stream error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(CpalOutput {
            _stream: stream,
            link,
            meter,
        })
    }

    pub fn link(&self) -> Arc<dyn AudioOutput> {
        self.link.clone()
    }

    /// Master level over the last few hundred milliseconds.
    pub fn meter(&mut self) -> Stereo {
        *self.meter.read()
    }

    /// Sounds discarded because the playback pool was full.
    pub fn dropped(&self) -> u64 {
        self.link.dropped.load(Ordering::Relaxed)
    }
}

/// Summary of one submitted sound, for assertions and offline mixing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger {
    pub start: f64,
    pub gain: f32,
    pub pan: f32,
    pub frames: usize,
}

/// Clockless stand-in for the hardware output. Tests and offline bounces
/// move the clock by hand and read back what was scheduled.
pub struct OfflineOutput {
    clock: AtomicF64,
    sounds: Mutex<Vec<ScheduledSound>>,
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self {
            clock: AtomicF64::new(0.0),
            sounds: Mutex::new(Vec::new()),
        }
    }

    pub fn set_now(&self, seconds: f64) {
        self.clock.store(seconds, Ordering::Relaxed);
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        self.sounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|sound| Trigger {
                start: sound.start,
                gain: sound.gain,
                pan: sound.pan,
                frames: sound.frames.len(),
            })
            .collect()
    }

    /// Mixes everything submitted so far into a stereo buffer of the given
    /// length. Sounds running past the end are cut off.
    pub fn mix(&self, seconds: f64) -> Buffer {
        let num_frames = (seconds * SAMPLE_RATE) as usize;
        let mut out = vec![Stereo::ZERO; num_frames];
        let sounds = self
            .sounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for sound in sounds.iter() {
            let offset = (sound.start * SAMPLE_RATE).round() as usize;
            for (i, &sample) in sound.frames.iter().enumerate() {
                match out.get_mut(offset + i) {
                    Some(frame) => *frame += Stereo::from_mono(sample * sound.gain, sound.pan),
                    None => break,
                }
            }
        }
        out
    }
}

impl Default for OfflineOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for OfflineOutput {
    fn now(&self) -> f64 {
        self.clock.load(Ordering::Relaxed)
    }

    fn submit(&self, sound: ScheduledSound) -> Result<(), EngineError> {
        self.sounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sound);
        Ok(())
    }

    fn flush(&self) {
        let now = self.now();
        self.sounds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|sound| sound.start < now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    fn sound(start: f64, gain: f32, pan: f32, frames: Vec<f32>) -> ScheduledSound {
        ScheduledSound {
            frames,
            start,
            gain,
            pan,
            reverb_send: 0.0,
            delay_send: 0.0,
        }
    }

    #[test]
    fn mixdown_starts_sounds_at_their_frame() {
        let collector = Collector::new();
        let (link, mut mixdown, _meter) = wire(collector.handle());

        link.submit(sound(0.5, 1.0, 0.0, vec![0.25; 8])).unwrap();

        let block = 4410;
        let mut data = vec![0.0f32; block * CHANNELS];
        let mut first_audible = None;
        for block_index in 0..6 {
            mixdown.render(&link, &mut data);
            if first_audible.is_none() {
                if let Some(i) = data.chunks(CHANNELS).position(|f| f[0] != 0.0) {
                    first_audible = Some(block_index * block + i);
                }
            }
        }
        assert_eq!(first_audible, Some((0.5 * SAMPLE_RATE) as usize));
    }

    #[test]
    fn mixdown_survives_block_boundaries() {
        let collector = Collector::new();
        let (link, mut mixdown, _meter) = wire(collector.handle());

        // 100 frames of DC starting mid-block, read back across two blocks.
        link.submit(sound(64.0 / SAMPLE_RATE, 1.0, 0.0, vec![0.5; 100]))
            .unwrap();

        let mut first = vec![0.0f32; 128 * CHANNELS];
        let mut second = vec![0.0f32; 128 * CHANNELS];
        mixdown.render(&link, &mut first);
        mixdown.render(&link, &mut second);

        let audible_first = first.chunks(CHANNELS).filter(|f| f[0] != 0.0).count();
        let audible_second = second.chunks(CHANNELS).filter(|f| f[0] != 0.0).count();
        assert_eq!(audible_first, 64);
        assert_eq!(audible_second, 36);
    }

    #[test]
    fn flush_clears_unstarted_sounds() {
        let collector = Collector::new();
        let (link, mut mixdown, _meter) = wire(collector.handle());

        link.submit(sound(1.0, 1.0, 0.0, vec![0.5; 8])).unwrap();
        link.flush();

        let mut data = vec![0.0f32; 512 * CHANNELS];
        for _ in 0..200 {
            mixdown.render(&link, &mut data);
            assert!(data.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn clock_advances_with_rendered_frames() {
        let collector = Collector::new();
        let (link, mut mixdown, _meter) = wire(collector.handle());
        assert_eq!(link.now(), 0.0);

        let mut data = vec![0.0f32; 441 * CHANNELS];
        for _ in 0..100 {
            mixdown.render(&link, &mut data);
        }
        assert!((link.now() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn offline_mix_places_and_pans() {
        let output = OfflineOutput::new();
        output.submit(sound(0.25, 0.5, -1.0, vec![1.0; 4])).unwrap();
        let mixed = output.mix(0.5);

        let offset = (0.25 * SAMPLE_RATE) as usize;
        assert_eq!(mixed[offset - 1], Stereo::ZERO);
        assert!((mixed[offset].channel(0) - 0.5).abs() < 1e-6);
        assert!(mixed[offset].channel(1).abs() < 1e-6);
    }

    #[test]
    fn offline_flush_keeps_started_sounds() {
        let output = OfflineOutput::new();
        output.submit(sound(0.0, 1.0, 0.0, vec![1.0; 4])).unwrap();
        output.submit(sound(2.0, 1.0, 0.0, vec![1.0; 4])).unwrap();
        output.set_now(1.0);
        output.flush();
        let triggers = output.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].start, 0.0);
    }
}
