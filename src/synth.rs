use std::f64::consts::TAU;

use rand::Rng;

use crate::kit::{Category, Voice};
use crate::SAMPLE_RATE;

/// Render windows per hit. Cymbals ring out; everything else is a short hit.
pub const CYMBAL_DURATION: f64 = 2.0;
pub const HIT_DURATION: f64 = 0.5;

const CYMBAL_BASE_HZ: f64 = 400.0;
const CYMBAL_HARMONICS: u32 = 8;

/// A rendered hit plus the spatial metadata the output stage and the
/// downstream effects bus need. Send levels are carried, not applied; wet
/// processing belongs to the effects stage.
pub struct RenderedSound {
    pub frames: Vec<f32>,
    pub pan: f32,
    pub reverb_send: f32,
    pub delay_send: f32,
}

/// Renders one hit of a voice from its parametric model. No sample files
/// are involved; every category is a closed-form generator. Noise-based
/// categories draw from `rng`, so consecutive hits shimmer slightly instead
/// of repeating bit for bit.
pub fn render_voice<R: Rng>(voice: &Voice, rng: &mut R) -> RenderedSound {
    let duration = match voice.category {
        Category::Cymbal => CYMBAL_DURATION,
        _ => HIT_DURATION,
    };
    let mut frames = generate(voice.category, duration, rng);
    voice.adsr().apply(&mut frames, SAMPLE_RATE);
    let frames = repitch(frames, voice.pitch());
    let frames = bias_filter(frames, voice.filter());
    RenderedSound {
        frames,
        pan: voice.pan(),
        reverb_send: voice.reverb_send(),
        delay_send: voice.delay_send(),
    }
}

fn generate<R: Rng>(category: Category, duration: f64, rng: &mut R) -> Vec<f32> {
    let num_frames = (duration * SAMPLE_RATE) as usize;
    let mut frames = Vec::with_capacity(num_frames);
    let dt = 1.0 / SAMPLE_RATE;
    let mut phase = 0.0f64;

    for i in 0..num_frames {
        let t = i as f64 * dt;
        let sample = match category {
            Category::Kick => {
                // The pitch sweep from 60 Hz down is what reads as "kick";
                // integrating the instantaneous frequency keeps the phase
                // continuous through the sweep.
                let freq = 60.0 * (-8.0 * t).exp();
                phase += TAU * freq * dt;
                phase.sin() * (-6.0 * t).exp()
            }
            Category::Snare => {
                let noise = rng.gen::<f64>() * 2.0 - 1.0;
                let body = (TAU * 200.0 * t).sin();
                (0.7 * noise + 0.3 * body) * (-8.0 * t).exp()
            }
            Category::HiHat => {
                let noise = rng.gen::<f64>() * 2.0 - 1.0;
                noise * (-15.0 * t).exp()
            }
            Category::Cymbal => {
                let mut sum = 0.0;
                let mut norm = 0.0;
                for h in 1..=CYMBAL_HARMONICS {
                    let weight = 1.0 / h as f64;
                    sum += weight * (TAU * CYMBAL_BASE_HZ * h as f64 * t).sin();
                    norm += weight;
                }
                sum / norm * (-2.0 * t).exp()
            }
            Category::Perc => (TAU * 300.0 * t).sin() * (-10.0 * t).exp(),
            Category::Effect => {
                // Linear rise from 100 Hz to 1100 Hz across the window.
                let freq = 100.0 + 1000.0 * (t / duration);
                phase += TAU * freq * dt;
                phase.sin() * (-3.0 * t).exp()
            }
            Category::Tone => (TAU * 440.0 * t).sin() * (-5.0 * t).exp(),
        };
        frames.push(sample as f32);
    }
    frames
}

/// Playback-rate pitch shift, the same read loop a sampler voice uses:
/// advance a fractional position by `2^(semitones/12)` and lerp between
/// neighboring source frames.
fn repitch(src: Vec<f32>, semitones: f32) -> Vec<f32> {
    if semitones == 0.0 {
        return src;
    }
    let ratio = f32::powf(2.0, semitones / 12.0);
    let mut out = Vec::with_capacity((src.len() as f32 / ratio) as usize + 1);
    let mut position = 0.0f32;
    while (position as usize) < src.len() {
        let pos = position as usize;
        let weight = position - pos as f32;
        let mut frame = src[pos] * (1.0 - weight);
        if pos < src.len() - 1 {
            frame += src[pos + 1] * weight;
        }
        out.push(frame);
        position += ratio;
    }
    out
}

/// Single-pole tone shaping. Positive bias thins the sound out (highpass),
/// negative bias darkens it (lowpass), zero is a bypass. The corner lands at
/// `1000 + bias * 2000` Hz, pinned to the audible band.
fn bias_filter(mut frames: Vec<f32>, bias: f32) -> Vec<f32> {
    if bias == 0.0 {
        return frames;
    }
    let corner = (1000.0 + bias as f64 * 2000.0).clamp(20.0, SAMPLE_RATE / 2.0 - 1.0);
    let coeff = 1.0 - (-TAU * corner / SAMPLE_RATE).exp();
    let mut lowpass = 0.0f64;
    for sample in frames.iter_mut() {
        lowpass += coeff * (*sample as f64 - lowpass);
        *sample = if bias > 0.0 {
            *sample - lowpass as f32
        } else {
            lowpass as f32
        };
    }
    frames
}
