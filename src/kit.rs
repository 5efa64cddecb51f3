use std::fmt;

use ulid::Ulid;

use crate::env::Adsr;

pub const KIT_SIZE: usize = 16;

const MAX_PITCH_OFFSET: f32 = 24.0;
const DEFAULT_VOLUME: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(Ulid);

impl VoiceId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for VoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Kick,
    Snare,
    HiHat,
    Cymbal,
    Perc,
    Effect,
    /// Fallback for categories we don't recognize, e.g. from a project
    /// saved by a newer version. Renders as a plain tone.
    Tone,
}

impl Category {
    pub fn from_name(name: &str) -> Category {
        match name {
            "kick" => Category::Kick,
            "snare" => Category::Snare,
            "hihat" => Category::HiHat,
            "cymbal" => Category::Cymbal,
            "perc" => Category::Perc,
            "effect" => Category::Effect,
            _ => Category::Tone,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Kick => "kick",
            Category::Snare => "snare",
            Category::HiHat => "hihat",
            Category::Cymbal => "cymbal",
            Category::Perc => "perc",
            Category::Effect => "effect",
            Category::Tone => "tone",
        }
    }
}

/// A synthesizable percussion sound. Everything the synth needs to render a
/// hit lives here; run-time mix state (mute, solo, channel volume) lives on
/// the owning track.
#[derive(Clone, Debug)]
pub struct Voice {
    pub id: VoiceId,
    pub name: String,
    pub category: Category,
    volume: f32,
    pitch: f32,
    pan: f32,
    filter: f32,
    reverb_send: f32,
    delay_send: f32,
    adsr: Adsr,
}

impl Voice {
    pub fn new<S: Into<String>>(name: S, category: Category) -> Self {
        Self {
            id: VoiceId::new(),
            name: name.into(),
            category,
            volume: DEFAULT_VOLUME,
            pitch: 0.0,
            pan: 0.0,
            filter: 0.0,
            reverb_send: 0.0,
            delay_send: 0.0,
            adsr: Adsr::default(),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Pitch offset in semitones from the category's base tuning.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, semitones: f32) {
        self.pitch = semitones.clamp(-MAX_PITCH_OFFSET, MAX_PITCH_OFFSET);
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    /// Filter bias in -1..1. Negative values darken the sound with a lowpass,
    /// positive values thin it out with a highpass, zero bypasses the filter.
    pub fn filter(&self) -> f32 {
        self.filter
    }

    pub fn set_filter(&mut self, bias: f32) {
        self.filter = bias.clamp(-1.0, 1.0);
    }

    pub fn reverb_send(&self) -> f32 {
        self.reverb_send
    }

    pub fn set_reverb_send(&mut self, level: f32) {
        self.reverb_send = level.clamp(0.0, 1.0);
    }

    pub fn delay_send(&self) -> f32 {
        self.delay_send
    }

    pub fn set_delay_send(&mut self, level: f32) {
        self.delay_send = level.clamp(0.0, 1.0);
    }

    pub fn adsr(&self) -> Adsr {
        self.adsr
    }

    pub fn set_adsr(&mut self, adsr: Adsr) {
        self.adsr = adsr.clamped();
    }
}

/// The stock 16-pad kit loaded when a project has no saved sounds.
pub fn default_kit() -> Vec<Voice> {
    const PADS: [(&str, Category); KIT_SIZE] = [
        ("Kick", Category::Kick),
        ("Kick 2", Category::Kick),
        ("Snare", Category::Snare),
        ("Rim", Category::Snare),
        ("Clap", Category::Snare),
        ("Closed Hat", Category::HiHat),
        ("Open Hat", Category::HiHat),
        ("Crash", Category::Cymbal),
        ("Ride", Category::Cymbal),
        ("Low Tom", Category::Perc),
        ("Mid Tom", Category::Perc),
        ("High Tom", Category::Perc),
        ("Perc 1", Category::Perc),
        ("Perc 2", Category::Perc),
        ("FX 1", Category::Effect),
        ("FX 2", Category::Effect),
    ];
    PADS.iter()
        .map(|(name, category)| Voice::new(*name, *category))
        .collect()
}
