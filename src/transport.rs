use std::sync::atomic::{AtomicBool, Ordering};

use param_derive::Params;

use crate::params::{self, format_bpm, format_percent, Param, ParamInfo, Params};

pub const MIN_TEMPO: f64 = 60.0;
pub const MAX_TEMPO: f64 = 200.0;
pub const MAX_SWING: f64 = 30.0;

#[derive(Params)]
pub struct TransportParams {
    tempo: Param,
    swing: Param,
    master_volume: Param,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            tempo: Param::new(
                120.0,
                ParamInfo::new("Tempo", MIN_TEMPO, MAX_TEMPO)
                    .with_steps([1, 5])
                    .with_formatter(format_bpm),
            ),
            swing: Param::new(
                0.0,
                ParamInfo::new("Swing", 0.0, MAX_SWING)
                    .with_steps([1, 5])
                    .with_formatter(format_percent),
            ),
            master_volume: Param::new(0.8, ParamInfo::new("Master Volume", 0.0, 1.0)),
        }
    }
}

/// Owns tempo, swing, master volume and the play/record flags. Everything
/// here is atomic so slider moves land between scheduler ticks without
/// locking; the scheduler picks them up on its next tick.
pub struct Transport {
    params: TransportParams,
    playing: AtomicBool,
    recording: AtomicBool,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            params: TransportParams::default(),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    pub fn tempo(&self) -> f64 {
        self.params.tempo.value()
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.params.tempo.set(bpm);
    }

    pub fn swing(&self) -> f64 {
        self.params.swing.value()
    }

    pub fn set_swing(&self, percent: f64) {
        self.params.swing.set(percent);
    }

    pub fn master_volume(&self) -> f64 {
        self.params.master_volume.value()
    }

    pub fn set_master_volume(&self, volume: f64) {
        self.params.master_volume.set(volume);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Relaxed);
    }

    /// One sixteenth note at the current tempo, in seconds.
    pub fn step_duration(&self) -> f64 {
        60.0 / (self.tempo() * 4.0)
    }

    /// Micro-delay applied to odd steps. Scaled down by an extra factor of
    /// ten relative to a classic swung eighth; this subtle shuffle is the
    /// groove the product shipped with, so keep the math as is.
    pub fn swing_offset(&self, step: usize) -> f64 {
        if step % 2 == 1 {
            (self.swing() / 100.0) * self.step_duration() * 0.1
        } else {
            0.0
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_duration_is_a_sixteenth() {
        let transport = Transport::new();
        transport.set_tempo(120.0);
        assert_eq!(transport.step_duration(), 0.125);
        transport.set_tempo(150.0);
        assert!((transport.step_duration() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn tempo_and_swing_clamp() {
        let transport = Transport::new();
        transport.set_tempo(500.0);
        assert_eq!(transport.tempo(), MAX_TEMPO);
        transport.set_tempo(10.0);
        assert_eq!(transport.tempo(), MIN_TEMPO);
        transport.set_swing(-5.0);
        assert_eq!(transport.swing(), 0.0);
        transport.set_swing(95.0);
        assert_eq!(transport.swing(), MAX_SWING);
    }

    #[test]
    fn swing_skips_even_steps() {
        let transport = Transport::new();
        transport.set_tempo(150.0);
        transport.set_swing(20.0);
        assert_eq!(transport.swing_offset(0), 0.0);
        assert!((transport.swing_offset(1) - 0.002).abs() < 1e-12);
        assert_eq!(transport.swing_offset(2), 0.0);
        assert!((transport.swing_offset(31) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn zero_swing_is_zero_everywhere() {
        let transport = Transport::new();
        for step in 0..32 {
            assert_eq!(transport.swing_offset(step), 0.0);
        }
    }
}
