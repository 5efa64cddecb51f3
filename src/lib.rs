pub mod audio;
pub mod bounce;
pub mod engine;
pub mod env;
pub mod error;
pub mod kit;
pub mod mixer;
pub mod output;
pub mod params;
pub mod pattern;
pub mod sched;
pub mod state;
pub mod synth;
pub mod transport;

// Keep https://github.com/RustAudio/cpal/issues/508 in mind
// when changing the sample rate.
pub const SAMPLE_RATE: f64 = 44100.0;
