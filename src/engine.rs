use std::sync::Arc;

use basedrop::{Collector, Handle, Shared};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::EngineError;
use crate::kit::{default_kit, Voice, VoiceId};
use crate::mixer::Mixer;
use crate::output::{AudioOutput, ScheduledSound};
use crate::pattern::{Pattern, PatternId};
use crate::sched::{Scheduler, SchedulerHandle};
use crate::state::Store;
use crate::synth;
use crate::transport::Transport;

/// The beat engine. Owns the grid, the kit, the transport and the scheduler
/// lifecycle; the UI layer keeps ids and calls the methods below. One
/// instance per project, torn down explicitly (stopping playback) on drop.
pub struct Engine {
    store: Arc<Store>,
    output: Option<Arc<dyn AudioOutput>>,
    scheduler: Option<SchedulerHandle>,
    library: Vec<Pattern>,
    rng: SmallRng,
    // Dropped last so everything shared is reclaimed first.
    collector: Collector,
}

impl Engine {
    pub fn new(kit: Vec<Voice>) -> Self {
        let collector = Collector::new();
        let store = Arc::new(Store::new(kit, &collector.handle()));
        Self {
            store,
            output: None,
            scheduler: None,
            library: Vec::new(),
            rng: SmallRng::from_entropy(),
            collector,
        }
    }

    pub fn with_default_kit() -> Self {
        Self::new(default_kit())
    }

    /// Hands the engine its audio output. Playback cannot start without one.
    pub fn attach_output(&mut self, output: Arc<dyn AudioOutput>) {
        self.output = Some(output);
    }

    /// Allocator handle for collaborators that share buffers with the audio
    /// callback.
    pub fn allocator(&self) -> Handle {
        self.collector.handle()
    }

    pub fn play(&mut self) -> Result<(), EngineError> {
        let output = self.output.clone().ok_or(EngineError::NotReady)?;
        if self.scheduler.is_some() {
            return Ok(());
        }
        let start_step = self.store.current_step();
        let scheduler = Scheduler::new(self.store.clone(), output, start_step);
        self.scheduler = Some(SchedulerHandle::spawn(scheduler));
        self.store.transport().set_playing(true);
        info!(start_step, "transport playing");
        Ok(())
    }

    /// Stops playback and rewinds. No trigger fires after this returns.
    pub fn stop(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.stop();
            info!("transport stopped");
        }
        self.store.transport().set_playing(false);
        self.store.set_current_step(0);
        if let Some(output) = &self.output {
            output.flush();
        }
        self.collector.collect();
    }

    /// Stops playback but keeps the cursor, so `play` picks up where the
    /// groove left off.
    pub fn pause(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            let next_step = handle.stop();
            self.store.set_current_step(next_step);
            info!(next_step, "transport paused");
        }
        self.store.transport().set_playing(false);
        if let Some(output) = &self.output {
            output.flush();
        }
        self.collector.collect();
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.store.transport().set_tempo(bpm);
    }

    pub fn set_swing(&self, percent: f64) {
        self.store.transport().set_swing(percent);
    }

    pub fn set_master_volume(&self, volume: f64) {
        self.store.transport().set_master_volume(volume);
    }

    pub fn set_recording(&self, recording: bool) {
        self.store.transport().set_recording(recording);
    }

    pub fn toggle_step(&self, id: VoiceId, step: usize) -> Result<(), EngineError> {
        self.store
            .update_pattern(&self.collector.handle(), |p| p.toggle_step(id, step))
            .then_some(())
            .ok_or(EngineError::UnknownVoice(id))
    }

    pub fn set_velocity(&self, id: VoiceId, step: usize, velocity: f32) -> Result<(), EngineError> {
        self.store
            .update_pattern(&self.collector.handle(), |p| p.set_velocity(id, step, velocity))
            .then_some(())
            .ok_or(EngineError::UnknownVoice(id))
    }

    pub fn set_len(&self, len: usize) {
        self.store.update_pattern(&self.collector.handle(), |p| p.set_len(len));
    }

    pub fn clear_pattern(&self) {
        self.store.update_pattern(&self.collector.handle(), |p| p.clear());
    }

    /// Copies the live pattern into the library and returns the copy's id.
    /// Later edits to the live grid leave the saved copy untouched.
    pub fn save_pattern(&mut self) -> PatternId {
        let saved = self.pattern_record();
        let id = saved.id;
        self.library.push(saved);
        info!(pattern = %id, "pattern saved");
        id
    }

    /// Replaces the live pattern with a copy of a library entry and restores
    /// the tempo and swing it was saved with.
    pub fn load_pattern(&mut self, id: PatternId) -> Result<(), EngineError> {
        let entry = self
            .library
            .iter()
            .find(|p| p.id == id)
            .ok_or(EngineError::UnknownPattern(id))?;
        let copy = entry.snapshot(entry.name.clone());
        self.store.transport().set_tempo(copy.tempo);
        self.store.transport().set_swing(copy.swing);
        self.store.update_pattern(&self.collector.handle(), |p| *p = copy);
        Ok(())
    }

    pub fn library(&self) -> &[Pattern] {
        &self.library
    }

    pub fn set_mute(&self, id: VoiceId, muted: bool) -> Result<(), EngineError> {
        self.update_track(id, |track| track.set_muted(muted))
    }

    pub fn set_solo(&self, id: VoiceId, soloed: bool) -> Result<(), EngineError> {
        self.update_track(id, |track| track.set_soloed(soloed))
    }

    pub fn set_track_volume(&self, id: VoiceId, volume: f32) -> Result<(), EngineError> {
        self.update_track(id, |track| track.set_volume(volume))
    }

    /// Edits a voice's sound parameters in place, publishing the result as a
    /// new kit snapshot.
    pub fn update_voice<F>(&self, id: VoiceId, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut Voice),
    {
        self.update_track(id, |track| f(&mut track.voice))
    }

    fn update_track<F>(&self, id: VoiceId, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut crate::mixer::Track),
    {
        self.store
            .update_mixer(&self.collector.handle(), |m| match m.track_mut(id) {
                Some(track) => {
                    f(track);
                    true
                }
                None => false,
            })
            .then_some(())
            .ok_or(EngineError::UnknownVoice(id))
    }

    /// Renders and queues one hit right now, bypassing the grid. Muted or
    /// not, the pad sounds; that is what auditioning is for. While playing
    /// with record armed, the hit is also written into the grid at the
    /// current step.
    pub fn trigger_voice(&mut self, id: VoiceId) -> Result<(), EngineError> {
        let output = self.output.clone().ok_or(EngineError::NotReady)?;
        let mixer = self.store.mixer();
        let track = mixer.track(id).ok_or(EngineError::UnknownVoice(id))?;
        let transport = self.store.transport();

        let sound = synth::render_voice(&track.voice, &mut self.rng);
        let gain = track.voice.volume() * track.volume() * transport.master_volume() as f32;
        output.submit(ScheduledSound {
            frames: sound.frames,
            start: output.now(),
            gain,
            pan: sound.pan,
            reverb_send: sound.reverb_send,
            delay_send: sound.delay_send,
        })?;

        if transport.is_playing() && transport.is_recording() {
            let step = self.store.current_step();
            self.store.update_pattern(&self.collector.handle(), |p| {
                p.set_step(id, step, true);
                p.set_velocity(id, step, 1.0);
            });
        }
        Ok(())
    }

    pub fn pattern(&self) -> Shared<Pattern> {
        self.store.pattern()
    }

    pub fn mixer(&self) -> Shared<Mixer> {
        self.store.mixer()
    }

    pub fn transport(&self) -> &Transport {
        self.store.transport()
    }

    pub fn current_step(&self) -> usize {
        self.store.current_step()
    }

    pub fn voice_ids(&self) -> Vec<VoiceId> {
        self.store
            .mixer()
            .tracks()
            .iter()
            .map(|t| t.voice.id)
            .collect()
    }

    /// The live pattern as a plain record, tempo and swing stamped from the
    /// transport. This is the shape the persistence layer stores.
    pub fn pattern_record(&self) -> Pattern {
        let pattern = self.store.pattern();
        let mut record = pattern.snapshot(pattern.name.clone());
        record.tempo = self.store.transport().tempo();
        record.swing = self.store.transport().swing();
        record
    }

    /// Reclaims buffers the audio callback has finished with. Call this from
    /// the UI tick or any other periodic hook.
    pub fn maintain(&mut self) {
        self.collector.collect();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
