use std::sync::atomic::{AtomicUsize, Ordering};

use basedrop::{Handle, Shared, SharedCell};

use crate::kit::Voice;
use crate::mixer::Mixer;
use crate::pattern::Pattern;
use crate::transport::Transport;

/// State shared between the command side and the scheduler thread. The grid
/// and the mixer are published as immutable snapshots: writers clone,
/// mutate and swap, so a scheduler tick in flight keeps reading the version
/// it started with and never observes a half-applied edit.
pub struct Store {
    pattern: SharedCell<Pattern>,
    mixer: SharedCell<Mixer>,
    transport: Transport,
    current_step: AtomicUsize,
}

impl Store {
    pub fn new(kit: Vec<Voice>, handle: &Handle) -> Self {
        let pattern = Pattern::new(&kit);
        let mixer = Mixer::from_kit(kit);
        Self::with_state(pattern, mixer, handle)
    }

    pub fn with_state(pattern: Pattern, mixer: Mixer, handle: &Handle) -> Self {
        let transport = Transport::new();
        transport.set_tempo(pattern.tempo);
        transport.set_swing(pattern.swing);
        Self {
            pattern: SharedCell::new(Shared::new(handle, pattern)),
            mixer: SharedCell::new(Shared::new(handle, mixer)),
            transport,
            current_step: AtomicUsize::new(0),
        }
    }

    pub fn pattern(&self) -> Shared<Pattern> {
        self.pattern.get()
    }

    pub fn mixer(&self) -> Shared<Mixer> {
        self.mixer.get()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn update_pattern<R, F>(&self, handle: &Handle, f: F) -> R
    where
        F: FnOnce(&mut Pattern) -> R,
    {
        let mut pattern = (*self.pattern.get()).clone();
        let result = f(&mut pattern);
        self.pattern.set(Shared::new(handle, pattern));
        result
    }

    pub fn update_mixer<R, F>(&self, handle: &Handle, f: F) -> R
    where
        F: FnOnce(&mut Mixer) -> R,
    {
        let mut mixer = (*self.mixer.get()).clone();
        let result = f(&mut mixer);
        self.mixer.set(Shared::new(handle, mixer));
        result
    }

    /// The step the scheduler most recently queued, for playhead displays
    /// and resume-after-pause.
    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn set_current_step(&self, step: usize) {
        self.current_step.store(step, Ordering::Relaxed);
    }
}
