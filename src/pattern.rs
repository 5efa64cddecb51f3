use std::collections::HashMap;
use std::fmt;

use ulid::Ulid;

use crate::kit::{Voice, VoiceId};

pub const PATTERN_LENGTHS: [usize; 3] = [8, 16, 32];
pub const DEFAULT_PATTERN_LEN: usize = 16;
pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_VELOCITY: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(Ulid);

impl PatternId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One voice's row in the grid: a trigger flag and a velocity per step.
/// Both sequences always have the pattern's length.
#[derive(Clone, Debug)]
pub struct Lane {
    steps: Vec<bool>,
    velocity: Vec<f32>,
}

impl Lane {
    fn new(len: usize) -> Self {
        Self {
            steps: vec![false; len],
            velocity: vec![DEFAULT_VELOCITY; len],
        }
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    pub fn velocities(&self) -> &[f32] {
        &self.velocity
    }
}

#[derive(Clone, Debug)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    length: usize,
    // Stored with the grid so saved patterns round-trip through the
    // library with their feel intact; the transport holds the live values.
    pub tempo: f64,
    pub swing: f64,
    lanes: HashMap<VoiceId, Lane>,
}

impl Pattern {
    pub fn new(voices: &[Voice]) -> Self {
        let lanes = voices
            .iter()
            .map(|voice| (voice.id, Lane::new(DEFAULT_PATTERN_LEN)))
            .collect();
        Self {
            id: PatternId::new(),
            name: String::from("Pattern 1"),
            length: DEFAULT_PATTERN_LEN,
            tempo: DEFAULT_TEMPO,
            swing: 0.0,
            lanes,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// True when no cell in any lane is set.
    pub fn is_blank(&self) -> bool {
        self.lanes
            .values()
            .all(|lane| lane.steps.iter().all(|on| !on))
    }

    pub fn has_voice(&self, id: VoiceId) -> bool {
        self.lanes.contains_key(&id)
    }

    pub fn lane(&self, id: VoiceId) -> Option<&Lane> {
        self.lanes.get(&id)
    }

    /// Resizes every lane in one pass so no grid read can observe rows of
    /// mixed length. New cells start cleared and silent.
    pub fn set_len(&mut self, len: usize) {
        let len = snap_len(len);
        for lane in self.lanes.values_mut() {
            lane.steps.resize(len, false);
            lane.velocity.resize(len, 0.0);
        }
        self.length = len;
    }

    pub fn toggle_step(&mut self, id: VoiceId, step: usize) -> bool {
        match self.lanes.get_mut(&id) {
            Some(lane) => {
                if let Some(cell) = lane.steps.get_mut(step) {
                    *cell = !*cell;
                }
                true
            }
            None => false,
        }
    }

    pub fn set_step(&mut self, id: VoiceId, step: usize, on: bool) -> bool {
        match self.lanes.get_mut(&id) {
            Some(lane) => {
                if let Some(cell) = lane.steps.get_mut(step) {
                    *cell = on;
                }
                true
            }
            None => false,
        }
    }

    pub fn set_velocity(&mut self, id: VoiceId, step: usize, velocity: f32) -> bool {
        match self.lanes.get_mut(&id) {
            Some(lane) => {
                if let Some(cell) = lane.velocity.get_mut(step) {
                    *cell = velocity.clamp(0.0, 1.0);
                }
                true
            }
            None => false,
        }
    }

    /// Clears every trigger flag. Length, tempo, swing and the velocity rows
    /// are left as they are.
    pub fn clear(&mut self) {
        for lane in self.lanes.values_mut() {
            lane.steps.fill(false);
        }
    }

    /// The cell a voice holds at a step, if the voice is in the grid.
    pub fn cell(&self, id: VoiceId, step: usize) -> Option<(bool, f32)> {
        self.lanes.get(&id).and_then(|lane| {
            let on = *lane.steps.get(step)?;
            let velocity = *lane.velocity.get(step)?;
            Some((on, velocity))
        })
    }

    /// Deep copy with a fresh identity, for the pattern library. Later edits
    /// to this pattern leave the copy untouched.
    pub fn snapshot(&self, name: String) -> Pattern {
        let mut copy = self.clone();
        copy.id = PatternId::new();
        copy.name = name;
        copy
    }
}

/// Grid lengths are fixed at 8, 16 or 32 steps; anything else snaps to the
/// nearest one.
fn snap_len(len: usize) -> usize {
    *PATTERN_LENGTHS
        .iter()
        .min_by_key(|&&allowed| allowed.abs_diff(len))
        .unwrap_or(&DEFAULT_PATTERN_LEN)
}
