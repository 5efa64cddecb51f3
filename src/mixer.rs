use crate::kit::{Voice, VoiceId};

/// A kit voice plus its channel strip. Channel volume stacks on top of the
/// voice's own volume at trigger time.
#[derive(Clone, Debug)]
pub struct Track {
    pub voice: Voice,
    muted: bool,
    soloed: bool,
    volume: f32,
}

impl Track {
    pub fn new(voice: Voice) -> Self {
        Self {
            voice,
            muted: false,
            soloed: false,
            volume: 1.0,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    pub fn set_soloed(&mut self, soloed: bool) {
        self.soloed = soloed;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}

/// Per-voice channel state for one loaded kit. Tracks are created when the
/// kit is loaded and live until the engine is torn down.
#[derive(Clone, Debug, Default)]
pub struct Mixer {
    tracks: Vec<Track>,
}

impl Mixer {
    pub fn from_kit(kit: Vec<Voice>) -> Self {
        Self {
            tracks: kit.into_iter().map(Track::new).collect(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: VoiceId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.voice.id == id)
    }

    pub fn track_mut(&mut self, id: VoiceId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.voice.id == id)
    }

    fn any_soloed(&self) -> bool {
        self.tracks.iter().any(|t| t.soloed)
    }

    /// The tracks that sound on the next tick. Soloing any track narrows the
    /// mix to the soloed set and overrides mute flags; otherwise everything
    /// that isn't muted plays.
    pub fn audible(&self) -> impl Iterator<Item = &Track> {
        let solo_mode = self.any_soloed();
        self.tracks
            .iter()
            .filter(move |t| if solo_mode { t.soloed } else { !t.muted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::{Category, Voice};

    fn mixer() -> Mixer {
        let kit = vec![
            Voice::new("A", Category::Kick),
            Voice::new("B", Category::Snare),
            Voice::new("C", Category::HiHat),
        ];
        Mixer::from_kit(kit)
    }

    fn audible_names(mixer: &Mixer) -> Vec<&str> {
        mixer.audible().map(|t| t.voice.name.as_str()).collect()
    }

    #[test]
    fn unmuted_tracks_play_by_default() {
        let mixer = mixer();
        assert_eq!(audible_names(&mixer), ["A", "B", "C"]);
    }

    #[test]
    fn mute_silences_a_track() {
        let mut mixer = mixer();
        let id = mixer.tracks()[1].voice.id;
        mixer.track_mut(id).unwrap().set_muted(true);
        assert_eq!(audible_names(&mixer), ["A", "C"]);
    }

    #[test]
    fn solo_overrides_mute() {
        let mut mixer = mixer();
        let b = mixer.tracks()[1].voice.id;
        mixer.track_mut(b).unwrap().set_muted(true);
        mixer.track_mut(b).unwrap().set_soloed(true);
        assert_eq!(audible_names(&mixer), ["B"]);
    }

    #[test]
    fn unsolo_restores_mute_rule() {
        let mut mixer = mixer();
        let b = mixer.tracks()[1].voice.id;
        mixer.track_mut(b).unwrap().set_muted(true);
        mixer.track_mut(b).unwrap().set_soloed(true);
        mixer.track_mut(b).unwrap().set_soloed(false);
        assert_eq!(audible_names(&mixer), ["A", "C"]);
    }

    #[test]
    fn track_volume_clamps() {
        let mut mixer = mixer();
        let id = mixer.tracks()[0].voice.id;
        mixer.track_mut(id).unwrap().set_volume(1.8);
        assert_eq!(mixer.track(id).unwrap().volume(), 1.0);
    }
}
