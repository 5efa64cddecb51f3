use std::fmt;

use crate::kit::VoiceId;
use crate::pattern::PatternId;

/// Structural failures surfaced to the command layer. Out-of-range slider
/// values are not errors; they clamp at the edge they cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Playback was requested before an audio output was attached.
    NotReady,
    /// An operation referenced a voice that is not part of the kit.
    UnknownVoice(VoiceId),
    /// An operation referenced a pattern that is not in the library.
    UnknownPattern(PatternId),
    /// The trigger queue is saturated and the sound was dropped.
    QueueFull,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotReady => write!(f, "audio output is not ready"),
            EngineError::UnknownVoice(id) => write!(f, "unknown voice {}", id),
            EngineError::UnknownPattern(id) => write!(f, "unknown pattern {}", id),
            EngineError::QueueFull => write!(f, "trigger queue is full"),
        }
    }
}

impl std::error::Error for EngineError {}
