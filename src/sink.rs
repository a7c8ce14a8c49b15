//! Collaborator interfaces on the Body side of the bridge.
//!
//! The dispatcher's handlers talk to the presentation and audio layers
//! through these narrow traits. Rendering-parameter mapping and audio
//! decoding live entirely behind them — the bridge core never touches
//! either. The `Log*` implementations are the "console body" used by the
//! headless binary and by tests.

use crate::protocol::EmotionTag;

/// Avatar-facing presentation surface.
pub trait PresentationSink: Send {
    /// Switch the avatar's expression.
    fn set_emotion(&mut self, tag: EmotionTag);

    /// Toggle the talking animation.
    fn set_talking(&mut self, active: bool);

    /// Drive mouth-open / loudness, 0.0..=1.0.
    fn set_volume(&mut self, level: f32);
}

/// Audio playback surface.
pub trait AudioSink: Send {
    /// Load and play the clip at `path`. File handling and decoding are the
    /// implementor's problem.
    fn play_from_file(&mut self, path: &str) -> anyhow::Result<()>;
}

/// Presentation sink that logs transitions instead of rendering.
#[derive(Debug, Default)]
pub struct LogPresentation {
    current: Option<EmotionTag>,
    talking: bool,
}

impl PresentationSink for LogPresentation {
    fn set_emotion(&mut self, tag: EmotionTag) {
        if self.current != Some(tag) {
            log::info!("Emotion: {} -> {tag}", match self.current {
                Some(prev) => prev.as_str(),
                None => "(none)",
            });
            self.current = Some(tag);
        }
    }

    fn set_talking(&mut self, active: bool) {
        if self.talking != active {
            log::info!("Talking: {active}");
            self.talking = active;
        }
    }

    fn set_volume(&mut self, level: f32) {
        log::debug!("Volume: {level:.2}");
    }
}

/// Audio sink that logs the cue instead of playing it.
#[derive(Debug, Default)]
pub struct LogAudio;

impl AudioSink for LogAudio {
    fn play_from_file(&mut self, path: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!path.is_empty(), "audio cue carried no path");
        log::info!("Audio cue: {path}");
        Ok(())
    }
}
