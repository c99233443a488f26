//! Channel-backed speech output adapter and voice selection policy.
//!
//! Mirrors the capture side: the synthesizer engine is external, and
//! this module bridges it to the [`SpeechOutput`](crate::ports::SpeechOutput)
//! port. A platform without speech output uses [`NoopSpeechOutput`], which
//! resolves every utterance immediately so the turn loop never blocks.

use crate::ports::{CompletionSignal, SpeechOutput};
use tokio::sync::{mpsc, oneshot};

/// A voice offered by the platform synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP-47 language tag, e.g. "en-US".
    pub language: String,
}

/// Name fragments that signal a higher-quality voice.
const QUALITY_HINTS: &[&str] = &["natural", "neural", "premium", "enhanced"];

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

fn sounds_high_quality(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    QUALITY_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Picks a voice for the configured locale: a quality-flagged voice in
/// the right language wins, any language match is second best, and
/// `None` means the platform default voice should be used.
pub fn select_voice<'a>(voices: &'a [VoiceInfo], locale: &str) -> Option<&'a VoiceInfo> {
    let lang_matches = |voice: &VoiceInfo| {
        voice.language.eq_ignore_ascii_case(locale)
            || primary_subtag(&voice.language).eq_ignore_ascii_case(primary_subtag(locale))
    };

    voices
        .iter()
        .find(|v| lang_matches(v) && sounds_high_quality(&v.name))
        .or_else(|| voices.iter().find(|v| lang_matches(v)))
}

/// Commands sent to the synthesizer engine.
#[derive(Debug)]
pub enum SynthesisCommand {
    Speak {
        text: String,
        /// Selected voice name, or `None` for the platform default.
        voice: Option<String>,
        /// Fired by the engine when playback finishes normally. Dropping
        /// it (cancellation, engine shutdown) also releases the waiter.
        done: oneshot::Sender<()>,
    },
    CancelAll,
}

/// [`SpeechOutput`] backed by an external synthesizer engine.
pub struct ChannelSpeechOutput {
    engine_tx: mpsc::UnboundedSender<SynthesisCommand>,
    voice: Option<String>,
}

impl ChannelSpeechOutput {
    pub fn new(engine_tx: mpsc::UnboundedSender<SynthesisCommand>) -> Self {
        Self {
            engine_tx,
            voice: None,
        }
    }

    /// Uses the given voice for every utterance instead of the platform
    /// default. Typically the result of [`select_voice`].
    pub fn with_voice(mut self, name: impl Into<String>) -> Self {
        self.voice = Some(name.into());
        self
    }
}

impl SpeechOutput for ChannelSpeechOutput {
    fn speak(&self, text: &str) -> CompletionSignal {
        let (done_tx, done_rx) = oneshot::channel();

        // A new utterance supersedes whatever is still playing.
        if self.engine_tx.send(SynthesisCommand::CancelAll).is_err() {
            // Engine is gone; degrade to an immediately-resolved signal.
            let _ = done_tx.send(());
            return done_rx;
        }
        let _ = self.engine_tx.send(SynthesisCommand::Speak {
            text: text.to_owned(),
            voice: self.voice.clone(),
            done: done_tx,
        });
        done_rx
    }

    fn cancel_all(&self) {
        let _ = self.engine_tx.send(SynthesisCommand::CancelAll);
    }
}

/// Speech output for platforms without a synthesizer. Every utterance
/// "finishes" immediately, so downstream turn logic proceeds untouched.
pub struct NoopSpeechOutput;

impl SpeechOutput for NoopSpeechOutput {
    fn speak(&self, _text: &str) -> CompletionSignal {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(());
        done_rx
    }

    fn cancel_all(&self) {}
}
