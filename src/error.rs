//! Error taxonomy for the voice loop.

/// Errors surfaced by the voice ports and the controller.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Speech capture (or output) is not supported on this platform.
    /// Surfaced once to the user; never retried automatically. An engine
    /// that vanishes mid-session is reported through the session's
    /// terminal `End` instead.
    #[error("speech capture is not available on this platform")]
    CapabilityUnavailable,
}

/// Reason codes reported by a capture session.
///
/// `NoSpeech` and `NotAllowed` are terminal: the user has to re-enable
/// voice input manually. Everything else is retried with a backoff delay
/// while auto-chat remains enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CaptureErrorKind {
    #[error("no speech was detected")]
    NoSpeech,
    #[error("microphone access was not allowed")]
    NotAllowed,
    #[error("audio capture failed")]
    Audio,
    #[error("recognizer network error")]
    Network,
    #[error("capture was aborted")]
    Aborted,
}

impl CaptureErrorKind {
    /// Whether the controller may schedule an automatic restart after
    /// this error.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, CaptureErrorKind::NoSpeech | CaptureErrorKind::NotAllowed)
    }
}
