//! Capability ports for the turn controller.
//!
//! Browser-style speech capabilities are modeled as injected ports rather
//! than concrete globals, so the controller can be driven in tests by fake
//! ports that emit scripted event sequences. Three boundaries exist:
//! speech capture (continuous recognition), speech output (synthesis), and
//! the assistant client (one request/response exchange per turn).

use crate::error::{CaptureErrorKind, VoiceError};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::{mpsc, oneshot};

/// Events a live capture session yields.
///
/// A session produces any number of `Interim`/`Final`/`Error` events and
/// exactly one terminal `End`, after which its channel closes.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Accumulated text for the current utterance, still being revised.
    /// Used for live display only, never dispatched.
    Interim(String),
    /// The capability judged the user to have paused; this text is a
    /// candidate for dispatch once the debounce window elapses.
    Final(String),
    /// The session ended, for any reason (internal timeout, explicit
    /// stop, silence).
    End,
    /// Something went wrong; the kind decides whether an automatic
    /// restart is permitted.
    Error(CaptureErrorKind),
}

/// Owner-side handle for requesting termination of a capture session.
///
/// `stop` is idempotent and never fails: a stop on a dead session is a
/// no-op, and a backend that already went away is treated as stopped.
#[derive(Debug)]
pub struct SessionHandle {
    stop_tx: mpsc::UnboundedSender<()>,
    stopped: bool,
}

impl SessionHandle {
    pub(crate) fn new(stop_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            stop_tx,
            stopped: false,
        }
    }

    /// Requests termination. The terminal `End` event still arrives
    /// asynchronously on the session's event channel.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        // The backend may already be gone; that is equivalent to stopped.
        let _ = self.stop_tx.send(());
    }
}

/// A live capture session: a stream of transcript events plus the handle
/// used to stop it. At most one session is live at a time; the controller
/// enforces this by tearing down the previous session before starting a
/// new one.
#[derive(Debug)]
pub struct CaptureSession {
    pub(crate) events: mpsc::UnboundedReceiver<CaptureEvent>,
    pub(crate) handle: SessionHandle,
}

impl CaptureSession {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<CaptureEvent>,
        handle: SessionHandle,
    ) -> Self {
        Self { events, handle }
    }

    /// Splits the session into its event stream and stop handle, so the
    /// stream can be pumped from a separate task while the owner keeps
    /// the ability to stop it.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<CaptureEvent>, SessionHandle) {
        (self.events, self.handle)
    }
}

/// Continuous speech-to-text capability.
#[cfg_attr(test, automock)]
pub trait SpeechCapture: Send {
    /// Begins a capture session. Fails with
    /// [`VoiceError::CapabilityUnavailable`] when the platform offers no
    /// recognizer; callers surface that once and must not retry
    /// automatically.
    fn start(&mut self) -> Result<CaptureSession, VoiceError>;
}

/// Single-fire signal that resolves when an utterance finishes playing.
/// The sender side being dropped (cancellation, missing capability) also
/// resolves the await, so callers are never blocked.
pub type CompletionSignal = oneshot::Receiver<()>;

/// Text-to-speech capability.
pub trait SpeechOutput: Send + Sync {
    /// Cancels any in-flight utterance for this port and begins
    /// vocalizing `text`. There is no error path: a missing capability
    /// degrades to a signal that resolves immediately.
    fn speak(&self, text: &str) -> CompletionSignal;

    /// Cancels all in-flight speech.
    fn cancel_all(&self);
}

// The assistant boundary is one call per turn: user text in, reply text
// out, or a failure the controller recovers from locally. Transport and
// payload framing belong to the concrete client. `automock` generates
// `MockAssistantClient` for controller tests, so turn-taking logic is
// exercised without a network.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait AssistantClient: Send + Sync {
    async fn dispatch(&self, text: &str) -> Result<String>;
}
