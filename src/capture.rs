//! Channel-backed speech capture adapter.
//!
//! The recognizer itself lives outside this crate (a platform speech
//! engine driven by the host UI). This module bridges it to the
//! [`SpeechCapture`](crate::ports::SpeechCapture) port: each `start()`
//! hands the engine a [`RecognizerBinding`] over a control channel, and a
//! translator task turns the engine's raw result batches into the
//! per-session [`CaptureEvent`] stream the controller consumes.

use crate::error::{CaptureErrorKind, VoiceError};
use crate::ports::{CaptureEvent, CaptureSession, SessionHandle, SpeechCapture};
use tokio::sync::mpsc;

/// One recognized alternative inside a results batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    /// The engine judged the user to have paused; the text will no
    /// longer be revised.
    pub is_final: bool,
}

impl Segment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Raw per-session messages a recognizer engine delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// A batch of result segments, possibly mixing interim and final
    /// text for the current utterance.
    Results(Vec<Segment>),
    /// The engine terminated the session (timeout, explicit stop,
    /// silence).
    Ended,
    /// A recognition error. The session may still end afterwards.
    Failed(CaptureErrorKind),
}

/// Everything the engine needs to service one capture session: a sender
/// for its raw events and a receiver that fires when the owner requests
/// termination.
#[derive(Debug)]
pub struct RecognizerBinding {
    pub events: mpsc::UnboundedSender<RecognizerEvent>,
    pub stop: mpsc::UnboundedReceiver<()>,
}

/// A results batch reduced to what the controller cares about: at most
/// one interim text (live display only) and at most one final text.
#[derive(Debug, Default, PartialEq)]
pub struct ReducedBatch {
    pub interim: Option<String>,
    pub final_text: Option<String>,
}

/// Collapses a results batch. Only the MOST RECENT final segment is kept;
/// earlier finals in the same batch are superseded, not concatenated.
/// Likewise only the latest interim survives, and it is never a dispatch
/// candidate.
pub fn reduce_batch(batch: &[Segment]) -> ReducedBatch {
    let mut reduced = ReducedBatch::default();
    for segment in batch {
        if segment.is_final {
            reduced.final_text = Some(segment.text.clone());
        } else {
            reduced.interim = Some(segment.text.clone());
        }
    }
    reduced
}

/// [`SpeechCapture`] implementation backed by an external recognizer
/// engine reachable over a control channel. The engine side opens one
/// recognition stream per [`RecognizerBinding`] it receives.
pub struct ChannelCapture {
    engine_tx: mpsc::UnboundedSender<RecognizerBinding>,
}

impl ChannelCapture {
    pub fn new(engine_tx: mpsc::UnboundedSender<RecognizerBinding>) -> Self {
        Self { engine_tx }
    }
}

impl SpeechCapture for ChannelCapture {
    fn start(&mut self) -> Result<CaptureSession, VoiceError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<RecognizerEvent>();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel::<()>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<CaptureEvent>();

        // An engine that dropped its control channel counts as absent.
        self.engine_tx
            .send(RecognizerBinding {
                events: raw_tx,
                stop: stop_rx,
            })
            .map_err(|_| VoiceError::CapabilityUnavailable)?;

        // Translator: raw engine messages in, capture events out. It owns
        // the exactly-one-terminal-End contract, covering engines that
        // vanish without sending `Ended`.
        tokio::spawn(async move {
            let mut ended = false;
            while let Some(raw) = raw_rx.recv().await {
                match raw {
                    RecognizerEvent::Results(batch) => {
                        let reduced = reduce_batch(&batch);
                        // Interim goes out first so a final in the same
                        // batch arms the debounce last.
                        if let Some(text) = reduced.interim {
                            if event_tx.send(CaptureEvent::Interim(text)).is_err() {
                                return;
                            }
                        }
                        if let Some(text) = reduced.final_text {
                            if event_tx.send(CaptureEvent::Final(text)).is_err() {
                                return;
                            }
                        }
                    }
                    RecognizerEvent::Failed(kind) => {
                        tracing::warn!("recognizer reported {kind}");
                        if event_tx.send(CaptureEvent::Error(kind)).is_err() {
                            return;
                        }
                    }
                    RecognizerEvent::Ended => {
                        ended = true;
                        let _ = event_tx.send(CaptureEvent::End);
                        break;
                    }
                }
            }
            if !ended {
                let _ = event_tx.send(CaptureEvent::End);
            }
        });

        Ok(CaptureSession::new(event_rx, SessionHandle::new(stop_tx)))
    }
}
