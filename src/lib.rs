//! Voice turn-taking for a conversational chat front end.
//!
//! This crate provides:
//! - The turn controller: continuous listening, silence debounce,
//!   dispatch to the assistant, spoken replies, automatic re-listening
//! - Capability ports for speech capture, speech output, and the
//!   assistant boundary, injectable for testing
//! - Channel-backed adapters bridging external recognizer/synthesizer
//!   engines
//! - An append-only transcript log shared with the renderer
//!
//! The controller is the interesting part: it survives transient
//! recognition errors, overlapping events, and cancellation, and it
//! re-checks the auto-chat flag at the moment any delayed action fires,
//! never at the moment it was scheduled.

pub mod assistant;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod output;
pub mod ports;
pub mod transcript;

pub use assistant::HttpAssistantClient;
pub use capture::{ChannelCapture, RecognizerBinding, RecognizerEvent, Segment};
pub use config::{Config, ConfigError, TurnTimings};
pub use controller::{
    Phase, Status, TurnController, TurnHandle, UiEvent, DISPATCH_FAILURE_REPLY,
};
pub use error::{CaptureErrorKind, VoiceError};
pub use output::{select_voice, ChannelSpeechOutput, NoopSpeechOutput, SynthesisCommand, VoiceInfo};
pub use ports::{
    AssistantClient, CaptureEvent, CaptureSession, CompletionSignal, SessionHandle, SpeechCapture,
    SpeechOutput,
};
pub use transcript::{Message, Sender, TranscriptLog};
