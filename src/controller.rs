//! The voice turn controller.
//!
//! Owns the auto-chat mode flag, the listening lifecycle, the silence
//! debounce, and the restart/error-recovery policy. Sequences the speech
//! capture port, the assistant client, the message log, and the speech
//! output port into the turn loop:
//!
//! user speech -> capture -> debounce -> dispatch -> append + speak ->
//! restart capture (while auto-chat stays enabled).
//!
//! All state lives in one task that drains a single [`TurnEvent`]
//! channel; side effects (timers, dispatch, speech completion, capture
//! pumping) are spawned helpers that only ever report back through that
//! channel. Stale reports are filtered at receipt: capture events carry
//! a session epoch, timer fires carry the generation they were armed
//! with, and speech completions carry an utterance generation. That is
//! what makes "re-check at fire time" hold even for messages that were
//! already queued when the user flipped auto-chat off.

use crate::config::TurnTimings;
use crate::error::{CaptureErrorKind, VoiceError};
use crate::ports::{AssistantClient, CaptureEvent, SessionHandle, SpeechCapture, SpeechOutput};
use crate::transcript::{Message, Sender, TranscriptLog};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Reply substituted for the assistant's when a dispatch fails. The turn
/// loop continues exactly as if the call had succeeded.
pub const DISPATCH_FAILURE_REPLY: &str =
    "Sorry, I couldn't get an answer just now. Please try again.";

/// Logical state of the voice session, derived from the controller's
/// fields. Auto-chat is an orthogonal mode flag layered on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listening,
    Debouncing,
    Dispatching,
    Speaking,
}

/// Renderer-facing notifications.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Live display text for the utterance still being revised.
    Interim(String),
    MessageAppended(Message),
    ListeningChanged(bool),
    /// Alert-level: speech capture is not supported here. Emitted once
    /// per attempt; the controller never retries on its own.
    CaptureUnavailable,
}

/// Snapshot of the session voice state, published through a watch
/// channel after every handled event.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub auto_chat: bool,
    pub listening: bool,
    pub awaiting_reply: bool,
    pub phase: Phase,
}

/// Everything the controller task reacts to.
#[derive(Debug)]
pub(crate) enum TurnEvent {
    SetAutoChat(bool),
    Capture { epoch: u64, event: CaptureEvent },
    DebounceFired(u64),
    RestartFired(u64),
    DispatchDone(Result<String, String>),
    SpeechDone(u64),
    Shutdown,
}

/// Cheap handle for driving the controller from the UI layer.
#[derive(Clone)]
pub struct TurnHandle {
    tx: mpsc::UnboundedSender<TurnEvent>,
}

impl TurnHandle {
    /// Flips auto-chat mode. On enables continuous listening; off stops
    /// the capture session, cancels pending timers, and cancels
    /// in-flight speech. Safe to call from any state.
    pub fn set_auto_chat(&self, on: bool) {
        let _ = self.tx.send(TurnEvent::SetAutoChat(on));
    }

    /// Tears the session down (widget unmount).
    pub fn shutdown(&self) {
        let _ = self.tx.send(TurnEvent::Shutdown);
    }
}

pub struct TurnController {
    capture: Box<dyn SpeechCapture>,
    speech: Arc<dyn SpeechOutput>,
    assistant: Arc<dyn AssistantClient>,
    log: TranscriptLog,
    timings: TurnTimings,

    tx: mpsc::UnboundedSender<TurnEvent>,
    ui_tx: broadcast::Sender<UiEvent>,
    status_tx: watch::Sender<Status>,

    auto_chat: bool,
    listening: bool,
    pending_final: String,
    awaiting_reply: bool,
    speaking: bool,

    // Invariant: at most one live capture session; previous one is
    // always torn down (and its epoch retired) before a new one opens.
    session: Option<SessionHandle>,
    capture_epoch: u64,
    // Set by a non-recoverable capture error so the session's trailing
    // `End` cannot schedule a restart either. Cleared on the next
    // explicit start.
    terminal_error: bool,

    // Invariant: at most one live debounce timer and one live restart
    // timer. Cancelling retires the generation, so an already-queued
    // fire from the old timer is ignored.
    debounce_task: Option<JoinHandle<()>>,
    debounce_gen: u64,
    restart_task: Option<JoinHandle<()>>,
    restart_gen: u64,

    speak_gen: u64,
}

impl TurnController {
    /// Builds the controller and runs it on its own task. Returns the
    /// driving handle, the renderer event stream, the status watch, and
    /// the task handle.
    pub fn spawn(
        capture: Box<dyn SpeechCapture>,
        speech: Arc<dyn SpeechOutput>,
        assistant: Arc<dyn AssistantClient>,
        log: TranscriptLog,
        timings: TurnTimings,
    ) -> (
        TurnHandle,
        broadcast::Receiver<UiEvent>,
        watch::Receiver<Status>,
        JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = broadcast::channel(64);
        let (status_tx, status_rx) = watch::channel(Status {
            auto_chat: false,
            listening: false,
            awaiting_reply: false,
            phase: Phase::Idle,
        });

        let controller = Self {
            capture,
            speech,
            assistant,
            log,
            timings,
            tx: tx.clone(),
            ui_tx,
            status_tx,
            auto_chat: false,
            listening: false,
            pending_final: String::new(),
            awaiting_reply: false,
            speaking: false,
            session: None,
            capture_epoch: 0,
            terminal_error: false,
            debounce_task: None,
            debounce_gen: 0,
            restart_task: None,
            restart_gen: 0,
            speak_gen: 0,
        };

        let task = tokio::spawn(controller.run(rx));
        (TurnHandle { tx }, ui_rx, status_rx, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<TurnEvent>) {
        while let Some(event) = rx.recv().await {
            let quit = matches!(event, TurnEvent::Shutdown);
            self.handle_event(event);
            self.publish_status();
            if quit {
                break;
            }
        }
        // Channel closed or explicit shutdown: release everything.
        self.stop_listening();
        self.speech.cancel_all();
        self.publish_status();
    }

    fn handle_event(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::SetAutoChat(on) => self.set_auto_chat(on),
            TurnEvent::Capture { epoch, event } => {
                if epoch != self.capture_epoch {
                    tracing::debug!("ignoring event from retired capture session: {event:?}");
                    return;
                }
                self.on_capture_event(event);
            }
            TurnEvent::DebounceFired(gen) => self.on_debounce_fired(gen),
            TurnEvent::RestartFired(gen) => self.on_restart_fired(gen),
            TurnEvent::DispatchDone(result) => self.on_dispatch_done(result),
            TurnEvent::SpeechDone(gen) => self.on_speech_done(gen),
            TurnEvent::Shutdown => {
                tracing::info!("voice session shutting down");
                self.stop_listening();
                self.speech.cancel_all();
            }
        }
    }

    fn set_auto_chat(&mut self, on: bool) {
        tracing::info!("auto-chat {}", if on { "enabled" } else { "disabled" });
        self.auto_chat = on;
        if on {
            if !self.listening {
                self.start_listening();
            }
        } else {
            self.stop_listening();
            self.speech.cancel_all();
        }
    }

    /// Opens a fresh capture session. No-op while auto-chat is off, so a
    /// stray delayed activation cannot start the microphone.
    fn start_listening(&mut self) {
        if !self.auto_chat {
            return;
        }
        // Single-session invariant is enforced here: whatever was live
        // before is stopped and its epoch retired. A fresh start also
        // supersedes any scheduled restart.
        self.teardown_session();
        self.cancel_restart();
        self.terminal_error = false;

        match self.capture.start() {
            Ok(session) => {
                self.capture_epoch += 1;
                let epoch = self.capture_epoch;
                let (mut events, handle) = session.into_parts();
                self.session = Some(handle);
                self.set_listening(true);

                let tx = self.tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if tx.send(TurnEvent::Capture { epoch, event }).is_err() {
                            break;
                        }
                    }
                });
                tracing::debug!("capture session {epoch} started");
            }
            Err(error @ VoiceError::CapabilityUnavailable) => {
                tracing::error!("failed to start capture session: {error}; not retrying");
                let _ = self.ui_tx.send(UiEvent::CaptureUnavailable);
                self.set_listening(false);
            }
        }
    }

    /// Stops capture and cancels every scheduled callback. Idempotent;
    /// stop failures are swallowed by construction so cleanup always
    /// completes.
    fn stop_listening(&mut self) {
        self.teardown_session();
        self.cancel_debounce();
        self.cancel_restart();
        self.set_listening(false);
    }

    fn on_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Interim(text) => {
                // Live display only. Interim results never arm the
                // debounce, they only clear a stale one.
                let _ = self.ui_tx.send(UiEvent::Interim(text));
                self.cancel_debounce();
            }
            CaptureEvent::Final(text) => {
                tracing::debug!("final transcript: {text:?}");
                self.cancel_debounce();
                // A newer final supersedes an undispatched one.
                self.pending_final = text;
                self.arm_debounce();
            }
            CaptureEvent::End => self.on_capture_end(),
            CaptureEvent::Error(kind) => self.on_capture_error(kind),
        }
    }

    fn on_capture_end(&mut self) {
        tracing::debug!("capture session {} ended", self.capture_epoch);
        self.session = None;
        self.set_listening(false);
        if !self.auto_chat {
            return;
        }
        if self.terminal_error {
            tracing::debug!("session ended after a terminal error; not restarting");
            return;
        }
        // Restart later rather than immediately so a capture start never
        // races an in-flight reply; the flag is re-checked at fire time.
        self.schedule_restart(self.timings.restart_delay(self.awaiting_reply));
    }

    fn on_capture_error(&mut self, kind: CaptureErrorKind) {
        tracing::warn!("capture error: {kind}");
        self.set_listening(false);
        if !kind.is_recoverable() {
            // NoSpeech / NotAllowed: the user has to re-enable manually.
            // The same session typically still delivers a terminal `End`
            // after the error, so the suppression has to outlive this
            // event.
            self.terminal_error = true;
            return;
        }
        if self.auto_chat {
            self.schedule_restart(self.timings.restart_delay(self.awaiting_reply));
        }
    }

    fn on_debounce_fired(&mut self, gen: u64) {
        if gen != self.debounce_gen {
            return; // cancelled after the fire was already queued
        }
        self.debounce_task = None;

        if self.pending_final.is_empty() {
            return;
        }
        if self.awaiting_reply {
            tracing::debug!("dispatch already in flight; dropping debounce fire");
            return;
        }

        // Cleared exactly once per dispatch; the same utterance can
        // never be dispatched twice.
        let text = std::mem::take(&mut self.pending_final);
        tracing::info!("dispatching utterance: {text:?}");
        self.append_message(Sender::User, &text);
        self.awaiting_reply = true;

        let assistant = self.assistant.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = assistant
                .dispatch(&text)
                .await
                .map_err(|error| format!("{error:#}"));
            let _ = tx.send(TurnEvent::DispatchDone(result));
        });
    }

    fn on_dispatch_done(&mut self, result: Result<String, String>) {
        // A reply that arrives after auto-chat was disabled is still
        // appended and spoken; only the restart below is gated.
        let reply = match result {
            Ok(text) => {
                tracing::info!("assistant replied: {text:?}");
                text
            }
            Err(error) => {
                tracing::warn!("assistant dispatch failed: {error}");
                DISPATCH_FAILURE_REPLY.to_string()
            }
        };
        self.append_message(Sender::Assistant, &reply);

        self.speaking = true;
        self.speak_gen += 1;
        let gen = self.speak_gen;
        let signal = self.speech.speak(&reply);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            // Err means cancelled or no capability; either way the turn
            // is over.
            let _ = signal.await;
            let _ = tx.send(TurnEvent::SpeechDone(gen));
        });
    }

    fn on_speech_done(&mut self, gen: u64) {
        if gen != self.speak_gen {
            return; // completion of a superseded utterance
        }
        self.speaking = false;
        self.awaiting_reply = false;
        if self.auto_chat {
            // Close the loop.
            self.start_listening();
        }
    }

    fn on_restart_fired(&mut self, gen: u64) {
        if gen != self.restart_gen {
            return;
        }
        self.restart_task = None;
        // Auto-chat may have been turned off during the delay.
        if !self.auto_chat {
            return;
        }
        self.start_listening();
    }

    fn arm_debounce(&mut self) {
        self.cancel_debounce();
        self.debounce_gen += 1;
        let gen = self.debounce_gen;
        let delay = self.timings.debounce;
        let tx = self.tx.clone();
        self.debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TurnEvent::DebounceFired(gen));
        }));
    }

    fn cancel_debounce(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
        self.debounce_gen += 1;
    }

    fn schedule_restart(&mut self, delay: Duration) {
        self.cancel_restart();
        self.restart_gen += 1;
        let gen = self.restart_gen;
        let tx = self.tx.clone();
        tracing::debug!("scheduling capture restart in {delay:?}");
        self.restart_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TurnEvent::RestartFired(gen));
        }));
    }

    fn cancel_restart(&mut self) {
        if let Some(task) = self.restart_task.take() {
            task.abort();
        }
        self.restart_gen += 1;
    }

    fn teardown_session(&mut self) {
        if let Some(mut handle) = self.session.take() {
            handle.stop();
        }
        // Retire the epoch so queued events from the old session's pump
        // cannot mutate state anymore.
        self.capture_epoch += 1;
    }

    fn set_listening(&mut self, on: bool) {
        if self.listening != on {
            self.listening = on;
            let _ = self.ui_tx.send(UiEvent::ListeningChanged(on));
        }
    }

    fn append_message(&mut self, sender: Sender, text: &str) {
        let message = self.log.append(sender, text);
        let _ = self.ui_tx.send(UiEvent::MessageAppended(message));
    }

    fn phase(&self) -> Phase {
        if self.speaking {
            Phase::Speaking
        } else if self.awaiting_reply {
            Phase::Dispatching
        } else if self.debounce_task.is_some() {
            Phase::Debouncing
        } else if self.listening {
            Phase::Listening
        } else {
            Phase::Idle
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(Status {
            auto_chat: self.auto_chat,
            listening: self.listening,
            awaiting_reply: self.awaiting_reply,
            phase: self.phase(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChannelCapture, RecognizerBinding, RecognizerEvent, Segment};
    use crate::output::NoopSpeechOutput;
    use crate::ports::MockAssistantClient;
    use std::sync::Mutex;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const MS: fn(u64) -> Duration = Duration::from_millis;

    struct Harness {
        handle: TurnHandle,
        status: watch::Receiver<Status>,
        log: TranscriptLog,
        engine_rx: mpsc::UnboundedReceiver<RecognizerBinding>,
        _ui: broadcast::Receiver<UiEvent>,
    }

    impl Harness {
        fn spawn(assistant: MockAssistantClient, speech: Arc<dyn SpeechOutput>) -> Self {
            let (engine_tx, engine_rx) = mpsc::unbounded_channel();
            let capture = Box::new(ChannelCapture::new(engine_tx));
            let log = TranscriptLog::new();
            let (handle, ui, status, _task) = TurnController::spawn(
                capture,
                speech,
                Arc::new(assistant),
                log.clone(),
                TurnTimings::default(),
            );
            Self {
                handle,
                status,
                log,
                engine_rx,
                _ui: ui,
            }
        }

        /// Waits for the controller to open the next capture session.
        async fn next_binding(&mut self) -> RecognizerBinding {
            timeout(Duration::from_secs(10), self.engine_rx.recv())
                .await
                .expect("controller should open a capture session")
                .expect("capture port still attached")
        }

        /// Asserts that no capture session is opened within `window`.
        async fn assert_no_binding(&mut self, window: Duration) {
            if let Ok(binding) = timeout(window, self.engine_rx.recv()).await {
                panic!("unexpected capture session: {binding:?}");
            }
        }

        fn status(&self) -> Status {
            self.status.borrow().clone()
        }
    }

    /// Speech output that holds utterances open until cancelled, for
    /// exercising the in-flight-speech cancellation path.
    #[derive(Default)]
    struct HeldSpeech {
        pending: Mutex<Vec<oneshot::Sender<()>>>,
    }

    impl SpeechOutput for HeldSpeech {
        fn speak(&self, _text: &str) -> crate::ports::CompletionSignal {
            let (done_tx, done_rx) = oneshot::channel();
            self.pending.lock().unwrap().push(done_tx);
            done_rx
        }

        fn cancel_all(&self) {
            self.pending.lock().unwrap().clear();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_a_single_utterance_round_trip() {
        let mut assistant = MockAssistantClient::new();
        assistant
            .expect_dispatch()
            .withf(|text| text == "hello")
            .once()
            .returning(|_| Box::pin(async { Ok("hi, how can I help?".to_string()) }));

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("hello")]))
            .unwrap();

        tokio::time::sleep(MS(1500)).await; // debounce window elapses

        let messages = h.log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].text, "hi, how can I help?");

        // Reply spoken (noop resolves at once) and auto-chat still on,
        // so listening resumed with a fresh session.
        let _second = h.next_binding().await;
        assert!(h.status().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_b_later_final_supersedes_earlier_one() {
        let mut assistant = MockAssistantClient::new();
        assistant
            .expect_dispatch()
            .withf(|text| text == "hi there")
            .once()
            .returning(|_| Box::pin(async { Ok("hello!".to_string()) }));

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("hi")]))
            .unwrap();
        tokio::time::sleep(MS(400)).await; // inside the debounce window
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized(
                "hi there",
            )]))
            .unwrap();

        tokio::time::sleep(MS(1500)).await;

        let messages = h.log.snapshot();
        assert_eq!(messages[0].text, "hi there"); // "hi" was discarded
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_c_dispatch_failure_substitutes_apology_and_continues() {
        let mut assistant = MockAssistantClient::new();
        assistant
            .expect_dispatch()
            .once()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("backend exploded")) }));

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized(
                "anyone there?",
            )]))
            .unwrap();
        tokio::time::sleep(MS(1500)).await;

        let messages = h.log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].text, DISPATCH_FAILURE_REPLY);

        // The loop survives the failure: listening resumes.
        let _second = h.next_binding().await;
        assert!(h.status().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_d_spontaneous_end_restarts_after_short_delay() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding.events.send(RecognizerEvent::Ended).unwrap();

        // No dispatch in flight, so the short idle delay applies: no new
        // session before 300 ms, one well before the busy delay (1 s).
        tokio::time::sleep(MS(150)).await;
        assert!(h.engine_rx.try_recv().is_err());
        tokio::time::sleep(MS(350)).await;
        h.engine_rx
            .try_recv()
            .expect("restart should land on the idle delay");
        assert!(h.status().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_e_disable_during_restart_delay_suppresses_restart() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding.events.send(RecognizerEvent::Ended).unwrap();
        tokio::time::sleep(MS(50)).await; // restart now pending
        h.handle.set_auto_chat(false);

        h.assert_no_binding(MS(2000)).await;
        let status = h.status();
        assert!(!status.listening);
        assert_eq!(status.phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn non_recoverable_errors_never_auto_restart() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Failed(CaptureErrorKind::NotAllowed))
            .unwrap();

        h.assert_no_binding(MS(3000)).await;
        let status = h.status();
        assert!(status.auto_chat); // mode stays on, capture does not
        assert!(!status.listening);
    }

    #[tokio::test(start_paused = true)]
    async fn not_allowed_error_followed_by_session_end_does_not_restart() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        // Real engines report the terminal error and then still close the
        // session; the end must not undo the no-restart decision.
        binding
            .events
            .send(RecognizerEvent::Failed(CaptureErrorKind::NotAllowed))
            .unwrap();
        binding.events.send(RecognizerEvent::Ended).unwrap();

        h.assert_no_binding(MS(3000)).await;
        let status = h.status();
        assert!(status.auto_chat);
        assert!(!status.listening);
        assert_eq!(status.phase, Phase::Idle);

        // An explicit re-enable clears the latch and listens again.
        h.handle.set_auto_chat(false);
        h.handle.set_auto_chat(true);
        let _fresh = h.next_binding().await;
        assert!(h.status().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn recoverable_error_restarts_while_auto_chat_is_on() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Failed(CaptureErrorKind::Network))
            .unwrap();

        let _second = h.next_binding().await;
        assert!(h.status().listening);
    }

    #[tokio::test(start_paused = true)]
    async fn interim_results_cancel_the_debounce_without_rearming() {
        let mut assistant = MockAssistantClient::new();
        assistant.expect_dispatch().never();

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("hello")]))
            .unwrap();
        tokio::time::sleep(MS(500)).await;
        // User keeps talking: interim arrives inside the window.
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::interim(
                "hello and also",
            )]))
            .unwrap();

        tokio::time::sleep(MS(3000)).await;
        assert!(h.log.is_empty());
        assert_eq!(h.status().phase, Phase::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_fire_during_dispatch_is_dropped() {
        let mut assistant = MockAssistantClient::new();
        assistant
            .expect_dispatch()
            .withf(|text| text == "first")
            .once()
            .returning(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(2000)).await;
                    Ok("slow reply".to_string())
                })
            });

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("first")]))
            .unwrap();
        // t=1000: dispatch starts, in flight until t=3000.
        tokio::time::sleep(MS(1200)).await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("second")]))
            .unwrap();
        // Its debounce fires at ~t=2200 while the dispatch is in flight
        // and must be dropped, not queued.
        tokio::time::sleep(MS(2500)).await;

        let messages = h.log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "slow reply");
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_kept_but_restart_is_gated_on_auto_chat() {
        let mut assistant = MockAssistantClient::new();
        assistant.expect_dispatch().once().returning(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(800)).await;
                Ok("late reply".to_string())
            })
        });

        let mut h = Harness::spawn(assistant, Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized(
                "question",
            )]))
            .unwrap();
        // t=1000: dispatch starts. Disable mid-flight.
        tokio::time::sleep(MS(1300)).await;
        h.handle.set_auto_chat(false);

        tokio::time::sleep(MS(1000)).await; // reply lands at ~t=1800

        let messages = h.log.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "late reply");

        // But no restart: the flag is re-checked when the reply path
        // finishes speaking.
        h.assert_no_binding(MS(2000)).await;
        assert_eq!(h.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_auto_chat_cancels_in_flight_speech() {
        let mut assistant = MockAssistantClient::new();
        assistant
            .expect_dispatch()
            .once()
            .returning(|_| Box::pin(async { Ok("a long reply".to_string()) }));
        let speech = Arc::new(HeldSpeech::default());

        let mut h = Harness::spawn(assistant, speech.clone());
        h.handle.set_auto_chat(true);

        let binding = h.next_binding().await;
        binding
            .events
            .send(RecognizerEvent::Results(vec![Segment::finalized("hello")]))
            .unwrap();
        tokio::time::sleep(MS(1200)).await;
        assert_eq!(h.status().phase, Phase::Speaking);

        h.handle.set_auto_chat(false);
        tokio::time::sleep(MS(100)).await;

        // The held utterance was cancelled, the turn settled, and no
        // restart followed.
        assert!(speech.pending.lock().unwrap().is_empty());
        h.assert_no_binding(MS(2000)).await;
        assert_eq!(h.status().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_capture_is_surfaced_once_and_never_retried() {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel::<RecognizerBinding>();
        drop(engine_rx); // platform has no recognizer
        let capture = Box::new(ChannelCapture::new(engine_tx));
        let log = TranscriptLog::new();
        let (handle, mut ui, status, _task) = TurnController::spawn(
            capture,
            Arc::new(NoopSpeechOutput),
            Arc::new(MockAssistantClient::new()),
            log,
            TurnTimings::default(),
        );

        handle.set_auto_chat(true);
        tokio::time::sleep(MS(50)).await;

        let mut saw_unavailable = false;
        while let Ok(event) = ui.try_recv() {
            if matches!(event, UiEvent::CaptureUnavailable) {
                saw_unavailable = true;
            }
        }
        assert!(saw_unavailable);
        let snapshot = status.borrow().clone();
        assert!(!snapshot.listening);
        assert_eq!(snapshot.phase, Phase::Idle);

        // Nothing is scheduled: the state stays Idle indefinitely.
        tokio::time::sleep(MS(5000)).await;
        assert_eq!(status.borrow().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_off_requests_capture_stop() {
        let mut h = Harness::spawn(MockAssistantClient::new(), Arc::new(NoopSpeechOutput));
        h.handle.set_auto_chat(true);

        let mut binding = h.next_binding().await;
        h.handle.set_auto_chat(false);

        assert_eq!(binding.stop.recv().await, Some(()));
        assert!(!h.status().listening);
    }
}
