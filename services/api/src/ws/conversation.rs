//! Per-connection session: phase tracking, audio accounting and end-of-utterance
//! detection.
//!
//! All state lives behind one async mutex. Whenever both are needed the state
//! lock is taken before the sink lock.

use super::{
    cycle,
    pipeline::{SharedSink, send_msg},
    protocol::{Phase, ServerMessage},
};
use crate::config::SessionSettings;
use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::SinkExt;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;
use voicegate_core::{History, LlmManager, TtsManager};

/// Placeholder transcript for audio-driven rounds; audio is never recognized.
pub const PLACEHOLDER_TRANSCRIPT: &str =
    "这是模拟的语音识别结果，实际应用中应对音频进行真实的语音识别。";

/// How often the silence detector wakes up.
pub const SILENCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Mutable session state, guarded by [`Session::state`].
pub(crate) struct SessionState {
    pub(crate) phase: Phase,
    pub(crate) audio_frames: usize,
    pub(crate) audio_bytes: usize,
    pub(crate) last_audio_at: Instant,
    pub(crate) history: History,
    /// Number of the most recent round; older rounds are stale.
    pub(crate) round: u64,
    round_cancel: Option<CancellationToken>,
    device_id: Option<String>,
    client_id: Option<String>,
    audio_params: Option<serde_json::Value>,
}

impl SessionState {
    fn reset_audio(&mut self) {
        self.audio_frames = 0;
        self.audio_bytes = 0;
    }

    /// Forgets the cancellation handle of a round that ran to completion.
    pub(crate) fn finish_round(&mut self) {
        self.round_cancel = None;
    }

    /// Enters Idle, which always clears the audio counters.
    pub(crate) fn enter_idle(&mut self) {
        self.phase = Phase::Idle;
        self.reset_audio();
    }
}

/// Server-side state for one connected device.
pub struct Session {
    pub id: Uuid,
    pub remote_addr: SocketAddr,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) sink: SharedSink,
    pub(crate) llm: Arc<LlmManager>,
    pub(crate) tts: Arc<TtsManager>,
    pub(crate) settings: Arc<SessionSettings>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        id: Uuid,
        remote_addr: SocketAddr,
        sink: SharedSink,
        llm: Arc<LlmManager>,
        tts: Arc<TtsManager>,
        settings: Arc<SessionSettings>,
    ) -> Arc<Self> {
        let history = History::new(settings.system_prompt.clone());
        Arc::new(Self {
            id,
            remote_addr,
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                audio_frames: 0,
                audio_bytes: 0,
                last_audio_at: Instant::now(),
                history,
                round: 0,
                round_cancel: None,
                device_id: None,
                client_id: None,
                audio_params: None,
            }),
            sink,
            llm,
            tts,
            settings,
            cancel: CancellationToken::new(),
        })
    }

    /// Records identities supplied by the upgrade request headers.
    pub async fn set_identity(&self, device_id: Option<String>, client_id: Option<String>) {
        let mut state = self.state.lock().await;
        state.device_id = device_id;
        state.client_id = client_id;
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn identity(&self) -> (Option<String>, Option<String>) {
        let state = self.state.lock().await;
        (state.device_id.clone(), state.client_id.clone())
    }

    /// Sends one message, logging instead of propagating write failures.
    pub async fn send(&self, msg: &ServerMessage) -> bool {
        let mut sink = self.sink.lock().await;
        match send_msg(&mut sink, msg).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to send message");
                false
            }
        }
    }

    /// Handles the device hello. Header-supplied identities take precedence.
    pub async fn handle_hello(
        &self,
        transport: Option<String>,
        device_id: Option<String>,
        client_id: Option<String>,
        audio_params: Option<serde_json::Value>,
    ) {
        {
            let mut state = self.state.lock().await;
            if state.device_id.is_none() {
                state.device_id = device_id;
            }
            if state.client_id.is_none() {
                state.client_id = client_id;
            }
            if audio_params.is_some() {
                state.audio_params = audio_params;
            }
            info!(
                transport = transport.as_deref().unwrap_or("unknown"),
                device_id = state.device_id.as_deref().unwrap_or(""),
                client_id = state.client_id.as_deref().unwrap_or(""),
                audio_params = ?state.audio_params,
                "Processed client hello"
            );
        }
        self.send(&ServerMessage::server_hello(self.id)).await;
    }

    /// Counts an inbound audio frame, leaving Idle on the first one.
    pub async fn handle_audio(&self, data: Bytes) {
        let mut state = self.state.lock().await;
        state.last_audio_at = Instant::now();

        if state.phase == Phase::Idle {
            state.phase = Phase::Listening;
            state.audio_frames = 1;
            state.audio_bytes = data.len();
            info!(session_id = %self.id, "Phase changed to listening");
            let mut sink = self.sink.lock().await;
            for msg in [ServerMessage::listen(Phase::Listening), ServerMessage::ListeningStart] {
                if let Err(e) = send_msg(&mut sink, &msg).await {
                    warn!(session_id = %self.id, error = %e, "Failed to send listening notice");
                }
            }
        } else {
            state.audio_frames += 1;
            state.audio_bytes += data.len();
        }

        if state.audio_frames % 20 == 0 {
            debug!(frames = state.audio_frames, bytes = state.audio_bytes, "Audio received");
        }

        if self.settings.audio_echo {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Binary(data)).await {
                warn!(session_id = %self.id, error = %e, "Failed to echo audio frame");
            }
        }
    }

    /// Explicit start of speech. Only resets counters.
    pub async fn handle_listening_start(&self) {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Idle | Phase::Listening => {
                debug!(phase = %state.phase, "Listening start, counters reset");
                state.reset_audio();
            }
            Phase::Thinking | Phase::Speaking => {
                debug!(phase = %state.phase, "Ignoring listening start");
            }
        }
    }

    /// Explicit end of speech.
    pub async fn handle_listening_stop(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Listening {
            debug!(phase = %state.phase, "Ignoring listening stop");
            return;
        }

        if state.audio_frames >= self.settings.min_audio_frames {
            self.begin_round(&mut state, PLACEHOLDER_TRANSCRIPT.to_string())
                .await;
        } else {
            info!(frames = state.audio_frames, "Not enough audio, discarding");
            state.enter_idle();
            let mut sink = self.sink.lock().await;
            if let Err(e) = send_msg(&mut sink, &ServerMessage::listen(Phase::Idle)).await {
                warn!(session_id = %self.id, error = %e, "Failed to send idle notice");
            }
        }
    }

    /// A text utterance; supersedes any round in flight.
    pub async fn handle_text(self: &Arc<Self>, text: String) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        info!(chars = text.chars().count(), "Processing text message");
        self.begin_round(&mut state, text).await;
    }

    /// Starts the fixed-interval silence detector. It stops with the session.
    pub fn spawn_silence_detector(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(SILENCE_POLL_INTERVAL);
                loop {
                    tokio::select! {
                        _ = session.cancel.cancelled() => break,
                        _ = ticker.tick() => session.check_silence().await,
                    }
                }
                debug!("Silence detector stopped");
            }
            .in_current_span(),
        )
    }

    /// Starts a round if the device has gone quiet after enough audio.
    pub(crate) async fn check_silence(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.phase == Phase::Listening
            && state.audio_frames >= self.settings.min_audio_frames
            && state.last_audio_at.elapsed() >= self.settings.silence_threshold
        {
            info!(
                frames = state.audio_frames,
                bytes = state.audio_bytes,
                "Silence detected"
            );
            self.begin_round(&mut state, PLACEHOLDER_TRANSCRIPT.to_string())
                .await;
        }
    }

    /// Moves to Thinking and spawns the round task. Called with the state lock held.
    async fn begin_round(self: &Arc<Self>, state: &mut SessionState, utterance: String) {
        if let Some(previous) = state.round_cancel.take() {
            previous.cancel();
            debug!(round = state.round, "Superseded round in flight");
        }
        state.round += 1;
        state.phase = Phase::Thinking;
        let round = state.round;
        let token = self.cancel.child_token();
        state.round_cancel = Some(token.clone());

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = send_msg(&mut sink, &ServerMessage::listen(Phase::Thinking)).await {
                warn!(session_id = %self.id, error = %e, "Failed to send thinking notice");
            }
        }

        let span = tracing::info_span!("round", round);
        tokio::spawn(cycle::run_round(Arc::clone(self), round, utterance, token).instrument(span));
    }

    /// Cancels the silence detector and any round in flight.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
