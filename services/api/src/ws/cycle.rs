//! One generation round: utterance in, reply text and speech out.

use super::{
    conversation::Session,
    pipeline::{deliver_audio, send_msg},
    protocol::{Phase, ServerMessage},
};
use crate::config::GenerationMode;
use bytes::Bytes;
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicegate_core::{GenerationOptions, Message, ProviderError, SynthesisOptions};

/// Reply used when generation fails or comes back empty.
pub const APOLOGY_TEXT: &str = "抱歉，我暂时无法回答您的问题。请稍后再试。";

/// Stand-in speaking time when no audio could be produced.
pub const SIMULATED_SPEECH_DELAY: Duration = Duration::from_secs(1);

/// Runs a round to completion unless `cancel` fires first.
pub(crate) async fn run_round(
    session: Arc<Session>,
    round: u64,
    utterance: String,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => debug!("Round cancelled"),
        _ = execute_round(&session, round, utterance, &cancel) => {}
    }
}

async fn execute_round(
    session: &Arc<Session>,
    round: u64,
    utterance: String,
    cancel: &CancellationToken,
) {
    let messages = {
        let state = session.state.lock().await;
        state.history.with_pending(Message::user(utterance.clone()))
    };

    let reply = match generate_reply(session, round, &messages).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("Generation returned an empty reply");
            APOLOGY_TEXT.to_string()
        }
        Err(e) => {
            warn!(error = %e, "Generation failed");
            APOLOGY_TEXT.to_string()
        }
    };

    {
        let mut state = session.state.lock().await;
        if state.round != round {
            debug!("Round superseded before speaking");
            return;
        }
        state
            .history
            .push_exchange(Message::user(utterance), Message::assistant(reply.clone()));
        state.phase = Phase::Speaking;

        let mut sink = session.sink.lock().await;
        for msg in [
            ServerMessage::Text {
                text: reply.clone(),
            },
            ServerMessage::listen(Phase::Speaking),
        ] {
            if let Err(e) = send_msg(&mut sink, &msg).await {
                warn!(error = %e, "Failed to send reply notice");
            }
        }
    }

    speak(session, &reply, cancel).await;

    let mut state = session.state.lock().await;
    if state.round != round || state.phase != Phase::Speaking {
        return;
    }
    state.enter_idle();
    state.finish_round();
    let mut sink = session.sink.lock().await;
    if let Err(e) = send_msg(&mut sink, &ServerMessage::listen(Phase::Idle)).await {
        warn!(error = %e, "Failed to send idle notice");
    }
    info!(history = state.history.len(), "Round complete");
}

/// Obtains the reply text in the configured mode.
///
/// Relayed `text_delta` frames are provisional. If the stream fails part way
/// the round falls back to the apology, and the `text` frame that follows is
/// the reply the device should keep.
async fn generate_reply(
    session: &Arc<Session>,
    round: u64,
    messages: &[Message],
) -> Result<String, ProviderError> {
    let options = GenerationOptions::new();
    match session.settings.generation_mode {
        GenerationMode::Batch => Ok(session.llm.generate(messages, &options).await?.content),
        GenerationMode::Stream => {
            let mut stream = session.llm.generate_stream(messages, &options).await?;
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if session.settings.relay_text_deltas && !chunk.content.is_empty() {
                    relay_delta(session, round, &chunk.content).await;
                }
                text.push_str(&chunk.content);
                if chunk.is_final {
                    break;
                }
            }
            Ok(text)
        }
    }
}

/// Forwards one fragment, unless the round has been superseded.
async fn relay_delta(session: &Arc<Session>, round: u64, fragment: &str) {
    let state = session.state.lock().await;
    if state.round != round {
        return;
    }
    let mut sink = session.sink.lock().await;
    let msg = ServerMessage::TextDelta {
        text: fragment.to_string(),
    };
    if let Err(e) = send_msg(&mut sink, &msg).await {
        warn!(error = %e, "Failed to relay text delta");
    }
}

/// Synthesizes and delivers the reply, or waits out the simulated delay.
async fn speak(session: &Arc<Session>, reply: &str, cancel: &CancellationToken) {
    let options = SynthesisOptions::from([
        ("voice_id".to_string(), session.settings.tts_voice.clone()),
        ("format".to_string(), session.settings.tts_format.clone()),
    ]);

    let audio = match session.tts.synthesize(reply, &options).await {
        Ok(audio) if !audio.is_empty() => Some(Bytes::from(audio)),
        Ok(_) => {
            warn!("Synthesis returned no audio");
            None
        }
        Err(e) => {
            warn!(error = %e, "Synthesis failed");
            None
        }
    };

    match audio {
        Some(audio) => {
            if let Err(e) = deliver_audio(&session.sink, audio, cancel).await {
                warn!(error = %e, "Audio delivery aborted");
            }
        }
        None => tokio::time::sleep(SIMULATED_SPEECH_DELAY).await,
    }
}
