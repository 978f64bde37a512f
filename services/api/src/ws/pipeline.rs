//! Outbound half of a connection: framing, chunking and paced audio delivery.

use super::protocol::ServerMessage;
use anyhow::Result;
use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use std::{pin::Pin, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maximum size of one binary audio frame.
pub const AUDIO_CHUNK_SIZE: usize = 32 * 1024;
/// Gap between consecutive audio frames.
pub const AUDIO_CHUNK_PACING: Duration = Duration::from_millis(50);

/// Type-erased writer half of a connection.
pub type Outbound = Pin<Box<dyn Sink<Message, Error = anyhow::Error> + Send>>;

/// The writer shared by the read loop, the silence detector and rounds.
pub type SharedSink = Arc<Mutex<Outbound>>;

/// Wraps any message sink (a socket half in production, a channel in tests).
pub fn outbound<S>(sink: S) -> SharedSink
where
    S: Sink<Message> + Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    Arc::new(Mutex::new(Box::pin(sink.sink_map_err(anyhow::Error::new))))
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(sink: &mut Outbound, msg: &ServerMessage) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    sink.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Splits an audio payload into in-order frames of at most [`AUDIO_CHUNK_SIZE`] bytes.
pub fn audio_chunks(audio: &Bytes) -> impl Iterator<Item = Bytes> + '_ {
    (0..audio.len())
        .step_by(AUDIO_CHUNK_SIZE)
        .map(|start| audio.slice(start..(start + AUDIO_CHUNK_SIZE).min(audio.len())))
}

/// Writes `audio` as paced binary frames and returns how many were sent.
///
/// A write failure aborts the remaining frames. Cancellation stops delivery
/// between frames.
pub async fn deliver_audio(
    sink: &SharedSink,
    audio: Bytes,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut sent = 0;
    for chunk in audio_chunks(&audio) {
        if sent > 0 {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(sent, "Audio delivery cancelled");
                    return Ok(sent);
                }
                _ = tokio::time::sleep(AUDIO_CHUNK_PACING) => {}
            }
        }
        sink.lock().await.send(Message::Binary(chunk)).await?;
        sent += 1;
    }
    debug!(chunks = sent, bytes = audio.len(), "Audio delivered");
    Ok(sent)
}
