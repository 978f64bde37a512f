//! Manages the WebSocket connection lifecycle for a device session.

use super::{conversation::Session, pipeline::outbound, protocol::ClientMessage};
use crate::state::AppState;
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::StreamExt;
use std::{net::SocketAddr, sync::Arc};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let device_id = header_value(&headers, "device-id");
    let client_id = header_value(&headers, "client-id");
    ws.on_upgrade(move |socket| {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("ws_session", %session_id, %remote_addr);
        handle_socket(socket, state, session_id, remote_addr, device_id, client_id)
            .instrument(span)
    })
}

/// Runs one connection: registers the session, pumps inbound frames into it,
/// and tears everything down when the socket closes.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: Uuid,
    remote_addr: SocketAddr,
    device_id: Option<String>,
    client_id: Option<String>,
) {
    info!(
        device_id = device_id.as_deref().unwrap_or(""),
        client_id = client_id.as_deref().unwrap_or(""),
        "New WebSocket connection"
    );

    let (socket_tx, mut socket_rx) = socket.split();
    let session = Session::new(
        session_id,
        remote_addr,
        outbound(socket_tx),
        state.llm.clone(),
        state.tts.clone(),
        Arc::new(state.config.session.clone()),
    );
    session.set_identity(device_id, client_id).await;
    state.connections.register(session.clone()).await;
    let detector = session.spawn_silence_detector();

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(msg) => dispatch(&session, msg).await,
                Err(e) => warn!(error = %e, "Ignoring malformed text frame"),
            },
            Ok(Message::Binary(data)) => session.handle_audio(data).await,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    state.connections.unregister(session_id).await;
    if let Err(e) = detector.await {
        warn!(error = %e, "Silence detector task failed");
    }
    let (device_id, client_id) = session.identity().await;
    info!(
        device_id = device_id.as_deref().unwrap_or(""),
        client_id = client_id.as_deref().unwrap_or(""),
        "WebSocket connection closed and session terminated."
    );
}

async fn dispatch(session: &Arc<Session>, msg: ClientMessage) {
    match msg {
        ClientMessage::Hello {
            version,
            transport,
            device_id,
            client_id,
            audio_params,
        } => {
            debug!(?version, "Client hello");
            session
                .handle_hello(transport, device_id, client_id, audio_params)
                .await;
        }
        ClientMessage::ListeningStart => session.handle_listening_start().await,
        ClientMessage::ListeningStop => session.handle_listening_stop().await,
        ClientMessage::Text { text } => session.handle_text(text).await,
        ClientMessage::Unknown => debug!("Ignoring unknown message type"),
    }
}
