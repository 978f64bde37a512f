//! Defines the WebSocket message protocol between devices and the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a session is in the listen/think/speak cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Thinking => "thinking",
            Phase::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Messages sent from the device to the server. Unknown types are ignored.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Capability announcement.
    Hello {
        #[serde(default)]
        version: Option<u32>,
        #[serde(default)]
        transport: Option<String>,
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        audio_params: Option<serde_json::Value>,
    },
    /// The user started speaking.
    ListeningStart,
    /// The user stopped speaking.
    ListeningStop,
    /// A typed (or externally recognized) utterance.
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

/// Messages sent from the server to the device.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to the device hello.
    #[serde(rename = "hello")]
    ServerHello {
        status: String,
        transport: String,
        session_id: Uuid,
    },
    /// Phase change notice.
    Listen { state: Phase },
    ListeningStart,
    /// The full reply text of a round, or a broadcast.
    Text { text: String },
    /// One streamed fragment of the reply text.
    TextDelta { text: String },
}

impl ServerMessage {
    pub fn server_hello(session_id: Uuid) -> Self {
        Self::ServerHello {
            status: "ok".to_string(),
            transport: "websocket".to_string(),
            session_id,
        }
    }

    pub fn listen(state: Phase) -> Self {
        Self::Listen { state }
    }
}
