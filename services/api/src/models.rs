//! API Models
//!
//! Request and response bodies of the REST surface, documented with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use voicegate_core::Voice;

/// Service health and configuration summary.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct StatusInfo {
    #[schema(example = "running")]
    pub status: String,
    pub active_connections: usize,
    pub server_start_time: DateTime<Utc>,
    #[schema(example = "0h 12m 5s")]
    pub uptime: String,
    pub version: String,
    pub llm_provider: Option<String>,
    pub tts_provider: Option<String>,
    /// Every registered generation backend, in initialization order.
    pub llm_providers: Vec<String>,
    pub tts_providers: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    #[schema(example = "zh_female_qingxin")]
    pub id: String,
    pub name: String,
    #[schema(example = "female")]
    pub gender: String,
    #[schema(example = "zh-CN")]
    pub language: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl From<Voice> for VoiceInfo {
    fn from(voice: Voice) -> Self {
        Self {
            id: voice.id,
            name: voice.name,
            gender: voice.gender,
            language: voice.language,
            tags: voice.tags,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct BroadcastPayload {
    #[schema(example = "Server maintenance in five minutes")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct BroadcastResult {
    /// Number of sessions the message was written to.
    pub delivered: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_info_from_voice() {
        let voice = Voice {
            id: "mock-male-1".into(),
            name: "小刚".into(),
            gender: "male".into(),
            language: "zh-CN".into(),
            tags: BTreeMap::from([("age".to_string(), "adult".to_string())]),
        };
        let info = VoiceInfo::from(voice);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({
                "id": "mock-male-1",
                "name": "小刚",
                "gender": "male",
                "language": "zh-CN",
                "tags": {"age": "adult"}
            })
        );
    }

    #[test]
    fn test_broadcast_payload_requires_text() {
        assert!(serde_json::from_str::<BroadcastPayload>("{}").is_err());
        let payload: BroadcastPayload = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(payload.text, "hi");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "provider not found".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"message":"provider not found"}"#
        );
    }
}
