use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque conversation identifier supplied by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for clients that did not bring one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// One recorded message in short-term memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// OpenAI-style chat message sent to the model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::Human => ChatMessage::user(turn.text.clone()),
            Role::Assistant => ChatMessage::assistant(turn.text.clone()),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct CreateSessionQuery {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub payload: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub message: String,
    pub conversation_id: ConversationId,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub message: String,
    pub request: serde_json::Value,
    pub request_payload: String,
    #[serde(rename = "chatAPIresponse")]
    pub chat_api_response: String,
    pub chat_request: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub conversation_id: ConversationId,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub conversation_id: ConversationId,
    pub turns: usize,
}
