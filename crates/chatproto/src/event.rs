use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtoError;
use crate::persona::Persona;

/// Client -> server. Only chat carries a payload; connect/disconnect are implied by the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ChatMessage {
        message: String,
        timestamp: Option<f64>,
    },
    Ping {},
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        name: Persona,
        message: String,
    },
    Error {
        message: String,
    },
    UserJoined {
        name: Persona,
        message: String,
    },
    UserLeft {
        name: Persona,
        message: String,
    },
    Chat {
        name: Persona,
        message: String,
        timestamp: Option<f64>,
    },
    UserList {
        users: Vec<Persona>,
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        human_users: Option<Vec<Persona>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ai_users: Option<Vec<Persona>>,
    },
    Pong {},
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        // Every variant is plain strings/numbers/lists; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse one inbound text frame.
///
/// Permissive on payload fields: a missing or non-string `message` becomes `""`,
/// a missing or non-numeric `timestamp` becomes `None`. `chat` is accepted as an
/// alias of `chat_message` for plain WebSocket pages.
pub fn parse_client(text: &str) -> Result<ClientEvent, ProtoError> {
    let v: Value = serde_json::from_str(text).map_err(|e| ProtoError::NotJson(e.to_string()))?;
    let Some(obj) = v.as_object() else {
        return Err(ProtoError::Malformed("frame must be a json object"));
    };
    let Some(t) = obj.get("type").and_then(Value::as_str) else {
        return Err(ProtoError::Malformed("missing type"));
    };

    match t {
        "chat_message" | "chat" => Ok(ClientEvent::ChatMessage {
            message: obj
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: obj.get("timestamp").and_then(Value::as_f64),
        }),
        "ping" => Ok(ClientEvent::Ping {}),
        other => Err(ProtoError::UnknownType(other.to_string())),
    }
}
