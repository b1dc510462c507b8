use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::RelayError, tally::Tally};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Vote { poll_id: String, option_id: String },
    /// Any other well-tagged frame. Accepted and ignored.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Update { poll_id: String, tally: Tally },
    Error { message: String },
}

impl ServerMessage {
    pub fn update(poll_id: impl Into<String>, tally: Tally) -> Self {
        Self::Update {
            poll_id: poll_id.into(),
            tally,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

pub fn decode_client_message(text: &str) -> Result<ClientMessage, RelayError> {
    // Parse twice so "not JSON" and "JSON of the wrong shape" get distinct replies.
    let value: Value = serde_json::from_str(text)
        .map_err(|_| RelayError::MalformedMessage("Invalid JSON".to_string()))?;
    serde_json::from_value(value)
        .map_err(|err| RelayError::MalformedMessage(format!("Malformed message: {err}")))
}

pub fn encode_server_message(message: &ServerMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}
