//! Wire protocol for the signaling channel.
//!
//! Every frame is a JSON object with a mandatory `type` field. Offer,
//! answer and candidate bodies are opaque blobs; the relay forwards them
//! unchanged and never inspects their contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Roster entry as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// Messages clients send to the relay. `name` is always the *target* of the
/// operation except for `login`, where it is the name being claimed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Login { name: String },
    Offer { name: String, offer: Value },
    Answer { name: String, answer: Value },
    Candidate { name: String, candidate: Value },
    Leave { name: String },
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Greeting pushed immediately after the upgrade completes.
    #[serde(rename = "connect")]
    Connect { message: String },
    /// Reply to a login attempt. `users` is present on success and holds the
    /// roster as of before this login; `message` is present on failure.
    #[serde(rename = "login")]
    Login {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        users: Option<Vec<UserEntry>>,
    },
    /// Roster broadcast; each recipient's own name is excluded.
    #[serde(rename = "updateUsers")]
    UpdateUsers { users: Vec<UserEntry> },
    /// Forwarded offer. `name` is the sender's registered name, omitted when
    /// the sender never logged in.
    #[serde(rename = "offer")]
    Offer {
        offer: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(rename = "answer")]
    Answer { answer: Value },
    #[serde(rename = "candidate")]
    Candidate { candidate: Value },
    /// Peer-gone notification; carries no fields on the way out.
    #[serde(rename = "leave")]
    Leave,
    #[serde(rename = "error")]
    Error { message: String },
}

/// Parse an inbound frame. On failure the `Err` carries the declared type
/// (or `undefined` when absent or unparseable) for the error reply; parsing
/// never panics on malformed input.
pub fn parse_client_message(raw: &str) -> Result<ClientMessage, String> {
    let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    let declared = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("undefined")
        .to_string();
    serde_json::from_value(value).map_err(|_| declared)
}
