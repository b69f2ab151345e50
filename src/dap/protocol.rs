//! DAP message envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DAP request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

impl Request {
    /// Parse a raw transport message. The caller has already checked that
    /// `type` is `"request"`; anything else never reaches this point.
    pub fn from_value(raw: Value) -> Result<Request, serde_json::Error> {
        serde_json::from_value(raw)
    }
}

/// DAP response envelope.
///
/// The specification allows responses without a `body` field; keeping the
/// body a raw [`Value`] avoids one envelope type per command.
#[derive(Debug, Serialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(seq: i64, request: &Request, body: Option<Value>) -> Response {
        Response {
            seq,
            r#type: "response",
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    pub fn error(seq: i64, request: &Request, message: impl Into<String>) -> Response {
        Response {
            seq,
            r#type: "response",
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }
}

/// DAP event envelope.
#[derive(Debug, Serialize)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(seq: i64, event: &'static str, body: Option<Value>) -> Event {
        Event {
            seq,
            r#type: "event",
            event,
            body,
        }
    }
}
