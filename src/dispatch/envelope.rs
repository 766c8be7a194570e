//! Wire envelopes exchanged over the message channel
//!
//! Inbound frames are classified by their `type` tag; only function-call
//! completions and service errors matter here. Outbound frames are the
//! function result, the "continue generation" signal and the session
//! configuration carrying the tool catalog.

use crate::tools::{tool_definitions, ToolOutput};
use crate::{Result, VoxError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Completed function-call arguments from the remote model
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub call_id: String,
    /// Usually a JSON-encoded string; some relays send the object itself
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Decode the arguments; an empty string or a missing field means none
    pub fn parse_arguments(&self) -> Result<Value> {
        match &self.arguments {
            Value::Null => Ok(Value::Null),
            Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
            Value::String(text) => serde_json::from_str(text).map_err(|e| {
                VoxError::Validation(format!("Malformed arguments for {}: {}", self.name, e))
            }),
            Value::Object(_) => Ok(self.arguments.clone()),
            other => Err(VoxError::Validation(format!(
                "Malformed arguments for {}: expected an object, got {}",
                self.name, other
            ))),
        }
    }
}

/// A classified inbound frame
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    FunctionCall(FunctionCall),
    /// Error reported by the realtime service
    ServiceError(String),
    /// Anything else, by type tag
    Other(String),
}

const FUNCTION_CALL_TYPES: [&str; 2] = [
    "response.function_call_arguments.done",
    "function_call_arguments.done",
];

/// Classify one text frame
pub fn parse_inbound(text: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if FUNCTION_CALL_TYPES.contains(&kind.as_str()) {
        let call: FunctionCall = serde_json::from_value(value)?;
        return Ok(Inbound::FunctionCall(call));
    }
    if kind == "error" {
        let message = value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_string();
        return Ok(Inbound::ServiceError(message));
    }
    Ok(Inbound::Other(kind))
}

/// Item carried by `conversation.item.create`
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Session configuration sent on every channel open
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub tools: Value,
}

/// Frame sent to the remote model
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,

    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
}

impl Outbound {
    /// Result of one invocation, correlated by `call_id`
    pub fn function_result(call_id: impl Into<String>, output: &ToolOutput) -> Self {
        Outbound::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.to_json_string(),
            },
        }
    }

    /// Session configuration advertising the standard tool catalog
    pub fn session_update(modalities: &[String]) -> Self {
        Outbound::SessionUpdate {
            session: SessionConfig {
                modalities: modalities.to_vec(),
                tools: tool_definitions(),
            },
        }
    }

    /// Wire name of the frame
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::ConversationItemCreate { .. } => "conversation.item.create",
            Outbound::ResponseCreate => "response.create",
            Outbound::SessionUpdate { .. } => "session.update",
        }
    }

    /// `call_id` of a function result
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Outbound::ConversationItemCreate {
                item: ConversationItem::FunctionCallOutput { call_id, .. },
            } => Some(call_id),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
