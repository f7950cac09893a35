//! Wire payloads exchanged with the chat backend.
//!
//! Stream frames arrive as `data: <json>` lines; everything else here is a
//! plain JSON request or response body.

pub mod backend;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::{FunctionCallRecord, Sender};

pub use backend::{Backend, BackendError, ByteStream, HttpBackend};

/// Literal payload that marks the normal end of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded stream frame, dispatched on its `type` discriminator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Text {
        content: String,
    },
    FunctionCall(FunctionCallFrame),
    ToolExecutionResult {
        result: ToolExecutionResult,
    },
    AiAnalysis {
        content: String,
    },
    /// Frame kinds this client does not know about yet.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCallFrame {
    pub function_name: String,
    #[serde(default)]
    pub function_args: Value,
    #[serde(default)]
    pub function_result: Value,
}

/// Structured outcome of running a tool on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds spent executing the tool, as reported by the backend.
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistoryEntry {
    pub role: Sender,
    pub text_content: String,
    #[serde(default)]
    pub function_calls: Vec<FunctionCallRecord>,
}

#[derive(Serialize)]
pub struct SendMessageRequest<'a> {
    pub message: &'a str,
    pub conversation_history: &'a [ConversationHistoryEntry],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResult {
    pub function_name: String,
    pub function_args: Value,
    pub result: Value,
}

impl From<&FunctionCallRecord> for FunctionResult {
    fn from(record: &FunctionCallRecord) -> Self {
        Self {
            function_name: record.function_name.clone(),
            function_args: record.function_args.clone(),
            result: record.function_result.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct FunctionResultsRequest<'a> {
    pub function_results: &'a [FunctionResult],
    pub conversation_history: &'a [ConversationHistoryEntry],
}

#[derive(Serialize)]
pub struct AddServerRequest<'a> {
    pub server_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialSubmission {
    pub credentials: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct ToolInvocationRequest<'a> {
    pub arguments: &'a Value,
}

/// Read-only mirror of a server the backend has attached to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionServerRecord {
    pub server_id: String,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub installed_at: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl SessionServerRecord {
    pub fn display_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.server_id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum ServerListResponse {
    Wrapped { servers: Vec<SessionServerRecord> },
    Bare(Vec<SessionServerRecord>),
}

impl ServerListResponse {
    pub(crate) fn into_servers(self) -> Vec<SessionServerRecord> {
        match self {
            ServerListResponse::Wrapped { servers } | ServerListResponse::Bare(servers) => servers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialRequirements {
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub credentials: Vec<CredentialRequirement>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialRequirement {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Acknowledgement returned by the non-streaming mutation endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_dispatch_on_type() {
        let text: StreamFrame = serde_json::from_str(r#"{"type":"text","content":"hi"}"#).unwrap();
        assert_eq!(
            text,
            StreamFrame::Text {
                content: "hi".to_string()
            }
        );

        let call: StreamFrame = serde_json::from_value(json!({
            "type": "function_call",
            "function_name": "list_tools",
            "function_args": {"server": "github"},
            "function_result": {"type": "tool_list"}
        }))
        .unwrap();
        match call {
            StreamFrame::FunctionCall(frame) => {
                assert_eq!(frame.function_name, "list_tools");
                assert_eq!(frame.function_result["type"], "tool_list");
            }
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_types_are_tolerated() {
        let frame: StreamFrame =
            serde_json::from_str(r#"{"type":"thinking","content":"..."}"#).unwrap();
        assert_eq!(frame, StreamFrame::Unknown);
    }

    #[test]
    fn server_list_accepts_wrapped_and_bare_shapes() {
        let wrapped: ServerListResponse = serde_json::from_str(
            r#"{"servers":[{"serverId":"github","serverName":"GitHub","installedAt":"2024-05-01T10:00:00Z","isActive":true}]}"#,
        )
        .unwrap();
        let bare: ServerListResponse =
            serde_json::from_str(r#"[{"serverId":"slack","isActive":false}]"#).unwrap();

        let wrapped = wrapped.into_servers();
        assert_eq!(wrapped[0].display_name(), "GitHub");
        assert!(wrapped[0].is_active);
        assert_eq!(bare.into_servers()[0].display_name(), "slack");
    }

    #[test]
    fn credential_fields_default_to_required() {
        let requirements: CredentialRequirements = serde_json::from_value(json!({
            "server_name": "GitHub",
            "credentials": [
                {"name": "token", "secret": true},
                {"name": "org", "required": false}
            ]
        }))
        .unwrap();
        assert!(requirements.credentials[0].required);
        assert!(requirements.credentials[0].secret);
        assert!(!requirements.credentials[1].required);
    }

    #[test]
    fn history_entries_serialize_role_as_string() {
        let entry = ConversationHistoryEntry {
            role: Sender::Assistant,
            text_content: "done".to_string(),
            function_calls: Vec::new(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["text_content"], "done");
    }
}
