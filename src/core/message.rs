use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::FunctionCallFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for Sender {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            _ => Err(format!("invalid message sender: {value}")),
        }
    }
}

impl TryFrom<String> for Sender {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Sender> for String {
    fn from(value: Sender) -> Self {
        value.as_str().to_string()
    }
}

/// Lifecycle of a message as seen by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Frames are still being folded into the message.
    Streaming,
    /// The terminal sentinel was observed, or the message never streamed.
    Complete,
    /// The stream ended or stalled before the terminal sentinel.
    Truncated,
    /// Synthetic message describing a failed request.
    Error,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MessageState::Streaming)
    }
}

/// A backend-issued operation paired with the result it already produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub function_name: String,
    #[serde(default)]
    pub function_args: Value,
    #[serde(default)]
    pub function_result: Value,
}

impl FunctionCallRecord {
    /// Discriminator of the result payload, if it carries one.
    pub fn result_type(&self) -> Option<&str> {
        self.function_result.get("type").and_then(Value::as_str)
    }

    pub fn is_recommendation(&self) -> bool {
        self.result_type()
            .is_some_and(|kind| kind.contains("recommendation"))
    }

    pub fn requires_user_action(&self) -> bool {
        flag(&self.function_result, "requires_user_action")
    }

    pub fn is_final(&self) -> bool {
        flag(&self.function_result, "is_final")
    }

    /// Recommendations and action-required results wait for the user.
    pub fn waits_for_user(&self) -> bool {
        self.is_recommendation() || self.requires_user_action()
    }

    /// True when the result is not sent back automatically: it either waits
    /// for the user or is final.
    pub fn pauses_chain(&self) -> bool {
        self.waits_for_user() || self.is_final()
    }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

impl From<FunctionCallFrame> for FunctionCallRecord {
    fn from(frame: FunctionCallFrame) -> Self {
        Self {
            function_name: frame.function_name,
            function_args: frame.function_args,
            function_result: frame.function_result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub function_calls: Vec<FunctionCallRecord>,
    pub state: MessageState,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            function_calls: Vec::new(),
            state: MessageState::Complete,
        }
    }

    /// An empty assistant message that frames are about to be folded into.
    pub fn streaming_assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            function_calls: Vec::new(),
            state: MessageState::Streaming,
        }
    }

    pub fn assistant_error(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sender: Sender::Assistant,
            timestamp: Utc::now(),
            function_calls: Vec::new(),
            state: MessageState::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_truncated(&self) -> bool {
        self.state == MessageState::Truncated
    }
}
