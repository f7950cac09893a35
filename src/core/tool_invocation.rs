//! Folding a tool-invocation stream into one display message.

use serde_json::Value;

use crate::api::{StreamFrame, ToolExecutionResult};
use crate::core::chat_stream::StreamEvent;
use crate::core::message::MessageState;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationMessage {
    pub server_id: String,
    pub tool_name: String,
    pub result: Option<ToolExecutionResult>,
    /// Commentary streamed after (or alongside) the structured result.
    pub analysis: String,
    pub state: MessageState,
    /// Why the request or stream failed, when it did.
    pub error: Option<String>,
}

impl ToolInvocationMessage {
    pub fn new(server_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tool_name: tool_name.into(),
            result: None,
            analysis: String::new(),
            state: MessageState::Streaming,
            error: None,
        }
    }

    pub fn failed_to_open(
        server_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(server_id, tool_name);
        message.state = MessageState::Error;
        message.error = Some(error.into());
        message
    }

    /// Apply one event; returns whether anything visible changed.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        match event {
            StreamEvent::Frame(StreamFrame::ToolExecutionResult { result }) => {
                self.result = Some(result);
                true
            }
            StreamEvent::Frame(StreamFrame::AiAnalysis { content })
            | StreamEvent::Frame(StreamFrame::Text { content }) => {
                self.analysis.push_str(&content);
                !content.is_empty()
            }
            StreamEvent::Frame(_) => false,
            StreamEvent::Done => {
                self.state = MessageState::Complete;
                true
            }
            StreamEvent::Interrupted(reason) => {
                self.state = MessageState::Truncated;
                self.error = Some(reason.to_string());
                true
            }
        }
    }

    /// Whether the tool or the request failed, for failure styling.
    pub fn failed(&self) -> bool {
        self.state == MessageState::Error
            || self.result.as_ref().is_some_and(|result| !result.success)
    }

    /// The structured result section, once a result has arrived.
    pub fn result_summary(&self) -> Option<String> {
        self.result
            .as_ref()
            .map(|result| render_result(&self.tool_name, result))
    }

    /// Text of the display message: structured result first, analysis after.
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if self.state == MessageState::Error {
            sections.push(format!(
                "Failed to run `{}` on {}: {}",
                self.tool_name,
                self.server_id,
                self.error.as_deref().unwrap_or("unknown error")
            ));
        }

        if let Some(summary) = self.result_summary() {
            sections.push(summary);
        }

        let analysis = self.analysis.trim();
        if !analysis.is_empty() {
            sections.push(analysis.to_string());
        }

        sections.join("\n\n")
    }
}

fn render_result(tool_name: &str, result: &ToolExecutionResult) -> String {
    let mut header = if result.success {
        format!("✅ `{tool_name}` succeeded")
    } else {
        format!("❌ `{tool_name}` failed")
    };
    if let Some(seconds) = result.execution_time {
        header.push_str(&format!(" in {seconds:.2}s"));
    }

    let mut lines = vec![header];
    if let Some(message) = result.message.as_deref().filter(|m| !m.trim().is_empty()) {
        lines.push(message.trim().to_string());
    }

    match &result.result {
        Value::Null => {}
        Value::String(text) => lines.push(text.clone()),
        other => {
            let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            lines.push(format!("```json\n{pretty}\n```"));
        }
    }

    lines.join("\n")
}
