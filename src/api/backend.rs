//! Transport seam between conversation orchestration and the chat backend.

use std::error::Error as StdError;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{
    ActionResponse, AddServerRequest, ConversationHistoryEntry, CredentialRequirements,
    CredentialSubmission, FunctionResult, FunctionResultsRequest, SendMessageRequest,
    ServerListResponse, SessionServerRecord, ToolInvocationRequest,
};
use crate::utils::url::endpoint_url;

/// Raw response body of a streaming endpoint, chunked however the network
/// delivered it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send>>;

#[derive(Debug)]
pub enum BackendError {
    /// The base URL and path segments did not form a valid URL.
    InvalidUrl(String),
    /// The request could not be sent or the body could not be read.
    Transport(reqwest::Error),
    /// The backend answered with a non-success status.
    Status { status: u16, body: String },
    /// A JSON response body did not have the expected shape.
    Decode(serde_json::Error),
    /// The backend acknowledged the request but reported `success: false`.
    Rejected(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::InvalidUrl(url) => write!(f, "Invalid backend URL: {url}"),
            BackendError::Transport(err) => write!(f, "Request failed: {err}"),
            BackendError::Status { status, body } => match error_summary(body) {
                Some(summary) => write!(f, "Backend returned {status}: {summary}"),
                None => write!(f, "Backend returned {status}"),
            },
            BackendError::Decode(err) => write!(f, "Unexpected response from backend: {err}"),
            BackendError::Rejected(message) => write!(f, "Backend rejected request: {message}"),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Transport(err) => Some(err),
            BackendError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

/// Pull a one-line summary out of an error body, if it has one.
pub fn error_summary(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Some(collapse_whitespace(trimmed));
    };

    let summary = value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .or_else(|| value.get("detail").and_then(Value::as_str))?;

    let collapsed = collapse_whitespace(summary);
    (!collapsed.is_empty()).then_some(collapsed)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl ActionResponse {
    /// Convert a `success: false` acknowledgement into an error.
    pub fn accepted(self) -> Result<Option<String>, BackendError> {
        if self.success {
            Ok(self.message)
        } else {
            Err(BackendError::Rejected(
                self.message
                    .unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError>;

    async fn submit_function_results(
        &self,
        session_id: &str,
        results: &[FunctionResult],
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError>;

    async fn list_servers(&self, session_id: &str)
        -> Result<Vec<SessionServerRecord>, BackendError>;

    async fn add_server(
        &self,
        session_id: &str,
        server_id: &str,
    ) -> Result<ActionResponse, BackendError>;

    async fn credential_requirements(
        &self,
        session_id: &str,
        server_id: &str,
    ) -> Result<CredentialRequirements, BackendError>;

    async fn submit_credentials(
        &self,
        session_id: &str,
        server_id: &str,
        submission: &CredentialSubmission,
    ) -> Result<ActionResponse, BackendError>;

    async fn invoke_tool(
        &self,
        session_id: &str,
        server_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<ByteStream, BackendError>;
}

/// [`Backend`] over HTTP, with streaming endpoints read as SSE bodies.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, BackendError> {
        endpoint_url(&self.base_url, segments).map_err(BackendError::InvalidUrl)
    }

    async fn open_stream<B>(&self, url: reqwest::Url, body: &B) -> Result<ByteStream, BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        debug!(url = %url, "Opening backend stream");
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        let response = ensure_success(response).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(BackendError::Transport));
        Ok(Box::pin(stream))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: reqwest::Url) -> Result<T, BackendError> {
        debug!(url = %url, "GET backend resource");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(BackendError::Transport)?;
        decode_json(ensure_success(response).await?).await
    }

    async fn post_json<B, T>(&self, url: reqwest::Url, body: &B) -> Result<T, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url = %url, "POST backend resource");
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        decode_json(ensure_success(response).await?).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let text = response.text().await.map_err(BackendError::Transport)?;
    serde_json::from_str(&text).map_err(BackendError::Decode)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError> {
        let url = self.url(&["api", "chat", session_id, "message"])?;
        let body = SendMessageRequest {
            message,
            conversation_history: history,
        };
        self.open_stream(url, &body).await
    }

    async fn submit_function_results(
        &self,
        session_id: &str,
        results: &[FunctionResult],
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError> {
        let url = self.url(&["api", "chat", session_id, "function-results"])?;
        let body = FunctionResultsRequest {
            function_results: results,
            conversation_history: history,
        };
        self.open_stream(url, &body).await
    }

    async fn list_servers(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionServerRecord>, BackendError> {
        let url = self.url(&["api", "sessions", session_id, "servers"])?;
        let response: ServerListResponse = self.get_json(url).await?;
        Ok(response.into_servers())
    }

    async fn add_server(
        &self,
        session_id: &str,
        server_id: &str,
    ) -> Result<ActionResponse, BackendError> {
        let url = self.url(&["api", "sessions", session_id, "servers"])?;
        self.post_json(url, &AddServerRequest { server_id }).await
    }

    async fn credential_requirements(
        &self,
        session_id: &str,
        server_id: &str,
    ) -> Result<CredentialRequirements, BackendError> {
        let url = self.url(&["api", "sessions", session_id, "servers", server_id, "credentials"])?;
        self.get_json(url).await
    }

    async fn submit_credentials(
        &self,
        session_id: &str,
        server_id: &str,
        submission: &CredentialSubmission,
    ) -> Result<ActionResponse, BackendError> {
        let url = self.url(&["api", "sessions", session_id, "servers", server_id, "credentials"])?;
        self.post_json(url, submission).await
    }

    async fn invoke_tool(
        &self,
        session_id: &str,
        server_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<ByteStream, BackendError> {
        let url = self.url(&[
            "api", "sessions", session_id, "servers", server_id, "tools", tool_name, "invoke",
        ])?;
        self.open_stream(url, &ToolInvocationRequest { arguments })
            .await
    }
}
