use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api::{
    ActionResponse, Backend, BackendError, ByteStream, ConversationHistoryEntry,
    CredentialRequirements, CredentialSubmission, FunctionResult, SessionServerRecord,
};

/// Encode frames as `data:` lines, one per frame.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

/// How a scripted stream behaves once opened.
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Yield the chunks, then end.
    Chunks(Vec<Vec<u8>>),
    /// Yield the chunks, then never produce another one.
    Stall(Vec<Vec<u8>>),
    /// Fail before any byte is produced.
    FailToOpen(String),
}

impl StreamScript {
    pub fn body(body: impl Into<String>) -> Self {
        StreamScript::Chunks(vec![body.into().into_bytes()])
    }

    pub fn frames(payloads: &[&str]) -> Self {
        Self::body(sse_body(payloads))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    SendMessage {
        session_id: String,
        message: String,
        history: Vec<ConversationHistoryEntry>,
    },
    FunctionResults {
        session_id: String,
        results: Vec<FunctionResult>,
        history: Vec<ConversationHistoryEntry>,
    },
    ListServers,
    AddServer {
        server_id: String,
    },
    CredentialRequirements {
        server_id: String,
    },
    SubmitCredentials {
        server_id: String,
        submission: CredentialSubmission,
    },
    InvokeTool {
        server_id: String,
        tool_name: String,
        arguments: Value,
    },
}

/// In-memory [`Backend`] that replays scripted streams in request order and
/// records every call it receives.
#[derive(Default)]
pub struct FakeBackend {
    streams: Mutex<VecDeque<StreamScript>>,
    servers: Mutex<Vec<SessionServerRecord>>,
    requirements: Mutex<Option<CredentialRequirements>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeBackend {
    pub fn with_streams(streams: Vec<StreamScript>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            ..Self::default()
        }
    }

    pub fn set_servers(&self, servers: Vec<SessionServerRecord>) {
        *self.servers.lock().unwrap() = servers;
    }

    pub fn set_requirements(&self, requirements: CredentialRequirements) {
        *self.requirements.lock().unwrap() = Some(requirements);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn function_result_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, RecordedCall::FunctionResults { .. }))
            .collect()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_stream(&self) -> Result<ByteStream, BackendError> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StreamScript::body("data: [DONE]\n"));

        match script {
            StreamScript::Chunks(chunks) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok::<_, BackendError>))))
            }
            StreamScript::Stall(chunks) => Ok(Box::pin(
                stream::iter(chunks.into_iter().map(Ok::<_, BackendError>)).chain(stream::pending()),
            )),
            StreamScript::FailToOpen(body) => Err(BackendError::Status { status: 502, body }),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError> {
        self.record(RecordedCall::SendMessage {
            session_id: session_id.to_string(),
            message: message.to_string(),
            history: history.to_vec(),
        });
        self.next_stream()
    }

    async fn submit_function_results(
        &self,
        session_id: &str,
        results: &[FunctionResult],
        history: &[ConversationHistoryEntry],
    ) -> Result<ByteStream, BackendError> {
        self.record(RecordedCall::FunctionResults {
            session_id: session_id.to_string(),
            results: results.to_vec(),
            history: history.to_vec(),
        });
        self.next_stream()
    }

    async fn list_servers(
        &self,
        _session_id: &str,
    ) -> Result<Vec<SessionServerRecord>, BackendError> {
        self.record(RecordedCall::ListServers);
        Ok(self.servers.lock().unwrap().clone())
    }

    async fn add_server(
        &self,
        _session_id: &str,
        server_id: &str,
    ) -> Result<ActionResponse, BackendError> {
        self.record(RecordedCall::AddServer {
            server_id: server_id.to_string(),
        });
        Ok(ActionResponse {
            success: true,
            message: Some(format!("Added {server_id}")),
        })
    }

    async fn credential_requirements(
        &self,
        _session_id: &str,
        server_id: &str,
    ) -> Result<CredentialRequirements, BackendError> {
        self.record(RecordedCall::CredentialRequirements {
            server_id: server_id.to_string(),
        });
        Ok(self
            .requirements
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(CredentialRequirements {
                server_id: Some(server_id.to_string()),
                server_name: None,
                credentials: Vec::new(),
            }))
    }

    async fn submit_credentials(
        &self,
        _session_id: &str,
        server_id: &str,
        submission: &CredentialSubmission,
    ) -> Result<ActionResponse, BackendError> {
        self.record(RecordedCall::SubmitCredentials {
            server_id: server_id.to_string(),
            submission: submission.clone(),
        });
        Ok(ActionResponse {
            success: true,
            message: None,
        })
    }

    async fn invoke_tool(
        &self,
        _session_id: &str,
        server_id: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<ByteStream, BackendError> {
        self.record(RecordedCall::InvokeTool {
            server_id: server_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments: arguments.clone(),
        });
        self.next_stream()
    }
}

/// A request captured by [`spawn_http_responder`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Client that never routes loopback test traffic through a proxy.
pub fn test_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("test client should build")
}

/// Serve one canned `(status, content type, body)` response per accepted
/// connection and hand back everything the client sent.
pub async fn spawn_http_responder(
    responses: Vec<(&'static str, &'static str, String)>,
) -> (String, JoinHandle<Result<Vec<CapturedRequest>, String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");

    let task = tokio::spawn(async move {
        let mut captured = Vec::new();
        for (status, content_type, body) in responses {
            let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
            captured.push(read_http_request(&mut stream).await?);

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
            stream.shutdown().await.map_err(|err| err.to_string())?;
        }
        Ok(captured)
    });

    (format!("http://{addr}"), task)
}

async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let header_end = loop {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    let mut content_length = 0;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}
