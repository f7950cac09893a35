//! Turn orchestration: sending input, folding response streams into the
//! session, and chaining automatic follow-ups for function results.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{Backend, BackendError, ByteStream, FunctionResult, SessionServerRecord};
use crate::core::chat_stream::{stream_events, StreamInterruption};
use crate::core::config::Config;
use crate::core::credentials::{CredentialForm, CredentialSubmitError};
use crate::core::message::ChatMessage;
use crate::core::reducer::{awaits_user, fold_event, needs_follow_up, MessageUpdate};
use crate::core::session::SessionContext;
use crate::core::tool_invocation::ToolInvocationMessage;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_FOLLOW_UPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    /// Longest wait for the next chunk before a stream counts as truncated.
    pub idle_timeout: Option<Duration>,
    /// Automatic follow-up requests allowed per user turn.
    pub max_follow_ups: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            max_follow_ups: DEFAULT_MAX_FOLLOW_UPS,
        }
    }
}

impl TurnOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_follow_ups: config.max_follow_ups(),
        }
    }
}

/// Progress of a turn, addressed by index into `SessionContext::messages`.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    UserMessage { index: usize },
    AssistantStarted { index: usize },
    TextDelta { index: usize, delta: String },
    FunctionCall { index: usize, call: usize },
    AssistantFinished { index: usize },
    AssistantTruncated { index: usize, reason: StreamInterruption },
    /// The request never produced a stream; `index` is the error message.
    RequestFailed { index: usize },
    /// An automatic follow-up carrying `results` function results is about
    /// to be sent.
    FollowUp { depth: usize, results: usize },
    FollowUpLimitReached { limit: usize },
}

/// Display-layer subscriber, called once per event with the session state
/// after the event was applied.
pub trait TurnObserver {
    fn on_event(&mut self, event: &TurnEvent, session: &SessionContext);
}

impl<F> TurnObserver for F
where
    F: FnMut(&TurnEvent, &SessionContext),
{
    fn on_event(&mut self, event: &TurnEvent, session: &SessionContext) {
        self(event, session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The last stream completed and nothing is pending.
    Completed,
    /// Function results are waiting on the user (recommendations, required
    /// configuration).
    AwaitingUser,
    /// A stream ended before its terminal sentinel.
    Truncated,
    /// A request could not be opened.
    Failed,
    FollowUpLimitReached,
}

pub struct ChatClient<B> {
    backend: B,
    options: TurnOptions,
}

impl<B: Backend> ChatClient<B> {
    pub fn new(backend: B, options: TurnOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send user input and run the turn to completion, including any
    /// automatic follow-ups.
    pub async fn send_message<O>(
        &self,
        session: &mut SessionContext,
        text: &str,
        observer: &mut O,
    ) -> TurnOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let id = session.next_message_id();
        let index = session.push_message(ChatMessage::user(id, text));
        observer.on_event(&TurnEvent::UserMessage { index }, session);

        debug!(history = session.history.len(), "Sending chat message");
        let opened = self
            .backend
            .send_message(session.session_id(), text, &session.history)
            .await;
        if opened.is_ok() {
            session.record_user_turn(text);
        }
        self.drive(session, opened, observer).await
    }

    /// Resume a paused turn with explicit function results, e.g. after the
    /// user acted on a recommendation.
    pub async fn continue_with_results<O>(
        &self,
        session: &mut SessionContext,
        results: Vec<FunctionResult>,
        observer: &mut O,
    ) -> TurnOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let opened = self
            .backend
            .submit_function_results(session.session_id(), &results, &session.history)
            .await;
        self.drive(session, opened, observer).await
    }

    async fn drive<O>(
        &self,
        session: &mut SessionContext,
        mut opened: Result<ByteStream, BackendError>,
        observer: &mut O,
    ) -> TurnOutcome
    where
        O: TurnObserver + ?Sized,
    {
        let mut depth = 0;
        loop {
            let index = match opened {
                Ok(body) => self.stream_into_message(session, body, observer).await,
                Err(err) => {
                    report_failure(session, &err, observer);
                    return TurnOutcome::Failed;
                }
            };

            let message = &session.messages[index];
            if message.is_truncated() {
                return TurnOutcome::Truncated;
            }
            let follow_up = needs_follow_up(message);
            let paused = awaits_user(message);
            session.record_assistant_turn(index);

            if !follow_up {
                return if paused {
                    TurnOutcome::AwaitingUser
                } else {
                    TurnOutcome::Completed
                };
            }

            if depth >= self.options.max_follow_ups {
                let limit = self.options.max_follow_ups;
                warn!(limit, "Automatic follow-up limit reached");
                observer.on_event(&TurnEvent::FollowUpLimitReached { limit }, session);
                return TurnOutcome::FollowUpLimitReached;
            }
            depth += 1;

            let results: Vec<FunctionResult> = session.messages[index]
                .function_calls
                .iter()
                .map(FunctionResult::from)
                .collect();
            debug!(depth, results = results.len(), "Submitting function results");
            observer.on_event(
                &TurnEvent::FollowUp {
                    depth,
                    results: results.len(),
                },
                session,
            );
            opened = self
                .backend
                .submit_function_results(session.session_id(), &results, &session.history)
                .await;
        }
    }

    async fn stream_into_message<O>(
        &self,
        session: &mut SessionContext,
        body: ByteStream,
        observer: &mut O,
    ) -> usize
    where
        O: TurnObserver + ?Sized,
    {
        let id = session.next_message_id();
        let index = session.push_message(ChatMessage::streaming_assistant(id));
        observer.on_event(&TurnEvent::AssistantStarted { index }, session);

        let mut events = std::pin::pin!(stream_events(body, self.options.idle_timeout));
        while let Some(event) = events.next().await {
            let Some(update) = fold_event(&mut session.messages[index], event) else {
                continue;
            };
            let turn_event = match update {
                MessageUpdate::TextAppended(delta) => TurnEvent::TextDelta { index, delta },
                MessageUpdate::FunctionCallAdded(call) => TurnEvent::FunctionCall { index, call },
                MessageUpdate::Completed => TurnEvent::AssistantFinished { index },
                MessageUpdate::Truncated(reason) => {
                    warn!(reason = %reason, "Response stream truncated");
                    TurnEvent::AssistantTruncated { index, reason }
                }
            };
            observer.on_event(&turn_event, session);
        }
        index
    }

    /// Refresh the session's mirror of attached servers.
    pub async fn refresh_servers<'s>(
        &self,
        session: &'s mut SessionContext,
    ) -> Result<&'s [SessionServerRecord], BackendError> {
        session.servers = self.backend.list_servers(session.session_id()).await?;
        Ok(&session.servers)
    }

    /// Attach a server to the session, then refresh the mirror.
    pub async fn add_server(
        &self,
        session: &mut SessionContext,
        server_id: &str,
    ) -> Result<Option<String>, BackendError> {
        let message = self
            .backend
            .add_server(session.session_id(), server_id)
            .await?
            .accepted()?;
        self.refresh_servers(session).await?;
        Ok(message)
    }

    pub async fn credential_form(
        &self,
        session: &SessionContext,
        server_id: &str,
    ) -> Result<CredentialForm, BackendError> {
        let requirements = self
            .backend
            .credential_requirements(session.session_id(), server_id)
            .await?;
        Ok(CredentialForm::from_requirements(server_id, requirements))
    }

    /// Validate and submit a credential form. Nothing is sent while a
    /// required field is blank.
    pub async fn submit_credentials(
        &self,
        session: &SessionContext,
        form: &mut CredentialForm,
    ) -> Result<Option<String>, CredentialSubmitError> {
        let submission = form.validate().map_err(CredentialSubmitError::Invalid)?;
        let message = self
            .backend
            .submit_credentials(session.session_id(), &form.server_id, &submission)
            .await?
            .accepted()?;
        Ok(message)
    }

    /// Run a tool and fold its stream into one display message, which is
    /// also appended to the session transcript.
    pub async fn invoke_tool<F>(
        &self,
        session: &mut SessionContext,
        server_id: &str,
        tool_name: &str,
        arguments: &Value,
        mut on_update: F,
    ) -> ToolInvocationMessage
    where
        F: FnMut(&ToolInvocationMessage),
    {
        let opened = self
            .backend
            .invoke_tool(session.session_id(), server_id, tool_name, arguments)
            .await;

        let invocation = match opened {
            Ok(body) => {
                let mut invocation = ToolInvocationMessage::new(server_id, tool_name);
                let mut events = std::pin::pin!(stream_events(body, self.options.idle_timeout));
                while let Some(event) = events.next().await {
                    if invocation.apply(event) {
                        on_update(&invocation);
                    }
                }
                invocation
            }
            Err(err) => {
                warn!(server_id, tool_name, error = %err, "Tool invocation failed to start");
                let invocation =
                    ToolInvocationMessage::failed_to_open(server_id, tool_name, err.to_string());
                on_update(&invocation);
                invocation
            }
        };

        let id = session.next_message_id();
        let mut message = ChatMessage::streaming_assistant(id);
        message.content = invocation.render();
        message.state = invocation.state;
        session.push_message(message);
        invocation
    }
}

fn report_failure<O>(session: &mut SessionContext, err: &BackendError, observer: &mut O)
where
    O: TurnObserver + ?Sized,
{
    warn!(error = %err, "Chat request failed");
    let id = session.next_message_id();
    let index = session.push_message(ChatMessage::assistant_error(id, format!("Error: {err}")));
    observer.on_event(&TurnEvent::RequestFailed { index }, session);
}
