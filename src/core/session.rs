use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use base64::Engine as _;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::api::{ConversationHistoryEntry, SessionServerRecord};
use crate::core::message::{ChatMessage, MessageState, Sender};

const SESSION_ID_PREFIX: &str = "session_";
const SESSION_ID_RANDOM_BYTES: usize = 16;

#[derive(Debug)]
pub enum SessionStoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Random(getrandom::Error),
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStoreError::Io { path, source } => {
                write!(f, "Failed to access session file {}: {}", path.display(), source)
            }
            SessionStoreError::Random(err) => {
                write!(f, "Failed to generate a session identifier: {err}")
            }
        }
    }
}

impl StdError for SessionStoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionStoreError::Io { source, .. } => Some(source),
            SessionStoreError::Random(_) => None,
        }
    }
}

/// Generate an opaque, URL-safe session identifier.
pub fn generate_session_id() -> Result<String, SessionStoreError> {
    let mut bytes = [0_u8; SESSION_ID_RANDOM_BYTES];
    getrandom::fill(&mut bytes).map_err(SessionStoreError::Random)?;
    Ok(format!(
        "{SESSION_ID_PREFIX}{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    ))
}

/// File holding the identifier that scopes tool servers and credentials on
/// the backend.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<String>, SessionStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    pub fn save(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;
        }

        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|source| self.io_error(source))?;
        writeln!(temp_file, "{session_id}").map_err(|source| self.io_error(source))?;
        temp_file
            .persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;
        Ok(())
    }

    /// Read the stored identifier, creating and persisting one if absent.
    pub fn load_or_create(&self) -> Result<String, SessionStoreError> {
        if let Some(id) = self.load()? {
            return Ok(id);
        }
        let id = generate_session_id()?;
        self.save(&id)?;
        debug!(path = %self.path.display(), "Created new session identifier");
        Ok(id)
    }

    fn io_error(&self, source: std::io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Everything one conversation owns: its identifier, the visible messages,
/// the history replayed to the backend, and the mirror of attached servers.
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    store: Option<SessionStore>,
    pub messages: Vec<ChatMessage>,
    pub history: Vec<ConversationHistoryEntry>,
    pub servers: Vec<SessionServerRecord>,
    next_message_seq: u64,
}

impl SessionContext {
    /// A context whose identifier lives only in memory.
    pub fn ephemeral(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            store: None,
            messages: Vec::new(),
            history: Vec::new(),
            servers: Vec::new(),
            next_message_seq: 0,
        }
    }

    pub fn load_or_create(store: SessionStore) -> Result<Self, SessionStoreError> {
        let session_id = store.load_or_create()?;
        let mut context = Self::ephemeral(session_id);
        context.store = Some(store);
        Ok(context)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start over with a fresh identifier and empty state. The new identifier
    /// is persisted when the context has a store.
    pub fn reset(&mut self) -> Result<(), SessionStoreError> {
        let session_id = generate_session_id()?;
        if let Some(store) = &self.store {
            store.save(&session_id)?;
        }
        debug!("Session reset");
        self.session_id = session_id;
        self.messages.clear();
        self.history.clear();
        self.servers.clear();
        self.next_message_seq = 0;
        Ok(())
    }

    pub(crate) fn next_message_id(&mut self) -> String {
        self.next_message_seq += 1;
        format!("msg-{}", self.next_message_seq)
    }

    /// Append a message and return its index.
    pub(crate) fn push_message(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub(crate) fn record_user_turn(&mut self, text: &str) {
        self.history.push(ConversationHistoryEntry {
            role: Sender::User,
            text_content: text.to_string(),
            function_calls: Vec::new(),
        });
    }

    /// Add a completed assistant message to the replayed history.
    pub(crate) fn record_assistant_turn(&mut self, index: usize) {
        let Some(message) = self.messages.get(index) else {
            return;
        };
        if message.state != MessageState::Complete {
            return;
        }
        self.history.push(ConversationHistoryEntry {
            role: Sender::Assistant,
            text_content: message.content.clone(),
            function_calls: message.function_calls.clone(),
        });
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let first = generate_session_id().unwrap();
        let second = generate_session_id().unwrap();
        assert!(first.starts_with(SESSION_ID_PREFIX));
        assert_eq!(first.len(), SESSION_ID_PREFIX.len() + 22);
        assert_ne!(first, second);
    }

    #[test]
    fn identifier_survives_reload() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session_id"));

        let first = SessionContext::load_or_create(store.clone()).unwrap();
        let reloaded = SessionContext::load_or_create(store.clone()).unwrap();
        assert_eq!(first.session_id(), reloaded.session_id());
        assert_eq!(store.load().unwrap().as_deref(), Some(first.session_id()));
    }

    #[test]
    fn reset_replaces_identifier_and_clears_state() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session_id"));
        let mut context = SessionContext::load_or_create(store.clone()).unwrap();
        let original = context.session_id().to_string();

        let id = context.next_message_id();
        context.push_message(ChatMessage::user(id, "hello"));
        context.record_user_turn("hello");
        context.reset().unwrap();

        assert_ne!(context.session_id(), original);
        assert!(context.messages.is_empty());
        assert!(context.history.is_empty());
        assert_eq!(store.load().unwrap().as_deref(), Some(context.session_id()));
        assert_eq!(context.next_message_id(), "msg-1");
    }

    #[test]
    fn blank_session_file_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_id");
        fs::write(&path, "  \n").unwrap();

        let store = SessionStore::new(&path);
        let id = store.load_or_create().unwrap();
        assert!(id.starts_with(SESSION_ID_PREFIX));
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), id);
    }

    #[test]
    fn only_complete_assistant_messages_enter_history() {
        let mut context = SessionContext::ephemeral("s");
        let mut partial = ChatMessage::streaming_assistant("a1");
        partial.content.push_str("half");
        partial.state = MessageState::Truncated;
        let index = context.push_message(partial);
        context.record_assistant_turn(index);
        assert!(context.history.is_empty());

        context.messages[index].state = MessageState::Complete;
        context.record_assistant_turn(index);
        assert_eq!(context.history.len(), 1);
        assert_eq!(context.history[0].text_content, "half");
    }
}
