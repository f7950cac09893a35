use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::conversation::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_FOLLOW_UPS};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const BACKEND_URL_ENV: &str = "TOOLCHAT_BACKEND_URL";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the chat backend (e.g., "https://chat.example.com")
    pub backend_url: Option<String>,
    /// Seconds to wait for the next stream chunk; 0 waits forever
    pub stream_idle_timeout_secs: Option<u64>,
    /// Automatic function-result follow-ups allowed per user turn
    pub max_follow_ups: Option<usize>,
    /// Where the session identifier is stored, instead of the config dir
    pub session_file: Option<PathBuf>,
    /// Append finished messages to this file
    pub transcript_log: Option<String>,
}

/// Keys accepted by `toolchat set` / `toolchat unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    BackendUrl,
    StreamIdleTimeout,
    MaxFollowUps,
    SessionFile,
    TranscriptLog,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::BackendUrl,
        ConfigKey::StreamIdleTimeout,
        ConfigKey::MaxFollowUps,
        ConfigKey::SessionFile,
        ConfigKey::TranscriptLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::BackendUrl => "backend-url",
            ConfigKey::StreamIdleTimeout => "stream-idle-timeout",
            ConfigKey::MaxFollowUps => "max-follow-ups",
            ConfigKey::SessionFile => "session-file",
            ConfigKey::TranscriptLog => "transcript-log",
        }
    }

    pub fn parse(key: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == key)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("Unknown config key '{key}'. Known keys: {}", known.join(", "))
            })
    }
}

impl Config {
    /// Backend URL with the environment override applied.
    pub fn backend_url(&self) -> String {
        std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.stream_idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn max_follow_ups(&self) -> usize {
        self.max_follow_ups.unwrap_or(DEFAULT_MAX_FOLLOW_UPS)
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), String> {
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("A value is required for {}", key.as_str()));
        }

        match key {
            ConfigKey::BackendUrl => {
                crate::utils::url::endpoint_url(value, &[])
                    .map_err(|err| format!("Invalid backend URL: {err}"))?;
                self.backend_url = Some(value.to_string());
            }
            ConfigKey::StreamIdleTimeout => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("Expected a number of seconds, got '{value}'"))?;
                self.stream_idle_timeout_secs = Some(secs);
            }
            ConfigKey::MaxFollowUps => {
                let count = value
                    .parse::<usize>()
                    .map_err(|_| format!("Expected a whole number, got '{value}'"))?;
                self.max_follow_ups = Some(count);
            }
            ConfigKey::SessionFile => self.session_file = Some(PathBuf::from(value)),
            ConfigKey::TranscriptLog => self.transcript_log = Some(value.to_string()),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::BackendUrl => self.backend_url = None,
            ConfigKey::StreamIdleTimeout => self.stream_idle_timeout_secs = None,
            ConfigKey::MaxFollowUps => self.max_follow_ups = None,
            ConfigKey::SessionFile => self.session_file = None,
            ConfigKey::TranscriptLog => self.transcript_log = None,
        }
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
