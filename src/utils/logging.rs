use crate::core::message::{ChatMessage, MessageState, Sender};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Plain-text transcript of finished messages, appended as they complete.
pub struct TranscriptLog {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>) -> Self {
        let file_path = log_file.map(PathBuf::from);
        TranscriptLog {
            is_active: file_path.is_some(),
            file_path,
        }
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn Error>> {
        // Test if we can create/write to the file
        OpenOptions::new().create(true).append(true).open(&path)?;

        self.file_path = Some(PathBuf::from(&path));
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn Error>> {
        match &self.file_path {
            Some(path) => {
                self.is_active = !self.is_active;
                if self.is_active {
                    Ok(format!("Logging resumed to: {}", path.display()))
                } else {
                    Ok(format!("Logging paused (file: {})", path.display()))
                }
            }
            None => {
                Err("No log file specified. Use /log <filename> to enable logging first.".into())
            }
        }
    }

    /// Append a message once it has reached a terminal state. Streaming
    /// messages and empty assistant messages are skipped.
    pub fn log_message(&self, message: &ChatMessage) -> Result<(), Box<dyn Error>> {
        if !self.is_active || !message.is_terminal() {
            return Ok(());
        }
        let Some(path) = &self.file_path else {
            return Ok(());
        };

        let entry = match (message.sender, message.state) {
            (Sender::User, _) => format!("You: {}", message.content),
            (Sender::Assistant, _) if message.content.trim().is_empty() => return Ok(()),
            (Sender::Assistant, MessageState::Truncated) => {
                format!("{}\n[response interrupted]", message.content)
            }
            (Sender::Assistant, _) => message.content.clone(),
        };
        write_entry(path, &entry)
    }

    pub fn get_status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn write_entry(path: &Path, content: &str) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);

    for line in content.lines() {
        writeln!(writer, "{line}")?;
    }
    // Blank line between messages
    writeln!(writer)?;

    writer.flush()?;
    Ok(())
}
