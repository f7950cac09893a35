//! Terminal rendering of turn progress.

use std::io::{self, Write};

use serde_json::Value;
use tracing::warn;

use crate::core::conversation::{TurnEvent, TurnObserver, TurnOutcome};
use crate::core::message::{FunctionCallRecord, MessageState};
use crate::core::session::SessionContext;
use crate::core::tool_invocation::ToolInvocationMessage;
use crate::utils::logging::TranscriptLog;

/// Prints assistant text as it streams and a one-line notice for everything
/// else. Finished messages are handed to the transcript log.
pub struct TerminalDisplay<'a, W: Write> {
    out: W,
    transcript: &'a TranscriptLog,
    line_open: bool,
}

impl<'a> TerminalDisplay<'a, io::Stdout> {
    pub fn stdout(transcript: &'a TranscriptLog) -> Self {
        Self::new(io::stdout(), transcript)
    }
}

impl<'a, W: Write> TerminalDisplay<'a, W> {
    pub fn new(out: W, transcript: &'a TranscriptLog) -> Self {
        Self {
            out,
            transcript,
            line_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }

    fn log(&self, session: &SessionContext, index: usize) {
        if let Some(message) = session.messages.get(index) {
            if let Err(err) = self.transcript.log_message(message) {
                warn!(error = %err, "Failed to write transcript");
            }
        }
    }

    fn render(&mut self, event: &TurnEvent, session: &SessionContext) -> io::Result<()> {
        match event {
            TurnEvent::UserMessage { index } => self.log(session, *index),
            TurnEvent::AssistantStarted { .. } => self.close_line()?,
            TurnEvent::TextDelta { delta, .. } => {
                write!(self.out, "{delta}")?;
                self.out.flush()?;
                self.line_open = true;
            }
            TurnEvent::FunctionCall { index, call } => {
                self.close_line()?;
                if let Some(record) = session
                    .messages
                    .get(*index)
                    .and_then(|message| message.function_calls.get(*call))
                {
                    write_function_call(&mut self.out, record)?;
                }
            }
            TurnEvent::AssistantFinished { index } => {
                self.close_line()?;
                self.log(session, *index);
            }
            TurnEvent::AssistantTruncated { index, reason } => {
                self.close_line()?;
                writeln!(self.out, "⚠️  Response interrupted: {reason}")?;
                self.log(session, *index);
            }
            TurnEvent::RequestFailed { index } => {
                self.close_line()?;
                if let Some(message) = session.messages.get(*index) {
                    writeln!(self.out, "❌ {}", message.content)?;
                }
            }
            TurnEvent::FollowUp { results, .. } => {
                self.close_line()?;
                let noun = if *results == 1 { "result" } else { "results" };
                writeln!(self.out, "↪ Sending {results} function {noun} back")?;
            }
            TurnEvent::FollowUpLimitReached { limit } => {
                self.close_line()?;
                writeln!(
                    self.out,
                    "⚠️  Stopped after {limit} automatic follow-ups. Send a message to continue."
                )?;
            }
        }
        Ok(())
    }
}

impl<W: Write> TurnObserver for TerminalDisplay<'_, W> {
    fn on_event(&mut self, event: &TurnEvent, session: &SessionContext) {
        if let Err(err) = self.render(event, session) {
            warn!(error = %err, "Failed to write to terminal");
        }
    }
}

fn write_function_call<W: Write>(out: &mut W, record: &FunctionCallRecord) -> io::Result<()> {
    match record.result_type() {
        Some(kind) => writeln!(out, "🔧 {} → {kind}", record.function_name)?,
        None => writeln!(out, "🔧 {}", record.function_name)?,
    }

    if record.is_recommendation() {
        let servers = recommended_servers(&record.function_result);
        if servers.is_empty() {
            writeln!(out, "💡 The assistant recommended servers for this task.")?;
        } else {
            writeln!(out, "💡 Recommended servers:")?;
            for (id, name) in &servers {
                match name {
                    Some(name) if name != id => writeln!(out, "  • {name} ({id})")?,
                    _ => writeln!(out, "  • {id}")?,
                }
            }
        }
        writeln!(out, "   Use /add <server> to attach one.")?;
    } else if record.requires_user_action() {
        let server = record
            .function_result
            .get("server_id")
            .or_else(|| record.function_args.get("server_id"))
            .and_then(Value::as_str)
            .unwrap_or("<server>");
        writeln!(out, "🔑 Configuration needed. Use /credentials {server}.")?;
    }
    Ok(())
}

/// `(id, name)` pairs from a recommendation result's `servers` or
/// `recommendations` array.
fn recommended_servers(result: &Value) -> Vec<(String, Option<String>)> {
    let entries = result
        .get("servers")
        .or_else(|| result.get("recommendations"))
        .and_then(Value::as_array);
    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(id) => Some((id.clone(), None)),
            Value::Object(fields) => {
                let id = ["server_id", "serverId", "id"]
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(Value::as_str))?;
                let name = fields
                    .get("name")
                    .or_else(|| fields.get("server_name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some((id.to_string(), name))
            }
            _ => None,
        })
        .collect()
}

/// Prints a tool invocation while it streams: the structured result as soon
/// as it arrives, then analysis text as it grows. Analysis that arrives before
/// the result is held back so the result is always shown first.
pub struct InvocationProgress<W: Write> {
    out: W,
    result_shown: bool,
    analysis_shown: usize,
    finished: bool,
}

impl<W: Write> InvocationProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            result_shown: false,
            analysis_shown: 0,
            finished: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print whatever became visible since the previous call.
    pub fn update(&mut self, invocation: &ToolInvocationMessage) {
        if let Err(err) = self.render(invocation) {
            warn!(error = %err, "Failed to write to terminal");
        }
    }

    fn render(&mut self, invocation: &ToolInvocationMessage) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        let terminal = invocation.state.is_terminal();

        if !self.result_shown {
            match invocation.result_summary() {
                Some(summary) => {
                    writeln!(self.out, "{summary}")?;
                    self.result_shown = true;
                }
                None if !terminal => return Ok(()),
                None => {}
            }
        }

        let pending = &invocation.analysis[self.analysis_shown..];
        if !pending.is_empty() {
            if self.analysis_shown == 0 && self.result_shown {
                writeln!(self.out)?;
            }
            write!(self.out, "{pending}")?;
            self.analysis_shown = invocation.analysis.len();
        }

        if terminal {
            self.finished = true;
            if self.analysis_shown > 0 && !invocation.analysis.ends_with('\n') {
                writeln!(self.out)?;
            }
            match invocation.state {
                MessageState::Error => writeln!(self.out, "❌ {}", invocation.render())?,
                MessageState::Truncated => {
                    if let Some(error) = &invocation.error {
                        writeln!(self.out, "⚠️  Tool output interrupted: {error}")?;
                    }
                }
                MessageState::Streaming | MessageState::Complete => {}
            }
        }
        self.out.flush()
    }
}

/// Short notice for how a turn ended, when it needs one.
pub fn outcome_notice(outcome: TurnOutcome) -> Option<&'static str> {
    match outcome {
        TurnOutcome::AwaitingUser => {
            Some("The assistant is waiting on you. Add a server or enter credentials to continue.")
        }
        TurnOutcome::Completed
        | TurnOutcome::Truncated
        | TurnOutcome::Failed
        | TurnOutcome::FollowUpLimitReached => None,
    }
}
