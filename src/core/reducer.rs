//! Folding stream events into an in-progress assistant message.

use crate::api::StreamFrame;
use crate::core::chat_stream::{StreamEvent, StreamInterruption};
use crate::core::message::{ChatMessage, FunctionCallRecord, MessageState};

/// What a single event changed on the message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    TextAppended(String),
    /// Index of the record just appended to `function_calls`.
    FunctionCallAdded(usize),
    Completed,
    Truncated(StreamInterruption),
}

/// Apply one event to `message`.
///
/// Text only grows and function calls only append. A terminal message is
/// never touched again; events for it return `None`, as do frame kinds that
/// carry nothing for a chat message.
pub fn fold_event(message: &mut ChatMessage, event: StreamEvent) -> Option<MessageUpdate> {
    if message.is_terminal() {
        return None;
    }

    match event {
        StreamEvent::Frame(StreamFrame::Text { content }) => {
            if content.is_empty() {
                return None;
            }
            message.content.push_str(&content);
            Some(MessageUpdate::TextAppended(content))
        }
        StreamEvent::Frame(StreamFrame::FunctionCall(frame)) => {
            message.function_calls.push(FunctionCallRecord::from(frame));
            Some(MessageUpdate::FunctionCallAdded(
                message.function_calls.len() - 1,
            ))
        }
        StreamEvent::Frame(_) => None,
        StreamEvent::Done => {
            message.state = MessageState::Complete;
            Some(MessageUpdate::Completed)
        }
        StreamEvent::Interrupted(reason) => {
            message.state = MessageState::Truncated;
            Some(MessageUpdate::Truncated(reason))
        }
    }
}

/// Whether a completed message should be continued automatically: at least
/// one of its function results is neither a recommendation, nor waiting on
/// the user, nor final.
pub fn needs_follow_up(message: &ChatMessage) -> bool {
    message.state == MessageState::Complete
        && message
            .function_calls
            .iter()
            .any(|call| !call.pauses_chain())
}

/// Whether a completed message hands control back to the user: nothing is
/// sent back automatically and at least one result is a recommendation or
/// asks for user action. Results that are only final end the turn.
pub fn awaits_user(message: &ChatMessage) -> bool {
    message.state == MessageState::Complete
        && !needs_follow_up(message)
        && message
            .function_calls
            .iter()
            .any(FunctionCallRecord::waits_for_user)
}
