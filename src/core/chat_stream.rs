use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use futures_util::{stream, Stream, StreamExt};
use tracing::debug;

use crate::api::{ByteStream, StreamFrame, DONE_SENTINEL};
use crate::core::sse::{data_payload, SseDecoder};

/// Typed event produced from one response body.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Frame(StreamFrame),
    /// The terminal sentinel was observed. Nothing follows.
    Done,
    /// The body ended or stalled before the sentinel. Nothing follows.
    Interrupted(StreamInterruption),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Interrupted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamInterruption {
    /// The connection closed without a terminal sentinel.
    Closed,
    /// No chunk arrived within the idle timeout.
    IdleTimeout(Duration),
    /// Reading the body failed mid-stream.
    Transport(String),
}

impl fmt::Display for StreamInterruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamInterruption::Closed => write!(f, "connection closed before the response finished"),
            StreamInterruption::IdleTimeout(timeout) => {
                write!(f, "no data received for {}s", timeout.as_secs())
            }
            StreamInterruption::Transport(err) => write!(f, "stream failed: {err}"),
        }
    }
}

/// Classify one complete line. Non-data lines and malformed payloads yield
/// `None`; they are never fatal to the stream.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    let payload = data_payload(line)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => Some(StreamEvent::Frame(frame)),
        Err(err) => {
            debug!(error = %err, payload_len = payload.len(), "Dropping malformed stream frame");
            None
        }
    }
}

struct FrameReader {
    body: ByteStream,
    decoder: SseDecoder,
    queued: VecDeque<StreamEvent>,
    idle_timeout: Option<Duration>,
    finished: bool,
}

impl FrameReader {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                if event.is_terminal() {
                    self.finished = true;
                    self.queued.clear();
                }
                return Some(event);
            }
            if self.finished {
                return None;
            }

            let next = match self.idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, self.body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.finished = true;
                        return Some(StreamEvent::Interrupted(StreamInterruption::IdleTimeout(
                            timeout,
                        )));
                    }
                },
                None => self.body.next().await,
            };

            match next {
                Some(Ok(chunk)) => self.queue_lines(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(StreamEvent::Interrupted(StreamInterruption::Transport(
                        err.to_string(),
                    )));
                }
                None => {
                    if let Some(event) = self.decoder.finish().as_deref().and_then(parse_line) {
                        self.queued.push_back(event);
                    }
                    self.queued
                        .push_back(StreamEvent::Interrupted(StreamInterruption::Closed));
                }
            }
        }
    }

    fn queue_lines(&mut self, chunk: &[u8]) {
        for line in self.decoder.push(chunk) {
            if let Some(event) = parse_line(&line) {
                let terminal = event.is_terminal();
                self.queued.push_back(event);
                if terminal {
                    break;
                }
            }
        }
    }
}

/// Lazily turn a response body into typed events.
///
/// The sequence is finite: it always ends with exactly one terminal event
/// ([`StreamEvent::Done`] or [`StreamEvent::Interrupted`]), and lines after
/// the sentinel are never parsed.
pub fn stream_events(
    body: ByteStream,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = StreamEvent> + Send {
    let reader = FrameReader {
        body,
        decoder: SseDecoder::default(),
        queued: VecDeque::new(),
        idle_timeout,
        finished: false,
    };

    stream::unfold(reader, |mut reader| async move {
        let event = reader.next_event().await?;
        Some((event, reader))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BackendError;
    use crate::utils::test_utils::sse_body;

    fn body_from_chunks(chunks: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(stream::iter(chunks.into_iter().map(Ok::<_, BackendError>)))
    }

    async fn collect(body: ByteStream) -> Vec<StreamEvent> {
        stream_events(body, None).collect().await
    }

    fn text(content: &str) -> StreamEvent {
        StreamEvent::Frame(StreamFrame::Text {
            content: content.to_string(),
        })
    }

    #[test]
    fn parse_line_handles_spacing_variants() {
        assert_eq!(parse_line(r#"data: {"type":"text","content":"Hello"}"#), Some(text("Hello")));
        assert_eq!(parse_line(r#"data:{"type":"text","content":"World"}"#), Some(text("World")));
        assert_eq!(parse_line("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(parse_line("data:[DONE]"), Some(StreamEvent::Done));
    }

    #[test]
    fn parse_line_ignores_noise() {
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line("data: "), None);
        assert_eq!(parse_line("data: {not json"), None);
        assert_eq!(parse_line(""), None);
    }

    #[tokio::test]
    async fn malformed_frames_do_not_halt_later_lines() {
        let body = body_from_chunks(vec![
            b"data: {\"type\":\"text\",\"content\":\"A\"}\ndata: {broken\n".to_vec(),
            b"data: {\"type\":\"text\",\"content\":\"B\"}\ndata: [DONE]\n".to_vec(),
        ]);
        assert_eq!(collect(body).await, vec![text("A"), text("B"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn lines_after_sentinel_are_not_emitted() {
        let body = body_from_chunks(vec![sse_body(&[
            r#"{"type":"text","content":"A"}"#,
            "[DONE]",
            r#"{"type":"text","content":"late"}"#,
        ])
        .into_bytes()]);
        assert_eq!(collect(body).await, vec![text("A"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn unterminated_sentinel_at_end_of_body_still_completes() {
        let body = body_from_chunks(vec![b"data: [DONE]".to_vec()]);
        assert_eq!(collect(body).await, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn closed_body_without_sentinel_is_interrupted() {
        let body = body_from_chunks(vec![b"data: {\"type\":\"text\",\"content\":\"A\"}\n".to_vec()]);
        assert_eq!(
            collect(body).await,
            vec![
                text("A"),
                StreamEvent::Interrupted(StreamInterruption::Closed)
            ]
        );
    }

    #[tokio::test]
    async fn transport_errors_interrupt_the_stream() {
        let body: ByteStream = Box::pin(stream::iter(vec![
            Ok(b"data: {\"type\":\"text\",\"content\":\"A\"}\n".to_vec()),
            Err(BackendError::Rejected("reset".to_string())),
            Ok(b"data: [DONE]\n".to_vec()),
        ]));
        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            StreamEvent::Interrupted(StreamInterruption::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_interrupts_stalled_body() {
        let body: ByteStream = Box::pin(
            stream::iter(vec![Ok::<_, BackendError>(
                b"data: {\"type\":\"text\",\"content\":\"A\"}\n".to_vec(),
            )])
                .chain(stream::pending()),
        );
        let events: Vec<_> = stream_events(body, Some(Duration::from_secs(5)))
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                text("A"),
                StreamEvent::Interrupted(StreamInterruption::IdleTimeout(Duration::from_secs(5)))
            ]
        );
    }
}
