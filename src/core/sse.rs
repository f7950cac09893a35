//! Incremental decoding of an event-stream body into text lines.
//!
//! Chunk boundaries are arbitrary: a multi-byte character or a line may be
//! split across any number of chunks. Undecodable bytes become U+FFFD, the
//! same way a lossy decoder treats them, so one bad byte never poisons the
//! rest of the stream.

use memchr::memchr;

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text after the last line terminator.
    pending_line: String,
}

impl SseDecoder {
    /// Feed one chunk and return every line it completed, without the
    /// terminator (`\n` or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_lines()
    }

    /// Flush what is left at end of stream: an unterminated last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_line.push_str(&tail);
            self.pending_bytes.clear();
        }

        let mut line = std::mem::take(&mut self.pending_line);
        if line.ends_with('\r') {
            line.pop();
        }
        (!line.is_empty()).then_some(line)
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        let mut consumed = 0;
        while consumed < self.pending_bytes.len() {
            let rest = &self.pending_bytes[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.pending_line.push_str(text);
                    consumed = self.pending_bytes.len();
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.pending_line
                        .push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.pending_line.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending_bytes.drain(..consumed);
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        let bytes = self.pending_line.as_bytes();

        while let Some(relative) = memchr(b'\n', &bytes[start..]) {
            let newline = start + relative;
            let line = &self.pending_line[start..newline];
            lines.push(line.strip_suffix('\r').unwrap_or(line).to_string());
            start = newline + 1;
        }

        if start > 0 {
            self.pending_line.drain(..start);
        }
        lines
    }
}

/// Payload of a `data:` line, with the single optional space after the
/// colon removed. Any other line yields `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_partial_lines_until_terminated() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: one").is_empty());
        assert_eq!(decoder.push(b"\n\ndata: two\r\n"), vec!["data: one", "", "data: two"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn carries_split_multibyte_characters() {
        let text = "data: caf\u{e9} \u{1f980}\n";
        let bytes = text.as_bytes();
        let mut decoder = SseDecoder::default();
        let mut lines = Vec::new();
        for byte in bytes {
            lines.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines, vec!["data: caf\u{e9} \u{1f980}"]);
    }

    #[test]
    fn replaces_invalid_bytes_and_keeps_going() {
        let mut decoder = SseDecoder::default();
        let lines = decoder.push(b"data: a\xffb\ndata: ok\n");
        assert_eq!(lines, vec!["data: a\u{fffd}b", "data: ok"]);
    }

    #[test]
    fn finish_returns_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: [DONE]"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn extracts_data_payloads() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:[DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(": keep-alive"), None);
    }
}
