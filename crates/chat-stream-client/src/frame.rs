//! Incremental decoder for the SSE-style frames sent by the streaming endpoint.
//!
//! A frame is a block of `event:` / `data:` lines terminated by a blank line.
//! The decoder keeps whatever follows the last delimiter as a remainder so
//! callers can feed it arbitrary network chunks.

use tracing::debug;

use crate::errors::FrameError;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// Default bound for the undelimited remainder (1 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// One decoded protocol unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Event name (`token`, `done`, `error`, ...).
    pub event: String,
    /// Parsed JSON payload of the concatenated `data:` lines.
    pub payload: serde_json::Value,
}

/// Result of one decode pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Complete frames in arrival order.
    pub frames: Vec<Frame>,
    /// Text after the last delimiter; never contains a complete frame.
    pub remainder: String,
}

/// Decodes every fully delimited frame in `remainder + received`.
///
/// Frames without data and frames whose data is not valid JSON are dropped.
pub fn decode(remainder: &str, received: &str) -> Decoded {
    let mut combined = String::with_capacity(remainder.len() + received.len());
    combined.push_str(remainder);
    combined.push_str(received);

    let (frames, consumed) = split_frames(&combined, 0);
    combined.replace_range(..consumed, "");
    Decoded {
        frames,
        remainder: combined,
    }
}

/// Parses the complete frames in `buf`, searching for delimiters from
/// `scan_from` onwards. Returns the frames and the byte length consumed.
///
/// `buf` must start at a frame boundary, and no delimiter may start before
/// `scan_from`.
fn split_frames(buf: &str, scan_from: usize) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut consumed = 0;
    let mut from = scan_from;
    while let Some((idx, delim_len)) = find_frame_delimiter(&buf.as_bytes()[from..]) {
        let end = from + idx;
        if let Some(frame) = parse_frame(&buf[consumed..end]) {
            frames.push(frame);
        }
        consumed = end + delim_len;
        from = consumed;
    }
    (frames, consumed)
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_frame(text: &str) -> Option<Frame> {
    let mut event: Option<&str> = None;
    let mut data = String::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            let name = rest.trim();
            if !name.is_empty() {
                event = Some(name);
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data.push_str(rest.trim());
        }
    }

    // Keep-alive and comment-only frames.
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data) {
        Ok(payload) => Some(Frame {
            event: event.unwrap_or(DEFAULT_EVENT).to_string(),
            payload,
        }),
        Err(e) => {
            debug!(event = event.unwrap_or(DEFAULT_EVENT), error = %e, "dropping frame with malformed JSON data");
            None
        }
    }
}

/// Stateful decoder owning one session's decode buffer.
///
/// Input is appended in place; the delimiter search resumes where the
/// previous push stopped, so a frame arriving in many chunks is scanned
/// once.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: String,
    /// Bytes of `buffer` already searched for a delimiter.
    scanned: usize,
    utf8: Utf8ChunkDecoder,
    max_buffer_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

impl FrameDecoder {
    /// Creates an empty decoder bounded to `max_buffer_bytes` of remainder.
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            scanned: 0,
            utf8: Utf8ChunkDecoder::default(),
            max_buffer_bytes,
        }
    }

    /// Appends raw network bytes and returns the frames they complete.
    ///
    /// A multi-byte character split across chunks is held back until its
    /// remaining bytes arrive.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, FrameError> {
        let text = self.utf8.decode(chunk);
        self.push_str(&text)
    }

    /// Appends already-decoded text and returns the frames it completes.
    ///
    /// Fails once the undelimited remainder is longer than the bound. The
    /// buffer is then discarded, including any frames completed by the same
    /// push; the caller is expected to abandon the stream.
    pub fn push_str(&mut self, text: &str) -> Result<Vec<Frame>, FrameError> {
        self.buffer.push_str(text);
        // A delimiter is at most 4 bytes, so one may straddle the old end.
        let (frames, consumed) = split_frames(&self.buffer, self.scanned.saturating_sub(3));
        if consumed > 0 {
            self.buffer.replace_range(..consumed, "");
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_buffer_bytes {
            self.reset();
            return Err(FrameError::TooLarge {
                limit: self.max_buffer_bytes,
            });
        }
        Ok(frames)
    }

    /// Text received but not yet forming a complete frame.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Empties the buffer and returns whatever undelimited input was left.
    pub fn finish(&mut self) -> Option<String> {
        let mut tail = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        tail.push_str(&self.utf8.flush());
        (!tail.is_empty()).then_some(tail)
    }

    /// Discards all buffered input.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.utf8 = Utf8ChunkDecoder::default();
    }
}

/// Streaming UTF-8 decoder; invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn flush(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "event: start\ndata: {\"ok\":true}\n\n",
        "event: token\ndata: {\"delta\":\"Xin chào\"}\n\n",
        ": keep-alive\n\n",
        "event: token\ndata: {\"delta\":\" 🌏 world\"}\n\n",
        "event: done\ndata: {\"answer\":\"Xin chào 🌏 world\",\n",
        "data: \"sources\":[]}\n\n",
    );

    fn decode_in_chunks(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.push_bytes(chunk).expect("within limit"));
        }
        frames
    }

    #[test]
    fn token_split_mid_json_decodes_once_complete() {
        let frames = decode_in_chunks(&[
            b"event: token\ndata: {\"delta\":\"Hel".as_slice(),
            b"lo\"}\n\n".as_slice(),
        ]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "token");
        assert_eq!(frames[0].payload["delta"], "Hello");
    }

    #[test]
    fn every_split_point_matches_whole_buffer_decode() {
        let whole = decode("", STREAM);
        assert_eq!(whole.frames.len(), 4);
        assert!(whole.remainder.is_empty());

        let bytes = STREAM.as_bytes();
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_in_chunks(&[a, b]), whole.frames, "split at {split}");
        }
    }

    #[test]
    fn byte_at_a_time_matches_whole_buffer_decode() {
        let chunks: Vec<&[u8]> = STREAM.as_bytes().chunks(1).collect();
        assert_eq!(decode_in_chunks(&chunks), decode("", STREAM).frames);
    }

    #[test]
    fn multibyte_character_split_across_chunks_is_preserved() {
        let text = "event: token\ndata: {\"delta\":\"é\"}\n\n".as_bytes();
        let e_acute = text.iter().position(|b| *b == 0xC3).expect("two-byte char");
        let frames = decode_in_chunks(&[&text[..e_acute + 1], &text[e_acute + 1..]]);
        assert_eq!(frames[0].payload["delta"], "é");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let frames = decode_in_chunks(&[b"data: {\"delta\":\"a\xFFb\"}\n\n".as_slice()]);
        assert_eq!(frames[0].payload["delta"], "a\u{FFFD}b");
    }

    #[test]
    fn missing_event_line_defaults_to_message() {
        let decoded = decode("", "data: {\"x\":1}\n\n");
        assert_eq!(decoded.frames[0].event, DEFAULT_EVENT);
    }

    #[test]
    fn empty_or_missing_data_produces_no_frame() {
        let decoded = decode("", "event: token\n\nevent: token\ndata:\n\ndata:   \n\n");
        assert!(decoded.frames.is_empty());
        assert!(decoded.remainder.is_empty());
    }

    #[test]
    fn malformed_json_is_dropped_without_affecting_later_frames() {
        let decoded = decode(
            "",
            "event: token\ndata: {\"delta\":\n\nevent: token\ndata: {\"delta\":\"ok\"}\n\n",
        );
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.frames[0].payload["delta"], "ok");
    }

    #[test]
    fn data_lines_are_trimmed_and_concatenated_in_order() {
        let decoded = decode("", "data: {\"a\":\ndata:   \"b\"  \ndata: }\n\n");
        assert_eq!(decoded.frames[0].payload, serde_json::json!({"a":"b"}));
    }

    #[test]
    fn crlf_delimited_frames_are_decoded() {
        let decoded = decode("", "event: done\r\ndata: {\"ok\":true}\r\n\r\nevent: tok");
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.frames[0].event, "done");
        assert_eq!(decoded.remainder, "event: tok");
    }

    #[test]
    fn remainder_never_holds_a_complete_frame() {
        let bytes = STREAM.as_bytes();
        let mut decoder = FrameDecoder::default();
        for chunk in bytes.chunks(7) {
            decoder.push_bytes(chunk).expect("within limit");
            assert!(find_frame_delimiter(decoder.remainder().as_bytes()).is_none());
        }
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn decoding_consumed_input_again_is_a_no_op() {
        let first = decode("", "data: {\"a\":1}\n\ndata: {\"b\"");
        let again = decode(&first.remainder, "");
        assert!(again.frames.is_empty());
        assert_eq!(again.remainder, first.remainder);
        assert_eq!(decode("", ""), Decoded::default());
    }

    #[test]
    fn remainder_over_limit_is_rejected() {
        let mut decoder = FrameDecoder::new(16);
        assert!(decoder.push_str("data: {\"ok\":1}\n\n").is_ok());
        let err = decoder
            .push_str("data: {\"never\":\"delimited\"")
            .expect_err("over limit");
        assert_eq!(err, FrameError::TooLarge { limit: 16 });
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn frames_completed_alongside_an_oversized_tail_are_discarded() {
        let mut decoder = FrameDecoder::new(32);
        let chunk = format!(
            "event: token\ndata: {{\"delta\":\"a\"}}\n\ndata: {}",
            "x".repeat(64)
        );
        assert_eq!(
            decoder.push_str(&chunk),
            Err(FrameError::TooLarge { limit: 32 })
        );
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn large_frame_in_small_chunks_decodes_once() {
        let answer = "y".repeat(512 * 1024);
        let text = format!("event: token\ndata: {{\"delta\":\"a\"}}\n\nevent: done\ndata: {{\"answer\":\"{answer}\"}}\r\n\r\n");
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        for chunk in text.as_bytes().chunks(64) {
            frames.extend(decoder.push_bytes(chunk).expect("within limit"));
            assert_eq!(decoder.scanned, decoder.buffer.len());
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].event, "done");
        assert_eq!(frames[1].payload["answer"].as_str().map(str::len), Some(answer.len()));
        assert!(decoder.remainder().is_empty());
    }

    #[test]
    fn delimiter_straddling_pushes_is_found() {
        for split in ["\r", "\r\n", "\r\n\r"] {
            let mut decoder = FrameDecoder::default();
            assert!(decoder.push_str(&format!("data: {{\"a\":1}}{split}")).expect("ok").is_empty());
            let rest = &"\r\n\r\n"[split.len()..];
            let frames = decoder.push_str(rest).expect("ok");
            assert_eq!(frames.len(), 1, "split after {split:?}");
        }
    }

    #[test]
    fn finish_returns_undelimited_tail() {
        let mut decoder = FrameDecoder::default();
        decoder
            .push_bytes(b"event: token\ndata: {\"delta\":\"x\"}")
            .expect("within limit");
        assert_eq!(
            decoder.finish().as_deref(),
            Some("event: token\ndata: {\"delta\":\"x\"}")
        );
        assert_eq!(decoder.finish(), None);
    }
}
