// DAP wire framing
//
// Messages travel as an ASCII header block terminated by \r\n\r\n with a
// Content-Length header, followed by exactly that many bytes of UTF-8 JSON.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type DapResult<T> = Result<T, DapError>;

#[derive(Debug, thiserror::Error)]
pub enum DapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The debugger answered `success: false`.
    #[error("{0}")]
    Request(String),

    /// The child exited or its stdio closed; all pending requests fail.
    #[error("DAP client closed")]
    Closed,

    #[error("no thread id known; pass one explicitly or wait for a stop")]
    NoThread,

    #[error("invalid JSON in frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_seq: i64,
    pub success: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(EventMessage),
}

/// Encode one message as a single write: header block plus JSON body.
pub fn encode_frame(message: &ProtocolMessage) -> DapResult<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental frame parser over an arbitrary chunk stream.
///
/// Feed raw bytes with [`FrameDecoder::extend`], then drain complete
/// messages with [`FrameDecoder::next_frame`] until it returns `None`.
/// Partial frames stay buffered across calls.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Consume and return the next complete message, if one is buffered.
    ///
    /// Header blocks without a parseable Content-Length are skipped past
    /// their terminating \r\n\r\n and parsing continues with the next block.
    pub fn next_frame(&mut self) -> DapResult<Option<ProtocolMessage>> {
        loop {
            let Some(header_end) = find_subsequence(&self.buf, b"\r\n\r\n") else {
                return Ok(None);
            };

            match parse_content_length(&self.buf[..header_end]) {
                Some(content_length) => {
                    let frame_end = header_end + 4 + content_length;
                    if self.buf.len() < frame_end {
                        return Ok(None);
                    }
                    self.buf.advance(header_end + 4);
                    let body = self.buf.split_to(content_length);
                    let message = serde_json::from_slice(&body)?;
                    return Ok(Some(message));
                }
                None => {
                    // Malformed header block; resynchronize on the next one.
                    self.buf.advance(header_end + 4);
                }
            }
        }
    }
}

fn parse_content_length(header_block: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header_block).ok()?;
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value.trim().parse().ok();
        }
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Vec<u8> {
        let mut out = format!("Content-Length: {}\r\n\r\n", json.len()).into_bytes();
        out.extend_from_slice(json.as_bytes());
        out
    }

    #[test]
    fn single_event_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame(r#"{"type":"event","event":"terminated"}"#));

        let message = decoder.next_frame().unwrap().unwrap();
        assert!(matches!(
            message,
            ProtocolMessage::Event(EventMessage { ref event, .. }) if event == "terminated"
        ));
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn header_split_across_chunks() {
        let bytes = frame(r#"{"type":"event","event":"terminated"}"#);
        let mut decoder = FrameDecoder::new();

        decoder.extend(&bytes[..10]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(&bytes[10..]);
        let message = decoder.next_frame().unwrap().unwrap();
        assert!(matches!(message, ProtocolMessage::Event(_)));
    }

    #[test]
    fn two_messages_in_one_chunk() {
        let mut bytes = frame(r#"{"type":"event","event":"stopped","body":{"threadId":1}}"#);
        bytes.extend_from_slice(&frame(r#"{"type":"event","event":"terminated"}"#));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);

        let first = decoder.next_frame().unwrap().unwrap();
        let second = decoder.next_frame().unwrap().unwrap();
        assert!(matches!(
            first,
            ProtocolMessage::Event(EventMessage { ref event, .. }) if event == "stopped"
        ));
        assert!(matches!(
            second,
            ProtocolMessage::Event(EventMessage { ref event, .. }) if event == "terminated"
        ));
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn extra_headers_tolerated() {
        let json = r#"{"type":"event","event":"terminated"}"#;
        let raw = format!(
            "Content-Type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            json.len(),
            json
        );

        let mut decoder = FrameDecoder::new();
        decoder.extend(raw.as_bytes());
        assert!(decoder.next_frame().unwrap().is_some());
    }

    #[test]
    fn non_integer_content_length_skipped() {
        let mut raw = b"Content-Length: banana\r\n\r\n".to_vec();
        raw.extend_from_slice(&frame(r#"{"type":"event","event":"terminated"}"#));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&raw);

        let message = decoder.next_frame().unwrap().unwrap();
        assert!(matches!(
            message,
            ProtocolMessage::Event(EventMessage { ref event, .. }) if event == "terminated"
        ));
    }

    #[test]
    fn whitespace_tolerant_content_length() {
        let json = r#"{"type":"event","event":"terminated"}"#;
        let raw = format!("Content-Length:   {}  \r\n\r\n{}", json.len(), json);

        let mut decoder = FrameDecoder::new();
        decoder.extend(raw.as_bytes());
        assert!(decoder.next_frame().unwrap().is_some());
    }

    #[test]
    fn failed_response_round_trips() {
        let json = r#"{"type":"response","request_seq":7,"success":false,"command":"evaluate","message":"error CS0103"}"#;
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame(json));

        match decoder.next_frame().unwrap().unwrap() {
            ProtocolMessage::Response(response) => {
                assert_eq!(response.request_seq, 7);
                assert!(!response.success);
                assert_eq!(response.message.as_deref(), Some("error CS0103"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn encode_produces_parseable_frame() {
        let message = ProtocolMessage::Request(Request {
            seq: 1,
            command: "initialize".to_string(),
            arguments: serde_json::json!({"adapterID": "coreclr"}),
        });

        let bytes = encode_frame(&message).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);

        match decoder.next_frame().unwrap().unwrap() {
            ProtocolMessage::Request(request) => {
                assert_eq!(request.seq, 1);
                assert_eq!(request.command, "initialize");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
