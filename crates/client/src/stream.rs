//! Server-sent event decoding.

use domain::models::EventFrame;

use crate::error::ClientError;

/// Incremental decoder from SSE bytes to event frames.
///
/// Feed chunks as they arrive; complete events come back in order. Comment
/// lines (heartbeats) and blocks without data are skipped.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<EventFrame, ClientError>> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = decode_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Bytes of an incomplete event still waiting for more input.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn decode_block(block: &[u8]) -> Option<Result<EventFrame, ClientError>> {
    let text = String::from_utf8_lossy(block);
    let mut event_name = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event_name = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }

    let frame = serde_json::from_str::<EventFrame>(&data.join("\n")).map_err(ClientError::from);
    if let (Ok(frame), Some(name)) = (&frame, event_name) {
        if frame.event_type != name {
            tracing::debug!(
                event = name,
                frame_type = %frame.event_type,
                "SSE event name differs from frame type"
            );
        }
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: &str = "event: connected\ndata: {\"type\":\"connected\",\"data\":{\"userId\":\"6f1c1f8e-2f5b-4c53-9a59-0d6a4c1f9f01\",\"connectedAt\":\"2026-03-01T12:00:00Z\"},\"timestamp\":\"2026-03-01T12:00:00Z\"}\n\n";

    #[test]
    fn test_decodes_complete_event() {
        let mut decoder = EventStreamDecoder::new();
        let frames = decoder.push(CONNECTED.as_bytes());

        assert_eq!(frames.len(), 1);
        let frame = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(frame.event_type, "connected");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = EventStreamDecoder::new();
        let (head, tail) = CONNECTED.as_bytes().split_at(25);

        assert!(decoder.push(head).is_empty());
        assert!(decoder.pending_len() > 0);
        assert_eq!(decoder.push(tail).len(), 1);
    }

    #[test]
    fn test_heartbeat_comments_are_skipped() {
        let mut decoder = EventStreamDecoder::new();
        let input = format!(": heartbeat\n\n{}: heartbeat\n\n", CONNECTED);

        let frames = decoder.push(input.as_bytes());

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = EventStreamDecoder::new();
        let input = CONNECTED.replace('\n', "\r\n");

        assert_eq!(decoder.push(input.as_bytes()).len(), 1);
    }

    #[test]
    fn test_malformed_data_is_an_error() {
        let mut decoder = EventStreamDecoder::new();
        let frames = decoder.push(b"event: new_message\ndata: {not json}\n\n");

        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(ClientError::Decode(_))));
    }
}
