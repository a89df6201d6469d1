use thiserror::Error;
use tracing::{debug, warn};

use crate::events::EventRecord;

const FRAME_SEPARATOR: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("frame payload is not a JSON event record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Incremental decoder for `data: <json>` frames separated by a blank line.
///
/// Bytes are buffered until a separator arrives, so a frame split across any
/// number of chunks decodes exactly like the same frame delivered whole.
/// Frames without the `data: ` prefix (comments, keep-alives) are skipped and
/// frames whose payload fails to parse are dropped with a warning.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    dropped_frames: u64,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every record completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<EventRecord> {
        // The held-back bytes were already searched; only the last byte can
        // still start a separator together with the new chunk.
        let mut cursor = self
            .buffer
            .len()
            .saturating_sub(FRAME_SEPARATOR.len() - 1);
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = find_separator(&self.buffer[cursor..]) {
            let frame_end = cursor + offset;
            match decode_frame(&self.buffer[consumed..frame_end]) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    self.dropped_frames += 1;
                    warn!(error = %err, "dropping undecodable SSE frame");
                }
            }
            consumed = frame_end + FRAME_SEPARATOR.len();
            cursor = consumed;
        }
        self.buffer.drain(..consumed);
        records
    }

    /// Number of bytes held back waiting for a separator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Ends decoding. An unterminated remainder is never a frame and is discarded.
    pub fn finish(self) -> usize {
        let remainder = self.buffer.len();
        if remainder > 0 {
            debug!(bytes = remainder, "discarding unterminated SSE remainder");
        }
        remainder
    }
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(FRAME_SEPARATOR.len())
        .position(|window| window == FRAME_SEPARATOR)
}

fn decode_frame(frame: &[u8]) -> Result<Option<EventRecord>, FrameDecodeError> {
    let text = std::str::from_utf8(frame)?;
    let Some(body) = text.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let record = EventRecord::from_json(body)?;
    debug!(kind = record.kind.as_str(), "decoded SSE record");
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::events::EventKind;

    use super::SseDecoder;

    const STREAM: &str = concat!(
        "data: {\"msg\":\"estimation\",\"event_id\":\"e1\",\"queue_size\":2}\n\n",
        ": keep-alive\n\n",
        "data: {\"msg\":\"process_starts\",\"event_id\":\"e1\"}\n\n",
        "data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"partial ✨\"]}}\n\n",
        "data: {\"msg\":\"process_completed\",\"output\":{\"data\":[{\"url\":\"http://x/img.png\"}]}}\n\n",
    );

    fn kinds(decoder: &mut SseDecoder, chunks: &[&[u8]]) -> Vec<EventKind> {
        chunks
            .iter()
            .flat_map(|chunk| decoder.push(chunk))
            .map(|record| record.kind)
            .collect()
    }

    #[test]
    fn decodes_every_frame_in_a_single_chunk() {
        let mut decoder = SseDecoder::new();
        let records = decoder.push(STREAM.as_bytes());
        let kinds: Vec<EventKind> = records.iter().map(|record| record.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Estimation,
                EventKind::ProcessStarts,
                EventKind::ProcessGenerating,
                EventKind::ProcessCompleted,
            ]
        );
        assert_eq!(records[0].event_id.as_deref(), Some("e1"));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn output_is_independent_of_chunk_boundaries() {
        let bytes = STREAM.as_bytes();
        let whole = kinds(&mut SseDecoder::new(), &[bytes]);

        for size in 1..=17 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let mut decoder = SseDecoder::new();
            assert_eq!(kinds(&mut decoder, &chunks), whole, "chunk size {size}");
            assert_eq!(decoder.dropped_frames(), 0);
        }

        for split in 0..bytes.len() {
            let (head, tail) = bytes.split_at(split);
            assert_eq!(
                kinds(&mut SseDecoder::new(), &[head, tail]),
                whole,
                "split at {split}"
            );
        }
    }

    #[test]
    fn partial_frame_is_buffered_until_separator() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"msg\":\"est").is_empty());
        assert!(decoder.push(b"imation\"}\n").is_empty());
        let records = decoder.push(b"\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EventKind::Estimation);
    }

    #[test]
    fn malformed_json_is_dropped_and_decoding_continues() {
        let mut decoder = SseDecoder::new();
        let first = decoder.push(b"data: {not json}\n\ndata: {\"msg\":\"heartbeat\"}\n\n");
        let second = decoder.push(b"data: {\"msg\":\"done\"}\n\n");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, EventKind::Heartbeat);
        assert_eq!(second[0].kind, EventKind::Done);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn large_frame_in_small_chunks_decodes_in_linear_time() {
        let blob = "A".repeat(8 << 20);
        let frame = format!(
            "data: {{\"msg\":\"process_completed\",\"output\":{{\"data\":[{{\"url\":\"http://x/big.png\",\"b64\":\"{blob}\"}}]}}}}\n\n"
        );

        let started = Instant::now();
        let mut decoder = SseDecoder::new();
        let mut records = Vec::new();
        for chunk in frame.as_bytes().chunks(8 << 10) {
            records.extend(decoder.push(chunk));
        }

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EventKind::ProcessCompleted);
        assert_eq!(decoder.pending_len(), 0);
        // Rescanning the whole buffer on every chunk takes minutes here.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn separator_split_across_chunks_is_found() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"msg\":\"done\"}\n").is_empty());
        let records = decoder.push(b"\ndata: {\"msg\":\"heartbeat\"}\n\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, EventKind::Heartbeat);
    }

    #[test]
    fn unterminated_remainder_is_discarded_on_finish() {
        let mut decoder = SseDecoder::new();
        let records = decoder.push(b"data: {\"msg\":\"done\"}\n\ndata: {\"msg\":\"process_com");
        assert_eq!(records.len(), 1);
        assert_eq!(decoder.finish(), "data: {\"msg\":\"process_com".len());
    }
}
