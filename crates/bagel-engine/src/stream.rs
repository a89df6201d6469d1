use std::collections::VecDeque;
use std::pin::Pin;

use bagel_contracts::{EventRecord, JobOutcome, JobTracker, SseDecoder, UploadTracker};
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::error::{BagelError, BoxError, Result};

struct DecodeState<S> {
    endpoint: String,
    chunks: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<EventRecord>,
    finished: bool,
}

/// Turns a chunked byte stream into the records it carries, in arrival order.
///
/// The returned stream is finite and single-pass: it ends when the transport
/// ends and yields at most one error, for a transport failure mid-stream.
pub fn decode_events<S, B, E>(
    endpoint: impl Into<String>,
    chunks: S,
) -> impl Stream<Item = Result<EventRecord>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<BoxError>,
{
    let state = DecodeState {
        endpoint: endpoint.into(),
        chunks: Box::pin(chunks),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.pending.pop_front() {
                return Some((Ok(record), state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let records = state.decoder.push(chunk.as_ref());
                    state.pending.extend(records);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    let error = BagelError::Stream {
                        endpoint: state.endpoint.clone(),
                        source: err.into(),
                    };
                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    std::mem::take(&mut state.decoder).finish();
                    debug!(endpoint = %state.endpoint, "event stream ended");
                }
            }
        }
    })
}

/// Drives a job stream until its `process_completed` record.
///
/// Returns as soon as the terminal record is seen; the stream is dropped
/// with any records still queued behind it.
pub async fn consume_job_events<S>(events: S) -> Result<JobOutcome>
where
    S: Stream<Item = Result<EventRecord>>,
{
    let mut events = std::pin::pin!(events);
    let mut tracker = JobTracker::new();
    while let Some(record) = events.next().await {
        if let Some(outcome) = tracker.observe(&record?) {
            return Ok(outcome);
        }
    }
    Ok(tracker.finish()?)
}

/// Drives an upload progress stream until its first `done` record.
pub async fn consume_upload_events<S>(events: S) -> Result<()>
where
    S: Stream<Item = Result<EventRecord>>,
{
    let mut events = std::pin::pin!(events);
    let mut tracker = UploadTracker::new();
    while let Some(record) = events.next().await {
        if tracker.observe(&record?) {
            return Ok(());
        }
    }
    Ok(tracker.finish()?)
}
