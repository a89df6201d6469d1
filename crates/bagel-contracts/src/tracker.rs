use serde_json::Value;
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::events::{EventKind, EventRecord};
use crate::output::{JobOutcome, OutputAsset};

/// Per-job accumulator driven one record at a time.
///
/// `observe` returns the outcome exactly once, on the first
/// `process_completed`; records after that are ignored so a late record can
/// never overwrite a resolved result.
#[derive(Debug, Default)]
pub struct JobTracker {
    event_id: Option<String>,
    outcome: Option<JobOutcome>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn observe(&mut self, record: &EventRecord) -> Option<JobOutcome> {
        if self.outcome.is_some() {
            return None;
        }
        match record.kind {
            EventKind::Estimation | EventKind::ProcessStarts => {
                if let Some(event_id) = record.event_id.as_ref() {
                    self.event_id = Some(event_id.clone());
                }
                None
            }
            EventKind::ProcessCompleted => {
                let outcome = self.complete(record);
                info!(
                    event_id = outcome.event_id.as_deref().unwrap_or(""),
                    has_output = outcome.output.is_some(),
                    "job resolved"
                );
                self.outcome = Some(outcome.clone());
                Some(outcome)
            }
            _ => {
                debug!(kind = record.kind.as_str(), "ignoring job record");
                None
            }
        }
    }

    /// Consumes the tracker once the transport has ended.
    pub fn finish(self) -> Result<JobOutcome, ProtocolError> {
        self.outcome.ok_or(ProtocolError::JobStreamEnded)
    }

    fn complete(&self, record: &EventRecord) -> JobOutcome {
        let output_body = record.payload.get("output");
        let output = output_body
            .and_then(|output| output.get("data"))
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .filter(|first| !first.is_null())
            .cloned()
            .map(OutputAsset::from_value);
        let failed = record.payload.get("success").and_then(Value::as_bool) == Some(false);
        let error = output_body
            .and_then(|output| output.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| failed.then(|| "server reported failure".to_string()));
        JobOutcome {
            event_id: self.event_id.clone(),
            output_url: output.as_ref().and_then(|asset| asset.url.clone()),
            output,
            error,
        }
    }
}

/// Tracks an upload's progress stream until the server reports `done`.
#[derive(Debug, Default)]
pub struct UploadTracker {
    done: bool,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &EventRecord) -> bool {
        if record.kind == EventKind::Done {
            self.done = true;
        }
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn finish(self) -> Result<(), ProtocolError> {
        if self.done {
            Ok(())
        } else {
            Err(ProtocolError::UploadStreamEnded)
        }
    }
}
