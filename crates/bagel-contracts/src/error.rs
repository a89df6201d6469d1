use thiserror::Error;

/// The transport behaved but the server never met a protocol expectation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("job event stream ended without a process_completed record (no output received)")]
    JobStreamEnded,
    #[error("upload progress stream ended without completion")]
    UploadStreamEnded,
    #[error("upload response carried no file handle")]
    MissingFileHandle,
}
