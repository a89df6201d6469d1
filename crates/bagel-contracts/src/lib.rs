pub mod error;
pub mod events;
pub mod journal;
pub mod operations;
pub mod output;
pub mod request;
pub mod sse;
pub mod tracker;

pub use error::ProtocolError;
pub use events::{EventKind, EventPayload, EventRecord};
pub use journal::{JobJournal, JobMilestone, JournalEntry, SavedArtifact};
pub use operations::{CaptionOptions, EditImageOptions, Operation, TextToImageOptions};
pub use output::{split_thinking, JobOutcome, OutputAsset, ThinkingSplit};
pub use request::{FileRef, JobArg, JobRequest, SessionToken, UploadId};
pub use sse::SseDecoder;
pub use tracker::{JobTracker, UploadTracker};
