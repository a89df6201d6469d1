//! Async client for a queue-based generative-media inference server.
//!
//! Jobs are submitted to `queue/join` and resolved by following the
//! session's SSE stream on `queue/data`. Image inputs go through `upload`
//! first, and a job only references an upload once its `upload_progress`
//! stream has reported `done`.

mod client;
pub mod config;
pub mod error;
mod operations;
pub mod stream;
#[cfg(test)]
mod test_support;

pub use client::{BagelClient, DownloadedAsset, SubmitAck};
pub use config::BagelConfig;
pub use error::{BagelError, Result};
pub use operations::{CaptionResult, ImageResult};
