use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const FILE_DATA_TYPE: &str = "gradio.FileData";

/// Correlates a queue submission with its `queue/data` event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(format!("s{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates one upload POST with its `upload_progress` stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadId(String);

impl UploadId {
    pub fn generate() -> Self {
        Self(format!("u{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

/// Reference to a file the server has already materialized through `/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub meta: FileMeta,
    #[serde(rename = "_type")]
    pub kind: String,
    pub mime_type: String,
    pub orig_name: String,
    pub path: String,
}

impl FileRef {
    pub fn new(path: impl Into<String>, orig_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            meta: FileMeta {
                kind: FILE_DATA_TYPE.to_string(),
            },
            kind: FILE_DATA_TYPE.to_string(),
            mime_type: mime_type.into(),
            orig_name: orig_name.into(),
            path: path.into(),
        }
    }

    /// Names and types the reference after the local file it was uploaded from.
    pub fn for_upload(server_path: impl Into<String>, local: &Path) -> Self {
        let orig_name = local
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("image.png")
            .to_string();
        let mime = mime_for_path(local).unwrap_or("image/png");
        Self::new(server_path, orig_name, mime)
    }
}

/// One positional argument of a queue submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobArg {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    File(FileRef),
}

impl From<bool> for JobArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for JobArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for JobArg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for JobArg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for JobArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for JobArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<FileRef> for JobArg {
    fn from(value: FileRef) -> Self {
        Self::File(value)
    }
}

/// Body of a `queue/join` POST. Argument order is the server's wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub data: Vec<JobArg>,
    pub event_data: Option<Value>,
    pub fn_index: u32,
    pub trigger_id: u32,
    pub session_hash: SessionToken,
}

impl JobRequest {
    pub fn new(data: Vec<JobArg>, fn_index: u32, session_hash: SessionToken) -> Self {
        Self {
            data,
            event_data: None,
            fn_index,
            trigger_id: random_trigger_id(),
            session_hash,
        }
    }
}

// The server only uses the trigger id as a nonce.
fn random_trigger_id() -> u32 {
    (Uuid::new_v4().as_u128() % 1000) as u32
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
