use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::operations::Operation;
use crate::request::{FileRef, SessionToken};

/// A point in a job's life worth keeping after the process exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobMilestone {
    /// The server confirmed the input file on the upload progress stream.
    UploadCompleted { file: FileRef },
    JobResolved {
        operation: Operation,
        event_id: Option<String>,
        url: String,
    },
    CaptionReceived {
        event_id: Option<String>,
        think: Option<String>,
        text: String,
    },
    ArtifactSaved(SavedArtifact),
}

/// A downloaded output written to local disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    pub sha256: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub job: SessionToken,
    pub ts: String,
    #[serde(flatten)]
    pub milestone: JobMilestone,
}

/// Append-only JSONL file of [`JournalEntry`] lines, keyed by session token.
#[derive(Debug, Clone)]
pub struct JobJournal {
    path: PathBuf,
}

impl JobJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, job: &SessionToken, milestone: JobMilestone) -> anyhow::Result<JournalEntry> {
        let entry = JournalEntry {
            job: job.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            milestone,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // A single append-mode write keeps each line whole.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal {}", self.path.display()))?;
        file.write_all(&line)?;

        Ok(entry)
    }

    /// Reads every entry back, oldest first.
    pub fn entries(&self) -> anyhow::Result<Vec<JournalEntry>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read journal {}", self.path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("journal line {} is malformed", index + 1))
            })
            .collect()
    }
}
