use std::path::PathBuf;

use bagel_contracts::ProtocolError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BagelError {
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("event stream from {endpoint} failed")]
    Stream {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{operation} produced no output: {detail}")]
    NoOutput {
        operation: &'static str,
        detail: String,
    },
    #[error("failed reading {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid upload content type {mime:?}")]
    InvalidMime {
        mime: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned an unexpected payload")]
    InvalidResponse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BagelError {
    /// Network-level failures: the server may never have seen the request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::Stream { .. }
        )
    }

    /// The server answered but never produced what the protocol promises.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::InvalidResponse { .. })
    }
}

pub type Result<T, E = BagelError> = std::result::Result<T, E>;
