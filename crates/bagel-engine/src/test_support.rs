use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            (name == key).then(|| value.to_string())
        })
    }
}

pub enum Step {
    Send(Vec<u8>),
    Pause(Duration),
    Flag(Arc<AtomicBool>),
    /// Fails the body mid-stream, so the connection closes without a final chunk.
    Abort,
}

pub enum Reply {
    Body {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Sse(Vec<Step>),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::Body {
            status,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self::Body {
            status,
            content_type,
            body,
        }
    }

    pub fn sse(steps: Vec<Step>) -> Self {
        Self::Sse(steps)
    }
}

pub fn sse_frame(record: &Value) -> Vec<u8> {
    format!("data: {record}\n\n").into_bytes()
}

type Route = dyn Fn(&RecordedRequest) -> Reply + Send + Sync;

#[derive(Clone)]
struct MockState {
    route: Arc<Route>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Loopback axum server that records every request and answers it from `route`.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    server: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(route: F) -> anyhow::Result<Self>
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            route: Arc::new(route),
            requests: requests.clone(),
        };
        let router = Router::new().fallback(record_and_reply).with_state(state);

        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                eprintln!("mock server stopped: {err}");
            }
        });

        Ok(Self {
            addr,
            requests,
            server,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record_and_reply(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        body: body.to_vec(),
    };
    if let Ok(mut requests) = state.requests.lock() {
        requests.push(request.clone());
    }

    match (state.route)(&request) {
        Reply::Body {
            status,
            content_type,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Reply::Sse(steps) => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(scripted(steps)),
        )
            .into_response(),
    }
}

fn scripted(steps: Vec<Step>) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::unfold(VecDeque::from(steps), |mut steps| async move {
        while let Some(step) = steps.pop_front() {
            match step {
                Step::Send(bytes) => return Some((Ok(Bytes::from(bytes)), steps)),
                Step::Pause(duration) => tokio::time::sleep(duration).await,
                Step::Flag(flag) => flag.store(true, Ordering::SeqCst),
                Step::Abort => {
                    steps.clear();
                    let err = io::Error::new(io::ErrorKind::ConnectionReset, "scripted abort");
                    return Some((Err(err), steps));
                }
            }
        }
        None
    })
}
