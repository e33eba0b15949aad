//! Mock downstream collector
//!
//! A catch-all HTTP listener standing in for the forwarder's real
//! destination. Every POST, at any path, is recorded in a [`CaptureLog`] and
//! answered with `200 ok`; the first capture fires a readiness signal the
//! orchestrator blocks on. Per-request access logging stays at `debug` so
//! console output is limited to orchestration messages.

use crate::error::{HarnessError, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use bytes::Bytes;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One request observed by the collector. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Ordered, append-only record of captured requests.
///
/// The accept loop is the only writer; the orchestrator reads only after the
/// readiness signal has fired.
#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    inner: Arc<RwLock<Vec<CapturedRequest>>>,
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, request: CapturedRequest) {
        self.inner.write().push(request);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// The first captured request, if any (arrival order)
    pub fn first(&self) -> Option<CapturedRequest> {
        self.inner.read().first().cloned()
    }

    pub fn all(&self) -> Vec<CapturedRequest> {
        self.inner.read().clone()
    }
}

/// Outcome of waiting for the first forwarded request
#[derive(Debug)]
pub enum CaptureOutcome {
    /// At least one request has been recorded
    Received,
    /// Protocol-level fault at the listener (e.g. client disconnected
    /// mid-body) - a test-infra failure, not an assertion failure
    Fault(String),
    /// Nothing arrived within the wait window
    TimedOut,
}

#[derive(Clone)]
struct CollectorState {
    log: CaptureLog,
    readiness_tx: watch::Sender<bool>,
    fault_tx: mpsc::Sender<String>,
}

/// The catch-all collector server
pub struct MockCollector {
    log: CaptureLog,
    readiness_rx: watch::Receiver<bool>,
    fault_rx: mpsc::Receiver<String>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MockCollector {
    /// Bind and start the accept loop on a background task.
    ///
    /// A bind failure is an environment fault: the port belongs to someone
    /// else and nothing has been launched yet.
    pub async fn start(bind_addr: &str, port: u16) -> Result<Self> {
        let addr: SocketAddr = format!("{bind_addr}:{port}")
            .parse()
            .map_err(|e| HarnessError::Environment(format!("invalid collector address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HarnessError::Environment(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let log = CaptureLog::new();
        let (readiness_tx, readiness_rx) = watch::channel(false);
        let (fault_tx, fault_rx) = mpsc::channel(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let state = CollectorState {
            log: log.clone(),
            readiness_tx,
            fault_tx,
        };

        let app = Router::new().fallback(capture_handler).with_state(state);

        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                debug!(error = %e, "Collector server error");
            }
        });

        info!(addr = %local_addr, "Catch-all collector listening");

        Ok(Self {
            log,
            readiness_rx,
            fault_rx,
            shutdown_tx,
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn log(&self) -> &CaptureLog {
        &self.log
    }

    /// Block until the first request is captured, a listener fault is
    /// reported, or the deadline elapses. Timeout is a normal control path.
    pub async fn wait_for_capture(&mut self, deadline: Duration) -> CaptureOutcome {
        tokio::select! {
            changed = self.readiness_rx.wait_for(|ready| *ready) => match changed {
                Ok(_) => CaptureOutcome::Received,
                Err(_) => CaptureOutcome::Fault("collector listener stopped".to_string()),
            },
            fault = self.fault_rx.recv() => {
                let message = fault.unwrap_or_else(|| "collector listener stopped".to_string());
                CaptureOutcome::Fault(message)
            }
            () = tokio::time::sleep(deadline) => CaptureOutcome::TimedOut,
        }
    }

    /// Stop the accept loop and release the bound port.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        info!("Catch-all collector stopped");
    }
}

/// Catch-all handler: record any POST, 405 anything else.
async fn capture_handler(
    State(state): State<CollectorState>,
    request: Request<Body>,
) -> impl IntoResponse {
    if request.method() != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "");
    }

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    // A mid-body disconnect means broken test infrastructure, not a wrong
    // forwarder: surface it through the fault channel and abort the run.
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = state
                .fault_tx
                .send(format!("failed to read request body: {e}"))
                .await;
            return (StatusCode::BAD_REQUEST, "");
        }
    };

    debug!(path = %path, bytes = body.len(), "Captured forwarded request");

    state.log.append(CapturedRequest {
        path,
        headers: parts.headers,
        body,
    });
    let _ = state.readiness_tx.send(true);

    (StatusCode::OK, "ok")
}
