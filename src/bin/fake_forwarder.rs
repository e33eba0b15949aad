//! Fake forwarder binary
//!
//! A stand-in process-under-test used by the crate's own black-box tests.
//! Speaks the same external contract as the real forwarder: a JSON ingress
//! endpoint, a `/health` API endpoint, and a downstream target taken from
//! `FORWARD_URL`/`FORWARD_AUTH_TOKEN`/`DATABRICKS_*` environment variables.
//! Each ingested event is wrapped in an envelope, batched into a one-element
//! array, and POSTed downstream with the auth and identifier headers.
//!
//! Knobs (environment):
//! - `FORWARDER_INGRESS_ADDR` (default `127.0.0.1:8080`)
//! - `FORWARDER_API_ADDR` (default `127.0.0.1:8686`)
//! - `FORWARDER_SUPPRESS_FORWARD=1` - accept stimuli but never forward,
//!   for exercising the harness's capture timeout path
//! - `FORWARDER_TRUNCATE_FORWARD=1` - forward a request that declares more
//!   body than it delivers, then hang up, for exercising the collector's
//!   protocol-fault path

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::future::IntoFuture;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct ForwarderState {
    client: reqwest::Client,
    forward_url: String,
    auth_token: String,
    workspace_url: String,
    table_name: String,
    suppress_forward: bool,
    truncate_forward: bool,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr like the real forwarder, so the harness's diagnostic
    // replay picks these lines up
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let ingress_addr = env_or("FORWARDER_INGRESS_ADDR", "127.0.0.1:8080");
    let api_addr = env_or("FORWARDER_API_ADDR", "127.0.0.1:8686");

    let state = ForwarderState {
        client: reqwest::Client::new(),
        forward_url: env_or("FORWARD_URL", "http://127.0.0.1:9090"),
        auth_token: env_or("FORWARD_AUTH_TOKEN", ""),
        workspace_url: env_or("DATABRICKS_WORKSPACE_URL", ""),
        table_name: env_or("DATABRICKS_TABLE_NAME", ""),
        suppress_forward: env_or("FORWARDER_SUPPRESS_FORWARD", "0") == "1",
        truncate_forward: env_or("FORWARDER_TRUNCATE_FORWARD", "0") == "1",
    };

    let ingress = Router::new().fallback(ingress_handler).with_state(state);
    let api = Router::new().route("/health", get(|| async { "ok" }));

    let ingress_listener = tokio::net::TcpListener::bind(&ingress_addr).await?;
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!(ingress = %ingress_addr, api = %api_addr, "Fake forwarder listening");

    tokio::try_join!(
        axum::serve(ingress_listener, ingress).into_future(),
        axum::serve(api_listener, api).into_future(),
    )?;

    Ok(())
}

/// Accept a JSON event at any path, ack immediately, forward in the
/// background.
async fn ingress_handler(
    State(state): State<ForwarderState>,
    request: axum::extract::Request,
) -> impl IntoResponse {
    if request.method() != axum::http::Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "");
    }

    let body: Bytes = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, "read error"),
    };
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid json"),
    };

    if state.suppress_forward {
        info!("Forwarding suppressed, dropping event");
    } else if state.truncate_forward {
        tokio::spawn(forward_truncated(state));
    } else {
        tokio::spawn(forward(state, payload));
    }

    (StatusCode::OK, "ok")
}

/// Open a raw connection to the forward target, declare more body than is
/// sent, and hang up mid-body.
async fn forward_truncated(state: ForwarderState) {
    use tokio::io::AsyncWriteExt;

    let target = state.forward_url.trim_start_matches("http://").to_string();
    match tokio::net::TcpStream::connect(&target).await {
        Ok(mut stream) => {
            let request = b"POST / HTTP/1.1\r\n\
                            Host: collector\r\n\
                            Content-Type: application/json\r\n\
                            Content-Length: 100\r\n\
                            \r\n\
                            {\"partial\":";
            let _ = stream.write_all(request).await;
            let _ = stream.flush().await;
            info!("Sent truncated request and hung up");
        }
        Err(e) => error!(error = %e, "Truncated forward connect failed"),
    }
}

async fn forward(state: ForwarderState, payload: Value) {
    let batch = json!([{
        "message": payload,
        "request_metadata": {
            "forwarder": "fake-forwarder",
            "batch_size": 1,
        },
    }]);

    let result = state
        .client
        .post(&state.forward_url)
        .header("Authorization", format!("Bearer {}", state.auth_token))
        .header("Content-Type", "application/json")
        .header("unity-catalog-endpoint", &state.workspace_url)
        .header("x-databricks-zerobus-table-name", &state.table_name)
        .body(batch.to_string())
        .send()
        .await;

    match result {
        Ok(response) => info!(status = %response.status(), "Forwarded batch"),
        Err(e) => error!(error = %e, "Forwarding failed"),
    }
}
