//! HTTP endpoint receiving GitHub webhook deliveries.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tokio::net::TcpListener;

use crate::events::WebhookReporter;

/// Shared state of the webhook endpoint.
pub struct WebhookServerState {
    pub secret: String,
    /// Repository names whose deliveries are acknowledged and dropped.
    pub ignored_repositories: BTreeSet<String>,
    pub reporter: WebhookReporter,
}

pub fn build_webhook_router(state: Arc<WebhookServerState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/webhook", post(handle_webhook))
        .with_state(state)
}

/// Serves the webhook endpoint on `bind` until `shutdown` resolves.
pub async fn run_webhook_server<F>(
    bind: &str,
    state: Arc<WebhookServerState>,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve webhook bound address")?;
    tracing::info!(addr = %local_addr, "webhook server listening");

    axum::serve(listener, build_webhook_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server exited unexpectedly")
}

async fn handle_index() -> &'static str {
    ":3"
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

async fn handle_webhook(
    State(state): State<Arc<WebhookServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = header_str(&headers, "x-hub-signature-256").unwrap_or_default();
    if let Err(error) = verify_sha256_hmac_signature(&body, signature, &state.secret) {
        tracing::debug!(%error, "rejected webhook delivery");
        return StatusCode::BAD_REQUEST;
    }
    let Some(event) = header_str(&headers, "x-github-event") else {
        return StatusCode::BAD_REQUEST;
    };
    let delivery = header_str(&headers, "x-github-delivery").unwrap_or("unknown");
    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::debug!(delivery, event, %error, "webhook payload is not valid json");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Some(repository) = payload.get("repository") {
        if is_private_repository(repository) {
            return StatusCode::OK;
        }
        let ignored = repository
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| state.ignored_repositories.contains(name));
        if ignored {
            tracing::debug!(delivery, event, "ignoring delivery for ignored repository");
            return StatusCode::OK;
        }
    }

    match state.reporter.handle_event(event, &payload).await {
        Ok(_) => StatusCode::OK,
        Err(error) => {
            let pretty = serde_json::to_string_pretty(&payload).unwrap_or_default();
            tracing::error!(
                delivery,
                event,
                error = ?error,
                "failed to handle webhook event with payload:\n{pretty}"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn is_private_repository(repository: &Value) -> bool {
    repository.get("visibility").and_then(Value::as_str) == Some("private")
        || repository.get("private").and_then(Value::as_bool) == Some(true)
}

pub(crate) fn verify_sha256_hmac_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<()> {
    let digest_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or_else(|| anyhow!("signature must use sha256=<hex> format"))?;
    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .context("failed to initialize hmac verifier")?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| anyhow!("signature verification failed"))
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if trimmed.len() % 2 != 0 {
        bail!("signature digest must have an even number of hex characters");
    }
    (0..trimmed.len())
        .step_by(2)
        .map(|index| {
            let chunk = trimmed
                .get(index..index + 2)
                .ok_or_else(|| anyhow!("signature digest is not ascii hex"))?;
            u8::from_str_radix(chunk, 16)
                .with_context(|| format!("invalid hex byte '{chunk}' in signature digest"))
        })
        .collect()
}
