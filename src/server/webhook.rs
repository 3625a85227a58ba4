//! Webhook endpoint handler.
//!
//! Verifies the delivery, turns it into a branch job and queues it. The
//! response is sent as soon as the job is queued; building happens in the
//! branch's worker.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::notify::Notifier;
use crate::process::ProcessRunner;
use crate::webhooks::{
    EventError, PushAction, PushEvent, SignatureError, is_connectivity_check, verify_signature,
};
use crate::worker::{BranchJob, DispatchError};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// GitHub caps webhook payloads at 25 MB.
pub const MAX_WEBHOOK_BODY: usize = 25 * 1024 * 1024;

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("{0}")]
    Payload(#[from] EventError),

    #[error("failed to read body: {0}")]
    Body(String),

    /// The dispatcher no longer accepts jobs (shutting down).
    #[error("unable to queue job: {0}")]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Signature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Payload(_) | WebhookError::Body(_) => StatusCode::BAD_REQUEST,
            WebhookError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

/// `POST /webhook`.
///
/// # Response
///
/// - 200 OK: connectivity check, ignored ref, or job queued
/// - 400 Bad Request: malformed payload or unusable branch name
/// - 401 Unauthorized: missing, malformed or wrong signature
/// - 503 Service Unavailable: shutting down
pub async fn webhook_handler<R: ProcessRunner, N: Notifier>(
    State(app_state): State<AppState<R, N>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    handle_delivery(&app_state, &headers, &body).await
}

/// Processes one delivery. Shared by the `/webhook` route and the
/// `webhook.<base>` host.
pub(crate) async fn handle_delivery<R: ProcessRunner, N: Notifier>(
    app_state: &AppState<R, N>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(headers, HEADER_EVENT);
    let delivery_id = get_header(headers, HEADER_DELIVERY).unwrap_or("-");

    debug!(
        delivery_id = %delivery_id,
        event_type = ?event_type,
        bytes = body.len(),
        "Received webhook"
    );

    if is_connectivity_check(event_type) {
        info!(delivery_id = %delivery_id, event_type = ?event_type, "Webhook connectivity check");
        return Ok((StatusCode::OK, "OK"));
    }

    // Verify signature BEFORE any parsing.
    if let Err(e) = verify_signature(
        &app_state.config().webhook_secret,
        body,
        get_header(headers, HEADER_SIGNATURE),
    ) {
        warn!(delivery_id = %delivery_id, error = %e, "Rejected webhook signature");
        return Err(e.into());
    }

    let action = PushEvent::parse(body)
        .and_then(|event| event.action())
        .inspect_err(|e| warn!(delivery_id = %delivery_id, error = %e, "Rejected webhook payload"))?;

    let dispatcher = app_state.dispatcher();
    match action {
        PushAction::Ignore => {
            debug!(delivery_id = %delivery_id, "Ignoring push to non-branch ref");
            Ok((StatusCode::OK, "Ignored"))
        }
        PushAction::Build { branch, url } => {
            dispatcher
                .submit(&branch, BranchJob::Build { url, notify: true })
                .await?;
            info!(delivery_id = %delivery_id, branch = %branch, "Build queued");
            Ok((StatusCode::OK, "Build queued"))
        }
        PushAction::Delete { branch } => {
            dispatcher.submit(&branch, BranchJob::Delete).await?;
            info!(delivery_id = %delivery_id, branch = %branch, "Deletion queued");
            Ok((StatusCode::OK, "Deletion queued"))
        }
    }
}

/// Extracts a header value as a string, if present and valid.
fn get_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
