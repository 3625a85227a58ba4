//! Serving published branch output by host.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};

use super::AppState;
use super::webhook::{MAX_WEBHOOK_BODY, WebhookError, handle_delivery};
use crate::notify::Notifier;
use crate::process::ProcessRunner;
use crate::routing::{HostRoute, RequestPath, Resolved, normalize_host, resolve, route_host};

/// Fallback handler for every request not matched by another route.
pub async fn content_handler<R: ProcessRunner, N: Notifier>(
    State(app_state): State<AppState<R, N>>,
    request: Request,
) -> Response {
    let host = request_host(&request);
    let route = route_host(&host, &app_state.config().base_domain);
    debug!(host = %host, route = ?route, path = %request.uri().path(), "Routing request");

    match route {
        HostRoute::Webhook => delegate_to_webhook(&app_state, request).await,
        HostRoute::RedirectToBase => {
            let target = format!(
                "{}://{}{}",
                app_state.scheme().as_str(),
                app_state.config().base_domain,
                path_and_query(request.uri())
            );
            Redirect::temporary(&target).into_response()
        }
        HostRoute::NotFound => StatusCode::NOT_FOUND.into_response(),
        HostRoute::Branch(branch) => {
            if request.method() != Method::GET && request.method() != Method::HEAD {
                return StatusCode::METHOD_NOT_ALLOWED.into_response();
            }

            let Ok(path) = RequestPath::parse(request.uri().path()) else {
                debug!(path = %request.uri().path(), "Rejected request path");
                return StatusCode::NOT_FOUND.into_response();
            };

            let root = app_state.dispatcher().deployer().store().slot_path(&branch);
            match resolve(&root, &path).await {
                Resolved::File(file) => serve_file(file, request).await,
                Resolved::AddTrailingSlash => {
                    let uri = request.uri();
                    let target = match uri.query() {
                        Some(query) => format!("{}/?{query}", uri.path()),
                        None => format!("{}/", uri.path()),
                    };
                    Redirect::permanent(&target).into_response()
                }
                Resolved::NotFound => StatusCode::NOT_FOUND.into_response(),
            }
        }
    }
}

async fn serve_file(file: std::path::PathBuf, request: Request) -> Response {
    match ServeFile::new(&file).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

async fn delegate_to_webhook<R: ProcessRunner, N: Notifier>(
    app_state: &AppState<R, N>,
    request: Request,
) -> Response {
    if request.method() != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_WEBHOOK_BODY).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read webhook body");
            return WebhookError::Body(e.to_string()).into_response();
        }
    };

    handle_delivery(app_state, &parts.headers, &body)
        .await
        .into_response()
}

/// Host from the `Host` header, or the URI authority (HTTP/2).
fn request_host(request: &Request) -> String {
    let raw = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default();
    normalize_host(raw)
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}
