//! HTTP server: webhook intake and branch site hosting.
//!
//! # Endpoints
//!
//! - `POST /webhook` on any host - GitHub push deliveries (returns 200)
//! - any request to `webhook.<base>` - same as `POST /webhook`
//! - `GET`/`HEAD` anything else - files from the branch selected by the host

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::trace::TraceLayer;

pub mod content;
pub mod webhook;

pub use content::content_handler;
pub use webhook::webhook_handler;

use crate::config::Config;
use crate::notify::Notifier;
use crate::process::ProcessRunner;
use crate::worker::Dispatcher;

/// URL scheme the server is reachable on, used for redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
pub struct AppState<R, N> {
    inner: Arc<AppStateInner<R, N>>,
}

struct AppStateInner<R, N> {
    dispatcher: Arc<Dispatcher<R, N>>,
    scheme: Scheme,
}

// Derived Clone would require `R: Clone` and `N: Clone`.
impl<R, N> Clone for AppState<R, N> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ProcessRunner, N: Notifier> AppState<R, N> {
    pub fn new(dispatcher: Arc<Dispatcher<R, N>>, scheme: Scheme) -> Self {
        AppState {
            inner: Arc::new(AppStateInner { dispatcher, scheme }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<R, N> {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &Config {
        self.inner.dispatcher.deployer().config()
    }

    pub fn scheme(&self) -> Scheme {
        self.inner.scheme
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<R: ProcessRunner, N: Notifier>(app_state: AppState<R, N>) -> axum::Router {
    use axum::routing::post;

    axum::Router::new()
        .route(
            "/webhook",
            post(webhook_handler::<R, N>).fallback(content_handler::<R, N>),
        )
        .fallback(content_handler::<R, N>)
        .layer(DefaultBodyLimit::max(webhook::MAX_WEBHOOK_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
