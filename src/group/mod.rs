//! Group: dispatches requests to controllers and group actions
//!
//! A group is built once from controllers and actions by [`GroupBuilder`] and
//! shared as `Arc<Group>`. It owns the only error mapping point of the engine:
//! every error and every panic raised while serving ends in
//! [`Group::handle`], where it is logged, reported and turned into a JSON:API
//! error document.

pub mod builder;

pub use builder::GroupBuilder;

use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use indexmap::IndexMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::controller::{Controller, check_action_request};
use crate::core::callback::Action;
use crate::core::context::{Context, Request};
use crate::core::error::{Error, RequestError, Result};
use crate::core::meta::Meta;
use crate::core::operation::{Intent, Stage};
use crate::core::store::Store;
use crate::jsonapi::Params;

/// Default maximum request body size (4 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Receives every internal error before the generic response is sent
pub type Reporter = Arc<dyn Fn(&Error) + Send + Sync>;

/// A set of controllers and actions served under a common prefix
pub struct Group {
    prefix: String,
    body_limit: usize,
    controllers: IndexMap<String, Controller>,
    actions: IndexMap<String, Action>,
    reporter: Option<Reporter>,
    store: Arc<dyn Store>,
}

impl Group {
    pub fn builder() -> GroupBuilder {
        GroupBuilder::new()
    }

    /// Path prefix without trailing slash, empty when mounted at the root
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn controller(&self, name: &str) -> Option<&Controller> {
        self.controllers.get(name)
    }

    /// Registered resource names in registration order
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    /// Serve one request
    ///
    /// Never fails: errors and panics become JSON:API error responses.
    pub async fn handle(&self, request: axum::extract::Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let outcome = AssertUnwindSafe(self.dispatch(request)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(Error::Internal(format!(
                "panic while serving request: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match result {
            Ok(response) => response,
            Err(error) => self.fail(&method, &path, error),
        }
    }

    /// Axum router serving the group, with request tracing
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(serve_request)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve the group with graceful shutdown on Ctrl+C and SIGTERM
    pub async fn serve(self: Arc<Self>, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    async fn dispatch(&self, request: axum::extract::Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let not_found = || {
            Error::from(RequestError::NotFound {
                path: parts.uri.path().to_string(),
            })
        };

        let segments: Vec<String> = self
            .strip_prefix(parts.uri.path())
            .ok_or_else(not_found)?
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let Some((first, rest)) = segments.split_first() else {
            return Err(not_found());
        };

        let body = Limited::new(body, self.body_limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    RequestError::PayloadTooLarge {
                        limit: self.body_limit,
                    }
                } else {
                    RequestError::InvalidBody {
                        message: format!("failed to read body: {}", e),
                    }
                }
            })?
            .to_bytes();
        let request = Arc::new(Request {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
            body,
        });
        tracing::debug!(method = %request.method, path = %request.uri.path(), "dispatching request");

        if let Some(controller) = self.controllers.get(first) {
            let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
            return controller.handle(self, request, &rest).await;
        }
        if rest.is_empty()
            && let Some(action) = self.actions.get(first)
        {
            return self.run_action(first, action, request).await;
        }

        Err(RequestError::NotFound {
            path: request.uri.path().to_string(),
        }
        .into())
    }

    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    async fn run_action(&self, name: &str, action: &Action, request: Arc<Request>) -> Result<Response> {
        check_action_request(action, &request)?;
        let params = Params::from_uri(&request.uri)?;

        let mut ctx = Context::new(
            Arc::new(Meta::new(name)),
            self.store.clone(),
            request,
            params,
            Intent::CollectionAction,
        );
        ctx.stage = Some(Stage::Action);

        let span = tracing::debug_span!("action", action = name);
        action
            .call(&mut ctx)
            .instrument(span)
            .await
            .map_err(|error| Error::Callback {
                stage: Stage::Action,
                callback: name.to_string(),
                error,
            })
    }

    fn fail(&self, method: &axum::http::Method, path: &str, error: Error) -> Response {
        let status = error.status_code().as_u16();
        match &error {
            Error::Request(_) => {
                tracing::debug!(%method, path, status, error = %error, "request rejected");
            }
            e if e.is_safe() => {
                tracing::warn!(%method, path, status, error = %error, "request failed");
            }
            _ => {
                tracing::error!(%method, path, status, error = %error, "internal error");
                if let Some(reporter) = &self.reporter {
                    reporter(&error);
                }
            }
        }
        error.into_response()
    }
}

async fn serve_request(State(group): State<Arc<Group>>, request: axum::extract::Request) -> Response {
    group.handle(request).await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
