//! Rendezvous HTTP service
//!
//! Three verbs mapped onto the registry: create, join, leave. Failures
//! are status-coded so a client can tell a missing session (404) from an
//! occupied one (409) and a malformed id (400). Every request is logged
//! with verb, path and caller address.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ferry_core::id::is_valid_session_id;
use ferry_core::{Error, Session};
use tokio::net::TcpListener;

use crate::registry::SessionRegistry;

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/new", post(create_session))
        .route("/join/:session_id", get(join_session))
        .route("/leave/:session_id", get(leave_session))
        .layer(middleware::from_fn(log_request))
        .with_state(registry)
}

/// Serve the rendezvous API on `listener` until the future is dropped.
pub async fn serve(listener: TcpListener, registry: Arc<SessionRegistry>) -> std::io::Result<()> {
    axum::serve(
        listener,
        router(registry).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    tracing::info!("{} to {} from {}", request.method(), request.uri().path(), addr);
    next.run(request).await
}

async fn create_session(State(registry): State<Arc<SessionRegistry>>) -> Json<Session> {
    let session = registry.create();
    tracing::info!("created session {}", session.session_id);
    Json(session)
}

async fn join_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return (StatusCode::BAD_REQUEST, "Invalid session ID format\n").into_response();
    }
    match registry.join(&session_id) {
        Ok(session) => {
            tracing::info!(
                "receiver {} joined session {}",
                session.receiver_id,
                session.session_id
            );
            Json(session).into_response()
        }
        Err(e) => registry_error(&session_id, e),
    }
}

async fn leave_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return (StatusCode::BAD_REQUEST, "Invalid session ID format\n").into_response();
    }
    match registry.leave(&session_id) {
        Ok(session) => {
            tracing::info!("receiver left session {}", session.session_id);
            Json(session).into_response()
        }
        Err(e) => registry_error(&session_id, e),
    }
}

fn registry_error(session_id: &str, error: Error) -> Response {
    let status = match error {
        Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
        Error::SessionConflict => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!("session {}: {}", session_id, error);
    (status, format!("{error}\n")).into_response()
}
