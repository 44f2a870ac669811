//! HTTP ingress
//!
//! One route, `POST /send`, whose body is handed to [`Relay::submit`] as-is.
//! Everything else, including other methods on `/send`, is a JSON 404.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::broker::Relay;
use crate::transport::message::{status_for, IngressResponse};

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/send", post(send).fallback(not_found))
        .fallback(not_found)
        .with_state(relay)
}

async fn send(State(relay): State<Arc<Relay>>, body: Bytes) -> Response {
    debug!(bytes = body.len(), "received submission");

    match relay.submit(&body).await {
        Ok(sequence_id) => (
            StatusCode::OK,
            Json(IngressResponse::accepted(sequence_id)),
        )
            .into_response(),
        Err(rejection) => (
            status_for(rejection),
            Json(IngressResponse::rejected(rejection)),
        )
            .into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(IngressResponse::not_found())).into_response()
}

/// Serve the ingress router on an already bound listener.
pub async fn serve_http(listener: TcpListener, relay: Arc<Relay>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP ingress listening on http://{addr}");
    }
    axum::serve(listener, router(relay)).await
}
