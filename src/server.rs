//! Ingress: a thin `axum` router exposing `POST {endpoint_path}`.
//!
//! Grounded on `other_examples/.../workflow-engine-rs__...gateway.rs`'s
//! `into_router()`/handler split, trimmed of the `async-graphql`/playground/
//! subscription plumbing that isn't part of this gateway's scope — query
//! planning and execution are this crate's own job, not delegated to an
//! embedded GraphQL engine.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::GatewayConfig;
use crate::{Gateway, GraphQLRequest};

/// Request headers that are never forwarded upstream even when header
/// forwarding is configured on — they describe this hop's own transport,
/// not anything a subgraph should see repeated.
const HOP_BY_HOP_HEADERS: &[&str] = &["host", "content-length", "content-type"];

pub fn build_router(gateway: Arc<Gateway>, config: &GatewayConfig) -> Router {
    Router::new()
        .route(&config.endpoint_path, post(handle_graphql))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

async fn handle_graphql(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let request: GraphQLRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "malformed GraphQL request body");
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({
                "errors": [{ "message": format!("malformed request body: {e}") }],
            })))
                .into_response();
        }
    };

    let forwarded_headers = forwardable_headers(&headers);
    let response = gateway.handle_request(request, &forwarded_headers).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// Collects the incoming request's headers as plain `(name, value)` pairs,
/// dropping hop-by-hop ones and anything that isn't valid UTF-8 text. The
/// `Gateway` decides whether to actually forward them based on its own
/// `forward_headers` configuration.
fn forwardable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
        .collect()
}
