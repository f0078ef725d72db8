//! Per-request context middleware.
//!
//! Assigns every request an id, runs the handler inside a span carrying it,
//! and emits one structured access-log event when the response finishes.
//! Handlers attach discovery-specific log fields to the response as an
//! extension; the context is an explicit per-request value and never shared
//! across requests.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// The request id, available to handlers via `Extension<RequestId>`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Discovery log fields recorded by the handler and consumed by the access
/// log when the response is written.
#[derive(Debug, Clone)]
pub struct XdsLogFields {
    /// The caller's `version_info`.
    pub client_version: String,
    /// The version this response carries.
    pub server_version: String,
    pub resource_names: String,
    pub envoy_version: String,
}

pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let span = info_span!("request", request_id = %request_id);
    let response = next.run(request).instrument(span).await;

    let status = response.status().as_u16();
    let duration_ms = started.elapsed().as_millis() as u64;

    match response.extensions().get::<XdsLogFields>() {
        Some(xds) => info!(
            method = %method,
            uri_path = %path,
            status = status,
            duration_ms = duration_ms,
            request_id = %request_id,
            resource_version = %format!("{} -> {}", xds.client_version, xds.server_version),
            resource_names = %xds.resource_names,
            envoy_version = %xds.envoy_version,
            "request complete"
        ),
        None => info!(
            method = %method,
            uri_path = %path,
            status = status,
            duration_ms = duration_ms,
            request_id = %request_id,
            "request complete"
        ),
    }

    metrics::counter!(
        "http_requests_total",
        "method" => method,
        "status" => status.to_string()
    )
    .increment(1);

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn echo_request_id(Extension(RequestId(id)): Extension<RequestId>) -> String {
        id
    }

    #[tokio::test]
    async fn request_id_is_available_to_handlers() {
        let app = Router::new()
            .route("/test", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_context));

        let request =
            http::Request::builder().uri("/test").method("GET").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(!body.is_empty());
    }
}
