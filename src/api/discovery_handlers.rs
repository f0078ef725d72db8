//! The discovery endpoint.
//!
//! `POST /{api_version}/discovery:{xds_type}` with a DiscoveryRequest body.
//! The path type is validated against the closed template type set before
//! auth is consulted, so probing invalid types reveals nothing about auth
//! behavior. Outcomes map to HTTP statuses: NotModified → the configured
//! no-changes code (304 unless overridden), empty resources → 404, document
//! → 200.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tracing::{error, warn};

use crate::discovery::types::{type_url_for, DiscoveryOutcome, DiscoveryRequest};
use crate::startup::ControlPlane;

use super::error::ApiError;
use super::request_context::{RequestId, XdsLogFields};

const HEADER_CLIENT_BUILD: &str = "X-Sovereign-Client-Build";
const HEADER_CLIENT_VERSION: &str = "X-Sovereign-Client-Version";
const HEADER_REQUESTED_RESOURCES: &str = "X-Sovereign-Requested-Resources";
const HEADER_REQUESTED_TYPE: &str = "X-Sovereign-Requested-Type";
const HEADER_RESPONSE_VERSION: &str = "X-Sovereign-Response-Version";

pub async fn discovery_handler(
    State(plane): State<Arc<ControlPlane>>,
    Path((api_version, service)): Path<(String, String)>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    Json(mut request): Json<DiscoveryRequest>,
) -> Response {
    let Some(xds_type) = service.strip_prefix("discovery:") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(api_number) = parse_api_version(&api_version) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Unknown xDS types 404 before auth runs.
    if !plane.discovery.templates().is_known_type(xds_type) {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Err(e) = plane.auth.authenticate(&request) {
        warn!(error = %e, xds_type = xds_type, "Discovery request rejected");
        let mut response = ApiError::new(&e, request_id).into_response();
        apply_discovery_headers(&mut response, &request, xds_type, None);
        record_request(&request, response.status().as_u16(), xds_type);
        return response;
    }

    request.desired_controlplane =
        headers.get(header::HOST).and_then(|v| v.to_str().ok()).map(str::to_string);
    if request.type_url.is_none() {
        request.type_url = type_url_for(api_number, xds_type).map(str::to_string);
    }

    let outcome = match plane.discovery.response(&request, xds_type).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, error_kind = e.kind(), xds_type = xds_type, "Discovery request failed");
            let mut response = ApiError::new(&e, request_id).into_response();
            apply_discovery_headers(&mut response, &request, xds_type, None);
            record_request(&request, response.status().as_u16(), xds_type);
            return response;
        }
    };

    let version_info = outcome.version_info().to_string();
    let mut response = match outcome {
        DiscoveryOutcome::NotModified { .. } => no_changes_status(plane.as_ref()).into_response(),
        DiscoveryOutcome::Processed(processed) if processed.resources.is_empty() => {
            StatusCode::NOT_FOUND.into_response()
        }
        DiscoveryOutcome::Processed(processed) => {
            (StatusCode::OK, Json(processed)).into_response()
        }
    };

    apply_discovery_headers(&mut response, &request, xds_type, Some(&version_info));
    response.extensions_mut().insert(XdsLogFields {
        client_version: request.version_info.clone(),
        server_version: version_info,
        resource_names: requested_resources(&request),
        envoy_version: request.envoy_version(),
    });
    record_request(&request, response.status().as_u16(), xds_type);
    response
}

fn parse_api_version(segment: &str) -> Option<u8> {
    segment.strip_prefix('v').and_then(|n| n.parse().ok())
}

fn no_changes_status(plane: &ControlPlane) -> StatusCode {
    StatusCode::from_u16(plane.settings.no_changes_response_code)
        .unwrap_or(StatusCode::NOT_MODIFIED)
}

fn requested_resources(request: &DiscoveryRequest) -> String {
    if request.resources.is_empty() {
        "all".to_string()
    } else {
        request.resources.join(",")
    }
}

fn apply_discovery_headers(
    response: &mut Response,
    request: &DiscoveryRequest,
    xds_type: &str,
    version_info: Option<&str>,
) {
    let headers = response.headers_mut();
    let mut set = |name: &'static str, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    };
    set(HEADER_CLIENT_BUILD, &request.node.build_version);
    set(HEADER_CLIENT_VERSION, &request.envoy_version());
    set(HEADER_REQUESTED_RESOURCES, &requested_resources(request));
    set(HEADER_REQUESTED_TYPE, xds_type);
    if let Some(version) = version_info {
        set(HEADER_RESPONSE_VERSION, version);
    }
}

fn record_request(request: &DiscoveryRequest, response_code: u16, xds_type: &str) {
    metrics::counter!(
        "discovery_requests_total",
        "client_ip" => request.node.client_ip(),
        "client_version" => request.envoy_version(),
        "response_code" => response_code.to_string(),
        "xds_type" => xds_type.to_string()
    )
    .increment(1);
}
