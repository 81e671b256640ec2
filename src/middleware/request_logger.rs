use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use crate::utils::sanitize::{sanitize_form, sanitize_json};

const MAX_BODY_LOG_SIZE: usize = 1024; // 1KB limit for body logging
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogSettings {
    pub log_body: bool,
}

pub async fn request_logger(
    State(settings): State<RequestLogSettings>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if settings.log_body {
        let (parts, body) = req.into_parts();
        let bytes = match Bytes::from_request(Request::new(body), &()).await {
            Ok(bytes) => bytes,
            Err(rejection) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    uri = %uri.path(),
                    error = %rejection,
                    "Failed to read request body"
                );
                let mut response = rejection.into_response();
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                return response;
            }
        };
        let is_form = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"));

        let logged_body = if bytes.is_empty() {
            String::new()
        } else if bytes.len() > MAX_BODY_LOG_SIZE {
            format!("[{} bytes, not logged]", bytes.len())
        } else if is_form {
            sanitize_form(&bytes).to_string()
        } else if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            sanitize_json(&json).to_string()
        } else {
            format!("[non-json, {} bytes]", bytes.len())
        };

        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri.path(),
            body_size = bytes.len(),
            body = %logged_body,
            "Incoming request"
        );

        req = Request::from_parts(parts, Body::from(bytes));
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri.path(),
            "Incoming request"
        );
    }

    let mut response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri.path(),
        status = %response.status().as_u16(),
        latency_ms = start.elapsed().as_millis(),
        "Outgoing response"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
