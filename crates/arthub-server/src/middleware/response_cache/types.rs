//! Response cache types.

use super::layer::mark;
use axum::{
    body::Body,
    extract::Request,
    http::{header, response::Parts, HeaderName, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decides per request whether the cache is bypassed.
pub type SkipPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Skip requests carrying credentials; their responses may be personalised.
pub fn skip_authenticated(req: &Request) -> bool {
    req.headers().contains_key(header::AUTHORIZATION)
}

/// Whether a response came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub const HEADER: HeaderName = HeaderName::from_static("x-cache");

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// A memoized JSON response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl CachedResponse {
    /// Capture a response; `None` if the body is not UTF-8.
    pub fn from_parts(parts: &Parts, body: &[u8]) -> Option<Self> {
        let body = std::str::from_utf8(body).ok()?.to_string();
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        Some(Self {
            status: parts.status.as_u16(),
            content_type,
            body,
        })
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response<Body> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/json"));

        let mut response = (status, self.body).into_response();
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        mark(response, CacheStatus::Hit)
    }
}
