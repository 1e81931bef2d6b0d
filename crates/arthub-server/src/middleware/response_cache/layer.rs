//! Response cache middleware layer.

use super::types::{CacheStatus, CachedResponse, SkipPredicate};
use crate::cache::{keys, CacheService};
use crate::config::ResponseCacheConfig;
use axum::{
    body::{Body, Bytes, HttpBody},
    extract::Request,
    http::{header, HeaderValue, Method, Response},
    response::IntoResponse,
};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::{sync::Arc, task::{Context, Poll}};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Response cache layer.
#[derive(Clone)]
pub struct ResponseCacheLayer {
    cache: CacheService,
    ttl_secs: u64,
    max_body_bytes: usize,
    skip: Option<SkipPredicate>,
}

impl ResponseCacheLayer {
    pub fn new(cache: CacheService, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl_secs,
            max_body_bytes: 1024 * 1024,
            skip: None,
        }
    }

    pub fn from_config(cache: CacheService, config: &ResponseCacheConfig) -> Self {
        Self::new(cache, config.ttl_secs).with_max_body_bytes(config.max_body_bytes)
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Bypass the cache entirely for requests matching `predicate`.
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }
}

impl<S> Layer<S> for ResponseCacheLayer {
    type Service = ResponseCacheMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseCacheMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ResponseCacheMiddleware<S> {
    inner: S,
    layer: ResponseCacheLayer,
}

impl<S> Service<Request> for ResponseCacheMiddleware<S>
where
    S: Service<Request, Response = Response<Body>, Error = std::convert::Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let layer = self.layer.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let skipped = layer.skip.as_ref().map_or(false, |skip| skip(&req));
            if req.method() != Method::GET || skipped {
                return inner.call(req).await;
            }

            let key = response_key(&layer.cache, &req);

            if let Some(cached) = layer.cache.get_full::<CachedResponse>(&key).await {
                debug!(key = %key, "Serving cached response");
                return Ok(cached.into_response());
            }

            let response = inner.call(req).await?;
            Ok(store_if_cacheable(&layer, key, response).await)
        })
    }
}

/// `<prefix>:response:<METHOD>:<path>?<query>`
pub fn response_key(cache: &CacheService, req: &Request) -> String {
    let uri = req.uri();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    cache.full_key(&keys::response(req.method().as_str(), path_and_query), None)
}

fn is_json(response: &Response<Body>) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json") || ct.contains("+json"))
}

async fn store_if_cacheable(layer: &ResponseCacheLayer, key: String, response: Response<Body>) -> Response<Body> {
    if !response.status().is_success() || !is_json(&response) {
        return mark(response, CacheStatus::Miss);
    }

    let (parts, body) = response.into_parts();
    if body
        .size_hint()
        .upper()
        .map_or(false, |upper| upper > layer.max_body_bytes as u64)
    {
        debug!(key = %key, "Response too large to cache");
        return mark(Response::from_parts(parts, body), CacheStatus::Miss);
    }

    let bytes = match collect_within(body, layer.max_body_bytes).await {
        Collected::Complete(bytes) => bytes,
        Collected::TooLarge(body) => {
            debug!(key = %key, "Streamed response too large to cache");
            return mark(Response::from_parts(parts, body), CacheStatus::Miss);
        }
        Collected::Failed(body, error) => {
            warn!(key = %key, error = %error, "Response body failed while buffering, not caching");
            return mark(Response::from_parts(parts, body), CacheStatus::Miss);
        }
    };

    match CachedResponse::from_parts(&parts, &bytes) {
        Some(cached) => match serde_json::to_string(&cached) {
            Ok(payload) => layer.cache.spawn_write(key, payload, layer.ttl_secs),
            Err(e) => warn!(key = %key, error = %e, "Failed to encode response for cache"),
        },
        None => debug!(key = %key, "Response body is not UTF-8, not caching"),
    }

    mark(Response::from_parts(parts, Body::from(bytes)), CacheStatus::Miss)
}

enum Collected {
    Complete(Bytes),
    /// The limit was crossed; the body replays what was read, then the rest.
    TooLarge(Body),
    /// The body errored; the body replays what was read, then the error.
    Failed(Body, String),
}

/// Buffer at most `limit` bytes. Bodies that grow past the limit or fail are
/// handed back intact instead of being read to the end.
async fn collect_within(body: Body, limit: usize) -> Collected {
    let mut stream = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) if buffered.len() + chunk.len() <= limit => buffered.extend_from_slice(&chunk),
            Ok(chunk) => {
                let head = stream::iter([Ok(Bytes::from(buffered)), Ok(chunk)]);
                return Collected::TooLarge(Body::from_stream(head.chain(stream)));
            }
            Err(e) => {
                let error = e.to_string();
                let head = stream::iter([Ok(Bytes::from(buffered)), Err(e)]);
                return Collected::Failed(Body::from_stream(head), error);
            }
        }
    }

    Collected::Complete(Bytes::from(buffered))
}

pub(super) fn mark(mut response: Response<Body>, status: CacheStatus) -> Response<Body> {
    response
        .headers_mut()
        .insert(CacheStatus::HEADER, HeaderValue::from_static(status.as_str()));
    response
}
