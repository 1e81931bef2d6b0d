//! Response cache middleware over a real axum router.

use arthub_server::cache::{keys, CacheService, KeyGenerator, MemoryCache};
use arthub_server::middleware::{skip_authenticated, ResponseCacheLayer};
use axum::{
    body::{Body, Bytes},
    extract::Query,
    http::{header, Request, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Deserialize)]
struct Page {
    page: Option<u32>,
}

async fn cache() -> CacheService {
    let backend = Arc::new(MemoryCache::new(Duration::from_secs(30)));
    let cache = CacheService::new(backend, KeyGenerator::new("arthub"), 300);
    cache.init().await.unwrap();
    cache
}

fn app(cache: &CacheService, calls: Arc<AtomicUsize>, max_body_bytes: usize) -> Router {
    let artworks = {
        let calls = calls.clone();
        move |Query(page): Query<Page>| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "page": page.page.unwrap_or(1), "call": n }))
            }
        }
    };
    let missing = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
            }
        }
    };
    let plain = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "plain text".into_response()
            }
        }
    };
    let large = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "blob": "x".repeat(4096) }))
            }
        }
    };

    let streamed = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let chunks = (0..8).map(|i| {
                    let chunk = if i == 0 { "[".to_string() } else { format!("\"{}\",", "y".repeat(250)) };
                    Ok::<_, std::io::Error>(Bytes::from(chunk))
                });
                let chunks = chunks.chain([Ok(Bytes::from_static(b"\"end\"]"))]);
                json_stream(stream::iter(chunks.collect::<Vec<_>>()))
            }
        }
    };
    let broken = {
        let calls = calls.clone();
        move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                json_stream(stream::iter(vec![
                    Ok(Bytes::from_static(b"{\"partial\":")),
                    Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream went away")),
                ]))
            }
        }
    };

    Router::new()
        .route("/api/artworks", get(artworks.clone()).post(artworks))
        .route("/api/stream", get(streamed))
        .route("/api/broken", get(broken))
        .route("/api/missing", get(missing))
        .route("/api/plain", get(plain))
        .route("/api/large", get(large))
        .layer(
            ResponseCacheLayer::new(cache.clone(), 60)
                .with_max_body_bytes(max_body_bytes)
                .skip_when(skip_authenticated),
        )
}

fn json_stream<S>(chunks: S) -> Response<Body>
where
    S: futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(chunks))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let x_cache = response
        .headers()
        .get("x-cache")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, x_cache, body)
}

#[tokio::test]
async fn second_get_is_served_from_cache() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    let (status, x_cache, first) = send(&app, get_request("/api/artworks?page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("MISS"));

    cache.settle().await;
    assert!(cache.cache_exists(&keys::response("GET", "/api/artworks?page=2")).await);

    let (status, x_cache, second) = send(&app, get_request("/api/artworks?page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("HIT"));
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_string_is_part_of_the_key() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    send(&app, get_request("/api/artworks?page=1")).await;
    cache.settle().await;
    let (_, x_cache, body) = send(&app, get_request("/api/artworks?page=3")).await;

    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(body["page"], 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failures_and_non_json_are_not_cached() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    for uri in ["/api/missing", "/api/plain", "/api/missing", "/api/plain"] {
        let (_, x_cache, _) = send(&app, get_request(uri)).await;
        assert_eq!(x_cache.as_deref(), Some("MISS"));
        cache.settle().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!cache.cache_exists(&keys::response("GET", "/api/missing")).await);
}

#[tokio::test]
async fn oversized_bodies_pass_through_uncached() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    let (status, _, body) = send(&app, get_request("/api/large")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blob"].as_str().map(str::len), Some(4096));

    cache.settle().await;
    assert!(!cache.cache_exists(&keys::response("GET", "/api/large")).await);
}

#[tokio::test]
async fn oversized_streams_are_passed_through_whole() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    let (status, x_cache, body) = send(&app, get_request("/api/stream")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    let items = body.as_array().expect("streamed body should arrive intact");
    assert_eq!(items.len(), 8);
    assert_eq!(items[7], "end");

    cache.settle().await;
    assert!(!cache.cache_exists(&keys::response("GET", "/api/stream")).await);
    let (_, x_cache, _) = send(&app, get_request("/api/stream")).await;
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn small_streams_are_cached() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 4096);

    send(&app, get_request("/api/stream")).await;
    cache.settle().await;
    let (_, x_cache, body) = send(&app, get_request("/api/stream")).await;

    assert_eq!(x_cache.as_deref(), Some("HIT"));
    assert_eq!(body.as_array().map(Vec::len), Some(8));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_errors_reach_the_client_unchanged() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    let response = app.clone().oneshot(get_request("/api/broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-cache"], "MISS");
    assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());

    cache.settle().await;
    assert!(!cache.cache_exists(&keys::response("GET", "/api/broken")).await);
}

#[tokio::test]
async fn non_get_and_authenticated_requests_bypass_cache() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    let post = Request::builder()
        .method("POST")
        .uri("/api/artworks")
        .body(Body::empty())
        .unwrap();
    let (_, x_cache, _) = send(&app, post).await;
    assert_eq!(x_cache, None);

    for _ in 0..2 {
        let signed_in = Request::builder()
            .uri("/api/artworks")
            .header(header::AUTHORIZATION, "Bearer token")
            .body(Body::empty())
            .unwrap();
        let (_, x_cache, _) = send(&app, signed_in).await;
        assert_eq!(x_cache, None);
        cache.settle().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!cache.cache_exists(&keys::response("GET", "/api/artworks")).await);
}

#[tokio::test]
async fn artwork_invalidation_purges_cached_responses() {
    let cache = cache().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(&cache, calls.clone(), 1024);

    send(&app, get_request("/api/artworks?page=1")).await;
    cache.settle().await;
    assert!(cache.invalidation().invalidate_artwork_cache("42").await >= 1);

    let (_, x_cache, _) = send(&app, get_request("/api/artworks?page=1")).await;
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
