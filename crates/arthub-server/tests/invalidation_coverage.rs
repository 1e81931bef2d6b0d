//! Every key shape built by the domain helpers is purged by the invalidation
//! call for the entity it embeds. A new key builder without a matching
//! pattern fails here instead of serving stale data in production.

use arthub_server::cache::{
    keys, ArtworkListQuery, ArtworkListType, CacheService, KeyGenerator, MemoryCache,
};
use std::sync::Arc;
use std::time::Duration;

async fn cache() -> CacheService {
    let backend = Arc::new(MemoryCache::new(Duration::from_secs(30)));
    let cache = CacheService::new(backend, KeyGenerator::new("arthub"), 300);
    cache.init().await.unwrap();
    cache
}

fn every_artwork_list() -> Vec<String> {
    [
        ArtworkListType::All,
        ArtworkListType::Featured,
        ArtworkListType::Trending,
        ArtworkListType::Latest,
    ]
    .into_iter()
    .map(|list_type| {
        keys::artwork_list(&ArtworkListQuery {
            list_type,
            category: Some("sculpture".to_string()),
            ..ArtworkListQuery::default()
        })
    })
    .collect()
}

async fn seed(cache: &CacheService, keys: &[String]) {
    for key in keys {
        assert!(cache.set_cache(key, &"cached", 0).await, "failed to seed {key}");
    }
}

async fn assert_purged(cache: &CacheService, keys: &[String]) {
    for key in keys {
        assert!(!cache.cache_exists(key).await, "{key} survived invalidation");
    }
}

async fn assert_kept(cache: &CacheService, keys: &[String]) {
    for key in keys {
        assert!(cache.cache_exists(key).await, "{key} was purged but should not be");
    }
}

#[tokio::test]
async fn user_invalidation_covers_user_keys() {
    let cache = cache().await;
    let stale = vec![
        keys::user_profile("u1"),
        keys::user_favorites("u1", 1, 20),
        keys::artist_profile("u1"),
        keys::artist_artworks("u1", 2, 12),
        keys::artist_list(1, 20),
        keys::dashboard_stats("admin"),
        keys::response("GET", "/api/users/u1"),
        keys::response("GET", "/api/users/u1/favorites?page=2"),
    ];
    let unrelated = vec![
        keys::user_profile("u2"),
        keys::user_favorites("u2", 1, 20),
        keys::artwork("a1"),
    ];
    seed(&cache, &stale).await;
    seed(&cache, &unrelated).await;

    let deleted = cache.invalidation().invalidate_user_cache("u1").await;

    assert_eq!(deleted, stale.len() as u64);
    assert_purged(&cache, &stale).await;
    assert_kept(&cache, &unrelated).await;
}

#[tokio::test]
async fn artwork_invalidation_covers_every_embedding_view() {
    let cache = cache().await;
    let mut stale = vec![
        keys::artwork("a1"),
        keys::artist_artworks("u9", 1, 20),
        keys::category_artworks("c1", 1, 20),
        keys::user_favorites("u3", 1, 20),
        keys::search_results("Water Lilies", 1, 20),
        keys::home_data(),
        keys::dashboard_stats("admin"),
        keys::response("GET", "/api/artworks/a1"),
        keys::response("GET", "/api/artworks?page=2"),
        keys::response("GET", "/api/home"),
    ];
    stale.extend(every_artwork_list());
    let unrelated = vec![
        keys::artwork("a2"),
        keys::user_profile("u3"),
        keys::categories(),
    ];
    seed(&cache, &stale).await;
    seed(&cache, &unrelated).await;

    cache.invalidation().invalidate_artwork_cache("a1").await;

    assert_purged(&cache, &stale).await;
    assert_kept(&cache, &unrelated).await;
}

#[tokio::test]
async fn artist_invalidation_covers_artist_keys() {
    let cache = cache().await;
    let stale = vec![
        keys::artist_profile("u5"),
        keys::artist_artworks("u5", 1, 20),
        keys::artist_list(3, 10),
        keys::home_data(),
        keys::response("GET", "/api/artists/u5"),
        keys::response("GET", "/api/artists?page=2"),
    ];
    let unrelated = vec![
        keys::artist_profile("u6"),
        keys::artist_artworks("u6", 1, 20),
        keys::response("GET", "/api/artists/u6"),
    ];
    seed(&cache, &stale).await;
    seed(&cache, &unrelated).await;

    cache.invalidation().invalidate_artist_cache("u5").await;

    assert_purged(&cache, &stale).await;
    assert_kept(&cache, &unrelated).await;
}

#[tokio::test]
async fn category_invalidation_covers_filtered_listings() {
    let cache = cache().await;
    let mut stale = vec![
        keys::categories(),
        keys::category_artworks("c1", 1, 20),
        keys::home_data(),
        keys::response("GET", "/api/categories"),
    ];
    stale.extend(every_artwork_list());
    let unrelated = vec![keys::artwork("a1"), keys::user_profile("u1")];
    seed(&cache, &stale).await;
    seed(&cache, &unrelated).await;

    cache.invalidation().invalidate_category_cache().await;

    assert_purged(&cache, &stale).await;
    assert_kept(&cache, &unrelated).await;
}

#[tokio::test]
async fn dashboard_invalidation_is_scoped_to_admin() {
    let cache = cache().await;
    let mine = vec![keys::dashboard_stats("admin-1")];
    let theirs = vec![keys::dashboard_stats("admin-2")];
    seed(&cache, &mine).await;
    seed(&cache, &theirs).await;

    cache.invalidation().invalidate_dashboard_cache(Some("admin-1")).await;
    assert_purged(&cache, &mine).await;
    assert_kept(&cache, &theirs).await;

    cache.invalidation().invalidate_dashboard_cache(None).await;
    assert_purged(&cache, &theirs).await;
}

#[tokio::test]
async fn home_invalidation_covers_feed_and_response() {
    let cache = cache().await;
    let stale = vec![keys::home_data(), keys::response("GET", "/api/home")];
    let unrelated = vec![keys::categories()];
    seed(&cache, &stale).await;
    seed(&cache, &unrelated).await;

    assert_eq!(cache.invalidation().invalidate_home_cache().await, 2);
    assert_purged(&cache, &stale).await;
    assert_kept(&cache, &unrelated).await;
}
