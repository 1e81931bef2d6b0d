//! Entity-scoped cache-aside wrappers.
//!
//! Each wrapper fixes the key shape and TTL for one kind of domain object so
//! handlers cannot drift from the shapes the invalidation patterns expect.
//! Objects without a tier of their own live for the configured default TTL.

use super::keys::{self, ArtworkListQuery, ArtworkListType};
use super::service::CacheService;
use super::ttl;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

impl CacheService {
    /// User profile by id.
    pub async fn cache_user_profile<T, E, F, Fut>(&self, user_id: &str, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::user_profile(user_id), self.default_ttl(), produce)
            .await
    }

    /// A page of a user's favourites.
    pub async fn cache_user_favorites<T, E, F, Fut>(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::user_favorites(user_id, page, limit), ttl::SHORT, produce)
            .await
    }

    /// Single artwork by id.
    pub async fn cache_artwork<T, E, F, Fut>(&self, artwork_id: &str, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::artwork(artwork_id), self.default_ttl(), produce)
            .await
    }

    /// Artwork listing. Featured lists change rarely and live longer.
    pub async fn cache_artwork_list<T, E, F, Fut>(
        &self,
        query: &ArtworkListQuery,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ttl_secs = match query.list_type {
            ArtworkListType::Featured => ttl::LONG,
            ArtworkListType::Trending | ArtworkListType::Latest => ttl::SHORT,
            ArtworkListType::All => self.default_ttl(),
        };
        self.cache_with_fallback(&keys::artwork_list(query), ttl_secs, produce)
            .await
    }

    /// Artist profile by id.
    pub async fn cache_artist_profile<T, E, F, Fut>(&self, artist_id: &str, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::artist_profile(artist_id), self.default_ttl(), produce)
            .await
    }

    /// A page of one artist's artworks.
    pub async fn cache_artist_artworks<T, E, F, Fut>(
        &self,
        artist_id: &str,
        page: u32,
        limit: u32,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::artist_artworks(artist_id, page, limit), self.default_ttl(), produce)
            .await
    }

    /// Full category list.
    pub async fn cache_categories<T, E, F, Fut>(&self, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::categories(), ttl::VERY_LONG, produce)
            .await
    }

    /// Home feed.
    pub async fn cache_home_data<T, E, F, Fut>(&self, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::home_data(), self.default_ttl(), produce)
            .await
    }

    /// Admin dashboard statistics.
    pub async fn cache_dashboard_stats<T, E, F, Fut>(&self, admin_id: &str, produce: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::dashboard_stats(admin_id), ttl::SHORT, produce)
            .await
    }

    /// A page of search results.
    pub async fn cache_search_results<T, E, F, Fut>(
        &self,
        query: &str,
        page: u32,
        limit: u32,
        produce: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with_fallback(&keys::search_results(query, page, limit), ttl::SHORT, produce)
            .await
    }
}
