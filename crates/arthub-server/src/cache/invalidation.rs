//! Mutation-driven cache invalidation.
//!
//! Each entity has a hand-maintained list of base-key patterns covering the
//! keys built for it in [`keys`](super::keys) and every aggregate view that
//! embeds it. The lists are not derived from the key builders: a new key
//! shape needs a matching pattern here, or it is never purged and serves
//! stale data until it expires.

use super::service::CacheService;
use futures::future::join_all;
use tracing::info;

/// Pattern lists per entity. Patterns are base keys; the global prefix is
/// added when they are applied. Ids are escaped, so an id only ever matches
/// itself.
pub mod patterns {
    use glob::Pattern;

    /// A user and everything showing their profile or favourites.
    pub fn user(user_id: &str) -> Vec<String> {
        let user_id = Pattern::escape(user_id);
        vec![
            format!("user:profile:{user_id}"),
            format!("user:favorites:{user_id}:*"),
            format!("artist:profile:{user_id}"),
            format!("artist:artworks:{user_id}:*"),
            "artists:*".to_string(),
            "dashboard:*".to_string(),
            format!("response:GET:/api/users/{user_id}*"),
        ]
    }

    /// An artwork and every listing, feed or page embedding artworks.
    pub fn artwork(artwork_id: &str) -> Vec<String> {
        let artwork_id = Pattern::escape(artwork_id);
        vec![
            format!("artwork:{artwork_id}"),
            "artworks:*".to_string(),
            "artist:artworks:*".to_string(),
            "category:artworks:*".to_string(),
            "user:favorites:*".to_string(),
            "search:*".to_string(),
            "home:*".to_string(),
            "dashboard:*".to_string(),
            "response:GET:/api/artworks*".to_string(),
            "response:GET:/api/home*".to_string(),
        ]
    }

    /// An artist's profile, their artworks and the artist directory.
    pub fn artist(artist_id: &str) -> Vec<String> {
        let artist_id = Pattern::escape(artist_id);
        vec![
            format!("artist:profile:{artist_id}"),
            format!("artist:artworks:{artist_id}:*"),
            "artists:*".to_string(),
            "home:*".to_string(),
            format!("response:GET:/api/artists/{artist_id}*"),
            "response:GET:/api/artists[?]*".to_string(),
        ]
    }

    /// Categories and the artwork listings filtered by them.
    pub fn category() -> Vec<String> {
        vec![
            "categories:*".to_string(),
            "category:*".to_string(),
            "artworks:*".to_string(),
            "home:*".to_string(),
            "response:GET:/api/categories*".to_string(),
        ]
    }

    /// One admin's dashboard, or all of them.
    pub fn dashboard(admin_id: Option<&str>) -> Vec<String> {
        match admin_id {
            Some(id) => vec![format!("dashboard:stats:{}", Pattern::escape(id))],
            None => vec!["dashboard:*".to_string()],
        }
    }

    /// The home feed.
    pub fn home() -> Vec<String> {
        vec!["home:*".to_string(), "response:GET:/api/home*".to_string()]
    }
}

/// Translates domain mutations into pattern deletes.
#[derive(Clone)]
pub struct InvalidationRouter {
    cache: CacheService,
}

impl InvalidationRouter {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }

    /// A user was created, edited or deleted.
    pub async fn invalidate_user_cache(&self, user_id: &str) -> u64 {
        self.purge("user", patterns::user(user_id)).await
    }

    /// An artwork was created, edited, sold or deleted.
    pub async fn invalidate_artwork_cache(&self, artwork_id: &str) -> u64 {
        self.purge("artwork", patterns::artwork(artwork_id)).await
    }

    /// An artist profile changed.
    pub async fn invalidate_artist_cache(&self, artist_id: &str) -> u64 {
        self.purge("artist", patterns::artist(artist_id)).await
    }

    /// Any category changed.
    pub async fn invalidate_category_cache(&self) -> u64 {
        self.purge("category", patterns::category()).await
    }

    /// Dashboard figures changed, for one admin or for all (`None`).
    pub async fn invalidate_dashboard_cache(&self, admin_id: Option<&str>) -> u64 {
        self.purge("dashboard", patterns::dashboard(admin_id)).await
    }

    /// The home feed must be rebuilt.
    pub async fn invalidate_home_cache(&self) -> u64 {
        self.purge("home", patterns::home()).await
    }

    async fn purge(&self, entity: &'static str, patterns: Vec<String>) -> u64 {
        let deleted: u64 = join_all(
            patterns
                .iter()
                .map(|pattern| self.cache.delete_cache_by_pattern(pattern)),
        )
        .await
        .into_iter()
        .sum();

        info!(entity = entity, patterns = patterns.len(), deleted = deleted, "Cache invalidated");
        deleted
    }
}
