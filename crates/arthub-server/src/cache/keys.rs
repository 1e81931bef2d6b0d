//! Cache key generation.
//!
//! Every stored key has the shape `<prefix>:<namespace?>:<base>` where the
//! base key is itself a `:`-joined list of qualifiers. Two requests that can
//! produce different results must differ in at least one qualifier, otherwise
//! they share a key and one of them reads stale data.

use std::fmt;

/// Reserved segment separator.
pub const SEPARATOR: char = ':';

/// Builds fully qualified keys from base keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Join prefix, optional namespace and base key.
    pub fn build_key(&self, base: &str, namespace: Option<&str>) -> String {
        let mut key = String::with_capacity(
            self.prefix.len() + namespace.map_or(0, |ns| ns.len() + 1) + base.len() + 1,
        );
        key.push_str(&self.prefix);
        key.push(SEPARATOR);
        if let Some(ns) = namespace {
            key.push_str(ns);
            key.push(SEPARATOR);
        }
        key.push_str(base);
        key
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new("arthub")
    }
}

/// Cache key builder for consistent key generation.
pub struct CacheKeyBuilder {
    parts: Vec<String>,
}

impl CacheKeyBuilder {
    /// Create a new key builder with the given leading segment.
    pub fn new(prefix: &str) -> Self {
        Self {
            parts: vec![prefix.to_string()],
        }
    }

    /// Add a part to the key.
    pub fn add(mut self, part: impl ToString) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Add user-supplied free text, normalised so it cannot break segments
    /// or act as glob syntax. Missing or blank text becomes `fallback`.
    pub fn add_term(mut self, term: Option<&str>, fallback: &str) -> Self {
        let normalized = term.map(normalize_term).filter(|t| !t.is_empty());
        self.parts
            .push(normalized.unwrap_or_else(|| fallback.to_string()));
        self
    }

    /// Build the final key by joining parts with the separator.
    pub fn build(self) -> String {
        self.parts.join(":")
    }
}

/// Lowercase, collapse whitespace runs to `_` and replace separator and glob
/// characters.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '[' | ']' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Which artwork listing a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtworkListType {
    #[default]
    All,
    Featured,
    Trending,
    Latest,
}

impl fmt::Display for ArtworkListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Featured => "featured",
            Self::Trending => "trending",
            Self::Latest => "latest",
        })
    }
}

/// Parameters of an artwork listing. All of them shape the result, so all of
/// them are part of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkListQuery {
    pub list_type: ArtworkListType,
    pub page: u32,
    pub limit: u32,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl Default for ArtworkListQuery {
    fn default() -> Self {
        Self {
            list_type: ArtworkListType::All,
            page: 1,
            limit: 20,
            category: None,
            search: None,
        }
    }
}

/// Base key for a user profile.
pub fn user_profile(user_id: &str) -> String {
    CacheKeyBuilder::new("user").add("profile").add(user_id).build()
}

/// Base key for a page of a user's favourite artworks.
pub fn user_favorites(user_id: &str, page: u32, limit: u32) -> String {
    CacheKeyBuilder::new("user")
        .add("favorites")
        .add(user_id)
        .add(page)
        .add(limit)
        .build()
}

/// Base key for a single artwork.
pub fn artwork(artwork_id: &str) -> String {
    CacheKeyBuilder::new("artwork").add(artwork_id).build()
}

/// Base key for an artwork listing:
/// `artworks:<listType>:<page>:<limit>:<category>:<search>`.
pub fn artwork_list(query: &ArtworkListQuery) -> String {
    CacheKeyBuilder::new("artworks")
        .add(query.list_type)
        .add(query.page)
        .add(query.limit)
        .add_term(query.category.as_deref(), "all")
        .add_term(query.search.as_deref(), "none")
        .build()
}

/// Base key for an artist profile.
pub fn artist_profile(artist_id: &str) -> String {
    CacheKeyBuilder::new("artist").add("profile").add(artist_id).build()
}

/// Base key for a page of one artist's artworks.
pub fn artist_artworks(artist_id: &str, page: u32, limit: u32) -> String {
    CacheKeyBuilder::new("artist")
        .add("artworks")
        .add(artist_id)
        .add(page)
        .add(limit)
        .build()
}

/// Base key for the artist directory.
pub fn artist_list(page: u32, limit: u32) -> String {
    CacheKeyBuilder::new("artists").add(page).add(limit).build()
}

/// Base key for the full category list.
pub fn categories() -> String {
    CacheKeyBuilder::new("categories").add("all").build()
}

/// Base key for a page of artworks in one category.
pub fn category_artworks(category_id: &str, page: u32, limit: u32) -> String {
    CacheKeyBuilder::new("category")
        .add("artworks")
        .add(category_id)
        .add(page)
        .add(limit)
        .build()
}

/// Base key for an admin's dashboard statistics.
pub fn dashboard_stats(admin_id: &str) -> String {
    CacheKeyBuilder::new("dashboard").add("stats").add(admin_id).build()
}

/// Base key for the home feed.
pub fn home_data() -> String {
    CacheKeyBuilder::new("home").add("data").build()
}

/// Base key for a page of search results.
pub fn search_results(query: &str, page: u32, limit: u32) -> String {
    CacheKeyBuilder::new("search")
        .add_term(Some(query), "none")
        .add(page)
        .add(limit)
        .build()
}

/// Base key for a memoized HTTP response:
/// `response:<METHOD>:<path>?<query>`.
pub fn response(method: &str, path_and_query: &str) -> String {
    CacheKeyBuilder::new("response")
        .add(method)
        .add(path_and_query)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_build_key() {
        let keys = KeyGenerator::new("arthub");

        assert_eq!(keys.build_key("user:profile:60f1", None), "arthub:user:profile:60f1");
        assert_eq!(
            keys.build_key("GET:/api/artworks", Some("response")),
            "arthub:response:GET:/api/artworks"
        );
    }

    #[test]
    fn test_cache_key_builder() {
        let key = CacheKeyBuilder::new("artworks")
            .add("list")
            .add(1)
            .add_term(None, "all")
            .build();

        assert_eq!(key, "artworks:list:1:all");
    }

    #[test]
    fn test_domain_keys() {
        assert_eq!(user_profile("u1"), "user:profile:u1");
        assert_eq!(user_favorites("u1", 2, 10), "user:favorites:u1:2:10");
        assert_eq!(artwork("a9"), "artwork:a9");
        assert_eq!(artist_profile("x"), "artist:profile:x");
        assert_eq!(artist_artworks("x", 1, 12), "artist:artworks:x:1:12");
        assert_eq!(artist_list(1, 12), "artists:1:12");
        assert_eq!(categories(), "categories:all");
        assert_eq!(category_artworks("c1", 3, 5), "category:artworks:c1:3:5");
        assert_eq!(dashboard_stats("admin"), "dashboard:stats:admin");
        assert_eq!(home_data(), "home:data");
        assert_eq!(response("GET", "/api/home?x=1"), "response:GET:/api/home?x=1");
    }

    #[test]
    fn test_artwork_list_key() {
        let default = ArtworkListQuery::default();
        assert_eq!(artwork_list(&default), "artworks:all:1:20:all:none");

        let query = ArtworkListQuery {
            list_type: ArtworkListType::Trending,
            page: 2,
            limit: 12,
            category: Some("Oil Painting".to_string()),
            search: Some("  Blue*Sky ".to_string()),
        };
        assert_eq!(artwork_list(&query), "artworks:trending:2:12:oil_painting:blue_sky");
    }

    #[test]
    fn test_distinct_queries_distinct_keys() {
        let base = ArtworkListQuery::default();
        let other_page = ArtworkListQuery { page: 2, ..base.clone() };
        let other_category = ArtworkListQuery {
            category: Some("sculpture".to_string()),
            ..base.clone()
        };

        assert_ne!(artwork_list(&base), artwork_list(&other_page));
        assert_ne!(artwork_list(&base), artwork_list(&other_category));
    }

    #[test]
    fn test_search_key_blank_query() {
        assert_eq!(search_results("   ", 1, 10), "search:none:1:10");
        assert_eq!(search_results("Monet", 1, 10), "search:monet:1:10");
        assert_eq!(search_results(" Water  Lilies\t", 1, 10), "search:water_lilies:1:10");
    }

    proptest! {
        #[test]
        fn normalized_terms_are_single_glob_free_segments(term in ".{0,40}") {
            let normalized = normalize_term(&term);
            prop_assert!(!normalized.contains(SEPARATOR));
            prop_assert!(!normalized.contains(|c: char| matches!(c, '*' | '?' | '[' | ']')));
            prop_assert!(!normalized.contains(char::is_whitespace));
        }

        #[test]
        fn same_query_same_key(page in 1u32..100, limit in 1u32..100, search in "[a-z ]{0,12}") {
            let query = ArtworkListQuery {
                page,
                limit,
                search: Some(search),
                ..ArtworkListQuery::default()
            };
            prop_assert_eq!(artwork_list(&query), artwork_list(&query.clone()));
        }
    }
}
