//! TTL presets in seconds.

/// Volatile data: dashboards, search results.
pub const SHORT: u64 = 60;
/// Most entity lookups and listings.
pub const DEFAULT: u64 = 300;
/// Data that rarely changes between mutations.
pub const LONG: u64 = 3600;
/// Reference data such as the category list.
pub const VERY_LONG: u64 = 7200;
