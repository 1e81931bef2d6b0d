//! Server configuration types.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding configuration.
    #[serde(default)]
    pub server: ServerBindConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Whole-response cache for API routes.
    #[serde(default)]
    pub response_cache: ResponseCacheConfig,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        self.server.socket_addr()
    }
}

/// Server binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerBindConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerBindConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerBindConfig {
    /// Resolve the bind address, falling back to all interfaces when the
    /// host is not an IP literal.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, compact or json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global prefix of every generated key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Default TTL.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
    /// How often the memory backend sweeps expired entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Redis connect timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Redis endpoint.
    #[serde(default)]
    pub redis: RedisConfig,
}

fn default_key_prefix() -> String {
    "arthub".to_string()
}

fn default_cache_ttl() -> u64 {
    crate::cache::ttl::DEFAULT
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            connect_timeout_secs: default_connect_timeout(),
            redis: RedisConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Redis endpoint configuration. Either `url` or `host` selects Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL.
    pub url: Option<String>,
    /// Host, used when no URL is set.
    pub host: Option<String>,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index.
    #[serde(default)]
    pub db: i64,
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: default_redis_port(),
            password: None,
            db: 0,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// Enable the response cache on API routes.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TTL of cached responses.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Largest body that will be cached.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
