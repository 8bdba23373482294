use std::time::Duration;

/// Configuration for the Memcached cache store and its locks.
#[derive(Debug, Clone)]
pub struct MemcachedConfig {
    /// Server address as `host:port`. A `memcache://` scheme is accepted and
    /// stripped.
    pub url: String,

    /// Prefix prepended to counter and lock keys.
    pub prefix: String,

    /// Maximum number of pooled connections.
    pub pool_size: usize,

    /// Timeout for opening a connection and for waiting on the pool.
    pub connection_timeout: Duration,
}

impl MemcachedConfig {
    /// Default configuration pointing at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// The socket address to dial, without any URL scheme.
    pub fn address(&self) -> &str {
        self.url
            .strip_prefix("memcache://")
            .or_else(|| self.url.strip_prefix("memcached://"))
            .unwrap_or(&self.url)
            .trim_end_matches('/')
    }
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            url: String::from("127.0.0.1:11211"),
            prefix: String::from("keylock:"),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = MemcachedConfig::default();
        assert_eq!(cfg.url, "127.0.0.1:11211");
        assert_eq!(cfg.prefix, "keylock:");
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn address_strips_scheme() {
        assert_eq!(MemcachedConfig::new("memcache://cache:11211").address(), "cache:11211");
        assert_eq!(MemcachedConfig::new("memcached://cache:11211/").address(), "cache:11211");
        assert_eq!(MemcachedConfig::new("10.0.0.5:11211").address(), "10.0.0.5:11211");
    }
}
