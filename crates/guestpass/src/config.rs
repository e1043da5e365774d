use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://guestpass.db";
pub const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: &str) -> Self {
        Self::default().with_database_url(database_url)
    }

    /// A private in-memory database. Every pooled connection to `:memory:`
    /// would see its own empty database, so the pool is pinned to one
    /// connection.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_DATABASE_URL).with_max_connections(1)
    }

    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database_url = url.to_string();
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn without_create(mut self) -> Self {
        self.create_if_missing = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_uses_single_connection() {
        let config = StoreConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 1);
    }

    #[test]
    fn test_builder_overrides() {
        let config = StoreConfig::new("sqlite:///tmp/passes.db")
            .with_max_connections(0)
            .with_busy_timeout(Duration::from_millis(250))
            .without_create();
        assert_eq!(config.database_url, "sqlite:///tmp/passes.db");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.create_if_missing);
        assert!(!config.is_in_memory());
    }
}
