use crate::core::{ColabError, Result};
use std::time::Duration;

/// Client-side cache and realtime configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long fetched data is served without refetching
    pub stale_time: Duration,

    /// How long an untouched entry survives garbage collection
    pub gc_time: Duration,

    /// Maximum number of cached query results (least recently used go first)
    pub max_entries: usize,

    /// Default page window for list queries
    pub page_size: usize,

    /// Buffer of the cache change notification channel
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            max_entries: 512,
            page_size: 10,
            notification_capacity: 256,
        }
    }

    /// Set stale time
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set garbage collection time
    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Set maximum cached entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set default page size
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set notification channel capacity
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Read overrides from `COLABDOC_*` environment variables.
    ///
    /// Recognised: `COLABDOC_STALE_SECS`, `COLABDOC_GC_SECS`,
    /// `COLABDOC_MAX_ENTRIES`, `COLABDOC_PAGE_SIZE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if let Some(secs) = parse_var::<u64>(&lookup, "COLABDOC_STALE_SECS")? {
            config.stale_time = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "COLABDOC_GC_SECS")? {
            config.gc_time = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "COLABDOC_MAX_ENTRIES")? {
            config.max_entries = max;
        }
        if let Some(size) = parse_var::<usize>(&lookup, "COLABDOC_PAGE_SIZE")? {
            config.page_size = size;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ColabError::Validation("max_entries must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(ColabError::Validation("page_size must be at least 1".into()));
        }
        if self.notification_capacity == 0 {
            return Err(ColabError::Validation(
                "notification_capacity must be at least 1".into(),
            ));
        }
        if self.gc_time < self.stale_time {
            return Err(ColabError::Validation(
                "gc_time must not be shorter than stale_time".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ColabError::Validation(format!("{} is not a valid number: '{}'", name, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.stale_time, Duration::from_secs(300));
        assert_eq!(config.gc_time, Duration::from_secs(600));
        assert_eq!(config.page_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new()
            .stale_time(Duration::from_secs(1))
            .gc_time(Duration::from_secs(2))
            .max_entries(8)
            .page_size(3);

        assert_eq!(config.max_entries, 8);
        assert_eq!(config.page_size, 3);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = ClientConfig::from_lookup(|name| match name {
            "COLABDOC_PAGE_SIZE" => Some("25".to_string()),
            "COLABDOC_STALE_SECS" => Some(" 30 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.stale_time, Duration::from_secs(30));

        let bad = ClientConfig::from_lookup(|name| {
            (name == "COLABDOC_MAX_ENTRIES").then(|| "many".to_string())
        });
        assert!(matches!(bad, Err(ColabError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_times() {
        let config = ClientConfig::new()
            .stale_time(Duration::from_secs(10))
            .gc_time(Duration::from_secs(5));
        assert!(config.validate().is_err());
    }
}
