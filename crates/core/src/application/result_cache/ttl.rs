// Category TTL table

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{secs_to_duration, CacheConfig, CategoryTtl};

/// Default TTL per operation category; unknown categories get the fallback
#[derive(Debug, Clone)]
pub struct TtlTable {
    categories: HashMap<String, CategoryTtl>,
    fallback: Duration,
}

impl TtlTable {
    pub fn new(categories: HashMap<String, CategoryTtl>, fallback: Duration) -> Self {
        Self {
            categories,
            fallback,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.categories.clone(),
            secs_to_duration(config.default_ttl_secs),
        )
    }

    /// Effective TTL (base x multiplier) for `category`
    pub fn ttl_for(&self, category: &str) -> Duration {
        self.categories
            .get(category)
            .map(CategoryTtl::effective)
            .unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn set(&mut self, category: impl Into<String>, ttl: CategoryTtl) {
        self.categories.insert(category.into(), ttl);
    }
}

impl Default for TtlTable {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let table = TtlTable::default();
        assert_eq!(table.ttl_for("file_operations"), Duration::from_secs(1));
        assert_eq!(table.ttl_for("instance_list"), Duration::from_secs(3));
        assert_eq!(table.ttl_for("adb_devices"), Duration::from_secs(5));
        assert_eq!(table.ttl_for("app_list"), Duration::from_secs(90));
        assert_eq!(table.ttl_for("system_info"), Duration::from_secs(180));
        assert_eq!(table.ttl_for("validation"), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_category_uses_fallback() {
        let mut table = TtlTable::default();
        assert!(!table.contains("screenshots"));
        assert_eq!(table.ttl_for("screenshots"), table.fallback());

        table.set("screenshots", CategoryTtl::new(2.0, 2.0));
        assert_eq!(table.ttl_for("screenshots"), Duration::from_secs(4));
    }
}
