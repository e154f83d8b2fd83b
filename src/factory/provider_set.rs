//! Ordered, name-keyed provider collection.

use std::sync::Arc;

use crate::providers::CacheProvider;

/// Providers in priority order, addressable by name.
///
/// Order matters to the distributed manager: the first entry is the primary.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    entries: Vec<(String, Arc<dyn CacheProvider>)>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider; returns false and leaves the set unchanged when the
    /// name is taken.
    pub fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn CacheProvider>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push((name, provider));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CacheProvider>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, provider)| provider)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn CacheProvider>)> {
        self.entries
            .iter()
            .map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::providers::MemoryProvider;

    fn memory() -> Arc<dyn CacheProvider> {
        Arc::new(MemoryProvider::new(MemoryConfig::default()))
    }

    #[test]
    fn test_insert_keeps_order_and_rejects_duplicates() {
        let mut set = ProviderSet::new();
        assert!(set.insert("primary", memory()));
        assert!(set.insert("fallback", memory()));
        assert!(!set.insert("primary", memory()));

        assert_eq!(set.len(), 2);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["primary", "fallback"]);
        assert!(set.get("fallback").is_some());
        assert!(set.get("missing").is_none());
    }
}
