//! Query variant registry
//!
//! Variants are keyed by name. Registering a name that already exists
//! replaces the earlier variant and moves it to the end of the registration
//! order used by [`VariantRegistry::list`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut registry = VariantRegistry::new();
//! registry.register(QueryVariant::baseline("scan", "SELECT ..."));
//! registry.register(QueryVariant::candidate("indexed", "SELECT ...").with_setup("CREATE INDEX ..."));
//!
//! let baselines = registry.list(VariantTag::Baseline);
//! let v = registry.get("indexed")?;
//! ```

use querybench_core::{BenchError, QueryVariant, Result, VariantTag};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Entry {
    seq: u64,
    variant: Arc<QueryVariant>,
}

/// Registry of query variants
///
/// Read-only once an experiment starts: share it behind an `Arc`.
#[derive(Default)]
pub struct VariantRegistry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl VariantRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant, replacing any variant with the same name.
    ///
    /// Returns the replaced variant, if any.
    pub fn register(&mut self, variant: QueryVariant) -> Option<Arc<QueryVariant>> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let name = variant.name.clone();
        let previous = self.entries.insert(
            name.clone(),
            Entry {
                seq,
                variant: Arc::new(variant),
            },
        );
        debug!(target: "querybench::run", variant = %name, replaced = previous.is_some(), "Variant registered");
        previous.map(|e| e.variant)
    }

    /// Look up a variant by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if no variant is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<QueryVariant>> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.variant))
            .ok_or_else(|| BenchError::not_found(name))
    }

    /// Variants with `tag`, in registration order
    pub fn list(&self, tag: VariantTag) -> Vec<Arc<QueryVariant>> {
        self.ordered()
            .filter(|v| v.tag == tag)
            .cloned()
            .collect()
    }

    /// Every variant, in registration order
    pub fn all(&self) -> Vec<Arc<QueryVariant>> {
        self.ordered().cloned().collect()
    }

    /// Check if a variant is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove a variant
    pub fn unregister(&mut self, name: &str) -> Option<Arc<QueryVariant>> {
        self.entries.remove(name).map(|e| e.variant)
    }

    /// Get the number of registered variants
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<QueryVariant>> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.variant)
    }
}

impl std::fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantRegistry")
            .field("variants", &self.all().iter().map(|v| v.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl FromIterator<QueryVariant> for VariantRegistry {
    fn from_iter<I: IntoIterator<Item = QueryVariant>>(iter: I) -> Self {
        let mut registry = Self::new();
        for variant in iter {
            registry.register(variant);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = VariantRegistry::new();
        assert!(registry.is_empty());
        registry.register(QueryVariant::baseline("scan", "SELECT * FROM t"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("scan").unwrap().sql, "SELECT * FROM t");
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry = VariantRegistry::new();
        registry.register(QueryVariant::baseline("baseline", "SELECT 1"));
        let replaced = registry.register(QueryVariant::baseline("baseline", "SELECT 2"));
        assert_eq!(replaced.unwrap().sql, "SELECT 1");
        assert_eq!(registry.get("baseline").unwrap().sql, "SELECT 2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = VariantRegistry::new();
        match registry.get("missing") {
            Err(BenchError::NotFound { name }) => assert_eq!(name, "missing"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_list_by_tag_in_registration_order() {
        let registry: VariantRegistry = vec![
            QueryVariant::candidate("c1", "SELECT 1"),
            QueryVariant::baseline("b1", "SELECT 2"),
            QueryVariant::candidate("c2", "SELECT 3"),
            QueryVariant::candidate("c0", "SELECT 4"),
        ]
        .into_iter()
        .collect();

        let names: Vec<String> = registry
            .list(VariantTag::Candidate)
            .iter()
            .map(|v| v.name.clone())
            .collect();
        assert_eq!(names, vec!["c1", "c2", "c0"]);
        assert_eq!(registry.list(VariantTag::Baseline).len(), 1);
    }

    #[test]
    fn test_reregister_moves_to_end() {
        let mut registry = VariantRegistry::new();
        registry.register(QueryVariant::candidate("a", "SELECT 1"));
        registry.register(QueryVariant::candidate("b", "SELECT 2"));
        registry.register(QueryVariant::candidate("a", "SELECT 3"));
        let names: Vec<String> = registry.all().iter().map(|v| v.name.clone()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_reregister_can_change_tag() {
        let mut registry = VariantRegistry::new();
        registry.register(QueryVariant::candidate("v", "SELECT 1"));
        registry.register(QueryVariant::baseline("v", "SELECT 1"));
        assert!(registry.list(VariantTag::Candidate).is_empty());
        assert_eq!(registry.list(VariantTag::Baseline).len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = VariantRegistry::new();
        registry.register(QueryVariant::baseline("v", "SELECT 1"));
        assert!(registry.unregister("v").is_some());
        assert!(!registry.contains("v"));
        assert!(registry.unregister("v").is_none());
    }
}
