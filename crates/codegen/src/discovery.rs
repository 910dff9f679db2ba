//! Per-file discovery cache aggregating scan output across the project.

use crate::error::CodegenError;
use crate::scanner::{normalize_path, DiscoveredService, ScanOutput, Scanner};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Default)]
struct FileEntry {
    services: Vec<DiscoveredService>,
    deferred_keys: BTreeSet<String>,
    source: Option<String>,
}

/// Prior and new state handed back by a store mutation, so the caller
/// can invalidate anything derived from the prior state.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub new_services: Vec<DiscoveredService>,
    pub new_deferred_keys: BTreeSet<String>,
    pub prior_services: Vec<DiscoveredService>,
    pub prior_deferred_keys: BTreeSet<String>,
}

/// Mutable aggregation layer over the scanner, keyed by source file.
///
/// Files are kept in a `BTreeMap` so every aggregate view iterates in a
/// stable order regardless of update order.
#[derive(Debug)]
pub struct DiscoveryStore {
    scanner: Scanner,
    files: BTreeMap<String, FileEntry>,
    keep_sources: bool,
}

impl DiscoveryStore {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            files: BTreeMap::new(),
            keep_sources: false,
        }
    }

    /// Keep per-file source snapshots (used by manifest emitters)
    pub fn with_source_snapshots(mut self) -> Self {
        self.keep_sources = true;
        self
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Rescan one file and swap its entry
    pub fn update(
        &mut self,
        file_path: &Path,
        source: &str,
    ) -> Result<UpdateOutcome, CodegenError> {
        let ScanOutput {
            services,
            deferred_keys,
        } = self.scanner.scan(source, file_path)?;

        let entry = FileEntry {
            services: services.clone(),
            deferred_keys: deferred_keys.clone(),
            source: self.keep_sources.then(|| source.to_string()),
        };
        let prior = self
            .files
            .insert(normalize_path(file_path), entry)
            .unwrap_or_default();

        Ok(UpdateOutcome {
            new_services: services,
            new_deferred_keys: deferred_keys,
            prior_services: prior.services,
            prior_deferred_keys: prior.deferred_keys,
        })
    }

    /// Evict one file; idempotent
    pub fn remove(&mut self, file_path: &Path) -> UpdateOutcome {
        let prior = self
            .files
            .remove(&normalize_path(file_path))
            .unwrap_or_default();
        UpdateOutcome {
            prior_services: prior.services,
            prior_deferred_keys: prior.deferred_keys,
            ..UpdateOutcome::default()
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// All discovered services, in stable file order
    pub fn services(&self) -> Vec<DiscoveredService> {
        self.files
            .values()
            .flat_map(|entry| entry.services.iter().cloned())
            .collect()
    }

    /// Union of every file's deferred-reference keys
    pub fn deferred_keys(&self) -> BTreeSet<String> {
        self.files
            .values()
            .flat_map(|entry| entry.deferred_keys.iter().cloned())
            .collect()
    }

    pub fn file_services(&self, file_path: &Path) -> Option<&[DiscoveredService]> {
        self.files
            .get(&normalize_path(file_path))
            .map(|entry| entry.services.as_slice())
    }

    pub fn file_deferred_keys(&self, file_path: &Path) -> Option<&BTreeSet<String>> {
        self.files
            .get(&normalize_path(file_path))
            .map(|entry| &entry.deferred_keys)
    }

    /// Source snapshot, when snapshots are enabled
    pub fn source(&self, file_path: &Path) -> Option<&str> {
        self.files
            .get(&normalize_path(file_path))?
            .source
            .as_deref()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn service_count(&self) -> usize {
        self.files.values().map(|entry| entry.services.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DiscoveryStore {
        DiscoveryStore::new(Scanner::new("app", "/project"))
    }

    const USER_SOURCE: &str = r#"
        #[injectable]
        pub struct UserService;
    "#;

    #[test]
    fn test_update_reports_prior_state() {
        let mut store = store();
        let path = Path::new("/project/src/user.rs");

        let first = store.update(path, USER_SOURCE).unwrap();
        assert_eq!(first.new_services.len(), 1);
        assert!(first.prior_services.is_empty());

        let second = store
            .update(path, "#[injectable]\npub struct RenamedService;")
            .unwrap();
        assert_eq!(second.prior_services[0].class_name, "UserService");
        assert_eq!(second.new_services[0].class_name, "RenamedService");
        assert_eq!(store.service_count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = store();
        let path = Path::new("/project/src/user.rs");
        store.update(path, USER_SOURCE).unwrap();

        let removed = store.remove(path);
        assert_eq!(removed.prior_services.len(), 1);

        let removed_again = store.remove(path);
        assert!(removed_again.prior_services.is_empty());
        assert_eq!(store.file_count(), 0);
    }

    #[test]
    fn test_rescan_of_identical_content_is_byte_identical() {
        let mut store = store();
        let path = Path::new("/project/src/user.rs");

        let first = store.update(path, USER_SOURCE).unwrap();
        let second = store.update(path, USER_SOURCE).unwrap();
        assert_eq!(first.new_services, second.new_services);
        assert_eq!(first.new_deferred_keys, second.new_deferred_keys);
    }

    #[test]
    fn test_aggregate_views_are_order_independent() {
        let a = ("/project/src/a.rs", "#[injectable]\npub struct Alpha;");
        let b = ("/project/src/b.rs", "#[singleton]\npub struct Beta;");

        let mut forward = store();
        forward.update(Path::new(a.0), a.1).unwrap();
        forward.update(Path::new(b.0), b.1).unwrap();

        let mut reverse = store();
        reverse.update(Path::new(b.0), b.1).unwrap();
        reverse.update(Path::new(a.0), a.1).unwrap();

        assert_eq!(forward.services(), reverse.services());
        assert_eq!(forward.deferred_keys(), reverse.deferred_keys());
    }

    #[test]
    fn test_source_snapshots_are_opt_in() {
        let path = Path::new("/project/src/user.rs");

        let mut plain = store();
        plain.update(path, USER_SOURCE).unwrap();
        assert!(plain.source(path).is_none());

        let mut snapshotting =
            DiscoveryStore::new(Scanner::new("app", "/project")).with_source_snapshots();
        snapshotting.update(path, USER_SOURCE).unwrap();
        assert_eq!(snapshotting.source(path), Some(USER_SOURCE));
    }
}
