//! Process-wide service metadata registry.
//!
//! Generated wiring modules, provider application, and tests all write
//! registrations here; containers read them at resolution time. The
//! dependencies of a registration live behind a thunk so that dependency
//! evaluation is postponed past registration order, which keeps
//! self-referential graphs declared in one compilation unit working.

use crate::container::dependency::{DependencyExpr, DependencyKind};
use crate::container::key::{ServiceCtor, ServiceKey};
use crate::container::lazy::Lazy;
use crate::container::scope::ServiceScope;
use crate::errors::CoreError;
use once_cell::sync::Lazy as OnceLazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Thunk producing a registration's dependency list
pub type DependenciesThunk = Arc<dyn Fn() -> Vec<DependencyExpr> + Send + Sync>;

/// Metadata registered for one service
#[derive(Clone)]
pub struct ServiceRegistration {
    ctor: ServiceCtor,
    scope: ServiceScope,
    dependencies: Option<DependenciesThunk>,
    factory: Option<Lazy>,
}

impl ServiceRegistration {
    pub fn new(ctor: ServiceCtor, scope: ServiceScope) -> Self {
        Self {
            ctor,
            scope,
            dependencies: None,
            factory: None,
        }
    }

    pub fn singleton(ctor: ServiceCtor) -> Self {
        Self::new(ctor, ServiceScope::Singleton)
    }

    pub fn transient(ctor: ServiceCtor) -> Self {
        Self::new(ctor, ServiceScope::Transient)
    }

    /// Declare dependencies through a thunk, evaluated on every resolution
    pub fn with_dependencies<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> Vec<DependencyExpr> + Send + Sync + 'static,
    {
        self.dependencies = Some(Arc::new(thunk));
        self
    }

    /// Declare dependencies as a fixed list
    pub fn with_dependency_list(self, dependencies: Vec<DependencyExpr>) -> Self {
        self.with_dependencies(move || dependencies.clone())
    }

    /// Attach a factory importer: the registered constructor stays a
    /// stable placeholder and the real constructor is fetched through the
    /// factory at resolution time.
    pub fn with_factory(mut self, factory: Lazy) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn ctor(&self) -> &ServiceCtor {
        &self.ctor
    }

    pub fn key(&self) -> ServiceKey {
        self.ctor.key()
    }

    pub fn scope(&self) -> ServiceScope {
        self.scope
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub(crate) fn dependencies(&self) -> Vec<DependencyExpr> {
        self.dependencies
            .as_ref()
            .map(|thunk| thunk())
            .unwrap_or_default()
    }

    pub(crate) fn factory(&self) -> Option<&Lazy> {
        self.factory.as_ref()
    }

    pub(crate) fn factory_target(&self) -> Option<&str> {
        self.factory.as_ref().and_then(|factory| factory.target())
    }

    /// Produce a copy of this registration whose deferred importers (in
    /// both the dependency list and the factory slot) are rewritten by
    /// `substitute`. Used by the test overlay.
    pub(crate) fn map_deferred(
        &self,
        substitute: Arc<dyn Fn(&Lazy) -> Option<Lazy> + Send + Sync>,
    ) -> Self {
        let factory = self.factory.as_ref().map(|factory| {
            substitute(factory).unwrap_or_else(|| factory.clone())
        });
        let dependencies = self.dependencies.as_ref().map(|thunk| {
            let thunk = thunk.clone();
            let substitute = substitute.clone();
            Arc::new(move || {
                thunk()
                    .into_iter()
                    .map(|dep| {
                        let replacement = match dep.kind() {
                            DependencyKind::Deferred(lazy) => substitute(lazy),
                            _ => None,
                        };
                        match replacement {
                            Some(lazy) => DependencyExpr::lazy(lazy),
                            None => dep,
                        }
                    })
                    .collect()
            }) as DependenciesThunk
        });
        Self {
            ctor: self.ctor.clone(),
            scope: self.scope,
            dependencies,
            factory,
        }
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service", &self.ctor.type_name())
            .field("scope", &self.scope)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Counts of registered services by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub services: usize,
    pub singletons: usize,
    pub transients: usize,
    pub factory_backed: usize,
}

/// A full copy of the registry state, for the test overlay
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    entries: HashMap<ServiceKey, Arc<ServiceRegistration>>,
}

impl RegistrySnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        self.entries.keys().copied().collect()
    }
}

/// Process-wide registry mapping service keys to their metadata
pub struct DependenciesRegistry {
    entries: RwLock<HashMap<ServiceKey, Arc<ServiceRegistration>>>,
}

static DEPENDENCIES_REGISTRY: OnceLazy<DependenciesRegistry> =
    OnceLazy::new(|| DependenciesRegistry {
        entries: RwLock::new(HashMap::new()),
    });

/// Get the process-wide dependencies registry
pub fn dependencies_registry() -> &'static DependenciesRegistry {
    &DEPENDENCIES_REGISTRY
}

impl DependenciesRegistry {
    /// Insert or replace a registration
    pub fn insert(&self, registration: ServiceRegistration) -> Result<(), CoreError> {
        let mut entries = self.entries.write().map_err(|_| CoreError::LockError {
            resource: "dependencies_registry".to_string(),
        })?;
        entries.insert(registration.key(), Arc::new(registration));
        Ok(())
    }

    pub fn get(&self, key: &ServiceKey) -> Option<Arc<ServiceRegistration>> {
        let entries = self.entries.read().ok()?;
        entries.get(key).cloned()
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        self.entries
            .read()
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every registration
    pub fn clear(&self) -> Result<(), CoreError> {
        let mut entries = self.entries.write().map_err(|_| CoreError::LockError {
            resource: "dependencies_registry".to_string(),
        })?;
        entries.clear();
        Ok(())
    }

    /// Capture the complete registry state
    pub fn snapshot(&self) -> Result<RegistrySnapshot, CoreError> {
        let entries = self.entries.read().map_err(|_| CoreError::LockError {
            resource: "dependencies_registry".to_string(),
        })?;
        Ok(RegistrySnapshot {
            entries: entries.clone(),
        })
    }

    /// Replace the registry state with a snapshot
    pub fn restore(&self, snapshot: RegistrySnapshot) -> Result<(), CoreError> {
        let mut entries = self.entries.write().map_err(|_| CoreError::LockError {
            resource: "dependencies_registry".to_string(),
        })?;
        *entries = snapshot.entries;
        Ok(())
    }

    pub fn stats(&self) -> RegistryStats {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => return RegistryStats::default(),
        };
        let mut stats = RegistryStats {
            services: entries.len(),
            ..RegistryStats::default()
        };
        for registration in entries.values() {
            match registration.scope() {
                ServiceScope::Singleton => stats.singletons += 1,
                ServiceScope::Transient => stats.transients += 1,
            }
            if registration.has_factory() {
                stats.factory_backed += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct Mailer;
    struct Notifier;

    #[test]
    #[serial]
    fn test_insert_and_lookup() {
        let registry = dependencies_registry();
        registry
            .insert(ServiceRegistration::singleton(ServiceCtor::new::<Mailer, _>(
                |_| Ok(Mailer),
            )))
            .unwrap();

        let key = ServiceKey::of::<Mailer>();
        let registration = registry.get(&key).unwrap();
        assert_eq!(registration.scope(), ServiceScope::Singleton);
        assert!(registry.contains(&key));
    }

    #[test]
    fn test_dependencies_thunk_defaults_to_empty() {
        let registration =
            ServiceRegistration::transient(ServiceCtor::new::<Notifier, _>(|_| Ok(Notifier)));
        assert!(registration.dependencies().is_empty());

        let registration = registration
            .with_dependency_list(vec![DependencyExpr::key::<Mailer>()]);
        assert_eq!(registration.dependencies().len(), 1);
    }

    #[test]
    fn test_map_deferred_rewrites_importers() {
        struct Deferred;

        let original = Lazy::from_ctor(|| ServiceCtor::new::<Deferred, _>(|_| Ok(Deferred)))
            .with_target("deep::Deferred");
        let registration =
            ServiceRegistration::transient(ServiceCtor::new::<Notifier, _>(|_| Ok(Notifier)))
                .with_dependency_list(vec![DependencyExpr::lazy(original)]);

        let replaced = registration.map_deferred(Arc::new(|lazy: &Lazy| {
            (lazy.target() == Some("deep::Deferred")).then(|| {
                Lazy::from_ctor(|| ServiceCtor::new::<Deferred, _>(|_| Ok(Deferred)))
                    .with_target("mock::Deferred")
            })
        }));

        let deps = replaced.dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].describe(), "lazy(mock::Deferred)");
    }
}
