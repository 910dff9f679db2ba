//! Registry snapshot/restore and the test-container builder.
//!
//! Tests take a snapshot of the process-wide registry, overlay providers,
//! instance and token overrides, and optionally auto-mock the dependency
//! graph of a target service. `restore` puts the registry back exactly as
//! it was, undoing every importer substitution the overlay made.

use crate::container::container::Container;
use crate::container::dependency::DependencyKind;
use crate::container::key::{ServiceCtor, ServiceKey};
use crate::container::lazy::Lazy;
use crate::container::provider::{apply_providers, ProviderBlock};
use crate::container::registry::{dependencies_registry, RegistrySnapshot, ServiceRegistration};
use crate::container::tokens::Token;
use crate::errors::CoreError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Capture the complete registry state
pub fn snapshot() -> Result<RegistrySnapshot, CoreError> {
    dependencies_registry().snapshot()
}

/// Replace the registry state with a snapshot
pub fn restore(snapshot: RegistrySnapshot) -> Result<(), CoreError> {
    dependencies_registry().restore(snapshot)
}

/// Mock constructors, keyed by service type for eager dependencies and by
/// deferred target for deferred edges.
#[derive(Default)]
pub struct MockRegistry {
    by_key: HashMap<ServiceKey, ServiceCtor>,
    by_target: HashMap<String, ServiceCtor>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a mock for an eagerly-wired service type
    pub fn provide<T, F>(&mut self, build: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.by_key.insert(
            ServiceKey::of::<T>(),
            ServiceCtor::new::<T, _>(move |_| Ok(build())),
        );
    }

    /// Provide a mock for a deferred edge, matched by the importer's
    /// recorded target
    pub fn provide_deferred<T, F>(&mut self, target: impl Into<String>, build: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.by_target.insert(
            target.into(),
            ServiceCtor::new::<T, _>(move |_| Ok(build())),
        );
    }

    fn mock_for(&self, key: &ServiceKey) -> Option<&ServiceCtor> {
        self.by_key.get(key)
    }

    fn mock_for_target(&self, target: &str) -> Option<&ServiceCtor> {
        self.by_target.get(target)
    }

    fn is_empty(&self) -> bool {
        self.by_key.is_empty() && self.by_target.is_empty()
    }
}

type OverrideFn = Box<dyn FnOnce(&Container) -> Result<(), CoreError> + Send>;

/// Builder for an isolated test container
#[derive(Default)]
pub struct TestContainerBuilder {
    overrides: Vec<OverrideFn>,
    providers: Vec<ProviderBlock>,
    mocks: MockRegistry,
    auto_mock_target: Option<ServiceKey>,
}

impl TestContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an instance on the test container
    pub fn override_instance<T: Send + Sync + 'static>(mut self, instance: T) -> Self {
        self.overrides
            .push(Box::new(move |container| container.override_instance(instance)));
        self
    }

    /// Provide a token value on the test container
    pub fn provide_value<T: Send + Sync + 'static>(mut self, token: &Token<T>, value: T) -> Self {
        let token = token.clone();
        self.overrides
            .push(Box::new(move |container| container.provide_value(&token, value)));
        self
    }

    /// Apply a provider block before overrides
    pub fn with_provider(mut self, block: ProviderBlock) -> Self {
        self.providers.push(block);
        self
    }

    /// Register a mock for a service type
    pub fn mock<T, F>(mut self, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.mocks.provide::<T, F>(build);
        self
    }

    /// Register a mock for a deferred edge by its importer target
    pub fn mock_deferred<T, F>(mut self, target: impl Into<String>, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.mocks.provide_deferred::<T, F>(target, build);
        self
    }

    /// Walk the dependency graph of `T` and substitute registered mocks
    /// across it, including through deferred edges
    pub fn auto_mock_from<T: Send + Sync + 'static>(mut self) -> Self {
        self.auto_mock_target = Some(ServiceKey::of::<T>());
        self
    }

    /// Snapshot the registry, apply providers and overrides, run the
    /// auto-mock walk, and hand back the container.
    pub fn build(self) -> Result<TestContainer, CoreError> {
        let snapshot = dependencies_registry().snapshot()?;

        let container = Container::new();
        apply_providers(&container, self.providers)?;
        for apply in self.overrides {
            apply(&container)?;
        }

        if let Some(target) = self.auto_mock_target {
            if self.mocks.is_empty() {
                tracing::warn!(
                    "auto-mock requested but no mocks were registered; the graph walk is a no-op"
                );
            }
            auto_mock_graph(target, &self.mocks)?;
        }

        Ok(TestContainer {
            container,
            snapshot,
        })
    }
}

/// A container bound to a registry snapshot taken at build time
pub struct TestContainer {
    container: Container,
    snapshot: RegistrySnapshot,
}

impl TestContainer {
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Restore the registry to its pre-build state, undoing every
    /// registration replacement and importer substitution
    pub fn restore(self) -> Result<(), CoreError> {
        dependencies_registry().restore(self.snapshot)
    }
}

/// Breadth-first walk over constructor dependencies, substituting mocked
/// registrations and rewriting deferred importers whose target is mocked.
fn auto_mock_graph(target: ServiceKey, mocks: &MockRegistry) -> Result<(), CoreError> {
    let registry = dependencies_registry();
    let mut queue = VecDeque::from([target]);
    let mut visited = HashSet::new();

    while let Some(key) = queue.pop_front() {
        if !visited.insert(key) {
            continue;
        }
        let Some(registration) = registry.get(&key) else {
            continue;
        };

        let mut has_deferred_substitution = substitutes_factory(&registration, mocks);
        for dependency in registration.dependencies() {
            match dependency.kind() {
                DependencyKind::Service(ctor) => {
                    enqueue_or_mock(ctor.key(), mocks, registry, &mut queue)?;
                }
                DependencyKind::Key(dep_key) => {
                    enqueue_or_mock(*dep_key, mocks, registry, &mut queue)?;
                }
                DependencyKind::Deferred(lazy) => {
                    if let Some(target) = lazy.target() {
                        if mocks.mock_for_target(target).is_some() {
                            has_deferred_substitution = true;
                        }
                    }
                }
                _ => {}
            }
        }

        if has_deferred_substitution {
            let substitutions = deferred_substitutions(mocks);
            registry.insert(registration.map_deferred(substitutions))?;
        }
    }

    Ok(())
}

fn substitutes_factory(registration: &ServiceRegistration, mocks: &MockRegistry) -> bool {
    registration
        .factory_target()
        .map(|target| mocks.mock_for_target(target).is_some())
        .unwrap_or(false)
}

fn enqueue_or_mock(
    key: ServiceKey,
    mocks: &MockRegistry,
    registry: &crate::container::registry::DependenciesRegistry,
    queue: &mut VecDeque<ServiceKey>,
) -> Result<(), CoreError> {
    if let Some(mock) = mocks.mock_for(&key) {
        let scope = registry
            .get(&key)
            .map(|registration| registration.scope())
            .unwrap_or_default();
        registry.insert(ServiceRegistration::new(mock.clone(), scope))?;
        // a mocked node cuts its branch; its real dependencies never resolve
    } else {
        queue.push_back(key);
    }
    Ok(())
}

fn deferred_substitutions(
    mocks: &MockRegistry,
) -> Arc<dyn Fn(&Lazy) -> Option<Lazy> + Send + Sync> {
    let by_target: HashMap<String, ServiceCtor> = mocks
        .by_target
        .iter()
        .map(|(target, ctor)| (target.clone(), ctor.clone()))
        .collect();
    Arc::new(move |lazy: &Lazy| {
        let target = lazy.target()?;
        let mock = by_target.get(target)?.clone();
        Some(
            Lazy::from_ctor(move || mock.clone())
                .with_target(format!("mock:{}", target)),
        )
    })
}
