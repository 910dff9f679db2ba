//! Provider blocks: user-supplied wiring applied on top of the generated
//! registrations.
//!
//! A block declares token values, services, and deferred services. Values
//! bind first (into the container's token map); service entries write
//! metadata into the process-wide registry. Dependencies declared through
//! a closure are never evaluated during application; only array-form
//! dependency lists participate in the synchronous cycle pre-check.

use crate::container::container::Container;
use crate::container::dependency::{DependencyExpr, DependencyKind};
use crate::container::key::{ServiceCtor, ServiceInstance, ServiceKey};
use crate::container::lazy::Lazy;
use crate::container::registry::{dependencies_registry, DependenciesThunk, ServiceRegistration};
use crate::container::scope::ServiceScope;
use crate::container::tokens::{Token, TokenRef};
use crate::errors::CoreError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Dependency declaration of a provider-declared service
#[derive(Clone, Default)]
pub enum ProviderDependencies {
    #[default]
    None,
    /// Array form: inspectable, participates in the cycle pre-check
    Listed(Vec<DependencyExpr>),
    /// Closure form: evaluated only at resolution time, skipped by the
    /// cycle pre-check to avoid premature evaluation
    Thunk(DependenciesThunk),
}

/// A service declared by a provider block
#[derive(Clone)]
pub struct ProviderService {
    ctor: ServiceCtor,
    scope: ServiceScope,
    dependencies: ProviderDependencies,
}

impl ProviderService {
    pub fn new(ctor: ServiceCtor, scope: ServiceScope) -> Self {
        Self {
            ctor,
            scope,
            dependencies: ProviderDependencies::None,
        }
    }

    pub fn with_dependency_list(mut self, dependencies: Vec<DependencyExpr>) -> Self {
        self.dependencies = ProviderDependencies::Listed(dependencies);
        self
    }

    pub fn with_dependencies_thunk<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> Vec<DependencyExpr> + Send + Sync + 'static,
    {
        self.dependencies = ProviderDependencies::Thunk(Arc::new(thunk));
        self
    }
}

/// A deferred service declared by a provider block: a placeholder
/// constructor plus the factory importer that fetches the real one
#[derive(Clone)]
pub struct ProviderDeferredService {
    ctor: ServiceCtor,
    scope: ServiceScope,
    factory: Lazy,
    dependencies: ProviderDependencies,
}

impl ProviderDeferredService {
    pub fn new(ctor: ServiceCtor, scope: ServiceScope, factory: Lazy) -> Self {
        Self {
            ctor: ctor.as_provider_placeholder(),
            scope,
            factory,
            dependencies: ProviderDependencies::None,
        }
    }

    pub fn with_dependency_list(mut self, dependencies: Vec<DependencyExpr>) -> Self {
        self.dependencies = ProviderDependencies::Listed(dependencies);
        self
    }

    pub fn with_dependencies_thunk<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> Vec<DependencyExpr> + Send + Sync + 'static,
    {
        self.dependencies = ProviderDependencies::Thunk(Arc::new(thunk));
        self
    }
}

/// A block of user wiring: token values plus service declarations
#[derive(Default)]
pub struct ProviderBlock {
    values: Vec<(TokenRef, ServiceInstance)>,
    services: Vec<ProviderService>,
    deferred_services: Vec<ProviderDeferredService>,
}

impl ProviderBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a token value
    pub fn value<T: Send + Sync + 'static>(mut self, token: &Token<T>, value: T) -> Self {
        self.values.push((token.to_ref(), Arc::new(value)));
        self
    }

    pub fn service(mut self, service: ProviderService) -> Self {
        self.services.push(service);
        self
    }

    pub fn deferred_service(mut self, service: ProviderDeferredService) -> Self {
        self.deferred_services.push(service);
        self
    }
}

/// Apply provider blocks to a container: values first, then service and
/// deferred-service registrations, after the cycle pre-check passes.
pub fn apply_providers(
    container: &Container,
    blocks: Vec<ProviderBlock>,
) -> Result<(), CoreError> {
    let mut declared: HashMap<ServiceKey, Vec<ServiceKey>> = HashMap::new();
    let mut names: HashMap<ServiceKey, &'static str> = HashMap::new();

    for block in &blocks {
        for service in &block.services {
            record_edges(&mut declared, &mut names, &service.ctor, &service.dependencies);
        }
        for service in &block.deferred_services {
            record_edges(&mut declared, &mut names, &service.ctor, &service.dependencies);
        }
    }
    detect_declared_cycles(&declared, &names)?;

    let registry = dependencies_registry();
    for block in blocks {
        for (token, value) in block.values {
            container.provide_value_raw(token, value)?;
        }
        for service in block.services {
            let registration = ServiceRegistration::new(service.ctor, service.scope);
            registry.insert(attach_dependencies(registration, service.dependencies))?;
        }
        for service in block.deferred_services {
            let registration = ServiceRegistration::new(service.ctor, service.scope)
                .with_factory(service.factory);
            registry.insert(attach_dependencies(registration, service.dependencies))?;
        }
    }

    Ok(())
}

fn attach_dependencies(
    registration: ServiceRegistration,
    dependencies: ProviderDependencies,
) -> ServiceRegistration {
    match dependencies {
        ProviderDependencies::None => registration,
        ProviderDependencies::Listed(list) => registration.with_dependency_list(list),
        ProviderDependencies::Thunk(thunk) => {
            registration.with_dependencies(move || thunk())
        }
    }
}

fn record_edges(
    declared: &mut HashMap<ServiceKey, Vec<ServiceKey>>,
    names: &mut HashMap<ServiceKey, &'static str>,
    ctor: &ServiceCtor,
    dependencies: &ProviderDependencies,
) {
    let key = ctor.key();
    names.insert(key, key.short_name());
    let edges = match dependencies {
        ProviderDependencies::Listed(list) => list
            .iter()
            .filter_map(|dependency| match dependency.kind() {
                DependencyKind::Service(ctor) => Some(ctor.key()),
                DependencyKind::Key(key) => Some(*key),
                _ => None,
            })
            .collect(),
        // closure-form lists are deliberately not evaluated here
        _ => Vec::new(),
    };
    declared.insert(key, edges);
}

/// Depth-first cycle detection over array-form dependencies, restricted
/// to provider-declared constructors.
fn detect_declared_cycles(
    declared: &HashMap<ServiceKey, Vec<ServiceKey>>,
    names: &HashMap<ServiceKey, &'static str>,
) -> Result<(), CoreError> {
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();
    let mut path = Vec::new();

    for key in declared.keys() {
        if !visited.contains(key) {
            cycle_dfs(*key, declared, names, &mut visited, &mut in_progress, &mut path)?;
        }
    }
    Ok(())
}

fn cycle_dfs(
    key: ServiceKey,
    declared: &HashMap<ServiceKey, Vec<ServiceKey>>,
    names: &HashMap<ServiceKey, &'static str>,
    visited: &mut HashSet<ServiceKey>,
    in_progress: &mut HashSet<ServiceKey>,
    path: &mut Vec<ServiceKey>,
) -> Result<(), CoreError> {
    if in_progress.contains(&key) {
        path.push(key);
        let rendered = path
            .iter()
            .map(|key| *names.get(key).unwrap_or(&key.short_name()))
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(CoreError::circular(rendered));
    }
    if visited.contains(&key) {
        return Ok(());
    }

    in_progress.insert(key);
    path.push(key);

    if let Some(edges) = declared.get(&key) {
        for edge in edges {
            // only edges into other provider-declared constructors matter
            if declared.contains_key(edge) {
                cycle_dfs(*edge, declared, names, visited, in_progress, path)?;
            }
        }
    }

    path.pop();
    in_progress.remove(&key);
    visited.insert(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::tokens::create_token;
    use serial_test::serial;
    use std::sync::Arc;

    struct Cache;
    struct Sessions;

    #[tokio::test]
    #[serial]
    async fn test_values_bind_before_services() {
        struct Settings {
            region: Arc<String>,
        }

        let region = create_token::<String>("region");
        let token_for_deps = region.clone();
        let block = ProviderBlock::new()
            .value(&region, "eu-west-1".to_string())
            .service(
                ProviderService::new(
                    ServiceCtor::new::<Settings, _>(|mut args| {
                        Ok(Settings {
                            region: args.take()?,
                        })
                    }),
                    ServiceScope::Singleton,
                )
                .with_dependency_list(vec![DependencyExpr::token(&token_for_deps)]),
            );

        let container = Container::new();
        apply_providers(&container, vec![block]).unwrap();

        let settings = container.get::<Settings>().await.unwrap();
        assert_eq!(settings.region.as_str(), "eu-west-1");
    }

    #[test]
    fn test_array_form_cycles_are_reported() {
        let block = ProviderBlock::new()
            .service(
                ProviderService::new(
                    ServiceCtor::new::<Cache, _>(|_| Ok(Cache)),
                    ServiceScope::Singleton,
                )
                .with_dependency_list(vec![DependencyExpr::key::<Sessions>()]),
            )
            .service(
                ProviderService::new(
                    ServiceCtor::new::<Sessions, _>(|_| Ok(Sessions)),
                    ServiceScope::Singleton,
                )
                .with_dependency_list(vec![DependencyExpr::key::<Cache>()]),
            );

        let container = Container::new();
        let error = apply_providers(&container, vec![block]).unwrap_err();
        assert!(error.is_circular());
    }

    #[test]
    #[serial]
    fn test_closure_form_dependencies_are_not_evaluated_during_application() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static EVALUATED: AtomicBool = AtomicBool::new(false);

        struct Later;

        let block = ProviderBlock::new().service(
            ProviderService::new(
                ServiceCtor::new::<Later, _>(|_| Ok(Later)),
                ServiceScope::Transient,
            )
            .with_dependencies_thunk(|| {
                EVALUATED.store(true, Ordering::SeqCst);
                Vec::new()
            }),
        );

        let container = Container::new();
        apply_providers(&container, vec![block]).unwrap();
        assert!(!EVALUATED.load(Ordering::SeqCst));
    }
}
