//! The resolution container.
//!
//! A container owns the mutable resolution state: the singleton cache,
//! pending-creation slots, token values, instance overrides, and the
//! memoized metadata view of the process-wide registry. Resolution is
//! cooperative: the only suspension points are deferred importers,
//! pending singleton creations, and retry backoff sleeps.

use crate::container::dependency::{DependencyExpr, DependencyKind};
use crate::container::identifiers::{identifier_registry, ServiceIdentifier};
use crate::container::key::{ResolvedDependencies, ServiceCtor, ServiceInstance, ServiceKey};
use crate::container::lazy::Lazy;
use crate::container::registry::{dependencies_registry, ServiceRegistration};
use crate::container::tokens::{Token, TokenId, TokenRef};
use crate::errors::CoreError;
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

type SharedCreation = Shared<BoxFuture<'static, Result<ServiceInstance, Arc<CoreError>>>>;

#[derive(Clone)]
enum SingletonSlot {
    Ready(ServiceInstance),
    Pending(SharedCreation),
}

enum ResolveRequest {
    Ctor(ServiceCtor),
    Key(ServiceKey),
}

impl ResolveRequest {
    fn key(&self) -> ServiceKey {
        match self {
            Self::Ctor(ctor) => ctor.key(),
            Self::Key(key) => *key,
        }
    }
}

/// Resolution path used for cycle detection and error reporting
#[derive(Clone, Default)]
struct ResolutionStack {
    frames: Vec<ServiceKey>,
}

impl ResolutionStack {
    fn contains(&self, key: &ServiceKey) -> bool {
        self.frames.contains(key)
    }

    fn push(&self, key: ServiceKey) -> Self {
        let mut frames = self.frames.clone();
        frames.push(key);
        Self { frames }
    }

    fn path(&self) -> String {
        self.frames
            .iter()
            .map(|key| key.short_name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn path_with(&self, key: ServiceKey) -> String {
        if self.frames.is_empty() {
            key.short_name().to_string()
        } else {
            format!("{} -> {}", self.path(), key.short_name())
        }
    }
}

struct ContainerState {
    singletons: Mutex<HashMap<ServiceKey, SingletonSlot>>,
    token_values: RwLock<HashMap<TokenId, ServiceInstance>>,
    overrides: RwLock<HashMap<ServiceKey, ServiceInstance>>,
    metadata_cache: RwLock<HashMap<ServiceKey, Option<Arc<ServiceRegistration>>>>,
    factory_warned: Mutex<HashSet<ServiceKey>>,
}

/// The resolution container
#[derive(Clone)]
pub struct Container {
    state: Arc<ContainerState>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ContainerState {
                singletons: Mutex::new(HashMap::new()),
                token_values: RwLock::new(HashMap::new()),
                overrides: RwLock::new(HashMap::new()),
                metadata_cache: RwLock::new(HashMap::new()),
                factory_warned: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Resolve a registered service by type
    pub async fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, CoreError> {
        let key = ServiceKey::of::<T>();
        let instance = self
            .resolve_inner(ResolveRequest::Key(key), ResolutionStack::default(), false)
            .await?;
        instance
            .downcast::<T>()
            .map_err(|_| CoreError::InstanceTypeMismatch {
                service: std::any::type_name::<T>().to_string(),
            })
    }

    /// Resolve a service through a constructor value. Unregistered
    /// constructors get default metadata: transient, no dependencies.
    pub async fn get_ctor(&self, ctor: &ServiceCtor) -> Result<ServiceInstance, CoreError> {
        self.resolve_inner(
            ResolveRequest::Ctor(ctor.clone()),
            ResolutionStack::default(),
            false,
        )
        .await
    }

    /// Resolve a service through its stable identifier
    pub async fn get_by_identifier(
        &self,
        identifier: &ServiceIdentifier,
    ) -> Result<ServiceInstance, CoreError> {
        let ctor = identifier_registry()
            .constructor_for(identifier)
            .ok_or_else(|| CoreError::no_service(identifier.description()))?;
        self.resolve_inner(ResolveRequest::Ctor(ctor), ResolutionStack::default(), true)
            .await
    }

    /// Provide a value for a token
    pub fn provide_value<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        value: T,
    ) -> Result<(), CoreError> {
        self.provide_value_raw(token.to_ref(), Arc::new(value))
    }

    pub(crate) fn provide_value_raw(
        &self,
        token: TokenRef,
        value: ServiceInstance,
    ) -> Result<(), CoreError> {
        let mut values = self
            .state
            .token_values
            .write()
            .map_err(|_| CoreError::LockError {
                resource: "token_values".to_string(),
            })?;
        values.insert(token.id, value);
        Ok(())
    }

    /// Read a token's provided value; fails if absent
    pub fn get_token<T: Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Arc<T>, CoreError> {
        self.try_get_token(token)
            .ok_or_else(|| CoreError::missing_token(token.description(), ""))
    }

    /// Read a token's provided value, if any
    pub fn try_get_token<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Option<Arc<T>> {
        let values = self.state.token_values.read().ok()?;
        let value = values.get(&token.id())?.clone();
        value.downcast::<T>().ok()
    }

    /// Pin an instance: resolution returns it without constructing
    /// dependencies, and the singleton slot is marked as satisfied.
    pub fn override_instance<T: Send + Sync + 'static>(
        &self,
        instance: T,
    ) -> Result<(), CoreError> {
        let key = ServiceKey::of::<T>();
        let instance: ServiceInstance = Arc::new(instance);
        {
            let mut overrides = self
                .state
                .overrides
                .write()
                .map_err(|_| CoreError::LockError {
                    resource: "instance_overrides".to_string(),
                })?;
            overrides.insert(key, instance.clone());
        }
        let mut slots = self.lock_singletons()?;
        slots.insert(key, SingletonSlot::Ready(instance));
        Ok(())
    }

    fn lock_singletons(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ServiceKey, SingletonSlot>>, CoreError> {
        self.state.singletons.lock().map_err(|_| CoreError::LockError {
            resource: "singleton_slots".to_string(),
        })
    }

    fn override_for(&self, key: &ServiceKey) -> Option<ServiceInstance> {
        let overrides = self.state.overrides.read().ok()?;
        overrides.get(key).cloned()
    }

    /// Registry lookup, memoized per container
    fn metadata(&self, key: &ServiceKey) -> Option<Arc<ServiceRegistration>> {
        if let Ok(cache) = self.state.metadata_cache.read() {
            if let Some(cached) = cache.get(key) {
                return cached.clone();
            }
        }
        let registration = dependencies_registry().get(key);
        if let Ok(mut cache) = self.state.metadata_cache.write() {
            cache.insert(*key, registration.clone());
        }
        registration
    }

    async fn resolve_inner(
        &self,
        request: ResolveRequest,
        stack: ResolutionStack,
        via_identifier: bool,
    ) -> Result<ServiceInstance, CoreError> {
        let key = request.key();

        if let Some(instance) = self.override_for(&key) {
            return Ok(instance);
        }

        if stack.contains(&key) {
            return Err(CoreError::circular(stack.path_with(key)));
        }

        let registration = self.metadata(&key);
        let ctor = match registration.as_ref() {
            Some(registration) => registration.ctor().clone(),
            None => match request {
                ResolveRequest::Ctor(ctor) => ctor,
                ResolveRequest::Key(key) => {
                    return Err(CoreError::no_service(key.type_name()));
                }
            },
        };
        let scope = registration
            .as_ref()
            .map(|registration| registration.scope())
            .unwrap_or_default();

        if !scope.is_singleton() {
            return self
                .create_instance(ctor, registration, stack, via_identifier)
                .await;
        }

        enum SlotAction {
            Ready(ServiceInstance),
            Wait(SharedCreation),
            Create(SharedCreation),
        }

        let action = {
            let mut slots = self.lock_singletons()?;
            let existing = slots.get(&key).cloned();
            match existing {
                Some(SingletonSlot::Ready(instance)) => SlotAction::Ready(instance),
                Some(SingletonSlot::Pending(shared)) => SlotAction::Wait(shared),
                None => {
                    let container = self.clone();
                    let creation_stack = stack.clone();
                    let shared: SharedCreation = async move {
                        container
                            .create_instance(ctor, registration, creation_stack, via_identifier)
                            .await
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    slots.insert(key, SingletonSlot::Pending(shared.clone()));
                    SlotAction::Create(shared)
                }
            }
        };

        match action {
            SlotAction::Ready(instance) => Ok(instance),
            SlotAction::Wait(shared) => shared.await.map_err(Self::unwrap_shared_error),
            SlotAction::Create(shared) => {
                let result = shared.await;
                let mut slots = self.lock_singletons()?;
                match &result {
                    Ok(instance) => {
                        if matches!(slots.get(&key), Some(SingletonSlot::Pending(_))) {
                            slots.insert(key, SingletonSlot::Ready(instance.clone()));
                        }
                    }
                    Err(_) => {
                        // failed creation never poisons the slot
                        if matches!(slots.get(&key), Some(SingletonSlot::Pending(_))) {
                            slots.remove(&key);
                        }
                    }
                }
                drop(slots);
                result.map_err(Self::unwrap_shared_error)
            }
        }
    }

    fn unwrap_shared_error(source: Arc<CoreError>) -> CoreError {
        match Arc::try_unwrap(source) {
            Ok(error) => error,
            Err(source) => CoreError::PendingCreation { source },
        }
    }

    async fn create_instance(
        &self,
        ctor: ServiceCtor,
        registration: Option<Arc<ServiceRegistration>>,
        stack: ResolutionStack,
        via_identifier: bool,
    ) -> Result<ServiceInstance, CoreError> {
        let key = ctor.key();
        let path = stack.path_with(key);

        let effective_ctor = match registration.as_ref().and_then(|r| r.factory()) {
            Some(factory) => {
                self.warn_factory_resolution(&ctor, via_identifier);
                factory.load().await.map_err(|error| error.with_path(&path))?
            }
            None => ctor,
        };

        let stack = stack.push(key);
        let dependencies = registration
            .as_ref()
            .map(|registration| registration.dependencies())
            .unwrap_or_default();

        tracing::debug!(
            service = effective_ctor.type_name(),
            dependency_count = dependencies.len(),
            "constructing service"
        );

        let futures: Vec<_> = dependencies
            .into_iter()
            .enumerate()
            .map(|(position, dependency)| self.resolve_dependency(dependency, position, stack.clone()))
            .collect();
        let values = try_join_all(futures).await?;

        effective_ctor
            .construct(ResolvedDependencies::new(effective_ctor.type_name(), values))
            .map_err(|error| error.with_path(&path))
    }

    fn resolve_dependency(
        &self,
        dependency: DependencyExpr,
        position: usize,
        stack: ResolutionStack,
    ) -> BoxFuture<'static, Result<ServiceInstance, CoreError>> {
        let container = self.clone();
        async move {
            match dependency.into_kind() {
                DependencyKind::Service(ctor) => {
                    container
                        .resolve_inner(ResolveRequest::Ctor(ctor), stack, false)
                        .await
                }
                DependencyKind::Key(key) => {
                    container
                        .resolve_inner(ResolveRequest::Key(key), stack, false)
                        .await
                }
                DependencyKind::Deferred(lazy) => {
                    container.resolve_deferred(lazy, stack).await
                }
                DependencyKind::Token(token) => container.resolve_token(&token, &stack),
                DependencyKind::Unresolved(name) => Err(CoreError::no_service(name)),
                DependencyKind::Opaque { value, type_tag } => {
                    if let Some(lazy) = value.downcast_ref::<Lazy>() {
                        container.resolve_deferred(lazy.clone(), stack).await
                    } else if let Some(ctor) = value.downcast_ref::<ServiceCtor>() {
                        container
                            .resolve_inner(ResolveRequest::Ctor(ctor.clone()), stack, false)
                            .await
                    } else if let Some(key) = value.downcast_ref::<ServiceKey>() {
                        container
                            .resolve_inner(ResolveRequest::Key(*key), stack, false)
                            .await
                    } else {
                        Err(CoreError::InvalidDependency {
                            position,
                            type_tag: type_tag.to_string(),
                            path: stack.path(),
                        })
                    }
                }
            }
        }
        .boxed()
    }

    async fn resolve_deferred(
        &self,
        lazy: Lazy,
        stack: ResolutionStack,
    ) -> Result<ServiceInstance, CoreError> {
        let path = stack.path();
        let ctor = lazy.load().await.map_err(|error| error.with_path(&path))?;
        self.resolve_inner(ResolveRequest::Ctor(ctor), stack, false)
            .await
    }

    fn resolve_token(
        &self,
        token: &TokenRef,
        stack: &ResolutionStack,
    ) -> Result<ServiceInstance, CoreError> {
        let values = self
            .state
            .token_values
            .read()
            .map_err(|_| CoreError::LockError {
                resource: "token_values".to_string(),
            })?;
        values
            .get(&token.id)
            .cloned()
            .ok_or_else(|| CoreError::missing_token(token.description.as_ref(), stack.path()))
    }

    fn warn_factory_resolution(&self, ctor: &ServiceCtor, via_identifier: bool) {
        if via_identifier || ctor.is_provider_placeholder() {
            return;
        }
        if let Ok(mut warned) = self.state.factory_warned.lock() {
            if warned.insert(ctor.key()) {
                tracing::warn!(
                    service = ctor.type_name(),
                    "factory-backed service resolved through its placeholder constructor; resolve it by identifier instead"
                );
            }
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::registry::ServiceRegistration;
    use crate::container::tokens::create_token;
    use serial_test::serial;

    struct Config {
        url: String,
    }

    struct Database {
        config: Arc<Config>,
    }

    struct UserService {
        db: Arc<Database>,
    }

    fn register_config_chain() {
        let registry = dependencies_registry();
        registry
            .insert(
                ServiceRegistration::singleton(ServiceCtor::new::<Config, _>(|_| {
                    Ok(Config {
                        url: "postgres://localhost".to_string(),
                    })
                })),
            )
            .unwrap();
        registry
            .insert(
                ServiceRegistration::singleton(ServiceCtor::new::<Database, _>(|mut args| {
                    Ok(Database { config: args.take()? })
                }))
                .with_dependencies(|| vec![DependencyExpr::key::<Config>()]),
            )
            .unwrap();
        registry
            .insert(
                ServiceRegistration::transient(ServiceCtor::new::<UserService, _>(|mut args| {
                    Ok(UserService { db: args.take()? })
                }))
                .with_dependencies(|| vec![DependencyExpr::key::<Database>()]),
            )
            .unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn test_singleton_chain_shares_instances() {
        register_config_chain();
        let container = Container::new();

        let db = container.get::<Database>().await.unwrap();
        let users = container.get::<UserService>().await.unwrap();

        assert!(Arc::ptr_eq(&users.db, &db));
        assert_eq!(db.config.url, "postgres://localhost");

        let db_again = container.get::<Database>().await.unwrap();
        assert!(Arc::ptr_eq(&db, &db_again));
    }

    #[tokio::test]
    #[serial]
    async fn test_transient_services_are_fresh_per_resolution() {
        register_config_chain();
        let container = Container::new();

        let first = container.get::<UserService>().await.unwrap();
        let second = container.get::<UserService>().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        // transient services still share their singleton dependencies
        assert!(Arc::ptr_eq(&first.db, &second.db));
    }

    #[tokio::test]
    #[serial]
    async fn test_concurrent_singleton_resolution_constructs_once() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CONSTRUCTIONS: AtomicU32 = AtomicU32::new(0);

        struct Slow;

        dependencies_registry()
            .insert(ServiceRegistration::singleton(ServiceCtor::new::<Slow, _>(
                |_| {
                    CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
                    Ok(Slow)
                },
            )))
            .unwrap();

        let container = Container::new();
        let (a, b) = tokio::join!(container.get::<Slow>(), container.get::<Slow>());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_singleton_creation_does_not_poison_the_slot() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        struct Flaky;

        dependencies_registry()
            .insert(ServiceRegistration::singleton(ServiceCtor::new::<Flaky, _>(
                |_| {
                    if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CoreError::provider("first construction fails"))
                    } else {
                        Ok(Flaky)
                    }
                },
            )))
            .unwrap();

        let container = Container::new();
        assert!(container.get::<Flaky>().await.is_err());
        assert!(container.get::<Flaky>().await.is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[serial]
    async fn test_cycle_detection_names_the_path() {
        #[derive(Debug)]
        struct CycleA;
        struct CycleB;

        let registry = dependencies_registry();
        registry
            .insert(
                ServiceRegistration::transient(ServiceCtor::new::<CycleA, _>(|_| Ok(CycleA)))
                    .with_dependencies(|| vec![DependencyExpr::key::<CycleB>()]),
            )
            .unwrap();
        registry
            .insert(
                ServiceRegistration::transient(ServiceCtor::new::<CycleB, _>(|_| Ok(CycleB)))
                    .with_dependencies(|| vec![DependencyExpr::key::<CycleA>()]),
            )
            .unwrap();

        let container = Container::new();
        let error = container.get::<CycleA>().await.unwrap_err();
        assert!(error.is_circular());
        assert!(error.to_string().contains("CycleA -> CycleB -> CycleA"));
    }

    #[tokio::test]
    #[serial]
    async fn test_token_dependency_resolves_to_the_provided_value() {
        #[derive(Debug)]
        struct Api {
            base_url: Arc<String>,
        }

        let base_url = create_token::<String>("api-base-url");
        let token_for_registration = base_url.clone();
        dependencies_registry()
            .insert(
                ServiceRegistration::transient(ServiceCtor::new::<Api, _>(|mut args| {
                    Ok(Api {
                        base_url: args.take()?,
                    })
                }))
                .with_dependencies(move || vec![DependencyExpr::token(&token_for_registration)]),
            )
            .unwrap();

        let container = Container::new();
        let error = container.get::<Api>().await.unwrap_err();
        assert!(error.is_missing_token());

        container
            .provide_value(&base_url, "https://api.example.com".to_string())
            .unwrap();
        let api = container.get::<Api>().await.unwrap();
        assert_eq!(api.base_url.as_str(), "https://api.example.com");
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_dependency_reports_the_type_tag() {
        #[derive(Debug)]
        struct Broken;

        dependencies_registry()
            .insert(
                ServiceRegistration::transient(ServiceCtor::new::<Broken, _>(|_| Ok(Broken)))
                    .with_dependencies(|| vec![DependencyExpr::value(42_u32)]),
            )
            .unwrap();

        let container = Container::new();
        let error = container.get::<Broken>().await.unwrap_err();
        match error {
            CoreError::InvalidDependency { type_tag, position, .. } => {
                assert_eq!(type_tag, "u32");
                assert_eq!(position, 0);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_override_instance_skips_construction() {
        struct Pinned {
            marker: u32,
        }

        let container = Container::new();
        container.override_instance(Pinned { marker: 7 }).unwrap();

        let pinned = container.get::<Pinned>().await.unwrap();
        assert_eq!(pinned.marker, 7);
    }

    #[tokio::test]
    async fn test_get_token_fails_when_absent() {
        let container = Container::new();
        let token = create_token::<u16>("port");
        assert!(container.get_token(&token).is_err());

        container.provide_value(&token, 8080).unwrap();
        assert_eq!(*container.get_token(&token).unwrap(), 8080);
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_with_no_service() {
        #[derive(Debug)]
        struct Nowhere;

        let container = Container::new();
        let error = container.get::<Nowhere>().await.unwrap_err();
        assert!(error.is_no_service());
    }
}
