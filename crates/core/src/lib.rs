//! # alloy-core — resolution runtime for the alloy DI compiler
//!
//! The compiler half of alloy scans annotated sources and generates a
//! wiring module; that module populates the registries this crate owns.
//! The runtime can also be driven standalone by registering services
//! programmatically, which is how its own tests work.
//!
//! ## Features
//!
//! - **Scoped resolution** — singleton and transient lifetimes, with
//!   creation-once semantics under concurrent first-time resolution
//! - **Cycle detection** — failed resolutions name the full path
//!   (`A -> B -> A`)
//! - **Deferred loading** — `Lazy` importers fetched at resolution time
//!   with retry and exponential backoff
//! - **Stable identifiers** — interned, minification-safe service handles
//!   with a process-wide constructor bijection
//! - **Tokens** — opaque handles injecting non-service values
//! - **Test overlay** — registry snapshot/restore, instance and token
//!   overrides, auto-mock propagation across the dependency graph
//!
//! ## Quick start
//!
//! ```
//! use alloy_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct Database;
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = dependencies_registry();
//! registry.insert(ServiceRegistration::singleton(
//!     ServiceCtor::new::<Database, _>(|_| Ok(Database)),
//! ))?;
//! registry.insert(
//!     ServiceRegistration::transient(ServiceCtor::new::<UserService, _>(|mut args| {
//!         Ok(UserService { db: args.take()? })
//!     }))
//!     .with_dependencies(|| vec![DependencyExpr::key::<Database>()]),
//! )?;
//!
//! let container = Container::new();
//! let users = container.get::<UserService>().await?;
//! let db = container.get::<Database>().await?;
//! assert!(Arc::ptr_eq(&users.db, &db));
//! # Ok::<(), CoreError>(())
//! # }).unwrap();
//! ```

pub mod container;
pub mod errors;
pub mod testing;

pub use container::{
    apply_providers, create_token, dependencies_registry, identifier_registry,
    register_service_identifier, Container, DependenciesRegistry, DependenciesThunk,
    DependencyExpr, IdentifierRegistry, ImporterFuture, Lazy, ProviderBlock,
    ProviderDeferredService, ProviderDependencies, ProviderService, RegistrySnapshot,
    RegistryStats, ResolvedDependencies, RetryPolicy, ServiceCtor, ServiceIdentifier,
    ServiceInstance, ServiceKey, ServiceModule, ServiceRegistration, ServiceScope, Token,
    TokenId,
};
pub use errors::CoreError;

/// Identity helper preserving the shape of a dependency list
pub fn deps<const N: usize>(list: [DependencyExpr; N]) -> Vec<DependencyExpr> {
    list.into()
}

/// Compile-time identity pinning a dependencies thunk to a service type.
///
/// Has no runtime behavior; the `S` parameter exists purely so the call
/// site documents which constructor the thunk feeds.
pub fn assert_deps<S, F>(thunk: F) -> F
where
    F: Fn() -> Vec<DependencyExpr> + Send + Sync,
{
    thunk
}

/// Wrap an asynchronous importer as a deferred dependency
pub fn lazy<F>(importer: F) -> Lazy
where
    F: Fn() -> ImporterFuture + Send + Sync + 'static,
{
    Lazy::new(importer)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::container::{
        apply_providers, create_token, dependencies_registry, register_service_identifier,
        Container, DependencyExpr, Lazy, ProviderBlock, RetryPolicy, ServiceCtor,
        ServiceIdentifier, ServiceKey, ServiceRegistration, ServiceScope, Token,
    };
    pub use crate::errors::CoreError;
    pub use crate::{assert_deps, deps};
}
