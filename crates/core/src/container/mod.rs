#[allow(clippy::module_inception)]
pub mod container;
pub mod dependency;
pub mod identifiers;
pub mod key;
pub mod lazy;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod tokens;

pub use container::Container;
pub use dependency::DependencyExpr;
pub use identifiers::{
    identifier_registry, register_service_identifier, IdentifierRegistry, ServiceIdentifier,
};
pub use key::{ResolvedDependencies, ServiceCtor, ServiceInstance, ServiceKey, ServiceModule};
pub use lazy::{ImporterFuture, Lazy, RetryPolicy};
pub use provider::{
    apply_providers, ProviderBlock, ProviderDeferredService, ProviderDependencies, ProviderService,
};
pub use registry::{
    dependencies_registry, DependenciesRegistry, DependenciesThunk, RegistrySnapshot,
    RegistryStats, ServiceRegistration,
};
pub use scope::ServiceScope;
pub use tokens::{create_token, Token, TokenId};
