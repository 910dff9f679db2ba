use crate::errors::CoreError;
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shared service instance
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

pub(crate) type ConstructFn =
    Arc<dyn Fn(ResolvedDependencies) -> Result<ServiceInstance, CoreError> + Send + Sync>;

/// Stable identity for a service type, used as the registry key.
///
/// Rust classes have no first-class constructor identity, so the runtime
/// keys all of its bookkeeping on an interned-per-type handle instead of
/// the constructor value itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    /// Create the key for a service type
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Get the fully qualified type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Get the unqualified type name, used in resolution-path messages
    pub fn short_name(&self) -> &'static str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.type_name)
    }
}

/// Positional constructor arguments, consumed in dependency-declaration order
pub struct ResolvedDependencies {
    service: &'static str,
    values: VecDeque<ServiceInstance>,
}

impl ResolvedDependencies {
    pub(crate) fn new(service: &'static str, values: Vec<ServiceInstance>) -> Self {
        Self {
            service,
            values: values.into(),
        }
    }

    /// Take the next argument as a typed instance
    pub fn take<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, CoreError> {
        let value = self.take_instance()?;
        value.downcast::<T>().map_err(|_| CoreError::ArgumentMismatch {
            service: self.service.to_string(),
            message: format!("argument is not a {}", std::any::type_name::<T>()),
        })
    }

    /// Take the next argument without downcasting
    pub fn take_instance(&mut self) -> Result<ServiceInstance, CoreError> {
        self.values
            .pop_front()
            .ok_or_else(|| CoreError::ArgumentMismatch {
                service: self.service.to_string(),
                message: "constructor requested more arguments than were declared".to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A service constructor: the stable key coupled with the closure that
/// builds an instance from its resolved dependencies.
#[derive(Clone)]
pub struct ServiceCtor {
    key: ServiceKey,
    construct: ConstructFn,
    provider_placeholder: bool,
}

impl ServiceCtor {
    /// Create a constructor from a closure building the concrete type
    pub fn new<T, F>(construct: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ResolvedDependencies) -> Result<T, CoreError> + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::of::<T>(),
            construct: Arc::new(move |args| Ok(Arc::new(construct(args)?) as ServiceInstance)),
            provider_placeholder: false,
        }
    }

    /// Create a constructor for a type with a no-argument `Default`
    pub fn from_default<T: Default + Send + Sync + 'static>() -> Self {
        Self::new::<T, _>(|_| Ok(T::default()))
    }

    /// Create a placeholder constructor for a deferred service stub.
    ///
    /// The placeholder carries the stable identity of the service but can
    /// never be constructed directly; the real constructor is fetched
    /// through the registration's factory at resolution time.
    pub fn placeholder<T: Send + Sync + 'static>() -> Self {
        let service = std::any::type_name::<T>();
        Self {
            key: ServiceKey::of::<T>(),
            construct: Arc::new(move |_| {
                Err(CoreError::PlaceholderInstantiated {
                    service: service.to_string(),
                })
            }),
            provider_placeholder: false,
        }
    }

    /// Mark this constructor as a provider-declared placeholder, which
    /// suppresses the factory-path resolution warning.
    pub fn as_provider_placeholder(mut self) -> Self {
        self.provider_placeholder = true;
        self
    }

    /// Get the stable key for this constructor
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Get the fully qualified service type name
    pub fn type_name(&self) -> &'static str {
        self.key.type_name()
    }

    pub(crate) fn is_provider_placeholder(&self) -> bool {
        self.provider_placeholder
    }

    pub(crate) fn construct(
        &self,
        args: ResolvedDependencies,
    ) -> Result<ServiceInstance, CoreError> {
        (self.construct)(args)
    }
}

impl fmt::Debug for ServiceCtor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCtor")
            .field("key", &self.key)
            .field("provider_placeholder", &self.provider_placeholder)
            .finish()
    }
}

/// Deferred-importer result wrapper mirroring a module with a default
/// export. An importer may hand back either a [`ServiceCtor`] directly or
/// a `ServiceModule` wrapping one; both behave identically.
pub struct ServiceModule {
    pub default: ServiceCtor,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database {
        url: String,
    }

    impl Database {
        fn new() -> Self {
            Self {
                url: "postgres://localhost".to_string(),
            }
        }
    }

    struct UserService {
        db: Arc<Database>,
    }

    #[test]
    fn test_service_key_identity() {
        let a = ServiceKey::of::<Database>();
        let b = ServiceKey::of::<Database>();
        let c = ServiceKey::of::<UserService>();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.short_name(), "Database");
    }

    #[test]
    fn test_construct_with_positional_arguments() {
        let db_ctor = ServiceCtor::new::<Database, _>(|_| Ok(Database::new()));
        let db = db_ctor
            .construct(ResolvedDependencies::new("Database", Vec::new()))
            .unwrap();
        let db = db.downcast::<Database>().unwrap();
        assert_eq!(db.url, "postgres://localhost");

        let users_ctor = ServiceCtor::new::<UserService, _>(|mut args| {
            Ok(UserService { db: args.take()? })
        });
        let users = users_ctor
            .construct(ResolvedDependencies::new(
                "UserService",
                vec![db.clone() as ServiceInstance],
            ))
            .unwrap();
        let users = users.downcast::<UserService>().unwrap();
        assert!(Arc::ptr_eq(&users.db, &db));
    }

    #[test]
    fn test_take_beyond_declared_arguments_fails() {
        let mut args = ResolvedDependencies::new("Database", Vec::new());
        let result = args.take::<Database>();
        assert!(matches!(result, Err(CoreError::ArgumentMismatch { .. })));
    }

    #[test]
    fn test_placeholder_cannot_be_constructed() {
        struct Deferred;
        let ctor = ServiceCtor::placeholder::<Deferred>();
        let result = ctor.construct(ResolvedDependencies::new("Deferred", Vec::new()));
        assert!(matches!(
            result,
            Err(CoreError::PlaceholderInstantiated { .. })
        ));
    }
}
