//! Stable service identifiers.
//!
//! An identifier is an opaque, interned handle standing in for a service
//! constructor. Identifiers survive renaming, minification, and crate
//! boundaries: two calls to [`ServiceIdentifier::for_key`] with the same
//! key yield the same identity, no matter which module makes them.

use crate::container::key::{ServiceCtor, ServiceKey};
use crate::errors::CoreError;
use once_cell::sync::Lazy as OnceLazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Opaque stable identifier for a service
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentifier {
    description: Arc<str>,
}

static INTERNED: OnceLazy<RwLock<HashMap<String, ServiceIdentifier>>> =
    OnceLazy::new(|| RwLock::new(HashMap::new()));

impl ServiceIdentifier {
    /// Get the interned identifier for a key.
    ///
    /// Same key, same identity — across every module in the process.
    pub fn for_key(key: impl AsRef<str>) -> Self {
        let key = key.as_ref();
        if let Ok(interned) = INTERNED.read() {
            if let Some(identifier) = interned.get(key) {
                return identifier.clone();
            }
        }
        let identifier = Self {
            description: Arc::from(key),
        };
        if let Ok(mut interned) = INTERNED.write() {
            return interned
                .entry(key.to_string())
                .or_insert(identifier)
                .clone();
        }
        identifier
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceIdentifier({})", self.description)
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Process-wide constructor-to-identifier bijection
pub struct IdentifierRegistry {
    by_key: RwLock<HashMap<ServiceKey, ServiceIdentifier>>,
    by_identifier: RwLock<HashMap<ServiceIdentifier, ServiceCtor>>,
}

static IDENTIFIER_REGISTRY: OnceLazy<IdentifierRegistry> = OnceLazy::new(|| IdentifierRegistry {
    by_key: RwLock::new(HashMap::new()),
    by_identifier: RwLock::new(HashMap::new()),
});

/// Get the process-wide identifier registry
pub fn identifier_registry() -> &'static IdentifierRegistry {
    &IDENTIFIER_REGISTRY
}

impl IdentifierRegistry {
    /// Register a constructor, optionally under an explicit identifier.
    ///
    /// Registration is idempotent per constructor: re-registering yields
    /// the canonical identifier from the first call. Binding an identifier
    /// that already names a different constructor is fatal.
    pub fn register(
        &self,
        ctor: &ServiceCtor,
        explicit: Option<ServiceIdentifier>,
    ) -> Result<ServiceIdentifier, CoreError> {
        let key = ctor.key();
        {
            let by_key = self.by_key.read().map_err(|_| CoreError::LockError {
                resource: "identifier_registry".to_string(),
            })?;
            if let Some(canonical) = by_key.get(&key) {
                return Ok(canonical.clone());
            }
        }

        let identifier = explicit
            .unwrap_or_else(|| ServiceIdentifier::for_key(format!("alloy:#{}", ctor.type_name())));

        let mut by_identifier = self.by_identifier.write().map_err(|_| CoreError::LockError {
            resource: "identifier_registry".to_string(),
        })?;
        if let Some(existing) = by_identifier.get(&identifier) {
            if existing.key() != key {
                return Err(CoreError::IdentifierRebound {
                    identifier: identifier.description().to_string(),
                    existing: existing.type_name().to_string(),
                    attempted: ctor.type_name().to_string(),
                });
            }
        }
        by_identifier.insert(identifier.clone(), ctor.clone());

        let mut by_key = self.by_key.write().map_err(|_| CoreError::LockError {
            resource: "identifier_registry".to_string(),
        })?;
        by_key.insert(key, identifier.clone());

        Ok(identifier)
    }

    /// Look up the canonical identifier for a constructor's key
    pub fn identifier_for(&self, key: &ServiceKey) -> Option<ServiceIdentifier> {
        let by_key = self.by_key.read().ok()?;
        by_key.get(key).cloned()
    }

    /// Look up the constructor an identifier is bound to
    pub fn constructor_for(&self, identifier: &ServiceIdentifier) -> Option<ServiceCtor> {
        let by_identifier = self.by_identifier.read().ok()?;
        by_identifier.get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_key.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every binding
    pub fn clear(&self) -> Result<(), CoreError> {
        let mut by_identifier = self.by_identifier.write().map_err(|_| CoreError::LockError {
            resource: "identifier_registry".to_string(),
        })?;
        let mut by_key = self.by_key.write().map_err(|_| CoreError::LockError {
            resource: "identifier_registry".to_string(),
        })?;
        by_identifier.clear();
        by_key.clear();
        Ok(())
    }
}

/// Register a constructor under an explicit identifier in the
/// process-wide registry. This is the call generated wiring modules emit.
pub fn register_service_identifier(
    ctor: &ServiceCtor,
    identifier: ServiceIdentifier,
) -> Result<ServiceIdentifier, CoreError> {
    identifier_registry().register(ctor, Some(identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Billing;
    struct Shipping;

    fn billing_ctor() -> ServiceCtor {
        ServiceCtor::new::<Billing, _>(|_| Ok(Billing))
    }

    #[test]
    fn test_for_key_interns_identities() {
        let a = ServiceIdentifier::for_key("alloy:app/src/billing.rs#Billing");
        let b = ServiceIdentifier::for_key("alloy:app/src/billing.rs#Billing");
        assert_eq!(a, b);

        let c = ServiceIdentifier::for_key("alloy:app/src/shipping.rs#Shipping");
        assert_ne!(a, c);
    }

    #[test]
    fn test_registration_is_idempotent_per_constructor() {
        let registry = identifier_registry();
        let ctor = billing_ctor();

        let first = registry
            .register(&ctor, Some(ServiceIdentifier::for_key("alloy:test#Billing")))
            .unwrap();
        let second = registry.register(&ctor, None).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            registry.constructor_for(&first).unwrap().key(),
            ctor.key()
        );
        assert_eq!(registry.identifier_for(&ctor.key()).unwrap(), first);
    }

    #[test]
    fn test_rebinding_an_identifier_is_fatal() {
        let registry = identifier_registry();
        let identifier = ServiceIdentifier::for_key("alloy:test#rebound");

        registry
            .register(
                &ServiceCtor::new::<Shipping, _>(|_| Ok(Shipping)),
                Some(identifier.clone()),
            )
            .unwrap();

        struct Impostor;
        let result = registry.register(
            &ServiceCtor::new::<Impostor, _>(|_| Ok(Impostor)),
            Some(identifier),
        );
        assert!(matches!(result, Err(CoreError::IdentifierRebound { .. })));
    }
}
