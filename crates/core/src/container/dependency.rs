//! Dependency expressions: the tagged values a registration's
//! dependencies thunk produces.

use crate::container::key::{ServiceCtor, ServiceKey};
use crate::container::lazy::Lazy;
use crate::container::tokens::{Token, TokenRef};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One declared dependency of a service.
///
/// The resolver classifies each expression as a service constructor, a
/// registered key, a deferred import, or a token; anything else fails
/// resolution with an invalid-dependency error naming the value's type.
#[derive(Clone)]
pub struct DependencyExpr {
    kind: DependencyKind,
}

#[derive(Clone)]
pub(crate) enum DependencyKind {
    Service(ServiceCtor),
    Key(ServiceKey),
    Deferred(Lazy),
    Token(TokenRef),
    Unresolved(String),
    Opaque {
        value: Arc<dyn Any + Send + Sync>,
        type_tag: &'static str,
    },
}

impl DependencyExpr {
    /// A dependency carrying its own constructor
    pub fn service(ctor: ServiceCtor) -> Self {
        Self {
            kind: DependencyKind::Service(ctor),
        }
    }

    /// A dependency on a registered service type
    pub fn key<T: Send + Sync + 'static>() -> Self {
        Self {
            kind: DependencyKind::Key(ServiceKey::of::<T>()),
        }
    }

    /// A deferred dependency, fetched at resolution time
    pub fn lazy(lazy: Lazy) -> Self {
        Self {
            kind: DependencyKind::Deferred(lazy),
        }
    }

    /// A token dependency, resolved against the container's value map
    pub fn token<T>(token: &Token<T>) -> Self {
        Self {
            kind: DependencyKind::Token(token.to_ref()),
        }
    }

    /// A dependency known only by name; fails at resolution if reached
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Unresolved(name.into()),
        }
    }

    /// An arbitrary value. The resolver still recognizes boxed
    /// [`ServiceCtor`], [`Lazy`], and [`ServiceKey`] values; everything
    /// else is an invalid dependency.
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        Self {
            kind: DependencyKind::Opaque {
                value: Arc::new(value),
                type_tag: std::any::type_name::<V>(),
            },
        }
    }

    pub(crate) fn into_kind(self) -> DependencyKind {
        self.kind
    }

    pub(crate) fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    /// Human-readable rendering for error messages
    pub fn describe(&self) -> String {
        match &self.kind {
            DependencyKind::Service(ctor) => ctor.key().short_name().to_string(),
            DependencyKind::Key(key) => key.short_name().to_string(),
            DependencyKind::Deferred(lazy) => format!("lazy({})", lazy.target_name()),
            DependencyKind::Token(token) => format!("token({})", token.description),
            DependencyKind::Unresolved(name) => format!("unresolved({})", name),
            DependencyKind::Opaque { type_tag, .. } => format!("value({})", type_tag),
        }
    }
}

impl fmt::Debug for DependencyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DependencyExpr({})", self.describe())
    }
}
