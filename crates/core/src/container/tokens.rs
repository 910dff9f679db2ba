//! Value tokens for injecting non-service values.
//!
//! A token is an opaque handle carrying a unique id and a human-readable
//! description. Tokens are never resolvable as services; they only yield
//! values explicitly provided on a container through
//! [`Container::provide_value`](crate::container::Container::provide_value).

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a token, independent of its description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(u64);

/// An opaque, typed handle for an injected value
pub struct Token<T> {
    id: TokenId,
    description: Arc<str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Token<T> {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn to_ref(&self) -> TokenRef {
        TokenRef {
            id: self.id,
            description: self.description.clone(),
        }
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            description: self.description.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.description)
    }
}

/// Create a token for a value of type `T`.
///
/// Every call mints a distinct identity; two tokens with the same
/// description are still different tokens.
pub fn create_token<T>(description: impl Into<String>) -> Token<T> {
    let id = TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::SeqCst));
    let description = description.into();
    let description = if description.is_empty() {
        format!("token#{}", id.0)
    } else {
        description
    };
    Token {
        id,
        description: Arc::from(description),
        _marker: PhantomData,
    }
}

/// Type-erased token reference carried inside dependency expressions
#[derive(Clone)]
pub(crate) struct TokenRef {
    pub(crate) id: TokenId,
    pub(crate) description: Arc<str>,
}

impl fmt::Debug for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenRef({})", self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_per_creation() {
        let a = create_token::<String>("config");
        let b = create_token::<String>("config");

        assert_ne!(a.id(), b.id());
        assert_eq!(a.description(), b.description());
    }

    #[test]
    fn test_clones_share_identity() {
        let token = create_token::<u32>("port");
        let clone = token.clone();
        assert_eq!(token.id(), clone.id());
    }

    #[test]
    fn test_empty_description_gets_a_stable_default() {
        let token = create_token::<u32>("");
        assert!(token.description().starts_with("token#"));
    }
}
