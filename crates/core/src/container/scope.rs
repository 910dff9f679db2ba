use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Service lifetime scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceScope {
    /// At most one instance per container, created on first resolution
    Singleton,
    /// A fresh instance on every resolution
    #[default]
    Transient,
}

impl ServiceScope {
    /// Check if this scope caches instances
    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::Singleton)
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

impl FromStr for ServiceScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "singleton" => Ok(Self::Singleton),
            "transient" => Ok(Self::Transient),
            other => Err(CoreError::InvalidServiceScope {
                scope: other.to_string(),
            }),
        }
    }
}
