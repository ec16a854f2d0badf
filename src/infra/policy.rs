//! Deployment-derived storage policy
//!
//! Built once at startup and handed to [`super::TieredProofStore`]. This is
//! the only place the deployment environment influences tier selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ProvenanceError, Result};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            other => Err(ProvenanceError::Configuration(format!(
                "unknown APP_ENV {other:?} (expected production or development)"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Development => f.write_str("development"),
        }
    }
}

/// Fail-closed versus fail-open choice for the secondary tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePolicy {
    environment: Environment,
}

impl StoragePolicy {
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
        }
    }

    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Read `APP_ENV`. Unset means production.
    pub fn from_env() -> Result<Self> {
        match std::env::var("APP_ENV") {
            Ok(v) => Ok(Self::new(v.parse()?)),
            Err(_) => Ok(Self::production()),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether the secondary tier may be read or written at all
    pub fn secondary_allowed(&self) -> bool {
        !self.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" Development ".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_secondary_gate() {
        assert!(!StoragePolicy::production().secondary_allowed());
        assert!(StoragePolicy::development().secondary_allowed());
    }
}
