use dotenvy::dotenv;
use std::env;

use crate::authz::{AuthzPolicy, DEFAULT_AGGREGATOR_ID, DEFAULT_TRUSTED_WORKER_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub environment: Environment,
    pub trusted_worker_id: String,
    pub aggregator_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        // Anything other than an explicit development value is treated as
        // production: audit fields in create payloads stay rejected.
        let environment = match env::var("ENVIRONMENT").ok().as_deref() {
            Some(v) if v.eq_ignore_ascii_case("development") => Environment::Development,
            _ => Environment::Production,
        };
        let trusted_worker_id = env::var("TRUSTED_WORKER_SYSTEM_ID")
            .unwrap_or_else(|_| DEFAULT_TRUSTED_WORKER_ID.into());
        let aggregator_id =
            env::var("AGGREGATOR_SYSTEM_ID").unwrap_or_else(|_| DEFAULT_AGGREGATOR_ID.into());

        Ok(Self {
            database_url,
            port,
            environment,
            trusted_worker_id,
            aggregator_id,
        })
    }

    pub fn authz_policy(&self) -> AuthzPolicy {
        AuthzPolicy {
            trusted_worker_id: self.trusted_worker_id.clone(),
            aggregator_id: self.aggregator_id.clone(),
        }
    }

    /// Fixture seeding may supply audit fields only outside production.
    pub fn allow_builtin_fields(&self) -> bool {
        self.environment == Environment::Development
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3000,
            environment: Environment::Development,
            trusted_worker_id: DEFAULT_TRUSTED_WORKER_ID.into(),
            aggregator_id: DEFAULT_AGGREGATOR_ID.into(),
        }
    }
}
