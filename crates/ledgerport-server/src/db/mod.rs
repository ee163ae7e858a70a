//! PostgreSQL access

pub mod imports;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// Requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("{0}")]
    Duplicate(String),

    /// Optimistic version check or write-once guard failed
    #[error("{0}")]
    Conflict(String),

    /// Stored value could not be mapped back into a domain type
    #[error("Stored data is invalid: {0}")]
    Decode(String),
}

impl DbError {
    pub fn not_found(resource_type: &str, identifier: &str) -> Self {
        Self::NotFound(format!("{} '{}' not found in database", resource_type, identifier))
    }

    pub fn duplicate(resource_type: &str, identifier: &str) -> Self {
        Self::Duplicate(format!("{} '{}' already exists", resource_type, identifier))
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Kind of constraint a failed statement tripped
#[derive(Debug)]
pub enum ConstraintViolation {
    /// Unique constraint, with its name when the server reported one
    Unique(Option<String>),
    ForeignKey(Option<String>),
    Other(sqlx::Error),
}

pub fn check_constraint_violation(error: sqlx::Error) -> ConstraintViolation {
    if let sqlx::Error::Database(ref db_err) = error {
        let constraint = db_err.constraint().map(str::to_string);
        if db_err.is_unique_violation() {
            return ConstraintViolation::Unique(constraint);
        }
        if db_err.is_foreign_key_violation() {
            return ConstraintViolation::ForeignKey(constraint);
        }
    }
    ConstraintViolation::Other(error)
}

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    if config.url.is_empty() {
        return Err(DbError::Config("DATABASE_URL not set".to_string()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
