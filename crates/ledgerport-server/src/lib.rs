//! Ledgerport Server Library
//!
//! HTTP backend for importing bank statements into a personal ledger.
//!
//! # Overview
//!
//! A statement import moves through two handoffs:
//!
//! - **Upload**: `prepare` reserves an import batch and returns a presigned
//!   URL; the client PUTs the file straight to object storage and then calls
//!   `confirm`, which verifies the object and records its SHA-256.
//! - **Processing**: a worker stages the parsed records as rows, advances
//!   each row to exactly one disposition and closes the batch.
//!
//! Batches and rows are state machines (see [`imports::status`]); every
//! transition outside their tables is refused, and terminal entities are
//! immutable.
//!
//! # Architecture
//!
//! - [`imports`]: domain types and the gateway traits they depend on
//! - [`features`]: CQRS command/query slices and their axum routes
//! - [`db`]: PostgreSQL repository (sqlx)
//! - [`storage`]: S3 blob gateway (aws-sdk-s3)
//!
//! ```no_run
//! use ledgerport_server::{config::Config, db};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::health_check(&pool).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod cqrs;
pub mod db;
pub mod error;
pub mod features;
pub mod imports;
pub mod middleware;
pub mod storage;

pub use error::{ImportError, ImportResult};
