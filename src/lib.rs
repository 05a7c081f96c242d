// src/lib.rs

//! # pig-gateway
//!
//! A thin HTTP gateway in front of PostgreSQL stored procedures. Each
//! request is authenticated by its `apikey` header, mapped to one
//! procedure in a configured schema, and answered with exactly the status
//! code and JSON payload that procedure returned.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pig_gateway::config::GatewayConfig;
//! use pig_gateway::storage::{migrations::apply_migrations, postgres::PostgresGateway};
//! use std::{path::Path, sync::Arc};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::default();
//!     let gateway = PostgresGateway::new(config.database.clone(), &config.gateway.schema)?;
//!
//!     let pool = gateway.handle().await?;
//!     apply_migrations(pool, Path::new(&config.gateway.migrations_dir)).await?;
//!
//!     pig_gateway::web::start_server(&config.server, Arc::new(gateway)).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod storage;
pub mod web;

pub use api::auth::CallerIdentity;
pub use error::GatewayError;
pub use storage::{ProcedureCall, ProcedureGateway, ProcedureResult};

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
