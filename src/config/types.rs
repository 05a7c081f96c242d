// src/config/types.rs

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgSslMode;

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: ProcedureConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0", "127.0.0.1")
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout: u64,
}

/// PostgreSQL connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,

    /// Database name
    pub name: String,

    pub user: String,
    pub password: String,

    /// TLS mode
    pub ssl_mode: SslMode,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub connect_timeout: u64,

    /// Per-procedure-call timeout in seconds (0 = no timeout)
    pub statement_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "pig".to_string(),
            user: "pig".to_string(),
            password: "pig".to_string(),
            ssl_mode: SslMode::Disable,
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            statement_timeout: 10,
        }
    }
}

/// TLS modes accepted by libpq-style connection strings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslMode> for PgSslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

/// Where the callable procedures and the migrations live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureConfig {
    /// Schema every procedure is called in
    pub schema: String,

    /// Directory holding `<version>_<description>.sql` migration files
    pub migrations_dir: String,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            schema: "pig".to_string(),
            migrations_dir: ".".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

/// Log output formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,

    /// Compact format
    Compact,

    /// JSON format for structured logging
    Json,
}

impl GatewayConfig {
    /// Get log level as tracing filter
    pub fn log_filter(&self) -> String {
        format!(
            "pig_gateway={},tower_http={},sqlx=warn",
            self.logging.level, self.logging.level
        )
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.host.is_empty() {
            return Err("Server host cannot be empty".to_string());
        }

        if self.request_timeout == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Database host cannot be empty".to_string());
        }

        if self.name.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }

        if self.user.is_empty() {
            return Err("Database user cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections must be greater than 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("Min connections cannot exceed max connections".to_string());
        }

        Ok(())
    }
}
