// src/config/mod.rs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

mod types;

pub use types::*;

use crate::storage::is_valid_identifier;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "pig-gateway.toml";

impl GatewayConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Command line arguments (highest priority, applied by the caller)
    /// 2. Environment variables (`PIG_SERVER__PORT`, `PIG_DATABASE__HOST`, ...)
    /// 3. Configuration file
    /// 4. Default values (lowest priority)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        // Start with defaults
        settings = settings.add_source(config::Config::try_from(&Self::default())?);

        // Load from config file if it exists
        let config_file = config_file_path();
        if config_file.exists() {
            settings = settings.add_source(config::File::from(config_file.as_path()));
        }

        // Override with environment variables (prefix: PIG_)
        settings = settings.add_source(
            config::Environment::with_prefix("PIG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate server and database configuration
        self.server.validate().map_err(anyhow::Error::msg)?;
        self.database.validate().map_err(anyhow::Error::msg)?;

        // Schema and procedure names are spliced into statements

        if !is_valid_identifier(&self.gateway.schema) {
            return Err(anyhow::anyhow!(
                "Schema '{}' is not a plain SQL identifier",
                self.gateway.schema
            ));
        }

        if self.gateway.migrations_dir.is_empty() {
            return Err(anyhow::anyhow!("Migrations directory cannot be empty"));
        }

        Ok(())
    }

    /// Create a development configuration with sensible defaults
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3030,
                request_timeout: 30,
            },
            database: DatabaseConfig::default(),
            gateway: ProcedureConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }

    /// Create a production configuration template
    pub fn production() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3030,
                request_timeout: 60,
            },
            database: DatabaseConfig {
                host: "db.internal".to_string(),
                password: "change-me".to_string(),
                ssl_mode: SslMode::Require,
                max_connections: 20,
                min_connections: 5,
                ..DatabaseConfig::default()
            },
            gateway: ProcedureConfig {
                schema: "pig".to_string(),
                migrations_dir: "/srv/pig/migrations".to_string(),
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
                format: LogFormat::Json,
            },
        }
    }

    /// Export configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse TOML configuration")
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let toml_content = self.to_toml()?;
        std::fs::write(path, toml_content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        Ok(())
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        Self::from_toml(&content)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn config_file_path() -> PathBuf {
    std::env::var("PIG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Helper function to load configuration with better error reporting
pub fn load_config() -> Result<GatewayConfig> {
    let config = GatewayConfig::load().context("Failed to load gateway configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    // Log configuration source information
    let config_file = config_file_path();
    if config_file.exists() {
        tracing::info!("Configuration loaded from: {}", config_file.display());
    } else {
        tracing::info!("Using default configuration (no config file found)");
    }

    // Log database target, never the password
    tracing::info!(
        "Database: {}@{}:{}/{} (sslmode {:?})",
        config.database.user,
        config.database.host,
        config.database.port,
        config.database.name,
        config.database.ssl_mode
    );
    tracing::info!("Procedure schema: {}", config.gateway.schema);

    Ok(config)
}

/// Generate a sample configuration file
pub fn generate_sample_config(production: bool) -> Result<()> {
    let config = if production {
        GatewayConfig::production()
    } else {
        GatewayConfig::development()
    };

    let filename = if production {
        "pig-gateway.production.toml"
    } else {
        "pig-gateway.sample.toml"
    };

    config.save_to_file(Path::new(filename))?;

    println!("Generated sample configuration: {}", filename);
    println!("\nTo use this configuration:");
    println!("1. Copy to {}: cp {} {}", DEFAULT_CONFIG_FILE, filename, DEFAULT_CONFIG_FILE);
    println!("2. Edit the configuration as needed");
    println!("3. Or point at it directly: export PIG_CONFIG={}", filename);

    Ok(())
}
