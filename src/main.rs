// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pig_gateway::config::{generate_sample_config, load_config, GatewayConfig, LogFormat};
use pig_gateway::storage::{migrations::apply_migrations, postgres::PostgresGateway};
use pig_gateway::web;

#[derive(Parser)]
#[command(name = "pig-gateway")]
#[command(about = "HTTP gateway relaying PostgreSQL stored procedure results")]
#[command(long_about = r#"
pig-gateway authenticates every request by its `apikey` header, calls the
stored procedure registered for the route, and answers with exactly the
status code and JSON payload the procedure returned.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, apply pending migrations, then serve HTTP
    Serve {
        /// Port to bind to
        #[arg(short, long, env = "PIG_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "PIG_HOST")]
        host: Option<String>,

        /// Schema holding the callable procedures
        #[arg(long)]
        schema: Option<String>,

        /// Directory of migration files
        #[arg(long, value_name = "DIR")]
        migrations: Option<PathBuf>,

        /// Verbose logging
        #[arg(long)]
        dev: bool,

        /// Configuration file path
        #[arg(short, long, env = "PIG_CONFIG")]
        config: Option<String>,
    },
    /// Apply pending migrations and exit
    Migrate {
        /// Directory of migration files
        #[arg(long, value_name = "DIR")]
        migrations: Option<PathBuf>,

        /// Configuration file path
        #[arg(short, long, env = "PIG_CONFIG")]
        config: Option<String>,
    },
    /// Generate sample configuration files
    Config {
        /// Generate production configuration
        #[arg(long)]
        production: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            schema,
            migrations,
            dev,
            config,
        } => {
            // Set config file path if provided
            if let Some(config_path) = config {
                std::env::set_var("PIG_CONFIG", config_path);
            }

            // Load configuration
            let mut app_config = load_config()?;

            // Override with CLI arguments
            if let Some(port) = port {
                app_config.server.port = port;
            }
            if let Some(host) = host {
                app_config.server.host = host;
            }
            if let Some(schema) = schema {
                app_config.gateway.schema = schema;
            }
            if let Some(dir) = migrations {
                app_config.gateway.migrations_dir = dir.display().to_string();
            }
            app_config
                .validate()
                .context("Configuration validation failed")?;

            // Initialize logging based on config
            init_logging(&app_config, dev)?;

            info!("Starting pig-gateway {}", env!("CARGO_PKG_VERSION"));
            info!("Procedure schema: {}", app_config.gateway.schema);
            if dev {
                warn!("Development mode enabled - verbose logging");
            }

            // Connect and bring the schema up to date before binding
            let gateway = connect_and_migrate(&app_config).await?;

            // Start the web server
            web::start_server(&app_config.server, Arc::new(gateway)).await?;
        }

        Commands::Migrate { migrations, config } => {
            init_minimal_logging()?;

            if let Some(config_path) = config {
                std::env::set_var("PIG_CONFIG", config_path);
            }

            // Load configuration
            let mut app_config = load_config()?;
            if let Some(dir) = migrations {
                app_config.gateway.migrations_dir = dir.display().to_string();
            }

            connect_and_migrate(&app_config).await?;
            println!("Migrations complete");
        }

        Commands::Config { production } => {
            init_minimal_logging()?;
            generate_sample_config(production)?;
        }

        Commands::Version => {
            println!("pig-gateway {}", env!("CARGO_PKG_VERSION"));
            println!("{}", env!("CARGO_PKG_DESCRIPTION"));
        }
    }

    Ok(())
}

/// Startup sequence: connect (fatal on failure), then apply pending
/// migrations (fatal on anything but "no change").
async fn connect_and_migrate(config: &GatewayConfig) -> Result<PostgresGateway> {
    let gateway = PostgresGateway::new(config.database.clone(), &config.gateway.schema)
        .context("Invalid procedure schema")?;

    // Connect eagerly so an unreachable database aborts startup
    let pool = gateway
        .handle()
        .await
        .context("Problem getting database connection")?;
    info!("Database connection established");

    // Apply pending migrations
    let dir = PathBuf::from(&config.gateway.migrations_dir);
    let report = apply_migrations(pool, &dir)
        .await
        .with_context(|| format!("Problem running migrations from {}", dir.display()))?;
    info!(
        "Migrations: {} found, {} applied",
        report.discovered, report.applied
    );

    Ok(gateway)
}

/// Initialize logging based on configuration and development mode
fn init_logging(config: &GatewayConfig, dev_mode: bool) -> Result<()> {
    let filter = if dev_mode {
        "pig_gateway=debug,tower_http=debug,axum=debug,sqlx=info,info".to_string()
    } else {
        config.log_filter()
    };

    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
    );

    match config.logging.format {
        LogFormat::Json => {
            subscriber
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Initialize minimal logging for CLI commands
fn init_minimal_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
