// src/storage/postgres.rs

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use super::{is_valid_identifier, GatewayHealth, ProcedureCall, ProcedureGateway, ProcedureResult};
use crate::config::DatabaseConfig;
use crate::error::GatewayError;
use crate::Result;

/// PostgreSQL procedure gateway.
///
/// Holds the connection parameters and a pool that is created by the first
/// caller of [`PostgresGateway::handle`] and shared by everyone after that.
/// Every procedure argument is sent as a bound text parameter and cast to
/// the type the procedure declares for it, looked up once per procedure
/// and arity. Only the schema and procedure names appear in the statement
/// text, and only after passing [`is_valid_identifier`].
#[derive(Debug)]
pub struct PostgresGateway {
    options: PgConnectOptions,
    config: DatabaseConfig,
    schema: String,
    pool: OnceCell<PgPool>,
    signatures: RwLock<HashMap<(String, usize), Vec<String>>>,
}

/// Input argument types of a procedure, as SQL type names
const SIGNATURE_QUERY: &str = "SELECT p.proargtypes::regtype[]::text[] \
     FROM pg_catalog.pg_proc p \
     JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
     WHERE n.nspname = $1 AND p.proname = $2 AND p.pronargs = $3";

impl PostgresGateway {
    /// Build a gateway for `schema` without opening any connection
    pub fn new(config: DatabaseConfig, schema: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        if !is_valid_identifier(&schema) {
            return Err(GatewayError::InvalidIdentifier { name: schema });
        }

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(config.ssl_mode.into());

        Ok(Self {
            options,
            config,
            schema,
            pool: OnceCell::new(),
            signatures: RwLock::new(HashMap::new()),
        })
    }

    /// Return the shared pool, connecting on first use.
    ///
    /// Concurrent first callers wait on the same initialization; a failed
    /// attempt leaves the cell empty so the next caller tries again.
    pub async fn handle(&self) -> Result<&PgPool> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                info!(
                    "Connecting to PostgreSQL at {}:{}/{}",
                    self.config.host, self.config.port, self.config.name
                );
                PgPoolOptions::new()
                    .max_connections(self.config.max_connections)
                    .min_connections(self.config.min_connections)
                    .acquire_timeout(Duration::from_secs(self.config.connect_timeout))
                    .connect_with(self.options.clone())
                    .await
            })
            .await?;
        Ok(pool)
    }

    /// Whether the pool has been established yet
    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn statement_timeout(&self) -> Option<Duration> {
        match self.config.statement_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Declared argument types for `procedure` called with `arity` arguments.
    ///
    /// Empty when the catalog has no single matching overload; the call then
    /// goes out with plain text arguments and the database reports the error.
    async fn argument_types(&self, procedure: &str, arity: usize) -> Result<Vec<String>> {
        let key = (procedure.to_string(), arity);
        if let Some(types) = self.signatures.read().await.get(&key) {
            return Ok(types.clone());
        }

        let pool = self.handle().await?;
        let rows: Vec<Vec<String>> = sqlx::query_scalar(SIGNATURE_QUERY)
            .bind(self.schema.as_str())
            .bind(procedure)
            .bind(i16::try_from(arity).unwrap_or(i16::MAX))
            .fetch_all(pool)
            .await?;

        let types = match <[Vec<String>; 1]>::try_from(rows) {
            Ok([types]) => types,
            Err(rows) => {
                warn!(
                    "{} overloads of {}.{} take {} argument(s), sending text",
                    rows.len(),
                    self.schema,
                    procedure,
                    arity
                );
                return Ok(Vec::new());
            }
        };

        self.signatures.write().await.insert(key, types.clone());
        Ok(types)
    }

    async fn resolve_and_fetch(&self, call: &ProcedureCall) -> Result<Option<PgRow>> {
        let arity = call.params.len();
        let arg_types = self.argument_types(&call.procedure, arity).await?;
        let sql = procedure_statement(&self.schema, &call.procedure, arity, &arg_types)?;
        self.fetch_row(&sql, call).await
    }

    async fn fetch_row(&self, sql: &str, call: &ProcedureCall) -> Result<Option<PgRow>> {
        let pool = self.handle().await?;
        let query = call
            .params
            .iter()
            .fold(sqlx::query(sql), |query, param| query.bind(param.as_str()));

        let fetch = query.fetch_optional(pool);
        let row = match self.statement_timeout() {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                GatewayError::DatabaseTimeout {
                    procedure: call.procedure.clone(),
                    seconds: limit.as_secs(),
                }
            })??,
            None => fetch.await?,
        };
        Ok(row)
    }
}

/// `SELECT status, js FROM "schema"."procedure"($1::text::integer, ...)`
///
/// `arg_types` holds the declared type of each argument; without it every
/// argument stays `text`.
pub fn procedure_statement(
    schema: &str,
    procedure: &str,
    arity: usize,
    arg_types: &[String],
) -> Result<String> {
    for name in [schema, procedure] {
        if !is_valid_identifier(name) {
            return Err(GatewayError::InvalidIdentifier {
                name: name.to_string(),
            });
        }
    }

    let placeholders = (1..=arity)
        .map(|i| match arg_types.get(i - 1) {
            Some(ty) if ty != "text" => format!("${}::text::{}", i, ty),
            _ => format!("${}::text", i),
        })
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "SELECT status::int4 AS status, js::text AS js FROM \"{}\".\"{}\"({})",
        schema, procedure, placeholders
    ))
}

fn decode_row(row: &PgRow) -> std::result::Result<ProcedureResult, sqlx::Error> {
    let status: i32 = row.try_get("status")?;
    let payload: Option<String> = row.try_get("js")?;
    Ok(ProcedureResult {
        status,
        payload: payload.unwrap_or_else(|| "null".to_string()),
    })
}

#[async_trait]
impl ProcedureGateway for PostgresGateway {
    async fn call_procedure(&self, call: ProcedureCall) -> Result<Option<ProcedureResult>> {
        if !is_valid_identifier(&call.procedure) {
            return Err(GatewayError::InvalidIdentifier {
                name: call.procedure.clone(),
            });
        }
        debug!(procedure = %call, "Calling procedure");

        let row = match self.resolve_and_fetch(&call).await {
            Ok(row) => row,
            Err(e) => {
                error!(procedure = %call, "Procedure call failed: {}", e);
                return Err(e);
            }
        };

        match row {
            Some(row) => Ok(Some(decode_row(&row)?)),
            None => {
                debug!(procedure = %call, "Procedure returned no rows");
                Ok(None)
            }
        }
    }

    async fn health_check(&self) -> Result<GatewayHealth> {
        let start = Instant::now();
        let pool = match self.handle().await {
            Ok(pool) => pool,
            Err(e) => return Ok(GatewayHealth::unhealthy("postgres", e.to_string())),
        };

        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => Ok(GatewayHealth::new("postgres", start.elapsed().as_millis() as u64)),
            Err(e) => Ok(GatewayHealth::unhealthy("postgres", e.to_string())),
        }
    }
}
