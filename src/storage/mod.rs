// src/storage/mod.rs

use async_trait::async_trait;
use std::fmt;

use crate::Result;

pub mod memory;
pub mod migrations;
pub mod postgres;

/// Longest identifier PostgreSQL accepts without truncation
const MAX_IDENTIFIER_LEN: usize = 63;

/// A named procedure invocation with its ordered text arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCall {
    pub procedure: String,
    pub params: Vec<String>,
}

impl ProcedureCall {
    pub fn new(procedure: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            procedure: procedure.into(),
            params,
        }
    }
}

impl fmt::Display for ProcedureCall {
    // Argument values are left out on purpose: API keys travel as arguments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.procedure, self.params.len())
    }
}

/// The single `(status, js)` row every procedure returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureResult {
    pub status: i32,
    pub payload: String,
}

impl ProcedureResult {
    pub fn new(status: i32, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }
}

/// Single point of access to the database's callable procedures.
///
/// `Ok(None)` means the procedure ran but produced no row; callers decide
/// what that means for them. Errors are never retried.
#[async_trait]
pub trait ProcedureGateway: Send + Sync {
    /// Invoke `schema.procedure(params...)` and return its result row
    async fn call_procedure(&self, call: ProcedureCall) -> Result<Option<ProcedureResult>>;

    /// Check the backend is reachable
    async fn health_check(&self) -> Result<GatewayHealth>;
}

/// Backend health information for the `/health` endpoint
#[derive(Debug, Clone)]
pub struct GatewayHealth {
    pub healthy: bool,
    pub backend_type: String,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub last_check: chrono::DateTime<chrono::Utc>,
}

impl GatewayHealth {
    pub fn new(backend_type: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            healthy: true,
            backend_type: backend_type.into(),
            latency_ms,
            error: None,
            last_check: chrono::Utc::now(),
        }
    }

    pub fn unhealthy(backend_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            backend_type: backend_type.into(),
            latency_ms: 0,
            error: Some(error.into()),
            last_check: chrono::Utc::now(),
        }
    }
}

/// Plain unquoted SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
