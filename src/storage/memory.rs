// src/storage/memory.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{GatewayHealth, ProcedureCall, ProcedureGateway, ProcedureResult};
use crate::error::GatewayError;
use crate::Result;

type Handler = Arc<dyn Fn(&[String]) -> Option<ProcedureResult> + Send + Sync>;

enum Script {
    Respond(Handler),
    Fail(String),
}

/// In-memory procedure gateway with scripted answers.
///
/// Every call is recorded before it is answered, so tests can assert on
/// exactly which procedures ran with which arguments. Procedures without
/// a script return no row.
pub struct MemoryGateway {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<ProcedureCall>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `procedure` with the given row
    pub fn with_result(self, procedure: &str, status: i32, payload: &str) -> Self {
        let result = ProcedureResult::new(status, payload);
        self.with_handler(procedure, move |_| Some(result.clone()))
    }

    /// Answer `procedure` by running `handler` over the call arguments
    pub fn with_handler<F>(mut self, procedure: &str, handler: F) -> Self
    where
        F: Fn(&[String]) -> Option<ProcedureResult> + Send + Sync + 'static,
    {
        self.scripts
            .insert(procedure.to_string(), Script::Respond(Arc::new(handler)));
        self
    }

    /// Make every call to `procedure` fail
    pub fn with_failure(mut self, procedure: &str, message: &str) -> Self {
        self.scripts
            .insert(procedure.to_string(), Script::Fail(message.to_string()));
        self
    }

    /// Resolve each `(apikey, person_id)` pair through `apikey_get` the way
    /// the database does: 200 with `{"person_id": n}`, or 404 with `{}`.
    pub fn with_api_keys(self, keys: &[(&str, i64)]) -> Self {
        let keys: HashMap<String, i64> = keys
            .iter()
            .map(|(key, person_id)| (key.to_string(), *person_id))
            .collect();

        self.with_handler("apikey_get", move |params| {
            let found = params.first().and_then(|key| keys.get(key));
            Some(match found {
                Some(person_id) => {
                    ProcedureResult::new(200, format!("{{\"person_id\":{}}}", person_id))
                }
                None => ProcedureResult::new(404, "{}"),
            })
        })
    }

    /// Every call made so far, oldest first
    pub async fn calls(&self) -> Vec<ProcedureCall> {
        self.calls.lock().await.clone()
    }

    /// Number of calls made to `procedure`
    pub async fn call_count(&self, procedure: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.procedure == procedure)
            .count()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scripted: Vec<&String> = self.scripts.keys().collect();
        scripted.sort();
        f.debug_struct("MemoryGateway")
            .field("scripted", &scripted)
            .finish()
    }
}

#[async_trait]
impl ProcedureGateway for MemoryGateway {
    async fn call_procedure(&self, call: ProcedureCall) -> Result<Option<ProcedureResult>> {
        self.calls.lock().await.push(call.clone());

        match self.scripts.get(&call.procedure) {
            Some(Script::Respond(handler)) => Ok(handler(&call.params)),
            Some(Script::Fail(message)) => Err(GatewayError::internal(format!(
                "{} failed: {}",
                call.procedure, message
            ))),
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<GatewayHealth> {
        Ok(GatewayHealth::new("memory", 0))
    }
}
