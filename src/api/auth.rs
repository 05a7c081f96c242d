// src/api/auth.rs

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AppState;
use crate::error::GatewayError;
use crate::storage::{ProcedureCall, ProcedureGateway};

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "apikey";

/// Procedure resolving an API key to a person
pub const API_KEY_PROCEDURE: &str = "apikey_get";

/// The authenticated person behind the request's API key.
///
/// Inserted into request extensions by [`require_api_key`]; handlers take
/// it with `Extension<CallerIdentity>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub person_id: i64,
}

impl CallerIdentity {
    /// The identity as a procedure argument
    pub fn as_param(&self) -> String {
        self.person_id.to_string()
    }
}

#[derive(Deserialize)]
struct ApiKeyPayload {
    person_id: i64,
}

/// Exactly four ASCII lowercase letters
pub fn is_valid_api_key(key: &str) -> bool {
    key.len() == 4 && key.bytes().all(|b| b.is_ascii_lowercase())
}

/// Authentication middleware.
///
/// Rejects with 401 before any handler runs when the `apikey` header is
/// missing or malformed (no database call), or when the lookup fails.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| is_valid_api_key(key))
        .map(str::to_string)
        .ok_or(GatewayError::MissingApiKey)?;

    let caller = resolve_caller(state.gateway.as_ref(), &api_key).await?;
    debug!(person_id = caller.person_id, "Request authenticated");

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Look an API key up through `apikey_get`
pub async fn resolve_caller(
    gateway: &dyn ProcedureGateway,
    api_key: &str,
) -> Result<CallerIdentity, GatewayError> {
    let call = ProcedureCall::new(API_KEY_PROCEDURE, vec![api_key.to_string()]);

    let result = match gateway.call_procedure(call).await {
        Ok(Some(result)) => result,
        Ok(None) => {
            debug!("API key lookup returned no rows");
            return Err(GatewayError::WrongApiKey);
        }
        Err(e) => {
            warn!("API key lookup failed: {}", e);
            return Err(GatewayError::WrongApiKey);
        }
    };

    if result.status == 404 {
        return Err(GatewayError::WrongApiKey);
    }

    match serde_json::from_str::<ApiKeyPayload>(&result.payload) {
        Ok(payload) => Ok(CallerIdentity {
            person_id: payload.person_id,
        }),
        Err(e) => {
            warn!(status = result.status, "API key lookup payload has no person_id: {}", e);
            Err(GatewayError::WrongApiKey)
        }
    }
}
