// src/api/routes.rs

use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{MethodFilter, MethodRouter},
    Extension, Router,
};
use std::collections::HashMap;

use super::auth::CallerIdentity;
use super::AppState;
use crate::error::GatewayError;
use crate::storage::{ProcedureCall, ProcedureGateway, ProcedureResult};

type ApiResult<T> = Result<T, GatewayError>;

/// Largest id a path segment may carry
const MAX_PATH_ID: u32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl RouteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Patch => "PATCH",
            RouteMethod::Delete => "DELETE",
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            RouteMethod::Get => MethodFilter::GET,
            RouteMethod::Post => MethodFilter::POST,
            RouteMethod::Patch => MethodFilter::PATCH,
            RouteMethod::Delete => MethodFilter::DELETE,
        }
    }
}

/// Where a procedure argument comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// The authenticated caller's person id
    Caller,
    /// A numeric path segment
    Path(&'static str),
    /// A url-encoded form field
    Form(&'static str),
}

/// One row of the route table
#[derive(Debug)]
pub struct RouteSpec {
    pub method: RouteMethod,
    pub path: &'static str,
    pub procedure: &'static str,
    pub params: &'static [ParamSource],
    pub required: &'static [&'static str],
}

/// Every protected route and the procedure it calls
pub static ROUTES: &[RouteSpec] = &[
    RouteSpec {
        method: RouteMethod::Get,
        path: "/",
        procedure: "people_get",
        params: &[],
        required: &[],
    },
    RouteSpec {
        method: RouteMethod::Get,
        path: "/person/:id",
        procedure: "person_get",
        params: &[ParamSource::Path("id")],
        required: &[],
    },
    RouteSpec {
        method: RouteMethod::Patch,
        path: "/person",
        procedure: "person_update",
        params: &[ParamSource::Caller, ParamSource::Form("name")],
        required: &["name"],
    },
    RouteSpec {
        method: RouteMethod::Get,
        path: "/things",
        procedure: "things_get",
        params: &[ParamSource::Caller],
        required: &[],
    },
    RouteSpec {
        method: RouteMethod::Post,
        path: "/things",
        procedure: "thing_add",
        params: &[ParamSource::Caller, ParamSource::Form("name")],
        required: &["name"],
    },
    RouteSpec {
        method: RouteMethod::Get,
        path: "/thing/:id",
        procedure: "thing_get",
        params: &[ParamSource::Caller, ParamSource::Path("id")],
        required: &[],
    },
    RouteSpec {
        method: RouteMethod::Patch,
        path: "/thing/:id",
        procedure: "thing_update",
        params: &[
            ParamSource::Caller,
            ParamSource::Path("id"),
            ParamSource::Form("name"),
        ],
        required: &["name"],
    },
    RouteSpec {
        method: RouteMethod::Delete,
        path: "/thing/:id",
        procedure: "thing_delete",
        params: &[ParamSource::Caller, ParamSource::Path("id")],
        required: &[],
    },
];

/// Build the router for [`ROUTES`], one method router per distinct path
pub fn create_routes() -> Router<AppState> {
    let mut paths: Vec<&'static str> = Vec::new();
    for route in ROUTES {
        if !paths.contains(&route.path) {
            paths.push(route.path);
        }
    }

    paths.into_iter().fold(Router::new(), |router, route_path| {
        let method_router = ROUTES
            .iter()
            .filter(|route| route.path == route_path)
            .fold(MethodRouter::new(), |method_router, route| {
                method_router.on(
                    route.method.filter(),
                    move |State(state): State<AppState>,
                          Extension(caller): Extension<CallerIdentity>,
                          path: Option<Path<HashMap<String, String>>>,
                          form: Option<Form<HashMap<String, String>>>| async move {
                        let path = path.map(|Path(path)| path).unwrap_or_default();
                        let form = form.map(|Form(form)| form).unwrap_or_default();
                        dispatch(route, state.gateway.as_ref(), caller, &path, &form).await
                    },
                )
            });
        router.route(route_path, method_router)
    })
}

/// Serve one route: check inputs, call the procedure, relay its answer.
///
/// Path ids outside `1..=999999` are 404 and missing required fields are
/// 412; neither reaches the database.
pub async fn dispatch(
    route: &RouteSpec,
    gateway: &dyn ProcedureGateway,
    caller: CallerIdentity,
    path: &HashMap<String, String>,
    form: &HashMap<String, String>,
) -> ApiResult<Response> {
    for source in route.params {
        if let ParamSource::Path(name) = source {
            path.get(*name)
                .filter(|raw| is_valid_path_id(raw))
                .ok_or(GatewayError::NotFound)?;
        }
    }

    for field in route.required {
        if form.get(*field).map_or(true, |value| value.is_empty()) {
            return Err(GatewayError::missing_field(*field));
        }
    }

    let params = route
        .params
        .iter()
        .map(|source| match source {
            ParamSource::Caller => caller.as_param(),
            ParamSource::Path(name) => path.get(*name).cloned().unwrap_or_default(),
            ParamSource::Form(name) => form.get(*name).cloned().unwrap_or_default(),
        })
        .collect();

    let result = gateway
        .call_procedure(ProcedureCall::new(route.procedure, params))
        .await?
        .ok_or_else(|| GatewayError::NoResult {
            procedure: route.procedure.to_string(),
        })?;

    relay(route.procedure, result)
}

/// Turn a procedure row into the HTTP response, status and body untouched
pub fn relay(procedure: &str, result: ProcedureResult) -> ApiResult<Response> {
    let status = u16::try_from(result.status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| !status.is_informational())
        .ok_or_else(|| GatewayError::InvalidResult {
            procedure: procedure.to_string(),
            reason: format!("status {} is not a final HTTP status code", result.status),
        })?;

    let body: serde_json::Value =
        serde_json::from_str(&result.payload).map_err(|e| GatewayError::InvalidResult {
            procedure: procedure.to_string(),
            reason: format!("payload is not JSON: {}", e),
        })?;

    Ok((status, Json(body)).into_response())
}

/// Decimal id in `1..=999999` without sign or leading zero
pub fn is_valid_path_id(raw: &str) -> bool {
    !raw.starts_with('0')
        && raw.bytes().all(|b| b.is_ascii_digit())
        && raw.parse::<u32>().map_or(false, |id| (1..=MAX_PATH_ID).contains(&id))
}
