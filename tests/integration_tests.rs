// tests/integration_tests.rs

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use pig_gateway::{
    storage::memory::MemoryGateway, web::create_app, ProcedureCall, ProcedureResult,
};

fn app(gateway: &Arc<MemoryGateway>) -> Router {
    create_app(gateway.clone(), Duration::from_secs(5))
}

fn request(method: Method, uri: &str, api_key: Option<&str>, form: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("apikey", key);
    }
    match form {
        Some(form) => builder
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn params(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Every protected route, as (method, uri, form body)
fn protected_routes() -> Vec<(Method, &'static str, Option<&'static str>, &'static str)> {
    vec![
        (Method::GET, "/", None, "people_get"),
        (Method::GET, "/person/3", None, "person_get"),
        (Method::PATCH, "/person", Some("name=Ann"), "person_update"),
        (Method::GET, "/things", None, "things_get"),
        (Method::POST, "/things", Some("name=Lamp"), "thing_add"),
        (Method::GET, "/thing/7", None, "thing_get"),
        (Method::PATCH, "/thing/7", Some("name=Lamp"), "thing_update"),
        (Method::DELETE, "/thing/7", None, "thing_delete"),
    ]
}

#[tokio::test]
async fn test_thing_get_end_to_end() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_result("thing_get", 200, r#"{"id":7,"name":"Widget"}"#),
    );

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/thing/7", Some("abcd"), None))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"id": 7, "name": "Widget"}));

    let calls = gateway.calls().await;
    assert_eq!(
        calls,
        vec![
            ProcedureCall::new("apikey_get", params(&["abcd"])),
            ProcedureCall::new("thing_get", params(&["42", "7"])),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_every_route_calls_its_procedure() -> Result<()> {
    let mut gateway = MemoryGateway::new().with_api_keys(&[("abcd", 42)]);
    for (_, _, _, procedure) in protected_routes() {
        gateway = gateway.with_result(procedure, 200, r#"{"ok":true}"#);
    }
    let gateway = Arc::new(gateway);

    for (method, uri, form, procedure) in protected_routes() {
        let response = app(&gateway)
            .oneshot(request(method.clone(), uri, Some("abcd"), form))
            .await?;
        assert_eq!(response.status(), StatusCode::OK, "{} {}", method, uri);
        assert_eq!(gateway.call_count(procedure).await, 1, "{}", procedure);
    }

    let calls = gateway.calls().await;
    let routed: Vec<&ProcedureCall> = calls.iter().filter(|c| c.procedure != "apikey_get").collect();
    assert_eq!(routed[0].params, params(&[]));
    assert_eq!(routed[1].params, params(&["3"]));
    assert_eq!(routed[2].params, params(&["42", "Ann"]));
    assert_eq!(routed[3].params, params(&["42"]));
    assert_eq!(routed[4].params, params(&["42", "Lamp"]));
    assert_eq!(routed[5].params, params(&["42", "7"]));
    assert_eq!(routed[6].params, params(&["42", "7", "Lamp"]));
    assert_eq!(routed[7].params, params(&["42", "7"]));

    Ok(())
}

#[tokio::test]
async fn test_missing_api_key_never_reaches_procedures() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::new().with_api_keys(&[("abcd", 42)]));

    for (method, uri, form, _) in protected_routes() {
        let response = app(&gateway)
            .oneshot(request(method, uri, None, form))
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "needs apikey header"}));
    }

    assert!(gateway.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_wrong_api_key() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::new().with_api_keys(&[("abcd", 42)]));

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/things", Some("efgh"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({"error": "wrong apikey"}));
    assert_eq!(gateway.call_count("things_get").await, 0);

    Ok(())
}

#[tokio::test]
async fn test_name_is_required() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::new().with_api_keys(&[("abcd", 42)]));

    let cases = [
        (Method::PATCH, "/person", None),
        (Method::PATCH, "/person", Some("name=")),
        (Method::POST, "/things", Some("other=1")),
        (Method::PATCH, "/thing/7", Some("name=")),
    ];

    for (method, uri, form) in cases {
        let response = app(&gateway)
            .oneshot(request(method, uri, Some("abcd"), form))
            .await?;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(body_json(response).await, json!({"error": "missing name"}));
    }

    let calls = gateway.calls().await;
    assert!(calls.iter().all(|c| c.procedure == "apikey_get"));
    Ok(())
}

#[tokio::test]
async fn test_name_is_last_param_and_decoded() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_result("thing_add", 201, r#"{"id":8,"name":"Red Lamp"}"#),
    );

    let response = app(&gateway)
        .oneshot(request(Method::POST, "/things", Some("abcd"), Some("name=Red+Lamp")))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let calls = gateway.calls().await;
    assert_eq!(calls.last().unwrap().params, params(&["42", "Red Lamp"]));
    Ok(())
}

#[tokio::test]
async fn test_procedure_status_is_passed_through() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_result("thing_get", 404, "{}")
            .with_result("person_get", 403, r#"{"error":"not yours"}"#),
    );

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/thing/5", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({}));

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/person/5", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({"error": "not yours"}));

    Ok(())
}

#[tokio::test]
async fn test_payload_round_trips_unchanged() -> Result<()> {
    let payload = json!([
        {"id": 1, "name": "Ann", "things": [{"id": 7, "name": "Widget"}], "email": null},
        {"id": 2, "name": "Bo", "things": [], "score": 1.5, "active": true}
    ]);
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_result("people_get", 200, &payload.to_string()),
    );

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, payload);

    Ok(())
}

#[tokio::test]
async fn test_repeated_reads_are_identical() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_result("things_get", 200, r#"[{"id":7,"name":"Widget"}]"#),
    );

    let first = body_json(
        app(&gateway)
            .oneshot(request(Method::GET, "/things", Some("abcd"), None))
            .await?,
    )
    .await;
    let second = body_json(
        app(&gateway)
            .oneshot(request(Method::GET, "/things", Some("abcd"), None))
            .await?,
    )
    .await;

    assert_eq!(first, second);
    // One key lookup per request, no caching.
    assert_eq!(gateway.call_count("apikey_get").await, 2);
    Ok(())
}

#[tokio::test]
async fn test_database_failure_is_uniform_500() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_failure("things_get", "connection reset")
            .with_failure("thing_update", "deadlock detected"),
    );

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/things", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"error": "internal server error"}));

    let response = app(&gateway)
        .oneshot(request(Method::PATCH, "/thing/2", Some("abcd"), Some("name=x")))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"error": "internal server error"}));

    Ok(())
}

#[tokio::test]
async fn test_no_row_and_bad_payload_are_500() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 42)])
            .with_handler("thing_get", |_| None)
            .with_result("thing_delete", 200, "<html>")
            .with_result("things_get", 100, "[]"),
    );

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/thing/1", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app(&gateway)
        .oneshot(request(Method::DELETE, "/thing/1", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app(&gateway)
        .oneshot(request(Method::GET, "/things", Some("abcd"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await, json!({"error": "internal server error"}));

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_ids_are_not_found() -> Result<()> {
    let gateway = Arc::new(MemoryGateway::new().with_api_keys(&[("abcd", 42)]));

    for uri in ["/thing/0", "/thing/1000000", "/person/abc", "/thing/-4"] {
        let response = app(&gateway)
            .oneshot(request(Method::GET, uri, Some("abcd"), None))
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body_json(response).await, json!({}));
    }

    let calls = gateway.calls().await;
    assert!(calls.iter().all(|c| c.procedure == "apikey_get"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_resolve_their_own_caller() -> Result<()> {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_api_keys(&[("abcd", 1), ("efgh", 2), ("ijkl", 3)])
            .with_handler("things_get", |params| {
                Some(ProcedureResult::new(200, format!("{{\"owner\":{}}}", params[0])))
            }),
    );

    let handles: Vec<_> = [("abcd", 1), ("efgh", 2), ("ijkl", 3)]
        .into_iter()
        .map(|(key, person_id)| {
            let app = app(&gateway);
            tokio::spawn(async move {
                let response = app
                    .oneshot(request(Method::GET, "/things", Some(key), None))
                    .await
                    .unwrap();
                (person_id, body_json(response).await)
            })
        })
        .collect();

    for handle in handles {
        let (person_id, body) = handle.await?;
        assert_eq!(body, json!({"owner": person_id}));
    }

    Ok(())
}
