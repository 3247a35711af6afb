//! End-to-end checks of the /api routes: gating, registration, lookup and the
//! delayed delivery flag.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::Router;
use customer_notify::config::{AuthConfig, DatabaseConfig, ReadIsolation};
use customer_notify::customer::database::open_pool;
use customer_notify::{
    create_router, AppState, CustomerStorage, DelaySource, NewCustomer, NotificationDispatcher, UniformDelay,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "authorized-user";

/// Delay unit used by the timing tests: 10..20 units = 200..400ms.
const UNIT: Duration = Duration::from_millis(20);

struct TestApp {
    router: Router,
    state: AppState,
    storage: CustomerStorage,
    notifier: NotificationDispatcher,
    _dir: TempDir,
}

async fn test_app_with(isolation: ReadIsolation, delay: Arc<dyn DelaySource>) -> TestApp {
    let dir = TempDir::new().expect("tempdir");
    let config = DatabaseConfig {
        path: dir.path().join("customers.db").to_string_lossy().into_owned(),
        read_isolation: isolation,
        max_connections: 4,
    };
    let storage = CustomerStorage::new(open_pool(&config).await.expect("pool"));
    storage.init_schema().await.expect("schema");
    let notifier = NotificationDispatcher::new(storage.clone(), delay);
    let state = AppState::new(
        storage.clone(),
        notifier.clone(),
        AuthConfig {
            session_token: TOKEN.to_string(),
        },
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        storage,
        notifier,
        _dir: dir,
    }
}

async fn test_app() -> TestApp {
    test_app_with(
        ReadIsolation::Serializable,
        Arc::new(UniformDelay::new(10, 10, UNIT, Some(1))),
    )
    .await
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    user_agent: &str,
    body: Option<String>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, user_agent);
    if let Some(token) = token {
        builder = builder.header("x-session-token", token);
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    send_request(router, request).await
}

async fn send_request(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(router: &Router, payload: Value) -> (StatusCode, Value) {
    send(router, Method::POST, "/api", Some(TOKEN), "curl/8.0", Some(payload.to_string())).await
}

async fn lookup(router: &Router, id: &str) -> (StatusCode, Value) {
    send(router, Method::GET, &format!("/api?id={id}"), Some(TOKEN), "curl/8.0", None).await
}

#[tokio::test]
async fn registration_then_immediate_lookup_is_unsent() {
    let app = test_app().await;

    let (status, body) = register(
        &app.router,
        json!({"id": "42", "name": "Ada", "phone_number": "5551234567"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "customer created"}));

    let (status, body) = lookup(&app.router, "42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"id": "42", "name": "Ada", "phone_number": "5551234567", "sms_sent": false})
    );
    assert_eq!(app.notifier.in_flight(), 1);
}

#[tokio::test]
async fn name_is_optional() {
    let app = test_app().await;

    let (status, _) = register(&app.router, json!({"id": "7", "phone_number": "5551234567"})).await;
    assert_eq!(status, StatusCode::OK);

    let record = app.storage.get_customer("7").await.unwrap().unwrap();
    assert_eq!(record.name, "");
}

#[tokio::test]
async fn null_name_is_stored_as_empty() {
    let app = test_app().await;

    let (status, _) = register(
        &app.router,
        json!({"id": "8", "name": null, "phone_number": "5551234567"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = app.storage.get_customer("8").await.unwrap().unwrap();
    assert_eq!(record.name, "");
}

#[tokio::test]
async fn non_alphabetic_names_are_rejected_and_not_stored() {
    let app = test_app().await;

    for (id, name) in [("1", "Jo3"), ("2", "Ann!"), ("3", "Mary Ann")] {
        let (status, body) = register(
            &app.router,
            json!({"id": id, "name": name, "phone_number": "5551234567"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
        assert_eq!(body, json!({"error": "name has special characters"}));
        assert!(app.storage.get_customer(id).await.unwrap().is_none());
    }
    assert_eq!(app.notifier.in_flight(), 0);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = test_app().await;

    for payload in [
        json!({"name": "Ada", "phone_number": "5551234567"}),
        json!({"id": "1", "name": "Ada"}),
        json!({"id": 1, "phone_number": "5551234567"}),
        json!({"id": "", "phone_number": "5551234567"}),
        json!({"id": "1", "phone_number": 5551234567u64}),
        json!("just a string"),
    ] {
        let (status, body) = register(&app.router, payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert!(body["error"].is_string(), "{payload}");
    }

    let (status, _) = send(&app.router, Method::POST, "/api", Some(TOKEN), "curl/8.0", Some("{".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.notifier.in_flight(), 0);
}

#[tokio::test]
async fn non_utf8_body_gets_json_error() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api")
        .header("x-session-token", TOKEN)
        .header(header::USER_AGENT, "curl/8.0")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(b"{\xff}".to_vec()))
        .unwrap();
    let (status, body) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
    assert_eq!(app.notifier.in_flight(), 0);
}

#[tokio::test]
async fn duplicate_id_fails_and_keeps_first_record() {
    let app = test_app().await;

    let (status, _) = register(
        &app.router,
        json!({"id": "42", "name": "Ada", "phone_number": "5551234567"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = register(
        &app.router,
        json!({"id": "42", "name": "Grace", "phone_number": "5559876543"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"].as_str().unwrap().contains("already exists"),
        "{body}"
    );

    let record = app.storage.get_customer("42").await.unwrap().unwrap();
    assert_eq!(record.name, "Ada");
    assert_eq!(record.phone_number, "5551234567");
    // Only the successful registration scheduled a task.
    assert_eq!(app.notifier.in_flight(), 1);
}

#[tokio::test]
async fn store_constraints_surface_as_persistence_errors() {
    let app = test_app().await;

    let (status, body) = register(&app.router, json!({"id": "1", "name": "Ada", "phone_number": "555"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let long_name = "a".repeat(51);
    let (status, _) = register(
        &app.router,
        json!({"id": "2", "name": long_name, "phone_number": "5551234567"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(app.storage.get_customer("1").await.unwrap().is_none());
    assert!(app.storage.get_customer("2").await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_or_missing_token_is_forbidden_regardless_of_body() {
    let app = test_app().await;
    let valid = json!({"id": "1", "name": "Ada", "phone_number": "5551234567"}).to_string();

    for token in [None, Some("nope"), Some("")] {
        for body in [Some(valid.clone()), Some("garbage".to_string())] {
            let (status, response) = send(&app.router, Method::POST, "/api", token, "curl/8.0", body).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(response, json!({"error": "request cannot be authenticated!"}));
        }
        let (status, _) = send(&app.router, Method::GET, "/api?id=1", token, "curl/8.0", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
    assert!(app.storage.get_customer("1").await.unwrap().is_none());
}

#[tokio::test]
async fn bot_user_agents_are_rejected_before_parsing() {
    let app = test_app().await;

    for agent in ["Bot", "BOT", "bot", "SuperCrawlerBot/1.0"] {
        // A garbage body would otherwise produce a parse error message.
        let (status, body) = send(&app.router, Method::POST, "/api", Some(TOKEN), agent, Some("garbage".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{agent}");
        assert_eq!(body, json!({"error": "bad bot, go away!"}));

        let (status, body) = send(&app.router, Method::GET, "/api?id=oops", Some(TOKEN), agent, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "bad bot, go away!"}));
    }
}

#[tokio::test]
async fn bot_user_agent_with_non_ascii_bytes_is_rejected() {
    let app = test_app().await;
    let payload = json!({"id": "1", "name": "Ada", "phone_number": "5551234567"}).to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api")
        .header("x-session-token", TOKEN)
        .header(
            header::USER_AGENT,
            HeaderValue::from_bytes(b"Googlebot/2.1 \xe9").unwrap(),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = send_request(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "bad bot, go away!"}));
    assert!(app.storage.get_customer("1").await.unwrap().is_none());
}

#[tokio::test]
async fn lookup_rejects_non_integer_and_unknown_ids() {
    let app = test_app().await;

    for uri in ["/api?id=abc", "/api", "/api?id=1.5", "/api?id=%207", "/api?id=7%20"] {
        let (status, body) = send(&app.router, Method::GET, uri, Some(TOKEN), "curl/8.0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body, json!({"error": "malformed request"}));
    }

    let (status, body) = lookup(&app.router, "999").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "error while fetching customer"}));
}

#[tokio::test]
async fn repeated_lookups_of_unmutated_record_are_identical() {
    let app = test_app().await;
    register(
        &app.router,
        json!({"id": "5", "name": "Ada", "phone_number": "5551234567"}),
    )
    .await;

    let first = lookup(&app.router, "5").await;
    let second = lookup(&app.router, "5").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn delivery_flag_flips_only_after_delay() {
    let app = test_app().await;
    register(
        &app.router,
        json!({"id": "42", "name": "Ada", "phone_number": "5551234567"}),
    )
    .await;

    // Well under the 10 unit lower bound.
    tokio::time::sleep(UNIT * 2).await;
    let (_, body) = lookup(&app.router, "42").await;
    assert_eq!(body["sms_sent"], json!(false));

    // Past the 20 unit upper bound, with slack for the update itself.
    tokio::time::sleep(UNIT * 30).await;
    let (_, body) = lookup(&app.router, "42").await;
    assert_eq!(body["sms_sent"], json!(true));
    assert_eq!(app.notifier.in_flight(), 0);
}

#[tokio::test]
async fn lookup_observes_flag_flip_at_drawn_delay() {
    let unit = Duration::from_millis(50);
    let seed = 5;
    let app = test_app_with(
        ReadIsolation::Serializable,
        Arc::new(UniformDelay::new(10, 10, unit, Some(seed))),
    )
    .await;
    // Same seed, same first draw as the dispatcher will make.
    let expected = UniformDelay::new(10, 10, unit, Some(seed)).next_delay();

    register(
        &app.router,
        json!({"id": "42", "name": "Ada", "phone_number": "5551234567"}),
    )
    .await;

    // Three units before the drawn delay the task is still waiting.
    tokio::time::sleep(expected - unit * 3).await;
    let (status, body) = lookup(&app.router, "42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sms_sent"], json!(false), "at {:?} of {expected:?}", expected - unit * 3);

    // Five units after it, the update has landed.
    tokio::time::sleep(unit * 8).await;
    let (_, body) = lookup(&app.router, "42").await;
    assert_eq!(body["sms_sent"], json!(true));
}

#[tokio::test]
async fn dropped_registration_still_schedules_notification() {
    let app = test_app().await;
    let customer = NewCustomer {
        id: "9".to_string(),
        name: "Ada".to_string(),
        phone_number: "5551234567".to_string(),
    };

    // Poll the registration once, then abandon it like a disconnected client.
    tokio::select! {
        biased;
        _ = app.state.register(customer) => {}
        _ = std::future::ready(()) => {}
    }

    let mut stored = None;
    for _ in 0..100 {
        stored = app.storage.get_customer("9").await.unwrap();
        if stored.is_some() && app.notifier.in_flight() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stored.is_some(), "record was never committed");
    assert_eq!(app.notifier.in_flight(), 1);

    tokio::time::sleep(UNIT * 30).await;
    assert!(app.storage.get_customer("9").await.unwrap().unwrap().sms_sent);
}

#[tokio::test]
async fn read_uncommitted_store_serves_the_same_flow() {
    let app = test_app_with(
        ReadIsolation::ReadUncommitted,
        Arc::new(UniformDelay::new(10, 10, UNIT, Some(9))),
    )
    .await;

    for id in ["1", "2", "3"] {
        let (status, _) = register(
            &app.router,
            json!({"id": id, "name": "Ada", "phone_number": "5551234567"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    for id in ["1", "2", "3"] {
        let (_, body) = lookup(&app.router, id).await;
        assert_eq!(body["sms_sent"], json!(false));
    }

    tokio::time::sleep(UNIT * 30).await;
    for id in ["1", "2", "3"] {
        let (_, body) = lookup(&app.router, id).await;
        assert_eq!(body["sms_sent"], json!(true), "{id}");
    }
}

#[tokio::test]
async fn health_check_is_ungated() {
    let app = test_app().await;

    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
