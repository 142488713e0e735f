//! Integration tests against a mock JSON API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query as UrlQuery, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};

use crate::client::{
    ActionOption, ApiService, HttpTransport, Query, QueryOption, RegistryConfig, ServiceRegistry,
};
use crate::errors::ErrorKind;
use crate::models::{EntityId, RequestParams};
use crate::schema::{EntityShaper, Schema};
use crate::store::Store;

#[derive(Clone, Default)]
struct MockState {
    bodies: Arc<Mutex<Vec<Value>>>,
}

fn user(id: i64) -> Value {
    json!({
        "id": id,
        "name": format!("User {}", id),
        "password": "secret",
        "team": {"id": 10, "title": "Core"}
    })
}

async fn list_users(UrlQuery(query): UrlQuery<HashMap<String, String>>) -> Json<Value> {
    let page: u64 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit: u64 = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(2);
    let data = if page == 1 {
        json!([user(1), user(2)])
    } else {
        json!([user(2), user(3)])
    };
    Json(json!({
        "data": data,
        "paginator": {
            "page": page,
            "current_page": page,
            "limit": limit,
            "total_items": 3,
            "total_pages": 2,
            "next_page": if page == 1 { json!(2) } else { Value::Null }
        },
        "message": "ok",
        "status": 200
    }))
}

async fn create_user(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.bodies.lock().unwrap().push(body.clone());
    let name = body.get("full_name").cloned().unwrap_or(Value::Null);
    Json(json!({"data": {"id": 99, "name": name, "team": {"id": 10, "title": "Core"}}}))
}

async fn delete_user(Path(id): Path<i64>) -> Json<Value> {
    Json(json!({"data": {"id": id}}))
}

async fn invalid_user() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "message": "Validation failed",
            "code": "E_VALIDATION",
            "errors": {"name": ["required"]}
        })),
    )
}

async fn records_without_ids() -> Json<Value> {
    Json(json!({"data": [{"name": "anonymous"}]}))
}

/// Test fixture for integration tests.
struct TestFixture {
    base_url: String,
    state: MockState,
}

impl TestFixture {
    async fn new() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/api/users", get(list_users).post(create_user))
            .route("/api/users/{id}", delete(delete_user))
            .route("/api/invalid", get(invalid_user))
            .route("/api/anonymous", get(records_without_ids))
            .with_state(state.clone());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}/api", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture { base_url, state }
    }

    fn registry(&self, snake_case: bool) -> ServiceRegistry {
        let transport = HttpTransport::new(&self.base_url, Duration::from_secs(5)).unwrap();
        ServiceRegistry::new(RegistryConfig::new(vec![
            ApiService::new("main", Arc::new(transport)).snake_case(snake_case)
        ]))
        .unwrap()
    }

    fn users(&self, snake_case: bool) -> Query {
        self.registry(snake_case)
            .query("users", schema(), "user", QueryOption::default())
            .unwrap()
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .entity(EntityShaper::builder("team").all_fields().build())
            .entity(
                EntityShaper::builder("user")
                    .associate_with("team", true)
                    .whitelist(["id", "name"])
                    .build(),
            )
            .define("user", [("team", "team")])
            .build()
            .unwrap(),
    )
}

fn view_ids(store: &Store, source: &str) -> Vec<Value> {
    store
        .select_source_view("user", source)
        .data
        .iter()
        .map(|user| user["id"].clone())
        .collect()
}

#[tokio::test]
async fn test_fetch_normalizes_into_store() {
    let fixture = TestFixture::new().await;
    let mut store = Store::new();

    let payload = fixture
        .users(false)
        .fetch("/users", None, ActionOption::new())
        .unwrap()
        .dispatch(&mut store, RequestParams::new().source("all").page(1).limit(5))
        .await
        .unwrap();

    assert_eq!(payload.normalized.result.ids(), vec![EntityId::Int(1), EntityId::Int(2)]);

    let view = store.select_source_view("user", "all");
    assert_eq!(view.data.len(), 2);
    assert_eq!(
        Value::Object(view.data[0].clone()),
        json!({"id": 1, "name": "User 1", "$teamId": 10})
    );
    assert_eq!(view.paginator.total_pages, 2);
    assert_eq!(view.paginator.limit, 5);
    assert_eq!(view.paginator.next_page, Some(2));
    assert_eq!(view.loading, Some(false));

    let teams = &store.slice("team").unwrap().collection;
    assert_eq!(teams.get(&EntityId::Int(10)).unwrap()["title"], json!("Core"));
}

#[tokio::test]
async fn test_load_more_unions_pages() {
    let fixture = TestFixture::new().await;
    let fetch = fixture
        .users(false)
        .fetch("/users", Some("feed"), ActionOption::new())
        .unwrap();
    let mut store = Store::new();

    fetch
        .dispatch(&mut store, RequestParams::new().source("all").page(1))
        .await
        .unwrap();
    fetch
        .dispatch(&mut store, RequestParams::new().source("all").page(2).load_more(true))
        .await
        .unwrap();

    assert_eq!(view_ids(&store, "all"), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(store.select_source_view("user", "all").paginator.page, 2);

    // A plain refetch replaces the list.
    fetch
        .dispatch(&mut store, RequestParams::new().source("all").page(2))
        .await
        .unwrap();
    assert_eq!(view_ids(&store, "all"), vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn test_delete_propagates_to_sources() {
    let fixture = TestFixture::new().await;
    let query = fixture.users(false);
    let mut store = Store::new();

    let fetch = query.fetch("/users", None, ActionOption::new()).unwrap();
    fetch
        .dispatch(&mut store, RequestParams::new().source("first").page(1))
        .await
        .unwrap();
    fetch
        .dispatch(&mut store, RequestParams::new().source("second").page(2))
        .await
        .unwrap();

    query
        .delete("/users/:id", None, ActionOption::new())
        .unwrap()
        .dispatch(&mut store, RequestParams::new().id(&EntityId::Int(2)))
        .await
        .unwrap();

    assert_eq!(view_ids(&store, "first"), vec![json!(1)]);
    assert_eq!(view_ids(&store, "second"), vec![json!(3)]);
}

#[tokio::test]
async fn test_http_error_is_classified() {
    let fixture = TestFixture::new().await;
    let mut store = Store::new();

    let reject = fixture
        .users(false)
        .fetch("/invalid", None, ActionOption::new())
        .unwrap()
        .dispatch(&mut store, RequestParams::new().source("broken"))
        .await
        .unwrap_err();

    assert_eq!(reject.kind, ErrorKind::Http);
    assert_eq!(reject.err_msg, "Validation failed");
    assert_eq!(reject.err_code, Some(json!("E_VALIDATION")));
    assert_eq!(reject.err_status_code, Some(422));
    assert_eq!(reject.message_bag.unwrap()["name"], json!(["required"]));

    let view = store.select_source_view("user", "broken");
    assert_eq!(view.error.as_deref(), Some("Validation failed"));
    assert_eq!(view.loading, Some(false));
    assert!(view.data.is_empty());
}

#[tokio::test]
async fn test_normalize_failure_is_rejected() {
    let fixture = TestFixture::new().await;

    let reject = fixture
        .users(false)
        .fetch("/anonymous", None, ActionOption::new())
        .unwrap()
        .run(RequestParams::new())
        .await
        .unwrap_err();

    assert_eq!(reject.kind, ErrorKind::Normalize);
}

#[tokio::test]
async fn test_snake_case_body_reaches_server() {
    let fixture = TestFixture::new().await;
    let mut store = Store::new();

    let payload = fixture
        .users(true)
        .post("/users", None, ActionOption::new().fixed_data("teamId", 10))
        .unwrap()
        .dispatch(
            &mut store,
            RequestParams::new().data(json!({"fullName": "  Ann  "})),
        )
        .await
        .unwrap();

    let bodies = fixture.state.bodies.lock().unwrap().clone();
    assert_eq!(bodies, vec![json!({"full_name": "Ann", "team_id": 10})]);

    assert_eq!(payload.normalized.result.ids(), vec![EntityId::Int(99)]);
    let users = &store.slice("user").unwrap().collection;
    assert_eq!(users.get(&EntityId::Int(99)).unwrap()["name"], json!("Ann"));
}

#[tokio::test]
async fn test_full_response_is_kept_on_source() {
    let fixture = TestFixture::new().await;
    let mut store = Store::new();

    let payload = fixture
        .users(false)
        .fetch(
            "/users",
            None,
            ActionOption::new()
                .full_response()
                .include_api_response_data(),
        )
        .unwrap()
        .dispatch(&mut store, RequestParams::new().source("all"))
        .await
        .unwrap();

    assert_eq!(payload.response.as_ref().unwrap()["message"], json!("ok"));
    assert_eq!(payload.api_response_data.as_ref().unwrap()[0]["password"], json!("secret"));

    let view = store.select_source_view("user", "all");
    assert_eq!(view.extra["response"]["message"], json!("ok"));
    assert_eq!(view.extra["apiResponseData"][1]["id"], json!(2));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let transport = HttpTransport::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let registry = ServiceRegistry::new(RegistryConfig::new(vec![ApiService::new(
        "down",
        Arc::new(transport),
    )]))
    .unwrap();

    let reject = registry
        .query("users", schema(), "user", QueryOption::default())
        .unwrap()
        .fetch("/users", None, ActionOption::new())
        .unwrap()
        .run(RequestParams::new())
        .await
        .unwrap_err();

    assert_eq!(reject.kind, ErrorKind::Network);
    assert_eq!(reject.err_status_code, None);
}
