use std::sync::Arc;
use std::time::Duration;

use catbridge_infra::{EngineConfig, InMemoryCatalog, InMemoryStateStore, MigrationEngine};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    catalog: Arc<InMemoryCatalog>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new().with_unit("m").with_unit("Units"));
        let engine = MigrationEngine::load(
            catalog.clone(),
            Arc::new(InMemoryStateStore::new()),
            EngineConfig::immediate(),
        )
        .await
        .expect("failed to load engine");

        // Same router as prod, bound to an ephemeral port.
        let app = catbridge_api::app::build_app(Arc::new(engine));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            catalog,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn banner_roll(uom: &str) -> Value {
    json!({
        "products": [
            {
                "id": "1",
                "templateName": "Banner Roll",
                "uom": uom,
                "price": 20.0,
                "defaultCode": "BR-110",
                "attributes": [{ "name": "Width", "value": "1.10m" }]
            },
            {
                "id": "2",
                "templateName": "Banner Roll",
                "uom": uom,
                "price": 20.0,
                "defaultCode": "BR-160",
                "attributes": [{ "name": "Width", "value": "1.60m" }]
            }
        ]
    })
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> reqwest::Response {
    client.post(url).json(&body).send().await.unwrap()
}

async fn state_eventually(client: &reqwest::Client, srv: &TestServer, phase: &str) -> Value {
    // The worker runs in the background; poll until it reaches the phase.
    for _ in 0..100 {
        let state: Value = client
            .get(srv.url("/migration/state"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        if state["phase"] == phase {
            return state;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("migration did not reach {phase} within timeout");
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn fresh_state_is_idle() {
    let srv = TestServer::spawn().await;
    let state: Value = reqwest::get(srv.url("/migration/state"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(state["phase"], "IDLE");
    assert_eq!(state["tasks"].as_array().unwrap().len(), 0);
    assert!(state["id"].is_string());
}

#[tokio::test]
async fn analysis_then_start_runs_to_done() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/migration/analysis"), banner_roll("m")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let state: Value = res.json().await.unwrap();
    assert_eq!(state["phase"], "IDLE");
    assert_eq!(state["tasks"].as_array().unwrap().len(), 4);

    let res = post(&client, srv.url("/migration/start"), json!({})).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["resumed"], false);

    let state = state_eventually(&client, &srv, "DONE").await;
    assert_eq!(state["progress"], 100);
    assert_eq!(srv.catalog.templates().len(), 1);
}

#[tokio::test]
async fn conflicts_block_planning_until_resolved() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/migration/analysis"), banner_roll("rolls")).await;
    let state: Value = res.json().await.unwrap();
    assert_eq!(state["phase"], "RESOLVING");
    assert_eq!(state["uomConflicts"][0]["localUom"], "rolls");

    let res = post(&client, srv.url("/migration/conflicts/finish"), json!({})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unresolved_conflicts");
    assert_eq!(body["units"], json!(["rolls"]));

    let units: Value = reqwest::get(srv.url("/migration/units"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let metre = units
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["name"] == "m")
        .map(|u| u["id"].clone())
        .unwrap();

    let res = post(
        &client,
        srv.url("/migration/conflicts/resolve"),
        json!({ "localUom": "rolls", "unitId": metre }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(&client, srv.url("/migration/conflicts/finish"), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let state: Value = res.json().await.unwrap();
    assert_eq!(state["phase"], "IDLE");
    assert_eq!(state["tasks"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn unknown_conflict_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    post(&client, srv.url("/migration/analysis"), banner_roll("rolls")).await;
    let res = post(
        &client,
        srv.url("/migration/conflicts/resolve"),
        json!({ "localUom": "boxes", "unitId": 1 }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn create_unit_resolves_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    post(&client, srv.url("/migration/analysis"), banner_roll("rolls")).await;
    let res = post(
        &client,
        srv.url("/migration/conflicts/create-unit"),
        json!({ "localUom": "rolls" }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::CREATED);
    let unit: Value = res.json().await.unwrap();
    assert_eq!(unit["name"], "rolls");
    assert_eq!(srv.catalog.units().len(), 3);

    let res = post(&client, srv.url("/migration/conflicts/finish"), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn start_without_plan_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/migration/start"), json!({})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn invalid_products_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = post(
        &client,
        srv.url("/migration/analysis"),
        json!({ "products": [{ "id": "1", "templateName": " ", "uom": "m" }] }),
    )
    .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn reset_requires_confirmation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let before: Value = reqwest::get(srv.url("/migration/state"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let res = post(&client, srv.url("/migration/reset"), json!({})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "confirmation_required");

    let res = post(&client, srv.url("/migration/reset"), json!({ "confirm": true })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_ne!(body["sessionId"], before["id"]);
}

#[tokio::test]
async fn logs_export_as_attachment() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    post(&client, srv.url("/migration/analysis"), banner_roll("m")).await;
    let res = client.get(srv.url("/migration/logs")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment;"));

    let export: Value = res.json().await.unwrap();
    assert!(disposition.contains(export["sessionId"].as_str().unwrap()));
    assert!(!export["logs"].as_array().unwrap().is_empty());
}
