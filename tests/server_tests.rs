//! Integration Tests: HTTP surface over a live node

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use wallet_session::store::MemoryStore;
use wallet_session::{create_router, Node, NodeConfig};

async fn spawn_server() -> (String, Arc<Node>) {
    let node = Arc::new(
        Node::builder(NodeConfig::new("test-http"))
            .with_identity_provider(MockProvider::new())
            .with_extension(MockExtension::new(ACCOUNT_A))
            .with_ledger(MockLedger::new("42.0000000"))
            .with_widget(Arc::new(MockWidget::default()))
            .with_store(Arc::new(MemoryStore::new()))
            .build()
            .expect("node"),
    );
    node.start();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let router = create_router(node.clone(), "test-http");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{}", addr), node)
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let (base, node) = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value =
        client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");

    node.initialize_all().await;
    let resp = client
        .post(format!("{}/connect/manual", base))
        .json(&json!({ "address": ACCOUNT_B }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let session: Value =
        client.get(format!("{}/session", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(session["publicKey"], ACCOUNT_B);
    assert_eq!(session["isConnected"], true);
    assert_eq!(session["connectionSource"], "direct-wallet");

    let balance: Value = client
        .post(format!("{}/balance/refresh", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(balance["native"], "42.0000000");

    let adapters: Value =
        client.get(format!("{}/adapters", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(adapters["popup-identity"]["status"], "ready");
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let (base, node) = spawn_server().await;
    let client = reqwest::Client::new();
    node.initialize_all().await;

    let resp = client
        .post(format!("{}/payments/buy", base))
        .json(&json!({ "amount": 10.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid request: connect your wallet first");

    let resp = client.post(format!("{}/adapters/nobody/connect", base)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{}/connect/manual", base))
        .json(&json!({ "address": "GNOPE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}
