//! The six end-to-end scenarios from spec.md §8, driven through the real
//! ingest HTTP endpoint and the real MCP JSON-RPC endpoint. Notification
//! delivery over the SSE transport itself is exercised in
//! `connectors/mcp-server/tests/mcp_protocol.rs`; here each scenario checks
//! the signals the store emits directly, which is what actually decides
//! what gets delivered.

mod common;

use drasi_mcp_core::{ChangeKind, ChangeSignal};
use drasi_mcp_proto::QueryConfig;
use serde_json::json;

const REACTION: &str = "mcp-server-e2e";

#[tokio::test]
async fn scenarios_1_through_5_customer_data_lifecycle() {
    let harness = common::spawn(REACTION, vec![QueryConfig::new("customer-data", "customer_id").with_description("E2E test customer data")]).await;
    harness.store.initialize_query("customer-data", "customer_id", "application/json", Some("E2E test customer data".into()));
    harness.sync_points.initialise("customer-data", 100).unwrap();

    let mut signals = harness.store.subscribe_signals();
    let client = reqwest::Client::new();
    let session = harness.mcp_session(&client).await;
    harness.mcp_call(&client, &session, "resources/subscribe", json!({"uri": "drasi://mcp-server-e2e/queries/customer-data"})).await;

    // Scenario 1 — insert becomes a readable entry.
    let response = client
        .post(&harness.ingest_base)
        .json(&json!({"queryId": "customer-data", "sequence": 101, "addedResults": [{"customer_id": "cust-1", "name": "Ada", "email": "ada@x"}]}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let read = harness.mcp_call(&client, &session, "resources/read", json!({"uri": "drasi://mcp-server-e2e/entries/customer-data/cust-1"})).await;
    let text = read["result"]["contents"][0]["text"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(text).unwrap(), json!({"customer_id": "cust-1", "name": "Ada", "email": "ada@x"}));

    assert!(matches!(signals.recv().await.unwrap(), ChangeSignal::Resource { kind: ChangeKind::Created, .. }));
    assert!(matches!(signals.recv().await.unwrap(), ChangeSignal::ListChanged { .. }));

    // Scenario 2 — update replaces the payload, notifies only the entry URI.
    let response = client
        .post(&harness.ingest_base)
        .json(&json!({
            "queryId": "customer-data",
            "sequence": 102,
            "updatedResults": [{"before": {"customer_id": "cust-1", "name": "Ada"}, "after": {"customer_id": "cust-1", "name": "Ada Lovelace", "email": "ada@x"}}],
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let read = harness.mcp_call(&client, &session, "resources/read", json!({"uri": "drasi://mcp-server-e2e/entries/customer-data/cust-1"})).await;
    let text = read["result"]["contents"][0]["text"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(text).unwrap()["name"], "Ada Lovelace");
    assert!(matches!(signals.recv().await.unwrap(), ChangeSignal::Resource { kind: ChangeKind::Updated, .. }));
    let no_list_change = tokio::time::timeout(std::time::Duration::from_millis(50), signals.recv()).await;
    assert!(no_list_change.is_err(), "update must not emit a list-changed signal");

    // Scenario 3 — delete removes the entry.
    let response =
        client.post(&harness.ingest_base).json(&json!({"queryId": "customer-data", "sequence": 103, "deletedResults": [{"customer_id": "cust-1"}]})).send().await.unwrap();
    assert!(response.status().is_success());

    let read = harness.mcp_call(&client, &session, "resources/read", json!({"uri": "drasi://mcp-server-e2e/entries/customer-data/cust-1"})).await;
    assert_eq!(read["error"]["code"], -32602);

    let query_read = harness.mcp_call(&client, &session, "resources/read", json!({"uri": "drasi://mcp-server-e2e/queries/customer-data"})).await;
    let text = query_read["result"]["contents"][0]["text"].as_str().unwrap();
    let body: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["entryCount"], 0);
    assert_eq!(body["entries"], json!([]));

    assert!(matches!(signals.recv().await.unwrap(), ChangeSignal::Resource { kind: ChangeKind::Deleted, .. }));
    assert!(matches!(signals.recv().await.unwrap(), ChangeSignal::ListChanged { .. }));

    // Scenario 4 — redelivering the Scenario 2 envelope is a silent no-op.
    let response = client
        .post(&harness.ingest_base)
        .json(&json!({
            "queryId": "customer-data",
            "sequence": 102,
            "updatedResults": [{"before": {"customer_id": "cust-1", "name": "Ada"}, "after": {"customer_id": "cust-1", "name": "Ada Lovelace", "email": "ada@x"}}],
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(harness.sync_points.get("customer-data"), Some(103));
    let still_not_found = harness.mcp_call(&client, &session, "resources/read", json!({"uri": "drasi://mcp-server-e2e/entries/customer-data/cust-1"})).await;
    assert_eq!(still_not_found["error"]["code"], -32602);
    let no_signal = tokio::time::timeout(std::time::Duration::from_millis(50), signals.recv()).await;
    assert!(no_signal.is_err(), "a duplicate envelope must not emit any signal");
}

#[tokio::test]
async fn scenario_5_unknown_query_is_a_client_error() {
    let harness = common::spawn(REACTION, vec![]).await;
    let client = reqwest::Client::new();

    let mut signals = harness.store.subscribe_signals();
    let response = client.post(&harness.ingest_base).json(&json!({"queryId": "does-not-exist", "sequence": 1})).send().await.unwrap();

    assert!(response.status().is_client_error());
    let no_signal = tokio::time::timeout(std::time::Duration::from_millis(50), signals.recv()).await;
    assert!(no_signal.is_err(), "an unknown query must never emit a change signal");
}

#[tokio::test]
async fn scenario_6_tool_call_with_filter_and_limit() {
    let harness = common::spawn(REACTION, vec![QueryConfig::new("products", "product_id")]).await;
    harness.store.initialize_query("products", "product_id", "application/json", None);
    for (id, name, stock) in [("p1", "Widget", 3), ("p2", "Premium Laptop", 7), ("p3", "Gadget", 12), ("p4", "Gizmo", 0), ("p5", "Thingamajig", 1)] {
        harness.store.upsert_entry("products", id, json!({"product_id": id, "product_name": name, "stock": stock})).unwrap();
    }

    let client = reqwest::Client::new();
    let session = harness.mcp_session(&client).await;
    let response = harness
        .mcp_call(
            &client,
            &session,
            "tools/call",
            json!({"name": "get_products_results", "arguments": {"filter": {"product_name": "Premium Laptop"}, "limit": 10}}),
        )
        .await;

    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let body: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["resultCount"], 1);
    assert_eq!(body["totalCount"], 5);
    assert_eq!(body["results"][0]["product_name"], "Premium Laptop");

    // The filter is a case-insensitive comparison of stringified values:
    // a differing-case string still matches, and a string filter value
    // matches a numeric row field.
    let case_insensitive = harness
        .mcp_call(&client, &session, "tools/call", json!({"name": "get_products_results", "arguments": {"filter": {"product_name": "premium LAPTOP"}}}))
        .await;
    let text = case_insensitive["result"]["content"][0]["text"].as_str().unwrap();
    let body: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["resultCount"], 1);
    assert_eq!(body["results"][0]["product_id"], "p2");

    let numeric_filter =
        harness.mcp_call(&client, &session, "tools/call", json!({"name": "get_products_results", "arguments": {"filter": {"stock": "7"}}})).await;
    let text = numeric_filter["result"]["content"][0]["text"].as_str().unwrap();
    let body: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["resultCount"], 1);
    assert_eq!(body["results"][0]["product_id"], "p2");
}
