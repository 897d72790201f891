use drasi_mcp_core::ResourceStore;
use drasi_mcp_proto::{stringify_scalar, QueryConfig, ResourceUri};
use serde_json::{json, Map, Value};

use crate::rpc::{RpcError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::session::{Session, SessionState};

/// Dispatches one JSON-RPC method call against the resource store (spec.md
/// §4.5's method table). Borrows rather than owns its collaborators because
/// a dispatcher is built fresh per request — it carries no state of its own.
pub struct Dispatcher<'a> {
    pub store: &'a ResourceStore,
    pub configs: &'a [QueryConfig],
}

impl<'a> Dispatcher<'a> {
    pub fn dispatch(&self, session: &Session, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => self.initialize(session),
            "resources/list" => self.resources_list(),
            "resources/templates/list" => self.resources_templates_list(),
            "resources/read" => self.resources_read(params),
            "resources/subscribe" => self.resources_subscribe(session, params),
            "resources/unsubscribe" => self.resources_unsubscribe(session, params),
            "tools/list" => self.tools_list(),
            "tools/call" => self.tools_call(params),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            other => Err(RpcError::new(METHOD_NOT_FOUND, format!("unknown method: {other}"))),
        }
    }

    fn initialize(&self, session: &Session) -> Result<Value, RpcError> {
        session.set_state(SessionState::Initialising);
        session.set_state(SessionState::Ready);
        Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": { "name": self.store.reaction_name(), "version": env!("CARGO_PKG_VERSION") },
            "capabilities": { "resources": { "listChanged": true, "subscribe": true }, "tools": {}, "prompts": {} },
        }))
    }

    fn resources_list(&self) -> Result<Value, RpcError> {
        let reaction = self.store.reaction_name();
        let resources: Vec<Value> = self
            .store
            .list_queries()
            .into_iter()
            .map(|meta| {
                json!({
                    "uri": ResourceUri::query(reaction, &meta.query_id).to_string(),
                    "name": meta.query_id,
                    "description": meta.description,
                    "mimeType": meta.content_type,
                })
            })
            .collect();
        Ok(json!({ "resources": resources }))
    }

    fn resources_templates_list(&self) -> Result<Value, RpcError> {
        let reaction = self.store.reaction_name();
        Ok(json!({
            "resourceTemplates": [{
                "uriTemplate": format!("drasi://{reaction}/entries/{{queryId}}/{{entryKey}}"),
                "name": "entry",
            }],
        }))
    }

    fn resources_read(&self, params: &Value) -> Result<Value, RpcError> {
        let raw_uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing uri"))?;
        let uri = ResourceUri::parse(raw_uri).map_err(|_| RpcError::new(INVALID_PARAMS, "Unknown resource URI"))?;
        let body = self.store.get_resource_by_uri(&uri).map_err(|_| RpcError::new(INVALID_PARAMS, "Unknown resource URI"))?;
        let Some(body) = body else {
            return Err(RpcError::new(INVALID_PARAMS, "Unknown resource URI"));
        };
        let mime_type = match &uri {
            ResourceUri::Query { .. } => "application/json".to_string(),
            ResourceUri::Entry { query_id, .. } => {
                self.store.query_metadata(query_id).map(|m| m.content_type).unwrap_or_else(|| "application/json".to_string())
            }
        };
        let text = serde_json::to_string(&body).map_err(|_| RpcError::new(INTERNAL_ERROR, "failed to encode resource body"))?;
        Ok(json!({ "contents": [{ "uri": raw_uri, "mimeType": mime_type, "text": text }] }))
    }

    fn resources_subscribe(&self, session: &Session, params: &Value) -> Result<Value, RpcError> {
        if session.state() != SessionState::Ready {
            return Err(RpcError::new(INVALID_REQUEST, "session is not ready"));
        }
        let raw_uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing uri"))?;
        let uri = ResourceUri::parse(raw_uri).map_err(|_| RpcError::new(INVALID_PARAMS, "Unknown resource URI"))?;
        session.subscribe(&uri);
        Ok(json!({}))
    }

    fn resources_unsubscribe(&self, session: &Session, params: &Value) -> Result<Value, RpcError> {
        let raw_uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing uri"))?;
        let uri = ResourceUri::parse(raw_uri).map_err(|_| RpcError::new(INVALID_PARAMS, "Unknown resource URI"))?;
        session.unsubscribe(&uri);
        Ok(json!({}))
    }

    fn tools_list(&self) -> Result<Value, RpcError> {
        let tools: Vec<Value> = self
            .store
            .list_queries()
            .into_iter()
            .map(|meta| {
                json!({
                    "name": format!("get_{}_results", meta.query_id),
                    "description": meta.description,
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "limit": { "type": "integer", "minimum": 1 },
                            "filter": { "type": "object" },
                        },
                    },
                })
            })
            .collect();
        Ok(json!({ "tools": tools }))
    }

    fn tools_call(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params.get("name").and_then(Value::as_str).ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing tool name"))?;
        let query_id =
            name.strip_prefix("get_").and_then(|rest| rest.strip_suffix("_results")).ok_or_else(|| RpcError::new(INVALID_PARAMS, "Unknown tool"))?;
        let entries = self.store.entries_for_query(query_id).map_err(|_| RpcError::new(INVALID_PARAMS, "Unknown query"))?;
        let total_count = entries.len();

        let empty = json!({});
        let arguments = params.get("arguments").unwrap_or(&empty);
        let filter = arguments.get("filter").and_then(Value::as_object);
        let limit = arguments.get("limit").and_then(Value::as_u64).map(|n| n as usize);

        let mut results: Vec<Value> = entries.into_iter().filter(|entry| matches_filter(&entry.data, filter)).map(|entry| entry.data).collect();
        if let Some(limit) = limit {
            results.truncate(limit);
        }

        let description = self.store.query_metadata(query_id).and_then(|m| m.description);
        let body = json!({
            "queryId": query_id,
            "description": description,
            "resultCount": results.len(),
            "totalCount": total_count,
            "results": results,
        });
        let text = serde_json::to_string(&body).map_err(|_| RpcError::new(INTERNAL_ERROR, "failed to encode tool result"))?;
        Ok(json!({ "content": [{ "type": "text", "text": text }] }))
    }
}

/// A case-insensitive equality filter on stringified values (spec.md §4.5
/// "Tool semantics": `filter[k] == stringified(row[k])`), so a numeric row
/// field matches a string filter value and casing never matters.
fn matches_filter(data: &Value, filter: Option<&Map<String, Value>>) -> bool {
    let Some(filter) = filter else { return true };
    filter.iter().all(|(key, expected)| match data.get(key) {
        Some(actual) => stringify_scalar(actual).eq_ignore_ascii_case(&stringify_scalar(expected)),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drasi_mcp_core::ResourceStore;
    use serde_json::json;

    fn fixture() -> ResourceStore {
        let store = ResourceStore::new("mcp-server-e2e");
        store.initialize_query("products", "product_id", "application/json", Some("products".into()));
        for (id, name, stock) in [("p1", "Widget", 3), ("p2", "Premium Laptop", 7), ("p3", "Gadget", 12), ("p4", "Gizmo", 0), ("p5", "Thingamajig", 1)] {
            store.upsert_entry("products", id, json!({"product_id": id, "product_name": name, "stock": stock})).unwrap();
        }
        store
    }

    fn session() -> std::sync::Arc<Session> { crate::session::SessionManager::new().create() }

    #[test]
    fn tool_call_filters_and_limits() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let result = dispatcher
            .tools_call(&json!({"name": "get_products_results", "arguments": {"filter": {"product_name": "Premium Laptop"}, "limit": 10}}))
            .unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["resultCount"], 1);
        assert_eq!(body["totalCount"], 5);
        assert_eq!(body["results"][0]["product_name"], "Premium Laptop");
    }

    #[test]
    fn tool_call_filter_is_case_insensitive() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let result =
            dispatcher.tools_call(&json!({"name": "get_products_results", "arguments": {"filter": {"product_name": "premium LAPTOP"}}})).unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["resultCount"], 1);
        assert_eq!(body["results"][0]["product_id"], "p2");
    }

    #[test]
    fn tool_call_filter_matches_stringified_numeric_field() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let result = dispatcher.tools_call(&json!({"name": "get_products_results", "arguments": {"filter": {"stock": "7"}}})).unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["resultCount"], 1);
        assert_eq!(body["results"][0]["product_id"], "p2");
    }

    #[test]
    fn tool_call_on_unknown_query_is_invalid_params() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let err = dispatcher.tools_call(&json!({"name": "get_missing_results", "arguments": {}})).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn resources_read_unknown_uri_is_invalid_params() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let err = dispatcher.resources_read(&json!({"uri": "drasi://mcp-server-e2e/entries/products/does-not-exist"})).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.message, "Unknown resource URI");
    }

    #[test]
    fn resources_read_entry_returns_raw_payload_text() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let result = dispatcher.resources_read(&json!({"uri": "drasi://mcp-server-e2e/entries/products/p1"})).unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["product_name"], "Widget");
    }

    #[test]
    fn subscribe_before_ready_is_rejected() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let session = session();
        let err = dispatcher.resources_subscribe(&session, &json!({"uri": "drasi://mcp-server-e2e/queries/products"})).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn subscribe_after_initialize_succeeds() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let session = session();
        dispatcher.initialize(&session).unwrap();
        dispatcher.resources_subscribe(&session, &json!({"uri": "drasi://mcp-server-e2e/queries/products"})).unwrap();
        assert!(session.is_subscribed("drasi://mcp-server-e2e/queries/products"));
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let store = fixture();
        let dispatcher = Dispatcher { store: &store, configs: &[] };
        let session = session();
        let err = dispatcher.dispatch(&session, "bogus/method", &json!({})).unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }
}
