use std::env;

use async_trait::async_trait;
use drasi_mcp_core::{ManagementClient, ViewStream, ViewStreamFactory};
use drasi_mcp_proto::ViewStreamItem;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_MANAGEMENT_URL: &str = "http://localhost:9001";
const DEFAULT_VIEW_SERVICE_URL: &str = "http://localhost:9002";

/// HTTP client for the management collaborator (spec.md §4.3 step 2). The
/// wire contract itself is out of spec.md's scope ("described only at their
/// interfaces"); this reaction's own choice — `GET {base}/queries/{queryId}/ready`
/// returning `{"ready": bool}` — is recorded in DESIGN.md.
pub struct HttpManagementClient {
    client: Client,
    base_url: String,
}

impl HttpManagementClient {
    pub fn from_env() -> Self {
        let base_url = env::var("managementApiUrl").unwrap_or_else(|_| DEFAULT_MANAGEMENT_URL.to_string());
        Self { client: Client::new(), base_url }
    }
}

#[derive(Deserialize)]
struct ReadyResponse {
    ready: bool,
}

#[async_trait]
impl ManagementClient for HttpManagementClient {
    async fn query_ready(&self, query_id: &str) -> Result<bool, anyhow::Error> {
        let url = format!("{}/queries/{}/ready", self.base_url, query_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: ReadyResponse = response.json().await?;
        Ok(body.ready)
    }
}

/// HTTP client for the view-service collaborator (spec.md §4.3 step 3):
/// `GET {base}/queries/{queryId}/view` returns newline-delimited JSON, one
/// `{"header":{"sequence":N}}` / `{"row":{...}}` / `{"end":true}` object per
/// line, consumed through the pull-based [`ViewStream`] trait.
pub struct HttpViewStreamFactory {
    client: Client,
    base_url: String,
}

impl HttpViewStreamFactory {
    pub fn from_env() -> Self {
        let base_url = env::var("viewServiceUrl").unwrap_or_else(|_| DEFAULT_VIEW_SERVICE_URL.to_string());
        Self { client: Client::new(), base_url }
    }
}

#[async_trait]
impl ViewStreamFactory for HttpViewStreamFactory {
    async fn open(&self, query_id: &str) -> Result<Box<dyn ViewStream>, anyhow::Error> {
        let url = format!("{}/queries/{}/view", self.base_url, query_id);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let lines = body.lines().map(str::to_string).collect::<Vec<_>>().into_iter();
        Ok(Box::new(NdjsonViewStream { lines }))
    }
}

struct NdjsonViewStream {
    lines: std::vec::IntoIter<String>,
}

#[derive(Deserialize)]
struct WireItem {
    #[serde(default)]
    header: Option<HeaderBody>,
    #[serde(default)]
    row: Option<Value>,
}

#[derive(Deserialize)]
struct HeaderBody {
    sequence: i64,
}

#[async_trait]
impl ViewStream for NdjsonViewStream {
    async fn next(&mut self) -> Result<ViewStreamItem, anyhow::Error> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(ViewStreamItem::End);
            };
            if line.trim().is_empty() {
                continue;
            }
            let item: WireItem = serde_json::from_str(&line)?;
            return match (item.header, item.row) {
                (Some(header), _) => Ok(ViewStreamItem::Header { sequence: header.sequence }),
                (None, Some(row)) => Ok(ViewStreamItem::Row(row)),
                (None, None) => Ok(ViewStreamItem::End),
            };
        }
    }
}
