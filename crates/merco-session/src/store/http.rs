//! HTTP-backed source store.
//!
//! Talks to the strategy server's source endpoints:
//!
//! ```text
//! GET  {base}/strategy/source/get?path=<p>
//! POST {base}/strategy/source/save?path=<p>          body: JSON string
//! GET  {base}/strategy/source/delete?path=<p>
//! GET  {base}/strategy/source/move?old_path=<a>&new_path=<b>
//! ```
//!
//! Requests go through a blocking `ureq` agent on tokio's blocking pool, so
//! callers never stall the async scheduler on network I/O.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{SourceNode, SourceStore};
use crate::error::{StoreError, StoreResult};
use crate::path;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the server on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Source store backed by the strategy server's REST API.
#[derive(Debug, Clone)]
pub struct HttpStore {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpStore {
    /// Create a store for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a store with a custom per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, base_url }
    }

    /// The server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/strategy/source/{name}", self.base_url)
    }

    /// Run a blocking request on the blocking pool.
    async fn run<T, F>(&self, request: F) -> StoreResult<T>
    where
        F: FnOnce(ureq::Agent) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || request(agent))
            .await
            .map_err(|e| StoreError::Transport(format!("request task failed: {e}")))?
    }
}

/// Translate a ureq failure into the store taxonomy.
fn map_error(target: &str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_json::<ErrorBody>().ok();
            let message = body
                .as_ref()
                .map(|b| b.message.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("HTTP {status}"));
            match status {
                404 => StoreError::NotFound(target.to_string()),
                400..=499 if message.to_lowercase().contains("already exists") => {
                    StoreError::AlreadyExists(target.to_string())
                }
                400..=499 => StoreError::Rejected(message),
                _ => {
                    let kind = body.map(|b| b.error).unwrap_or_default();
                    if kind.is_empty() {
                        StoreError::Transport(message)
                    } else {
                        StoreError::Transport(format!("{kind}: {message}"))
                    }
                }
            }
        }
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

#[async_trait]
impl SourceStore for HttpStore {
    async fn get(&self, node_path: &str) -> StoreResult<SourceNode> {
        let url = self.endpoint("get");
        let target = path::normalize(node_path);
        tracing::debug!(path = %target, "GET source");
        self.run(move |agent| {
            let response = agent
                .get(&url)
                .query("path", &target)
                .call()
                .map_err(|e| map_error(&target, e))?;
            response
                .into_json::<SourceNode>()
                .map_err(|e| StoreError::Decode(e.to_string()))
        })
        .await
    }

    async fn save(&self, node_path: &str, content: &str) -> StoreResult<()> {
        let url = self.endpoint("save");
        let target = path::normalize(node_path);
        let body = serde_json::Value::String(content.to_string());
        tracing::debug!(path = %target, bytes = content.len(), "POST source/save");
        self.run(move |agent| {
            agent
                .post(&url)
                .query("path", &target)
                .send_json(body)
                .map_err(|e| map_error(&target, e))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, node_path: &str) -> StoreResult<()> {
        let url = self.endpoint("delete");
        let target = path::normalize(node_path);
        tracing::debug!(path = %target, "GET source/delete");
        self.run(move |agent| {
            agent
                .get(&url)
                .query("path", &target)
                .call()
                .map_err(|e| map_error(&target, e))?;
            Ok(())
        })
        .await
    }

    async fn move_path(&self, from: &str, to: &str) -> StoreResult<()> {
        let url = self.endpoint("move");
        let from = path::normalize(from);
        let to = path::normalize(to);
        tracing::debug!(from = %from, to = %to, "GET source/move");
        self.run(move |agent| {
            let result = agent
                .get(&url)
                .query("old_path", &from)
                .query("new_path", &to)
                .call();
            match result {
                Ok(_) => Ok(()),
                // A 404 names the source; "already exists" names the destination.
                Err(e) => Err(match map_error(&from, e) {
                    StoreError::AlreadyExists(_) => StoreError::AlreadyExists(to),
                    other => other,
                }),
            }
        })
        .await
    }
}
