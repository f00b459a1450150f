//! C1: collaborator clients. Three thin `reqwest`-backed handles over the
//! LLM, vector-memory, and action-executor services, each holding a base
//! URL and a per-call deadline. Constructed once at startup (`main.rs`) and
//! held in `Arc` for the process lifetime — no reconnect-per-call.
//!
//! Per `spec.md` §4.1/§7: the memory client never surfaces a failure into
//! the pipeline (it absorbs transport/HTTP/decode errors into an empty
//! result); the LLM and action clients return a typed `ClientError` that
//! the caller (C5/C4) folds into the error taxonomy.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{Action, MemoryHit};
use thiserror::Error;
use tracing::warn;

/// C1-internal error signaling, folded into `spec.md` §7's nine classes by
/// callers (Upstream-Unavailable / Upstream-Malformed).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream returned {0}: {1}")]
    Upstream(StatusCode, String),
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

fn base_health_deadline() -> Duration {
    Duration::from_secs(3)
}

/// `POST {base}/generate` and `POST {base}/chat`.
pub struct LlmClient {
    http: Client,
    base_url: String,
    deadline: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Per-call generation parameters, distinct from process-wide `Config`
/// defaults so call sites can override temperature/max_tokens/system prompt.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, deadline: Duration) -> Self {
        LlmClient {
            http: Client::new(),
            base_url: base_url.into(),
            deadline,
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ClientError> {
        let url = format!("{}/generate", self.base_url);
        let body = GenerateRequest {
            prompt,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            system: options.system.as_deref(),
            stream: false,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.deadline)
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Upstream(status, text));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        value
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing `text` field in /generate response".into()))
    }

    /// Supplied for collaborator-contract completeness (§6's table lists
    /// both `/generate` and `/chat`); the pipeline itself only calls
    /// `generate`.
    pub async fn chat(
        &self,
        messages: &[(&str, &str)],
        options: &GenerateOptions,
    ) -> Result<String, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let body = ChatRequest {
            messages: messages
                .iter()
                .map(|(role, content)| ChatMessage { role, content })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.deadline)
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Upstream(status, text));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing `message` field in /chat response".into()))
    }

    pub async fn health(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(base_health_deadline())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// `POST {base}/.../query` and `POST {base}/.../add`, ChromaDB-shaped.
pub struct MemoryClient {
    http: Client,
    base_url: String,
    deadline: Duration,
}

impl MemoryClient {
    pub fn new(base_url: impl Into<String>, deadline: Duration) -> Self {
        MemoryClient {
            http: Client::new(),
            base_url: base_url.into(),
            deadline,
        }
    }

    /// Never returns an error to its caller: any transport, HTTP, or decode
    /// failure is logged at `warn!` and folded into an empty result
    /// (`spec.md` I4 / §7 rule 2, applied at the client boundary).
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryHit> {
        let url = format!("{}/api/v1/collections/memories/query", self.base_url);
        let body = json!({ "query_texts": [query], "n_results": limit });

        let resp = match self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.deadline)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "memory search transport failure, returning empty context");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "memory search returned non-2xx, returning empty context");
            return Vec::new();
        }

        let value: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "memory search returned undecodable payload, returning empty context");
                return Vec::new();
            }
        };

        parse_query_response(&value)
    }

    /// Best-effort: returns `false` (never panics/propagates) on any failure.
    pub async fn store(&self, id: &str, content: &str, metadata: &Value) -> bool {
        let url = format!("{}/api/v1/collections/memories/add", self.base_url);
        let body = json!({
            "ids": [id],
            "documents": [content],
            "metadatas": [metadata],
        });

        match self
            .http
            .post(&url)
            .json(&body)
            .timeout(self.deadline)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "memory store failed, discarding");
                false
            }
        }
    }

    pub async fn health(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(base_health_deadline())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Parses the ChromaDB-shaped `{documents: [[...]], metadatas: [[...]]}`
/// pairwise, first result list only. A missing/short metadata list yields
/// `{}` for that entry.
fn parse_query_response(value: &Value) -> Vec<MemoryHit> {
    let documents = value
        .get("documents")
        .and_then(Value::as_array)
        .and_then(|outer| outer.first())
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let metadatas = value
        .get("metadatas")
        .and_then(Value::as_array)
        .and_then(|outer| outer.first())
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .map(|(i, doc)| {
            let content = doc.as_str().unwrap_or_default().to_string();
            let metadata = metadatas
                .get(i)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            MemoryHit {
                content,
                metadata,
                score: None,
            }
        })
        .collect()
}

/// Result of a single dispatched action, as reported by the action-exec
/// collaborator (before C4 layers its own timeout/elapsed-time bookkeeping
/// on top).
#[derive(Debug, Clone)]
pub struct ActionExecResult {
    pub status: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActionValidateResult {
    pub valid: bool,
    pub error: Option<String>,
}

/// `POST {base}/execute` and `POST {base}/validate`, taking the whole
/// `Action` object verbatim (Open Question (c), decided in SPEC_FULL.md §9).
pub struct ActionClient {
    http: Client,
    base_url: String,
    deadline: Duration,
}

impl ActionClient {
    pub fn new(base_url: impl Into<String>, deadline: Duration) -> Self {
        ActionClient {
            http: Client::new(),
            base_url: base_url.into(),
            deadline,
        }
    }

    pub async fn execute(&self, action: &Action) -> Result<ActionExecResult, ClientError> {
        let url = format!("{}/execute", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(action)
            .timeout(self.deadline)
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Upstream(status, text));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(ActionExecResult {
            status: value
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("error")
                .to_string(),
            result: value.get("result").cloned(),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Exposed for completeness/health-probing; C3's own validation is
    /// authoritative for the pipeline (not on the hot path).
    pub async fn validate(&self, action: &Action) -> Result<ActionValidateResult, ClientError> {
        let url = format!("{}/validate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(action)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Upstream(status, text));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(ActionValidateResult {
            valid: value
                .get("valid")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub async fn health(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(base_health_deadline())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
