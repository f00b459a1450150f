//! Inbound HTTP surface (C6's synchronous half), per `spec.md` §6: health
//! probes, the synchronous `/api/actions/execute` entry point into C5, the
//! allow-list introspection endpoint, and the two memory passthrough
//! endpoints. Grounded in `original_source`'s `api/health.py`,
//! `api/actions.py`, and `api/memory.py` — the route shapes here are a
//! direct Rust translation of those three FastAPI routers.

use std::sync::atomic::Ordering;

use actix_web::{web, Error, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use shared_types::Request as PipelineRequest;

use super::ApiContext;

pub fn configure(cfg: &mut web::ServiceConfig, ctx: ApiContext) {
    let ctx_data = web::Data::new(ctx);

    cfg.app_data(ctx_data)
        .route("/", web::get().to(root))
        .route("/health", web::get().to(health))
        .route("/health/ready", web::get().to(health_ready))
        .route("/health/live", web::get().to(health_live))
        .route("/api/actions/execute", web::post().to(execute_action))
        .route("/api/actions/allowed", web::get().to(allowed_actions))
        .route("/api/memory/search", web::post().to(memory_search))
        .route("/api/memory/store", web::post().to(memory_store));
}

/// `original_source`'s `main.py::root()` — harmless service-identity
/// endpoint, kept per SPEC_FULL.md §11.
async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "orchestration-pipeline",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

/// `GET /health` — "healthy" unless any collaborator client's `health()`
/// probe fails, in which case "degraded" (`spec.md` §6).
async fn health(ctx: web::Data<ApiContext>) -> HttpResponse {
    let (llm_ok, memory_ok, action_ok) = tokio::join!(
        ctx.pipeline.llm.health(),
        ctx.pipeline.memory.health(),
        ctx.pipeline.action.health(),
    );

    let status = if llm_ok && memory_ok && action_ok {
        "healthy"
    } else {
        "degraded"
    };

    HttpResponse::Ok().json(HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health/ready` — true once C7 startup finished opening every
/// collaborator client and loading the policy.
async fn health_ready(ctx: web::Data<ApiContext>) -> HttpResponse {
    let ready = ctx.ready.load(Ordering::Acquire);
    let status = if ready {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    status.finish_with_json(serde_json::json!({
        "ready": ready,
        "ws_connections": ctx.ws_connections.load(Ordering::Relaxed),
    }))
}

/// `GET /health/live` — liveness must never depend on collaborator health.
async fn health_live() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "alive": true }))
}

#[derive(Deserialize)]
struct ExecuteActionBody {
    #[serde(rename = "type")]
    kind: String,
    content: String,
    #[serde(default)]
    context: serde_json::Map<String, Value>,
    /// Not in `spec.md`'s literal body shape but accepted so a caller who
    /// already has a stable id (e.g. replaying a WS frame over HTTP) can
    /// supply one instead of getting a fresh one minted underneath it.
    #[serde(default)]
    id: Option<String>,
}

/// `POST /api/actions/execute` — builds a `Request` and runs it through
/// C5, returning the full `PipelineResponse` as JSON with HTTP 200
/// regardless of pipeline `status` (§7: only transport/validation-layer
/// failures occasion a non-2xx).
async fn execute_action(
    ctx: web::Data<ApiContext>,
    body: web::Json<ExecuteActionBody>,
) -> Result<HttpResponse, Error> {
    let body = body.into_inner();
    let request_id = body.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let request = PipelineRequest {
        id: request_id.clone(),
        kind: body.kind,
        content: body.content,
        context: body.context,
    };

    info!(request_id = %request_id, "dispatching /api/actions/execute");

    let response = match tokio::time::timeout(
        ctx.request_deadline,
        crate::pipeline::process(&request, &ctx.pipeline),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => {
            warn!(request_id = %request_id, "request-level deadline exceeded");
            shared_types::PipelineResponse::error(request_id, "deadline_exceeded")
        }
    };

    Ok(HttpResponse::Ok().json(response))
}

/// `GET /api/actions/allowed` — sourced from the same config field the
/// validator enforces, so the client-visible list and the enforced
/// allow-list can never drift (`original_source`'s
/// `actions.py::get_allowed_actions`).
async fn allowed_actions(ctx: web::Data<ApiContext>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "allowed_actions": ctx.pipeline.allowed_actions,
    }))
}

#[derive(Deserialize)]
struct MemorySearchBody {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    5
}

/// `POST /api/memory/search` — thin passthrough to `MemoryClient::search`,
/// which already never raises (`spec.md` I4).
async fn memory_search(
    ctx: web::Data<ApiContext>,
    body: web::Json<MemorySearchBody>,
) -> HttpResponse {
    let hits = ctx.pipeline.memory.search(&body.query, body.limit).await;
    HttpResponse::Ok().json(serde_json::json!({ "results": hits }))
}

#[derive(Deserialize)]
struct MemoryStoreBody {
    content: String,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

/// `POST /api/memory/store` — `{status: "stored" | "failed"}`, mapping
/// `MemoryClient::store`'s boolean result (`original_source`'s
/// `memory.py::store_memory`'s try/except-to-status pattern).
async fn memory_store(ctx: web::Data<ApiContext>, body: web::Json<MemoryStoreBody>) -> HttpResponse {
    let id = Uuid::new_v4().to_string();
    let metadata = Value::Object(body.metadata.clone());
    let stored = ctx.pipeline.memory.store(&id, &body.content, &metadata).await;
    let status = if stored { "stored" } else { "failed" };
    HttpResponse::Ok().json(serde_json::json!({ "status": status }))
}

/// Small extension so `health_ready` can attach a body to a non-`Ok`
/// `HttpResponseBuilder` without repeating the match above.
trait FinishWithJson {
    fn finish_with_json(self, value: Value) -> HttpResponse;
}

impl FinishWithJson for actix_web::HttpResponseBuilder {
    fn finish_with_json(mut self, value: Value) -> HttpResponse {
        self.json(value)
    }
}
