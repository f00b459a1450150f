use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::Duration;

use actix_web::web;

pub mod audit_middleware;
pub mod auth;
pub mod http;
pub mod rate_limit;
pub mod validation;
pub mod ws;

use auth::JwtAuth;
use rate_limit::RateLimitConfig;

use crate::pipeline::PipelineContext;

/// Everything the HTTP and WS surfaces (C6) need: the shared pipeline
/// context built in `main.rs`, plus the auth/rate-limit/readiness state that
/// belongs to the transport layer rather than the pipeline itself.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<PipelineContext>,
    /// Per-request deadline enforced by each transport entry point
    /// (`spec.md` §5 "request-level deadline").
    pub request_deadline: Duration,
    /// Flips to `true` once startup has finished opening collaborator
    /// clients and loading the policy; read by `GET /health/ready`.
    pub ready: Arc<AtomicBool>,
    /// Live WS connection count, read by `GET /health/ready` so a pool under
    /// connection pressure can be observed externally.
    pub ws_connections: Arc<AtomicUsize>,
    pub jwt_auth: Option<Arc<JwtAuth>>,
    pub rate_limit_config: RateLimitConfig,
    pub app_env: String,
    /// Bound on concurrent in-flight pipelines per WS connection (C6),
    /// mirrors `Config::max_concurrent_actions`.
    pub max_inflight_per_connection: usize,
}

pub fn configure(cfg: &mut web::ServiceConfig, ctx: ApiContext) {
    http::configure(cfg, ctx.clone());
    ws::configure(cfg, ctx);
}
