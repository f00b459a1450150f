use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::ServiceResponse;
use actix_web::middleware::{DefaultHeaders, ErrorHandlerResponse, ErrorHandlers};
use actix_web::{http::header, http::StatusCode, web, App, HttpServer};

use master_orchestrator::api::audit_middleware::SecurityAuditMiddleware;
use master_orchestrator::api::auth::JwtAuth;
use master_orchestrator::api::rate_limit::{RateLimitConfig, RateLimitMiddleware};
use master_orchestrator::api::ApiContext;
use master_orchestrator::clients::{ActionClient, GenerateOptions, LlmClient, MemoryClient};
use master_orchestrator::config::Config;
use master_orchestrator::pipeline::PipelineContext;
use master_orchestrator::prompt::load_system_prompt;
use master_orchestrator::safety::{Policy, Validator};

/// Rewrites any unhandled 500 into the structured `{status: "error", error:
/// "internal"}` body (§7 error class 9 / `spec.md`'s "Internal" taxonomy
/// entry), the Rust counterpart of `original_source`'s
/// `main.py::global_exception_handler` catch-all. Logs at `error!` with the
/// request path so an internal failure is never silently swallowed.
fn internal_error_handler(
    res: ServiceResponse<actix_web::body::BoxBody>,
) -> actix_web::Result<ErrorHandlerResponse<actix_web::body::BoxBody>> {
    tracing::error!(path = %res.request().path(), status = %res.status(), "unhandled internal error");
    let req = res.request().clone();
    let response = actix_web::HttpResponse::InternalServerError()
        .json(serde_json::json!({ "status": "error", "error": "internal" }))
        .map_into_boxed_body();
    Ok(ErrorHandlerResponse::Response(ServiceResponse::new(
        req, response,
    )))
}

/// Builds the Actix HTTP server: CORS, baseline security headers, audit
/// logging, rate limiting, and the C6 routes, wired against `ctx`. Does not
/// start the server — the caller awaits the returned `Server` alongside
/// shutdown coordination.
fn run_http_server(ctx: ApiContext, bind_addr: &str) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        let cors = if ctx.app_env == "production" {
            Cors::default()
                .allowed_origin_fn(|_origin, _req_head| false)
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .max_age(3600)
        };

        let security_headers = DefaultHeaders::new()
            .add(("X-Frame-Options", "DENY"))
            .add(("X-Content-Type-Options", "nosniff"))
            .add(("Referrer-Policy", "no-referrer"));

        App::new()
            .app_data(
                web::JsonConfig::default()
                    .limit(16 * 1024 * 1024)
                    .error_handler(|err, _req| {
                        let details = err.to_string();
                        tracing::warn!(error = %details, "json payload error");
                        actix_web::error::InternalError::from_response(
                            err,
                            actix_web::HttpResponse::BadRequest().json(serde_json::json!({
                                "error": "invalid_request",
                                "details": details,
                            })),
                        )
                        .into()
                    }),
            )
            .configure(|cfg| master_orchestrator::api::configure(cfg, ctx.clone()))
            .wrap(RateLimitMiddleware::new(ctx.rate_limit_config.clone()))
            .wrap(SecurityAuditMiddleware::new())
            .wrap(security_headers)
            .wrap(cors)
            .wrap(
                ErrorHandlers::new()
                    .handler(StatusCode::INTERNAL_SERVER_ERROR, internal_error_handler),
            )
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    platform::init_tracing("master_orchestrator").expect("failed to init tracing");

    // C7 startup, §4.7: load config (fail fast) -> open collaborator clients
    // -> load policy (fail fast on malformed) -> load system prompt -> build
    // the validator -> mark ready -> bind.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration load failed");
            std::process::exit(1);
        }
    };

    if let Ok(addr) = config.metrics_addr.parse() {
        if let Err(e) = platform::init_metrics(addr) {
            tracing::warn!(error = %e, addr = %config.metrics_addr, "metrics exporter failed to start");
        }
    } else {
        tracing::warn!(addr = %config.metrics_addr, "invalid METRICS_ADDR, metrics exporter disabled");
    }

    let llm = Arc::new(LlmClient::new(config.llm_endpoint.clone(), config.llm_deadline));
    let memory = Arc::new(MemoryClient::new(config.memory_service_url.clone(), config.memory_deadline));
    let action = Arc::new(ActionClient::new(
        config.action_executor_url.clone(),
        config.action_client_deadline,
    ));

    let policy = match Policy::load(&config.policy_path) {
        Ok(policy) => policy,
        Err(e) => {
            tracing::error!(error = %e, path = %config.policy_path, "policy load failed");
            std::process::exit(2);
        }
    };

    let validator = Arc::new(Validator::new(
        policy,
        config.allowed_actions.clone(),
        config.enable_sandbox,
        config.max_concurrent_actions,
    ));

    let system_prompt = load_system_prompt(&config.system_prompt_path);

    let pipeline = Arc::new(PipelineContext {
        llm,
        memory,
        action,
        validator,
        system_prompt,
        allowed_actions: config.allowed_actions.clone(),
        llm_options: GenerateOptions {
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            system: None,
        },
        action_timeout: config.action_timeout,
    });

    let jwt_auth = if config.jwt_secret.trim().is_empty() {
        tracing::warn!("JWT_SECRET is empty, WS/HTTP auth will be disabled");
        None
    } else {
        Some(Arc::new(JwtAuth::new(config.jwt_secret.as_bytes())))
    };

    let ctx = ApiContext {
        pipeline,
        request_deadline: config.request_deadline,
        ready: Arc::new(AtomicBool::new(true)),
        ws_connections: Arc::new(AtomicUsize::new(0)),
        jwt_auth,
        rate_limit_config: RateLimitConfig {
            requests: std::num::NonZeroU32::new(config.rate_limit_requests)
                .unwrap_or_else(|| std::num::NonZeroU32::new(100).unwrap()),
            window_secs: config.rate_limit_window_secs,
        },
        app_env: config.app_env.clone(),
        max_inflight_per_connection: config.max_concurrent_actions,
    };

    let bind_addr = format!("{}:{}", config.api_host, config.api_port);
    tracing::info!(addr = %bind_addr, "starting orchestrator");

    let server = run_http_server(ctx.clone(), &bind_addr)?;
    let handle = server.handle();
    let shutdown_grace = config.shutdown_grace;

    let shutdown_fut = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
            return;
        }
        tracing::info!(grace_secs = shutdown_grace.as_secs(), "shutdown signal received, draining");
        ctx.ready.store(false, std::sync::atomic::Ordering::Release);
        tokio::time::sleep(shutdown_grace).await;
        handle.stop(true).await;
    };

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!(error = %e, "http server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_fut => {
            tracing::info!("shutdown complete");
        }
    }

    Ok(())
}
