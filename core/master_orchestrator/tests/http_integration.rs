//! End-to-end coverage of the HTTP surface (C6's synchronous half) against
//! wiremock-backed collaborators, complementing the in-process unit tests in
//! `src/pipeline.rs` and `src/api/http.rs` with full `actix_web::test`
//! request/response round-trips.

use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, App};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use master_orchestrator::api::rate_limit::RateLimitConfig;
use master_orchestrator::api::ApiContext;
use master_orchestrator::clients::{ActionClient, GenerateOptions, LlmClient, MemoryClient};
use master_orchestrator::pipeline::PipelineContext;
use master_orchestrator::safety::{Policy, Validator};

async fn test_ctx(llm: &MockServer, memory: &MockServer, action: &MockServer) -> ApiContext {
    let pipeline = PipelineContext {
        llm: Arc::new(LlmClient::new(llm.uri(), Duration::from_secs(2))),
        memory: Arc::new(MemoryClient::new(memory.uri(), Duration::from_secs(2))),
        action: Arc::new(ActionClient::new(action.uri(), Duration::from_secs(2))),
        validator: Arc::new(Validator::new(
            Policy::default_policy(),
            vec!["open_app".to_string()],
            true,
            5,
        )),
        system_prompt: "you are a planner".to_string(),
        allowed_actions: vec!["open_app".to_string()],
        llm_options: GenerateOptions {
            temperature: 0.2,
            max_tokens: 512,
            system: None,
        },
        action_timeout: Duration::from_secs(2),
    };

    ApiContext {
        pipeline: Arc::new(pipeline),
        request_deadline: Duration::from_secs(5),
        ready: Arc::new(AtomicBool::new(true)),
        ws_connections: Arc::new(AtomicUsize::new(0)),
        jwt_auth: None,
        rate_limit_config: RateLimitConfig::default(),
        app_env: "test".to_string(),
        max_inflight_per_connection: 5,
    }
}

#[actix_web::test]
async fn full_success_path_via_http() {
    let (llm, memory, action) = (
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    );

    Mock::given(method("POST"))
        .and(path("/api/v1/collections/memories/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [[]],
            "metadatas": [[]],
        })))
        .mount(&memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/collections/memories/add"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": r#"{"intent": "open firefox", "actions": [{"type": "system_action", "tool": "open_app", "arguments": {}}]}"#
        })))
        .mount(&llm)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&action)
        .await;

    let ctx = test_ctx(&llm, &memory, &action).await;
    let app = test::init_service(
        App::new().configure(|cfg| master_orchestrator::api::configure(cfg, ctx)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/actions/execute")
        .set_json(json!({ "type": "chat", "content": "open firefox" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "success");
    assert_eq!(body["results"][0]["status"], "success");
}

#[actix_web::test]
async fn allowed_actions_endpoint_matches_config() {
    let (llm, memory, action) = (
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    );
    let ctx = test_ctx(&llm, &memory, &action).await;
    let app = test::init_service(
        App::new().configure(|cfg| master_orchestrator::api::configure(cfg, ctx)),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/actions/allowed").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["allowed_actions"], json!(["open_app"]));
}

#[actix_web::test]
async fn health_ready_reflects_ready_flag() {
    let (llm, memory, action) = (
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    );
    let ctx = test_ctx(&llm, &memory, &action).await;
    ctx.ready.store(false, std::sync::atomic::Ordering::Release);

    let app = test::init_service(
        App::new().configure(|cfg| master_orchestrator::api::configure(cfg, ctx)),
    )
    .await;

    let req = test::TestRequest::get().uri("/health/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}

#[actix_web::test]
async fn memory_store_reports_failed_status_on_upstream_error() {
    let (llm, memory, action) = (
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&memory)
        .await;

    let ctx = test_ctx(&llm, &memory, &action).await;
    let app = test::init_service(
        App::new().configure(|cfg| master_orchestrator::api::configure(cfg, ctx)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/memory/store")
        .set_json(json!({ "content": "remember this" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "failed");
}
